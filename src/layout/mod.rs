//! # Page Layout
//!
//! Grouping pages into single or double spreads under a reading direction.

pub mod spread;

pub use spread::{
    plan_spreads, PageLayout, ReadingDirection, Spread, SpreadAssembler, SpreadPage, SpreadPlan,
    SpreadWidth,
};
