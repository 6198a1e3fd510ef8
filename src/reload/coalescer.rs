//! # Reload Coalescer
//!
//! Turns a live, unbounded-rate stream of change notifications into a bounded
//! rate of reloads, independently per resource key.
//!
//! ## Per-key cycle
//!
//! ```text
//!   idle --event--> debouncing --window elapsed--> fire --> cooling down
//!                    (events absorbed)                      (events mark pending)
//!   cooling down --elapsed, nothing pending--> idle
//!   cooling down --elapsed, pending--> fire --> cooling down
//! ```
//!
//! The debounce window starts at the first event and is never extended. At
//! most one reload per key is in flight: a fire that comes due while the
//! previous reload still runs waits for it to complete.
//!
//! The coalescer is a single actor task. Reloads run on their own tasks so a
//! slow reload for one key never delays another key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use super::events::{ChangeEvent, KeyMapper, ResourceKey};
use crate::config::ReloadConfig;

/// Receives coalesced reloads. Must be idempotent.
#[async_trait]
pub trait ReloadTarget: Send + Sync + 'static {
    async fn reload(&self, key: &ResourceKey);
}

/// Counters reported when the coalescer stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub events_seen: u64,
    /// Events with no key under the mapper.
    pub events_ignored: u64,
    /// Events folded into an already scheduled reload.
    pub events_absorbed: u64,
    pub reloads_fired: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Debouncing { fire_at: Instant },
    CoolingDown { until: Instant, pending: bool },
    /// Due to fire, but the previous reload is still running.
    AwaitingCompletion,
    /// Cool-down over; kept only while a reload is still in flight.
    Idle,
}

#[derive(Debug)]
struct KeyState {
    phase: Phase,
    in_flight: bool,
}

impl KeyState {
    fn deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Debouncing { fire_at } => Some(fire_at),
            Phase::CoolingDown { until, .. } => Some(until),
            Phase::AwaitingCompletion | Phase::Idle => None,
        }
    }
}

struct Actor {
    debounce: Duration,
    cooldown: Duration,
    mapper: Option<KeyMapper>,
    target: Arc<dyn ReloadTarget>,
    keys: HashMap<ResourceKey, KeyState>,
    done_tx: mpsc::UnboundedSender<ResourceKey>,
    stats: CoalescerStats,
}

impl Actor {
    fn on_event(&mut self, event: ChangeEvent, now: Instant) {
        self.stats.events_seen += 1;
        let key = match &self.mapper {
            Some(map) => map(&event),
            None => Some(event.key()),
        };
        let Some(key) = key else {
            self.stats.events_ignored += 1;
            trace!(kind = %event.kind, id = %event.id, "Ignoring change event");
            return;
        };
        let debounce = self.debounce;
        let state = self.keys.entry(key.clone()).or_insert(KeyState {
            phase: Phase::Idle,
            in_flight: false,
        });
        match state.phase {
            Phase::Idle => {
                state.phase = Phase::Debouncing {
                    fire_at: now + debounce,
                };
                debug!(key = %key, "Reload scheduled");
            }
            Phase::CoolingDown { until, .. } => {
                state.phase = Phase::CoolingDown {
                    until,
                    pending: true,
                };
                self.stats.events_absorbed += 1;
                debug!(key = %key, "Event during cool-down, reload pending");
            }
            Phase::Debouncing { .. } | Phase::AwaitingCompletion => {
                self.stats.events_absorbed += 1;
                trace!(key = %key, "Event absorbed");
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.keys.values().filter_map(KeyState::deadline).min()
    }

    fn on_deadlines(&mut self, now: Instant) {
        let due: Vec<ResourceKey> = self
            .keys
            .iter()
            .filter(|(_, s)| s.deadline().is_some_and(|d| d <= now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in due {
            let Some(state) = self.keys.get_mut(&key) else {
                continue;
            };
            match state.phase {
                Phase::Debouncing { .. } | Phase::CoolingDown { pending: true, .. } => {
                    self.fire(key, now);
                }
                Phase::CoolingDown { pending: false, .. } => {
                    if state.in_flight {
                        state.phase = Phase::Idle;
                    } else {
                        self.keys.remove(&key);
                    }
                }
                Phase::AwaitingCompletion | Phase::Idle => {}
            }
        }
    }

    fn on_completed(&mut self, key: ResourceKey, now: Instant) {
        let Some(state) = self.keys.get_mut(&key) else {
            return;
        };
        state.in_flight = false;
        match state.phase {
            Phase::AwaitingCompletion => self.fire(key, now),
            Phase::Idle => {
                self.keys.remove(&key);
            }
            _ => {}
        }
    }

    fn fire(&mut self, key: ResourceKey, now: Instant) {
        let Some(state) = self.keys.get_mut(&key) else {
            return;
        };
        if state.in_flight {
            debug!(key = %key, "Previous reload still running, deferring");
            state.phase = Phase::AwaitingCompletion;
            return;
        }
        state.in_flight = true;
        state.phase = Phase::CoolingDown {
            until: now + self.cooldown,
            pending: false,
        };
        self.stats.reloads_fired += 1;
        info!(key = %key, "Triggering reload");

        let target = Arc::clone(&self.target);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let reload = {
                let key = key.clone();
                tokio::spawn(async move { target.reload(&key).await })
            };
            if let Err(e) = reload.await {
                warn!(key = %key, error = %e, "Reload task failed");
            }
            let _ = done_tx.send(key);
        });
    }
}

/// Handle on a running coalescer.
pub struct CoalescerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<CoalescerStats>,
}

impl CoalescerHandle {
    /// Stop consuming events. Reloads already running are not interrupted;
    /// scheduled ones are dropped.
    pub async fn shutdown(mut self) -> CoalescerStats {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.join().await
    }

    /// Wait for the event stream to end.
    pub async fn join(self) -> CoalescerStats {
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Reload coalescer task failed");
                CoalescerStats::default()
            }
        }
    }
}

/// Entry points for starting a coalescer task.
pub struct ReloadCoalescer;

impl ReloadCoalescer {
    /// Coalesce `events` by their own (kind, id) key.
    pub fn spawn<S>(events: S, target: Arc<dyn ReloadTarget>, config: &ReloadConfig) -> CoalescerHandle
    where
        S: Stream<Item = ChangeEvent> + Send + Unpin + 'static,
    {
        Self::spawn_inner(events, target, config, None)
    }

    /// Coalesce `events` under the keys `mapper` assigns; unmapped events are ignored.
    pub fn spawn_with_mapper<S>(
        events: S,
        target: Arc<dyn ReloadTarget>,
        config: &ReloadConfig,
        mapper: KeyMapper,
    ) -> CoalescerHandle
    where
        S: Stream<Item = ChangeEvent> + Send + Unpin + 'static,
    {
        Self::spawn_inner(events, target, config, Some(mapper))
    }

    fn spawn_inner<S>(
        mut events: S,
        target: Arc<dyn ReloadTarget>,
        config: &ReloadConfig,
        mapper: Option<KeyMapper>,
    ) -> CoalescerHandle
    where
        S: Stream<Item = ChangeEvent> + Send + Unpin + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut actor = Actor {
            debounce: config.debounce(),
            cooldown: config.cooldown(),
            mapper,
            target,
            keys: HashMap::new(),
            done_tx,
            stats: CoalescerStats::default(),
        };

        let task = tokio::spawn(async move {
            // Set once the handle is dropped without an explicit shutdown.
            let mut detached = false;
            loop {
                let deadline = actor.next_deadline();
                let timer = async move {
                    match deadline {
                        Some(at) => sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                };
                tokio::select! {
                    biased;
                    res = &mut shutdown_rx, if !detached => match res {
                        Ok(()) => {
                            debug!("Reload coalescer shut down");
                            break;
                        }
                        Err(_) => detached = true,
                    },
                    Some(key) = done_rx.recv() => actor.on_completed(key, Instant::now()),
                    _ = timer => actor.on_deadlines(Instant::now()),
                    event = events.next() => match event {
                        Some(event) => actor.on_event(event, Instant::now()),
                        None => {
                            debug!("Change stream ended, reload coalescer stopping");
                            break;
                        }
                    },
                }
            }
            actor.stats
        });

        CoalescerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}
