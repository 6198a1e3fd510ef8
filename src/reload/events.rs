//! Change notifications pushed by the media server.

use std::fmt;
use std::sync::Arc;

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// What kind of server resource changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Library,
    Series,
    Book,
    ReadProgress,
    Collection,
    ReadList,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Library => "library",
            ResourceKind::Series => "series",
            ResourceKind::Book => "book",
            ResourceKind::ReadProgress => "read-progress",
            ResourceKind::Collection => "collection",
            ResourceKind::ReadList => "read-list",
        };
        f.write_str(name)
    }
}

/// One notification. Delivery is at-least-once; duplicates are expected.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ResourceKind,
    pub id: String,
}

impl ChangeEvent {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// The key this event reloads when no mapper is installed.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind, self.id.as_str())
    }
}

/// Reload granularity: one debounce/cool-down cycle runs per key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: Arc<str>,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, id: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Maps an event to the key it should reload, or `None` to ignore it.
pub type KeyMapper = Arc<dyn Fn(&ChangeEvent) -> Option<ResourceKey> + Send + Sync>;

/// Mapper for an open book: book and read-progress events both reload the
/// book, everything else is ignored.
pub fn book_key(event: &ChangeEvent) -> Option<ResourceKey> {
    match event.kind {
        ResourceKind::Book | ResourceKind::ReadProgress => {
            Some(ResourceKey::new(ResourceKind::Book, event.id.as_str()))
        }
        _ => None,
    }
}

/// Adapt a channel receiver into an event stream.
pub fn receiver_stream(rx: mpsc::UnboundedReceiver<ChangeEvent>) -> impl Stream<Item = ChangeEvent> + Send + Unpin {
    Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (event, rx))
    }))
}
