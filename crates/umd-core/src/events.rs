use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Progress notifications emitted while a query runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The registry picked an extractor for the URL.
    ExtractorFound { name: String },
    /// The URL was classified; `kind` is the source tag, `name` its owner.
    SourceTypeFound { kind: String, name: String },
    /// Number of new media items added by the last page or post.
    MediaQueried { amount: usize },
    /// Final number of media items in the response.
    QueryCompleted { total: usize },
}

/// Receiver for query events (decoupled from the crawl).
///
/// Called synchronously at emission points; implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

impl<F> EventSink for F
where
    F: Fn(Event) + Send + Sync,
{
    fn emit(&self, event: Event) {
        self(event)
    }
}

/// Sink that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: Event) {
        match event {
            Event::ExtractorFound { name } => {
                tracing::info!(%name, "Extractor found");
            }
            Event::SourceTypeFound { kind, name } => {
                tracing::info!(%kind, %name, "Source type found");
            }
            Event::MediaQueried { amount } => {
                tracing::debug!(%amount, "Media queried");
            }
            Event::QueryCompleted { total } => {
                tracing::info!(%total, "Query completed");
            }
        }
    }
}

/// Sink that forwards events into a bounded channel.
///
/// When the channel is full the new event is dropped, so a slow consumer
/// never stalls the crawl.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<Event>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end of a channel of `capacity`.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: Event) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::debug!(error = %e, "Dropping query event");
        }
    }
}

/// Optional, cheaply clonable handle to an [`EventSink`].
///
/// Emitting through an emitter without a sink is a no-op.
#[derive(Clone, Default)]
pub struct EventEmitter {
    sink: Option<Arc<dyn EventSink>>,
}

impl EventEmitter {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: Event) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
