// crates/ecoverify-bus/src/lib.rs
// ============================================================================
// Module: EcoVerify Event Bus
// Description: Per-run broadcast fan-out with async subscriber streams.
// Purpose: Deliver ordered, best-effort event sequences without blocking publishers.
// Dependencies: ecoverify-core, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! The bus keeps one broadcast channel per run, created lazily on the first
//! publish or subscribe. Delivery is ordered per run and best-effort: a slow
//! subscriber skips events it lagged past rather than blocking the
//! orchestrator, and a subscriber that connects late receives nothing that
//! was published before it; the run state is the durable record, the bus is
//! a live-notification convenience. Publishing the terminal event closes the
//! run's channel, ending every open subscription.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;

use ecoverify_core::EventChannel;
use ecoverify_core::EventSink;
use ecoverify_core::RunEvent;
use ecoverify_core::RunId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default per-run channel capacity before lagging subscribers skip events.
const DEFAULT_CAPACITY: usize = 256;

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Per-run broadcast event bus.
///
/// # Invariants
/// - Events for one run are delivered to each subscriber in publish order.
/// - `publish` never blocks on subscribers and never fails.
/// - The channel for a run is removed after its terminal event is sent.
#[derive(Debug)]
pub struct EventBus {
    /// Broadcast senders keyed by run identifier.
    channels: Mutex<BTreeMap<String, broadcast::Sender<RunEvent>>>,
    /// Channel capacity applied to new runs.
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus with the given per-run channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(BTreeMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Returns the sender for a run, creating the channel if needed.
    fn sender(&self, run_id: &RunId) -> broadcast::Sender<RunEvent> {
        let mut guard = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .entry(run_id.as_str().to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Drops the channel for a run, closing open subscriptions.
    fn close(&self, run_id: &RunId) {
        let mut guard = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(run_id.as_str());
    }
}

impl EventSink for EventBus {
    fn publish(&self, run_id: &RunId, event: RunEvent) {
        let terminal = event.is_terminal();
        let sender = self.sender(run_id);
        // A send with no receivers is fine; the state store is the record.
        let _ = sender.send(event);
        if terminal {
            self.close(run_id);
        }
    }
}

impl EventChannel for EventBus {
    type Stream = EventStream;

    fn subscribe(&self, run_id: &RunId) -> EventStream {
        EventStream {
            receiver: self.sender(run_id).subscribe(),
        }
    }
}

// ============================================================================
// SECTION: Event Stream
// ============================================================================

/// Open-ended event subscription for one run.
///
/// The stream ends when the run's channel closes after its terminal event, or
/// when the subscriber drops it.
#[derive(Debug)]
pub struct EventStream {
    /// Underlying broadcast receiver.
    receiver: broadcast::Receiver<RunEvent>,
}

impl EventStream {
    /// Awaits the next event, skipping any the subscriber lagged past.
    ///
    /// Returns `None` once the run's channel has closed.
    pub async fn next(&mut self) -> Option<RunEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Converts the subscription into a [`Stream`] of events.
    #[must_use]
    pub fn into_stream(self) -> impl Stream<Item = RunEvent> {
        BroadcastStream::new(self.receiver).filter_map(Result::ok)
    }
}
