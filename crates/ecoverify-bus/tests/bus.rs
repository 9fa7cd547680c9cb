// crates/ecoverify-bus/tests/bus.rs
// ============================================================================
// Module: Event Bus Unit Tests
// Description: Ordering, isolation, no-replay, lag, and terminal closure.
// Purpose: Validate the per-run fan-out contract under subscriber behavior.
// ============================================================================

//! Bus tests: publish order is preserved per run, runs never cross streams,
//! late subscribers get no replay, lagging subscribers skip rather than
//! block, and the terminal event closes the stream.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

use ecoverify_bus::EventBus;
use ecoverify_core::EventChannel;
use ecoverify_core::EventSink;
use ecoverify_core::Phase;
use ecoverify_core::RunEvent;
use ecoverify_core::RunId;
use ecoverify_core::Severity;

fn feed(message: &str) -> RunEvent {
    RunEvent::system_feed(message, Severity::Low)
}

fn message_of(event: &RunEvent) -> String {
    match event {
        RunEvent::NeuralFeed {
            message, ..
        } => message.clone(),
        other => panic!("expected a feed event, got {other:?}"),
    }
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let bus = EventBus::default();
    let run = RunId::new("run-a");
    let mut stream = bus.subscribe(&run);

    for index in 0..5 {
        bus.publish(&run, feed(&format!("event-{index}")));
    }

    for index in 0..5 {
        let event = stream.next().await.unwrap();
        assert_eq!(message_of(&event), format!("event-{index}"));
    }
}

#[tokio::test]
async fn runs_never_cross_streams() {
    let bus = EventBus::default();
    let run_a = RunId::new("run-a");
    let run_b = RunId::new("run-b");
    let mut stream_a = bus.subscribe(&run_a);
    let mut stream_b = bus.subscribe(&run_b);

    bus.publish(&run_a, feed("for-a"));
    bus.publish(&run_b, feed("for-b"));
    bus.publish(&run_a, RunEvent::Complete {
        phase: Phase::Complete,
    });
    bus.publish(&run_b, RunEvent::Complete {
        phase: Phase::Complete,
    });

    assert_eq!(message_of(&stream_a.next().await.unwrap()), "for-a");
    assert!(stream_a.next().await.unwrap().is_terminal());
    assert!(stream_a.next().await.is_none());

    assert_eq!(message_of(&stream_b.next().await.unwrap()), "for-b");
    assert!(stream_b.next().await.unwrap().is_terminal());
}

#[tokio::test]
async fn publish_without_subscribers_never_blocks_or_fails() {
    let bus = EventBus::default();
    let run = RunId::new("run-silent");
    for index in 0..1_000 {
        bus.publish(&run, feed(&format!("event-{index}")));
    }
}

#[tokio::test]
async fn late_subscriber_receives_no_replay() {
    let bus = EventBus::default();
    let run = RunId::new("run-a");

    bus.publish(&run, feed("before-subscribe"));
    let mut stream = bus.subscribe(&run);
    bus.publish(&run, feed("after-subscribe"));

    let event = stream.next().await.unwrap();
    assert_eq!(message_of(&event), "after-subscribe", "no replay of earlier events");
}

#[tokio::test]
async fn lagging_subscriber_skips_instead_of_blocking() {
    let bus = EventBus::new(4);
    let run = RunId::new("run-a");
    let mut stream = bus.subscribe(&run);

    for index in 0..64 {
        bus.publish(&run, feed(&format!("event-{index}")));
    }
    bus.publish(&run, RunEvent::Complete {
        phase: Phase::Complete,
    });

    // The subscriber lagged; it still observes a suffix ending in Complete.
    let mut saw_terminal = false;
    while let Some(event) = stream.next().await {
        saw_terminal = event.is_terminal();
    }
    assert!(saw_terminal, "the stream still ends with the terminal event");
}

#[tokio::test]
async fn terminal_event_closes_every_open_subscription() {
    let bus = EventBus::default();
    let run = RunId::new("run-a");
    let mut first = bus.subscribe(&run);
    let mut second = bus.subscribe(&run);

    bus.publish(&run, RunEvent::Complete {
        phase: Phase::Error,
    });

    assert!(first.next().await.unwrap().is_terminal());
    assert!(first.next().await.is_none());
    assert!(second.next().await.unwrap().is_terminal());
    assert!(second.next().await.is_none());
}

#[tokio::test]
async fn stream_adapter_yields_the_same_sequence() {
    use tokio_stream::StreamExt;

    let bus = EventBus::default();
    let run = RunId::new("run-a");
    let stream = bus.subscribe(&run);

    bus.publish(&run, feed("one"));
    bus.publish(&run, RunEvent::Complete {
        phase: Phase::Complete,
    });

    let events: Vec<RunEvent> = stream.into_stream().collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(message_of(&events[0]), "one");
    assert!(events[1].is_terminal());
}
