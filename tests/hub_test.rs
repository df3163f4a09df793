//! Integration tests: event hub contracts seen from outside the crate.

mod common;

use std::sync::{Arc, Mutex};

use chess_core::Position;
use event_hub::{ArgValue, Event, EventHub, EventKind, Handler, HubError, Identifier};

#[test]
fn test_extra_argument_invokes_zero_handlers() {
    let hub = EventHub::new();
    let log = common::event_log(&hub);

    let result = hub.publish_named(
        EventKind::SearchCompleted,
        [
            ("result_ref", ArgValue::from(Identifier::new("r1"))),
            ("elapsed", ArgValue::from(Identifier::new("3s"))),
        ],
    );
    assert!(matches!(
        result,
        Err(HubError::SchemaViolation {
            kind: EventKind::SearchCompleted,
            ..
        })
    ));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_first_handler_failure_does_not_stop_second() {
    let hub = EventHub::new();
    let mut diagnostics = hub.subscribe_diagnostics();
    let ran = Arc::new(Mutex::new(false));

    hub.register(
        "engine",
        [(
            EventKind::PositionChanged,
            Handler::sync(|_| anyhow::bail!("engine not running")),
        )],
    );
    let flag = ran.clone();
    hub.register(
        "board",
        [(
            EventKind::PositionChanged,
            Handler::sync(move |_| {
                *flag.lock().unwrap() = true;
                Ok(())
            }),
        )],
    );

    let delivery = hub.publish(Event::PositionChanged {
        position: Position::default(),
    });
    assert!(*ran.lock().unwrap());
    assert_eq!(delivery.failed, 1);

    let failure = diagnostics.try_recv().unwrap();
    assert_eq!(failure.listener, "engine");
    assert!(failure.error.contains("engine not running"));
}

#[test]
fn test_unknown_kind_on_registration() {
    let hub = EventHub::new();
    let err = hub
        .register_by_name("ui", [("ClockTick", Handler::sync(|_| Ok(())))])
        .unwrap_err();
    assert_eq!(err, HubError::UnknownEventKind("ClockTick".to_string()));
}

#[test]
fn test_named_publication_reaches_typed_handlers() {
    let hub = EventHub::new();
    let log = common::event_log(&hub);

    let delivery = hub
        .publish_named(
            EventKind::SearchRequested,
            [
                ("corpus", ArgValue::from(Identifier::new("twic.pgn"))),
                ("position", ArgValue::from(Position::default())),
            ],
        )
        .unwrap();
    assert_eq!(delivery.delivered, 1);
    assert_eq!(
        log.lock().unwrap()[0],
        Event::SearchRequested {
            position: Position::default(),
            corpus: Identifier::new("twic.pgn"),
        }
    );
}

#[tokio::test]
async fn test_publish_async_runs_sync_and_async_in_order() {
    let hub = EventHub::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = order.clone();
    hub.register(
        "stop-analysis",
        [(
            EventKind::GameLoaded,
            Handler::future(move |_| {
                let first = first.clone();
                async move {
                    tokio::task::yield_now().await;
                    first.lock().unwrap().push("stopped");
                    Ok(())
                }
            }),
        )],
    );
    let second = order.clone();
    hub.register(
        "start-analysis",
        [(
            EventKind::GameLoaded,
            Handler::sync(move |_| {
                second.lock().unwrap().push("started");
                Ok(())
            }),
        )],
    );

    let delivery = hub.publish_async(Event::GameLoaded).await;
    assert_eq!(delivery.delivered, 2);
    assert_eq!(*order.lock().unwrap(), vec!["stopped", "started"]);
}
