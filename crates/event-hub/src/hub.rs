//! The broker: subscriptions per event kind, delivered in registration order.
//!
//! A failing handler never stops the delivery loop and never reaches the
//! publisher. Failures are logged and broadcast on the diagnostics channel.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::HubError;
use crate::event::{ArgValue, Event, EventKind};

const DIAGNOSTICS_CAPACITY: usize = 256;

type SyncHandlerFn = dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync;
type AsyncHandlerFn = dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;
type HandlerOutcome = Result<anyhow::Result<()>, Box<dyn Any + Send>>;

#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncHandlerFn>),
    Async(Arc<AsyncHandlerFn>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    /// Handler awaited by `publish_async`. Plain `publish` spawns it onto the
    /// current tokio runtime.
    pub fn future<F, Fut>(f: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Handler::Async(Arc::new(move |event| f(event).boxed()))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync"),
            Handler::Async(_) => f.write_str("Handler::Async"),
        }
    }
}

#[derive(Clone, Debug)]
struct Subscription {
    listener: String,
    handler: Handler,
}

/// A handler that returned an error or panicked during delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub listener: String,
    pub kind: EventKind,
    pub error: String,
}

/// Per-publication delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
    /// Async handlers handed to the runtime by a sync publish. Their failures
    /// arrive on the diagnostics channel later.
    pub spawned: usize,
}

impl Delivery {
    pub fn invoked(&self) -> usize {
        self.delivered + self.failed + self.spawned
    }
}

struct HubInner {
    subscriptions: RwLock<HashMap<EventKind, Vec<Subscription>>>,
    diagnostics: broadcast::Sender<HandlerFailure>,
}

/// Shared handle to one hub. Clones point at the same subscription table.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (diagnostics, _) = broadcast::channel(DIAGNOSTICS_CAPACITY);
        Self {
            inner: Arc::new(HubInner {
                subscriptions: RwLock::new(HashMap::new()),
                diagnostics,
            }),
        }
    }

    /// Add handlers for `listener`, appended after earlier registrations.
    pub fn register<I>(&self, listener: &str, handlers: I)
    where
        I: IntoIterator<Item = (EventKind, Handler)>,
    {
        let mut subscriptions = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        for (kind, handler) in handlers {
            debug!(listener, kind = %kind, "Registered handler");
            subscriptions.entry(kind).or_default().push(Subscription {
                listener: listener.to_string(),
                handler,
            });
        }
    }

    /// Same as [`register`](Self::register) with kinds given by name. Nothing is
    /// registered if any name is unknown.
    pub fn register_by_name<'a, I>(&self, listener: &str, handlers: I) -> Result<(), HubError>
    where
        I: IntoIterator<Item = (&'a str, Handler)>,
    {
        let resolved = handlers
            .into_iter()
            .map(|(name, handler)| Ok((name.parse::<EventKind>()?, handler)))
            .collect::<Result<Vec<_>, HubError>>()?;
        self.register(listener, resolved);
        Ok(())
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.snapshot(kind).len()
    }

    /// Listener names for `kind`, in delivery order.
    pub fn listeners(&self, kind: EventKind) -> Vec<String> {
        self.snapshot(kind)
            .into_iter()
            .map(|s| s.listener)
            .collect()
    }

    /// Receiver for isolated handler failures from this point on.
    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<HandlerFailure> {
        self.inner.diagnostics.subscribe()
    }

    // Cloned out so handlers may publish or register without deadlocking.
    fn snapshot(&self, kind: EventKind) -> Vec<Subscription> {
        self.inner
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Run synchronous handlers in registration order. Async handlers are
    /// spawned as one task on the current tokio runtime and awaited there in
    /// registration order. Without a runtime they count as failed.
    pub fn publish(&self, event: Event) -> Delivery {
        let kind = event.kind();
        let subscriptions = self.snapshot(kind);
        debug!(kind = %kind, handlers = subscriptions.len(), "Publishing event");

        let mut delivery = Delivery::default();
        let mut pending = Vec::new();
        for subscription in subscriptions {
            if subscription.handler.is_async() {
                pending.push(subscription);
                continue;
            }
            if let Handler::Sync(handler) = &subscription.handler {
                let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event)));
                self.settle(&mut delivery, &subscription, kind, outcome);
            }
        }

        if pending.is_empty() {
            return delivery;
        }
        match Handle::try_current() {
            Ok(runtime) => {
                delivery.spawned += pending.len();
                let hub = self.clone();
                runtime.spawn(async move {
                    let mut detached = Delivery::default();
                    for subscription in &pending {
                        let outcome = hub.run_handler(&subscription.handler, &event).await;
                        hub.settle(&mut detached, subscription, kind, outcome);
                    }
                });
            }
            Err(_) => {
                for subscription in &pending {
                    let outcome = Ok(Err(anyhow::anyhow!(
                        "async handler needs a tokio runtime"
                    )));
                    self.settle(&mut delivery, subscription, kind, outcome);
                }
            }
        }
        delivery
    }

    /// Validate named arguments against the kind's schema, then [`publish`](Self::publish).
    /// On a violation no handler is invoked.
    pub fn publish_named<S, I>(&self, kind: EventKind, args: I) -> Result<Delivery, HubError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, ArgValue)>,
    {
        let event = Event::from_args(kind, args)?;
        Ok(self.publish(event))
    }

    /// Deliver to every handler, awaiting each before starting the next.
    pub async fn publish_async(&self, event: Event) -> Delivery {
        let kind = event.kind();
        let subscriptions = self.snapshot(kind);
        debug!(kind = %kind, handlers = subscriptions.len(), "Publishing event (async)");

        let mut delivery = Delivery::default();
        for subscription in &subscriptions {
            let outcome = self.run_handler(&subscription.handler, &event).await;
            self.settle(&mut delivery, subscription, kind, outcome);
        }
        delivery
    }

    async fn run_handler(&self, handler: &Handler, event: &Event) -> HandlerOutcome {
        match handler {
            Handler::Sync(handler) => catch_unwind(AssertUnwindSafe(|| handler(event))),
            Handler::Async(handler) => {
                match catch_unwind(AssertUnwindSafe(|| handler(event.clone()))) {
                    Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                    Err(panic) => Err(panic),
                }
            }
        }
    }

    pub async fn publish_named_async<S, I>(
        &self,
        kind: EventKind,
        args: I,
    ) -> Result<Delivery, HubError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, ArgValue)>,
    {
        let event = Event::from_args(kind, args)?;
        Ok(self.publish_async(event).await)
    }

    fn settle(
        &self,
        delivery: &mut Delivery,
        subscription: &Subscription,
        kind: EventKind,
        outcome: HandlerOutcome,
    ) {
        let error = match outcome {
            Ok(Ok(())) => {
                delivery.delivered += 1;
                return;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        delivery.failed += 1;
        warn!(
            listener = %subscription.listener,
            kind = %kind,
            error = %error,
            "Event handler failed"
        );
        // No receivers is fine; the failure is already logged.
        let _ = self.inner.diagnostics.send(HandlerFailure {
            listener: subscription.listener.clone(),
            kind,
            error,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use chess_core::{MoveRecord, Position};

    use super::*;
    use crate::event::Identifier;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Handler {
        let log = log.clone();
        Handler::sync(move |_event| {
            log.lock().unwrap().push(label.to_string());
            Ok(())
        })
    }

    #[test]
    fn test_delivery_follows_registration_order() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.register("board", [(EventKind::GameLoaded, recorder(&log, "board"))]);
        hub.register(
            "notation",
            [(EventKind::GameLoaded, recorder(&log, "notation"))],
        );
        hub.register("engine", [(EventKind::GameLoaded, recorder(&log, "engine"))]);

        let delivery = hub.publish(Event::GameLoaded);
        assert_eq!(delivery.delivered, 3);
        assert_eq!(*log.lock().unwrap(), vec!["board", "notation", "engine"]);
        assert_eq!(
            hub.listeners(EventKind::GameLoaded),
            vec!["board", "notation", "engine"]
        );
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let hub = EventHub::new();
        let mut diagnostics = hub.subscribe_diagnostics();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.register(
            "broken",
            [(
                EventKind::GameLoaded,
                Handler::sync(|_| Err(anyhow::anyhow!("board not ready"))),
            )],
        );
        hub.register("board", [(EventKind::GameLoaded, recorder(&log, "board"))]);

        let delivery = hub.publish(Event::GameLoaded);
        assert_eq!(delivery, Delivery { delivered: 1, failed: 1, spawned: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["board"]);

        let failure = diagnostics.try_recv().unwrap();
        assert_eq!(failure.listener, "broken");
        assert_eq!(failure.kind, EventKind::GameLoaded);
        assert!(failure.error.contains("board not ready"));
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.register(
            "panicky",
            [(EventKind::GameLoaded, Handler::sync(|_| panic!("boom")))],
        );
        hub.register("after", [(EventKind::GameLoaded, recorder(&log, "after"))]);

        let delivery = hub.publish(Event::GameLoaded);
        assert_eq!(delivery.failed, 1);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_schema_violation_invokes_no_handler() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.register("board", [(EventKind::PositionChanged, recorder(&log, "board"))]);

        let err = hub
            .publish_named(
                EventKind::PositionChanged,
                [
                    ("position", ArgValue::from(Position::default())),
                    ("flipped", ArgValue::from(Identifier::new("yes"))),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, HubError::SchemaViolation { .. }));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_register_by_name_is_all_or_nothing() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = hub
            .register_by_name(
                "board",
                [
                    ("PositionChanged", recorder(&log, "a")),
                    ("BoardFlipped", recorder(&log, "b")),
                ],
            )
            .unwrap_err();
        assert_eq!(err, HubError::UnknownEventKind("BoardFlipped".into()));
        assert_eq!(hub.subscriber_count(EventKind::PositionChanged), 0);
    }

    #[test]
    fn test_sync_publish_without_runtime_reports_async_handlers() {
        let hub = EventHub::new();
        let mut diagnostics = hub.subscribe_diagnostics();
        hub.register(
            "engine",
            [(EventKind::GameLoaded, Handler::future(|_| async { Ok(()) }))],
        );

        let delivery = hub.publish(Event::GameLoaded);
        assert_eq!(delivery, Delivery { delivered: 0, failed: 1, spawned: 0 });
        let failure = diagnostics.try_recv().unwrap();
        assert_eq!(failure.listener, "engine");
        assert!(failure.error.contains("tokio runtime"));
    }

    #[tokio::test]
    async fn test_sync_publish_spawns_async_handlers_in_order() {
        let hub = EventHub::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for label in ["stop", "restart"] {
            let tx = tx.clone();
            hub.register(
                label,
                [(
                    EventKind::GameLoaded,
                    Handler::future(move |_| {
                        let tx = tx.clone();
                        async move {
                            tx.send(label)?;
                            Ok(())
                        }
                    }),
                )],
            );
        }

        let delivery = hub.publish(Event::GameLoaded);
        assert_eq!(delivery.spawned, 2);
        assert_eq!(delivery.invoked(), 2);
        assert_eq!(rx.recv().await, Some("stop"));
        assert_eq!(rx.recv().await, Some("restart"));
    }

    #[tokio::test]
    async fn test_publish_async_is_sequential() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slow_log = log.clone();
        hub.register(
            "engine-stop",
            [(
                EventKind::PositionChanged,
                Handler::future(move |_| {
                    let log = slow_log.clone();
                    async move {
                        log.lock().unwrap().push("stop:begin".to_string());
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        log.lock().unwrap().push("stop:end".to_string());
                        Ok(())
                    }
                }),
            )],
        );
        hub.register(
            "engine-start",
            [(EventKind::PositionChanged, recorder(&log, "start"))],
        );

        let delivery = hub
            .publish_async(Event::PositionChanged {
                position: Position::default(),
            })
            .await;
        assert_eq!(delivery.delivered, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["stop:begin", "stop:end", "start"]
        );
    }

    #[tokio::test]
    async fn test_async_failure_is_isolated() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.register(
            "broken",
            [(
                EventKind::MoveRecorded,
                Handler::future(|_| async { Err(anyhow::anyhow!("engine crashed")) }),
            )],
        );
        hub.register(
            "notation",
            [(EventKind::MoveRecorded, recorder(&log, "notation"))],
        );

        let delivery = hub
            .publish_named_async(
                EventKind::MoveRecorded,
                [("move", ArgValue::from(MoveRecord::from_uci("e2e4").unwrap()))],
            )
            .await
            .unwrap();
        assert_eq!(delivery, Delivery { delivered: 1, failed: 1, spawned: 0 });
        assert_eq!(*log.lock().unwrap(), vec!["notation"]);
    }

    #[test]
    fn test_handler_may_publish_reentrantly() {
        let hub = EventHub::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        hub.register(
            "history",
            [(EventKind::SearchCompleted, recorder(&log, "history"))],
        );

        let inner = hub.clone();
        hub.register(
            "relay",
            [(
                EventKind::GameLoaded,
                Handler::sync(move |_| {
                    inner.publish(Event::SearchCompleted {
                        result_ref: Identifier::new("r"),
                    });
                    Ok(())
                }),
            )],
        );
        assert_eq!(hub.publish(Event::GameLoaded).delivered, 1);
        assert_eq!(*log.lock().unwrap(), vec!["history"]);
    }
}
