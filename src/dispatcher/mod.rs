//! Dispatcher - Binds triggers to handlers and owns the scheduling loop
//!
//! ```text
//! DispatcherBuilder ──add_handler()──► [on_interval | on_event]*
//!        │
//!        └─build()──► Dispatcher (running) ──stop()──► stopped
//!                        ├─ one timer task per interval handler
//!                        └─ sealed subscriber list per event
//! ```
//!
//! Every handler run is a separate tokio task. A timer keeps its cadence no
//! matter how long the previous run takes, and handler errors or panics are
//! logged without reaching the dispatcher.

mod event;

pub use event::{create_event, Event};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use event::EventHandler;

/// Boxed handler execution
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

type IntervalHandler = Arc<dyn Fn() -> HandlerFuture + Send + Sync>;

/// Timer trigger configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalConfig {
    pub interval: Duration,
    /// Fire once at start instead of waiting a full interval
    pub immediately: bool,
}

impl IntervalConfig {
    pub fn new(interval: Duration, immediately: bool) -> Self {
        Self {
            interval,
            immediately,
        }
    }
}

/// Side effects collected while the builder activates its handlers
#[derive(Default)]
struct Activation {
    timers: Vec<JoinHandle<()>>,
    seals: Vec<Box<dyn FnOnce() + Send>>,
}

trait Trigger: Send {
    fn attach(self: Box<Self>, label: Arc<str>, activation: &mut Activation);
}

struct OnInterval {
    config: IntervalConfig,
    handler: IntervalHandler,
}

impl Trigger for OnInterval {
    fn attach(self: Box<Self>, label: Arc<str>, activation: &mut Activation) {
        let OnInterval { config, handler } = *self;
        let period = config.interval.max(Duration::from_millis(1));
        let now = Instant::now();
        let start = if config.immediately {
            now
        } else {
            now.checked_add(period).unwrap_or_else(|| {
                tracing::warn!(handler = %label, ?period, "interval out of range, firing now");
                now
            })
        };

        let timer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let h = Arc::clone(&handler);
                match std::panic::catch_unwind(AssertUnwindSafe(move || h())) {
                    Ok(fut) => {
                        spawn_handler(Arc::clone(&label), fut);
                    }
                    Err(_) => tracing::error!(handler = %label, "handler panicked on invocation"),
                }
            }
        });
        activation.timers.push(timer);
    }
}

struct OnEvent<T> {
    event: Event<T>,
    handler: EventHandler<T>,
}

impl<T: Send + 'static> Trigger for OnEvent<T> {
    fn attach(self: Box<Self>, label: Arc<str>, activation: &mut Activation) {
        let OnEvent { event, handler } = *self;
        event.subscribe(label, handler);
        activation.seals.push(Box::new(move || event.seal()));
    }
}

/// One trigger bound to one handler
pub struct DispatchHandler {
    label: String,
    trigger: Box<dyn Trigger>,
}

impl DispatchHandler {
    /// Name used in logs for this handler's runs
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for DispatchHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandler")
            .field("label", &self.label)
            .finish()
    }
}

/// Run `handler` every `config.interval`
pub fn on_interval<F, Fut>(config: IntervalConfig, handler: F) -> DispatchHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    DispatchHandler {
        label: format!("interval({:?})", config.interval),
        trigger: Box::new(OnInterval {
            config,
            handler: Arc::new(move || handler().boxed()),
        }),
    }
}

/// Run `handler` for every value emitted on `event`
pub fn on_event<T, F, Fut>(event: &Event<T>, handler: F) -> DispatchHandler
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    DispatchHandler {
        label: format!("event({})", event.name()),
        trigger: Box::new(OnEvent {
            event: event.clone(),
            handler: Arc::new(move |value| handler(value).boxed()),
        }),
    }
}

/// Spawn one handler run, logging its error or panic
pub(crate) fn spawn_handler(label: Arc<str>, fut: HandlerFuture) -> JoinHandle<()> {
    tokio::spawn(async move {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(handler = %label, error = %e, "handler failed"),
            Err(_) => tracing::error!(handler = %label, "handler panicked"),
        }
    })
}

/// Collects handlers before the run loop starts
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    handlers: Vec<DispatchHandler>,
}

/// Start building a dispatcher
pub fn builder() -> DispatcherBuilder {
    DispatcherBuilder::default()
}

impl DispatcherBuilder {
    pub fn add_handler(mut self, handler: DispatchHandler) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Start every timer and seal every event. Must run inside a tokio runtime.
    pub fn build(self) -> Dispatcher {
        let mut activation = Activation::default();
        let labels: Vec<String> = self.handlers.iter().map(|h| h.label.clone()).collect();

        for handler in self.handlers {
            let label: Arc<str> = Arc::from(handler.label.as_str());
            handler.trigger.attach(label, &mut activation);
        }
        for seal in activation.seals {
            seal();
        }

        tracing::info!(handlers = ?labels, "dispatcher running");
        Dispatcher {
            timers: activation.timers,
            labels,
        }
    }
}

/// Running dispatcher. Dropping it leaves timers running until process exit.
#[derive(Debug)]
pub struct Dispatcher {
    timers: Vec<JoinHandle<()>>,
    labels: Vec<String>,
}

impl Dispatcher {
    pub fn handler_labels(&self) -> &[String] {
        &self.labels
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Stop all timers. Handler runs already in flight finish on their own.
    pub fn stop(self) {
        for timer in &self.timers {
            timer.abort();
        }
        tracing::info!("dispatcher stopped");
    }
}
