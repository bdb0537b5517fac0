//! Progress notifications for process acquisition and injection.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectionEvent {
    LaunchingProcess,
    InjectingIntoProcess,
    InjectionComplete,
    InjectionException(String),
}

impl fmt::Display for InjectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionEvent::LaunchingProcess => f.write_str("Launching process"),
            InjectionEvent::InjectingIntoProcess => f.write_str("Injecting into process"),
            InjectionEvent::InjectionComplete => f.write_str("Injection complete"),
            InjectionEvent::InjectionException(message) => write!(f, "Injection error: {}", message),
        }
    }
}

/// Receives acquisition events. Calls are fire-and-forget.
pub trait InjectionObserver: Send + Sync {
    fn on_event(&self, event: &InjectionEvent);

    /// A fatal failure the user must acknowledge. Implementations may block.
    fn on_alert(&self, _title: &str, _message: &str) {}
}

/// Zero or more observers, owned by whoever runs the acquisition.
#[derive(Clone, Default)]
pub struct Notifier {
    observers: Vec<Arc<dyn InjectionObserver>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn InjectionObserver>) {
        self.observers.push(observer);
    }

    pub fn with(mut self, observer: Arc<dyn InjectionObserver>) -> Self {
        self.subscribe(observer);
        self
    }

    pub fn emit(&self, event: InjectionEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }

    pub fn exception(&self, message: impl Into<String>) {
        self.emit(InjectionEvent::InjectionException(message.into()));
    }

    pub fn alert(&self, title: &str, message: &str) {
        for observer in &self.observers {
            observer.on_alert(title, message);
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl InjectionObserver for TracingObserver {
    fn on_event(&self, event: &InjectionEvent) {
        match event {
            InjectionEvent::InjectionException(message) => warn!("{}", message),
            other => info!("{}", other),
        }
    }

    fn on_alert(&self, title: &str, message: &str) {
        error!("{}: {}", title, message);
    }
}

/// Forwards events to a channel the caller awaits on. A closed receiver is
/// ignored.
impl InjectionObserver for UnboundedSender<InjectionEvent> {
    fn on_event(&self, event: &InjectionEvent) {
        let _ = self.send(event.clone());
    }
}
