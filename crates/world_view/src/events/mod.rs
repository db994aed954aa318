//! Event bus with ordered subscribers
//!
//! - Subscribers are notified in registration order
//! - Immediate delivery with [`EventBus::publish`], queued delivery with
//!   [`EventBus::post`] + [`EventBus::dispatch`] (any thread may post, the
//!   owning thread dispatches)
//! - Fault isolation: a subscriber that fails or panics is logged and the
//!   remaining subscribers still receive the event

use crate::model::EntityId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

/// Failure returned by a subscriber
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    /// Create an error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receiver of events of type `E`
pub trait Subscriber<E>: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &E) -> Result<(), SubscriberError>;
}

impl<E, F> Subscriber<E> for F
where
    F: Fn(&E) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_event(&self, event: &E) -> Result<(), SubscriberError> {
        self(event)
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of delivering one event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Subscribers that handled the event
    pub delivered: usize,
    /// Subscribers that returned an error or panicked
    pub failed: usize,
}

struct Registration<E> {
    id: SubscriptionId,
    name: String,
    subscriber: Arc<dyn Subscriber<E>>,
}

/// Multicast event bus
pub struct EventBus<E> {
    name: &'static str,
    subscribers: RwLock<Vec<Registration<E>>>,
    queue: Mutex<Vec<E>>,
    next_id: AtomicU64,
}

impl<E> EventBus<E> {
    /// Create a bus; `name` appears in log messages
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: RwLock::new(Vec::new()),
            queue: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a subscriber
    pub fn subscribe(&self, name: impl Into<String>, subscriber: Arc<dyn Subscriber<E>>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                id,
                name: name.into(),
                subscriber,
            });
        id
    }

    /// Remove a subscriber; returns `false` if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        subscribers.retain(|registration| registration.id != id);
        subscribers.len() < before
    }

    /// Number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver an event to every subscriber now
    pub fn publish(&self, event: &E) -> DeliveryReport {
        let subscribers: Vec<(String, Arc<dyn Subscriber<E>>)> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|registration| (registration.name.clone(), registration.subscriber.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        for (name, subscriber) in subscribers {
            match catch_unwind(AssertUnwindSafe(|| subscriber.on_event(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    log::warn!("{} subscriber '{}' failed: {}", self.name, name, e);
                    report.failed += 1;
                }
                Err(_) => {
                    log::error!("{} subscriber '{}' panicked", self.name, name);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Queue an event for the next [`Self::dispatch`]
    pub fn post(&self, event: E) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }

    /// Deliver all queued events in posting order; returns how many
    pub fn dispatch(&self) -> usize {
        let events = std::mem::take(&mut *self.queue.lock().unwrap_or_else(PoisonError::into_inner));
        for event in &events {
            self.publish(event);
        }
        events.len()
    }

    /// Number of queued events
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Editing tool selected in the surrounding UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    /// Select and move entities
    Select,
    /// Navigate the viewpoint
    Navigate,
    /// Place an item from a catalog
    Place(String),
    /// Any other tool, by name
    Other(String),
}

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// The current tool changed
    ToolChanged(Tool),
    /// The current selection changed
    SelectionChanged(Vec<EntityId>),
}
