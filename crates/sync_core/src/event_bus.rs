//! Subscription routing between the push feed and the engine components.

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::Cid,
    event::{ChatEvent, EventKind},
};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventSource {
    Global,
    Channel(Cid),
}

impl EventSource {
    fn accepts(&self, event: &ChatEvent) -> bool {
        match self {
            EventSource::Global => true,
            EventSource::Channel(cid) => event.target_cid().as_ref() == Some(cid),
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Global => f.write_str("global"),
            EventSource::Channel(cid) => write!(f, "channel:{cid}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    Kind(EventKind),
    All,
}

impl EventFilter {
    fn accepts(&self, event: &ChatEvent) -> bool {
        match self {
            EventFilter::Kind(kind) => &event.kind == kind,
            EventFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

#[derive(Debug, Clone)]
pub struct Delivery {
    pub token: SubscriptionToken,
    pub source: EventSource,
    pub event: ChatEvent,
}

pub type EventSink = mpsc::UnboundedSender<Delivery>;

struct Subscription {
    source: EventSource,
    filter: EventFilter,
    sink: EventSink,
}

#[derive(Default)]
struct BusState {
    next_token: u64,
    subscriptions: BTreeMap<SubscriptionToken, Subscription>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    state: Arc<Mutex<BusState>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(
        &self,
        source: EventSource,
        filter: EventFilter,
        sink: EventSink,
    ) -> SubscriptionToken {
        let mut state = self.lock();
        state.next_token += 1;
        let token = SubscriptionToken(state.next_token);
        debug!(?token, %source, ?filter, "bus: subscribed");
        state.subscriptions.insert(
            token,
            Subscription {
                source,
                filter,
                sink,
            },
        );
        token
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self.lock().subscriptions.remove(&token).is_some();
        if removed {
            debug!(?token, "bus: unsubscribed");
        }
        removed
    }

    pub fn publish(&self, event: &ChatEvent) -> usize {
        let mut state = self.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();
        for (token, subscription) in &state.subscriptions {
            if !subscription.source.accepts(event) || !subscription.filter.accepts(event) {
                continue;
            }
            let delivery = Delivery {
                token: *token,
                source: subscription.source.clone(),
                event: event.clone(),
            };
            if subscription.sink.send(delivery).is_ok() {
                delivered += 1;
            } else {
                closed.push(*token);
            }
        }
        for token in closed {
            state.subscriptions.remove(&token);
        }
        debug!(kind = %event.kind, delivered, "bus: published");
        delivered
    }

    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    pub fn scope(&self) -> EventScope {
        EventScope::new(self.clone())
    }
}

/// A set of subscriptions sharing one delivery queue. Tearing the scope down
/// removes every subscription it made and discards anything still queued.
pub struct EventScope {
    bus: EventBus,
    tokens: Vec<SubscriptionToken>,
    tx: EventSink,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl EventScope {
    fn new(bus: EventBus) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            bus,
            tokens: Vec::new(),
            tx,
            rx,
        }
    }

    pub fn subscribe(&mut self, source: EventSource, filter: EventFilter) -> SubscriptionToken {
        let token = self.bus.subscribe(source, filter, self.tx.clone());
        self.tokens.push(token);
        token
    }

    pub fn subscribe_kinds(
        &mut self,
        source: &EventSource,
        kinds: &[EventKind],
    ) -> Vec<SubscriptionToken> {
        kinds
            .iter()
            .map(|kind| self.subscribe(source.clone(), EventFilter::Kind(kind.clone())))
            .collect()
    }

    pub fn unsubscribe(&mut self, token: SubscriptionToken) {
        self.tokens.retain(|owned| *owned != token);
        self.bus.unsubscribe(token);
    }

    pub fn is_subscribed(&self, token: SubscriptionToken) -> bool {
        self.tokens.contains(&token)
    }

    pub fn subscription_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn teardown(&mut self) {
        for token in self.tokens.drain(..) {
            self.bus.unsubscribe(token);
        }
        while self.rx.try_recv().is_ok() {}
    }

    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

impl Drop for EventScope {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
