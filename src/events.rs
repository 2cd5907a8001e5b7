//! One-shot event subscriptions
//!
//! A session subscribes once to its result event and once to the shared
//! error event. Each subscription removes itself the first time it matches,
//! so nothing has to be unsubscribed by hand.

use serde_json::Value;

use crate::transport::InboundEvent;

/// Which reply a subscription stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Result,
    Error,
}

#[derive(Debug)]
struct Subscription {
    event: String,
    channel: Channel,
}

/// Active one-shot subscriptions, matched in subscription order.
#[derive(Debug, Default)]
pub struct Subscriptions {
    active: Vec<Subscription>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the next occurrence of `event`.
    pub fn subscribe_once(&mut self, event: impl Into<String>, channel: Channel) {
        self.active.push(Subscription {
            event: event.into(),
            channel,
        });
    }

    /// Route an inbound event. Returns the channel and payload if a
    /// subscription matched; the matching subscription is removed.
    pub fn dispatch(&mut self, event: InboundEvent) -> Option<(Channel, Value)> {
        let idx = self.active.iter().position(|s| s.event == event.name)?;
        let subscription = self.active.remove(idx);
        Some((subscription.channel, event.payload))
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn clear(&mut self) {
        self.active.clear();
    }
}
