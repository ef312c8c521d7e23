//! Single-subscriber event slots.
//!
//! Each slot forwards published events to at most one subscriber over a
//! `crossbeam-channel`. Subscribing again replaces the previous subscriber.
//! Unsubscribing with a stale [`Subscription`] leaves the newer subscriber in
//! place, and a subscriber that dropped its receiver is cleared on the next
//! publish.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::time::Duration;

pub struct EventSlot<T> {
    subscriber: Option<(u64, Sender<T>)>,
    next_token: u64,
}

/// Receiving end handed out by [`EventSlot::subscribe`]
pub struct Subscription<T> {
    token: u64,
    receiver: Receiver<T>,
}

impl<T> Default for EventSlot<T> {
    fn default() -> Self {
        Self {
            subscriber: None,
            next_token: 0,
        }
    }
}

impl<T> EventSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Subscription<T> {
        let (sender, receiver) = unbounded();
        self.next_token += 1;
        self.subscriber = Some((self.next_token, sender));
        Subscription {
            token: self.next_token,
            receiver,
        }
    }

    /// Remove `subscription` if it is still the active one
    pub fn unsubscribe(&mut self, subscription: &Subscription<T>) -> bool {
        match &self.subscriber {
            Some((token, _)) if *token == subscription.token => {
                self.subscriber = None;
                true
            }
            _ => false,
        }
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Deliver `event` to the subscriber, if any. Returns whether it was delivered.
    pub fn publish(&mut self, event: T) -> bool {
        let Some((_, sender)) = &self.subscriber else {
            return false;
        };
        if sender.send(event).is_err() {
            log::debug!("Subscriber went away, clearing slot");
            self.subscriber = None;
            return false;
        }
        true
    }
}

impl<T> Subscription<T> {
    pub fn try_recv(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block until an event arrives or the slot drops this subscriber
    pub fn recv(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Everything queued so far, without blocking
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.receiver.iter()
    }

    /// For waiting on several subscriptions with `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }
}
