//! Process-wide publish/subscribe channel.
//!
//! The bus is the engine's single serialization point for asynchronous
//! completions: asset loads finish whenever they finish, but their effects are
//! only observable when `update` drains the queue inside the frame tick.
//! `post` never dispatches synchronously.
//!
//! Subscriptions are non-owning (`Weak`); a subscriber that is dropped simply
//! stops receiving messages and its slot is pruned on the next `update`. This
//! is deliberate: zone teardown drops the zone's sprites and their
//! subscriptions die with them, so repeated zone reloads cannot accumulate
//! dangling handlers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::assets::AssetPayload;

#[derive(Debug, Clone)]
pub enum MessageContext {
    None,
    AssetLoaded {
        key: String,
        payload: Arc<AssetPayload>,
    },
    Pointer {
        x: f32,
        y: f32,
    },
    Zone {
        id: u32,
    },
}

#[derive(Debug, Clone)]
pub struct Message {
    pub code: String,
    pub context: MessageContext,
}

/// Capability interface for message subscribers. The bus hands the handler a
/// mutable reference to itself so reactions may subscribe or post further
/// messages; anything posted during delivery is delivered on the *next*
/// `update`, never recursively.
pub trait MessageHandler {
    fn on_message(&mut self, message: &Message, bus: &mut MessageBus) -> Result<(), String>;
}

pub type HandlerRef = Rc<RefCell<dyn MessageHandler>>;
pub type HandlerWeak = Weak<RefCell<dyn MessageHandler>>;

#[derive(Default)]
pub struct MessageBus {
    subscriptions: HashMap<String, Vec<HandlerWeak>>,
    queue: Vec<Message>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a code. Multiple handlers per code are allowed
    /// and delivery happens in subscription order.
    pub fn subscribe(&mut self, code: &str, handler: HandlerWeak) {
        self.subscriptions
            .entry(code.to_string())
            .or_default()
            .push(handler);
    }

    /// Drop every subscription for a code. Used by one-shot listeners (the
    /// zone loader) once their message has arrived.
    pub fn remove_code(&mut self, code: &str) {
        self.subscriptions.remove(code);
    }

    /// Enqueue a message for delivery at the next `update`.
    pub fn post(&mut self, code: &str, context: MessageContext) {
        self.queue.push(Message {
            code: code.to_string(),
            context,
        });
    }

    /// Deliver all queued messages, in enqueue order, to each code's handlers
    /// in subscription order. The queue is cleared afterwards. A handler error
    /// aborts delivery and propagates to the tick that called `update`.
    pub fn update(&mut self, _dt: f64) -> Result<(), String> {
        let pending = std::mem::take(&mut self.queue);
        for message in pending {
            let handlers = match self.subscriptions.get(&message.code) {
                Some(list) => list.clone(),
                None => continue,
            };
            for weak in handlers {
                if let Some(handler) = weak.upgrade() {
                    handler.borrow_mut().on_message(&message, self)?;
                }
            }
        }
        self.prune_dead();
        Ok(())
    }

    /// Live subscriber count for a code.
    pub fn subscriber_count(&self, code: &str) -> usize {
        self.subscriptions
            .get(code)
            .map(|list| list.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    pub fn queued_count(&self) -> usize {
        self.queue.len()
    }

    fn prune_dead(&mut self) {
        self.subscriptions.retain(|_, list| {
            list.retain(|weak| weak.strong_count() > 0);
            !list.is_empty()
        });
    }
}
