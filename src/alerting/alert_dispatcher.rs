use std::collections::HashMap;
use std::sync::Mutex;

use log::{debug, info};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sending half of a user's notification channel.
///
/// Each channel carries a fresh id so a transport that closes late can only
/// unregister itself, never the channel that replaced it.
#[derive(Debug, Clone)]
pub struct AlertChannel {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl AlertChannel {
    /// Creates a channel and the receiver the transport drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Outcome of [`AlertDispatcher::send`]. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    /// No channel is registered for the user.
    NoRecipient,
    /// The registered channel was already closed; it has been dropped.
    ChannelClosed,
}

#[derive(Default)]
pub struct AlertDispatcher {
    channels: Mutex<HashMap<String, AlertChannel>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `channel` for `user_id`, replacing any previous one.
    pub fn register(&self, user_id: &str, channel: AlertChannel) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let replaced = channels.insert(user_id.to_string(), channel);
        match replaced {
            Some(old) => info!("Alert channel for user {} replaced (was {})", user_id, old.id),
            None => info!("Alert channel registered for user {}", user_id),
        }
    }

    /// Removes the user's channel only if it is still `channel_id`.
    pub fn unregister(&self, user_id: &str, channel_id: Uuid) -> bool {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels.get(user_id).is_some_and(|c| c.id == channel_id) {
            channels.remove(user_id);
            info!("Alert channel unregistered for user {}", user_id);
            true
        } else {
            debug!(
                "Ignoring unregister of stale channel {} for user {}",
                channel_id, user_id
            );
            false
        }
    }

    pub fn send(&self, user_id: &str, message: &str) -> DeliveryStatus {
        let channel = {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.get(user_id).cloned()
        };
        let Some(channel) = channel else {
            debug!("No alert channel for user {}, dropping alert", user_id);
            return DeliveryStatus::NoRecipient;
        };

        if channel.tx.send(message.to_string()).is_ok() {
            debug!("Alert delivered to user {}", user_id);
            return DeliveryStatus::Delivered;
        }
        self.unregister(user_id, channel.id);
        DeliveryStatus::ChannelClosed
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
