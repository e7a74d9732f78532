//! User-facing notification sinks.

use bulsho_shared::types::{Notification, NotificationLevel};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Receives semantic notifications. Rendering them is the receiver's concern.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications over an unbounded channel, e.g. to a UI task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        // A closed receiver means nobody is listening anymore.
        let _ = self.sender.send(notification);
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => error!(message = %notification.message, "Notification"),
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(level = ?notification.level, message = %notification.message, "Notification")
            }
        }
    }
}
