//! Notifier that keeps what it receives

use parking_lot::Mutex;
use procgov::daemon::notify::{Notification, Notifier};

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    received: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications in arrival order
    pub fn received(&self) -> Vec<Notification> {
        self.received.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.received.lock().push(notification);
    }
}
