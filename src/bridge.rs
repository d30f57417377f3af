use rotation_model::StateNotification;
use tokio::sync::broadcast;
use tracing::trace;

/// Fire-and-forget fan-out of state notifications to presentation layers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<StateNotification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, notification: StateNotification) {
        let tag = notification.trigger_tag;
        match self.tx.send(notification) {
            Ok(listeners) => trace!(?tag, listeners, "state notification sent"),
            Err(_) => trace!(?tag, "state notification dropped; no listeners"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateNotification> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotation_model::NotificationTag;
    use std::path::PathBuf;

    fn notification(tag: NotificationTag) -> StateNotification {
        StateNotification {
            current_image_path: None,
            interval_seconds: "300".into(),
            target_mode: 1,
            placement_mode: 2,
            folder_path: PathBuf::from("/pics"),
            trigger_tag: tag,
        }
    }

    #[test]
    fn publish_without_listeners_is_silent() {
        Notifier::new(4).publish(notification(NotificationTag::ChangeWallpaper));
    }

    #[test]
    fn every_subscriber_sees_each_notification() {
        let notifier = Notifier::new(4);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();
        notifier.publish(notification(NotificationTag::ChangeConf));
        assert_eq!(first.try_recv().unwrap().trigger_tag, NotificationTag::ChangeConf);
        assert_eq!(second.try_recv().unwrap().trigger_tag, NotificationTag::ChangeConf);
    }
}
