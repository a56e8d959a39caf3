use tokio::sync::broadcast;

use crate::server::ingest::DeviceRecord;

/// Decided once at handshake and never changed without reconnecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Device(String),
    Admin,
}

impl Membership {
    pub fn wants(&self, event: &DeviceRecord) -> bool {
        match self {
            Membership::Admin => true,
            Membership::Device(id) => id == &event.user_id,
        }
    }
}

/// Fire-and-forget fan-out of accepted samples. One broadcast channel;
/// each connection filters by its membership. Slow observers lag and drop
/// rather than blocking ingestion.
#[derive(Clone)]
pub struct Hub {
    tx: broadcast::Sender<DeviceRecord>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Hub { tx }
    }

    pub fn publish(&self, event: DeviceRecord) {
        // No receivers is fine; nobody is watching.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceRecord> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(user_id: &str) -> DeviceRecord {
        DeviceRecord {
            user_id: user_id.to_string(),
            lat: 0.0,
            lon: 0.0,
            ts: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn admin_sees_every_device() {
        let hub = Hub::new(16);
        let mut rx = hub.subscribe();
        let membership = Membership::Admin;

        hub.publish(event("a"));
        hub.publish(event("b"));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(membership.wants(&first));
        assert!(membership.wants(&second));
        assert_eq!(first.user_id, "a");
        assert_eq!(second.user_id, "b");
    }

    #[tokio::test]
    async fn events_published_after_subscribe_are_queued_until_read() {
        let hub = Hub::new(16);
        let mut rx = hub.subscribe();

        // Simulates the socket path where a snapshot is assembled between
        // subscribing and the first recv: nothing published after the
        // subscribe may be dropped.
        hub.publish(event("between"));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.user_id, "between");
    }

    #[tokio::test]
    async fn device_membership_filters_other_devices() {
        let hub = Hub::new(16);
        let mut rx = hub.subscribe();
        let membership = Membership::Device("a".to_string());

        hub.publish(event("a"));
        hub.publish(event("b"));

        let mut delivered = Vec::new();
        for _ in 0..2 {
            let ev = rx.recv().await.unwrap();
            if membership.wants(&ev) {
                delivered.push(ev.user_id);
            }
        }
        assert_eq!(delivered, vec!["a".to_string()]);
    }

    #[test]
    fn publish_without_subscribers_is_a_no_op() {
        let hub = Hub::new(16);
        hub.publish(event("a"));
    }
}
