use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BranchId, ReservationEvent};
use crate::ports::EventSink;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for reservation lifecycle events, one channel per branch.
pub struct NotifyHub {
    channels: DashMap<BranchId, broadcast::Sender<ReservationEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a branch's events. Creates the channel if needed.
    pub fn subscribe(&self, branch_id: BranchId) -> broadcast::Receiver<ReservationEvent> {
        self.channels
            .entry(branch_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, event: &ReservationEvent) {
        if let Some(sender) = self.channels.get(&event.branch_id) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, branch_id: &BranchId) {
        self.channels.remove(branch_id);
    }
}

impl EventSink for NotifyHub {
    fn publish(&self, event: &ReservationEvent) {
        self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::Utc;

    fn confirmed_event(branch_id: BranchId) -> ReservationEvent {
        ReservationEvent {
            reservation_id: ReservationId::new(),
            tenant_id: TenantId::new(),
            branch_id,
            table_id: TableId::new(),
            occurred_at: Utc::now(),
            kind: ReservationEventKind::Confirmed,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let branch = BranchId::new();
        let mut rx = hub.subscribe(branch);

        let event = confirmed_event(branch);
        hub.publish(&event);

        assert_eq!(rx.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn other_branch_not_delivered() {
        let hub = NotifyHub::new();
        let mine = BranchId::new();
        let mut rx = hub.subscribe(mine);

        hub.send(&confirmed_event(BranchId::new()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&confirmed_event(BranchId::new()));
        hub.remove(&BranchId::new());
    }
}
