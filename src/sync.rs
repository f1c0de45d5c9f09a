//! Hover synchronisation between charts sharing a group id.
//!
//! A [`ChartSyncService`] is owned by a dashboard session and cloned into
//! every chart of that session; there is no process-wide instance.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartId(Uuid);

impl ChartId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChartId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartMouseLeave {
    pub group_id: Option<String>,
    pub chart_id: Option<ChartId>,
}

struct Subscription<E> {
    group_id: String,
    chart_id: ChartId,
    tx: mpsc::UnboundedSender<E>,
}

impl<E: Clone> Subscription<E> {
    /// Delivers `event` when it belongs to this group and came from another
    /// chart. Returns false once the receiver is gone.
    fn offer(&self, group_id: Option<&str>, chart_id: Option<ChartId>, event: &E) -> bool {
        if self.tx.is_closed() {
            return false;
        }
        if group_id == Some(self.group_id.as_str()) && chart_id != Some(self.chart_id) {
            return self.tx.send(event.clone()).is_ok();
        }
        true
    }
}

struct Subscribers<T> {
    locations: Vec<Subscription<Vec<T>>>,
    leaves: Vec<Subscription<ChartMouseLeave>>,
}

pub struct ChartSyncService<T> {
    subscribers: Arc<RwLock<Subscribers<T>>>,
}

impl<T> Clone for ChartSyncService<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
        }
    }
}

impl<T: Clone + Send + 'static> Default for ChartSyncService<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> ChartSyncService<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Subscribers {
                locations: Vec::new(),
                leaves: Vec::new(),
            })),
        }
    }

    pub fn mouse_location_change(
        &self,
        location_data: Vec<T>,
        group_id: Option<&str>,
        chart_id: Option<ChartId>,
    ) {
        let mut subscribers = self.subscribers.write();
        subscribers
            .locations
            .retain(|subscription| subscription.offer(group_id, chart_id, &location_data));
        trace!(
            group = ?group_id,
            listeners = subscribers.locations.len(),
            "published chart location change"
        );
    }

    pub fn mouse_leave(&self, group_id: Option<&str>, chart_id: Option<ChartId>) {
        let event = ChartMouseLeave {
            group_id: group_id.map(str::to_string),
            chart_id,
        };
        self.subscribers
            .write()
            .leaves
            .retain(|subscription| subscription.offer(group_id, chart_id, &event));
    }

    /// Location changes published by other charts of `group_id`.
    pub fn location_changes_for_group(
        &self,
        group_id: &str,
        chart_id: ChartId,
    ) -> mpsc::UnboundedReceiver<Vec<T>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().locations.push(Subscription {
            group_id: group_id.to_string(),
            chart_id,
            tx,
        });
        rx
    }

    /// Mouse-leave events published by other charts of `group_id`.
    pub fn mouse_leave_for_group(
        &self,
        group_id: &str,
        chart_id: ChartId,
    ) -> mpsc::UnboundedReceiver<ChartMouseLeave> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().leaves.push(Subscription {
            group_id: group_id.to_string(),
            chart_id,
            tx,
        });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        let subscribers = self.subscribers.read();
        subscribers.locations.len() + subscribers.leaves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_other_charts_in_group_receive_locations() {
        let service: ChartSyncService<f64> = ChartSyncService::new();
        let (left, right, elsewhere) = (ChartId::new(), ChartId::new(), ChartId::new());

        let mut left_rx = service.location_changes_for_group("latency", left);
        let mut right_rx = service.location_changes_for_group("latency", right);
        let mut other_rx = service.location_changes_for_group("errors", elsewhere);

        service.mouse_location_change(vec![1.5], Some("latency"), Some(left));

        assert_eq!(right_rx.recv().await, Some(vec![1.5]));
        assert!(left_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn test_ungrouped_events_reach_nobody() {
        let service: ChartSyncService<u32> = ChartSyncService::new();
        let mut rx = service.location_changes_for_group("g", ChartId::new());

        service.mouse_location_change(vec![1], None, None);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mouse_leave_carries_origin() {
        let service: ChartSyncService<u32> = ChartSyncService::new();
        let origin = ChartId::new();
        let mut rx = service.mouse_leave_for_group("g", ChartId::new());

        service.mouse_leave(Some("g"), Some(origin));

        let event = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(event.group_id.as_deref(), Some("g"));
        assert_eq!(event.chart_id, Some(origin));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let service: ChartSyncService<u32> = ChartSyncService::new();
        let kept = service.location_changes_for_group("g", ChartId::new());
        drop(service.location_changes_for_group("g", ChartId::new()));
        assert_eq!(service.subscriber_count(), 2);

        service.clone().mouse_location_change(vec![7], Some("g"), Some(ChartId::new()));

        assert_eq!(service.subscriber_count(), 1);
        drop(kept);
    }
}
