use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for ledger change feeds, one channel per calendar date.
/// The booking lifecycle publishes here; SSE subscribers listen.
pub struct NotifyHub {
    channels: DashMap<NaiveDate, broadcast::Sender<Event>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to ledger changes for a date. Creates the channel if needed.
    pub fn subscribe(&self, date: NaiveDate) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(date)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, date: NaiveDate, event: &Event) {
        if let Some(sender) = self.channels.get(&date) {
            let _ = sender.send(event.clone());
        }
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let date = NaiveDate::from_ymd_opt(2031, 5, 10).unwrap();
        let mut rx = hub.subscribe(date);

        let event = Event::BookingConfirmed {
            id: Ulid::new(),
            date,
        };
        hub.send(date, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let date = NaiveDate::from_ymd_opt(2031, 5, 10).unwrap();
        // No subscriber — should not panic
        hub.send(date, &Event::BookingCancelled { id: Ulid::new(), date });
    }

    #[tokio::test]
    async fn dates_are_isolated() {
        let hub = NotifyHub::new();
        let watched = NaiveDate::from_ymd_opt(2031, 5, 10).unwrap();
        let other = NaiveDate::from_ymd_opt(2031, 5, 11).unwrap();
        let mut rx = hub.subscribe(watched);

        hub.send(other, &Event::BookingCancelled { id: Ulid::new(), date: other });
        assert!(rx.try_recv().is_err());
    }
}
