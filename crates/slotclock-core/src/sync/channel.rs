use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::transport::{SyncMessage, SyncTransport};
use crate::timer::TimerState;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Best-effort timer state propagation between instances.
///
/// Not authoritative: whatever arrives last is adopted as-is. There is no
/// ordering, clock or conflict detection.
#[derive(Debug, Clone)]
pub struct SyncChannel {
    origin: Uuid,
    transport: Arc<dyn SyncTransport>,
    reconnect_delay: Duration,
}

impl SyncChannel {
    pub fn new(transport: Arc<dyn SyncTransport>) -> Self {
        Self {
            origin: Uuid::new_v4(),
            transport,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// Fire and forget. Failures are logged and dropped.
    pub fn broadcast(&self, state: &TimerState) {
        let message = SyncMessage {
            origin: self.origin,
            state: state.clone(),
        };
        if let Err(e) = self.transport.publish(message) {
            tracing::debug!(error = %e, "sync broadcast dropped");
        }
    }

    /// Run `handler` for every message from another instance.
    ///
    /// Whenever the subscription closes or cannot be opened, waits the
    /// reconnect delay and tries again, with no limit. Must be called from
    /// within a Tokio runtime.
    pub fn on_receive<F>(&self, mut handler: F) -> SyncListener
    where
        F: FnMut(SyncMessage) + Send + 'static,
    {
        let origin = self.origin;
        let transport = Arc::clone(&self.transport);
        let delay = self.reconnect_delay;

        let handle = tokio::spawn(async move {
            loop {
                match transport.subscribe() {
                    Ok(mut rx) => loop {
                        match rx.recv().await {
                            Ok(message) if message.origin == origin => {}
                            Ok(message) => handler(message),
                            Err(RecvError::Lagged(skipped)) => {
                                tracing::debug!(skipped, "sync receiver lagged");
                            }
                            Err(RecvError::Closed) => {
                                tracing::debug!("sync channel closed, reconnecting");
                                break;
                            }
                        }
                    },
                    Err(e) => tracing::debug!(error = %e, "sync channel unavailable"),
                }
                tokio::time::sleep(delay).await;
            }
        });

        SyncListener {
            handle: Some(handle),
        }
    }
}

/// Receiving side of a [`SyncChannel`]. Stops on `cancel` or drop.
#[derive(Debug)]
pub struct SyncListener {
    handle: Option<JoinHandle<()>>,
}

impl SyncListener {
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for SyncListener {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::LocalBus;
    use crate::timer::TimerMode;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn state(remaining_seconds: u64) -> TimerState {
        TimerState {
            remaining_seconds,
            mode: TimerMode::Working,
            is_active: true,
            last_persisted_at: Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap(),
        }
    }

    fn collector() -> (Arc<Mutex<Vec<u64>>>, impl FnMut(SyncMessage) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |m: SyncMessage| {
            sink.lock().unwrap().push(m.state.remaining_seconds)
        })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_to_other_instances_only() {
        let bus = Arc::new(LocalBus::new());
        let a = SyncChannel::new(bus.clone());
        let b = SyncChannel::new(bus.clone());
        let (seen_a, handler_a) = collector();
        let (seen_b, handler_b) = collector();
        let _la = a.on_receive(handler_a);
        let _lb = b.on_receive(handler_b);
        settle().await;

        a.broadcast(&state(100));
        settle().await;

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec![100]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_close() {
        let bus = Arc::new(LocalBus::new());
        let a = SyncChannel::new(bus.clone());
        let b = SyncChannel::new(bus.clone());
        let (seen, handler) = collector();
        let _listener = b.on_receive(handler);
        settle().await;

        a.broadcast(&state(1));
        settle().await;

        bus.close();
        settle().await;
        // Nobody is subscribed during the reconnect delay; this one is lost.
        a.broadcast(&state(2));

        tokio::time::sleep(DEFAULT_RECONNECT_DELAY).await;
        a.broadcast(&state(3));
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_retrying_while_offline() {
        let bus = Arc::new(LocalBus::new());
        let a = SyncChannel::new(bus.clone());
        let b = SyncChannel::new(bus.clone());
        bus.set_offline(true);
        let (seen, handler) = collector();
        let _listener = b.on_receive(handler);

        tokio::time::sleep(Duration::from_secs(10)).await;
        a.broadcast(&state(5));
        assert!(seen.lock().unwrap().is_empty());

        bus.set_offline(false);
        tokio::time::sleep(DEFAULT_RECONNECT_DELAY + Duration::from_millis(10)).await;
        a.broadcast(&state(6));
        settle().await;
        assert_eq!(*seen.lock().unwrap(), vec![6]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_listener_stops_receiving() {
        let bus = Arc::new(LocalBus::new());
        let a = SyncChannel::new(bus.clone());
        let b = SyncChannel::new(bus.clone());
        let (seen, handler) = collector();
        let mut listener = b.on_receive(handler);
        settle().await;

        listener.cancel();
        listener.cancel();
        settle().await;
        a.broadcast(&state(9));
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }
}
