//! Message transports between instances.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::SyncError;
use crate::timer::TimerState;

/// One instance's timer state, tagged with the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub origin: Uuid,
    pub state: TimerState,
}

pub trait SyncTransport: Send + Sync + fmt::Debug {
    /// Hand a message to every open subscription. No delivery guarantee.
    fn publish(&self, message: SyncMessage) -> Result<(), SyncError>;

    /// Open a subscription. Ends with `RecvError::Closed` when the transport
    /// drops it.
    fn subscribe(&self) -> Result<broadcast::Receiver<SyncMessage>, SyncError>;
}

const BUS_CAPACITY: usize = 64;

/// In-process broadcast bus shared by every instance holding a clone.
///
/// `close()` drops the current channel; the next `subscribe` or `publish`
/// opens a fresh one. `set_offline(true)` makes both fail until switched back.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    sender: Mutex<Option<broadcast::Sender<SyncMessage>>>,
    offline: AtomicBool,
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBus")
            .field("offline", &self.inner.offline.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the live channel. Every subscriber sees it close.
    pub fn close(&self) {
        self.inner
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
        if offline {
            self.close();
        }
    }

    fn sender(&self) -> Result<broadcast::Sender<SyncMessage>, SyncError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Closed);
        }
        let mut slot = self.inner.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = slot.get_or_insert_with(|| broadcast::channel(BUS_CAPACITY).0);
        Ok(sender.clone())
    }
}

impl SyncTransport for LocalBus {
    fn publish(&self, message: SyncMessage) -> Result<(), SyncError> {
        self.sender()?
            .send(message)
            .map(|_| ())
            .map_err(|_| SyncError::NoListeners)
    }

    fn subscribe(&self) -> Result<broadcast::Receiver<SyncMessage>, SyncError> {
        Ok(self.sender()?.subscribe())
    }
}
