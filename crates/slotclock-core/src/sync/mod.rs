//! Cross-instance timer sync.
//!
//! Every instance broadcasts its timer state on each transition and adopts
//! whatever another instance sends. A background instance can therefore
//! start counting because a foreground one did; two instances ticking at
//! once will keep overwriting each other. That race is accepted, not
//! arbitrated.

mod channel;
mod sqlite;
mod transport;

pub use channel::{SyncChannel, SyncListener, DEFAULT_RECONNECT_DELAY};
pub use sqlite::{SqliteBus, DEFAULT_POLL_INTERVAL};
pub use transport::{LocalBus, SyncMessage, SyncTransport};
