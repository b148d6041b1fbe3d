//! Hermes Ctrl - register-session control plane for Hermes endpoints
//!
//! This crate drives one Hermes endpoint through its register tree:
//! - Batched read/write transport abstraction with deferred commit
//! - Register session with device identity validation and variant probing
//! - Link/buffer/UDP-core selector operations
//! - Wide-counter telemetry reconstruction

pub mod counters;
pub mod error;
pub mod session;
pub mod transport;

pub use counters::{aggregate_wide, read_buf_stats, BUF_PRUNE, BUF_WIDE_COUNTERS};
pub use error::CtrlError;
pub use session::{
    CoreInfo, DeviceVariant, HermesSession, LinkGeoInfo, LinkStatus, Pending, SelectorState,
    DEFAULT_FILTER_CONTROL, MAGIC,
};
pub use transport::{MockTransport, Op, Transport, TransportError};
