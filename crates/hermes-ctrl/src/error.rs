//! Control-plane error taxonomy

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CtrlError {
    /// Device identity check failed; the session is unusable
    #[error("magic number check failed: expected 0xdeadbeef, found {found:#010x}")]
    BadMagic { found: u32 },
    /// Neither register-tree root was found during variant probing
    #[error("device exposes neither a 'tx.info' nor an 'info' register tree")]
    UnknownDevice,
    /// Device generics report no transmit links
    #[error("device reports zero transmit links")]
    ZeroLinks,
    /// Selector or configuration index out of bounds; the session stays usable
    #[error("{what} {index} does not exist ({limit} instantiated)")]
    Range {
        what: &'static str,
        index: u32,
        limit: u32,
    },
    /// A queued read was inspected before its commit resolved it
    #[error("register '{path}' read before commit")]
    Unresolved { path: String },
    /// A wide counter is missing one of its 32-bit halves
    #[error("counter '{name}' is missing its {missing} half")]
    IncompleteCounter { name: String, missing: &'static str },
    #[error(transparent)]
    Transport(#[from] TransportError),
}
