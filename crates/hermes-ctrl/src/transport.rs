//! Batched register transport abstraction
//!
//! The concrete wire driver (IPBus over UDP in production) lives outside this
//! crate; the session only needs an executor for FIFO batches of register
//! operations plus tree enumeration. `MockTransport` provides an in-memory
//! register map for tests and dry runs.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("no such register '{0}'")]
    NoSuchRegister(String),
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// One register operation, addressed by dot-joined register-tree path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Read { path: String },
    Write { path: String, value: u32 },
}

/// Executor for batched register access against one device.
///
/// `execute` runs a whole batch in FIFO order against hardware and returns
/// one reply word per operation; write replies echo the written value. This
/// is the only point where hardware state changes or is observed.
pub trait Transport {
    fn execute(&mut self, ops: &[Op]) -> Result<Vec<u32>, TransportError>;

    /// Leaf register paths under a node, relative to it. Empty when the node
    /// does not exist.
    fn enumerate(&self, node: &str) -> Vec<String>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn execute(&mut self, ops: &[Op]) -> Result<Vec<u32>, TransportError> {
        (**self).execute(ops)
    }

    fn enumerate(&self, node: &str) -> Vec<String> {
        (**self).enumerate(node)
    }
}

/// In-memory register map with a per-commit operation log
#[derive(Debug, Default)]
pub struct MockTransport {
    regs: BTreeMap<String, u32>,
    /// One entry per `execute` call
    pub log: Vec<Vec<Op>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload one register
    pub fn with_register(mut self, path: &str, value: u32) -> Self {
        self.regs.insert(path.to_string(), value);
        self
    }

    /// A wib-style device: register tree rooted at the top level
    pub fn wib(n_mgt: u32, n_src: u32) -> Self {
        Self::new()
            .with_register("info.magic", crate::session::MAGIC)
            .with_register("info.generics.n_mgts", n_mgt)
            .with_register("info.generics.n_srcs", n_src)
            .with_register("info.generics.ref_freq", 62_500_000)
    }

    /// A zcu-style device: register tree rooted under `tx`
    pub fn zcu(n_mgt: u32, n_src: u32) -> Self {
        Self::new()
            .with_register("tx.info.magic", crate::session::MAGIC)
            .with_register("tx.info.generics.n_mgts", n_mgt)
            .with_register("tx.info.generics.n_srcs", n_src)
            .with_register("tx.info.generics.ref_freq", 62_500_000)
    }

    pub fn set(&mut self, path: &str, value: u32) {
        self.regs.insert(path.to_string(), value);
    }

    pub fn get(&self, path: &str) -> Option<u32> {
        self.regs.get(path).copied()
    }

    /// All operations across all commits, in order
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.log.iter().flatten()
    }
}

impl Transport for MockTransport {
    fn execute(&mut self, ops: &[Op]) -> Result<Vec<u32>, TransportError> {
        trace!(ops = ops.len(), "Executing mock batch");
        let mut replies = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                Op::Read { path } => {
                    let value = self
                        .regs
                        .get(path)
                        .copied()
                        .ok_or_else(|| TransportError::NoSuchRegister(path.clone()))?;
                    replies.push(value);
                }
                Op::Write { path, value } => {
                    self.regs.insert(path.clone(), *value);
                    replies.push(*value);
                }
            }
        }
        self.log.push(ops.to_vec());
        Ok(replies)
    }

    fn enumerate(&self, node: &str) -> Vec<String> {
        let prefix = format!("{node}.");
        self.regs
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }
}
