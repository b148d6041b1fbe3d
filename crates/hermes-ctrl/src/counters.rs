//! Wide-counter telemetry reconstruction
//!
//! The firmware splits 64-bit counters across adjacent 32-bit registers
//! named with `_h`/`_l` suffixes. Both halves are read inside the same
//! commit batch, so reassembling `(high << 32) | low` from one subtree dump
//! never observes a torn counter.

use crate::error::CtrlError;
use crate::session::HermesSession;
use crate::transport::Transport;
use std::collections::BTreeMap;
use tracing::warn;

/// Wide counters exposed by each input buffer
pub const BUF_WIDE_COUNTERS: &[&str] = &[
    "blk_acc",
    "blk_lastnotval",
    "blk_longlast",
    "blk_oflow",
    "blk_rej",
    "ts",
    "vol",
];

/// Non-counter substructures pruned from buffer dumps
pub const BUF_PRUNE: &[&str] = &["buf_mon", "ctrl", "stat"];

/// Reassemble the wide counters named in `pairs` from a raw register dump.
///
/// Each `{name}_h`/`{name}_l` pair is replaced by `name` holding the full
/// 64-bit value; entries matching a `prune` prefix are dropped; everything
/// else widens unchanged. A missing half is an error, never a silent zero.
pub fn aggregate_wide(
    raw: &BTreeMap<String, u32>,
    pairs: &[&str],
    prune: &[&str],
) -> Result<BTreeMap<String, u64>, CtrlError> {
    let mut out: BTreeMap<String, u64> = BTreeMap::new();
    for (name, value) in raw {
        let pruned = prune
            .iter()
            .any(|p| name == p || name.starts_with(&format!("{p}.")));
        if !pruned {
            out.insert(name.clone(), u64::from(*value));
        }
    }

    for name in pairs {
        let high = out.remove(&format!("{name}_h"));
        let low = out.remove(&format!("{name}_l"));
        let missing = match (high, low) {
            (Some(h), Some(l)) => {
                out.insert((*name).to_string(), (h << 32) | l);
                continue;
            }
            (None, Some(_)) => "high",
            (Some(_), None) => "low",
            (None, None) => "high and low",
        };
        return Err(CtrlError::IncompleteCounter {
            name: (*name).to_string(),
            missing,
        });
    }

    Ok(out)
}

/// Sweep the input buffers of one link and aggregate their counters.
///
/// A buffer with an incomplete counter pair is reported and skipped; the
/// remaining buffers still come back. Range and transport errors abort the
/// sweep.
pub fn read_buf_stats<T: Transport>(
    session: &mut HermesSession<T>,
    link: u32,
) -> Result<BTreeMap<u32, BTreeMap<String, u64>>, CtrlError> {
    session.select_tx_link(link)?;

    let mut stats = BTreeMap::new();
    for buf in 0..session.info().n_srcs_per_mgt {
        session.select_buffer(buf)?;
        let raw = session.dump_subtree("tx_path.tx_mux.buf")?;
        match aggregate_wide(&raw, BUF_WIDE_COUNTERS, BUF_PRUNE) {
            Ok(aggregated) => {
                stats.insert(buf, aggregated);
            }
            Err(e @ CtrlError::IncompleteCounter { .. }) => {
                warn!(link, buf, error = %e, "Skipping buffer with incomplete counters");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(stats)
}
