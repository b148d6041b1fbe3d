//! Register session for one Hermes endpoint
//!
//! A session owns the transport handle and a FIFO command queue. Reads and
//! writes only enqueue; `commit` flushes the queue as one transport batch and
//! resolves the pending read handles. The session validates device identity
//! at open and exposes the selector and configuration operations on top of
//! the queue.

use crate::error::CtrlError;
use crate::transport::{Op, Transport};
use hermes_core::Endpoint;
use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Identity sentinel reported by a programmed endpoint
pub const MAGIC: u32 = 0xdead_beef;

/// Default UDP filter-control word, as programmed by the firmware release
pub const DEFAULT_FILTER_CONTROL: u32 = 0x0740_0307;

/// Settle time between reset/enable edges
const SETTLE: Duration = Duration::from_millis(100);

/// Device flavour, resolved once by capability probing at open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceVariant {
    /// Register tree rooted at the top level
    Wib,
    /// Register tree rooted under `tx`
    Zcu,
}

impl DeviceVariant {
    fn root(self) -> &'static str {
        match self {
            DeviceVariant::Wib => "",
            DeviceVariant::Zcu => "tx",
        }
    }
}

/// Device generics read at open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreInfo {
    pub magic: u32,
    /// Number of transmit links (MGTs)
    pub n_mgt: u32,
    /// Total number of source buffers
    pub n_src: u32,
    pub ref_freq: u32,
    /// Source buffers per link, floored
    pub n_srcs_per_mgt: u32,
}

/// Last committed selection on each of the three independent axes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectorState {
    pub tx_link: Option<u32>,
    pub buffer: Option<u32>,
    pub udp_core: Option<u32>,
}

/// Geo identity programmed into one link's mux block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkGeoInfo {
    pub det_id: u32,
    pub crate_id: u32,
    pub slot_id: u32,
}

/// Readiness flags of one link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub err: bool,
    pub eth_rdy: bool,
    pub src_rdy: bool,
    pub udp_rdy: bool,
}

impl LinkStatus {
    pub fn is_ok(&self) -> bool {
        !self.err && self.eth_rdy && self.src_rdy && self.udp_rdy
    }
}

/// Handle to a queued read, resolved by the commit that flushes it
#[derive(Debug, Clone)]
pub struct Pending {
    path: String,
    slot: Rc<OnceCell<u32>>,
}

impl Pending {
    /// The resolved value. Inspecting a handle before its commit is a
    /// programming error and fails fast.
    pub fn value(&self) -> Result<u32, CtrlError> {
        self.slot.get().copied().ok_or_else(|| CtrlError::Unresolved {
            path: self.path.clone(),
        })
    }
}

#[derive(Debug)]
struct Queued {
    op: Op,
    slot: Option<Rc<OnceCell<u32>>>,
}

/// Control session against one endpoint's register tree
#[derive(Debug)]
pub struct HermesSession<T: Transport> {
    transport: T,
    queue: Vec<Queued>,
    variant: DeviceVariant,
    info: CoreInfo,
    selectors: SelectorState,
}

impl<T: Transport> HermesSession<T> {
    /// Open a session: probe the device variant, then read and validate the
    /// identity block. Fails without further register access if the magic
    /// number does not match.
    pub fn open(transport: T) -> Result<Self, CtrlError> {
        let variant = if !transport.enumerate("tx.info").is_empty() {
            DeviceVariant::Zcu
        } else if !transport.enumerate("info").is_empty() {
            DeviceVariant::Wib
        } else {
            return Err(CtrlError::UnknownDevice);
        };
        debug!(?variant, "Probed device variant");

        let mut session = Self {
            transport,
            queue: Vec::new(),
            variant,
            info: CoreInfo::default(),
            selectors: SelectorState::default(),
        };
        session.load_info()?;
        Ok(session)
    }

    fn load_info(&mut self) -> Result<(), CtrlError> {
        // Queued together, inspected after a single commit; the magic is
        // still validated before the generics are trusted.
        let magic = self.read("info.magic");
        let n_mgt = self.read("info.generics.n_mgts");
        let n_src = self.read("info.generics.n_srcs");
        let ref_freq = self.read("info.generics.ref_freq");
        self.commit()?;

        let magic = magic.value()?;
        if magic != MAGIC {
            return Err(CtrlError::BadMagic { found: magic });
        }

        let n_mgt = n_mgt.value()?;
        let n_src = n_src.value()?;
        let ref_freq = ref_freq.value()?;
        if n_mgt == 0 {
            return Err(CtrlError::ZeroLinks);
        }
        if n_src % n_mgt != 0 {
            warn!(
                n_src,
                n_mgt, "Source count is not a multiple of the link count, flooring"
            );
        }

        self.info = CoreInfo {
            magic,
            n_mgt,
            n_src,
            ref_freq,
            n_srcs_per_mgt: n_src / n_mgt,
        };
        info!(n_mgt, n_src, ref_freq, "Hermes endpoint validated");
        Ok(())
    }

    pub fn info(&self) -> &CoreInfo {
        &self.info
    }

    pub fn variant(&self) -> DeviceVariant {
        self.variant
    }

    pub fn selectors(&self) -> SelectorState {
        self.selectors
    }

    fn prefixed(&self, path: &str) -> String {
        match self.variant.root() {
            "" => path.to_string(),
            root => format!("{root}.{path}"),
        }
    }

    /// Enqueue a read; the handle resolves at the next `commit`
    pub fn read(&mut self, path: &str) -> Pending {
        let full = self.prefixed(path);
        let slot = Rc::new(OnceCell::new());
        let pending = Pending {
            path: full.clone(),
            slot: Rc::clone(&slot),
        };
        self.queue.push(Queued {
            op: Op::Read { path: full },
            slot: Some(slot),
        });
        pending
    }

    /// Enqueue a write; takes effect at the next `commit`
    pub fn write(&mut self, path: &str, value: u32) {
        let full = self.prefixed(path);
        self.queue.push(Queued {
            op: Op::Write { path: full, value },
            slot: None,
        });
    }

    /// Flush the queue as one FIFO transport batch and resolve all pending
    /// reads. Transport failures propagate verbatim; the queue is dropped.
    pub fn commit(&mut self) -> Result<(), CtrlError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let ops: Vec<Op> = self.queue.iter().map(|q| q.op.clone()).collect();
        let replies = match self.transport.execute(&ops) {
            Ok(replies) => replies,
            Err(e) => {
                self.queue.clear();
                return Err(e.into());
            }
        };
        for (queued, reply) in self.queue.drain(..).zip(replies) {
            if let Some(slot) = queued.slot {
                let _ = slot.set(reply);
            }
        }
        Ok(())
    }

    /// Read every leaf register under a node in one commit, keyed by leaf
    /// name, sorted for determinism
    pub fn dump_subtree(&mut self, node: &str) -> Result<BTreeMap<String, u32>, CtrlError> {
        let mut leaves = self.transport.enumerate(&self.prefixed(node));
        leaves.sort();
        let pending: Vec<(String, Pending)> = leaves
            .into_iter()
            .map(|leaf| {
                let handle = self.read(&format!("{node}.{leaf}"));
                (leaf, handle)
            })
            .collect();
        self.commit()?;

        let mut out = BTreeMap::new();
        for (leaf, handle) in pending {
            out.insert(leaf, handle.value()?);
        }
        Ok(out)
    }

    /// Dump of the device info block
    pub fn read_info(&mut self) -> Result<BTreeMap<String, u32>, CtrlError> {
        self.dump_subtree("info")
    }

    fn check_range(&self, what: &'static str, index: u32, limit: u32) -> Result<(), CtrlError> {
        if index >= limit {
            return Err(CtrlError::Range { what, index, limit });
        }
        Ok(())
    }
}

// Selector operations. Selection is a hardware context switch: subsequent
// accesses to the corresponding sub-tree address the selected instance until
// the selector changes again. There is no nesting and no auto-restore.
impl<T: Transport> HermesSession<T> {
    pub fn select_tx_link(&mut self, i: u32) -> Result<(), CtrlError> {
        self.check_range("link", i, self.info.n_mgt)?;
        self.write("tx_path.csr_tx_mux.ctrl.tx_mux_sel", i);
        self.commit()?;
        // Read-back for observability only
        let sel = self.read("tx_path.csr_tx_mux.ctrl.tx_mux_sel");
        self.commit()?;
        debug!(link = sel.value()?, "Transmit link selected");
        self.selectors.tx_link = Some(i);
        Ok(())
    }

    pub fn select_buffer(&mut self, i: u32) -> Result<(), CtrlError> {
        self.check_range("input buffer", i, self.info.n_srcs_per_mgt)?;
        self.write("tx_path.tx_mux.csr.ctrl.sel_buf", i);
        self.commit()?;
        self.selectors.buffer = Some(i);
        Ok(())
    }

    pub fn select_udp_core(&mut self, i: u32) -> Result<(), CtrlError> {
        self.check_range("UDP core", i, self.info.n_mgt)?;
        self.write("tx_path.csr_udp_core.ctrl.udp_core_sel", i);
        self.commit()?;
        self.selectors.udp_core = Some(i);
        Ok(())
    }

    /// Latch a counter snapshot, optionally spanning `duration`: strobe the
    /// sample register, sleep, strobe again so later reads observe a
    /// consistent window
    pub fn sample_counters(&mut self, duration: Duration) -> Result<(), CtrlError> {
        self.write("samp.ctrl.samp", 1);
        self.write("samp.ctrl.samp", 0);
        self.commit()?;
        if !duration.is_zero() {
            thread::sleep(duration);
            self.write("samp.ctrl.samp", 1);
            self.write("samp.ctrl.samp", 0);
            self.commit()?;
        }
        Ok(())
    }
}

// Configuration and operation commands built on the queue + commit core.
impl<T: Transport> HermesSession<T> {
    /// Soft reset; `nuke` pulses the full logic reset first
    pub fn reset(&mut self, nuke: bool) -> Result<(), CtrlError> {
        if nuke {
            self.write("csr.ctrl.nuke", 1);
            self.commit()?;
            thread::sleep(SETTLE);
            self.write("csr.ctrl.nuke", 0);
            self.commit()?;
        }
        self.write("csr.ctrl.soft_rst", 1);
        self.commit()?;
        thread::sleep(SETTLE);
        self.write("csr.ctrl.soft_rst", 0);
        self.commit()?;
        info!(nuke, "Endpoint reset");
        Ok(())
    }

    /// Enable or disable one link. The transmitter comes up before the
    /// buffers feeding it and the mux is switched last; teardown reverses
    /// the order.
    pub fn enable(&mut self, link: u32, on: bool) -> Result<(), CtrlError> {
        self.select_tx_link(link)?;
        let v = u32::from(on);
        if on {
            self.write("tx_path.tx_mux.csr.ctrl.tx_en", v);
            self.write("tx_path.tx_mux.csr.ctrl.en_buf", v);
            self.commit()?;
            thread::sleep(SETTLE);
            self.write("tx_path.tx_mux.csr.ctrl.en", v);
            self.commit()?;
        } else {
            self.write("tx_path.tx_mux.csr.ctrl.en", v);
            self.commit()?;
            thread::sleep(SETTLE);
            self.write("tx_path.tx_mux.csr.ctrl.en_buf", v);
            self.write("tx_path.tx_mux.csr.ctrl.tx_en", v);
            self.commit()?;
        }
        info!(link, enabled = on, "Link enable state changed");
        Ok(())
    }

    /// Program the geo identity stamped onto one link's output blocks
    pub fn config_mux(
        &mut self,
        link: u32,
        det_id: u32,
        crate_id: u32,
        slot_id: u32,
    ) -> Result<(), CtrlError> {
        self.select_tx_link(link)?;
        self.write("tx_path.tx_mux.mux.ctrl.detid", det_id);
        self.write("tx_path.tx_mux.mux.ctrl.crate", crate_id);
        self.write("tx_path.tx_mux.mux.ctrl.slot", slot_id);
        self.commit()
    }

    /// Program one link's UDP core with source/destination addressing
    pub fn config_udp(
        &mut self,
        link: u32,
        src: &Endpoint,
        dst: &Endpoint,
        filter_control: u32,
    ) -> Result<(), CtrlError> {
        self.select_udp_core(link)?;
        debug!(
            link,
            src_ip = %src.ip,
            src_mac = %src.mac,
            dst_ip = %dst.ip,
            dst_mac = %dst.mac,
            "Configuring UDP core"
        );
        const UDP: &str = "tx_path.udp_core.udp_core_control";
        self.write(&format!("{UDP}.ctrl.filter_control"), filter_control);
        self.write(&format!("{UDP}.src_addr_ctrl.src_ip_addr"), u32::from(src.ip));
        self.write(&format!("{UDP}.ctrl.dst_ip_addr"), u32::from(dst.ip));
        self.write(
            &format!("{UDP}.src_addr_ctrl.src_mac_addr_lower"),
            src.mac.lower32(),
        );
        self.write(
            &format!("{UDP}.src_addr_ctrl.src_mac_addr_upper"),
            src.mac.upper16(),
        );
        self.write(&format!("{UDP}.ctrl.dst_mac_addr_lower"), dst.mac.lower32());
        self.write(&format!("{UDP}.ctrl.dst_mac_addr_upper"), dst.mac.upper16());
        self.write(&format!("{UDP}.src_addr_ctrl.src_port"), u32::from(src.port));
        self.write(&format!("{UDP}.ctrl.dst_port"), u32::from(dst.port));
        self.commit()
    }

    /// Configure the fake data generators of one link. The buffers are held
    /// disabled while the generators are reprogrammed and the previous
    /// enable state is restored afterwards.
    pub fn config_fake_src(
        &mut self,
        link: u32,
        srcs: &[u32],
        data_len: u32,
        rate_rdx: u32,
    ) -> Result<(), CtrlError> {
        for &s in srcs {
            self.check_range("input buffer", s, self.info.n_srcs_per_mgt)?;
        }
        self.select_tx_link(link)?;

        let was_en = self.read("tx_path.tx_mux.csr.ctrl.en_buf");
        self.commit()?;
        let was_en = was_en.value()?;
        self.write("tx_path.tx_mux.csr.ctrl.en_buf", 0);
        self.commit()?;

        for buf in 0..self.info.n_srcs_per_mgt {
            self.select_buffer(buf)?;
            let en = srcs.contains(&buf);
            debug!(buf, enabled = en, "Configuring fake source");
            self.write("tx_path.tx_mux.buf.ctrl.fake_en", u32::from(en));
            if en {
                self.write("tx_path.tx_mux.buf.ctrl.dlen", data_len);
                self.write("tx_path.tx_mux.buf.ctrl.rate_rdx", rate_rdx);
            }
            self.commit()?;
        }

        self.write("tx_path.tx_mux.csr.ctrl.en_buf", was_en);
        self.commit()
    }

    /// Read back the geo identity programmed into one link
    pub fn read_link_geo_info(&mut self, link: u32) -> Result<LinkGeoInfo, CtrlError> {
        self.select_tx_link(link)?;
        let det = self.read("tx_path.tx_mux.mux.ctrl.detid");
        let crate_id = self.read("tx_path.tx_mux.mux.ctrl.crate");
        let slot = self.read("tx_path.tx_mux.mux.ctrl.slot");
        self.commit()?;
        Ok(LinkGeoInfo {
            det_id: det.value()?,
            crate_id: crate_id.value()?,
            slot_id: slot.value()?,
        })
    }

    /// Readiness flags of one link
    pub fn link_status(&mut self, link: u32) -> Result<LinkStatus, CtrlError> {
        self.select_tx_link(link)?;
        let err = self.read("tx_path.tx_mux.csr.stat.err");
        let eth_rdy = self.read("tx_path.tx_mux.csr.stat.eth_rdy");
        let src_rdy = self.read("tx_path.tx_mux.csr.stat.src_rdy");
        let udp_rdy = self.read("tx_path.tx_mux.csr.stat.udp_rdy");
        self.commit()?;
        Ok(LinkStatus {
            err: err.value()? != 0,
            eth_rdy: eth_rdy.value()? != 0,
            src_rdy: src_rdy.value()? != 0,
            udp_rdy: udp_rdy.value()? != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use hermes_core::MacAddr;
    use std::net::Ipv4Addr;

    #[test]
    fn test_open_wib() {
        let mut mock = MockTransport::wib(2, 8);
        let session = HermesSession::open(&mut mock).unwrap();
        assert_eq!(session.variant(), DeviceVariant::Wib);
        let info = session.info();
        assert_eq!(info.magic, MAGIC);
        assert_eq!(info.n_mgt, 2);
        assert_eq!(info.n_src, 8);
        assert_eq!(info.n_srcs_per_mgt, 4);
    }

    #[test]
    fn test_open_zcu_prefixes_paths() {
        let mut mock = MockTransport::zcu(4, 8);
        let mut session = HermesSession::open(&mut mock).unwrap();
        assert_eq!(session.variant(), DeviceVariant::Zcu);
        session.select_tx_link(3).unwrap();
        drop(session);
        assert_eq!(mock.get("tx.tx_path.csr_tx_mux.ctrl.tx_mux_sel"), Some(3));
    }

    #[test]
    fn test_open_bad_magic_stops_after_one_commit() {
        let mut mock = MockTransport::wib(2, 8);
        mock.set("info.magic", 0xcafe_babe);
        let err = HermesSession::open(&mut mock).unwrap_err();
        match err {
            CtrlError::BadMagic { found } => assert_eq!(found, 0xcafe_babe),
            other => panic!("unexpected error: {other}"),
        }
        // The identity batch is the only transport access
        assert_eq!(mock.log.len(), 1);
    }

    #[test]
    fn test_open_unknown_device() {
        let mock = MockTransport::new();
        let err = HermesSession::open(mock).unwrap_err();
        assert!(matches!(err, CtrlError::UnknownDevice));
    }

    #[test]
    fn test_open_zero_links() {
        let mock = MockTransport::wib(0, 8);
        let err = HermesSession::open(mock).unwrap_err();
        assert!(matches!(err, CtrlError::ZeroLinks));
    }

    #[test]
    fn test_non_multiple_generics_floor() {
        let session = HermesSession::open(MockTransport::wib(2, 7)).unwrap();
        assert_eq!(session.info().n_srcs_per_mgt, 3);
    }

    #[test]
    fn test_pending_before_commit_fails_fast() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        let pending = session.read("info.magic");
        assert!(matches!(
            pending.value(),
            Err(CtrlError::Unresolved { .. })
        ));
        session.commit().unwrap();
        assert_eq!(pending.value().unwrap(), MAGIC);
    }

    #[test]
    fn test_commit_resolves_fifo() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        // Write then read of the same register inside one batch
        session.write("info.generics.ref_freq", 125_000_000);
        let after = session.read("info.generics.ref_freq");
        session.commit().unwrap();
        assert_eq!(after.value().unwrap(), 125_000_000);
    }

    #[test]
    fn test_selector_bounds() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        assert!(session.select_tx_link(1).is_ok());
        let err = session.select_tx_link(2).unwrap_err();
        assert!(matches!(
            err,
            CtrlError::Range {
                index: 2,
                limit: 2,
                ..
            }
        ));
        // The session stays usable after a range error
        assert!(session.select_tx_link(0).is_ok());

        // Buffer bound is per link, not the total source count
        assert!(session.select_buffer(3).is_ok());
        assert!(session.select_buffer(4).is_err());

        assert!(session.select_udp_core(1).is_ok());
        assert!(session.select_udp_core(2).is_err());
    }

    #[test]
    fn test_selector_axes_are_independent() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        session.select_tx_link(1).unwrap();
        session.select_buffer(2).unwrap();
        assert_eq!(session.selectors().tx_link, Some(1));
        assert_eq!(session.selectors().buffer, Some(2));
        assert_eq!(session.selectors().udp_core, None);
    }

    #[test]
    fn test_dump_subtree_sorted_single_commit() {
        let mut mock = MockTransport::wib(2, 8);
        let mut session = HermesSession::open(&mut mock).unwrap();
        let dump = session.dump_subtree("info.generics").unwrap();
        let keys: Vec<String> = dump.keys().cloned().collect();
        assert_eq!(keys, ["n_mgts", "n_srcs", "ref_freq"]);
        assert_eq!(dump["n_mgts"], 2);
        drop(session);
        // open is one commit, the dump is exactly one more
        assert_eq!(mock.log.len(), 2);
    }

    #[test]
    fn test_sample_counters_strobe() {
        let mut mock = MockTransport::wib(2, 8);
        let mut session = HermesSession::open(&mut mock).unwrap();
        session.sample_counters(Duration::ZERO).unwrap();
        drop(session);
        let strobe = &mock.log[1];
        assert_eq!(
            strobe.as_slice(),
            [
                Op::Write {
                    path: "samp.ctrl.samp".to_string(),
                    value: 1
                },
                Op::Write {
                    path: "samp.ctrl.samp".to_string(),
                    value: 0
                },
            ]
        );
        // Zero duration means no halt strobe
        assert_eq!(mock.log.len(), 2);
    }

    #[test]
    fn test_config_udp_register_values() {
        let mut mock = MockTransport::wib(2, 8);
        let mut session = HermesSession::open(&mut mock).unwrap();
        let src = Endpoint {
            mac: MacAddr(0xd880_39d8_f5f5),
            ip: Ipv4Addr::new(10, 73, 139, 21),
            port: 0x4444,
        };
        let dst = Endpoint {
            mac: MacAddr(0x6cfe_5447_9820),
            ip: Ipv4Addr::new(10, 73, 139, 17),
            port: 0x4444,
        };
        session
            .config_udp(1, &src, &dst, DEFAULT_FILTER_CONTROL)
            .unwrap();
        drop(session);

        let udp = "tx_path.udp_core.udp_core_control";
        assert_eq!(mock.get("tx_path.csr_udp_core.ctrl.udp_core_sel"), Some(1));
        assert_eq!(
            mock.get(&format!("{udp}.ctrl.filter_control")),
            Some(DEFAULT_FILTER_CONTROL)
        );
        assert_eq!(
            mock.get(&format!("{udp}.src_addr_ctrl.src_ip_addr")),
            Some(0x0a49_8b15)
        );
        assert_eq!(mock.get(&format!("{udp}.ctrl.dst_ip_addr")), Some(0x0a49_8b11));
        assert_eq!(
            mock.get(&format!("{udp}.src_addr_ctrl.src_mac_addr_lower")),
            Some(0x39d8_f5f5)
        );
        assert_eq!(
            mock.get(&format!("{udp}.src_addr_ctrl.src_mac_addr_upper")),
            Some(0xd880)
        );
        assert_eq!(
            mock.get(&format!("{udp}.ctrl.dst_mac_addr_lower")),
            Some(0x5447_9820)
        );
        assert_eq!(
            mock.get(&format!("{udp}.ctrl.dst_mac_addr_upper")),
            Some(0x6cfe)
        );
        assert_eq!(
            mock.get(&format!("{udp}.src_addr_ctrl.src_port")),
            Some(0x4444)
        );
        assert_eq!(mock.get(&format!("{udp}.ctrl.dst_port")), Some(0x4444));
    }

    #[test]
    fn test_config_udp_out_of_range_link() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        let ep = Endpoint {
            mac: MacAddr(0),
            ip: Ipv4Addr::UNSPECIFIED,
            port: 0,
        };
        assert!(matches!(
            session.config_udp(2, &ep, &ep, 0),
            Err(CtrlError::Range { .. })
        ));
    }

    #[test]
    fn test_enable_ordering() {
        let mut mock = MockTransport::wib(2, 8);
        let mut session = HermesSession::open(&mut mock).unwrap();
        session.enable(0, true).unwrap();
        drop(session);

        let writes: Vec<&Op> = mock
            .ops()
            .filter(|op| matches!(op, Op::Write { path, .. } if path.contains("csr.ctrl")))
            .collect();
        let paths: Vec<&str> = writes
            .iter()
            .map(|op| match op {
                Op::Write { path, .. } => path.as_str(),
                Op::Read { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(
            paths,
            [
                "tx_path.tx_mux.csr.ctrl.tx_en",
                "tx_path.tx_mux.csr.ctrl.en_buf",
                "tx_path.tx_mux.csr.ctrl.en",
            ]
        );
        // The mux enable lands in its own later commit
        assert!(mock.log.last().unwrap().len() == 1);
    }

    #[test]
    fn test_config_mux_and_read_back() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        session.config_mux(0, 3, 1, 2).unwrap();
        let geo = session.read_link_geo_info(0).unwrap();
        assert_eq!(
            geo,
            LinkGeoInfo {
                det_id: 3,
                crate_id: 1,
                slot_id: 2
            }
        );
    }

    #[test]
    fn test_config_fake_src_restores_buffer_enable() {
        let mut mock = MockTransport::wib(2, 8);
        mock.set("tx_path.tx_mux.csr.ctrl.en_buf", 1);
        let mut session = HermesSession::open(&mut mock).unwrap();
        session.config_fake_src(0, &[0, 2], 0x383, 0xa).unwrap();
        drop(session);

        assert_eq!(mock.get("tx_path.tx_mux.csr.ctrl.en_buf"), Some(1));
        assert_eq!(mock.get("tx_path.tx_mux.buf.ctrl.fake_en"), Some(0));
        assert_eq!(mock.get("tx_path.tx_mux.buf.ctrl.dlen"), Some(0x383));
        assert_eq!(mock.get("tx_path.tx_mux.buf.ctrl.rate_rdx"), Some(0xa));
    }

    #[test]
    fn test_config_fake_src_rejects_out_of_range_source() {
        let mut session = HermesSession::open(MockTransport::wib(2, 8)).unwrap();
        assert!(matches!(
            session.config_fake_src(0, &[4], 0x383, 0xa),
            Err(CtrlError::Range { .. })
        ));
    }

    #[test]
    fn test_link_status() {
        let mut mock = MockTransport::wib(2, 8);
        mock.set("tx_path.tx_mux.csr.stat.err", 0);
        mock.set("tx_path.tx_mux.csr.stat.eth_rdy", 1);
        mock.set("tx_path.tx_mux.csr.stat.src_rdy", 1);
        mock.set("tx_path.tx_mux.csr.stat.udp_rdy", 1);
        let mut session = HermesSession::open(&mut mock).unwrap();
        let status = session.link_status(0).unwrap();
        assert!(status.is_ok());
        drop(session);

        mock.set("tx_path.tx_mux.csr.stat.err", 1);
        let mut session = HermesSession::open(&mut mock).unwrap();
        let status = session.link_status(0).unwrap();
        assert!(status.err);
        assert!(!status.is_ok());
    }
}
