//! Device configuration synthesis
//!
//! Turns the flat list of readout-map streams into one configuration record
//! per physical Hermes endpoint. Pure transform, no hardware I/O: filter the
//! Ethernet streams, collapse exact duplicates, group by controller device,
//! then build the per-link tables.

use crate::stream::{link_index, StreamDescriptor, StreamKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// UDP port the endpoint firmware transmits from
pub const CONTROL_UDP_PORT: u16 = 0x4444;

/// UDP port of the IPBus control interface
const IPBUS_PORT: u16 = 50001;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("device '{device}': conflicting configurations for link {link}")]
    LinkConflict { device: String, link: u8 },
}

/// Grouping key: one key per physical controller device
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DeviceKey {
    pub det_id: u16,
    pub crate_id: u16,
    pub slot_id: u16,
    pub ctrl_host: String,
}

/// Detector/crate/slot position of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GeoInfo {
    pub det_id: u16,
    pub crate_id: u16,
    pub slot_id: u16,
}

/// Addressing of one transmit link within a device
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LinkConfig {
    pub link_index: u8,
    pub src_mac: String,
    pub src_ip: String,
    pub dst_mac: String,
    pub dst_ip: String,
}

/// Configuration record for one physical Hermes endpoint
#[derive(Debug, Clone, Serialize)]
pub struct DeviceConfig {
    /// Deterministic device name, `hermes_{det}_{crate}_{slot}`
    pub name: String,
    /// IPBus control URI
    pub uri: String,
    /// Address table URI for the register tree
    pub address_table: String,
    pub geo: GeoInfo,
    /// UDP port the data streams are sent from
    pub port: u16,
    /// Per-link addressing, keyed by link index
    pub links: BTreeMap<u8, LinkConfig>,
}

/// Stream fields that matter for synthesis; set semantics over this tuple
/// intentionally merge streams differing only in stream id within one
/// link-index bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TxInfo {
    det_id: u16,
    crate_id: u16,
    slot_id: u16,
    ctrl_host: String,
    link: u8,
    tx_ip: String,
    tx_mac: String,
    rx_ip: String,
    rx_mac: String,
}

/// Synthesize per-device link configuration from the global readout map.
///
/// Only `eth` streams participate. Two tuples claiming the same link of the
/// same device with different addressing are a configuration conflict and
/// fail the whole synthesis; exact duplicates collapse silently.
pub fn synthesize(
    streams: &[StreamDescriptor],
    address_table: &str,
) -> Result<BTreeMap<DeviceKey, DeviceConfig>, SynthError> {
    let tx_infos: BTreeSet<TxInfo> = streams
        .iter()
        .filter(|s| s.kind == StreamKind::Eth)
        .map(|s| TxInfo {
            det_id: s.geo_id.det_id,
            crate_id: s.geo_id.crate_id,
            slot_id: s.geo_id.slot_id,
            ctrl_host: s.parameters.tx_host.clone(),
            link: link_index(s.geo_id.stream_id),
            tx_ip: s.parameters.tx_ip.clone(),
            tx_mac: s.parameters.tx_mac.clone(),
            rx_ip: s.parameters.rx_ip.clone(),
            rx_mac: s.parameters.rx_mac.clone(),
        })
        .collect();

    debug!(
        streams = streams.len(),
        tuples = tx_infos.len(),
        "Deduplicated readout-map streams"
    );

    let mut devices: BTreeMap<DeviceKey, DeviceConfig> = BTreeMap::new();
    for info in tx_infos {
        let key = DeviceKey {
            det_id: info.det_id,
            crate_id: info.crate_id,
            slot_id: info.slot_id,
            ctrl_host: info.ctrl_host.clone(),
        };
        let name = format!("hermes_{}_{}_{}", key.det_id, key.crate_id, key.slot_id);
        let device = devices.entry(key).or_insert_with(|| DeviceConfig {
            uri: format!("ipbusudp-2.0://{}:{}", info.ctrl_host, IPBUS_PORT),
            address_table: address_table.to_string(),
            geo: GeoInfo {
                det_id: info.det_id,
                crate_id: info.crate_id,
                slot_id: info.slot_id,
            },
            port: CONTROL_UDP_PORT,
            links: BTreeMap::new(),
            name,
        });

        let link = LinkConfig {
            link_index: info.link,
            src_mac: info.tx_mac,
            src_ip: info.tx_ip,
            dst_mac: info.rx_mac,
            dst_ip: info.rx_ip,
        };
        if let Some(previous) = device.links.get(&info.link) {
            // Exact duplicates were already collapsed by the tuple set, so
            // reaching an occupied slot means inconsistent addressing.
            if *previous != link {
                return Err(SynthError::LinkConflict {
                    device: device.name.clone(),
                    link: info.link,
                });
            }
        }
        device.links.insert(info.link, link);
    }

    Ok(devices)
}
