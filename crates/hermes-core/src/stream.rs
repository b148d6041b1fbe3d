//! Readout-map stream records

use serde::{Deserialize, Serialize};

/// Detector/crate/slot/stream position of one readout stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoId {
    pub det_id: u16,
    pub crate_id: u16,
    pub slot_id: u16,
    pub stream_id: u16,
}

/// Kind of readout stream in the map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Ethernet readout through a Hermes endpoint
    Eth,
    /// FELIX readout, not handled by Hermes
    Flx,
}

/// Network parameters of one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParameters {
    /// Control host of the transmitting endpoint
    pub tx_host: String,
    pub tx_ip: String,
    pub tx_mac: String,
    pub rx_ip: String,
    pub rx_mac: String,
}

/// One entry of the global readout map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub geo_id: GeoId,
    pub kind: StreamKind,
    pub parameters: StreamParameters,
}

/// Transmit link a stream is multiplexed onto.
///
/// The firmware exposes at most two links per endpoint: stream ids above 63
/// land on link 1, everything else on link 0. Streams whose ids collapse to
/// the same link are indistinguishable downstream. This is a firmware quirk,
/// kept as-is on purpose.
pub fn link_index(stream_id: u16) -> u8 {
    u8::from(stream_id > 63)
}
