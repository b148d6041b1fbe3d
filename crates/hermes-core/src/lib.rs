//! Hermes Core - Readout-map model and configuration synthesis
//!
//! This crate provides the hardware-free half of the Hermes control plane:
//! - Readout-map stream records and link-index derivation
//! - Transmitter/receiver endpoint tables with MAC/port validation
//! - Synthesis of per-device link configuration from the global readout map

pub mod endpoints;
pub mod stream;
pub mod synth;

pub use endpoints::{Endpoint, EndpointError, EndpointTable, MacAddr};
pub use stream::{link_index, GeoId, StreamDescriptor, StreamKind, StreamParameters};
pub use synth::{
    synthesize, DeviceConfig, DeviceKey, GeoInfo, LinkConfig, SynthError, CONTROL_UDP_PORT,
};
