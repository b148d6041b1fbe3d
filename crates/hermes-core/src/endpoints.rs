//! Transmitter/receiver endpoint tables
//!
//! Endpoint tables map logical names to the MAC/IP/port triple of a
//! transmitter or receiver NIC. They are loaded once at process start and
//! passed by reference into whatever needs them; there is no ambient global
//! table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("endpoint '{name}': invalid MAC address '{value}'")]
    BadMac { name: String, value: String },
    #[error("endpoint '{name}': invalid port '{value}'")]
    BadPort { name: String, value: String },
    #[error("failed to read endpoint table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse endpoint table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 48-bit Ethernet address held as a u64
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub u64);

impl MacAddr {
    /// Low 32 bits, as written to the `*_mac_addr_lower` registers
    pub fn lower32(&self) -> u32 {
        (self.0 & 0xffff_ffff) as u32
    }

    /// High 16 bits, as written to the `*_mac_addr_upper` registers
    pub fn upper16(&self) -> u32 {
        ((self.0 >> 32) & 0xffff) as u32
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Exactly six colon-separated octets
        if s.matches(':').count() != 5 {
            return Err(s.to_string());
        }
        let mut value: u64 = 0;
        for octet in s.split(':') {
            if octet.len() != 2 {
                return Err(s.to_string());
            }
            let b = u8::from_str_radix(octet, 16).map_err(|_| s.to_string())?;
            value = (value << 8) | u64::from(b);
        }
        Ok(MacAddr(value))
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// One transmitter or receiver NIC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub port: u16,
}

/// On-disk endpoint entry; ports are hex strings in the legacy files
#[derive(Debug, Deserialize, Serialize)]
struct RawEndpoint {
    mac: String,
    ip: Ipv4Addr,
    port: PortField,
}

/// Port field accepted either as a number or a hex string ("4444" == 0x4444)
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
enum PortField {
    Num(u16),
    Hex(String),
}

/// Named endpoint table loaded from a JSON file
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    entries: BTreeMap<String, Endpoint>,
}

impl EndpointTable {
    /// Load and validate a table; any malformed entry is a fatal load error
    pub fn load(path: &Path) -> Result<Self, EndpointError> {
        let content = std::fs::read_to_string(path)?;
        let raw: BTreeMap<String, RawEndpoint> = serde_json::from_str(&content)?;

        let mut entries = BTreeMap::new();
        for (name, e) in raw {
            let mac: MacAddr = e.mac.parse().map_err(|value| EndpointError::BadMac {
                name: name.clone(),
                value,
            })?;
            let port = match e.port {
                PortField::Num(p) => p,
                PortField::Hex(ref s) => {
                    let digits = s.strip_prefix("0x").unwrap_or(s);
                    u16::from_str_radix(digits, 16).map_err(|_| EndpointError::BadPort {
                        name: name.clone(),
                        value: s.clone(),
                    })?
                }
            };
            entries.insert(name, Endpoint { mac, ip: e.ip, port });
        }

        info!(path = %path.display(), entries = entries.len(), "Loaded endpoint table");
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Endpoint)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_mac_parse() {
        let mac: MacAddr = "d8:80:39:d8:f5:f5".parse().unwrap();
        assert_eq!(mac.0, 0xd880_39d8_f5f5);
        assert_eq!(mac.lower32(), 0x39d8_f5f5);
        assert_eq!(mac.upper16(), 0xd880);
        assert_eq!(mac.to_string(), "d8:80:39:d8:f5:f5");
    }

    #[test]
    fn test_mac_rejects_wrong_separator_count() {
        assert!("d8:80:39:d8:f5".parse::<MacAddr>().is_err());
        assert!("d8-80-39-d8-f5-f5".parse::<MacAddr>().is_err());
        assert!("d8:80:39:d8:f5:f5:00".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_mac_rejects_bad_octets() {
        assert!("d8:80:39:d8:f5:zz".parse::<MacAddr>().is_err());
        assert!("d8:80:39:d8:f5:f50".parse::<MacAddr>().is_err());
    }

    fn write_table(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_load_table_with_hex_port() {
        let f = write_table(
            r#"{
                "np04-srv-001": {
                    "mac": "6c:fe:54:47:98:20",
                    "ip": "10.73.139.17",
                    "port": "4444"
                }
            }"#,
        );
        let table = EndpointTable::load(f.path()).unwrap();
        let ep = table.get("np04-srv-001").unwrap();
        assert_eq!(ep.mac.0, 0x6cfe_5447_9820);
        assert_eq!(ep.ip, Ipv4Addr::new(10, 73, 139, 17));
        assert_eq!(ep.port, 0x4444);
    }

    #[test]
    fn test_load_table_with_numeric_port() {
        let f = write_table(
            r#"{"rx0": {"mac": "00:11:22:33:44:55", "ip": "192.168.0.1", "port": 1234}}"#,
        );
        let table = EndpointTable::load(f.path()).unwrap();
        assert_eq!(table.get("rx0").unwrap().port, 1234);
    }

    #[test]
    fn test_load_rejects_malformed_mac() {
        let f = write_table(
            r#"{"bad": {"mac": "6c:fe:54:47:98", "ip": "10.73.139.17", "port": "4444"}}"#,
        );
        let err = EndpointTable::load(f.path()).unwrap_err();
        assert!(matches!(err, EndpointError::BadMac { .. }));
    }
}
