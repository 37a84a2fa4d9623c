use serde_derive::{Deserialize, Serialize};

/// The network-locator record for a device or for this adapter itself.
/// Names are unique within the platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Addressable {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub origin_ms: i64,
    pub protocol: String,
    #[serde(default)]
    pub method: String,
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path: String,
}

impl Addressable {
    pub fn new(name: impl Into<String>, protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Addressable {
            id: String::new(),
            name: name.into(),
            origin_ms: 0,
            protocol: protocol.into(),
            method: String::new(),
            address: address.into(),
            port: 0,
            path: String::new(),
        }
    }
}
