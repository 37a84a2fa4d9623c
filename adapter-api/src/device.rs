use crate::addressable::Addressable;
use crate::profile::DeviceProfile;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    #[serde(rename = "LOCKED")]
    Locked,
    #[serde(rename = "UNLOCKED")]
    Unlocked,
}

impl fmt::Display for AdminState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminState::Locked => write!(f, "LOCKED"),
            AdminState::Unlocked => write!(f, "UNLOCKED"),
        }
    }
}

impl FromStr for AdminState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOCKED" => Ok(AdminState::Locked),
            "UNLOCKED" => Ok(AdminState::Unlocked),
            _ => Err(crate::Error::InvalidArg(format!("bad adminState '{}'", s))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingState {
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "DISABLED")]
    Disabled,
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingState::Enabled => write!(f, "ENABLED"),
            OperatingState::Disabled => write!(f, "DISABLED"),
        }
    }
}

impl FromStr for OperatingState {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENABLED" => Ok(OperatingState::Enabled),
            "DISABLED" => Ok(OperatingState::Disabled),
            _ => Err(crate::Error::InvalidArg(format!("bad opState '{}'", s))),
        }
    }
}

/// A managed endpoint with a name, id, addressable, and profile
/// reference. The registry (C2 in `adapter-runtime`) owns the
/// authoritative copies; this type is also what gets handed back to
/// callers of `snapshot`/`get_by_*` as an owned, detached value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub admin_state: AdminState,
    pub op_state: OperatingState,
    #[serde(default)]
    pub origin_ms: i64,
    pub addressable: Addressable,
    /// Name of the `DeviceProfile` this device uses. The profile
    /// itself lives in the registry's separate profile map; devices
    /// reference it by name rather than embedding a copy.
    pub profile_name: String,
    #[serde(default)]
    pub service: String,
}

impl Device {
    pub fn is_serviceable(&self) -> bool {
        self.admin_state == AdminState::Unlocked && self.op_state == OperatingState::Enabled
    }
}

/// A `Device` together with the `DeviceProfile` it currently resolves
/// to. Produced by the registry when a caller needs both; kept as a
/// separate type so `Device` itself stays cheap to store without a
/// second owned copy of every profile it references.
#[derive(Clone, Debug)]
pub struct ResolvedDevice {
    pub device: Device,
    pub profile: DeviceProfile,
}
