use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// The numeric/enumeration transform parameters and type constraints
/// for a single resource's value. See the transform engine (C3) in
/// `adapter-runtime` for how these are applied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub read_write: ReadWrite,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub default_value: Option<String>,
    pub base: Option<f64>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
    pub mask: Option<i64>,
    pub shift: Option<i32>,
    pub assertion: Option<String>,
    pub media_type: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadWrite {
    #[default]
    #[serde(rename = "R")]
    Read,
    #[serde(rename = "W")]
    Write,
    #[serde(rename = "RW")]
    ReadWrite,
}

impl ReadWrite {
    pub fn readable(&self) -> bool {
        matches!(self, ReadWrite::Read | ReadWrite::ReadWrite)
    }

    pub fn writable(&self) -> bool {
        matches!(self, ReadWrite::Write | ReadWrite::ReadWrite)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceProperties {
    pub value: PropertyValue,
    #[serde(default)]
    pub units: Option<String>,
}

/// A named, typed readable/writable datum on a device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceResource {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub properties: ResourceProperties,
    /// Driver-opaque routing hints (register address, bit offset,
    /// whatever the protocol needs); never interpreted by the runtime.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// One step in a profile resource's `get`/`set` list: which operation
/// to apply, against which `DeviceResource`, with which driver-facing
/// parameter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOperation {
    pub index: u32,
    #[serde(default)]
    pub operation: String,
    pub object: String,
    #[serde(default)]
    pub parameter: Option<String>,
    /// Enumeration remap applied to the stringified value (outgoing)
    /// or consulted in reverse (incoming).
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

/// A named, HTTP-callable bundle of resource operations (a "command").
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileResource {
    pub name: String,
    #[serde(default)]
    pub get: Vec<ResourceOperation>,
    #[serde(default)]
    pub set: Vec<ResourceOperation>,
}

impl ProfileResource {
    /// `true` if every `ResourceOperation` in `get` for this command,
    /// in index order, references a `DeviceResource` that exists.
    pub fn is_readable(&self) -> bool {
        !self.get.is_empty()
    }

    pub fn is_writable(&self) -> bool {
        !self.set.is_empty()
    }
}

/// A schema of resources and commands a device supports.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub device_resources: Vec<DeviceResource>,
    #[serde(default)]
    pub resources: Vec<ProfileResource>,
    /// Names of commands, as listed in `resources`. Kept separately
    /// (rather than derived) because the wire format the platform
    /// metadata service returns lists them this way too.
    #[serde(default)]
    pub commands: Vec<String>,
}

impl DeviceProfile {
    pub fn device_resource(&self, name: &str) -> Option<&DeviceResource> {
        self.device_resources.iter().find(|r| r.name == name)
    }

    pub fn command(&self, name: &str) -> Option<&ProfileResource> {
        self.resources.iter().find(|r| r.name == name)
    }
}
