//! Types and driver contract shared by every device-adapter service
//! built on `adapter-runtime`. A driver author depends only on this
//! crate: it defines the value model, the device/profile schema, and
//! the `Driver` trait the runtime calls into. It has no networking,
//! scheduling, or registry code of its own.

mod addressable;
mod device;
mod driver;
mod error;
mod profile;
mod reading;
mod value;

pub use addressable::Addressable;
pub use device::{AdminState, Device, OperatingState, ResolvedDevice};
pub use driver::{AddDevice, Driver, DriverConfig, DriverReading, DriverRequest};
pub use error::{Error, Result};
pub use profile::{
    DeviceProfile, DeviceResource, PropertyValue, ProfileResource, ReadWrite, ResourceOperation,
    ResourceProperties,
};
pub use reading::{Event, Reading};
pub use value::{parse_as, Value};
