use std::fmt;

/// Enumerates every error a device-adapter service can report, from the
/// lifecycle orchestrator down through the dispatcher and transform
/// engine. Driver authors mapping their own failures into this type
/// should prefer an existing variant; only add a new one if it's
/// generic enough to be useful outside of a single driver.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// The embedding adapter never supplied a `Driver` implementation.
    NoDeviceImpl,

    /// A device configuration entry is missing its `Name` field.
    NoDeviceName,

    /// A profile resource referenced a `DeviceResource` by name, but no
    /// such resource exists on the profile.
    NoDeviceVersion,

    /// An argument supplied by a caller (HTTP body, config entry) was
    /// malformed or out of range.
    InvalidArg(String),

    /// The configuration file or remote configuration failed to parse
    /// or was missing a required key.
    BadConfig(String),

    /// A platform service (metadata or data) could not be reached
    /// after exhausting `connectretries`.
    RemoteServerDown(String),

    /// The driver's `init` returned `false` or failed.
    DriverUnstart(String),

    /// An idempotent create against the metadata service reported a
    /// conflict; callers typically downgrade this to informational.
    HttpConflict,

    /// A referenced device, profile, or command does not exist.
    HttpNotFound(String),

    /// The metadata client reported a failure other than not-found or
    /// conflict.
    MetadataClientFail(String),

    /// The data client failed to post an event.
    DataClientFail(String),

    /// A resource's `assertion` did not match the transformed value.
    AssertionFailed(String),

    /// The target device's `adminState` is `LOCKED`.
    DeviceLocked,

    /// The target device's `opState` is `DISABLED`.
    DeviceDisabled,

    /// A profile resource referenced a profile that isn't registered.
    ProfileNotFound(String),

    /// An `add` was attempted for a device id or name already present
    /// in the registry.
    DuplicateDevice(String),

    /// The southbound driver call itself failed.
    DriverError(String),

    /// Reported when the peer of a communication channel (worker pool,
    /// scheduler) has closed its handle.
    MissingPeer(String),

    /// A value could not be converted to/from the type a resource
    /// declares.
    TypeError,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NoDeviceImpl => write!(f, "no driver implementation supplied"),
            Error::NoDeviceName => write!(f, "device configuration is missing a name"),
            Error::NoDeviceVersion => write!(f, "resource references an unknown device resource"),
            Error::InvalidArg(v) => write!(f, "invalid argument: {}", v),
            Error::BadConfig(v) => write!(f, "bad configuration: {}", v),
            Error::RemoteServerDown(v) => write!(f, "remote server down: {}", v),
            Error::DriverUnstart(v) => write!(f, "driver failed to start: {}", v),
            Error::HttpConflict => write!(f, "conflict"),
            Error::HttpNotFound(v) => write!(f, "not found: {}", v),
            Error::MetadataClientFail(v) => write!(f, "metadata client error: {}", v),
            Error::DataClientFail(v) => write!(f, "data client error: {}", v),
            Error::AssertionFailed(v) => write!(f, "assertion failed: {}", v),
            Error::DeviceLocked => write!(f, "device is locked"),
            Error::DeviceDisabled => write!(f, "device is disabled"),
            Error::ProfileNotFound(v) => write!(f, "profile not found: {}", v),
            Error::DuplicateDevice(v) => write!(f, "duplicate device: {}", v),
            Error::DriverError(v) => write!(f, "driver error: {}", v),
            Error::MissingPeer(v) => write!(f, "{} is missing peer", v),
            Error::TypeError => write!(f, "incorrect type"),
        }
    }
}

// Defining these lets any code that sends requests over an `mpsc`
// channel and awaits the reply in a `oneshot` translate channel errors
// into an `adapter_api::Error` with `?`.

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_error: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::MissingPeer(String::from("request channel is closed"))
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_error: tokio::sync::oneshot::error::RecvError) -> Self {
        Error::MissingPeer(String::from("request dropped"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
