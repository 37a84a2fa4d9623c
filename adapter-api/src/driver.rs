use crate::addressable::Addressable;
use crate::device::Device;
use crate::error::Result;
use crate::value::Value;
use async_trait::async_trait;
use toml::value;

/// How configuration is handed to a driver: a flat TOML table of
/// name/value pairs, taken verbatim from the `[Driver]` section of the
/// adapter's configuration file. The runtime never interprets these
/// keys; only the driver does.
pub type DriverConfig = value::Table;

/// A single resource read or write, resolved against a device's
/// profile and ready for the driver to execute. `parameter` carries
/// the `ResourceOperation.parameter` field verbatim (protocol-specific
/// hints such as a register width or command code).
#[derive(Clone, Debug)]
pub struct DriverRequest {
    pub resource_name: String,
    pub attributes: std::collections::HashMap<String, String>,
    pub parameter: Option<String>,
}

/// The result of executing one `DriverRequest` via `handle_get`.
#[derive(Clone, Debug)]
pub struct DriverReading {
    pub resource_name: String,
    pub value: Value,
    /// `None` means "use the current time"; the dispatcher fills it in.
    pub origin_ms: Option<i64>,
}

/// Callback a driver uses from within `discover` to register newly
/// found devices with the runtime. Implemented by `adapter-runtime`'s
/// lifecycle orchestrator and handed to the driver at `init` time, so
/// the driver never needs a reference to the registry itself.
#[async_trait]
pub trait AddDevice: Send + Sync {
    /// Registers `device` with the runtime. Returns the id assigned to
    /// the device -- if a device of the same name already exists, its
    /// existing id is returned instead of creating a duplicate (the
    /// `409 Conflict` downgrade described in spec.md §4.8/§8).
    async fn add_device(&self, device: Device) -> Result<String>;
}

/// The southbound contract every protocol-specific driver implements.
/// An adapter process embeds exactly one `Driver` instance; the
/// runtime calls its methods from the lifecycle orchestrator (C8), the
/// command dispatcher (C4), and the northbound `/discovery` endpoint.
///
/// Drivers are responsible for their own internal thread/task safety:
/// the runtime holds no lock while a driver call is in flight, and
/// `handle_get`/`handle_put` may be invoked concurrently for different
/// devices.
#[async_trait]
pub trait Driver: Send + Sync {
    /// One-time setup. `cfg` is the `[Driver]` table from
    /// configuration. Returning `Ok(false)` or `Err(_)` both abort
    /// startup with `DriverUnstart`.
    async fn init(&mut self, cfg: &DriverConfig) -> Result<bool>;

    /// Executes a batch of reads against a single device, addressed by
    /// its `Addressable`. Returns one `DriverReading` per successful
    /// request; drivers that can't satisfy part of a batch should
    /// simply omit the corresponding reading rather than failing the
    /// whole call, unless the failure is systemic (e.g. the device is
    /// unreachable), in which case `Err` fails the entire command.
    async fn handle_get(
        &self,
        addressable: &Addressable,
        requests: &[DriverRequest],
    ) -> Result<Vec<DriverReading>>;

    /// Executes a batch of writes against a single device. `values`
    /// are already type-coerced and range-checked by the dispatcher
    /// and have had the inverse transform (§4.2) applied; the driver
    /// receives exactly what should be written to the hardware.
    async fn handle_put(
        &self,
        addressable: &Addressable,
        requests: &[DriverRequest],
        values: &[Value],
    ) -> Result<()>;

    /// Asynchronous discovery: probes for new devices and registers
    /// any it finds via `add`. Returns once the scan completes; the
    /// dispatcher does not wait for it (`POST /discovery` returns
    /// `200` immediately after spawning this call).
    async fn discover(&self, add: &dyn AddDevice);

    /// Graceful (`force == false`) or forced (`force == true`)
    /// shutdown. Forced shutdown should return promptly even if
    /// in-flight hardware operations are abandoned.
    async fn stop(&mut self, force: bool);
}
