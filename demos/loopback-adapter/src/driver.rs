//! A driver that never touches real hardware: every resource value
//! lives in a `Mutex<HashMap>` and a `PUT` simply overwrites what the
//! next `GET` will return. Exists to exercise `adapter-runtime` end to
//! end without a protocol to integrate against.

use adapter_api::{
    AddDevice, Addressable, AdminState, Device, DriverConfig, DriverReading, DriverRequest, OperatingState,
    Result, Value,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-device resource values, keyed by the device's `Addressable.name`
/// then by resource name. Seeded lazily on first access so newly
/// discovered devices don't need special-casing.
pub struct LoopbackDriver {
    values: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        LoopbackDriver {
            values: Mutex::new(HashMap::new()),
        }
    }

    fn seed(name: &str) -> HashMap<String, Value> {
        let mut seed = HashMap::new();
        seed.insert(String::from("temperature"), Value::Float64(72.0));
        seed.insert(String::from("setpoint"), Value::Float64(70.0));
        seed.insert(String::from("humidity"), Value::Float64(45.0));
        tracing::debug!(device = name, "seeded loopback state");
        seed
    }
}

impl Default for LoopbackDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl adapter_api::Driver for LoopbackDriver {
    async fn init(&mut self, _cfg: &DriverConfig) -> Result<bool> {
        Ok(true)
    }

    async fn handle_get(&self, addressable: &Addressable, requests: &[DriverRequest]) -> Result<Vec<DriverReading>> {
        let mut values = self.values.lock().unwrap();
        let state = values
            .entry(addressable.name.clone())
            .or_insert_with(|| Self::seed(&addressable.name));

        Ok(requests
            .iter()
            .filter_map(|req| {
                state.get(&req.resource_name).map(|v| DriverReading {
                    resource_name: req.resource_name.clone(),
                    value: v.clone(),
                    origin_ms: None,
                })
            })
            .collect())
    }

    async fn handle_put(&self, addressable: &Addressable, requests: &[DriverRequest], values: &[Value]) -> Result<()> {
        let mut state = self.values.lock().unwrap();
        let state = state
            .entry(addressable.name.clone())
            .or_insert_with(|| Self::seed(&addressable.name));

        for (req, value) in requests.iter().zip(values) {
            state.insert(req.resource_name.clone(), value.clone());
        }

        Ok(())
    }

    async fn discover(&self, add: &dyn AddDevice) {
        let device = Device {
            id: String::new(),
            name: String::from("loopback-discovered"),
            description: String::from("registered by driver discovery"),
            labels: vec![String::from("loopback")],
            admin_state: AdminState::Unlocked,
            op_state: OperatingState::Enabled,
            origin_ms: 0,
            addressable: Addressable::new("loopback-discovered", "loopback", "localhost"),
            profile_name: String::from("thermostat"),
            service: String::new(),
        };

        match add.add_device(device).await {
            Ok(id) => tracing::info!(id, "discovery registered a device"),
            Err(e) => tracing::warn!(error = %e, "discovery failed to register device"),
        }
    }

    async fn stop(&mut self, _force: bool) {}
}
