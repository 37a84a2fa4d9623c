//! The platform metadata service client, per spec.md §6: addressable,
//! device-service, profile, device, schedule, and schedule-event
//! operations, all "get-or-create" / idempotent on `409 Conflict`
//! where the lifecycle orchestrator (C8) needs that shape.

use adapter_api::{Addressable, Device, DeviceProfile, Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A device-service registration record: this adapter's own identity
/// in the platform, including the callback path the platform posts
/// `DEVICE`/`PROFILE`/`SERVICE` change notifications to (C9).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceServiceRecord {
    pub name: String,
    pub addressable: Addressable,
    pub callback_path: String,
    pub operating_state: String,
    pub admin_state: String,
    pub labels: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    pub name: String,
    pub frequency: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub name: String,
    pub schedule: String,
    pub path: String,
}

#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn get_or_create_addressable(&self, addr: &Addressable) -> Result<Addressable>;
    async fn get_or_create_device_service(&self, record: &DeviceServiceRecord) -> Result<String>;

    async fn upload_profile(&self, profile: &DeviceProfile) -> Result<()>;

    async fn get_devices_for_service(&self, service: &str) -> Result<Vec<Device>>;
    async fn get_device(&self, id: &str) -> Result<Device>;
    async fn update_device(&self, device: &Device) -> Result<()>;
    async fn delete_device(&self, id: &str) -> Result<()>;

    async fn get_or_create_schedule(&self, schedule: &Schedule) -> Result<()>;
    async fn get_or_create_schedule_event(&self, event: &ScheduleEvent) -> Result<()>;
    async fn get_schedule_events(&self, service: &str) -> Result<Vec<ScheduleEvent>>;
}

pub struct HttpMetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMetadataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpMetadataClient {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn fail(context: &str, e: impl std::fmt::Display) -> Error {
        Error::MetadataClientFail(format!("{}: {}", context, e))
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/v1/ping", self.base_url);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::fail("ping", e))?
            .error_for_status()
            .map_err(|e| Self::fail("ping status", e))?;
        Ok(())
    }

    async fn get_or_create_addressable(&self, addr: &Addressable) -> Result<Addressable> {
        let url = format!("{}/api/v1/addressable", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(addr)
            .send()
            .await
            .map_err(|e| Self::fail("create addressable", e))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(addr.clone());
        }

        resp.error_for_status()
            .map_err(|e| Self::fail("addressable status", e))?;
        Ok(addr.clone())
    }

    async fn get_or_create_device_service(&self, record: &DeviceServiceRecord) -> Result<String> {
        let url = format!("{}/api/v1/deviceservice", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(record)
            .send()
            .await
            .map_err(|e| Self::fail("create device-service", e))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(record.name.clone());
        }

        resp.error_for_status()
            .map_err(|e| Self::fail("device-service status", e))?;
        Ok(record.name.clone())
    }

    async fn upload_profile(&self, profile: &DeviceProfile) -> Result<()> {
        let url = format!("{}/api/v1/deviceprofile", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(profile)
            .send()
            .await
            .map_err(|e| Self::fail("upload profile", e))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            // Already present -- idempotent, per spec.md §4.7.
            return Ok(());
        }

        resp.error_for_status()
            .map_err(|e| Self::fail("profile status", e))?;
        Ok(())
    }

    async fn get_devices_for_service(&self, service: &str) -> Result<Vec<Device>> {
        let url = format!("{}/api/v1/device/service/{}", self.base_url, service);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::fail("get devices", e))?
            .error_for_status()
            .map_err(|e| Self::fail("get devices status", e))?
            .json::<Vec<Device>>()
            .await
            .map_err(|e| Self::fail("parse devices", e))
    }

    async fn get_device(&self, id: &str) -> Result<Device> {
        let url = format!("{}/api/v1/device/{}", self.base_url, id);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::fail("get device", e))?
            .error_for_status()
            .map_err(|e| Self::fail("get device status", e))?
            .json::<Device>()
            .await
            .map_err(|e| Self::fail("parse device", e))
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        let url = format!("{}/api/v1/device/{}", self.base_url, device.id);
        self.client
            .put(url)
            .json(device)
            .send()
            .await
            .map_err(|e| Self::fail("update device", e))?
            .error_for_status()
            .map_err(|e| Self::fail("update device status", e))?;
        Ok(())
    }

    async fn delete_device(&self, id: &str) -> Result<()> {
        let url = format!("{}/api/v1/device/{}", self.base_url, id);
        self.client
            .delete(url)
            .send()
            .await
            .map_err(|e| Self::fail("delete device", e))?
            .error_for_status()
            .map_err(|e| Self::fail("delete device status", e))?;
        Ok(())
    }

    async fn get_or_create_schedule(&self, schedule: &Schedule) -> Result<()> {
        let url = format!("{}/api/v1/schedule", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(schedule)
            .send()
            .await
            .map_err(|e| Self::fail("create schedule", e))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        resp.error_for_status()
            .map_err(|e| Self::fail("schedule status", e))?;
        Ok(())
    }

    async fn get_or_create_schedule_event(&self, event: &ScheduleEvent) -> Result<()> {
        let url = format!("{}/api/v1/scheduleevent", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|e| Self::fail("create schedule event", e))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }
        resp.error_for_status()
            .map_err(|e| Self::fail("schedule event status", e))?;
        Ok(())
    }

    async fn get_schedule_events(&self, service: &str) -> Result<Vec<ScheduleEvent>> {
        let url = format!("{}/api/v1/scheduleevent/service/{}", self.base_url, service);
        self.client
            .get(url)
            .send()
            .await
            .map_err(|e| Self::fail("get schedule events", e))?
            .error_for_status()
            .map_err(|e| Self::fail("get schedule events status", e))?
            .json::<Vec<ScheduleEvent>>()
            .await
            .map_err(|e| Self::fail("parse schedule events", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter_api::{AdminState, OperatingState};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A hand-rolled in-memory fake, standing in for a real metadata
    /// backend in orchestrator tests.
    #[derive(Default)]
    pub struct FakeMetadataClient {
        pub devices: Mutex<HashMap<String, Device>>,
        pub profiles: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetadataClient for FakeMetadataClient {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn get_or_create_addressable(&self, addr: &Addressable) -> Result<Addressable> {
            Ok(addr.clone())
        }

        async fn get_or_create_device_service(&self, record: &DeviceServiceRecord) -> Result<String> {
            Ok(record.name.clone())
        }

        async fn upload_profile(&self, profile: &DeviceProfile) -> Result<()> {
            self.profiles.lock().unwrap().push(profile.name.clone());
            Ok(())
        }

        async fn get_devices_for_service(&self, _service: &str) -> Result<Vec<Device>> {
            Ok(self.devices.lock().unwrap().values().cloned().collect())
        }

        async fn get_device(&self, id: &str) -> Result<Device> {
            self.devices
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| Error::HttpNotFound(id.to_owned()))
        }

        async fn update_device(&self, device: &Device) -> Result<()> {
            self.devices.lock().unwrap().insert(device.id.clone(), device.clone());
            Ok(())
        }

        async fn delete_device(&self, id: &str) -> Result<()> {
            self.devices.lock().unwrap().remove(id);
            Ok(())
        }

        async fn get_or_create_schedule(&self, _schedule: &Schedule) -> Result<()> {
            Ok(())
        }

        async fn get_or_create_schedule_event(&self, _event: &ScheduleEvent) -> Result<()> {
            Ok(())
        }

        async fn get_schedule_events(&self, _service: &str) -> Result<Vec<ScheduleEvent>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn fake_client_roundtrips_a_device() {
        let client = FakeMetadataClient::default();
        let device = Device {
            id: "1".into(),
            name: "therm1".into(),
            description: String::new(),
            labels: vec![],
            admin_state: AdminState::Unlocked,
            op_state: OperatingState::Enabled,
            origin_ms: 0,
            addressable: Addressable::new("therm1", "test", "localhost"),
            profile_name: "thermostat".into(),
            service: "svc".into(),
        };

        client.update_device(&device).await.unwrap();
        let fetched = client.get_device("1").await.unwrap();
        assert_eq!(fetched.name, "therm1");

        client.delete_device("1").await.unwrap();
        assert!(client.get_device("1").await.is_err());
    }
}
