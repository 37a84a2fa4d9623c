//! C2 — the in-process registry of devices and profiles.
//!
//! The device/name maps are guarded by one writer-preference lock
//! ([`crate::sync::FairRwLock`]) so a burst of concurrent
//! `selector=all` reads can never starve a discovery or callback
//! write. The profile map gets its own, independent `tokio::sync::
//! Mutex`, exactly as spec.md §4.1 calls for ("Profile map uses its
//! own mutex (independent hot path)").

use crate::sync::FairRwLock;
use adapter_api::{Device, DeviceProfile, Error, Result};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Identifies a device either by its platform-assigned id or by its
/// unique name. Mirrors the `{id/<id>, name/<name>}` selector forms in
/// the northbound URL grammar (spec.md §4.3).
#[derive(Clone, Copy, Debug)]
pub enum DeviceKey<'a> {
    Id(&'a str),
    Name(&'a str),
}

struct DeviceMaps {
    devices_by_id: HashMap<String, Device>,
    name_to_id: HashMap<String, String>,
}

impl DeviceMaps {
    fn resolve_id(&self, key: DeviceKey<'_>) -> Option<String> {
        match key {
            DeviceKey::Id(id) => self.devices_by_id.contains_key(id).then(|| id.to_owned()),
            DeviceKey::Name(name) => self.name_to_id.get(name).cloned(),
        }
    }
}

pub struct DeviceRegistry {
    devices: FairRwLock<DeviceMaps>,
    profiles: Mutex<HashMap<String, DeviceProfile>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        DeviceRegistry {
            devices: FairRwLock::new(DeviceMaps {
                devices_by_id: HashMap::new(),
                name_to_id: HashMap::new(),
            }),
            profiles: Mutex::new(HashMap::new()),
        }
    }

    // -- devices ----------------------------------------------------

    pub async fn get(&self, key: DeviceKey<'_>) -> Option<Device> {
        let g = self.devices.read().await;
        let id = g.resolve_id(key)?;
        g.devices_by_id.get(&id).cloned()
    }

    pub async fn get_by_id(&self, id: &str) -> Option<Device> {
        self.get(DeviceKey::Id(id)).await
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Device> {
        self.get(DeviceKey::Name(name)).await
    }

    /// All devices currently registered, in unspecified order. Used by
    /// the `selector=all` fan-out in the dispatcher.
    pub async fn all(&self) -> Vec<Device> {
        let g = self.devices.read().await;
        g.devices_by_id.values().cloned().collect()
    }

    /// Registers `device`. Rejects a duplicate id or name with
    /// `Error::DuplicateDevice`, and rejects a device whose profile
    /// isn't already registered with `Error::ProfileNotFound`
    /// (spec.md §3's registry invariant: "every device references a
    /// profile that exists in `profiles_by_name` at insertion time").
    pub async fn add(&self, device: Device) -> Result<String> {
        {
            let profiles = self.profiles.lock().await;
            if !profiles.contains_key(&device.profile_name) {
                return Err(Error::ProfileNotFound(device.profile_name.clone()));
            }
        }

        let mut g = self.devices.write().await;

        if g.devices_by_id.contains_key(&device.id) || g.name_to_id.contains_key(&device.name) {
            return Err(Error::DuplicateDevice(device.name.clone()));
        }

        let id = device.id.clone();

        g.name_to_id.insert(device.name.clone(), id.clone());
        g.devices_by_id.insert(id.clone(), device);

        Ok(id)
    }

    /// Idempotent variant of `add`: if a device of the same name
    /// already exists, returns its existing id instead of erroring.
    /// This is the "`add_device` returning `409` for duplicate name
    /// returns the existing id" behavior spec.md §8 scenario 4
    /// describes for discovery and the callback handler.
    pub async fn add_or_get(&self, device: Device) -> Result<String> {
        let name = device.name.clone();

        match self.add(device).await {
            Err(Error::DuplicateDevice(_)) => self
                .get_by_name(&name)
                .await
                .map(|d| d.id)
                .ok_or(Error::DuplicateDevice(name)),
            other => other,
        }
    }

    /// Atomically replaces the device identified by `key` with the
    /// result of applying `mutate`. If `mutate` changes the device's
    /// name, both maps are updated within the same write lock
    /// acquisition, per spec.md §4.1.
    pub async fn update(&self, key: DeviceKey<'_>, mutate: impl FnOnce(&mut Device)) -> Result<()> {
        let mut g = self.devices.write().await;

        let id = g
            .resolve_id(key)
            .ok_or_else(|| Error::HttpNotFound(key_label(key)))?;
        let old_name = g.devices_by_id.get(&id).map(|d| d.name.clone()).unwrap();
        let mut updated = g.devices_by_id.get(&id).cloned().unwrap();

        mutate(&mut updated);

        if updated.name != old_name {
            g.name_to_id.remove(&old_name);
            g.name_to_id.insert(updated.name.clone(), id.clone());
        }

        g.devices_by_id.insert(id, updated);
        Ok(())
    }

    pub async fn remove(&self, key: DeviceKey<'_>) -> Result<()> {
        let mut g = self.devices.write().await;
        let id = g
            .resolve_id(key)
            .ok_or_else(|| Error::HttpNotFound(key_label(key)))?;

        if let Some(device) = g.devices_by_id.remove(&id) {
            g.name_to_id.remove(&device.name);
        }

        Ok(())
    }

    /// Resolves a device together with its current profile in one
    /// call, the shape the dispatcher needs for every request.
    pub async fn resolve(&self, key: DeviceKey<'_>) -> Result<adapter_api::ResolvedDevice> {
        let device = self
            .get(key)
            .await
            .ok_or_else(|| Error::HttpNotFound(key_label(key)))?;
        let profile = self
            .get_profile(&device.profile_name)
            .await
            .ok_or_else(|| Error::ProfileNotFound(device.profile_name.clone()))?;

        Ok(adapter_api::ResolvedDevice { device, profile })
    }

    // -- profiles -----------------------------------------------------

    pub async fn add_profile(&self, profile: DeviceProfile) -> Result<()> {
        let mut p = self.profiles.lock().await;

        if p.contains_key(&profile.name) {
            return Err(Error::HttpConflict);
        }

        p.insert(profile.name.clone(), profile);
        Ok(())
    }

    pub async fn has_profile(&self, name: &str) -> bool {
        self.profiles.lock().await.contains_key(name)
    }

    pub async fn get_profile(&self, name: &str) -> Option<DeviceProfile> {
        self.profiles.lock().await.get(name).cloned()
    }

    /// Forbidden while any device references the profile, per
    /// spec.md §3's registry invariant.
    pub async fn remove_profile(&self, name: &str) -> Result<()> {
        {
            let g = self.devices.read().await;
            if g.devices_by_id.values().any(|d| d.profile_name == name) {
                return Err(Error::HttpConflict);
            }
        }

        self.profiles.lock().await.remove(name);
        Ok(())
    }

    /// Deep copies of every registered profile; shared-read only.
    pub async fn snapshot_profiles(&self) -> Vec<DeviceProfile> {
        self.profiles.lock().await.values().cloned().collect()
    }
}

fn key_label(key: DeviceKey<'_>) -> String {
    match key {
        DeviceKey::Id(id) => id.to_owned(),
        DeviceKey::Name(name) => name.to_owned(),
    }
}
