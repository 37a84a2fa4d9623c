//! C8 — the lifecycle orchestrator: the eight-phase startup state
//! machine (spec.md §4.7) that wires configuration, the platform
//! clients, the registry, the driver, and the scheduler into a running
//! service, plus the reverse-order shutdown sequence.
//!
//! `start()` drives every transition in one pass and returns a fully
//! `SCHEDULED` `Lifecycle`; the embedding binary then hands its
//! [`dispatch_context`](Lifecycle::dispatch_context) to the HTTP server
//! (`server.rs`) and registers the driver's `/discovery` trigger. This
//! mirrors the split in `drmemd::main::run` between `core::start`
//! (state machine) and the graphql server spawned alongside it.

use crate::clients::{retry, ConfigRegistryClient, DataClient, MetadataClient};
use crate::config::Config;
use crate::dispatch::{self, DispatchContext};
use crate::duration::parse_iso8601;
use crate::event::EventPublisher;
use crate::pool::WorkerPool;
use crate::registry::DeviceRegistry;
use crate::scheduler::{ScheduledTask, Scheduler};
use adapter_api::{
    AddDevice, AdminState, Addressable, Device, Driver, Error, OperatingState, Result,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// The eight states spec.md §4.7 names. Each `Lifecycle::start` phase
/// below implements exactly one arrow out of the diagram; `Phase` is
/// kept only to report how far startup got when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    ConfigLoaded,
    PlatformReady,
    Registered,
    ProfilesUploaded,
    DevicesLoaded,
    Serving,
    Scheduled,
}

pub struct Lifecycle {
    pub config: Config,
    pub registry: Arc<DeviceRegistry>,
    pub driver: Arc<RwLock<Box<dyn Driver>>>,
    pub pool: Arc<WorkerPool>,
    pub scheduler: Arc<Scheduler>,
    pub events: Arc<EventPublisher>,
    pub data_client: Arc<dyn DataClient>,
    pub metadata_client: Arc<dyn MetadataClient>,
    pub config_registry_client: Option<Arc<dyn ConfigRegistryClient>>,
    pub service_name: String,
}

/// Lets a driver's `discover` register new devices without holding a
/// reference to the registry itself (spec.md §6, southbound contract).
/// Owned (rather than borrowed, like [`RegistryAddDeviceRef`]) so the
/// northbound `/discovery` handler can hand it to a detached task that
/// outlives the HTTP request.
pub(crate) struct RegistryAddDevice(pub Arc<DeviceRegistry>);

#[async_trait::async_trait]
impl AddDevice for RegistryAddDevice {
    async fn add_device(&self, device: Device) -> Result<String> {
        self.0.add_or_get(device).await
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn config_to_table(cfg: &Config) -> Result<toml::value::Table> {
    match toml::Value::try_from(cfg).map_err(|e| Error::BadConfig(e.to_string()))? {
        toml::Value::Table(t) => Ok(t),
        _ => Err(Error::BadConfig("configuration did not serialize to a table".into())),
    }
}

impl Lifecycle {
    /// Runs every startup transition in sequence. On any fatal error,
    /// the caller is expected to invoke `shutdown(true)` on whatever
    /// partial state was already constructed (spec.md §7, "partial
    /// state is torn down by the caller invoking `stop(force=true)`).
    #[tracing::instrument(name = "starting service", skip_all)]
    pub async fn start(
        service_name: impl Into<String>,
        config: Config,
        mut driver: Box<dyn Driver>,
        data_client: Arc<dyn DataClient>,
        metadata_client: Arc<dyn MetadataClient>,
        config_registry_client: Option<Arc<dyn ConfigRegistryClient>>,
    ) -> Result<Arc<Lifecycle>> {
        let service_name = service_name.into();

        // INIT -> CONFIG_LOADED
        let config = Self::resolve_config(config, &service_name, config_registry_client.as_ref()).await?;
        tracing::info!(phase = ?Phase::ConfigLoaded, "configuration resolved");

        // CONFIG_LOADED -> PLATFORM_READY
        let retries = config.service.connect_retries;
        let delay = Duration::from_millis(config.service.timeout);

        retry(retries, delay, || data_client.ping())
            .await
            .map_err(|_| Error::RemoteServerDown(format!("data service after {} attempts", retries)))?;
        retry(retries, delay, || metadata_client.ping())
            .await
            .map_err(|_| Error::RemoteServerDown(format!("metadata service after {} attempts", retries)))?;
        tracing::info!(phase = ?Phase::PlatformReady, "platform services reachable");

        // PLATFORM_READY -> REGISTERED
        let own_addressable = Addressable {
            id: String::new(),
            name: service_name.clone(),
            origin_ms: now_ms(),
            protocol: String::from("http"),
            method: String::new(),
            address: config.service.host.clone(),
            port: config.service.port,
            path: String::new(),
        };
        let own_addressable = metadata_client.get_or_create_addressable(&own_addressable).await?;

        metadata_client
            .get_or_create_device_service(&crate::clients::DeviceServiceRecord {
                name: service_name.clone(),
                addressable: own_addressable,
                callback_path: String::from("/api/v1/callback"),
                operating_state: OperatingState::Enabled.to_string(),
                admin_state: AdminState::Unlocked.to_string(),
                labels: config.service.labels.clone(),
            })
            .await?;
        tracing::info!(phase = ?Phase::Registered, service = %service_name, "device service registered");

        let registry = Arc::new(DeviceRegistry::new());

        // REGISTERED -> PROFILES_UPLOADED
        Self::load_profiles(&config, &registry, &metadata_client).await?;
        tracing::info!(phase = ?Phase::ProfilesUploaded, "profiles uploaded");

        // PROFILES_UPLOADED -> DEVICES_LOADED
        Self::load_devices(&config, &service_name, &registry, &metadata_client).await?;
        tracing::info!(phase = ?Phase::DevicesLoaded, count = registry.all().await.len(), "devices loaded");

        // DEVICES_LOADED -> SERVING
        let ok = driver
            .init(&config.driver)
            .await
            .map_err(|e| Error::DriverUnstart(e.to_string()))?;
        if !ok {
            return Err(Error::DriverUnstart(String::from("driver init returned false")));
        }
        tracing::info!(phase = ?Phase::Serving, "driver initialized");

        let pool = WorkerPool::new(8);
        let scheduler = Arc::new(Scheduler::new(pool.clone()));
        let events = Arc::new(EventPublisher::new(pool.clone(), data_client.clone()));
        let driver = Arc::new(RwLock::new(driver));

        let lifecycle = Arc::new(Lifecycle {
            config,
            registry,
            driver,
            pool,
            scheduler,
            events,
            data_client,
            metadata_client,
            config_registry_client,
            service_name,
        });

        // SERVING -> SCHEDULED
        lifecycle.start_schedules().await?;
        lifecycle.scheduler.start().await;
        tracing::info!(phase = ?Phase::Scheduled, "scheduler started");

        if let Some(registry_client) = &lifecycle.config_registry_client {
            if let Err(e) = registry_client.register_service(&lifecycle.service_name).await {
                tracing::warn!(error = %e, "health-check registration failed, continuing without it");
            }
        }

        Ok(lifecycle)
    }

    async fn resolve_config(
        local: Config,
        service_name: &str,
        registry_client: Option<&Arc<dyn ConfigRegistryClient>>,
    ) -> Result<Config> {
        let Some(client) = registry_client else {
            return Ok(local);
        };

        match client.get_config(service_name).await? {
            Some(table) => toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| Error::BadConfig(e.to_string())),
            None => {
                let table = config_to_table(&local)?;
                client.put_config(service_name, &table).await?;
                Ok(local)
            }
        }
    }

    async fn load_profiles(
        config: &Config,
        registry: &DeviceRegistry,
        metadata_client: &Arc<dyn MetadataClient>,
    ) -> Result<()> {
        let mut entries = match tokio::fs::read_dir(&config.device.profiles_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %config.device.profiles_dir, error = %e, "profiles directory unreadable");
                return Ok(());
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }

            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::BadConfig(format!("{}: {}", path.display(), e)))?;
            let profile: adapter_api::DeviceProfile =
                toml::from_str(&contents).map_err(|e| Error::BadConfig(format!("{}: {}", path.display(), e)))?;

            match registry.add_profile(profile.clone()).await {
                Ok(()) | Err(Error::HttpConflict) => {}
                Err(e) => return Err(e),
            }

            metadata_client.upload_profile(&profile).await?;
        }

        Ok(())
    }

    async fn load_devices(
        config: &Config,
        service_name: &str,
        registry: &DeviceRegistry,
        metadata_client: &Arc<dyn MetadataClient>,
    ) -> Result<()> {
        for device in metadata_client.get_devices_for_service(service_name).await? {
            if !registry.has_profile(&device.profile_name).await {
                tracing::warn!(device = %device.name, profile = %device.profile_name, "skipping device with unknown profile");
                continue;
            }
            registry.add_or_get(device).await?;
        }

        for entry in &config.device_list {
            if registry.get_by_name(&entry.name).await.is_some() {
                continue;
            }

            let addressable = metadata_client
                .get_or_create_addressable(&entry.addressable.clone().into_addressable(&entry.name))
                .await?;

            let device = Device {
                id: format!("{}:{}", service_name, entry.name),
                name: entry.name.clone(),
                description: entry.description.clone(),
                labels: entry.labels.clone(),
                admin_state: AdminState::Unlocked,
                op_state: OperatingState::Enabled,
                origin_ms: now_ms(),
                addressable,
                profile_name: entry.profile.clone(),
                service: service_name.to_owned(),
            };

            metadata_client.update_device(&device).await?;
            registry.add_or_get(device).await?;
        }

        Ok(())
    }

    async fn start_schedules(&self) -> Result<()> {
        for (name, cfg_event) in &self.config.schedule_events {
            let event = crate::clients::ScheduleEvent {
                name: name.clone(),
                schedule: cfg_event.schedule.clone(),
                path: cfg_event.path.clone(),
            };
            self.metadata_client
                .get_or_create_schedule_event(&event)
                .await
                .or_else(|e| if e == Error::HttpConflict { Ok(()) } else { Err(e) })?;
        }

        for (name, frequency) in &self.config.schedules {
            self.metadata_client
                .get_or_create_schedule(&crate::clients::Schedule {
                    name: name.clone(),
                    frequency: frequency.clone(),
                })
                .await
                .or_else(|e| if e == Error::HttpConflict { Ok(()) } else { Err(e) })?;
        }

        let events = self.metadata_client.get_schedule_events(&self.service_name).await?;

        for event in events {
            let frequency = self
                .config
                .schedules
                .get(&event.schedule)
                .ok_or_else(|| Error::BadConfig(format!("schedule '{}' not configured locally", event.schedule)))?;
            let interval_secs = parse_iso8601(frequency)?;

            let (ctx_builder, target) = self.schedule_target(&event.path)?;
            let start = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos() as u64;

            self.scheduler
                .add_task(ScheduledTask::new(interval_secs * 1_000_000_000, start, 0, move || {
                    let ctx = ctx_builder.clone();
                    let target = target.clone();
                    async move { fire_scheduled(ctx, target).await }
                }))
                .await;
        }

        Ok(())
    }

    /// Parses a `ScheduleEvent.path` into the `(selector, command)` the
    /// dispatcher expects, or `None` for a path targeting discovery.
    /// Invalid paths are fatal per spec.md §4.7 ("Invalid paths ->
    /// fatal `BadConfig`").
    fn schedule_target(&self, path: &str) -> Result<(DispatchContext, ScheduleTarget)> {
        let ctx = self.dispatch_context();

        if path == "/api/v1/discovery" {
            return Ok((ctx, ScheduleTarget::Discovery(self.driver.clone())));
        }

        let rest = path
            .strip_prefix("/api/v1/device/")
            .ok_or_else(|| Error::BadConfig(format!("schedule event path '{}' is not a recognized route", path)))?;
        let mut parts = rest.splitn(3, '/');
        let (a, b, c) = (parts.next(), parts.next(), parts.next());

        let (selector, command) = match (a, b, c) {
            (Some("all"), Some(command), None) => (String::from("all"), command.to_owned()),
            (Some(kind @ ("id" | "name")), Some(value), Some(command)) => {
                (format!("{}/{}", kind, value), command.to_owned())
            }
            _ => return Err(Error::BadConfig(format!("malformed device path '{}'", path))),
        };

        Ok((ctx, ScheduleTarget::Device { selector, command }))
    }

    pub fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            registry: self.registry.clone(),
            driver: self.driver.clone(),
            pool: self.pool.clone(),
            events: self.events.clone(),
            data_transform: self.config.device.data_transform,
        }
    }

    /// Reverse-order teardown per spec.md §4.7: scheduler, then driver,
    /// then the worker pool (drained gracefully unless `force`), then
    /// the registry. The HTTP listener itself is owned and stopped by
    /// the embedding binary, one layer above this call.
    pub async fn shutdown(&self, force: bool) {
        self.scheduler.stop().await;

        self.driver.write().await.stop(force).await;

        if force {
            self.pool.shutdown_forced().await;
        } else {
            self.pool.shutdown().await;
        }

        for device in self.registry.all().await {
            let _ = self.registry.remove(crate::registry::DeviceKey::Id(&device.id)).await;
        }
    }
}

#[derive(Clone)]
enum ScheduleTarget {
    Discovery(Arc<RwLock<Box<dyn Driver>>>),
    Device { selector: String, command: String },
}

async fn fire_scheduled(ctx: DispatchContext, target: ScheduleTarget) {
    match target {
        ScheduleTarget::Discovery(driver) => {
            let driver = driver.read().await;
            let add = RegistryAddDeviceRef(&ctx.registry);
            driver.discover(&add).await;
        }
        ScheduleTarget::Device { selector, command } => {
            let result = if selector == "all" {
                dispatch::handle_get_all(&ctx, &command).await.status()
            } else {
                match dispatch::handle_get(&ctx, &selector, &command).await {
                    Ok(_) => 200,
                    Err(e) => e.status(),
                }
            };
            if result >= 400 {
                tracing::warn!(selector = %selector, command = %command, status = result, "scheduled read failed");
            }
        }
    }
}

/// A borrowed-registry `AddDevice` for the brief span of a scheduled
/// discovery firing; avoids needing an owned `Arc` clone just to
/// satisfy the trait object lifetime.
struct RegistryAddDeviceRef<'a>(&'a Arc<DeviceRegistry>);

#[async_trait::async_trait]
impl<'a> AddDevice for RegistryAddDeviceRef<'a> {
    async fn add_device(&self, device: Device) -> Result<String> {
        self.0.add_or_get(device).await
    }
}
