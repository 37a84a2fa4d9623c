//! C4 — the command dispatcher: turns an HTTP (or scheduler-synthesized,
//! see spec.md §9 "Scheduled self-HTTP") request for `/api/v1/device/
//! {selector}/{command}` into driver calls, transformed readings, and
//! an emitted event, per spec.md §4.3.
//!
//! `handle_get`/`handle_put` are deliberately callable with nothing but
//! a selector string and a command name -- no `http::Request` in sight
//! -- so the scheduler (C7) can invoke the exact same pipeline a real
//! HTTP request would, per the open-question decision recorded in
//! DESIGN.md: auto-events call this module directly rather than
//! issuing a loopback HTTP request.

use crate::event::EventPublisher;
use crate::pool::WorkerPool;
use crate::registry::{DeviceKey, DeviceRegistry};
use crate::transform;
use adapter_api::{
    AdminState, Device, DeviceResource, Driver, DriverRequest, Error as ApiError, OperatingState, Reading,
    ResolvedDevice, ResourceOperation, Value,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, RwLock};

/// Every HTTP status `spec.md §6` enumerates for the northbound API,
/// represented as the dispatcher's own error type rather than leaking
/// an ad hoc mix of `adapter_api::Error` variants and raw status codes
/// out to the HTTP layer.
#[derive(Debug, Clone)]
pub enum DispatchError {
    NotFound(String),
    MethodNotAllowed,
    Locked,
    BadRequest(String),
    Conflict,
    DriverError(String),
    ServerError(String),
}

impl DispatchError {
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::NotFound(_) => 404,
            DispatchError::MethodNotAllowed => 405,
            DispatchError::Locked => 423,
            DispatchError::BadRequest(_) => 400,
            DispatchError::Conflict => 409,
            DispatchError::DriverError(_) => 502,
            DispatchError::ServerError(_) => 500,
        }
    }

    pub fn message(&self) -> String {
        match self {
            DispatchError::NotFound(v) => format!("not found: {}", v),
            DispatchError::MethodNotAllowed => String::from("method not allowed"),
            DispatchError::Locked => String::from("device is locked or disabled"),
            DispatchError::BadRequest(v) => v.clone(),
            DispatchError::Conflict => String::from("conflict"),
            DispatchError::DriverError(v) => format!("driver error: {}", v),
            DispatchError::ServerError(v) => v.clone(),
        }
    }
}

impl From<ApiError> for DispatchError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::HttpNotFound(v) | ApiError::ProfileNotFound(v) => DispatchError::NotFound(v),
            ApiError::HttpConflict | ApiError::DuplicateDevice(_) => DispatchError::Conflict,
            ApiError::DeviceLocked | ApiError::DeviceDisabled => DispatchError::Locked,
            ApiError::InvalidArg(v) | ApiError::AssertionFailed(v) => DispatchError::BadRequest(v),
            ApiError::DriverError(v) => DispatchError::DriverError(v),
            other => DispatchError::ServerError(other.to_string()),
        }
    }
}

/// Identifies the target(s) of a device request, parsed from the URL
/// segment between `/device/` and the command name (spec.md §4.3).
#[derive(Debug, Clone, Copy)]
pub enum Selector<'a> {
    Id(&'a str),
    Name(&'a str),
    All,
}

pub fn parse_selector(raw: &str) -> Result<Selector<'_>, DispatchError> {
    if raw == "all" {
        return Ok(Selector::All);
    }
    if let Some(id) = raw.strip_prefix("id/") {
        return Ok(Selector::Id(id));
    }
    if let Some(name) = raw.strip_prefix("name/") {
        return Ok(Selector::Name(name));
    }
    Err(DispatchError::BadRequest(format!("malformed selector '{}'", raw)))
}

/// One successful `GET` reading, reported back to the HTTP layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GetResult {
    pub device: String,
    pub readings: Vec<Reading>,
}

/// Shared handles every dispatch call needs. Cheap to clone (every
/// field is an `Arc`), so a fan-out across devices in `selector=all`
/// can hand a copy to each parallel task without borrowing across an
/// `.await`.
#[derive(Clone)]
pub struct DispatchContext {
    pub registry: Arc<DeviceRegistry>,
    pub driver: Arc<RwLock<Box<dyn Driver>>>,
    pub pool: Arc<WorkerPool>,
    pub events: Arc<EventPublisher>,
    pub data_transform: bool,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn check_admission(device: &Device) -> Result<(), DispatchError> {
    if device.admin_state == AdminState::Locked {
        return Err(DispatchError::Locked);
    }
    if device.op_state == OperatingState::Disabled {
        return Err(DispatchError::Locked);
    }
    Ok(())
}

/// Builds the ordered `(ResourceOperation, DeviceResource)` list for
/// one side (`get` or `set`) of a command, in `ResourceOperation.index`
/// order, per spec.md §4.3 step 4.
fn ordered_operations<'a>(
    ops: &'a [ResourceOperation],
    resolved: &'a ResolvedDevice,
) -> Result<Vec<(&'a ResourceOperation, &'a DeviceResource)>, DispatchError> {
    let mut indexed: Vec<&ResourceOperation> = ops.iter().collect();
    indexed.sort_by_key(|op| op.index);

    indexed
        .into_iter()
        .map(|op| {
            resolved
                .profile
                .device_resource(&op.object)
                .map(|resource| (op, resource))
                .ok_or_else(|| {
                    DispatchError::ServerError(format!(
                        "profile '{}' command references unknown resource '{}'",
                        resolved.profile.name, op.object
                    ))
                })
        })
        .collect()
}

async fn resolve_one<'a>(ctx: &DispatchContext, selector: Selector<'a>) -> Result<ResolvedDevice, DispatchError> {
    let key = match selector {
        Selector::Id(id) => DeviceKey::Id(id),
        Selector::Name(name) => DeviceKey::Name(name),
        Selector::All => {
            return Err(DispatchError::BadRequest(
                "selector 'all' is not valid for a single-device resolve".into(),
            ))
        }
    };
    Ok(ctx.registry.resolve(key).await?)
}

/// Executes a `GET` against a single, already-resolved device. Shared
/// by the single-device path and the `selector=all` fan-out.
async fn get_one(ctx: &DispatchContext, resolved: &ResolvedDevice, command: &str) -> Result<GetResult, DispatchError> {
    check_admission(&resolved.device)?;

    let profile_resource = resolved
        .profile
        .command(command)
        .ok_or_else(|| DispatchError::NotFound(format!("command '{}'", command)))?;

    let ops = ordered_operations(&profile_resource.get, resolved)?;

    let requests: Vec<DriverRequest> = ops
        .iter()
        .map(|(op, resource)| DriverRequest {
            resource_name: resource.name.clone(),
            attributes: resource.attributes.clone(),
            parameter: op.parameter.clone(),
        })
        .collect();

    let mut results = {
        let driver = ctx.driver.read().await;
        driver
            .handle_get(&resolved.device.addressable, &requests)
            .await
            .map_err(|e| DispatchError::DriverError(e.to_string()))?
    };

    let mut readings = Vec::with_capacity(ops.len());

    for (op, resource) in &ops {
        let Some(pos) = results.iter().position(|r| r.resource_name == resource.name) else {
            tracing::warn!(resource = %resource.name, "driver omitted reading, skipping");
            continue;
        };
        let driver_reading = results.remove(pos);

        let value = if ctx.data_transform {
            match transform::apply_outgoing(&driver_reading.value, &resource.properties.value, op) {
                Ok(v) => v,
                Err(e @ ApiError::AssertionFailed(_)) => {
                    // spec.md §4.2 step 6: an assertion mismatch fails the
                    // whole command and disables the device, not just this
                    // one resource.
                    let _ = ctx
                        .registry
                        .update(DeviceKey::Id(&resolved.device.id), |d| {
                            d.op_state = OperatingState::Disabled
                        })
                        .await;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            driver_reading.value.clone()
        };

        let origin = driver_reading.origin_ms.unwrap_or_else(now_ms);
        readings.push(Reading::new(
            resource.name.clone(),
            &value,
            origin,
            resource.properties.value.media_type.clone(),
        ));
    }

    ctx.events
        .publish(resolved.device.name.clone(), now_ms(), readings.clone())
        .await;

    Ok(GetResult {
        device: resolved.device.name.clone(),
        readings,
    })
}

/// Coerces and validates one `PUT` value against its target resource:
/// reverses any enumeration mapping, parses the string into the
/// resource's declared type, enforces `minimum`/`maximum`, then applies
/// the inverse numeric transform (spec.md §4.3 step 5, §4.2).
fn coerce_incoming(
    raw: &str,
    op: &ResourceOperation,
    resource: &DeviceResource,
    data_transform: bool,
) -> Result<Value, DispatchError> {
    let prop = &resource.properties.value;
    let unmapped = transform::reverse_mapping(raw, op);

    let mut value = adapter_api::parse_as(&prop.value_type, unmapped)
        .map_err(|e| DispatchError::BadRequest(e.to_string()))?;

    if let Some(fv) = value.as_f64() {
        if let Some(min) = prop.minimum {
            if fv < min {
                return Err(DispatchError::BadRequest(format!(
                    "'{}' below minimum {} for resource '{}'",
                    fv, min, resource.name
                )));
            }
        }
        if let Some(max) = prop.maximum {
            if fv > max {
                return Err(DispatchError::BadRequest(format!(
                    "'{}' above maximum {} for resource '{}'",
                    fv, max, resource.name
                )));
            }
        }
    }

    if data_transform {
        value = transform::apply_incoming(value, prop);
    }

    Ok(value)
}

async fn put_one(
    ctx: &DispatchContext,
    resolved: &ResolvedDevice,
    command: &str,
    body: &HashMap<String, String>,
) -> Result<(), DispatchError> {
    check_admission(&resolved.device)?;

    let profile_resource = resolved
        .profile
        .command(command)
        .ok_or_else(|| DispatchError::NotFound(format!("command '{}'", command)))?;

    if profile_resource.set.is_empty() {
        return Err(DispatchError::MethodNotAllowed);
    }

    let ops = ordered_operations(&profile_resource.set, resolved)?;

    for (_, resource) in &ops {
        if !resource.properties.value.read_write.writable() {
            return Err(DispatchError::MethodNotAllowed);
        }
    }

    for key in body.keys() {
        if !ops.iter().any(|(_, r)| &r.name == key) {
            tracing::warn!(resource = %key, "PUT body referenced unknown resource, ignoring");
        }
    }

    let mut requests = Vec::with_capacity(ops.len());
    let mut values = Vec::with_capacity(ops.len());

    for (op, resource) in &ops {
        let raw = body
            .get(&resource.name)
            .ok_or_else(|| DispatchError::BadRequest(format!("missing value for resource '{}'", resource.name)))?;

        let value = coerce_incoming(raw, op, resource, ctx.data_transform)?;

        requests.push(DriverRequest {
            resource_name: resource.name.clone(),
            attributes: resource.attributes.clone(),
            parameter: op.parameter.clone(),
        });
        values.push(value);
    }

    let driver = ctx.driver.read().await;
    driver
        .handle_put(&resolved.device.addressable, &requests, &values)
        .await
        .map_err(|e| DispatchError::DriverError(e.to_string()))?;

    Ok(())
}

/// All devices whose profile defines `command` and whose `opState` is
/// `ENABLED`, per spec.md §4.3's `selector=all` rule.
async fn candidates_for(ctx: &DispatchContext, command: &str) -> Vec<ResolvedDevice> {
    let mut out = Vec::new();

    for device in ctx.registry.all().await {
        if device.op_state != OperatingState::Enabled {
            continue;
        }
        let Some(profile) = ctx.registry.get_profile(&device.profile_name).await else {
            continue;
        };
        if profile.command(command).is_some() {
            out.push(ResolvedDevice { device, profile });
        }
    }

    out
}

/// The aggregate result of a `selector=all` fan-out: per spec.md §4.3,
/// `200` if at least one device succeeded, else `500`; the body
/// concatenates every per-device result (successes and, for
/// visibility, failures).
pub struct AllResult<T> {
    pub succeeded: usize,
    pub failed: Vec<(String, DispatchError)>,
    pub results: Vec<T>,
}

impl<T> AllResult<T> {
    pub fn status(&self) -> u16 {
        if self.succeeded > 0 {
            200
        } else {
            500
        }
    }
}

pub async fn handle_get(ctx: &DispatchContext, selector: &str, command: &str) -> Result<GetResult, DispatchError> {
    let resolved = resolve_one(ctx, parse_selector(selector)?).await?;
    get_one(ctx, &resolved, command).await
}

pub async fn handle_get_all(ctx: &DispatchContext, command: &str) -> AllResult<GetResult> {
    let candidates = candidates_for(ctx, command).await;
    let mut rx_list = Vec::with_capacity(candidates.len());

    for resolved in candidates {
        let ctx = ctx.clone();
        let command = command.to_owned();
        let (tx, rx) = oneshot::channel();

        ctx.pool
            .submit(async move {
                let name = resolved.device.name.clone();
                let result = get_one(&ctx, &resolved, &command).await;
                let _ = tx.send((name, result));
            })
            .await;

        rx_list.push(rx);
    }

    let mut succeeded = 0;
    let mut failed = Vec::new();
    let mut results = Vec::new();

    for rx in rx_list {
        if let Ok((name, result)) = rx.await {
            match result {
                Ok(r) => {
                    succeeded += 1;
                    results.push(r);
                }
                Err(e) => failed.push((name, e)),
            }
        }
    }

    AllResult {
        succeeded,
        failed,
        results,
    }
}

pub async fn handle_put(
    ctx: &DispatchContext,
    selector: &str,
    command: &str,
    body: &HashMap<String, String>,
) -> Result<(), DispatchError> {
    let resolved = resolve_one(ctx, parse_selector(selector)?).await?;
    put_one(ctx, &resolved, command, body).await
}

pub async fn handle_put_all(ctx: &DispatchContext, command: &str, body: &HashMap<String, String>) -> AllResult<()> {
    let candidates = candidates_for(ctx, command).await;
    let mut rx_list = Vec::with_capacity(candidates.len());

    for resolved in candidates {
        let ctx = ctx.clone();
        let command = command.to_owned();
        let body = body.clone();
        let (tx, rx) = oneshot::channel();

        ctx.pool
            .submit(async move {
                let name = resolved.device.name.clone();
                let result = put_one(&ctx, &resolved, &command, &body).await;
                let _ = tx.send((name, result));
            })
            .await;

        rx_list.push(rx);
    }

    let mut succeeded = 0;
    let mut failed = Vec::new();

    for rx in rx_list {
        if let Ok((name, result)) = rx.await {
            match result {
                Ok(()) => succeeded += 1,
                Err(e) => failed.push((name, e)),
            }
        }
    }

    AllResult {
        succeeded,
        failed,
        results: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::DataClient;
    use adapter_api::{
        Addressable, DeviceProfile, DeviceResource, DriverReading, OperatingState, ProfileResource, PropertyValue,
        ReadWrite, ResourceProperties,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeDriver {
        get_calls: AtomicUsize,
    }

    #[async_trait]
    impl Driver for FakeDriver {
        async fn init(&mut self, _cfg: &adapter_api::DriverConfig) -> adapter_api::Result<bool> {
            Ok(true)
        }

        async fn handle_get(
            &self,
            _addressable: &Addressable,
            requests: &[DriverRequest],
        ) -> adapter_api::Result<Vec<DriverReading>> {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            Ok(requests
                .iter()
                .map(|r| DriverReading {
                    resource_name: r.resource_name.clone(),
                    value: Value::Int16(500),
                    origin_ms: None,
                })
                .collect())
        }

        async fn handle_put(
            &self,
            _addressable: &Addressable,
            _requests: &[DriverRequest],
            _values: &[Value],
        ) -> adapter_api::Result<()> {
            Ok(())
        }

        async fn discover(&self, _add: &dyn adapter_api::AddDevice) {}

        async fn stop(&mut self, _force: bool) {}
    }

    struct NullDataClient;

    #[async_trait]
    impl DataClient for NullDataClient {
        async fn ping(&self) -> adapter_api::Result<()> {
            Ok(())
        }
        async fn add_event(&self, _event: &adapter_api::Event) -> adapter_api::Result<()> {
            Ok(())
        }
    }

    fn thermostat_profile(scale: Option<f64>) -> DeviceProfile {
        DeviceProfile {
            name: "thermostat".into(),
            device_resources: vec![DeviceResource {
                name: "temperature".into(),
                properties: ResourceProperties {
                    value: PropertyValue {
                        value_type: "Int16".into(),
                        read_write: ReadWrite::ReadWrite,
                        scale,
                        ..Default::default()
                    },
                    units: None,
                },
                ..Default::default()
            }],
            resources: vec![ProfileResource {
                name: "temperature".into(),
                get: vec![ResourceOperation {
                    index: 0,
                    object: "temperature".into(),
                    ..Default::default()
                }],
                set: vec![ResourceOperation {
                    index: 0,
                    object: "temperature".into(),
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }
    }

    fn device(name: &str, admin: AdminState, op: OperatingState) -> Device {
        Device {
            id: name.into(),
            name: name.into(),
            description: String::new(),
            labels: vec![],
            admin_state: admin,
            op_state: op,
            origin_ms: 0,
            addressable: Addressable::new(name, "test", "localhost"),
            profile_name: "thermostat".into(),
            service: "svc".into(),
        }
    }

    async fn test_ctx(scale: Option<f64>) -> DispatchContext {
        let registry = Arc::new(DeviceRegistry::new());
        registry.add_profile(thermostat_profile(scale)).await.unwrap();
        registry
            .add(device("therm1", AdminState::Unlocked, OperatingState::Enabled))
            .await
            .unwrap();

        let pool = WorkerPool::new(2);
        let driver: Arc<RwLock<Box<dyn Driver>>> =
            Arc::new(RwLock::new(Box::new(FakeDriver { get_calls: AtomicUsize::new(0) })));
        let events = Arc::new(EventPublisher::new(pool.clone(), Arc::new(NullDataClient)));

        DispatchContext {
            registry,
            driver,
            pool,
            events,
            data_transform: true,
        }
    }

    #[tokio::test]
    async fn scenario_1_scale_transforms_value() {
        let ctx = test_ctx(Some(0.1)).await;
        let result = handle_get(&ctx, "name/therm1", "temperature").await.unwrap();

        assert_eq!(result.readings.len(), 1);
        assert_eq!(result.readings[0].name, "temperature");
        assert_eq!(result.readings[0].value, "50.0");
    }

    #[tokio::test]
    async fn scenario_2_disabled_transform_leaves_raw_value() {
        let mut ctx = test_ctx(Some(0.1)).await;
        ctx.data_transform = false;
        let result = handle_get(&ctx, "name/therm1", "temperature").await.unwrap();

        assert_eq!(result.readings[0].value, "500");
    }

    #[tokio::test]
    async fn scenario_3_locked_device_rejected_without_driver_call() {
        let ctx = test_ctx(None).await;
        ctx.registry
            .update(DeviceKey::Name("therm1"), |d| d.admin_state = AdminState::Locked)
            .await
            .unwrap();

        let mut body = HashMap::new();
        body.insert("temperature".to_string(), "500".to_string());

        let err = handle_put(&ctx, "name/therm1", "temperature", &body).await.unwrap_err();
        assert_eq!(err.status(), 423);
    }

    #[tokio::test]
    async fn assertion_failure_disables_the_device() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut profile = thermostat_profile(None);
        // FakeDriver always reports Int16(500); an assertion demanding
        // anything else always mismatches.
        profile.device_resources[0].properties.value.assertion = Some("nope".into());
        registry.add_profile(profile).await.unwrap();
        registry
            .add(device("therm1", AdminState::Unlocked, OperatingState::Enabled))
            .await
            .unwrap();

        let pool = WorkerPool::new(1);
        let driver: Arc<RwLock<Box<dyn Driver>>> =
            Arc::new(RwLock::new(Box::new(FakeDriver { get_calls: AtomicUsize::new(0) })));
        let events = Arc::new(EventPublisher::new(pool.clone(), Arc::new(NullDataClient)));
        let ctx = DispatchContext {
            registry: registry.clone(),
            driver,
            pool,
            events,
            data_transform: true,
        };

        let err = handle_get(&ctx, "name/therm1", "temperature").await.unwrap_err();
        assert_eq!(err.status(), 400);

        let updated = registry.get_by_name("therm1").await.unwrap();
        assert_eq!(updated.op_state, OperatingState::Disabled);
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let ctx = test_ctx(None).await;
        let err = handle_get(&ctx, "name/missing", "temperature").await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn unknown_command_is_not_found() {
        let ctx = test_ctx(None).await;
        let err = handle_get(&ctx, "name/therm1", "nope").await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn selector_all_reports_partial_success() {
        let ctx = test_ctx(None).await;
        ctx.registry
            .add(device("therm2", AdminState::Locked, OperatingState::Enabled))
            .await
            .unwrap();

        let agg = handle_get_all(&ctx, "temperature").await;
        assert_eq!(agg.status(), 200);
        assert_eq!(agg.succeeded, 1);
        assert_eq!(agg.failed.len(), 1);
    }

    #[tokio::test]
    async fn put_on_unknown_body_key_is_ignored_with_warning() {
        let ctx = test_ctx(None).await;
        let mut body = HashMap::new();
        body.insert("temperature".to_string(), "500".to_string());
        body.insert("bogus".to_string(), "1".to_string());

        handle_put(&ctx, "name/therm1", "temperature", &body).await.unwrap();
    }

    #[tokio::test]
    async fn put_enforces_minimum_and_maximum() {
        let registry = Arc::new(DeviceRegistry::new());
        let mut profile = thermostat_profile(None);
        profile.device_resources[0].properties.value.maximum = Some(100.0);
        registry.add_profile(profile).await.unwrap();
        registry
            .add(device("therm1", AdminState::Unlocked, OperatingState::Enabled))
            .await
            .unwrap();

        let pool = WorkerPool::new(1);
        let driver: Arc<RwLock<Box<dyn Driver>>> =
            Arc::new(RwLock::new(Box::new(FakeDriver { get_calls: AtomicUsize::new(0) })));
        let events = Arc::new(EventPublisher::new(pool.clone(), Arc::new(NullDataClient)));
        let ctx = DispatchContext {
            registry,
            driver,
            pool,
            events,
            data_transform: true,
        };

        let mut body = HashMap::new();
        body.insert("temperature".to_string(), "500".to_string());

        let err = handle_put(&ctx, "name/therm1", "temperature", &body).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
