//! C9 — the callback handler: the platform notifies this adapter of
//! metadata changes via `PUT|POST|DELETE /api/v1/callback`, per
//! spec.md §4.8.

use crate::clients::MetadataClient;
use crate::dispatch::DispatchError;
use crate::registry::{DeviceKey, DeviceRegistry};
use adapter_api::Error;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallbackType {
    Device,
    Profile,
    Service,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "type")]
    pub kind: CallbackType,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackMethod {
    Post,
    Put,
    Delete,
}

pub struct CallbackContext {
    pub registry: Arc<DeviceRegistry>,
    pub metadata_client: Arc<dyn MetadataClient>,
}

/// Dispatches one callback notification. `SERVICE` callbacks are
/// accepted and ignored -- this adapter has nothing registry-side to
/// update about its own record -- everything else follows spec.md
/// §4.8 verbatim.
pub async fn handle(ctx: &CallbackContext, method: CallbackMethod, body: &CallbackBody) -> Result<(), DispatchError> {
    match (body.kind, method) {
        (CallbackType::Device, CallbackMethod::Delete) => {
            ctx.registry.remove(DeviceKey::Id(&body.id)).await?;
            Ok(())
        }
        (CallbackType::Device, CallbackMethod::Post | CallbackMethod::Put) => {
            upsert_device(ctx, &body.id).await
        }
        (CallbackType::Profile, CallbackMethod::Delete) => {
            ctx.registry.remove_profile(&body.id).await?;
            Ok(())
        }
        (CallbackType::Profile, CallbackMethod::Post | CallbackMethod::Put) => {
            Err(DispatchError::BadRequest(String::from(
                "profile creation/update callbacks are not supported; upload via startup profile scan",
            )))
        }
        (CallbackType::Service, _) => Ok(()),
    }
}

async fn upsert_device(ctx: &CallbackContext, id: &str) -> Result<(), DispatchError> {
    let device = ctx
        .metadata_client
        .get_device(id)
        .await
        .map_err(|e| match e {
            Error::HttpNotFound(v) => DispatchError::NotFound(v),
            other => DispatchError::ServerError(other.to_string()),
        })?;

    if !ctx.registry.has_profile(&device.profile_name).await {
        tracing::warn!(profile = %device.profile_name, "callback referenced unknown profile; device not loaded");
        return Err(DispatchError::NotFound(format!("profile '{}'", device.profile_name)));
    }

    match ctx.registry.get(DeviceKey::Id(id)).await {
        Some(_) => ctx.registry.update(DeviceKey::Id(id), |d| *d = device.clone()).await?,
        None => {
            ctx.registry.add_or_get(device).await?;
        }
    };

    Ok(())
}
