//! Northbound HTTP surface (spec.md §6). Built as a `Filter` tree the
//! way `drmemd::graphql::server` wires its one fully-built HTTP
//! server: small per-route filters stitched together with `.or()`,
//! rather than a router abstraction.

use crate::callback::{CallbackBody, CallbackContext, CallbackMethod};
use crate::dispatch::{self, DispatchContext, DispatchError};
use crate::lifecycle::{Lifecycle, RegistryAddDevice};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::Filter;

fn with_dispatch(ctx: DispatchContext) -> impl Filter<Extract = (DispatchContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn with_lifecycle(lifecycle: Arc<Lifecycle>) -> impl Filter<Extract = (Arc<Lifecycle>,), Error = Infallible> + Clone {
    warp::any().map(move || lifecycle.clone())
}

fn with_callback(
    ctx: Arc<CallbackContext>,
) -> impl Filter<Extract = (Arc<CallbackContext>,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn error_reply(status: u16, message: String) -> warp::reply::WithStatus<warp::reply::Json> {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), code)
}

fn dispatch_error_reply(err: DispatchError) -> warp::reply::WithStatus<warp::reply::Json> {
    error_reply(err.status(), err.message())
}

/// Splits a `/device/{...}` tail into `(selector, command)`: the
/// selector is everything but the last segment (`all`, `id/<id>`, or
/// `name/<name>`), the command is the last segment, per the URL
/// grammar in spec.md §4.3/§6.
fn split_selector_command(tail: &str) -> Result<(String, String), DispatchError> {
    let mut segments: Vec<&str> = tail.split('/').filter(|s| !s.is_empty()).collect();
    let command = segments
        .pop()
        .ok_or_else(|| DispatchError::BadRequest(String::from("missing command segment")))?;

    if segments.is_empty() {
        return Err(DispatchError::BadRequest(String::from("missing selector segment")));
    }

    Ok((segments.join("/"), command.to_owned()))
}

async fn ping() -> Result<impl warp::Reply, Infallible> {
    Ok(warp::reply::json(&json!({ "value": "pong" })))
}

/// Triggers discovery and returns immediately; the driver's `discover`
/// runs detached, per spec.md §6 ("Trigger async driver discovery").
async fn discovery(lifecycle: Arc<Lifecycle>) -> Result<impl warp::Reply, Infallible> {
    let driver = lifecycle.driver.clone();
    let add = RegistryAddDevice(lifecycle.registry.clone());

    tokio::spawn(async move {
        let driver = driver.read().await;
        driver.discover(&add).await;
    });

    Ok(warp::reply::with_status(warp::reply::json(&json!({})), StatusCode::OK))
}

async fn device_get(tail: warp::path::Tail, ctx: DispatchContext) -> Result<impl warp::Reply, Infallible> {
    let (selector, command) = match split_selector_command(tail.as_str()) {
        Ok(v) => v,
        Err(e) => return Ok(dispatch_error_reply(e)),
    };

    if selector == "all" {
        let agg = dispatch::handle_get_all(&ctx, &command).await;
        let status = StatusCode::from_u16(agg.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "succeeded": agg.succeeded,
            "failed": agg
                .failed
                .iter()
                .map(|(d, e)| json!({ "device": d, "error": e.message() }))
                .collect::<Vec<_>>(),
            "results": agg.results,
        });
        return Ok(warp::reply::with_status(warp::reply::json(&body), status));
    }

    match dispatch::handle_get(&ctx, &selector, &command).await {
        Ok(result) => Ok(warp::reply::with_status(warp::reply::json(&result), StatusCode::OK)),
        Err(e) => Ok(dispatch_error_reply(e)),
    }
}

async fn device_put(
    tail: warp::path::Tail,
    body: HashMap<String, String>,
    ctx: DispatchContext,
) -> Result<impl warp::Reply, Infallible> {
    let (selector, command) = match split_selector_command(tail.as_str()) {
        Ok(v) => v,
        Err(e) => return Ok(dispatch_error_reply(e)),
    };

    if selector == "all" {
        let agg = dispatch::handle_put_all(&ctx, &command, &body).await;
        let status = StatusCode::from_u16(agg.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let resp = json!({
            "succeeded": agg.succeeded,
            "failed": agg
                .failed
                .iter()
                .map(|(d, e)| json!({ "device": d, "error": e.message() }))
                .collect::<Vec<_>>(),
        });
        return Ok(warp::reply::with_status(warp::reply::json(&resp), status));
    }

    match dispatch::handle_put(&ctx, &selector, &command, &body).await {
        Ok(()) => Ok(warp::reply::with_status(warp::reply::json(&json!({})), StatusCode::OK)),
        Err(e) => Ok(dispatch_error_reply(e)),
    }
}

async fn callback_handler(
    method: CallbackMethod,
    body: CallbackBody,
    ctx: Arc<CallbackContext>,
) -> Result<impl warp::Reply, Infallible> {
    match crate::callback::handle(&ctx, method, &body).await {
        Ok(()) => Ok(warp::reply::with_status(warp::reply::json(&json!({})), StatusCode::OK)),
        Err(e) => Ok(dispatch_error_reply(e)),
    }
}

async fn config_handler(lifecycle: Arc<Lifecycle>) -> Result<impl warp::Reply, Infallible> {
    match serde_json::to_value(&lifecycle.config) {
        Ok(v) => Ok(warp::reply::with_status(warp::reply::json(&v), StatusCode::OK)),
        Err(_) => Ok(error_reply(500, String::from("configuration is not representable as JSON"))),
    }
}

/// CPU/heap sampling (spec.md §6, "CPU and heap stats") is left to a
/// future platform-specific collector; this reports the registry size
/// instead of fabricating numbers this workspace has no way to sample.
async fn metrics_handler(lifecycle: Arc<Lifecycle>) -> Result<impl warp::Reply, Infallible> {
    let devices = lifecycle.registry.all().await.len();
    Ok(warp::reply::json(&json!({ "devices": devices })))
}

/// Builds the full northbound filter tree and returns the future that
/// serves it, mirroring `drmemd::graphql::server`'s shape.
pub fn server(lifecycle: Arc<Lifecycle>, addr: impl Into<SocketAddr>) -> impl std::future::Future<Output = ()> {
    let dispatch_ctx = lifecycle.dispatch_context();
    let callback_ctx = Arc::new(CallbackContext {
        registry: lifecycle.registry.clone(),
        metadata_client: lifecycle.metadata_client.clone(),
    });

    let base = warp::path("api").and(warp::path("v1"));

    let ping_route = base
        .and(warp::path("ping"))
        .and(warp::path::end())
        .and(warp::get())
        .and_then(ping);

    let discovery_route = base
        .and(warp::path("discovery"))
        .and(warp::path::end())
        .and(warp::post())
        .and(with_lifecycle(lifecycle.clone()))
        .and_then(discovery);

    let device_get_route = base
        .and(warp::path("device"))
        .and(warp::path::tail())
        .and(warp::get())
        .and(with_dispatch(dispatch_ctx.clone()))
        .and_then(device_get);

    let device_put_route = base
        .and(warp::path("device"))
        .and(warp::path::tail())
        .and(warp::put())
        .and(warp::body::json())
        .and(with_dispatch(dispatch_ctx))
        .and_then(device_put);

    let callback_method = warp::put()
        .map(|| CallbackMethod::Put)
        .or(warp::post().map(|| CallbackMethod::Post))
        .unify()
        .or(warp::delete().map(|| CallbackMethod::Delete))
        .unify();

    let callback_route = base
        .and(warp::path("callback"))
        .and(warp::path::end())
        .and(callback_method)
        .and(warp::body::json())
        .and(with_callback(callback_ctx))
        .and_then(callback_handler);

    let config_route = base
        .and(warp::path("config"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_lifecycle(lifecycle.clone()))
        .and_then(config_handler);

    let metrics_route = base
        .and(warp::path("metrics"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_lifecycle(lifecycle))
        .and_then(metrics_handler);

    let filter = ping_route
        .or(discovery_route)
        .or(device_get_route)
        .or(device_put_route)
        .or(callback_route)
        .or(config_route)
        .or(metrics_route);

    warp::serve(filter).run(addr)
}
