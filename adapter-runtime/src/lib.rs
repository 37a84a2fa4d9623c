//! Reusable runtime for building device-adapter services on top of
//! `adapter-api`. An embedding binary loads [`config::get`], builds its
//! own [`adapter_api::Driver`] and platform clients, then hands all of
//! it to [`lifecycle::Lifecycle::start`]; the returned [`Lifecycle`] is
//! what [`server::server`] and the process's signal-handling loop are
//! built around.
//!
//! Modules are grouped the way the spec's own component list does: C2
//! (`registry`) and C3 (`transform`) are pure, dependency-free layers;
//! C4 (`dispatch`) sits on top of them and the driver; C5 (`event`),
//! C6 (`pool`), C7 (`scheduler`) are the async plumbing `dispatch` and
//! `lifecycle` share; C8 (`lifecycle`) and C9 (`callback`) are the
//! orchestration layer; `server` is the only module that knows about
//! HTTP.

pub mod callback;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod duration;
pub mod event;
pub mod lifecycle;
pub mod pool;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod sync;
pub mod transform;

pub use callback::{CallbackBody, CallbackContext, CallbackMethod, CallbackType};
pub use clients::{
    ConfigRegistryClient, DataClient, DeviceServiceRecord, HttpConfigRegistryClient, HttpDataClient,
    HttpMetadataClient, MetadataClient, Schedule, ScheduleEvent,
};
pub use config::Config;
pub use dispatch::{AllResult, DispatchContext, DispatchError, GetResult, Selector};
pub use event::EventPublisher;
pub use lifecycle::{Lifecycle, Phase};
pub use pool::WorkerPool;
pub use registry::{DeviceKey, DeviceRegistry};
pub use scheduler::{ScheduledTask, Scheduler};
