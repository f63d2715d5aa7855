//! # Feedhub Core
//!
//! Moves business records ("feed items") between a downstream **Feed** and
//! the central **Hub** over HTTP.
//!
//! ## Overview
//!
//! - **Operation types** declare a name, a [`Flow`] ([`TowardFeed`] or
//!   [`TowardBackend`]) and a [`Home`] ([`OfFeed`] or [`OfHub`]) once; the
//!   side strategy ([`ActOnFeedSide`] or [`ActOnHubSide`]) each shape acts on
//!   is derived from them at compile time
//! - **Three shapes**: [`PullOne`], [`PullBundle`] (paginated, with offset
//!   continuity checks) and [`PushOne`] (immediate or deferred through
//!   [`AtomicPush`])
//! - **Error taxonomy**: every failure is classified into a [`RequestStatus`]
//!   with retry hints (`is_transport`, `is_backend_maintenance`)
//! - **Endpoints** own transport attempts and timeouts; operations never retry
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Item cache hook and in-memory implementation |
//! | [`config`] | Feed configuration file and env credentials |
//! | [`direction`] | Direction and peer tags |
//! | [`endpoint`] | Feed-side and Hub-side endpoints |
//! | [`error`] | Raw errors, classification and log policy |
//! | [`feed`] | Feed identity and endpoints |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`operation`] | Operation base and the three shapes |
//! | [`retry`] | Transport attempt policy |
//! | [`status`] | Request-status vocabulary |
//! | [`wire`] | JSON envelopes |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use feedhub_core::{pull_bundle, BundleParams, FeedConfig, ReqwestHttpClient};
//!
//! let feed = FeedConfig::load("clinic-a.json")?.build(Arc::new(ReqwestHttpClient::new()))?;
//! let bundle = pull_bundle::<ListVisits>(feed, BundleParams::new(()).with_max_items(200)).await?;
//! println!("{} visits, more: {}", bundle.results.len(), bundle.has_more);
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use feedhub_core::{OperationError, RequestStatus};
//!
//! fn should_retry(error: &OperationError) -> bool {
//!     match error.status() {
//!         RequestStatus::Transport => true,
//!         RequestStatus::Backend => error.is_backend_maintenance(),
//!         _ => false,
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod direction;
pub mod endpoint;
pub mod error;
pub mod feed;
pub mod http_client;
pub mod operation;
pub mod retry;
pub mod status;
pub mod wire;

pub use cache::{ItemCache, MemoryItemCache};
pub use config::{ConfigError, EndpointConfig, FeedConfig};
pub use direction::{Direction, Peer};
pub use endpoint::{Endpoint, MsgHead, RawResponse, RequestOptions};
pub use error::{
    base_log_policy, classify, is_backend_maintenance_error, ClassifiedError, ErrorKind, FeedError,
    LogPolicy,
};
pub use feed::Feed;
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpMethod, HttpRequest, HttpResponse,
    ReqwestHttpClient, ScriptedHttpClient,
};
pub use operation::bundle::{merge_chunk, pull_bundle, BundleParams, BundleSpec, ItemLimit, PullBundle};
pub use operation::pull::{pull_from_src, PullOne, PullSpec};
pub use operation::push::{push_to_dst, AtomicPush, PushOne, PushSpec};
pub use operation::side::{
    ActOnFeedSide, ActOnHubSide, Call, Flow, Home, OfFeed, OfHub, PlannedRequest, PullSide, PushSide, Side,
    TowardBackend, TowardFeed, HUB_COMMAND_PATH,
};
pub use operation::{Item, OperationContext, OperationError, OperationSpec};
pub use retry::{AttemptPolicy, Backoff};
pub use status::RequestStatus;
pub use wire::{BundleResponse, HubRequest, ResponseEnvelope, StatusBlock};
