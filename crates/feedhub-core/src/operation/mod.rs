//! Operation base shared by pulls, bundle pulls and pushes.
//!
//! # Declaring an operation type
//!
//! ```rust,ignore
//! use feedhub_core::{OfFeed, OperationSpec, PullSpec, TowardFeed};
//!
//! // Pulled toward the Feed by the Feed, so it acts on the Hub.
//! struct GetPatient;
//!
//! impl OperationSpec for GetPatient {
//!     const NAME: &'static str = "GetPatient";
//!     type Flow = TowardFeed;
//!     type Home = OfFeed;
//!     type Params = PatientKey;
//!
//!     fn command(_params: &PatientKey) -> String {
//!         String::from("getPatient")
//!     }
//!
//!     fn key(params: &PatientKey) -> Option<String> {
//!         Some(params.id.clone())
//!     }
//! }
//!
//! impl PullSpec for GetPatient {
//!     type Item = Patient;
//! }
//! ```

pub mod bundle;
pub mod pull;
pub mod push;
pub mod side;

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::direction::{Direction, Peer};
use crate::endpoint::{Endpoint, RawResponse, RequestOptions};
use crate::error::{ClassifiedError, FeedError};
use crate::feed::Feed;
use crate::http_client::HttpMethod;
use crate::status::RequestStatus;

use self::side::{Flow, Home, PlannedRequest, Side};

/// Identity of an operation type, fixed when the type is declared.
///
/// The side acted on is not named here: each shape derives it from
/// [`Flow`] and [`Home`] (see [`side::PullSide`] and [`side::PushSide`]).
pub trait OperationSpec: Send + Sync + 'static {
    const NAME: &'static str;

    type Flow: Flow;
    type Home: Home;
    type Params: Serialize + Clone + Send + Sync;

    const DIRECTION: Direction = <Self::Flow as Flow>::DIRECTION;
    const IS_OF_FEED: bool = <Self::Home as Home>::IS_OF_FEED;

    /// Feed-side path or Hub command addressed by this operation.
    fn command(params: &Self::Params) -> String;

    /// Key parameter shown in the operation tag.
    fn key(_params: &Self::Params) -> Option<String> {
        None
    }
}

/// Snapshot of the operation that produced an item or a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub name: String,
    pub key: Option<String>,
    pub direction: Direction,
    pub peer: Peer,
    pub feed_alias: String,
    pub feed_item_id: Option<String>,
    pub tracking_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl OperationContext {
    /// Stable human-readable identity: operation name plus key parameter.
    pub fn tag(&self) -> String {
        match &self.key {
            Some(key) => format!("{}({key})", self.name),
            None => self.name.clone(),
        }
    }
}

/// A classified failure, annotated with the operation that raised it.
#[derive(Debug, Clone, Error)]
#[error("{} {} : {}", .context.tag(), .context.direction, .classified.short_message)]
pub struct OperationError {
    pub context: OperationContext,
    #[source]
    pub source: FeedError,
    pub classified: ClassifiedError,
}

impl OperationError {
    pub fn status(&self) -> RequestStatus {
        self.classified.request_status
    }

    pub fn is_transport(&self) -> bool {
        self.classified.is_transport
    }

    pub fn is_backend_maintenance(&self) -> bool {
        self.classified.is_backend_maintenance
    }
}

/// A payload together with the operation it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<T> {
    pub payload: T,
    pub origin: Arc<OperationContext>,
}

impl<T> Item<T> {
    pub fn new(payload: T, origin: OperationContext) -> Self {
        Self {
            payload,
            origin: Arc::new(origin),
        }
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// Endpoint and options resolved once when an operation is constructed.
#[derive(Debug, Clone)]
pub(crate) struct BoundRequest {
    endpoint: Arc<Endpoint>,
    options: RequestOptions,
}

impl BoundRequest {
    pub(crate) fn new(endpoint: Arc<Endpoint>, options: RequestOptions) -> Self {
        Self { endpoint, options }
    }

    pub(crate) fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    pub(crate) fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub(crate) async fn perform(&self, plan: &PlannedRequest) -> Result<RawResponse, FeedError> {
        match plan.method {
            HttpMethod::Get => self.endpoint.get(&plan.path, &plan.query, &self.options).await,
            HttpMethod::Post => {
                self.endpoint
                    .post(&plan.path, plan.body.clone().unwrap_or_default(), &self.options)
                    .await
            }
        }
    }
}

/// State every operation instance carries, bound to the side `S` it acts on.
pub(crate) struct OperationCore<O: OperationSpec, S: Side> {
    pub(crate) feed: Arc<Feed>,
    pub(crate) params: O::Params,
    pub(crate) request: BoundRequest,
    pub(crate) extra: BTreeMap<String, Value>,
    side: PhantomData<fn() -> S>,
}

impl<O: OperationSpec, S: Side> Clone for OperationCore<O, S> {
    fn clone(&self) -> Self {
        Self {
            feed: Arc::clone(&self.feed),
            params: self.params.clone(),
            request: self.request.clone(),
            extra: BTreeMap::new(),
            side: PhantomData,
        }
    }
}

impl<O: OperationSpec, S: Side> OperationCore<O, S> {
    pub(crate) fn new(feed: Arc<Feed>, params: O::Params, options: Option<RequestOptions>) -> Self {
        let endpoint = Arc::clone(S::endpoint(&feed));
        let options = options.unwrap_or_else(|| {
            endpoint
                .defaults()
                .clone()
                .with_verbose(endpoint.defaults().verbose || feed.verbose)
        });
        Self {
            request: BoundRequest::new(endpoint, options),
            feed,
            params,
            extra: BTreeMap::new(),
            side: PhantomData,
        }
    }

    pub(crate) fn reset_extra(&mut self) {
        self.extra.clear();
    }

    pub(crate) fn verbose(&self) -> bool {
        self.feed.verbose || self.request.options().verbose
    }

    pub(crate) fn tag(&self) -> String {
        match O::key(&self.params) {
            Some(key) => format!("{}({key})", O::NAME),
            None => O::NAME.to_owned(),
        }
    }

    pub(crate) fn context(&self, feed_item_id: Option<String>, tracking_id: Option<String>) -> OperationContext {
        OperationContext {
            name: O::NAME.to_owned(),
            key: O::key(&self.params),
            direction: O::DIRECTION,
            peer: S::PEER,
            feed_alias: self.feed.alias.clone(),
            feed_item_id,
            tracking_id,
            extra: self.extra.clone(),
        }
    }

    pub(crate) fn parameters(&self) -> Result<Value, FeedError> {
        serde_json::to_value(&self.params).map_err(|e| {
            FeedError::expected(
                "could not encode operation parameters",
                format!("could not encode parameters of {}: {e}", O::NAME),
            )
        })
    }
}

/// Performs a planned request, opens the envelope and decodes its content.
pub(crate) async fn exchange<S: Side, T: DeserializeOwned>(
    request: &BoundRequest,
    plan: &PlannedRequest,
) -> Result<T, FeedError> {
    let raw = request.perform(plan).await?;
    let content = S::unpack(&raw)?;
    decode(&content).map_err(|e| e.with_msg_head(&raw.msg_head))
}

pub(crate) fn decode<T: DeserializeOwned>(content: &Value) -> Result<T, FeedError> {
    T::deserialize(content).map_err(|e| {
        FeedError::unpacking(
            format!("unexpected response content: {e}"),
            Some(content.to_string()),
        )
    })
}

/// Classifies and logs `error` for the operation described by `context`.
///
/// This is the single place a failure leaves an operation: the returned
/// error carries the context so callers can render a fully-qualified line.
pub(crate) fn report<S: Side>(
    context: OperationContext,
    error: FeedError,
    payload: Option<&Value>,
    verbose: bool,
) -> OperationError {
    let classified = S::classify(&error);
    let line = report_line::<S>(&context, &error, &classified, payload, verbose);

    match classified.request_status {
        RequestStatus::Internal | RequestStatus::FeedHub => tracing::error!(
            feed = %context.feed_alias,
            peer = %context.peer,
            status = %classified.request_status,
            "{line}"
        ),
        _ => tracing::warn!(
            feed = %context.feed_alias,
            peer = %context.peer,
            status = %classified.request_status,
            "{line}"
        ),
    }

    OperationError {
        context,
        source: error,
        classified,
    }
}

fn report_line<S: Side>(
    context: &OperationContext,
    error: &FeedError,
    classified: &ClassifiedError,
    payload: Option<&Value>,
    verbose: bool,
) -> String {
    let policy = S::log_policy(classified.kind, &error.code());
    let mut line = format!(
        "{} {} : {}",
        context.tag(),
        context.direction,
        S::log_message_for_error(error, verbose)
    );
    // The verbose message already carries the request summary.
    if policy.log_request_uri && !verbose {
        if let Some(head) = error.msg_head() {
            line.push_str(&format!(" | request: {}", head.render()));
        }
    }
    if policy.log_item_payload || verbose {
        if let Some(payload) = payload {
            line.push_str(&format!(" | item: {payload}"));
        }
    }
    line
}

/// Cache key of an item pulled by operation type `O`.
pub(crate) fn cache_key<O: OperationSpec>(item_key: &str) -> String {
    format!("{}:{item_key}", O::NAME)
}
