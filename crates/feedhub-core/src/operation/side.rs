//! Feed-side and Hub-side strategies.
//!
//! An operation type declares two things once: its [`Flow`] (which way items
//! travel) and its [`Home`] (whether the type belongs to the Feed or to the
//! Hub). The side it acts on is derived from those two and from the shape:
//!
//! | Flow | Pull/bundle acts on | Push acts on |
//! |------|---------------------|--------------|
//! | [`TowardFeed`] + [`OfFeed`] | Hub | Feed |
//! | [`TowardBackend`] + [`OfFeed`] | Feed | Hub |
//! | [`TowardFeed`] + [`OfHub`] | Feed | Hub |
//! | [`TowardBackend`] + [`OfHub`] | Hub | Feed |
//!
//! Every side-dependent behaviour (endpoint resolution, request shape,
//! response unpacking, error classification, log policy) is then resolved
//! statically for all instances of the type.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::direction::{Direction, Peer};
use crate::endpoint::{Endpoint, RawResponse};
use crate::error::{self, base_log_policy, ClassifiedError, ErrorKind, FeedError, LogPolicy};
use crate::feed::Feed;
use crate::http_client::HttpMethod;
use crate::wire::{HubRequest, ResponseEnvelope};

use super::OperationSpec;

/// Path every Hub command is posted to.
pub const HUB_COMMAND_PATH: &str = "feedhub/command";

/// A request fully built but not yet sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<String>,
}

/// What an operation wants from its peer, before it is shaped for a side.
#[derive(Debug, Clone, Copy)]
pub struct Call<'a> {
    pub command: &'a str,
    pub parameters: &'a Value,
    pub item: Option<&'a Value>,
    pub tracking_id: Option<&'a str>,
}

impl<'a> Call<'a> {
    pub fn pull(command: &'a str, parameters: &'a Value) -> Self {
        Self {
            command,
            parameters,
            item: None,
            tracking_id: None,
        }
    }

    pub fn push(command: &'a str, parameters: &'a Value, item: &'a Value, tracking_id: &'a str) -> Self {
        Self {
            command,
            parameters,
            item: Some(item),
            tracking_id: Some(tracking_id),
        }
    }
}

/// Side strategy shared by every operation shape.
pub trait Side: Send + Sync + 'static {
    const PEER: Peer;

    /// The strategy for the other peer.
    type Mirror: Side;

    fn endpoint(feed: &Feed) -> &Arc<Endpoint>;

    fn plan(feed: &Feed, call: &Call<'_>) -> Result<PlannedRequest, FeedError>;

    fn unpack(raw: &RawResponse) -> Result<Value, FeedError> {
        ResponseEnvelope::open(&raw.body).map_err(|e| e.with_msg_head(&raw.msg_head))
    }

    fn classify(error: &FeedError) -> ClassifiedError {
        error::classify(error, Self::PEER)
    }

    fn log_policy(kind: ErrorKind, code: &str) -> LogPolicy {
        base_log_policy(kind, code)
    }

    fn log_message_for_error(error: &FeedError, verbose: bool) -> String {
        error::log_message_for_error(&Self::classify(error), error, verbose)
    }
}

/// Talks to the Feed's own API: pulls are GETs, pushes are POSTs to the
/// command path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActOnFeedSide;

/// Talks to the Hub: every call is a POST of a [`HubRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ActOnHubSide;

impl Side for ActOnFeedSide {
    const PEER: Peer = Peer::Feed;
    type Mirror = ActOnHubSide;

    fn endpoint(feed: &Feed) -> &Arc<Endpoint> {
        feed.feed_endpoint()
    }

    fn plan(_feed: &Feed, call: &Call<'_>) -> Result<PlannedRequest, FeedError> {
        match call.item {
            None => Ok(PlannedRequest {
                method: HttpMethod::Get,
                path: call.command.to_owned(),
                query: query_pairs(call.parameters)?,
                body: None,
            }),
            Some(item) => {
                let mut body = Map::new();
                body.insert(String::from("parameters"), call.parameters.clone());
                body.insert(String::from("item"), item.clone());
                if let Some(tracking_id) = call.tracking_id {
                    body.insert(String::from("trackingId"), Value::from(tracking_id));
                }
                Ok(PlannedRequest {
                    method: HttpMethod::Post,
                    path: call.command.to_owned(),
                    query: BTreeMap::new(),
                    body: Some(Value::Object(body).to_string()),
                })
            }
        }
    }

    // Feeds answering with HTML instead of JSON are usually misrouted, so
    // the URI is worth having.
    fn log_policy(kind: ErrorKind, code: &str) -> LogPolicy {
        match kind {
            ErrorKind::Unpacking => LogPolicy::URI,
            _ => base_log_policy(kind, code),
        }
    }
}

impl Side for ActOnHubSide {
    const PEER: Peer = Peer::Hub;
    type Mirror = ActOnFeedSide;

    fn endpoint(feed: &Feed) -> &Arc<Endpoint> {
        feed.hub_endpoint()
    }

    fn plan(feed: &Feed, call: &Call<'_>) -> Result<PlannedRequest, FeedError> {
        let parameters = match call.item {
            None => call.parameters.clone(),
            Some(item) => {
                let mut merged = object_or_empty(call.parameters)?;
                merged.insert(String::from("item"), item.clone());
                Value::Object(merged)
            }
        };
        let request = HubRequest {
            feed_alias: feed.alias.clone(),
            command: call.command.to_owned(),
            parameters,
            tracking_id: call.tracking_id.map(str::to_owned),
        };
        let body = serde_json::to_string(&request).map_err(|e| {
            FeedError::expected(
                "could not encode hub request",
                format!("could not encode hub request for '{}': {e}", call.command),
            )
        })?;

        Ok(PlannedRequest {
            method: HttpMethod::Post,
            path: HUB_COMMAND_PATH.to_owned(),
            query: BTreeMap::new(),
            body: Some(body),
        })
    }
}

/// Which way items of an operation type travel, as a type.
pub trait Flow: Send + Sync + 'static {
    const DIRECTION: Direction;

    /// Peer items are pulled from.
    type Source: Side;
    /// Peer items are pushed to.
    type Destination: Side;
}

/// The Hub delivers items to the Feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TowardFeed;

/// The Feed delivers items toward the backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct TowardBackend;

impl Flow for TowardFeed {
    const DIRECTION: Direction = Direction::ToFeed;
    type Source = ActOnHubSide;
    type Destination = ActOnFeedSide;
}

impl Flow for TowardBackend {
    const DIRECTION: Direction = Direction::ToBackend;
    type Source = ActOnFeedSide;
    type Destination = ActOnHubSide;
}

/// Transport side an operation type belongs to.
///
/// Types of the Feed act on the source and destination of their flow as
/// seen from the Feed. Types of the Hub see the same flow from the other
/// end, so they act on the mirrored peer.
pub trait Home: Send + Sync + 'static {
    const IS_OF_FEED: bool;

    type Acting<S: Side>: Side;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfFeed;

#[derive(Debug, Clone, Copy, Default)]
pub struct OfHub;

impl Home for OfFeed {
    const IS_OF_FEED: bool = true;
    type Acting<S: Side> = S;
}

impl Home for OfHub {
    const IS_OF_FEED: bool = false;
    type Acting<S: Side> = S::Mirror;
}

/// Side a pull or bundle pull of `O` acts on.
pub type PullSide<O> = <<O as OperationSpec>::Home as Home>::Acting<<<O as OperationSpec>::Flow as Flow>::Source>;

/// Side a push of `O` acts on.
pub type PushSide<O> =
    <<O as OperationSpec>::Home as Home>::Acting<<<O as OperationSpec>::Flow as Flow>::Destination>;

fn object_or_empty(parameters: &Value) -> Result<Map<String, Value>, FeedError> {
    match parameters {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        other => Err(FeedError::expected(
            "operation parameters must be a JSON object",
            format!("operation parameters must be a JSON object, got {other}"),
        )),
    }
}

fn query_pairs(parameters: &Value) -> Result<BTreeMap<String, String>, FeedError> {
    Ok(object_or_empty(parameters)?
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http_client::ScriptedHttpClient;

    fn feed() -> Feed {
        let client = Arc::new(ScriptedHttpClient::new());
        Feed::new(
            "clinic-a",
            Endpoint::new("feed", "https://feed.test", client.clone()),
            Endpoint::new("hub", "https://hub.test", client),
        )
    }

    #[test]
    fn feed_side_pull_is_a_get_with_flattened_query() {
        let params = json!({"id": "p-1", "page": 2, "skip": null});
        let plan = ActOnFeedSide::plan(&feed(), &Call::pull("patients", &params)).expect("plan");

        assert_eq!(plan.method, HttpMethod::Get);
        assert_eq!(plan.path, "patients");
        assert_eq!(plan.query.get("id").map(String::as_str), Some("p-1"));
        assert_eq!(plan.query.get("page").map(String::as_str), Some("2"));
        assert!(!plan.query.contains_key("skip"));
        assert!(plan.body.is_none());
    }

    #[test]
    fn hub_side_push_posts_envelope_with_item_and_tracking_id() {
        let params = json!({"id": "rx-9"});
        let item = json!({"drug": "aspirin"});
        let plan = ActOnHubSide::plan(&feed(), &Call::push("putPrescription", &params, &item, "t-1"))
            .expect("plan");

        assert_eq!(plan.method, HttpMethod::Post);
        assert_eq!(plan.path, HUB_COMMAND_PATH);
        let body: Value = serde_json::from_str(plan.body.as_deref().expect("body")).expect("json");
        assert_eq!(
            body,
            json!({
                "feedAlias": "clinic-a",
                "command": "putPrescription",
                "parameters": {"id": "rx-9", "item": {"drug": "aspirin"}},
                "trackingId": "t-1"
            })
        );
    }

    #[test]
    fn scalar_parameters_are_rejected() {
        let params = json!(42);
        let error = ActOnFeedSide::plan(&feed(), &Call::pull("patients", &params)).expect_err("scalar");
        assert_eq!(error.kind(), ErrorKind::Expected);
    }

    #[test]
    fn endpoint_resolution_follows_the_side() {
        let feed = feed();
        assert_eq!(ActOnFeedSide::endpoint(&feed).name(), "feed");
        assert_eq!(ActOnHubSide::endpoint(&feed).name(), "hub");
    }

    fn pull_peer<F: Flow, H: Home>() -> Peer {
        <H::Acting<F::Source> as Side>::PEER
    }

    fn push_peer<F: Flow, H: Home>() -> Peer {
        <H::Acting<F::Destination> as Side>::PEER
    }

    #[test]
    fn acting_side_follows_flow_and_home() {
        assert_eq!(pull_peer::<TowardFeed, OfFeed>(), Peer::Hub);
        assert_eq!(pull_peer::<TowardBackend, OfFeed>(), Peer::Feed);
        assert_eq!(pull_peer::<TowardFeed, OfHub>(), Peer::Feed);
        assert_eq!(pull_peer::<TowardBackend, OfHub>(), Peer::Hub);

        assert_eq!(push_peer::<TowardFeed, OfFeed>(), Peer::Feed);
        assert_eq!(push_peer::<TowardBackend, OfFeed>(), Peer::Hub);
        assert_eq!(push_peer::<TowardFeed, OfHub>(), Peer::Hub);
        assert_eq!(push_peer::<TowardBackend, OfHub>(), Peer::Feed);
    }

    #[test]
    fn log_policies_differ_by_side_only_where_overridden() {
        assert_eq!(ActOnFeedSide::log_policy(ErrorKind::Unpacking, "UNPACKING"), LogPolicy::URI);
        assert_eq!(ActOnHubSide::log_policy(ErrorKind::Unpacking, "UNPACKING"), LogPolicy::NONE);
        assert_eq!(ActOnFeedSide::log_policy(ErrorKind::Status, "500"), LogPolicy::ITEM);
        assert_eq!(ActOnHubSide::log_policy(ErrorKind::Status, "500"), LogPolicy::ITEM);
    }
}
