//! Behavior-driven tests for single-item pushes
//!
//! These tests verify HOW items are delivered immediately and through the
//! deferred closure whose retry loop belongs to the caller.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use feedhub_core::{
    push_to_dst, AttemptPolicy, Direction, Endpoint, Feed, Flow, Home, HttpError, HttpMethod, OfFeed,
    OfHub, OperationSpec, PullOne, PullSpec, PushOne, PushSpec, RequestOptions, RequestStatus,
    ScriptedHttpClient, TowardBackend, TowardFeed,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize)]
struct VisitKey {
    visit: String,
}

#[derive(Debug, Clone, Serialize)]
struct Visit {
    reason: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct Receipt {
    stored: bool,
}

/// Sends a visit recorded by the Feed to the Hub.
struct SubmitVisit;

impl OperationSpec for SubmitVisit {
    const NAME: &'static str = "SubmitVisit";
    type Flow = TowardBackend;
    type Home = OfFeed;
    type Params = VisitKey;

    fn command(_params: &VisitKey) -> String {
        String::from("submitVisit")
    }

    fn key(params: &VisitKey) -> Option<String> {
        Some(params.visit.clone())
    }
}

impl PushSpec for SubmitVisit {
    type Item = Visit;
    type Receipt = Receipt;
}

/// Delivers a visit coming from the Hub to the Feed's own API.
struct DeliverVisit;

impl OperationSpec for DeliverVisit {
    const NAME: &'static str = "DeliverVisit";
    type Flow = TowardFeed;
    type Home = OfFeed;
    type Params = VisitKey;

    fn command(_params: &VisitKey) -> String {
        String::from("visits/import")
    }

    fn key(params: &VisitKey) -> Option<String> {
        Some(params.visit.clone())
    }
}

impl PushSpec for DeliverVisit {
    type Item = Visit;
    type Receipt = Receipt;
}

fn feed(client: &Arc<ScriptedHttpClient>) -> Arc<Feed> {
    let options = RequestOptions::default().with_attempts(AttemptPolicy::fixed(Duration::from_millis(1), 3));
    Arc::new(Feed::new(
        "clinic-a",
        Endpoint::new("feed", "https://feed.test", client.clone()).with_defaults(options.clone()),
        Endpoint::new("hub", "https://hub.test", client.clone()).with_defaults(options),
    ))
}

fn key() -> VisitKey {
    VisitKey { visit: String::from("v-9") }
}

fn visit() -> Visit {
    Visit { reason: String::from("follow-up") }
}

fn stored() -> Value {
    json!({"requestStatus": {"status": "OK"}, "responseContent": {"stored": true}})
}

fn body(client: &ScriptedHttpClient, index: usize) -> Value {
    serde_json::from_str(client.requests()[index].body.as_deref().expect("request body")).expect("json body")
}

// =============================================================================
// Immediate pushes
// =============================================================================

#[tokio::test]
async fn when_pushing_to_the_hub_item_travels_inside_a_hub_request() {
    // Given: A Hub that stores whatever it receives
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_json(&stored());

    // When: A visit is pushed
    let receipt = push_to_dst::<SubmitVisit>(feed(&client), key(), visit())
        .await
        .expect("push succeeds");

    // Then: One POST of a hub request naming the feed and the command
    assert!(receipt.payload.stored);
    let sent = body(&client, 0);
    assert_eq!(sent["feedAlias"], "clinic-a");
    assert_eq!(sent["command"], "submitVisit");
    assert_eq!(sent["parameters"]["visit"], "v-9");
    assert_eq!(sent["parameters"]["item"]["reason"], "follow-up");
    assert_eq!(sent["trackingId"], json!(receipt.origin.tracking_id));
}

#[tokio::test]
async fn when_pushing_to_the_feed_item_is_posted_to_the_command_path() {
    // Given: A Feed that imports visits
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_json(&stored());

    // When: A visit is delivered
    let mut push = PushOne::<DeliverVisit>::new(feed(&client), key(), visit());
    push.push_to_dst().await.expect("push succeeds");

    // Then: The Feed receives parameters, item and tracking id in one body
    let request = &client.requests()[0];
    assert_eq!(request.method, HttpMethod::Post);
    assert_eq!(request.url, "https://feed.test/visits/import");
    let sent = body(&client, 0);
    assert_eq!(sent["parameters"], json!({"visit": "v-9"}));
    assert_eq!(sent["item"], json!({"reason": "follow-up"}));
    assert_eq!(sent["trackingId"], push.tracking_id());
}

#[tokio::test]
async fn when_the_hub_rejects_an_item_the_business_status_reaches_the_caller() {
    // Given: A Hub that finds the item malformed
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_json(&json!({"requestStatus": {"status": "MALFORMED", "message": "reason missing"}}));

    // When: A visit is pushed
    let error = push_to_dst::<SubmitVisit>(feed(&client), key(), visit())
        .await
        .expect_err("rejected");

    // Then: MALFORMED passes through, tagged with the operation
    assert_eq!(error.status(), RequestStatus::Malformed);
    assert_eq!(error.context.tag(), "SubmitVisit(v-9)");
    assert_eq!(error.context.direction, Direction::ToBackend);
    assert!(error.context.tracking_id.is_some());
}

// =============================================================================
// Deferred pushes
// =============================================================================

#[tokio::test]
async fn when_an_atomic_push_is_built_nothing_is_sent() {
    // Given: A Hub with nothing scripted
    let client = Arc::new(ScriptedHttpClient::new());

    // When: The deferred closure is built
    let push = PushOne::<SubmitVisit>::new(feed(&client), key(), visit());
    let atomic = push.atomic().expect("closure builds");

    // Then: No I/O happened and the closure describes its request
    assert_eq!(client.request_count(), 0);
    assert_eq!(atomic.msg_head(), "POST https://hub.test/feedhub/command (not sent)");
    assert_eq!(atomic.context().tracking_id.as_deref(), Some(push.tracking_id()));
}

#[tokio::test]
async fn when_the_caller_retries_transport_failures_each_call_is_one_attempt() {
    // Given: A Hub that hangs up twice and then stores the visit
    let client = Arc::new(ScriptedHttpClient::new());
    client
        .push_error(HttpError::reset("hang up"))
        .push_error(HttpError::timeout("slow"))
        .push_json(&stored());
    let atomic = PushOne::<SubmitVisit>::new(feed(&client), key(), visit())
        .atomic()
        .expect("closure builds");

    // When: The caller loops while the failure is transient
    let mut failures = Vec::new();
    let receipt = loop {
        match atomic.call().await {
            Ok(receipt) => break receipt,
            Err(error) if error.is_transport() || error.is_backend_maintenance() => failures.push(error),
            Err(error) => panic!("unexpected failure: {error}"),
        }
    };

    // Then: Three calls, three requests, each failure classified on its own
    assert!(receipt.payload.stored);
    assert_eq!(client.request_count(), 3);
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|error| error.status() == RequestStatus::Transport));
    assert_eq!(body(&client, 0), body(&client, 2));
}

#[tokio::test]
async fn when_the_backend_is_in_maintenance_the_caller_may_retry() {
    // Given: A Hub whose backend is down for maintenance, then back
    let client = Arc::new(ScriptedHttpClient::new());
    client
        .push_json(&json!({
            "requestStatus": {"status": "BACKEND", "message": "ehr: [MAINTENANCE] back at 02:00"},
        }))
        .push_json(&stored());
    let atomic = PushOne::<SubmitVisit>::new(feed(&client), key(), visit())
        .atomic()
        .expect("closure builds");

    // When: The first call fails
    let error = atomic.call().await.expect_err("maintenance");

    // Then: It is a BACKEND failure flagged as maintenance, and a second call succeeds
    assert_eq!(error.status(), RequestStatus::Backend);
    assert!(error.is_backend_maintenance());
    assert!(!error.is_transport());
    assert!(atomic.call().await.expect("after maintenance").payload.stored);
}

#[tokio::test]
async fn when_endpoint_allows_zero_attempts_atomic_call_is_internal() {
    // Given: A push whose options allow no attempt
    let client = Arc::new(ScriptedHttpClient::new());
    let push = PushOne::<SubmitVisit>::with_options(
        feed(&client),
        key(),
        visit(),
        RequestOptions::default().with_max_attempts(0),
    );

    // When: The closure is called
    let error = push.atomic().expect("closure builds").call().await.expect_err("no attempt");

    // Then: No request went out and the failure is INTERNAL
    assert_eq!(client.request_count(), 0);
    assert_eq!(error.status(), RequestStatus::Internal);
}

// =============================================================================
// Acting side
// =============================================================================

/// Same command declared for every flow and home.
struct Relay<F, H>(PhantomData<fn() -> (F, H)>);

impl<F: Flow, H: Home> OperationSpec for Relay<F, H> {
    const NAME: &'static str = "Relay";
    type Flow = F;
    type Home = H;
    type Params = VisitKey;

    fn command(_params: &VisitKey) -> String {
        String::from("relay")
    }
}

impl<F: Flow, H: Home> PullSpec for Relay<F, H> {
    type Item = Value;
}

impl<F: Flow, H: Home> PushSpec for Relay<F, H> {
    type Item = Visit;
    type Receipt = Receipt;
}

fn acting_endpoints<F: Flow, H: Home>(feed: &Arc<Feed>) -> (String, String) {
    let pull = PullOne::<Relay<F, H>>::new(feed.clone(), key());
    let push = PushOne::<Relay<F, H>>::new(feed.clone(), key(), visit());
    (pull.endpoint().name().to_owned(), push.endpoint().name().to_owned())
}

#[test]
fn acting_side_is_derived_from_flow_and_home() {
    // Given: One feed with both endpoints
    let client = Arc::new(ScriptedHttpClient::new());
    let feed = feed(&client);

    // When: The same command is declared for each flow and home
    // Then: Pulls read from the source and pushes write to the destination,
    // as seen from the home side
    assert_eq!(acting_endpoints::<TowardFeed, OfFeed>(&feed), (String::from("hub"), String::from("feed")));
    assert_eq!(acting_endpoints::<TowardBackend, OfFeed>(&feed), (String::from("feed"), String::from("hub")));
    assert_eq!(acting_endpoints::<TowardFeed, OfHub>(&feed), (String::from("feed"), String::from("hub")));
    assert_eq!(acting_endpoints::<TowardBackend, OfHub>(&feed), (String::from("hub"), String::from("feed")));

    assert_eq!(<Relay<TowardFeed, OfHub> as OperationSpec>::DIRECTION, Direction::ToFeed);
    assert!(!<Relay<TowardFeed, OfHub> as OperationSpec>::IS_OF_FEED);
    assert!(<Relay<TowardBackend, OfFeed> as OperationSpec>::IS_OF_FEED);
}

#[tokio::test]
async fn when_a_hub_owned_push_flows_toward_the_feed_it_posts_to_the_hub() {
    // Given: A Hub that stores whatever it receives
    let client = Arc::new(ScriptedHttpClient::new());
    client.push_json(&stored());

    // When: A hub-owned visit flowing toward the Feed is pushed
    push_to_dst::<Relay<TowardFeed, OfHub>>(feed(&client), key(), visit())
        .await
        .expect("push succeeds");

    // Then: The request is a hub command
    let request = &client.requests()[0];
    assert_eq!(request.url, "https://hub.test/feedhub/command");
    assert_eq!(body(&client, 0)["command"], "relay");
}
