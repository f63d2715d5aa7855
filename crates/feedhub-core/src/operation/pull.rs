use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::side::{Call, PullSide, Side};
use super::{cache_key, decode, exchange, report, Item, OperationCore, OperationError, OperationSpec};
use crate::cache::ItemCache;
use crate::endpoint::{Endpoint, RequestOptions};
use crate::error::FeedError;
use crate::feed::Feed;

/// An operation type that fetches exactly one item.
pub trait PullSpec: OperationSpec {
    type Item: DeserializeOwned + Serialize + Send;

    fn feed_item_id(params: &Self::Params) -> Option<String> {
        Self::key(params)
    }
}

/// One single-item pull.
pub struct PullOne<O: PullSpec> {
    core: OperationCore<O, PullSide<O>>,
    cache: Option<Arc<dyn ItemCache>>,
}

impl<O: PullSpec> PullOne<O> {
    pub fn new(feed: Arc<Feed>, params: O::Params) -> Self {
        Self {
            core: OperationCore::new(feed, params, None),
            cache: None,
        }
    }

    pub fn with_options(feed: Arc<Feed>, params: O::Params, options: RequestOptions) -> Self {
        Self {
            core: OperationCore::new(feed, params, Some(options)),
            cache: None,
        }
    }

    /// Consults `cache` before going to the network, and fills it on success.
    pub fn add_item_cache(&mut self, cache: Arc<dyn ItemCache>) -> &mut Self {
        self.cache = Some(cache);
        self
    }

    pub fn tag(&self) -> String {
        self.core.tag()
    }

    pub fn feed_item_id(&self) -> Option<String> {
        O::feed_item_id(&self.core.params)
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        self.core.request.endpoint()
    }

    pub async fn pull_from_src(&mut self) -> Result<Item<O::Item>, OperationError> {
        self.core.reset_extra();
        let outcome = self.try_pull().await;
        let context = self.core.context(self.feed_item_id(), None);

        match outcome {
            Ok(payload) => Ok(Item::new(payload, context)),
            Err(error) => Err(report::<PullSide<O>>(context, error, None, self.core.verbose())),
        }
    }

    /// Replaces the parameters, then pulls.
    pub async fn pull_from_src_with(&mut self, params: O::Params) -> Result<Item<O::Item>, OperationError> {
        self.core.params = params;
        self.pull_from_src().await
    }

    async fn try_pull(&mut self) -> Result<O::Item, FeedError> {
        let key = O::feed_item_id(&self.core.params).map(|id| cache_key::<O>(&id));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(cached) = cache.get(key).await {
                if let Ok(item) = decode::<O::Item>(&cached) {
                    tracing::debug!(operation = %self.tag(), "served from item cache");
                    self.core.extra.insert(String::from("cached"), true.into());
                    return Ok(item);
                }
            }
        }

        let parameters = self.core.parameters()?;
        let command = O::command(&self.core.params);
        let plan = <PullSide<O> as Side>::plan(&self.core.feed, &Call::pull(&command, &parameters))?;
        let item: O::Item = exchange::<PullSide<O>, _>(&self.core.request, &plan).await?;

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            if let Ok(value) = serde_json::to_value(&item) {
                cache.put(key, value).await;
            }
        }
        let peer = <PullSide<O> as Side>::PEER;
        tracing::debug!(operation = %self.tag(), %peer, "item pulled");
        Ok(item)
    }
}

/// Pulls one item of type `O`.
pub async fn pull_from_src<O: PullSpec>(
    feed: Arc<Feed>,
    params: O::Params,
) -> Result<Item<O::Item>, OperationError> {
    PullOne::<O>::new(feed, params).pull_from_src().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::super::fixtures::{feed, GetPatient, Patient, PatientKey, ReadPatient};
    use super::*;
    use crate::cache::MemoryItemCache;
    use crate::http_client::{HttpError, HttpMethod, ScriptedHttpClient};
    use crate::status::RequestStatus;

    impl PullSpec for GetPatient {
        type Item = Patient;
    }

    impl PullSpec for ReadPatient {
        type Item = Patient;
    }

    fn ok(content: serde_json::Value) -> serde_json::Value {
        json!({"requestStatus": {"status": "OK"}, "responseContent": content})
    }

    fn key(id: &str) -> PatientKey {
        PatientKey { id: id.to_owned() }
    }

    #[tokio::test]
    async fn hub_side_pull_wraps_payload_with_its_origin() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.push_json(&ok(json!({"id": "p-1", "name": "Ann"})));

        let item = pull_from_src::<GetPatient>(feed(client.clone()), key("p-1"))
            .await
            .expect("pull succeeds");

        assert_eq!(item.payload.name, "Ann");
        assert_eq!(item.origin.tag(), "GetPatient(p-1)");
        assert_eq!(item.origin.feed_item_id.as_deref(), Some("p-1"));

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Post);
        assert_eq!(sent[0].url, "https://hub.test/feedhub/command");
    }

    #[tokio::test]
    async fn feed_side_pull_is_a_get_on_the_feed() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.push_json(&ok(json!({"id": "p-2", "name": "Bo"})));

        let mut pull = PullOne::<ReadPatient>::new(feed(client.clone()), key("p-2"));
        assert_eq!(pull.endpoint().name(), "feed");
        pull.pull_from_src().await.expect("pull succeeds");

        let sent = client.requests();
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].url, "https://feed.test/patients/p-2?id=p-2");
    }

    #[tokio::test]
    async fn payload_of_wrong_shape_is_an_unpacking_failure() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.push_json(&ok(json!({"unexpected": true})));

        let error = pull_from_src::<GetPatient>(feed(client), key("p-3"))
            .await
            .expect_err("shape mismatch");

        assert_eq!(error.status(), RequestStatus::FeedHub);
        assert_eq!(error.context.tag(), "GetPatient(p-3)");
        assert!(error.source.msg_head().is_some());
    }

    #[tokio::test]
    async fn connection_reset_is_transport_after_all_attempts() {
        let client = Arc::new(ScriptedHttpClient::new());
        client
            .push_error(HttpError::reset("socket hang up"))
            .push_error(HttpError::reset("socket hang up"));

        let error = pull_from_src::<GetPatient>(feed(client.clone()), key("p-4"))
            .await
            .expect_err("reset");

        assert_eq!(error.status(), RequestStatus::Transport);
        assert!(error.is_transport());
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn item_cache_is_consulted_before_the_network() {
        let client = Arc::new(ScriptedHttpClient::new());
        client.push_json(&ok(json!({"id": "p-5", "name": "Cy"})));
        let cache = Arc::new(MemoryItemCache::new(Duration::from_secs(60)));
        let feed = feed(client.clone());

        let mut first = PullOne::<GetPatient>::new(feed.clone(), key("p-5"));
        first.add_item_cache(cache.clone());
        first.pull_from_src().await.expect("network pull");

        let mut second = PullOne::<GetPatient>::new(feed, key("p-5"));
        second.add_item_cache(cache);
        let item = second.pull_from_src().await.expect("cached pull");

        assert_eq!(item.payload.name, "Cy");
        assert_eq!(item.origin.extra.get("cached"), Some(&json!(true)));
        assert_eq!(client.request_count(), 1);
    }
}
