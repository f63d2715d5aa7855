//! Paginated collection pulls.
//!
//! Every chunk request asks for a full page of `chunk_max_items` items. A
//! bounded bundle call keeps requesting pages, one after the other at
//! `offset + n * chunk_max_items`, until it holds at least `max_items` items
//! or the peer reports `hasMore = false`. A page that does not continue the
//! previous one (a gap, an overlap, or a short page that still reports more
//! items) fails the whole call. An unbounded call issues exactly one request
//! and returns its page as is.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::side::{Call, PullSide, Side};
use super::{cache_key, exchange, report, OperationCore, OperationError, OperationSpec};
use crate::cache::ItemCache;
use crate::endpoint::{Endpoint, RequestOptions};
use crate::error::FeedError;
use crate::feed::Feed;
use crate::wire::BundleResponse;

/// An operation type that pulls an ordered, paginated collection.
pub trait BundleSpec: OperationSpec {
    type Item: DeserializeOwned + Serialize + Send;

    /// Peer-side page size ceiling.
    const CHUNK_MAX_ITEMS: usize = Self::DIRECTION.default_chunk_max_items();

    /// Key under which an item is recorded in an item cache.
    fn item_key(_item: &Self::Item) -> Option<String> {
        None
    }
}

/// How many items a bundle call should collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemLimit {
    /// One request, whatever `hasMore` says.
    Unbounded,
    AtMost(usize),
}

impl From<i64> for ItemLimit {
    fn from(value: i64) -> Self {
        usize::try_from(value).map_or(Self::Unbounded, Self::AtMost)
    }
}

/// Parameters of a bundle call.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleParams<P> {
    pub params: P,
    pub offset: usize,
    pub max_items: ItemLimit,
    pub chunk_max_items: Option<usize>,
}

impl<P> BundleParams<P> {
    pub fn new(params: P) -> Self {
        Self {
            params,
            offset: 0,
            max_items: ItemLimit::Unbounded,
            chunk_max_items: None,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_max_items(mut self, max_items: impl Into<ItemLimit>) -> Self {
        self.max_items = max_items.into();
        self
    }

    pub fn with_chunk_max_items(mut self, chunk_max_items: usize) -> Self {
        self.chunk_max_items = Some(chunk_max_items);
        self
    }
}

/// Appends `chunk` to `merged`, enforcing offset continuity.
///
/// Nothing is appended when the chunk does not start where `merged` ends.
pub fn merge_chunk<T>(merged: &mut BundleResponse<T>, chunk: BundleResponse<T>) -> Result<(), FeedError> {
    if chunk.offset != merged.end_offset() {
        return Err(FeedError::unpacking(
            format!(
                "bundle chunk at offset {} does not continue previous chunk ending at {}",
                chunk.offset,
                merged.end_offset()
            ),
            None,
        ));
    }
    merged.results.extend(chunk.results);
    merged.has_more = chunk.has_more;
    Ok(())
}

/// One bundle call, or one chunk of it.
pub struct PullBundle<O: BundleSpec> {
    core: OperationCore<O, PullSide<O>>,
    offset: usize,
    max_items: ItemLimit,
    chunk_max_items: usize,
    cache: Option<Arc<dyn ItemCache>>,
}

impl<O: BundleSpec> PullBundle<O> {
    pub fn new(feed: Arc<Feed>, params: BundleParams<O::Params>) -> Self {
        Self::build(feed, params, None)
    }

    pub fn with_options(feed: Arc<Feed>, params: BundleParams<O::Params>, options: RequestOptions) -> Self {
        Self::build(feed, params, Some(options))
    }

    fn build(feed: Arc<Feed>, params: BundleParams<O::Params>, options: Option<RequestOptions>) -> Self {
        let chunk_max_items = params
            .chunk_max_items
            .or(feed.chunk_max_items)
            .unwrap_or(O::CHUNK_MAX_ITEMS)
            .max(1);
        Self {
            core: OperationCore::new(feed, params.params, options),
            offset: params.offset,
            max_items: params.max_items,
            chunk_max_items,
            cache: None,
        }
    }

    /// Records every item of a successfully merged bundle in `cache`.
    pub fn add_item_cache(&mut self, cache: Arc<dyn ItemCache>) -> &mut Self {
        self.cache = Some(cache);
        self
    }

    pub fn tag(&self) -> String {
        self.core.tag()
    }

    /// Bundles are not about one item.
    pub fn feed_item_id(&self) -> Option<String> {
        None
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        self.core.request.endpoint()
    }

    pub fn chunk_max_items(&self) -> usize {
        self.chunk_max_items
    }

    pub async fn pull_from_src(&mut self) -> Result<BundleResponse<O::Item>, OperationError> {
        self.core.reset_extra();

        if self.max_items == ItemLimit::AtMost(0) {
            return Ok(BundleResponse::empty(self.offset, true));
        }
        let mut merged = self.fetch_chunk(self.offset).await?;

        if let ItemLimit::AtMost(max) = self.max_items {
            let mut next_offset = self.offset;
            while merged.has_more && merged.len() < max {
                next_offset += self.chunk_max_items;

                let mut next = self.continuation();
                let chunk = next.fetch_chunk(next_offset).await?;
                if let Err(error) = merge_chunk(&mut merged, chunk) {
                    return Err(next.fail(error));
                }
            }
        }

        tracing::debug!(
            operation = %self.tag(),
            offset = merged.offset,
            items = merged.len(),
            has_more = merged.has_more,
            "bundle pulled"
        );
        self.remember(&merged).await;
        Ok(merged)
    }

    /// A fresh instance for the next chunk, sharing this call's target.
    fn continuation(&self) -> Self {
        Self {
            core: self.core.clone(),
            offset: self.offset,
            max_items: self.max_items,
            chunk_max_items: self.chunk_max_items,
            cache: None,
        }
    }

    async fn fetch_chunk(&mut self, offset: usize) -> Result<BundleResponse<O::Item>, OperationError> {
        self.core.extra.insert(String::from("offset"), offset.into());
        self.core.extra.insert(String::from("limit"), self.chunk_max_items.into());

        match self.try_fetch_chunk(offset).await {
            Ok(chunk) => Ok(chunk),
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn try_fetch_chunk(&self, offset: usize) -> Result<BundleResponse<O::Item>, FeedError> {
        let limit = self.chunk_max_items;
        let mut parameters = match self.core.parameters()? {
            Value::Null => serde_json::Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(FeedError::expected(
                    "bundle parameters must be a JSON object",
                    format!("parameters of {} must be a JSON object, got {other}", O::NAME),
                ))
            }
        };
        parameters.insert(String::from("offset"), offset.into());
        parameters.insert(String::from("limit"), limit.into());
        let parameters = Value::Object(parameters);

        let command = O::command(&self.core.params);
        let plan = <PullSide<O> as Side>::plan(&self.core.feed, &Call::pull(&command, &parameters))?;
        tracing::debug!(operation = %self.tag(), offset, limit, "requesting bundle chunk");
        let chunk: BundleResponse<O::Item> = exchange::<PullSide<O>, _>(&self.core.request, &plan).await?;

        check_chunk(&chunk, offset, limit)?;
        Ok(chunk)
    }

    fn fail(&self, error: FeedError) -> OperationError {
        report::<PullSide<O>>(self.core.context(None, None), error, None, self.core.verbose())
    }

    async fn remember(&self, bundle: &BundleResponse<O::Item>) {
        let Some(cache) = &self.cache else {
            return;
        };
        let entries: Vec<(String, Value)> = bundle
            .results
            .iter()
            .filter_map(|item| Some((cache_key::<O>(&O::item_key(item)?), serde_json::to_value(item).ok()?)))
            .collect();
        for (key, value) in entries {
            cache.put(key, value).await;
        }
    }
}

fn check_chunk<T>(chunk: &BundleResponse<T>, offset: usize, limit: usize) -> Result<(), FeedError> {
    if chunk.offset != offset {
        return Err(FeedError::unpacking(
            format!("bundle chunk requested at offset {offset} came back at offset {}", chunk.offset),
            None,
        ));
    }
    if chunk.len() > limit {
        return Err(FeedError::unpacking(
            format!("bundle chunk holds {} items, more than the page size of {limit}", chunk.len()),
            None,
        ));
    }
    Ok(())
}

/// Pulls a bundle of type `O`.
pub async fn pull_bundle<O: BundleSpec>(
    feed: Arc<Feed>,
    params: BundleParams<O::Params>,
) -> Result<BundleResponse<O::Item>, OperationError> {
    PullBundle::<O>::new(feed, params).pull_from_src().await
}
