//! Single-item pushes, immediate or deferred.
//!
//! [`PushOne::push_to_dst`] performs the push with the endpoint's attempt
//! policy. [`PushOne::atomic`] builds the same request without sending it and
//! returns an [`AtomicPush`]; each [`AtomicPush::call`] is exactly one
//! attempt, so the retry loop around it stays with the caller.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::side::{Call, PlannedRequest, PushSide, Side};
use super::{exchange, report, BoundRequest, Item, OperationContext, OperationCore, OperationError, OperationSpec};
use crate::endpoint::{Endpoint, MsgHead, RequestOptions};
use crate::error::FeedError;
use crate::feed::Feed;
use crate::retry::AttemptPolicy;

/// An operation type that submits exactly one item.
pub trait PushSpec: OperationSpec {
    type Item: Serialize + Send + Sync;
    type Receipt: DeserializeOwned + Send;

    fn feed_item_id(params: &Self::Params, _item: &Self::Item) -> Option<String> {
        Self::key(params)
    }
}

/// One single-item push.
pub struct PushOne<O: PushSpec> {
    core: OperationCore<O, PushSide<O>>,
    item: O::Item,
    tracking_id: String,
}

impl<O: PushSpec> PushOne<O> {
    pub fn new(feed: Arc<Feed>, params: O::Params, item: O::Item) -> Self {
        Self::build(feed, params, item, None)
    }

    pub fn with_options(feed: Arc<Feed>, params: O::Params, item: O::Item, options: RequestOptions) -> Self {
        Self::build(feed, params, item, Some(options))
    }

    fn build(feed: Arc<Feed>, params: O::Params, item: O::Item, options: Option<RequestOptions>) -> Self {
        Self {
            core: OperationCore::new(feed, params, options),
            item,
            tracking_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn tag(&self) -> String {
        self.core.tag()
    }

    pub fn feed_item_id(&self) -> Option<String> {
        O::feed_item_id(&self.core.params, &self.item)
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        self.core.request.endpoint()
    }

    /// Identifier sent with every attempt of this push.
    pub fn tracking_id(&self) -> &str {
        &self.tracking_id
    }

    pub async fn push_to_dst(&mut self) -> Result<Item<O::Receipt>, OperationError> {
        self.core.reset_extra();
        self.core.extra.insert(String::from("mode"), Value::from("immediate"));

        let payload = match self.payload() {
            Ok(payload) => payload,
            Err(error) => return Err(self.fail(error, None)),
        };
        let outcome = match self.plan(&payload) {
            Ok(plan) => exchange::<PushSide<O>, O::Receipt>(&self.core.request, &plan).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(receipt) => {
                tracing::debug!(operation = %self.tag(), tracking_id = %self.tracking_id, "item pushed");
                Ok(Item::new(receipt, self.context()))
            }
            Err(error) => Err(self.fail(error, Some(&payload))),
        }
    }

    /// Builds the request without sending it.
    pub fn atomic(&self) -> Result<AtomicPush<O>, OperationError> {
        let payload = self.payload().map_err(|error| self.fail(error, None))?;
        let plan = self.plan(&payload).map_err(|error| self.fail(error, Some(&payload)))?;

        let options = self.core.request.options();
        let attempts = if options.attempts.max_attempts == 0 {
            options.attempts
        } else {
            AttemptPolicy::single()
        };
        let request = BoundRequest::new(
            Arc::clone(self.core.request.endpoint()),
            options.clone().with_attempts(attempts),
        );
        let head = request
            .endpoint()
            .pending_head(plan.method, &plan.path, &plan.query);

        let mut context = self.context();
        context.extra.insert(String::from("mode"), Value::from("atomic"));

        Ok(AtomicPush {
            request,
            plan,
            head,
            context,
            payload,
            verbose: self.core.verbose(),
            operation: PhantomData,
        })
    }

    fn payload(&self) -> Result<Value, FeedError> {
        serde_json::to_value(&self.item).map_err(|e| {
            FeedError::expected(
                "could not encode item",
                format!("could not encode item of {}: {e}", O::NAME),
            )
        })
    }

    fn plan(&self, payload: &Value) -> Result<PlannedRequest, FeedError> {
        let parameters = self.core.parameters()?;
        let command = O::command(&self.core.params);
        <PushSide<O> as Side>::plan(
            &self.core.feed,
            &Call::push(&command, &parameters, payload, &self.tracking_id),
        )
    }

    fn context(&self) -> OperationContext {
        self.core
            .context(self.feed_item_id(), Some(self.tracking_id.clone()))
    }

    fn fail(&self, error: FeedError, payload: Option<&Value>) -> OperationError {
        report::<PushSide<O>>(self.context(), error, payload, self.core.verbose())
    }
}

/// A built, not-yet-sent push attempt.
///
/// Building it performs no I/O. Every [`call`](Self::call) sends the request
/// once and classifies the outcome on its own.
pub struct AtomicPush<O: PushSpec> {
    request: BoundRequest,
    plan: PlannedRequest,
    head: MsgHead,
    context: OperationContext,
    payload: Value,
    verbose: bool,
    operation: PhantomData<fn() -> O>,
}

impl<O: PushSpec> Clone for AtomicPush<O> {
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            plan: self.plan.clone(),
            head: self.head.clone(),
            context: self.context.clone(),
            payload: self.payload.clone(),
            verbose: self.verbose,
            operation: PhantomData,
        }
    }
}

impl<O: PushSpec> AtomicPush<O> {
    /// Summary of the request this closure sends.
    pub fn msg_head(&self) -> String {
        self.head.render()
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub async fn call(&self) -> Result<Item<O::Receipt>, OperationError> {
        match exchange::<PushSide<O>, O::Receipt>(&self.request, &self.plan).await {
            Ok(receipt) => Ok(Item::new(receipt, self.context.clone())),
            Err(error) => Err(report::<PushSide<O>>(
                self.context.clone(),
                error,
                Some(&self.payload),
                self.verbose,
            )),
        }
    }
}

/// Pushes one item of type `O`.
pub async fn push_to_dst<O: PushSpec>(
    feed: Arc<Feed>,
    params: O::Params,
    item: O::Item,
) -> Result<Item<O::Receipt>, OperationError> {
    PushOne::<O>::new(feed, params, item).push_to_dst().await
}
