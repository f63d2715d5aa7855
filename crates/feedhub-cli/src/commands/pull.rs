use std::sync::Arc;

use feedhub_core::{Feed, PullOne, PullSpec};
use serde_json::{json, Value};

use super::RawParams;
use crate::error::CliError;

pub async fn run<O>(feed: Arc<Feed>, params: RawParams) -> Result<Value, CliError>
where
    O: PullSpec<Params = RawParams, Item = Value>,
{
    let mut pull = PullOne::<O>::new(feed, params);
    tracing::debug!(operation = %pull.tag(), endpoint = %pull.endpoint().base_url(), "pulling item");

    let item = pull.pull_from_src().await?;
    Ok(json!({
        "origin": item.origin.as_ref(),
        "item": item.payload,
    }))
}
