use std::sync::Arc;

use feedhub_core::{BundleParams, BundleSpec, Feed, PullBundle};
use serde_json::Value;

use super::RawParams;
use crate::cli::BundleArgs;
use crate::error::CliError;

pub async fn run<O>(feed: Arc<Feed>, params: RawParams, args: &BundleArgs) -> Result<Value, CliError>
where
    O: BundleSpec<Params = RawParams, Item = Value>,
{
    let mut params = BundleParams::new(params)
        .with_offset(args.offset)
        .with_max_items(args.max_items);
    if let Some(chunk_max_items) = args.chunk_max_items {
        params = params.with_chunk_max_items(chunk_max_items);
    }

    let mut bundle = PullBundle::<O>::new(feed, params);
    tracing::debug!(
        operation = %bundle.tag(),
        chunk_max_items = bundle.chunk_max_items(),
        "pulling bundle"
    );

    let merged = bundle.pull_from_src().await?;
    Ok(serde_json::to_value(&merged)?)
}
