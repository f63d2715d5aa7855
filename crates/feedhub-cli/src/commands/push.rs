use std::sync::Arc;

use feedhub_core::{Backoff, Feed, OperationError, PushOne, PushSpec};
use serde_json::{json, Value};

use super::RawParams;
use crate::cli::PushArgs;
use crate::error::CliError;

pub async fn run<O>(feed: Arc<Feed>, params: RawParams, item: Value, args: &PushArgs) -> Result<Value, CliError>
where
    O: PushSpec<Params = RawParams, Item = Value, Receipt = Value>,
{
    let mut push = PushOne::<O>::new(feed, params, item);

    let receipt = if args.atomic {
        let atomic = push.atomic()?;
        tracing::info!(operation = %push.tag(), request = %atomic.msg_head(), "deferred push built");

        let backoff = Backoff::default();
        let mut retries_left = args.retries;
        let mut retry = 0;
        loop {
            match atomic.call().await {
                Ok(receipt) => break receipt,
                Err(error) if retries_left > 0 && worth_retrying(&error) => {
                    let delay = backoff.delay(retry);
                    tracing::warn!(
                        operation = %push.tag(),
                        retries_left,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "push attempt failed, retrying: {error}"
                    );
                    tokio::time::sleep(delay).await;
                    retries_left -= 1;
                    retry += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    } else {
        push.push_to_dst().await?
    };

    Ok(json!({
        "origin": receipt.origin.as_ref(),
        "receipt": receipt.payload,
    }))
}

/// Only failures that may clear up on their own are retried.
fn worth_retrying(error: &OperationError) -> bool {
    error.is_transport() || error.is_backend_maintenance()
}
