//! JSON shapes exchanged with the Hub and with Feeds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FeedError;

/// Body of every request posted to the Hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubRequest {
    pub feed_alias: String,
    pub command: String,
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_id: Option<String>,
}

/// Embedded request status of a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBlock {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of every response, from the Hub or from a Feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub request_status: StatusBlock,
    #[serde(default)]
    pub response_content: Value,
}

impl ResponseEnvelope {
    pub fn ok(content: Value) -> Self {
        Self {
            request_status: StatusBlock {
                status: String::from("OK"),
                message: None,
            },
            response_content: content,
        }
    }

    pub fn failed(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_status: StatusBlock {
                status: status.into(),
                message: Some(message.into()),
            },
            response_content: Value::Null,
        }
    }

    /// Parses an envelope and yields its content when the embedded status is OK.
    pub fn open(body: &str) -> Result<Value, FeedError> {
        let envelope: Self = serde_json::from_str(body).map_err(|e| {
            FeedError::unpacking(format!("response is not a valid envelope: {e}"), Some(body.to_owned()))
        })?;
        if envelope.request_status.status != "OK" {
            return Err(FeedError::structured(
                envelope.request_status.status,
                envelope.request_status.message.unwrap_or_default(),
            ));
        }
        Ok(envelope.response_content)
    }
}

/// One page of a bundle, or a whole merged bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleResponse<T> {
    pub offset: usize,
    pub has_more: bool,
    pub results: Vec<T>,
}

impl<T> BundleResponse<T> {
    pub fn empty(offset: usize, has_more: bool) -> Self {
        Self {
            offset,
            has_more,
            results: Vec::new(),
        }
    }

    /// Offset of the first item after this bundle.
    pub fn end_offset(&self) -> usize {
        self.offset + self.results.len()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
