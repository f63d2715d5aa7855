use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable request-status vocabulary exposed to callers and carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Ok,
    /// Local defect, e.g. an endpoint configured with zero attempts.
    Internal,
    /// The true backend rejected the request.
    Backend,
    /// Connection failure or ambiguous delivery; safe to retry.
    Transport,
    /// The peer (Feed or Hub) misbehaved.
    #[serde(rename = "FEEDHUB")]
    FeedHub,
    NotFound,
    InvalidCommand,
    InvalidParameters,
    Malformed,
    Auth,
    Access,
}

impl RequestStatus {
    pub const ALL: [Self; 11] = [
        Self::Ok,
        Self::Internal,
        Self::Backend,
        Self::Transport,
        Self::FeedHub,
        Self::NotFound,
        Self::InvalidCommand,
        Self::InvalidParameters,
        Self::Malformed,
        Self::Auth,
        Self::Access,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Internal => "INTERNAL",
            Self::Backend => "BACKEND",
            Self::Transport => "TRANSPORT",
            Self::FeedHub => "FEEDHUB",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidCommand => "INVALID_COMMAND",
            Self::InvalidParameters => "INVALID_PARAMETERS",
            Self::Malformed => "MALFORMED",
            Self::Auth => "AUTH",
            Self::Access => "ACCESS",
        }
    }

    /// Business statuses a peer reports about the request itself. These are
    /// carried to the caller unchanged.
    pub const fn is_pass_through(self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::InvalidCommand
                | Self::InvalidParameters
                | Self::Malformed
                | Self::Auth
                | Self::Access
        )
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown request status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for RequestStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownStatus(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_parses_back_from_its_wire_name() {
        for status in RequestStatus::ALL {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
            assert_eq!(
                serde_json::to_string(&status).expect("serialize"),
                format!("\"{}\"", status.as_str())
            );
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let error = "TEAPOT".parse::<RequestStatus>().expect_err("unknown");
        assert_eq!(error.0, "TEAPOT");
    }

    #[test]
    fn only_business_statuses_pass_through() {
        assert!(RequestStatus::NotFound.is_pass_through());
        assert!(RequestStatus::Malformed.is_pass_through());
        assert!(!RequestStatus::Backend.is_pass_through());
        assert!(!RequestStatus::FeedHub.is_pass_through());
        assert!(!RequestStatus::Ok.is_pass_through());
    }
}
