//! Error taxonomy for Feed and Hub requests.
//!
//! Every failure raised while performing a request or reading its body is a
//! [`FeedError`]. [`classify`] maps it onto the small [`RequestStatus`]
//! vocabulary callers act on, and [`base_log_policy`] decides how much
//! context is worth logging for it. Both are pure functions.
//!
//! | Raw error | Condition | Status |
//! |-----------|-----------|--------|
//! | `Socket` | any | `TRANSPORT` |
//! | `Status` | `< 100` | `INTERNAL` |
//! | `Status` | `[200, 400)` or `>= 501` | `TRANSPORT` |
//! | `Status` | `[400, 500]` | `FEEDHUB` |
//! | `Unpacking` | any | `FEEDHUB` |
//! | `Structured` | `BACKEND` | `BACKEND` |
//! | `Structured` | business status | unchanged |
//! | `Structured` | anything else | `FEEDHUB` |
//! | `Expected` / `Unexpected` | any | `INTERNAL` |

use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::direction::Peer;
use crate::endpoint::MsgHead;
use crate::status::RequestStatus;

static MAINTENANCE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\s+\[MAINTENANCE\]").expect("maintenance marker pattern"));

/// Raw failure raised by the transport or unpacking layer.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    /// Connection-level failure before any status line was read.
    #[error("socket error {code}: {message}")]
    Socket {
        code: &'static str,
        message: String,
        msg_head: Option<MsgHead>,
    },

    /// A response arrived with a status outside the expected set.
    #[error("unexpected HTTP status {status_code}")]
    Status {
        status_code: u16,
        body: Option<Value>,
        msg_head: Option<MsgHead>,
    },

    /// The body was not JSON, or not shaped the way the protocol requires.
    #[error("unpacking error: {message}")]
    Unpacking {
        message: String,
        body: Option<String>,
        msg_head: Option<MsgHead>,
    },

    /// A well-formed envelope whose embedded request status was not OK.
    #[error("{status}: {message}")]
    Structured {
        status: String,
        message: String,
        msg_head: Option<MsgHead>,
    },

    /// A failure this crate anticipated and can describe on its own.
    #[error("{short_message}")]
    Expected {
        short_message: String,
        log_message: String,
    },

    /// Anything else.
    #[error("{0}")]
    Unexpected(Arc<dyn StdError + Send + Sync>),
}

impl FeedError {
    pub fn unpacking(message: impl Into<String>, body: Option<String>) -> Self {
        Self::Unpacking {
            message: message.into(),
            body,
            msg_head: None,
        }
    }

    pub fn structured(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structured {
            status: status.into(),
            message: message.into(),
            msg_head: None,
        }
    }

    pub fn expected(short_message: impl Into<String>, log_message: impl Into<String>) -> Self {
        Self::Expected {
            short_message: short_message.into(),
            log_message: log_message.into(),
        }
    }

    pub fn unexpected(error: impl StdError + Send + Sync + 'static) -> Self {
        Self::Unexpected(Arc::new(error))
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Socket { .. } => ErrorKind::Socket,
            Self::Status { .. } => ErrorKind::Status,
            Self::Unpacking { .. } => ErrorKind::Unpacking,
            Self::Structured { .. } => ErrorKind::Structured,
            Self::Expected { .. } => ErrorKind::Expected,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// Code used alongside [`ErrorKind`] for log-policy lookups.
    pub fn code(&self) -> String {
        match self {
            Self::Socket { code, .. } => (*code).to_owned(),
            Self::Status { status_code, .. } => status_code.to_string(),
            Self::Unpacking { .. } => String::from("UNPACKING"),
            Self::Structured { status, .. } => status.clone(),
            Self::Expected { .. } => String::from("EXPECTED"),
            Self::Unexpected(_) => String::from("UNEXPECTED"),
        }
    }

    pub fn msg_head(&self) -> Option<&MsgHead> {
        match self {
            Self::Socket { msg_head, .. }
            | Self::Status { msg_head, .. }
            | Self::Unpacking { msg_head, .. }
            | Self::Structured { msg_head, .. } => msg_head.as_ref(),
            Self::Expected { .. } | Self::Unexpected(_) => None,
        }
    }

    /// Attaches the request summary if the error does not carry one yet.
    pub fn with_msg_head(mut self, head: &MsgHead) -> Self {
        match &mut self {
            Self::Socket { msg_head, .. }
            | Self::Status { msg_head, .. }
            | Self::Unpacking { msg_head, .. }
            | Self::Structured { msg_head, .. } => {
                if msg_head.is_none() {
                    *msg_head = Some(head.clone());
                }
            }
            Self::Expected { .. } | Self::Unexpected(_) => {}
        }
        self
    }
}

/// The raw error kinds recognised by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Socket,
    Status,
    Unpacking,
    Structured,
    Expected,
    Unexpected,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Socket => "socket",
            Self::Status => "status",
            Self::Unpacking => "unpacking",
            Self::Structured => "structured",
            Self::Expected => "expected",
            Self::Unexpected => "unexpected",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much context to add when logging a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogPolicy {
    pub log_item_payload: bool,
    pub log_request_uri: bool,
}

impl LogPolicy {
    pub const NONE: Self = Self::new(false, false);
    pub const ITEM: Self = Self::new(true, false);
    pub const URI: Self = Self::new(false, true);
    pub const BOTH: Self = Self::new(true, true);

    pub const fn new(log_item_payload: bool, log_request_uri: bool) -> Self {
        Self {
            log_item_payload,
            log_request_uri,
        }
    }
}

/// Log policy shared by both sides. Total: unmatched pairs yield [`LogPolicy::NONE`].
pub fn base_log_policy(kind: ErrorKind, code: &str) -> LogPolicy {
    match (kind, code) {
        (ErrorKind::Status, "500") => LogPolicy::ITEM,
        (ErrorKind::Status, "404") => LogPolicy::URI,
        (ErrorKind::Structured, "MALFORMED") => LogPolicy::BOTH,
        (ErrorKind::Structured, "INVALID_PARAMETERS" | "NOT_FOUND") => LogPolicy::ITEM,
        _ => LogPolicy::NONE,
    }
}

/// Result of classifying a raw failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub request_status: RequestStatus,
    pub short_message: String,
    pub log_message: String,
    pub is_transport: bool,
    pub is_backend_maintenance: bool,
}

/// Status for a response whose HTTP status was not expected.
pub const fn status_for_http(status_code: u16) -> RequestStatus {
    match status_code {
        0..=99 => RequestStatus::Internal,
        400..=500 => RequestStatus::FeedHub,
        _ => RequestStatus::Transport,
    }
}

/// Status for a structured peer error carrying `embedded` as its status.
pub fn status_for_structured(embedded: &str) -> RequestStatus {
    match embedded.parse::<RequestStatus>() {
        Ok(RequestStatus::Backend) => RequestStatus::Backend,
        Ok(status) if status.is_pass_through() => status,
        _ => RequestStatus::FeedHub,
    }
}

/// True for a structured BACKEND error whose message carries the
/// maintenance marker. Callers treat those as transient.
pub fn is_backend_maintenance_error(error: &FeedError) -> bool {
    match error {
        FeedError::Structured {
            status, message, ..
        } => status == RequestStatus::Backend.as_str() && MAINTENANCE_MARKER.is_match(message),
        _ => false,
    }
}

/// Maps a raw failure seen while talking to `peer` onto a [`ClassifiedError`].
pub fn classify(error: &FeedError, peer: Peer) -> ClassifiedError {
    let (request_status, short_message, log_message) = match error {
        FeedError::Socket { code, message, .. } => (
            RequestStatus::Transport,
            format!("could not reach {peer} ({code})"),
            format!("connection to {peer} failed ({code}): {message}"),
        ),
        FeedError::Status {
            status_code, body, ..
        } => {
            let status = status_for_http(*status_code);
            let short = match *status_code {
                0..=99 => String::from("no request attempted: endpoint allows zero attempts"),
                500 => format!("{peer} raised an unhandled exception (HTTP 500)"),
                code => format!("{peer} answered HTTP {code}"),
            };
            let log = match body {
                Some(body) => format!("{short}; body: {}", snippet(&body.to_string())),
                None => short.clone(),
            };
            (status, short, log)
        }
        FeedError::Unpacking { message, body, .. } => {
            let short = format!("{peer} returned an unreadable payload");
            let log = match body {
                Some(body) => format!("{short}: {message}; body: {}", snippet(body)),
                None => format!("{short}: {message}"),
            };
            (RequestStatus::FeedHub, short, log)
        }
        FeedError::Structured {
            status, message, ..
        } => (
            status_for_structured(status),
            format!("{peer} reported {status}"),
            format!("{peer} reported {status}: {message}"),
        ),
        FeedError::Expected {
            short_message,
            log_message,
        } => (
            RequestStatus::Internal,
            short_message.clone(),
            log_message.clone(),
        ),
        FeedError::Unexpected(inner) => (
            RequestStatus::Internal,
            format!("unexpected error: {inner}"),
            render_unexpected(inner.as_ref()),
        ),
    };

    ClassifiedError {
        kind: error.kind(),
        request_status,
        short_message,
        log_message,
        is_transport: request_status == RequestStatus::Transport,
        is_backend_maintenance: is_backend_maintenance_error(error),
    }
}

/// Renders a failure for a log line. Verbose rendering adds the full log
/// message and the request summary.
pub fn log_message_for_error(classified: &ClassifiedError, error: &FeedError, verbose: bool) -> String {
    if !verbose {
        return classified.short_message.clone();
    }
    match error.msg_head() {
        Some(head) => format!("{} [{}]", classified.log_message, head.render()),
        None => classified.log_message.clone(),
    }
}

fn render_unexpected(error: &(dyn StdError + Send + Sync)) -> String {
    let mut rendered = format!("{error:?}: {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    rendered
}

fn snippet(text: &str) -> String {
    const MAX: usize = 512;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> FeedError {
        FeedError::Status {
            status_code: code,
            body: None,
            msg_head: None,
        }
    }

    #[test]
    fn http_status_table_is_deterministic() {
        let cases = [
            (0, RequestStatus::Internal),
            (99, RequestStatus::Internal),
            (200, RequestStatus::Transport),
            (204, RequestStatus::Transport),
            (302, RequestStatus::Transport),
            (399, RequestStatus::Transport),
            (400, RequestStatus::FeedHub),
            (404, RequestStatus::FeedHub),
            (499, RequestStatus::FeedHub),
            (500, RequestStatus::FeedHub),
            (501, RequestStatus::Transport),
            (503, RequestStatus::Transport),
        ];

        for (code, expected) in cases {
            let classified = classify(&status(code), Peer::Hub);
            assert_eq!(classified.request_status, expected, "HTTP {code}");
            assert_eq!(classified.kind, ErrorKind::Status);
        }
    }

    #[test]
    fn structured_statuses_refine_or_pass_through() {
        let cases = [
            ("BACKEND", RequestStatus::Backend),
            ("NOT_FOUND", RequestStatus::NotFound),
            ("INVALID_PARAMETERS", RequestStatus::InvalidParameters),
            ("AUTH", RequestStatus::Auth),
            ("INTERNAL", RequestStatus::FeedHub),
            ("TRANSPORT", RequestStatus::FeedHub),
            ("SOMETHING_NEW", RequestStatus::FeedHub),
        ];

        for (embedded, expected) in cases {
            let classified = classify(&FeedError::structured(embedded, "nope"), Peer::Hub);
            assert_eq!(classified.request_status, expected, "{embedded}");
            assert!(!classified.is_transport);
        }
    }

    #[test]
    fn socket_errors_are_transport() {
        let error = FeedError::Socket {
            code: "ECONNRESET",
            message: String::from("socket hang up"),
            msg_head: None,
        };
        let classified = classify(&error, Peer::Feed);

        assert_eq!(classified.request_status, RequestStatus::Transport);
        assert!(classified.is_transport);
        assert!(classified.short_message.contains("feed"));
    }

    #[test]
    fn unpacking_errors_blame_the_peer() {
        let error = FeedError::unpacking("expected value at line 1", Some(String::from("<html>")));
        let classified = classify(&error, Peer::Hub);

        assert_eq!(classified.request_status, RequestStatus::FeedHub);
        assert!(classified.log_message.contains("<html>"));
    }

    #[test]
    fn generic_errors_are_internal() {
        let expected = classify(&FeedError::expected("bad params", "params were not an object"), Peer::Hub);
        assert_eq!(expected.request_status, RequestStatus::Internal);
        assert_eq!(expected.log_message, "params were not an object");

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let unexpected = classify(&FeedError::unexpected(io), Peer::Hub);
        assert_eq!(unexpected.request_status, RequestStatus::Internal);
        assert!(unexpected.log_message.contains("disk on fire"));
        assert!(unexpected.log_message.contains("Custom"));
    }

    #[test]
    fn maintenance_marker_requires_backend_status_and_colon_prefix() {
        let maintenance = FeedError::structured("BACKEND", "backend said:  [MAINTENANCE] back at 6");
        assert!(is_backend_maintenance_error(&maintenance));
        assert!(classify(&maintenance, Peer::Hub).is_backend_maintenance);

        let no_colon = FeedError::structured("BACKEND", "[MAINTENANCE] back at 6");
        assert!(!is_backend_maintenance_error(&no_colon));

        let wrong_status = FeedError::structured("FEEDHUB", "hub: [MAINTENANCE]");
        assert!(!is_backend_maintenance_error(&wrong_status));
    }

    #[test]
    fn base_log_policy_is_total() {
        assert_eq!(base_log_policy(ErrorKind::Status, "500"), LogPolicy::ITEM);
        assert_eq!(base_log_policy(ErrorKind::Status, "404"), LogPolicy::URI);
        assert_eq!(base_log_policy(ErrorKind::Structured, "MALFORMED"), LogPolicy::BOTH);
        assert_eq!(base_log_policy(ErrorKind::Structured, "NOT_FOUND"), LogPolicy::ITEM);
        assert_eq!(
            base_log_policy(ErrorKind::Structured, "INVALID_PARAMETERS"),
            LogPolicy::ITEM
        );

        for kind in [
            ErrorKind::Socket,
            ErrorKind::Status,
            ErrorKind::Unpacking,
            ErrorKind::Structured,
            ErrorKind::Expected,
            ErrorKind::Unexpected,
        ] {
            for code in ["", "418", "ECONNRESET", "WHATEVER", "500x"] {
                assert_eq!(base_log_policy(kind, code), LogPolicy::NONE, "{kind} {code}");
            }
        }
    }

    #[test]
    fn verbose_rendering_uses_log_message() {
        let error = FeedError::structured("MALFORMED", "field 'dob' missing");
        let classified = classify(&error, Peer::Hub);

        assert_eq!(log_message_for_error(&classified, &error, false), "hub reported MALFORMED");
        assert_eq!(
            log_message_for_error(&classified, &error, true),
            "hub reported MALFORMED: field 'dob' missing"
        );
    }

    #[test]
    fn long_bodies_are_cut_in_log_messages() {
        let body = "x".repeat(2_000);
        let error = FeedError::unpacking("not json", Some(body));
        let classified = classify(&error, Peer::Feed);

        assert!(classified.log_message.len() < 700);
        assert!(classified.log_message.ends_with("..."));
    }
}
