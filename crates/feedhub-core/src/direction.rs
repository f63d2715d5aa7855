use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Which way items of an operation type flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// The Hub delivers items to the Feed.
    #[serde(rename = "toFeed")]
    ToFeed,
    /// The Feed delivers items toward the backend, through the Hub.
    #[serde(rename = "toBackend")]
    ToBackend,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToFeed => "toFeed",
            Self::ToBackend => "toBackend",
        }
    }

    /// Default bundle page size for operation types flowing this way.
    ///
    /// Feeds answer slower than the Hub, so pages pulled from a Feed are
    /// smaller than pages pulled from the Hub.
    pub const fn default_chunk_max_items(self) -> usize {
        match self {
            Self::ToFeed => 100,
            Self::ToBackend => 50,
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transport side an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peer {
    Feed,
    Hub,
}

impl Peer {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Hub => "hub",
        }
    }
}

impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_serializes_with_wire_names() {
        assert_eq!(
            serde_json::to_string(&Direction::ToBackend).expect("serialize"),
            "\"toBackend\""
        );
        assert_eq!(Direction::ToFeed.to_string(), "toFeed");
    }
}
