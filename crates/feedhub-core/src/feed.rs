use std::sync::Arc;

use crate::endpoint::Endpoint;

/// A downstream data source/sink exchanging items with the Hub.
///
/// Built by the config layer; operations only read it.
#[derive(Debug, Clone)]
pub struct Feed {
    pub alias: String,
    pub verbose: bool,
    /// Bundle page size override for every bundle operation of this feed.
    pub chunk_max_items: Option<usize>,
    feed_endpoint: Arc<Endpoint>,
    hub_endpoint: Arc<Endpoint>,
}

impl Feed {
    pub fn new(alias: impl Into<String>, feed_endpoint: Endpoint, hub_endpoint: Endpoint) -> Self {
        Self {
            alias: alias.into(),
            verbose: false,
            chunk_max_items: None,
            feed_endpoint: Arc::new(feed_endpoint),
            hub_endpoint: Arc::new(hub_endpoint),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_chunk_max_items(mut self, chunk_max_items: usize) -> Self {
        self.chunk_max_items = Some(chunk_max_items);
        self
    }

    pub fn feed_endpoint(&self) -> &Arc<Endpoint> {
        &self.feed_endpoint
    }

    pub fn hub_endpoint(&self) -> &Arc<Endpoint> {
        &self.hub_endpoint
    }
}
