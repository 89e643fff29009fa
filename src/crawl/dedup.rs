use std::sync::Arc;

use crate::db::TaskStore;
use crate::error::Result;

/// Has a URL already been stored as a result? Exact string match only:
/// `https://a.com/x` and `https://a.com/x/` are different articles.
pub struct Deduplicator {
    store: Arc<dyn TaskStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub async fn is_duplicate(&self, url: &str) -> Result<bool> {
        self.store.result_exists(url).await
    }
}
