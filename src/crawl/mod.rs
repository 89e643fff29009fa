mod dedup;
mod discovery;
mod extractor;
mod fetcher;

pub use dedup::Deduplicator;
pub use discovery::LinkDiscoverer;
pub use extractor::{ArticleExtractor, ScrapeOutcome};
pub use fetcher::{Fetcher, HttpFetcher};
