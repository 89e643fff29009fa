use std::collections::HashSet;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::fetcher::Fetcher;

/// A way of picking article links out of a category page.
///
/// Returns `None` when the strategy found nothing, so the next one gets a turn.
pub trait LinkStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, document: &Html) -> Option<Vec<String>>;
}

type HeadlineResolver = fn(ElementRef<'_>) -> Option<String>;

/// Links attached to `h1`..`h5` headings.
pub struct HeadlineStrategy {
    resolvers: Vec<HeadlineResolver>,
}

impl Default for HeadlineStrategy {
    fn default() -> Self {
        Self {
            resolvers: vec![nested_anchor, wrapping_anchor, heading_is_anchor],
        }
    }
}

/// `<h3><a href="...">...</a></h3>`
fn nested_anchor(heading: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("a").expect("static selector");
    let anchor = heading.select(&selector).next()?;
    anchor.value().attr("href").map(str::to_string)
}

/// `<a href="..."><h3>...</h3></a>`
fn wrapping_anchor(heading: ElementRef<'_>) -> Option<String> {
    let parent = heading.parent().and_then(ElementRef::wrap)?;
    if parent.value().name() != "a" {
        return None;
    }
    parent.value().attr("href").map(str::to_string)
}

fn heading_is_anchor(heading: ElementRef<'_>) -> Option<String> {
    if heading.value().name() != "a" {
        return None;
    }
    heading.value().attr("href").map(str::to_string)
}

impl LinkStrategy for HeadlineStrategy {
    fn name(&self) -> &'static str {
        "headlines"
    }

    fn extract(&self, document: &Html) -> Option<Vec<String>> {
        let selector = Selector::parse("h1, h2, h3, h4, h5").expect("static selector");
        let headings: Vec<ElementRef> = document.select(&selector).collect();
        tracing::debug!("Found {} headline tags", headings.len());

        let links: Vec<String> = headings
            .into_iter()
            .filter_map(|heading| self.resolvers.iter().find_map(|resolve| resolve(heading)))
            .filter(|link| !link.is_empty())
            .collect();

        (!links.is_empty()).then_some(links)
    }
}

/// Any anchor whose text is long enough to pass for a headline.
pub struct LongAnchorStrategy {
    min_text_chars: usize,
    blocked_fragments: &'static [&'static str],
}

impl Default for LongAnchorStrategy {
    fn default() -> Self {
        Self {
            min_text_chars: 25,
            blocked_fragments: &["contact", "about", "login"],
        }
    }
}

impl LinkStrategy for LongAnchorStrategy {
    fn name(&self) -> &'static str {
        "long-anchor"
    }

    fn extract(&self, document: &Html) -> Option<Vec<String>> {
        let selector = Selector::parse("a").expect("static selector");

        let links: Vec<String> = document
            .select(&selector)
            .filter_map(|anchor| {
                let href = anchor.value().attr("href").filter(|h| !h.is_empty())?;
                let text = anchor.text().collect::<String>();
                if text.trim().chars().count() <= self.min_text_chars {
                    return None;
                }
                if self.blocked_fragments.iter().any(|f| href.contains(f)) {
                    return None;
                }
                Some(href.to_string())
            })
            .collect();

        (!links.is_empty()).then_some(links)
    }
}

pub struct LinkDiscoverer {
    fetcher: Arc<dyn Fetcher>,
    strategies: Vec<Box<dyn LinkStrategy>>,
}

impl LinkDiscoverer {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_strategies(
            fetcher,
            vec![
                Box::new(HeadlineStrategy::default()),
                Box::new(LongAnchorStrategy::default()),
            ],
        )
    }

    /// Strategies run in order; the first one that yields links wins.
    pub fn with_strategies(fetcher: Arc<dyn Fetcher>, strategies: Vec<Box<dyn LinkStrategy>>) -> Self {
        Self { fetcher, strategies }
    }

    /// Candidate article links on a category page, absolute and deduplicated.
    /// Fetch failures are logged and give an empty list.
    pub async fn discover(&self, page_url: &str) -> Vec<String> {
        tracing::debug!("Visiting {}", page_url);

        let html = match self.fetcher.fetch_category_page(page_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to fetch category page {}: {}", page_url, e);
                return Vec::new();
            }
        };

        let links = self.links_from_html(&html, page_url);
        tracing::info!("Found {} links on {}", links.len(), page_url);
        links
    }

    pub fn links_from_html(&self, html: &str, page_url: &str) -> Vec<String> {
        let document = Html::parse_document(html);

        let raw = self
            .strategies
            .iter()
            .find_map(|strategy| {
                let links = strategy.extract(&document);
                match &links {
                    Some(found) => tracing::debug!("{} strategy found {} links", strategy.name(), found.len()),
                    None => tracing::debug!("{} strategy found nothing", strategy.name()),
                }
                links
            })
            .unwrap_or_default();

        normalize_links(raw, page_url)
    }
}

/// Resolve root-relative paths, drop anything that is not an absolute web URL,
/// and remove duplicates keeping first-seen order.
fn normalize_links(raw: Vec<String>, page_url: &str) -> Vec<String> {
    let base = Url::parse(page_url).ok();

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for link in raw {
        if link.is_empty() {
            continue;
        }

        let candidate = if link.starts_with('/') {
            match base.as_ref().and_then(|b| b.join(&link).ok()) {
                Some(resolved) => resolved.to_string(),
                None => continue,
            }
        } else if has_web_scheme(&link) {
            // Mentioning the host is not enough: `www.example.com/a` has no scheme
            link
        } else {
            continue;
        };

        if seen.insert(candidate.clone()) {
            links.push(candidate);
        }
    }

    links
}

fn has_web_scheme(link: &str) -> bool {
    Url::parse(link)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
