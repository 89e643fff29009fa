use std::sync::{Arc, OnceLock};

use regex::Regex;
use readability::extractor::{self, Product};
use scraper::{ElementRef, Html, Selector};
use url::Url;
use uuid::Uuid;

use crate::db::TaskStore;
use crate::error::Result;
use crate::models::{ExtractedArticle, NewResult, PendingTask};
use crate::services::ImageStore;

use super::fetcher::Fetcher;

/// Bodies shorter than this are paywalls, stubs or link pages.
const MIN_BODY_CHARS: usize = 100;

const MIN_TITLE_CHARS: usize = 5;

/// Site-chrome titles that some publishers put on every article page.
const GENERIC_TITLES: &[&str] = &[
    "FlightGlobal",
    "Air transport",
    "News",
    "Home",
    "Business Aviation",
];

const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form", "script", "style"];

const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " – ", " — ", " » ", " :: "];

const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    Saved,
    /// Page fetched but not worth keeping
    Skipped,
    Failed(String),
}

#[cfg(test)]
impl ScrapeOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, ScrapeOutcome::Saved)
    }
}

pub struct ArticleExtractor {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn TaskStore>,
    image_store: Option<Arc<dyn ImageStore>>,
    image_prefix: String,
}

impl ArticleExtractor {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn TaskStore>,
        image_store: Option<Arc<dyn ImageStore>>,
        image_prefix: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            image_store,
            image_prefix: image_prefix.into(),
        }
    }

    /// Scrape one article and store it as a result of `task`.
    /// Errors stay contained to this URL.
    pub async fn scrape(&self, url: &str, task: &PendingTask) -> ScrapeOutcome {
        tracing::debug!("Processing {}", url);

        self.try_scrape(url, task)
            .await
            .unwrap_or_else(|e| ScrapeOutcome::Failed(e.to_string()))
    }

    async fn try_scrape(&self, url: &str, task: &PendingTask) -> Result<ScrapeOutcome> {
        let html = self.fetcher.fetch_article(url).await?;
        let article = parse_article(&html, url);

        let body_chars = article.text.chars().count();
        if body_chars < MIN_BODY_CHARS {
            tracing::debug!("Skipping {}: content too short ({} chars)", url, body_chars);
            return Ok(ScrapeOutcome::Skipped);
        }

        let image_url = match &article.top_image {
            Some(source) => Some(
                self.relocate_image(source)
                    .await
                    .unwrap_or_else(|| source.clone()),
            ),
            None => None,
        };

        let title = article.title;
        self.store
            .insert_result(NewResult {
                job_id: task.job_id,
                website_id: task.website.id,
                title: title.clone(),
                content: article.text,
                description: url.to_string(),
                image_url,
            })
            .await?;

        tracing::info!("Saved: {}", title.chars().take(40).collect::<String>());
        Ok(ScrapeOutcome::Saved)
    }

    /// Copy the lead image into object storage. `None` means keep the source URL.
    async fn relocate_image(&self, source: &str) -> Option<String> {
        let store = self.image_store.as_ref()?;

        let bytes = match self.fetcher.fetch_image(source).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to fetch image {}: {}", source, e);
                return None;
            }
        };

        let path = format!("{}/{}.jpg", self.image_prefix, Uuid::new_v4());
        if let Err(e) = store.upload(&path, bytes, IMAGE_CONTENT_TYPE).await {
            tracing::warn!("Image upload failed for {}: {}", source, e);
            return None;
        }

        match store.public_url(&path).await {
            Ok(public) => {
                tracing::debug!("Uploaded image to {}", path);
                Some(public)
            }
            Err(e) => {
                tracing::warn!("No public URL for {}: {}", path, e);
                None
            }
        }
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn collapse_whitespace(text: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let re = WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    re.replace_all(text.trim(), " ").into_owned()
}

/// Pull title, body text and lead image out of an article page.
pub fn parse_article(html: &str, page_url: &str) -> ExtractedArticle {
    let readable = readable_parts(html, page_url);
    let document = Html::parse_document(html);

    let text = readable
        .as_ref()
        .map(readable_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| plain_text(&document));

    let extracted = page_title(&document, readable.as_ref());
    let content = readable.as_ref().map(|r| Html::parse_fragment(&r.content));

    ExtractedArticle {
        title: pick_title(&document, extracted),
        text,
        top_image: lead_image(&document, content.as_ref(), page_url),
    }
}

/// Main content as found by readability. `None` when it gives up.
fn readable_parts(html: &str, page_url: &str) -> Option<Product> {
    let base = Url::parse(page_url).ok()?;
    match extractor::extract(&mut html.as_bytes(), &base) {
        Ok(product) => Some(product),
        Err(_) => {
            tracing::debug!("No readable content in {}", page_url);
            None
        }
    }
}

/// Paragraphs of the readable content, one blank line apart.
fn readable_text(product: &Product) -> String {
    let content = Html::parse_fragment(&product.content);
    let paragraphs: Vec<String> = content
        .select(&selector("p"))
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .filter(|t| !t.is_empty())
        .collect();

    if paragraphs.is_empty() {
        tidy_lines(&product.text)
    } else {
        paragraphs.join("\n\n")
    }
}

fn tidy_lines(text: &str) -> String {
    text.lines()
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fallback when readability finds nothing: render the whole body as text.
fn plain_text(document: &Html) -> String {
    let body = selector("body");
    let Some(body) = document.select(&body).next() else {
        return String::new();
    };

    match html2text::from_read(body.html().as_bytes(), 120) {
        Ok(text) => tidy_lines(&text),
        Err(e) => {
            tracing::debug!("Failed to convert HTML to text: {}", e);
            String::new()
        }
    }
}

fn in_chrome(element: ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        node.value()
            .as_element()
            .is_some_and(|e| CHROME_TAGS.contains(&e.name()))
    })
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    document
        .select(&selector(css))
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(str::to_string)
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    document
        .select(&selector(css))
        .next()
        .map(|e| collapse_whitespace(&e.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

/// The page's own idea of its title: `og:title`, else the longest piece of `<title>`.
fn page_title(document: &Html, readable: Option<&Product>) -> String {
    if let Some(title) = meta_content(document, r#"meta[property="og:title"]"#) {
        return collapse_whitespace(&title);
    }

    let title = readable
        .map(|r| collapse_whitespace(&r.title))
        .filter(|t| !t.is_empty())
        .or_else(|| first_text(document, "title"))
        .unwrap_or_default();

    let mut pieces = vec![title.as_str()];
    for sep in TITLE_SEPARATORS {
        pieces = pieces.into_iter().flat_map(|p| p.split(sep)).collect();
    }
    pieces
        .into_iter()
        .map(str::trim)
        .fold("", |best, piece| if piece.chars().count() > best.chars().count() { piece } else { best })
        .to_string()
}

type TitleSource = fn(&str, &Html) -> Option<String>;

fn usable_title(extracted: &str, _document: &Html) -> Option<String> {
    let looks_generic =
        extracted.chars().count() < MIN_TITLE_CHARS || GENERIC_TITLES.contains(&extracted);
    (!looks_generic).then(|| extracted.to_string())
}

fn first_heading(_extracted: &str, document: &Html) -> Option<String> {
    first_text(document, "h1")
}

const TITLE_SOURCES: &[TitleSource] = &[usable_title, first_heading];

fn pick_title(document: &Html, extracted: String) -> String {
    TITLE_SOURCES
        .iter()
        .find_map(|source| source(&extracted, document))
        .unwrap_or(extracted)
}

fn first_image<'a>(images: impl Iterator<Item = ElementRef<'a>>) -> Option<String> {
    images
        .filter_map(|img| img.value().attr("src"))
        .find(|src| !src.trim().is_empty())
        .map(str::to_string)
}

/// `og:image`, `twitter:image`, then the first image of the readable content
/// (or of the page body outside chrome), resolved against the page.
fn lead_image(document: &Html, content: Option<&Html>, page_url: &str) -> Option<String> {
    let images = selector("img[src]");
    let raw = meta_content(document, r#"meta[property="og:image"]"#)
        .or_else(|| meta_content(document, r#"meta[name="twitter:image"]"#))
        .or_else(|| content.and_then(|c| first_image(c.select(&images))))
        .or_else(|| first_image(document.select(&images).filter(|img| !in_chrome(*img))))?;

    Url::parse(page_url)
        .and_then(|base| base.join(raw.trim()))
        .map(|u| u.to_string())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Repository;
    use crate::models::TaskStatus;
    use crate::test_support::{article_page, seeded_repository, FakeFetcher, FakeImageStore};

    const ARTICLE: &str = "https://example.com/news/a";
    const IMAGE: &str = "https://cdn.example.com/lead.jpg";

    struct Fixture {
        _dir: tempfile::TempDir,
        repo: Repository,
        task: PendingTask,
    }

    async fn fixture() -> Fixture {
        let (dir, repo, sites) = seeded_repository(&["https://example.com/cat"]).await;
        let job_id = repo.create_job(sites.clone()).await.unwrap();
        let task = repo.pending_tasks(job_id).await.unwrap().remove(0);
        Fixture {
            _dir: dir,
            repo,
            task,
        }
    }

    fn extractor(
        fetcher: FakeFetcher,
        repo: &Repository,
        images: Option<Arc<FakeImageStore>>,
    ) -> ArticleExtractor {
        ArticleExtractor::new(
            Arc::new(fetcher),
            Arc::new(repo.clone()),
            images.map(|s| s as Arc<dyn ImageStore>),
            "scraped",
        )
    }

    async fn stored_articles(fx: &Fixture) -> Vec<crate::models::Task> {
        fx.repo
            .tasks_for_job(fx.task.job_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.id != fx.task.id)
            .collect()
    }

    #[tokio::test]
    async fn short_body_is_skipped_without_a_row() {
        let fx = fixture().await;
        let page = article_page("A proper title", None, &"x".repeat(80), None);
        let fetcher = FakeFetcher::default().with_page(ARTICLE, &page);

        let outcome = extractor(fetcher, &fx.repo, None).scrape(ARTICLE, &fx.task).await;

        assert_eq!(outcome, ScrapeOutcome::Skipped);
        assert!(!fx.repo.result_exists(ARTICLE).await.unwrap());
        assert!(stored_articles(&fx).await.is_empty());
    }

    #[tokio::test]
    async fn generic_title_is_replaced_by_first_heading() {
        let fx = fixture().await;
        let body = "y".repeat(150);
        let page = article_page("FlightGlobal", Some("Real Headline"), &body, None);
        let fetcher = FakeFetcher::default().with_page(ARTICLE, &page);

        let outcome = extractor(fetcher, &fx.repo, None).scrape(ARTICLE, &fx.task).await;

        assert!(outcome.is_saved());
        let rows = stored_articles(&fx).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TaskStatus::Success);
        assert_eq!(rows[0].title.as_deref(), Some("Real Headline"));
        assert_eq!(rows[0].content.as_deref(), Some(body.as_str()));
        assert_eq!(rows[0].description.as_deref(), Some(ARTICLE));
        assert_eq!(rows[0].website_id, fx.task.website.id);
    }

    #[tokio::test]
    async fn failed_upload_keeps_original_image() {
        let fx = fixture().await;
        let page = article_page("A proper title", None, &"z".repeat(150), Some(IMAGE));
        let fetcher = FakeFetcher::default()
            .with_page(ARTICLE, &page)
            .with_image(IMAGE, vec![1, 2, 3]);
        let images = Arc::new(FakeImageStore::failing());

        let outcome = extractor(fetcher, &fx.repo, Some(images.clone()))
            .scrape(ARTICLE, &fx.task)
            .await;

        assert!(outcome.is_saved());
        assert_eq!(stored_articles(&fx).await[0].image_url.as_deref(), Some(IMAGE));
        assert!(images.uploads().is_empty());
    }

    #[tokio::test]
    async fn unreachable_image_keeps_original_image() {
        let fx = fixture().await;
        let page = article_page("A proper title", None, &"z".repeat(150), Some(IMAGE));
        let fetcher = FakeFetcher::default().with_page(ARTICLE, &page);
        let images = Arc::new(FakeImageStore::default());

        extractor(fetcher, &fx.repo, Some(images.clone()))
            .scrape(ARTICLE, &fx.task)
            .await;

        assert_eq!(stored_articles(&fx).await[0].image_url.as_deref(), Some(IMAGE));
        assert!(images.uploads().is_empty());
    }

    #[tokio::test]
    async fn uploaded_image_url_is_stored() {
        let fx = fixture().await;
        let page = article_page("A proper title", None, &"z".repeat(150), Some(IMAGE));
        let fetcher = FakeFetcher::default()
            .with_page(ARTICLE, &page)
            .with_image(IMAGE, vec![9, 9]);
        let images = Arc::new(FakeImageStore::default());

        extractor(fetcher, &fx.repo, Some(images.clone()))
            .scrape(ARTICLE, &fx.task)
            .await;

        let uploads = images.uploads();
        assert_eq!(uploads.len(), 1);
        let (path, bytes, content_type) = &uploads[0];
        assert!(path.starts_with("scraped/") && path.ends_with(".jpg"));
        assert_eq!(bytes, &vec![9, 9]);
        assert_eq!(content_type, "image/jpeg");

        let stored = stored_articles(&fx).await;
        assert_eq!(
            stored[0].image_url.as_deref(),
            Some(FakeImageStore::public_url_for(path).as_str())
        );
    }

    #[tokio::test]
    async fn fetch_error_is_reported_as_failure() {
        let fx = fixture().await;
        let outcome = extractor(FakeFetcher::default(), &fx.repo, None)
            .scrape(ARTICLE, &fx.task)
            .await;

        assert!(matches!(outcome, ScrapeOutcome::Failed(_)));
        assert!(stored_articles(&fx).await.is_empty());
    }

    #[test]
    fn navigation_paragraphs_are_not_body_text() {
        let html = r#"<html><body>
            <nav><p>Home News Sport Weather and a very long list of navigation links</p></nav>
            <div class="story">
                <p>First   paragraph
                   of the story.</p>
                <p>Second paragraph of the story.</p>
            </div>
            <footer><p>Copyright notice that is long enough to matter in scoring</p></footer>
        </body></html>"#;

        let article = parse_article(html, ARTICLE);
        assert!(article
            .text
            .contains("First paragraph of the story.\n\nSecond paragraph of the story."));
        assert!(!article.text.contains("Home News Sport"));
        assert!(!article.text.contains("Copyright"));
    }

    #[test]
    fn og_metadata_is_preferred() {
        let html = r#"<html><head>
            <title>Ignored | Site</title>
            <meta property="og:title" content="Open Graph Headline">
            <meta property="og:image" content="/img/lead.png">
        </head><body><p>text</p></body></html>"#;

        let article = parse_article(html, ARTICLE);
        assert_eq!(article.title, "Open Graph Headline");
        assert_eq!(
            article.top_image.as_deref(),
            Some("https://example.com/img/lead.png")
        );
    }

    #[test]
    fn site_suffix_is_trimmed_from_title_tag() {
        let html = "<html><head><title>Airline orders forty new jets | FlightGlobal</title></head></html>";
        assert_eq!(parse_article(html, ARTICLE).title, "Airline orders forty new jets");
    }

    #[test]
    fn short_title_without_heading_is_kept() {
        let html = "<html><head><title>Hi</title></head><body><p>text</p></body></html>";
        assert_eq!(parse_article(html, ARTICLE).title, "Hi");
    }

    #[test]
    fn short_title_gives_way_to_heading() {
        let html = "<html><head><title>Hi</title></head><body><h1>Real</h1><p>text</p></body></html>";
        assert_eq!(parse_article(html, ARTICLE).title, "Real");
    }

    #[test]
    fn missing_title_gives_way_to_heading() {
        let html = "<html><head><title> </title></head><body><h1>Airline orders jets</h1><p>text</p></body></html>";
        assert_eq!(parse_article(html, ARTICLE).title, "Airline orders jets");
    }

    #[test]
    fn body_image_is_used_without_metadata() {
        let html = r#"<html><body><div>
            <img src="photo.jpg"><p>Paragraph text</p>
        </div></body></html>"#;
        let article = parse_article(html, ARTICLE);
        assert_eq!(
            article.top_image.as_deref(),
            Some("https://example.com/news/photo.jpg")
        );
    }

    #[test]
    fn page_without_paragraphs_falls_back_to_plain_text() {
        let html = "<html><body><div>Only a bare text block</div></body></html>";
        let article = parse_article(html, ARTICLE);
        assert!(article.text.contains("Only a bare text block"));
        assert!(article.top_image.is_none());
    }
}
