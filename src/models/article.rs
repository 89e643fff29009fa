/// Article content pulled out of a single page. Never stored as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedArticle {
    pub title: String,
    pub text: String,
    pub top_image: Option<String>,
}
