use std::path::Path;

use url::Url;

use crate::db::Repository;
use crate::error::Result;
use crate::models::NewWebsite;

/// Display name for a site: `https://www.techcrunch.com/x` -> `Techcrunch`.
pub fn site_name(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(_) => None,
    };

    let Some(host) = host else {
        return "Unknown Site".to_string();
    };

    let domain = host.strip_prefix("www.").unwrap_or(&host);
    let label = domain.split('.').next().unwrap_or_default();

    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => "Unknown Site".to_string(),
    }
}

/// Insert every URL from a JSON array file that is not already a website.
/// Returns how many were added.
pub async fn seed_websites(repository: &Repository, path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let urls: Vec<String> = serde_json::from_str(&content)?;

    let mut added = 0;
    for url in urls {
        if repository.website_exists(&url).await? {
            tracing::info!("Already exists: {}", url);
            continue;
        }

        let name = site_name(&url);
        repository
            .insert_website(NewWebsite {
                url: url.clone(),
                name: name.clone(),
            })
            .await?;
        tracing::info!("Added {} ({})", name, url);
        added += 1;
    }

    Ok(added)
}
