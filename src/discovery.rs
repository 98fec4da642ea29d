use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{Html, Selector};
use tracing::info;

use crate::domain::RemoteFile;
use crate::error::LoaderError;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Lists the archives of the most recent dataset release.
pub trait ReleaseDiscovery {
    fn latest_release(&self, base_url: &str) -> Result<Vec<RemoteFile>, LoaderError>;
}

#[derive(Clone)]
pub struct HttpDiscovery {
    client: Client,
}

impl HttpDiscovery {
    pub fn new() -> Result<Self, LoaderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cnpj-loader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LoaderError::DiscoveryHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(CATALOG_TIMEOUT)
            .build()
            .map_err(|err| LoaderError::DiscoveryHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn get_text(&self, url: &str) -> Result<String, LoaderError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| LoaderError::DiscoveryHttp(err.to_string()))?;
        if !response.status().is_success() {
            return Err(LoaderError::DiscoveryStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response
            .text()
            .map_err(|err| LoaderError::DiscoveryHttp(err.to_string()))
    }
}

impl ReleaseDiscovery for HttpDiscovery {
    fn latest_release(&self, base_url: &str) -> Result<Vec<RemoteFile>, LoaderError> {
        let catalog = self.get_text(base_url)?;
        let release = select_release(&catalog)
            .ok_or_else(|| LoaderError::NoRelease(base_url.to_string()))?;
        let release_url = join_url(base_url, &release);
        info!("latest release: {release_url}");

        let listing = self.get_text(&release_url)?;
        Ok(archive_urls(&listing, &release_url))
    }
}

/// Picks the most recent dated sub-catalog: the lexicographic maximum of
/// the date-prefixed directory hrefs (`2024-01/` sorts above `2023-12/`).
pub fn select_release(html: &str) -> Option<String> {
    hrefs(html)
        .into_iter()
        .filter(|href| href.starts_with("20") && href.ends_with('/'))
        .max()
}

/// Absolute download URLs for every `.zip` entry in a release listing.
/// Relative hrefs are resolved against the release URL; entries without a
/// usable filename are dropped.
pub fn archive_urls(html: &str, release_url: &str) -> Vec<RemoteFile> {
    hrefs(html)
        .into_iter()
        .filter(|href| href.ends_with(".zip"))
        .map(|href| {
            if href.starts_with("http") {
                href
            } else {
                join_url(release_url, &href)
            }
        })
        .filter_map(|url| RemoteFile::from_url(&url))
        .collect()
}

fn hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a") else {
        return Vec::new();
    };
    document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn join_url(base: &str, rest: &str) -> String {
    format!("{}/{rest}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
        <html><body>
        <a href="../">Parent Directory</a>
        <a href="20231201/">20231201/</a>
        <a href="20240101/">20240101/</a>
        <a href="outros/">outros/</a>
        </body></html>
    "#;

    #[test]
    fn selects_most_recent_release() {
        assert_eq!(select_release(CATALOG).as_deref(), Some("20240101/"));
    }

    #[test]
    fn no_release_in_empty_catalog() {
        assert_eq!(select_release("<html><body></body></html>"), None);
    }

    #[test]
    fn collects_zip_urls() {
        let listing = r#"
            <a href="../">up</a>
            <a href="Cnaes.zip">Cnaes.zip</a>
            <a href="https://mirror.example.org/Empresas0.zip">Empresas0.zip</a>
            <a href="LAYOUT.pdf">LAYOUT.pdf</a>
        "#;
        let files = archive_urls(listing, "https://example.org/cnpj/20240101/");
        let urls: Vec<&str> = files.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://example.org/cnpj/20240101/Cnaes.zip",
                "https://mirror.example.org/Empresas0.zip",
            ]
        );
        assert_eq!(files[0].filename, "Cnaes.zip");
    }
}
