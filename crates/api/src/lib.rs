//! Backend API client for Mangashelf.

use async_trait::async_trait;
use mangashelf_core::{Bookmark, Chapter, LibraryEntry, Manga, Page};
use serde::Deserialize;

mod http;

pub use http::HttpApi;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid backend url {0:?}")]
    InvalidUrl(String),
    #[error("{url} returned status {status}")]
    Status { status: u16, url: String },
    #[error("unexpected response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Query parameters of `POST /progress/update`. `page_number` is the
/// zero-based page index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub user_id: String,
    pub manga_id: String,
    pub chapter_id: String,
    pub page_number: u32,
}

/// One method per backend endpoint. Implementations must not retry.
#[async_trait]
pub trait MangaApi: Send + Sync {
    async fn search_manga(&self, query: &str, limit: u32) -> Result<Vec<Manga>, ApiError>;

    async fn manga_details(&self, manga_id: &str) -> Result<Manga, ApiError>;

    async fn manga_chapters(&self, manga_id: &str) -> Result<Vec<Chapter>, ApiError>;

    async fn chapter_pages(&self, chapter_id: &str) -> Result<Vec<Page>, ApiError>;

    async fn add_to_library(&self, user_id: &str, manga: &Manga) -> Result<(), ApiError>;

    async fn library(&self, user_id: &str) -> Result<Vec<LibraryEntry>, ApiError>;

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<(), ApiError>;

    async fn add_bookmark(&self, user_id: &str, bookmark: &Bookmark) -> Result<(), ApiError>;

    async fn bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>, ApiError>;

    /// Raw bytes of a page or cover image (absolute URL).
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError>;
}

// A search envelope without `manga` is treated as zero results; the other
// envelopes require their list.

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub manga: Vec<Manga>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChaptersResponse {
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PagesResponse {
    pub pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LibraryResponse {
    pub library: Vec<LibraryEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BookmarksResponse {
    pub bookmarks: Vec<Bookmark>,
}
