use std::time::Duration;

use async_trait::async_trait;
use mangashelf_core::{Bookmark, Chapter, ClientConfig, LibraryEntry, Manga, Page};
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    ApiError, BookmarksResponse, ChaptersResponse, LibraryResponse, MangaApi, PagesResponse,
    ProgressUpdate, SearchResponse,
};

/// reqwest-backed client for the `/api` backend.
#[derive(Debug, Clone)]
pub struct HttpApi {
    base: Url,
    http: reqwest::Client,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let api_base = config.api_base();
        let base = Url::parse(&api_base).map_err(|_| ApiError::InvalidUrl(api_base.clone()))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(api_base));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("mangashelf/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { base, http })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Appends percent-encoded path segments to the api base.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        debug!(%url, "GET");
        let response = self.http.get(url.clone()).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn post_query(&self, url: Url, query: &[(&str, String)]) -> Result<(), ApiError> {
        debug!(%url, "POST");
        let response = self.http.post(url.clone()).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MangaApi for HttpApi {
    async fn search_manga(&self, query: &str, limit: u32) -> Result<Vec<Manga>, ApiError> {
        let url = self.endpoint(&["manga", "search"])?;
        let params = [("query", query.to_string()), ("limit", limit.to_string())];
        let response: SearchResponse = self.get_json(url, &params).await?;
        Ok(response.manga)
    }

    async fn manga_details(&self, manga_id: &str) -> Result<Manga, ApiError> {
        let url = self.endpoint(&["manga", manga_id])?;
        self.get_json(url, &[]).await
    }

    async fn manga_chapters(&self, manga_id: &str) -> Result<Vec<Chapter>, ApiError> {
        let url = self.endpoint(&["manga", manga_id, "chapters"])?;
        let response: ChaptersResponse = self.get_json(url, &[]).await?;
        Ok(response.chapters)
    }

    async fn chapter_pages(&self, chapter_id: &str) -> Result<Vec<Page>, ApiError> {
        let url = self.endpoint(&["chapter", chapter_id, "pages"])?;
        let response: PagesResponse = self.get_json(url, &[]).await?;
        Ok(response.pages)
    }

    async fn add_to_library(&self, user_id: &str, manga: &Manga) -> Result<(), ApiError> {
        let url = self.endpoint(&["library", "add"])?;
        let params = [
            ("user_id", user_id.to_string()),
            ("manga_id", manga.id.clone()),
            ("title", manga.title.clone()),
            ("cover_art", manga.cover_art.clone()),
        ];
        self.post_query(url, &params).await
    }

    async fn library(&self, user_id: &str) -> Result<Vec<LibraryEntry>, ApiError> {
        let url = self.endpoint(&["library", user_id])?;
        let response: LibraryResponse = self.get_json(url, &[]).await?;
        Ok(response.library)
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<(), ApiError> {
        let url = self.endpoint(&["progress", "update"])?;
        let params = [
            ("user_id", update.user_id.clone()),
            ("manga_id", update.manga_id.clone()),
            ("chapter_id", update.chapter_id.clone()),
            ("page_number", update.page_number.to_string()),
        ];
        self.post_query(url, &params).await
    }

    async fn add_bookmark(&self, user_id: &str, bookmark: &Bookmark) -> Result<(), ApiError> {
        let url = self.endpoint(&["bookmarks", "add"])?;
        let params = [
            ("user_id", user_id.to_string()),
            ("manga_id", bookmark.manga_id.clone()),
            ("chapter_id", bookmark.chapter_id.clone()),
            ("page_number", bookmark.page_number.to_string()),
            ("title", bookmark.title.clone()),
        ];
        self.post_query(url, &params).await
    }

    async fn bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>, ApiError> {
        let url = self.endpoint(&["bookmarks", user_id])?;
        let response: BookmarksResponse = self.get_json(url, &[]).await?;
        Ok(response.bookmarks)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let url = Url::parse(url).map_err(|_| ApiError::InvalidUrl(url.to_string()))?;
        debug!(%url, "GET image");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
