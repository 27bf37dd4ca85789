use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use mangashelf_api::{ApiError, MangaApi, ProgressUpdate};
use mangashelf_core::{Bookmark, Chapter, LibraryEntry, Manga, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Search,
    MangaDetails,
    Chapters,
    Pages,
    AddToLibrary,
    Library,
    UpdateProgress,
    AddBookmark,
    Bookmarks,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search { query: String, limit: u32 },
    MangaDetails(String),
    Chapters(String),
    Pages(String),
    AddToLibrary { user_id: String, manga_id: String },
    Library(String),
    UpdateProgress(ProgressUpdate),
    AddBookmark(Bookmark),
    Bookmarks(String),
    Image(String),
}

#[derive(Debug, Default)]
struct MockState {
    catalog: Vec<Manga>,
    chapters: HashMap<String, Vec<Chapter>>,
    pages: HashMap<String, Vec<Page>>,
    library: Vec<(String, LibraryEntry)>,
    bookmarks: Vec<(String, Bookmark)>,
    images: HashMap<String, Vec<u8>>,
    failing: HashSet<Endpoint>,
    calls: Vec<Call>,
    next_id: u32,
}

/// In-memory backend that behaves like the real one: adding twice keeps one
/// library entry, progress updates rewrite the entry's last-read fields.
#[derive(Debug, Default)]
pub struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(self, catalog: Vec<Manga>) -> Self {
        self.state().catalog = catalog;
        self
    }

    pub fn with_chapters(self, manga_id: &str, chapters: Vec<Chapter>) -> Self {
        self.state().chapters.insert(manga_id.to_string(), chapters);
        self
    }

    pub fn with_pages(self, chapter_id: &str, pages: Vec<Page>) -> Self {
        self.state().pages.insert(chapter_id.to_string(), pages);
        self
    }

    pub fn with_image(self, url: &str, bytes: Vec<u8>) -> Self {
        self.state().images.insert(url.to_string(), bytes);
        self
    }

    pub fn fail(&self, endpoint: Endpoint) {
        self.state().failing.insert(endpoint);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.state().failing.remove(&endpoint);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn progress_updates(&self) -> Vec<ProgressUpdate> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::UpdateProgress(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(
        &self,
        endpoint: Endpoint,
        call: Call,
    ) -> Result<MutexGuard<'_, MockState>, ApiError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failing.contains(&endpoint) {
            return Err(ApiError::Status {
                status: 503,
                url: format!("mock://{endpoint:?}"),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl MangaApi for MockApi {
    async fn search_manga(&self, query: &str, limit: u32) -> Result<Vec<Manga>, ApiError> {
        let state = self.record(
            Endpoint::Search,
            Call::Search {
                query: query.to_string(),
                limit,
            },
        )?;
        let needle = query.trim().to_lowercase();
        Ok(state
            .catalog
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn manga_details(&self, manga_id: &str) -> Result<Manga, ApiError> {
        let state = self.record(Endpoint::MangaDetails, Call::MangaDetails(manga_id.to_string()))?;
        state
            .catalog
            .iter()
            .find(|m| m.id == manga_id)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                url: format!("mock://manga/{manga_id}"),
            })
    }

    async fn manga_chapters(&self, manga_id: &str) -> Result<Vec<Chapter>, ApiError> {
        let state = self.record(Endpoint::Chapters, Call::Chapters(manga_id.to_string()))?;
        Ok(state.chapters.get(manga_id).cloned().unwrap_or_default())
    }

    async fn chapter_pages(&self, chapter_id: &str) -> Result<Vec<Page>, ApiError> {
        let state = self.record(Endpoint::Pages, Call::Pages(chapter_id.to_string()))?;
        Ok(state.pages.get(chapter_id).cloned().unwrap_or_default())
    }

    async fn add_to_library(&self, user_id: &str, manga: &Manga) -> Result<(), ApiError> {
        let mut state = self.record(
            Endpoint::AddToLibrary,
            Call::AddToLibrary {
                user_id: user_id.to_string(),
                manga_id: manga.id.clone(),
            },
        )?;
        let exists = state
            .library
            .iter()
            .any(|(user, entry)| user == user_id && entry.manga_id == manga.id);
        if !exists {
            state.next_id += 1;
            let entry = LibraryEntry {
                id: format!("lib-{}", state.next_id),
                manga_id: manga.id.clone(),
                title: manga.title.clone(),
                cover_art: manga.cover_art.clone(),
                status: "reading".to_string(),
                last_read_chapter: None,
                last_read_page: 0,
            };
            state.library.push((user_id.to_string(), entry));
        }
        Ok(())
    }

    async fn library(&self, user_id: &str) -> Result<Vec<LibraryEntry>, ApiError> {
        let state = self.record(Endpoint::Library, Call::Library(user_id.to_string()))?;
        Ok(state
            .library
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn update_progress(&self, update: &ProgressUpdate) -> Result<(), ApiError> {
        let mut state =
            self.record(Endpoint::UpdateProgress, Call::UpdateProgress(update.clone()))?;
        for (user, entry) in state.library.iter_mut() {
            if *user == update.user_id && entry.manga_id == update.manga_id {
                entry.last_read_chapter = Some(update.chapter_id.clone());
                entry.last_read_page = update.page_number;
            }
        }
        Ok(())
    }

    async fn add_bookmark(&self, user_id: &str, bookmark: &Bookmark) -> Result<(), ApiError> {
        let mut state = self.record(Endpoint::AddBookmark, Call::AddBookmark(bookmark.clone()))?;
        state.next_id += 1;
        let stored = Bookmark {
            id: format!("bm-{}", state.next_id),
            ..bookmark.clone()
        };
        state.bookmarks.push((user_id.to_string(), stored));
        Ok(())
    }

    async fn bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>, ApiError> {
        let state = self.record(Endpoint::Bookmarks, Call::Bookmarks(user_id.to_string()))?;
        Ok(state
            .bookmarks
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, b)| b.clone())
            .collect())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let state = self.record(Endpoint::Image, Call::Image(url.to_string()))?;
        state.images.get(url).cloned().ok_or_else(|| ApiError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}
