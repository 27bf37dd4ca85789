//! Application orchestration layer for Mangashelf.
//!
//! [`ViewController`] owns every piece of view state. Intents return the
//! backend calls to issue as [`ApiRequest`] values; the results come back as
//! [`Completion`]s and are folded in by [`ViewController::apply`]. Stale
//! payloads from other modes are kept and simply not rendered.

use mangashelf_api::ProgressUpdate;
use mangashelf_core::{
    Bookmark, Chapter, ClientConfig, LibraryEntry, Manga, Page, Progress, ViewMode,
};
use tracing::{debug, error, info, warn};

mod dispatcher;
mod request;

pub use dispatcher::Dispatcher;
pub use request::{ApiRequest, Completion, execute};

/// Keys the reader reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Right,
    Left,
    Space,
}

#[derive(Debug, Clone)]
pub struct ViewController {
    config: ClientConfig,
    mode: ViewMode,
    query: String,
    search_results: Vec<Manga>,
    last_search: Option<String>,
    searching: bool,
    in_flight: usize,
    result_cursor: usize,
    selected_manga: Option<Manga>,
    chapters: Vec<Chapter>,
    chapter_cursor: usize,
    resume_chapter: Option<String>,
    current_chapter: Option<Chapter>,
    pages: Vec<Page>,
    page: usize,
    pending_seek: Option<(String, usize)>,
    library: Vec<LibraryEntry>,
    library_cursor: usize,
    bookmarks: Vec<Bookmark>,
}

impl ViewController {
    pub fn new(mut config: ClientConfig) -> Self {
        config.normalize();
        Self {
            config,
            mode: ViewMode::Search,
            query: String::new(),
            search_results: Vec::new(),
            last_search: None,
            searching: false,
            in_flight: 0,
            result_cursor: 0,
            selected_manga: None,
            chapters: Vec::new(),
            chapter_cursor: 0,
            resume_chapter: None,
            current_chapter: None,
            pages: Vec::new(),
            page: 0,
            pending_seek: None,
            library: Vec::new(),
            library_cursor: 0,
            bookmarks: Vec::new(),
        }
    }

    /// Requests issued once when the client boots.
    pub fn startup(&mut self) -> Vec<ApiRequest> {
        vec![self.load_library()]
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn push_query_char(&mut self, ch: char) {
        self.query.push(ch);
    }

    pub fn pop_query_char(&mut self) {
        self.query.pop();
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
    }

    pub fn search_results(&self) -> &[Manga] {
        &self.search_results
    }

    pub fn selected_result_index(&self) -> usize {
        self.result_cursor
    }

    pub fn selected_result(&self) -> Option<&Manga> {
        self.search_results.get(self.result_cursor)
    }

    pub fn selected_manga(&self) -> Option<&Manga> {
        self.selected_manga.as_ref()
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn selected_chapter_index(&self) -> usize {
        self.chapter_cursor
    }

    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.current_chapter.as_ref()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_index(&self) -> usize {
        self.page
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.pages.get(self.page)
    }

    pub fn progress(&self) -> Option<Progress> {
        if self.pages.is_empty() {
            return None;
        }
        Some(Progress {
            current_page: u32::try_from(self.page).unwrap_or(u32::MAX),
            total_pages: u32::try_from(self.pages.len()).unwrap_or(u32::MAX),
        })
    }

    pub fn library(&self) -> &[LibraryEntry] {
        &self.library
    }

    pub fn selected_library_index(&self) -> usize {
        self.library_cursor
    }

    pub fn selected_library_entry(&self) -> Option<&LibraryEntry> {
        self.library.get(self.library_cursor)
    }

    /// Bookmarks belonging to the selected manga, ordered by chapter then page.
    pub fn current_bookmarks(&self) -> Vec<&Bookmark> {
        let Some(manga) = self.selected_manga.as_ref() else {
            return Vec::new();
        };
        let mut out: Vec<&Bookmark> = self
            .bookmarks
            .iter()
            .filter(|b| b.manga_id == manga.id)
            .collect();
        out.sort_by(|a, b| {
            self.chapter_position(&a.chapter_id)
                .cmp(&self.chapter_position(&b.chapter_id))
                .then(a.page_number.cmp(&b.page_number))
        });
        out
    }

    fn chapter_position(&self, chapter_id: &str) -> usize {
        self.chapters
            .iter()
            .position(|c| c.id == chapter_id)
            .unwrap_or(usize::MAX)
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    /// The query of the last finished search when it produced nothing.
    pub fn no_results_notice(&self) -> Option<&str> {
        if self.searching || !self.search_results.is_empty() {
            return None;
        }
        self.last_search
            .as_deref()
            .filter(|query| !query.trim().is_empty())
    }

    /// Nothing is sent for a blank query or while a search is in flight.
    pub fn search(&mut self) -> Option<ApiRequest> {
        if self.query.trim().is_empty() {
            return None;
        }
        if self.searching {
            debug!(query = %self.query, "search already in flight");
            return None;
        }
        self.search_results.clear();
        self.result_cursor = 0;
        self.searching = true;
        self.in_flight += 1;
        info!(query = %self.query, "searching");
        Some(ApiRequest::Search {
            query: self.query.clone(),
            limit: self.config.search_limit,
        })
    }

    pub fn open_manga(&mut self, manga: Manga) -> ApiRequest {
        let manga_id = manga.id.clone();
        self.selected_manga = Some(manga);
        self.in_flight += 1;
        ApiRequest::Chapters { manga_id }
    }

    pub fn open_selected_result(&mut self) -> Option<ApiRequest> {
        let manga = self.selected_result()?.clone();
        Some(self.open_manga(manga))
    }

    pub fn open_chapter(&mut self, chapter: Chapter) -> ApiRequest {
        let chapter_id = chapter.id.clone();
        self.current_chapter = Some(chapter);
        self.in_flight += 1;
        ApiRequest::Pages { chapter_id }
    }

    pub fn open_selected_chapter(&mut self) -> Option<ApiRequest> {
        let chapter = self.chapters.get(self.chapter_cursor)?.clone();
        Some(self.open_chapter(chapter))
    }

    pub fn add_to_library(&self, manga: &Manga) -> ApiRequest {
        ApiRequest::AddToLibrary {
            user_id: self.config.user_id.clone(),
            manga: manga.clone(),
        }
    }

    pub fn add_selected_result_to_library(&self) -> Option<ApiRequest> {
        self.selected_result().map(|manga| self.add_to_library(manga))
    }

    pub fn add_selected_manga_to_library(&self) -> Option<ApiRequest> {
        self.selected_manga
            .as_ref()
            .map(|manga| self.add_to_library(manga))
    }

    pub fn load_library(&self) -> ApiRequest {
        ApiRequest::Library {
            user_id: self.config.user_id.clone(),
        }
    }

    pub fn load_bookmarks(&self) -> ApiRequest {
        ApiRequest::Bookmarks {
            user_id: self.config.user_id.clone(),
        }
    }

    /// Explicit navigation. Entering the library refreshes it.
    pub fn navigate(&mut self, mode: ViewMode) -> Vec<ApiRequest> {
        debug!(from = %self.mode, to = %mode, "navigate");
        self.mode = mode;
        match mode {
            ViewMode::Library => vec![self.load_library()],
            _ => Vec::new(),
        }
    }

    pub fn select_next(&mut self) {
        let (cursor, len) = match self.mode {
            ViewMode::Search => (&mut self.result_cursor, self.search_results.len()),
            ViewMode::Chapters => (&mut self.chapter_cursor, self.chapters.len()),
            ViewMode::Library => (&mut self.library_cursor, self.library.len()),
            ViewMode::Reader => return,
        };
        if len > 0 {
            *cursor = (*cursor + 1).min(len - 1);
        }
    }

    pub fn select_prev(&mut self) {
        let cursor = match self.mode {
            ViewMode::Search => &mut self.result_cursor,
            ViewMode::Chapters => &mut self.chapter_cursor,
            ViewMode::Library => &mut self.library_cursor,
            ViewMode::Reader => return,
        };
        *cursor = cursor.saturating_sub(1);
    }

    pub fn next_page(&mut self) -> Option<ApiRequest> {
        if self.page + 1 >= self.pages.len() {
            return None;
        }
        self.page += 1;
        self.progress_request()
    }

    pub fn prev_page(&mut self) -> Option<ApiRequest> {
        if self.page == 0 {
            return None;
        }
        self.page -= 1;
        self.progress_request()
    }

    /// Jumps to a zero-based page index. Out of range or current page is a no-op.
    pub fn goto_page(&mut self, index: usize) -> Option<ApiRequest> {
        if index >= self.pages.len() || index == self.page {
            return None;
        }
        self.page = index;
        self.progress_request()
    }

    pub fn on_reader_key(&mut self, key: NavKey) -> Option<ApiRequest> {
        if self.mode != ViewMode::Reader {
            return None;
        }
        match key {
            NavKey::Right | NavKey::Space => self.next_page(),
            NavKey::Left => self.prev_page(),
        }
    }

    fn progress_request(&self) -> Option<ApiRequest> {
        let manga = self.selected_manga.as_ref()?;
        let chapter = self.current_chapter.as_ref()?;
        Some(ApiRequest::UpdateProgress(ProgressUpdate {
            user_id: self.config.user_id.clone(),
            manga_id: manga.id.clone(),
            chapter_id: chapter.id.clone(),
            page_number: u32::try_from(self.page).unwrap_or(u32::MAX),
        }))
    }

    /// Re-opens the selected library entry: details and chapters are fetched,
    /// and the chapter cursor lands on the last-read chapter once they arrive.
    pub fn continue_reading(&mut self) -> Vec<ApiRequest> {
        let Some(entry) = self.selected_library_entry().cloned() else {
            return Vec::new();
        };
        self.resume_chapter = entry.last_read_chapter.clone();
        let details = ApiRequest::MangaDetails {
            manga_id: entry.manga_id.clone(),
        };
        self.in_flight += 1;
        let chapters = self.open_manga(Manga::from(&entry));
        vec![details, chapters]
    }

    pub fn add_bookmark(&self) -> Option<ApiRequest> {
        let manga = self.selected_manga.as_ref()?;
        let chapter = self.current_chapter.as_ref()?;
        if self.pages.is_empty() {
            return None;
        }
        let title = if chapter.title.trim().is_empty() {
            format!("Chapter {} p{}", chapter.number_label(), self.page + 1)
        } else {
            format!("{} p{}", chapter.title.trim(), self.page + 1)
        };
        Some(ApiRequest::AddBookmark {
            user_id: self.config.user_id.clone(),
            bookmark: Bookmark {
                id: String::new(),
                manga_id: manga.id.clone(),
                chapter_id: chapter.id.clone(),
                page_number: u32::try_from(self.page).unwrap_or(u32::MAX),
                title,
            },
        })
    }

    /// Same chapter: seek now. Other chapter: open it and seek once its pages arrive.
    pub fn jump_to_bookmark(&mut self, bookmark: &Bookmark) -> Vec<ApiRequest> {
        let page = usize::try_from(bookmark.page_number).unwrap_or(usize::MAX);
        let same_chapter = self
            .current_chapter
            .as_ref()
            .is_some_and(|c| c.id == bookmark.chapter_id);
        if same_chapter && !self.pages.is_empty() {
            return self.goto_page(page).into_iter().collect();
        }

        let chapter = self
            .chapters
            .iter()
            .find(|c| c.id == bookmark.chapter_id)
            .cloned()
            .unwrap_or_else(|| Chapter {
                id: bookmark.chapter_id.clone(),
                title: bookmark.title.clone(),
                chapter_number: 0.0,
                pages: 0,
                volume: None,
            });
        self.pending_seek = Some((bookmark.chapter_id.clone(), page));
        vec![self.open_chapter(chapter)]
    }

    fn finish_request(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Folds a finished request into the view state and returns any
    /// follow-up requests it causes.
    pub fn apply(&mut self, completion: Completion) -> Vec<ApiRequest> {
        match completion {
            Completion::Search { query, result } => {
                self.searching = false;
                self.finish_request();
                match result {
                    Ok(manga) => {
                        info!(%query, count = manga.len(), "search finished");
                        self.search_results = manga;
                    }
                    Err(err) => {
                        error!(%query, error = %err, "search failed");
                        self.search_results.clear();
                    }
                }
                self.result_cursor = 0;
                self.last_search = Some(query);
                Vec::new()
            }
            Completion::MangaDetails { manga_id, result } => {
                self.finish_request();
                match result {
                    Ok(manga) => {
                        if self.selected_manga.as_ref().is_some_and(|m| m.id == manga.id) {
                            self.selected_manga = Some(manga);
                        }
                    }
                    Err(err) => warn!(%manga_id, error = %err, "manga details failed"),
                }
                Vec::new()
            }
            Completion::Chapters { manga_id, result } => {
                self.finish_request();
                match result {
                    Ok(chapters) => {
                        debug!(%manga_id, count = chapters.len(), "chapters loaded");
                        let resume = self.resume_chapter.take();
                        self.chapter_cursor = resume
                            .and_then(|id| chapters.iter().position(|c| c.id == id))
                            .unwrap_or(0);
                        self.chapters = chapters;
                        self.mode = ViewMode::Chapters;
                    }
                    Err(err) => {
                        self.resume_chapter = None;
                        error!(%manga_id, error = %err, "chapters failed");
                    }
                }
                Vec::new()
            }
            Completion::Pages { chapter_id, result } => {
                self.finish_request();
                let seek = self.pending_seek.take_if(|(id, _)| *id == chapter_id);
                match result {
                    Ok(pages) => {
                        debug!(%chapter_id, count = pages.len(), "pages loaded");
                        self.pages = pages;
                        self.page = 0;
                        self.mode = ViewMode::Reader;
                        match seek {
                            Some((_, page)) => self.goto_page(page).into_iter().collect(),
                            None => Vec::new(),
                        }
                    }
                    Err(err) => {
                        error!(%chapter_id, error = %err, "pages failed");
                        Vec::new()
                    }
                }
            }
            Completion::AddToLibrary { manga_id, result } => {
                match result {
                    Ok(()) => info!(%manga_id, "added to library"),
                    Err(err) => error!(%manga_id, error = %err, "add to library failed"),
                }
                vec![self.load_library()]
            }
            Completion::Library { result } => {
                match result {
                    Ok(library) => {
                        debug!(count = library.len(), "library loaded");
                        self.library = library;
                        self.library_cursor = self
                            .library_cursor
                            .min(self.library.len().saturating_sub(1));
                    }
                    Err(err) => error!(error = %err, "library failed"),
                }
                Vec::new()
            }
            Completion::UpdateProgress { update, result } => {
                match result {
                    Ok(()) => debug!(
                        manga_id = %update.manga_id,
                        chapter_id = %update.chapter_id,
                        page = update.page_number,
                        "progress saved"
                    ),
                    Err(err) => warn!(
                        manga_id = %update.manga_id,
                        chapter_id = %update.chapter_id,
                        page = update.page_number,
                        error = %err,
                        "progress update failed"
                    ),
                }
                Vec::new()
            }
            Completion::AddBookmark { bookmark, result } => match result {
                Ok(()) => {
                    info!(title = %bookmark.title, "bookmark added");
                    vec![self.load_bookmarks()]
                }
                Err(err) => {
                    error!(title = %bookmark.title, error = %err, "add bookmark failed");
                    Vec::new()
                }
            },
            Completion::Bookmarks { result } => {
                match result {
                    Ok(bookmarks) => self.bookmarks = bookmarks,
                    Err(err) => error!(error = %err, "bookmarks failed"),
                }
                Vec::new()
            }
            // Page images are decoded by the UI; nothing to track here.
            Completion::PageImage { .. } => Vec::new(),
        }
    }
}
