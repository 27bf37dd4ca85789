//! Core domain types for Mangashelf.

use serde::Deserialize;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8001";
pub const DEFAULT_USER_ID: &str = "user123";
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    pub user_id: String,
    pub search_limit: u32,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            search_limit: DEFAULT_SEARCH_LIMIT,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    pub fn normalize(&mut self) {
        self.backend_url = self.backend_url.trim().trim_end_matches('/').to_string();
        if self.backend_url.is_empty() {
            self.backend_url = DEFAULT_BACKEND_URL.to_string();
        }
        self.user_id = self.user_id.trim().to_string();
        if self.user_id.is_empty() {
            self.user_id = DEFAULT_USER_ID.to_string();
        }
        self.search_limit = self.search_limit.clamp(1, 100);
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 300);
    }

    /// Root of every backend endpoint, e.g. `http://host:8001/api`.
    pub fn api_base(&self) -> String {
        format!("{}/api", self.backend_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Search,
    Chapters,
    Reader,
    Library,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Search,
        ViewMode::Chapters,
        ViewMode::Reader,
        ViewMode::Library,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Search => "search",
            ViewMode::Chapters => "chapters",
            ViewMode::Reader => "reader",
            ViewMode::Library => "library",
        }
    }
}

impl std::fmt::Display for ViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}


#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Manga {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_art: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl From<&LibraryEntry> for Manga {
    fn from(entry: &LibraryEntry) -> Self {
        Self {
            id: entry.manga_id.clone(),
            title: entry.title.clone(),
            author: String::new(),
            description: String::new(),
            cover_art: entry.cover_art.clone(),
            status: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Chapter {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub chapter_number: f64,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub volume: Option<String>,
}

impl Chapter {
    /// `12` for whole chapters, `12.5` for extras.
    pub fn number_label(&self) -> String {
        if self.chapter_number.fract() == 0.0 {
            format!("{}", self.chapter_number as i64)
        } else {
            format!("{}", self.chapter_number)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Page {
    pub image_url: String,
    #[serde(default)]
    pub page_number: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryEntry {
    pub id: String,
    pub manga_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub cover_art: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub last_read_chapter: Option<String>,
    #[serde(default)]
    pub last_read_page: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Bookmark {
    #[serde(default)]
    pub id: String,
    pub manga_id: String,
    pub chapter_id: String,
    pub page_number: u32,
    #[serde(default)]
    pub title: String,
}

/// Zero-based reader position within a chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Progress {
    pub fn percent(&self) -> f32 {
        if self.total_pages == 0 {
            0.0
        } else {
            ((self.current_page + 1).min(self.total_pages) as f32 / self.total_pages as f32)
                * 100.0
        }
    }
}
