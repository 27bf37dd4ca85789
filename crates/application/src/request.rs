use mangashelf_api::{ApiError, MangaApi, ProgressUpdate};
use mangashelf_core::{Bookmark, Chapter, LibraryEntry, Manga, Page};

/// A backend call the controller wants issued.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    Search { query: String, limit: u32 },
    MangaDetails { manga_id: String },
    Chapters { manga_id: String },
    Pages { chapter_id: String },
    AddToLibrary { user_id: String, manga: Manga },
    Library { user_id: String },
    UpdateProgress(ProgressUpdate),
    AddBookmark { user_id: String, bookmark: Bookmark },
    Bookmarks { user_id: String },
    PageImage { url: String },
}

impl ApiRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ApiRequest::Search { .. } => "search",
            ApiRequest::MangaDetails { .. } => "manga_details",
            ApiRequest::Chapters { .. } => "chapters",
            ApiRequest::Pages { .. } => "pages",
            ApiRequest::AddToLibrary { .. } => "add_to_library",
            ApiRequest::Library { .. } => "library",
            ApiRequest::UpdateProgress(_) => "update_progress",
            ApiRequest::AddBookmark { .. } => "add_bookmark",
            ApiRequest::Bookmarks { .. } => "bookmarks",
            ApiRequest::PageImage { .. } => "page_image",
        }
    }
}

/// The typed outcome of an [`ApiRequest`], carrying enough of the request to
/// log and route it.
#[derive(Debug)]
pub enum Completion {
    Search {
        query: String,
        result: Result<Vec<Manga>, ApiError>,
    },
    MangaDetails {
        manga_id: String,
        result: Result<Manga, ApiError>,
    },
    Chapters {
        manga_id: String,
        result: Result<Vec<Chapter>, ApiError>,
    },
    Pages {
        chapter_id: String,
        result: Result<Vec<Page>, ApiError>,
    },
    AddToLibrary {
        manga_id: String,
        result: Result<(), ApiError>,
    },
    Library {
        result: Result<Vec<LibraryEntry>, ApiError>,
    },
    UpdateProgress {
        update: ProgressUpdate,
        result: Result<(), ApiError>,
    },
    AddBookmark {
        bookmark: Bookmark,
        result: Result<(), ApiError>,
    },
    Bookmarks {
        result: Result<Vec<Bookmark>, ApiError>,
    },
    PageImage {
        url: String,
        result: Result<Vec<u8>, ApiError>,
    },
}

pub async fn execute(api: &dyn MangaApi, request: ApiRequest) -> Completion {
    match request {
        ApiRequest::Search { query, limit } => {
            let result = api.search_manga(&query, limit).await;
            Completion::Search { query, result }
        }
        ApiRequest::MangaDetails { manga_id } => {
            let result = api.manga_details(&manga_id).await;
            Completion::MangaDetails { manga_id, result }
        }
        ApiRequest::Chapters { manga_id } => {
            let result = api.manga_chapters(&manga_id).await;
            Completion::Chapters { manga_id, result }
        }
        ApiRequest::Pages { chapter_id } => {
            let result = api.chapter_pages(&chapter_id).await;
            Completion::Pages { chapter_id, result }
        }
        ApiRequest::AddToLibrary { user_id, manga } => {
            let result = api.add_to_library(&user_id, &manga).await;
            Completion::AddToLibrary {
                manga_id: manga.id,
                result,
            }
        }
        ApiRequest::Library { user_id } => Completion::Library {
            result: api.library(&user_id).await,
        },
        ApiRequest::UpdateProgress(update) => {
            let result = api.update_progress(&update).await;
            Completion::UpdateProgress { update, result }
        }
        ApiRequest::AddBookmark { user_id, bookmark } => {
            let result = api.add_bookmark(&user_id, &bookmark).await;
            Completion::AddBookmark { bookmark, result }
        }
        ApiRequest::Bookmarks { user_id } => Completion::Bookmarks {
            result: api.bookmarks(&user_id).await,
        },
        ApiRequest::PageImage { url } => {
            let result = api.fetch_image(&url).await;
            Completion::PageImage { url, result }
        }
    }
}
