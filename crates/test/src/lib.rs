//! Test helpers and fixtures.

use std::collections::VecDeque;

use mangashelf_api::MangaApi;
use mangashelf_application::{ApiRequest, ViewController, execute};
use mangashelf_core::{Chapter, ClientConfig, Manga, Page};

mod mock;

pub use mock::{Call, Endpoint, MockApi};

pub fn make_config(search_limit: u32) -> ClientConfig {
    ClientConfig {
        backend_url: "http://backend.test".to_string(),
        user_id: "user123".to_string(),
        search_limit,
        request_timeout_secs: 5,
    }
}

pub fn make_manga(id: &str, title: &str) -> Manga {
    Manga {
        id: id.to_string(),
        title: title.to_string(),
        author: "Masashi Kishimoto".to_string(),
        description: format!("{title} description"),
        cover_art: format!("https://uploads.test/covers/{id}.256.jpg"),
        status: Some("completed".to_string()),
        tags: vec!["Action".to_string()],
    }
}

pub fn make_chapters(manga_id: &str, count: usize) -> Vec<Chapter> {
    (1..=count)
        .map(|n| Chapter {
            id: format!("{manga_id}-c{n}"),
            title: format!("Chapter title {n}"),
            chapter_number: n as f64,
            pages: 3,
            volume: None,
        })
        .collect()
}

pub fn make_pages(chapter_id: &str, count: usize) -> Vec<Page> {
    (0..count)
        .map(|i| Page {
            image_url: format!("https://cdn.test/{chapter_id}/{i}.png"),
            page_number: Some(i as u32 + 1),
        })
        .collect()
}

/// Backend seeded with a small "naruto"/"one piece" catalog: two chapters
/// for `naruto`, three pages in its first chapter.
pub fn seeded_api() -> MockApi {
    MockApi::new()
        .with_catalog(vec![
            make_manga("naruto", "Naruto"),
            make_manga("boruto", "Boruto: Naruto Next Generations"),
            make_manga("one-piece", "One Piece"),
        ])
        .with_chapters("naruto", make_chapters("naruto", 2))
        .with_pages("naruto-c1", make_pages("naruto-c1", 3))
        .with_pages("naruto-c2", make_pages("naruto-c2", 5))
}

/// Executes requests one by one against `api`, applying each completion and
/// queueing the follow-ups it produces.
pub async fn drive(
    ctrl: &mut ViewController,
    api: &dyn MangaApi,
    requests: impl IntoIterator<Item = ApiRequest>,
) {
    let mut queue: VecDeque<ApiRequest> = requests.into_iter().collect();
    while let Some(request) = queue.pop_front() {
        let completion = execute(api, request).await;
        queue.extend(ctrl.apply(completion));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use mangashelf_api::ProgressUpdate;
    use mangashelf_application::{Completion, Dispatcher, NavKey};
    use mangashelf_core::ViewMode;

    use super::*;

    async fn reading_naruto(api: &MockApi) -> ViewController {
        let mut ctrl = ViewController::new(make_config(20));
        ctrl.set_query("naruto");
        let search = ctrl.search();
        drive(&mut ctrl, api, search).await;
        let open = ctrl.open_selected_result();
        drive(&mut ctrl, api, open).await;
        let open = ctrl.open_selected_chapter();
        drive(&mut ctrl, api, open).await;
        ctrl
    }

    #[test]
    fn builds_config() {
        let config = make_config(12);
        assert_eq!(config.search_limit, 12);
        assert_eq!(config.api_base(), "http://backend.test/api");
    }

    #[tokio::test]
    async fn whitespace_search_issues_no_request() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));
        ctrl.set_query("   ");
        let request = ctrl.search();
        assert!(request.is_none());
        drive(&mut ctrl, &api, request).await;
        assert!(api.calls().is_empty());
        assert!(ctrl.search_results().is_empty());
    }

    #[tokio::test]
    async fn search_returns_backend_array_in_order() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));
        ctrl.set_query("naruto");
        let request = ctrl.search();
        drive(&mut ctrl, &api, request).await;

        let expected = api
            .search_manga("naruto", 20)
            .await
            .expect("mock search");
        assert_eq!(ctrl.search_results(), expected.as_slice());
        let ids: Vec<&str> = ctrl.search_results().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["naruto", "boruto"]);
        assert_eq!(
            api.calls()[0],
            Call::Search {
                query: "naruto".to_string(),
                limit: 20
            }
        );
        assert!(!ctrl.is_loading());
        assert_eq!(ctrl.no_results_notice(), None);
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(1));
        ctrl.set_query("naruto");
        let request = ctrl.search();
        drive(&mut ctrl, &api, request).await;
        assert_eq!(ctrl.search_results().len(), 1);
    }

    #[tokio::test]
    async fn search_without_matches_shows_notice() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));
        ctrl.set_query("bleach");
        let request = ctrl.search();
        drive(&mut ctrl, &api, request).await;
        assert!(ctrl.search_results().is_empty());
        assert_eq!(ctrl.no_results_notice(), Some("bleach"));
    }

    #[tokio::test]
    async fn opening_manga_switches_to_chapters() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));
        let request = ctrl.open_manga(make_manga("naruto", "Naruto"));
        drive(&mut ctrl, &api, Some(request)).await;

        assert_eq!(ctrl.mode(), ViewMode::Chapters);
        assert_eq!(ctrl.chapters(), make_chapters("naruto", 2).as_slice());
        assert_eq!(ctrl.selected_manga().map(|m| m.id.as_str()), Some("naruto"));
    }

    #[tokio::test]
    async fn opening_chapter_resets_page_index() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        assert_eq!(ctrl.mode(), ViewMode::Reader);
        let _ = ctrl.next_page();
        let _ = ctrl.next_page();
        assert_eq!(ctrl.page_index(), 2);

        ctrl.navigate(ViewMode::Chapters);
        ctrl.select_next();
        let open = ctrl.open_selected_chapter();
        drive(&mut ctrl, &api, open).await;
        assert_eq!(ctrl.current_chapter().map(|c| c.id.as_str()), Some("naruto-c2"));
        assert_eq!(ctrl.page_index(), 0);
        assert_eq!(ctrl.pages().len(), 5);

        // Re-opening the same chapter also starts over.
        let _ = ctrl.next_page();
        let open = ctrl.open_selected_chapter();
        drive(&mut ctrl, &api, open).await;
        assert_eq!(ctrl.page_index(), 0);
    }

    #[tokio::test]
    async fn page_bounds_are_no_ops() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        api.clear_calls();

        assert_eq!(ctrl.prev_page(), None);
        assert_eq!(ctrl.page_index(), 0);

        for _ in 0..2 {
            let update = ctrl.next_page();
            drive(&mut ctrl, &api, update).await;
        }
        assert_eq!(ctrl.page_index(), 2);
        assert_eq!(ctrl.next_page(), None);
        assert_eq!(ctrl.page_index(), 2);
        assert_eq!(api.progress_updates().len(), 2);
    }

    #[tokio::test]
    async fn each_advance_sends_one_progress_update() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        api.clear_calls();

        let update = ctrl.on_reader_key(NavKey::Right);
        drive(&mut ctrl, &api, update).await;
        let update = ctrl.on_reader_key(NavKey::Space);
        drive(&mut ctrl, &api, update).await;
        let update = ctrl.on_reader_key(NavKey::Left);
        drive(&mut ctrl, &api, update).await;

        let pages: Vec<u32> = api
            .progress_updates()
            .iter()
            .map(|u| u.page_number)
            .collect();
        assert_eq!(pages, vec![1, 2, 1]);
        assert_eq!(
            api.progress_updates()[0],
            ProgressUpdate {
                user_id: "user123".to_string(),
                manga_id: "naruto".to_string(),
                chapter_id: "naruto-c1".to_string(),
                page_number: 1,
            }
        );
    }

    #[tokio::test]
    async fn progress_failure_never_blocks_navigation() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        api.fail(Endpoint::UpdateProgress);

        let update = ctrl.next_page();
        drive(&mut ctrl, &api, update).await;
        let update = ctrl.next_page();
        drive(&mut ctrl, &api, update).await;
        assert_eq!(ctrl.page_index(), 2);
        assert_eq!(ctrl.mode(), ViewMode::Reader);
    }

    #[tokio::test]
    async fn add_to_library_then_reload_shows_entry() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));
        let startup = ctrl.startup();
        drive(&mut ctrl, &api, startup).await;
        assert!(ctrl.library().is_empty());

        let add = ctrl.add_to_library(&make_manga("naruto", "Naruto"));
        drive(&mut ctrl, &api, Some(add)).await;

        assert_eq!(ctrl.library().len(), 1);
        assert_eq!(ctrl.library()[0].manga_id, "naruto");
        assert_eq!(ctrl.library()[0].status, "reading");
        let calls = api.calls();
        assert!(matches!(calls[calls.len() - 2], Call::AddToLibrary { .. }));
        assert_eq!(calls[calls.len() - 1], Call::Library("user123".to_string()));

        // A second add leaves the backend's single entry in place.
        let add = ctrl.add_to_library(&make_manga("naruto", "Naruto"));
        drive(&mut ctrl, &api, Some(add)).await;
        assert_eq!(ctrl.library().len(), 1);
    }

    #[tokio::test]
    async fn failed_add_still_reloads_library() {
        let api = seeded_api();
        api.fail(Endpoint::AddToLibrary);
        let mut ctrl = ViewController::new(make_config(20));
        let add = ctrl.add_to_library(&make_manga("naruto", "Naruto"));
        drive(&mut ctrl, &api, Some(add)).await;

        assert_eq!(api.calls().last(), Some(&Call::Library("user123".to_string())));
        assert!(ctrl.library().is_empty());
    }

    #[tokio::test]
    async fn library_reflects_reading_progress() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        let add = ctrl.add_selected_manga_to_library();
        drive(&mut ctrl, &api, add).await;
        let update = ctrl.next_page();
        drive(&mut ctrl, &api, update).await;

        let requests = ctrl.navigate(ViewMode::Library);
        drive(&mut ctrl, &api, requests).await;
        let entry = ctrl.selected_library_entry().expect("library entry");
        assert_eq!(entry.last_read_chapter.as_deref(), Some("naruto-c1"));
        assert_eq!(entry.last_read_page, 1);
    }

    #[tokio::test]
    async fn forced_failures_leave_state_usable() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));

        ctrl.set_query("naruto");
        let request = ctrl.search();
        drive(&mut ctrl, &api, request).await;
        assert_eq!(ctrl.search_results().len(), 2);

        for endpoint in [
            Endpoint::Search,
            Endpoint::Chapters,
            Endpoint::Pages,
            Endpoint::Library,
        ] {
            api.fail(endpoint);
        }

        let request = ctrl.search();
        drive(&mut ctrl, &api, request).await;
        assert!(ctrl.search_results().is_empty());

        let request = ctrl.open_manga(make_manga("naruto", "Naruto"));
        drive(&mut ctrl, &api, Some(request)).await;
        assert_eq!(ctrl.mode(), ViewMode::Search);
        assert!(ctrl.chapters().is_empty());

        let request = ctrl.open_chapter(make_chapters("naruto", 1).remove(0));
        drive(&mut ctrl, &api, Some(request)).await;
        assert_eq!(ctrl.mode(), ViewMode::Search);
        assert!(ctrl.pages().is_empty());

        let requests = ctrl.navigate(ViewMode::Library);
        drive(&mut ctrl, &api, requests).await;
        assert!(ctrl.library().is_empty());
        assert!(!ctrl.is_loading());

        api.recover(Endpoint::Search);
        let request = ctrl.search();
        drive(&mut ctrl, &api, request).await;
        assert_eq!(ctrl.search_results().len(), 2);
    }

    #[tokio::test]
    async fn failed_library_reload_keeps_snapshot() {
        let api = seeded_api();
        let mut ctrl = ViewController::new(make_config(20));
        let add = ctrl.add_to_library(&make_manga("one-piece", "One Piece"));
        drive(&mut ctrl, &api, Some(add)).await;
        assert_eq!(ctrl.library().len(), 1);

        api.fail(Endpoint::Library);
        let reload = ctrl.load_library();
        drive(&mut ctrl, &api, Some(reload)).await;
        assert_eq!(ctrl.library().len(), 1);
    }

    #[tokio::test]
    async fn continue_reading_opens_last_chapter() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        let add = ctrl.add_selected_manga_to_library();
        drive(&mut ctrl, &api, add).await;

        ctrl.navigate(ViewMode::Chapters);
        ctrl.select_next();
        let open = ctrl.open_selected_chapter();
        drive(&mut ctrl, &api, open).await;
        let update = ctrl.next_page();
        drive(&mut ctrl, &api, update).await;

        let requests = ctrl.navigate(ViewMode::Library);
        drive(&mut ctrl, &api, requests).await;
        let requests = ctrl.continue_reading();
        drive(&mut ctrl, &api, requests).await;

        assert_eq!(ctrl.mode(), ViewMode::Chapters);
        assert_eq!(ctrl.selected_chapter_index(), 1);
        assert_eq!(
            ctrl.selected_manga().map(|m| m.author.as_str()),
            Some("Masashi Kishimoto")
        );
    }

    #[tokio::test]
    async fn bookmarks_round_trip_through_backend() {
        let api = seeded_api();
        let mut ctrl = reading_naruto(&api).await;
        let _ = ctrl.next_page();
        let add = ctrl.add_bookmark();
        drive(&mut ctrl, &api, add).await;

        let bookmarks = ctrl.current_bookmarks();
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].page_number, 1);
        assert_eq!(bookmarks[0].chapter_id, "naruto-c1");

        let bookmark = bookmarks[0].clone();
        let _ = ctrl.next_page();
        let requests = ctrl.jump_to_bookmark(&bookmark);
        drive(&mut ctrl, &api, requests).await;
        assert_eq!(ctrl.page_index(), 1);
    }

    #[tokio::test]
    async fn page_images_come_back_as_completions() {
        let api = seeded_api().with_image("https://cdn.test/naruto-c1/0.png", vec![1, 2, 3]);
        let completion = execute(
            &api,
            ApiRequest::PageImage {
                url: "https://cdn.test/naruto-c1/0.png".to_string(),
            },
        )
        .await;
        let Completion::PageImage { url, result } = completion else {
            panic!("expected page image completion");
        };
        assert_eq!(url, "https://cdn.test/naruto-c1/0.png");
        assert_eq!(result.expect("image bytes"), vec![1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dispatcher_delivers_completions() {
        let api: Arc<dyn MangaApi> = Arc::new(seeded_api());
        let mut dispatcher = Dispatcher::new(api, tokio::runtime::Handle::current());
        let mut ctrl = ViewController::new(make_config(20));
        ctrl.set_query("one piece");
        dispatcher.dispatch_all(ctrl.search());

        let completion = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(completion) = dispatcher.try_next() {
                    return completion;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("completion within timeout");

        let followups = ctrl.apply(completion);
        assert!(followups.is_empty());
        assert_eq!(ctrl.search_results().len(), 1);
        assert_eq!(ctrl.search_results()[0].id, "one-piece");
    }
}
