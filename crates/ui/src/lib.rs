//! ratatui-based UI.
//!
//! The UI thread owns the [`ViewController`]. Key presses become controller
//! intents, the requests they return go to the [`Dispatcher`], and finished
//! requests are drained once per tick and folded back in.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Display;
use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use image::DynamicImage;
use mangashelf_application::{ApiRequest, Completion, Dispatcher, NavKey, ViewController};
use mangashelf_core::{Bookmark, Chapter, LibraryEntry, Manga, ViewMode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, Gauge, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap,
};
use ratatui_image::picker::Picker;
use ratatui_image::protocol::Protocol as ImageProtocol;
use ratatui_image::{Image as ImageWidget, Resize};
use tracing::{debug, info, warn};
use unicode_width::UnicodeWidthStr;

mod image_protocol;

const ACCENT: Color = Color::Yellow;
const MAX_CACHED_PAGES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UiExit {
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SearchFocus {
    #[default]
    Query,
    Results,
}

pub struct Ui {
    ctrl: ViewController,
    dispatcher: Dispatcher,
    focus: SearchFocus,
    goto_panel: GotoPanel,
    bookmarks_panel: BookmarksPanel,
    help_open: bool,
    reader: ReaderPanel,
    image_picker: Picker,
}

impl Ui {
    pub fn new(ctrl: ViewController, dispatcher: Dispatcher) -> Self {
        Self {
            ctrl,
            dispatcher,
            focus: SearchFocus::default(),
            goto_panel: GotoPanel::default(),
            bookmarks_panel: BookmarksPanel::default(),
            help_open: false,
            reader: ReaderPanel::default(),
            image_picker: Picker::halfblocks(),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut terminal = setup_terminal()?;
        image_protocol::ensure_tmux_allow_passthrough();
        let hint = image_protocol::TerminalHint::from_env();
        self.image_picker = image_protocol::build_picker(hint);
        info!(
            ?hint,
            protocol = image_protocol::protocol_label(&self.image_picker),
            "terminal graphics"
        );
        terminal.clear().ok();

        let startup = self.ctrl.startup();
        self.issue(startup);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(())), Ok(())) => Ok(()),
            (Ok(Err(err)), _) => Err(err),
            (Ok(Ok(())), Err(err)) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<()> {
        let tick_rate = Duration::from_millis(100);
        let mut needs_redraw = true;

        loop {
            if self.drain_completions() {
                needs_redraw = true;
            }
            self.request_visible_pages();

            if needs_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
            }

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => {
                    self.reader.invalidate_render();
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;
                    if let Some(UiExit::Quit) = self.handle_key(key)? {
                        info!("quit requested");
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    fn issue(&self, requests: impl IntoIterator<Item = ApiRequest>) {
        self.dispatcher.dispatch_all(requests);
    }

    /// Applies every finished request. Returns whether anything arrived.
    fn drain_completions(&mut self) -> bool {
        let mut changed = false;
        while let Some(completion) = self.dispatcher.try_next() {
            changed = true;
            match completion {
                Completion::PageImage { url, result } => self.reader.accept_image(url, result),
                other => {
                    let follow_ups = self.ctrl.apply(other);
                    self.issue(follow_ups);
                }
            }
        }
        changed
    }

    /// Fetches the current page and the next one while the reader is shown.
    fn request_visible_pages(&mut self) {
        if self.ctrl.mode() != ViewMode::Reader {
            return;
        }
        let wanted: Vec<String> = self
            .ctrl
            .pages()
            .iter()
            .skip(self.ctrl.page_index())
            .take(2)
            .map(|page| page.image_url.clone())
            .collect();
        for url in wanted {
            if let Some(request) = self.reader.request_for(&url) {
                self.dispatcher.dispatch(request);
            }
        }
    }

    fn close_overlays(&mut self) {
        self.goto_panel.close();
        self.bookmarks_panel.open = false;
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Ok(Some(UiExit::Quit));
        }
        if self.help_open {
            self.help_open = false;
            return Ok(None);
        }

        match key.code {
            KeyCode::F(1) => {
                self.close_overlays();
                self.focus = SearchFocus::Query;
                let requests = self.ctrl.navigate(ViewMode::Search);
                self.issue(requests);
                return Ok(None);
            }
            KeyCode::F(2) => {
                self.close_overlays();
                let requests = self.ctrl.navigate(ViewMode::Library);
                self.issue(requests);
                return Ok(None);
            }
            _ => {}
        }

        if self.goto_panel.open {
            return self.handle_goto_panel_key(key);
        }
        if self.bookmarks_panel.open {
            return self.handle_bookmarks_panel_key(key);
        }

        match self.ctrl.mode() {
            ViewMode::Search => match self.focus {
                SearchFocus::Query => self.handle_query_key(key),
                SearchFocus::Results => self.handle_results_key(key),
            },
            ViewMode::Chapters => self.handle_chapters_key(key),
            ViewMode::Reader => self.handle_reader_key(key),
            ViewMode::Library => self.handle_library_key(key),
        }
    }

    fn handle_query_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Esc => return Ok(Some(UiExit::Quit)),
            KeyCode::Enter => {
                if let Some(request) = self.ctrl.search() {
                    self.issue([request]);
                }
            }
            KeyCode::Tab | KeyCode::Down => {
                if !self.ctrl.search_results().is_empty() {
                    self.focus = SearchFocus::Results;
                }
            }
            KeyCode::Backspace => self.ctrl.pop_query_char(),
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.ctrl.clear_query();
            }
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.ctrl.push_query_char(ch);
            }
            _ => {}
        }
        Ok(None)
    }

    fn handle_results_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Esc | KeyCode::Tab => self.focus = SearchFocus::Query,
            KeyCode::Up => self.ctrl.select_prev(),
            KeyCode::Down => self.ctrl.select_next(),
            KeyCode::Enter => {
                if let Some(request) = self.ctrl.open_selected_result() {
                    self.issue([request]);
                }
            }
            KeyCode::Char('a') => {
                if let Some(request) = self.ctrl.add_selected_result_to_library() {
                    self.issue([request]);
                }
            }
            KeyCode::Char('l') => {
                let requests = self.ctrl.navigate(ViewMode::Library);
                self.issue(requests);
            }
            KeyCode::Char('?') => self.help_open = true,
            _ => {}
        }
        Ok(None)
    }

    fn handle_chapters_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Esc | KeyCode::Backspace => {
                let requests = self.ctrl.navigate(ViewMode::Search);
                self.issue(requests);
            }
            KeyCode::Up => self.ctrl.select_prev(),
            KeyCode::Down => self.ctrl.select_next(),
            KeyCode::Enter => {
                if let Some(request) = self.ctrl.open_selected_chapter() {
                    self.reader.notice = None;
                    self.issue([request]);
                }
            }
            KeyCode::Char('a') => {
                if let Some(request) = self.ctrl.add_selected_manga_to_library() {
                    self.issue([request]);
                }
            }
            KeyCode::Char('l') => {
                let requests = self.ctrl.navigate(ViewMode::Library);
                self.issue(requests);
            }
            KeyCode::Char('?') => self.help_open = true,
            _ => {}
        }
        Ok(None)
    }

    fn handle_reader_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        self.reader.notice = None;
        let nav = match key.code {
            KeyCode::Right => Some(NavKey::Right),
            KeyCode::Left => Some(NavKey::Left),
            KeyCode::Char(' ') => Some(NavKey::Space),
            _ => None,
        };
        if let Some(nav) = nav {
            if let Some(request) = self.ctrl.on_reader_key(nav) {
                self.issue([request]);
            }
            return Ok(None);
        }

        match key.code {
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Esc => {
                let requests = self.ctrl.navigate(ViewMode::Chapters);
                self.issue(requests);
            }
            KeyCode::Char('g') => {
                if !self.ctrl.pages().is_empty() {
                    self.goto_panel.open = true;
                }
            }
            KeyCode::Char('b') => {
                self.bookmarks_panel.open = true;
                self.bookmarks_panel.selected = 0;
                let request = self.ctrl.load_bookmarks();
                self.issue([request]);
            }
            KeyCode::Char('?') => self.help_open = true,
            _ => {}
        }
        Ok(None)
    }

    fn handle_library_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Esc => {
                self.focus = SearchFocus::Query;
                let requests = self.ctrl.navigate(ViewMode::Search);
                self.issue(requests);
            }
            KeyCode::Up => self.ctrl.select_prev(),
            KeyCode::Down => self.ctrl.select_next(),
            KeyCode::Enter => {
                let requests = self.ctrl.continue_reading();
                self.issue(requests);
            }
            KeyCode::Char('r') => {
                let request = self.ctrl.load_library();
                self.issue([request]);
            }
            KeyCode::Char('?') => self.help_open = true,
            _ => {}
        }
        Ok(None)
    }

    fn handle_goto_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Esc => self.goto_panel.close(),
            KeyCode::Enter => {
                let total = self.ctrl.pages().len();
                match parse_page_input(&self.goto_panel.input, total) {
                    Ok(index) => {
                        if let Some(request) = self.ctrl.goto_page(index) {
                            self.issue([request]);
                        }
                        self.reader.notice = Some(format!("jumped to page {}", index + 1));
                        self.goto_panel.close();
                    }
                    Err(message) => self.goto_panel.error = Some(message),
                }
            }
            KeyCode::Backspace => {
                self.goto_panel.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.goto_panel.input.clear();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() => self.goto_panel.input.push(ch),
            _ => {}
        }
        Ok(None)
    }

    fn handle_bookmarks_panel_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let count = self.ctrl.current_bookmarks().len();
        match key.code {
            KeyCode::Esc | KeyCode::Char('b') => self.bookmarks_panel.open = false,
            KeyCode::Up => {
                self.bookmarks_panel.selected = self.bookmarks_panel.selected.saturating_sub(1);
            }
            KeyCode::Down => {
                if count > 0 {
                    self.bookmarks_panel.selected =
                        (self.bookmarks_panel.selected + 1).min(count - 1);
                }
            }
            KeyCode::Enter => {
                let selected = self
                    .ctrl
                    .current_bookmarks()
                    .get(self.bookmarks_panel.selected)
                    .map(|b| (*b).clone());
                if let Some(bookmark) = selected {
                    let requests = self.ctrl.jump_to_bookmark(&bookmark);
                    self.issue(requests);
                    self.reader.notice = Some(format!("jumped to {}", bookmark_label(&bookmark)));
                    self.bookmarks_panel.open = false;
                }
            }
            KeyCode::Char('a') => {
                if let Some(request) = self.ctrl.add_bookmark() {
                    self.issue([request]);
                    self.reader.notice = Some(format!(
                        "bookmarked page {}",
                        self.ctrl.page_index() + 1
                    ));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        self.draw_nav(layout[0], frame);
        match self.ctrl.mode() {
            ViewMode::Search => self.draw_search(layout[1], frame),
            ViewMode::Chapters => self.draw_chapters(layout[1], frame),
            ViewMode::Reader => self.draw_reader(layout[1], frame),
            ViewMode::Library => self.draw_library(layout[1], frame),
        }
        self.draw_footer(layout[2], frame);

        if self.goto_panel.open {
            self.draw_goto_panel(area, frame);
        }
        if self.bookmarks_panel.open {
            self.draw_bookmarks_panel(area, frame);
        }
        if self.help_open {
            draw_help(area, frame);
        }
    }

    fn draw_nav(&self, area: Rect, frame: &mut ratatui::Frame) {
        let mut spans = vec![Span::styled(
            "Mangashelf ",
            Style::default().add_modifier(Modifier::BOLD),
        )];
        for mode in ViewMode::ALL {
            let style = if mode == self.ctrl.mode() {
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            spans.push(Span::raw(" "));
            spans.push(Span::styled(format!(" {} ", mode_title(mode)), style));
        }
        if self.ctrl.is_loading() {
            spans.push(Span::styled(
                "  loading...",
                Style::default().fg(ACCENT).add_modifier(Modifier::ITALIC),
            ));
        }

        let nav =
            Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(nav, area);
    }

    fn draw_footer(&self, area: Rect, frame: &mut ratatui::Frame) {
        let mut spans = Vec::new();
        for (key, label) in footer_hints(self.ctrl.mode(), self.focus) {
            spans.push(Span::styled(*key, Style::default().add_modifier(Modifier::BOLD)));
            spans.push(Span::raw(format!(" {label}  ")));
        }
        let footer = Paragraph::new(Line::from(spans)).style(Style::default().fg(Color::Gray));
        frame.render_widget(footer, area);
    }

    fn draw_search(&self, area: Rect, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(area);

        let query_focused = self.focus == SearchFocus::Query;
        let border_style = if query_focused {
            Style::default().fg(ACCENT)
        } else {
            Style::default()
        };
        let cursor = if query_focused { "_" } else { "" };
        let input = Paragraph::new(Line::from(vec![
            Span::raw(self.ctrl.query().to_string()),
            Span::styled(cursor, Style::default().fg(ACCENT)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title("Search manga"),
        );
        frame.render_widget(input, layout[0]);

        let status = if self.ctrl.is_searching() {
            Line::from(Span::styled("searching...", Style::default().fg(ACCENT)))
        } else if let Some(query) = self.ctrl.no_results_notice() {
            Line::from(Span::styled(
                format!("No results found for \"{query}\""),
                Style::default().fg(Color::Red),
            ))
        } else if !self.ctrl.search_results().is_empty() {
            Line::raw(format!("{} results", self.ctrl.search_results().len()))
        } else {
            Line::raw("Type a title and press Enter")
        };
        frame.render_widget(Paragraph::new(status), layout[1]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(layout[2]);

        let results = self.ctrl.search_results();
        let title_width = body[0].width.saturating_sub(4) as usize;
        let items: Vec<ListItem> = results
            .iter()
            .map(|manga| {
                let mut lines: Vec<Line> = wrap_text(&manga.title, title_width)
                    .into_iter()
                    .map(|line| Line::styled(line, Style::default().add_modifier(Modifier::BOLD)))
                    .collect();
                if !manga.author.trim().is_empty() {
                    lines.push(Line::styled(
                        format!("by {}", manga.author.trim()),
                        Style::default().fg(Color::Gray),
                    ));
                }
                ListItem::new(lines)
            })
            .collect();

        let highlight_style = if query_focused {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
                .fg(Color::Black)
                .bg(ACCENT)
                .add_modifier(Modifier::BOLD)
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Results"))
            .highlight_style(highlight_style)
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !results.is_empty() {
            state.select(Some(self.ctrl.selected_result_index().min(results.len() - 1)));
        }
        frame.render_stateful_widget(list, body[0], &mut state);

        let block = Block::default().borders(Borders::ALL).title("Details");
        let details = match self.ctrl.selected_result() {
            Some(manga) => manga_details(manga),
            None => Text::raw(""),
        };
        frame.render_widget(
            Paragraph::new(details).block(block).wrap(Wrap { trim: true }),
            body[1],
        );
    }

    fn draw_chapters(&self, area: Rect, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let (title, author) = match self.ctrl.selected_manga() {
            Some(manga) => (manga.title.clone(), manga.author.trim().to_string()),
            None => ("(no manga selected)".to_string(), String::new()),
        };
        let mut header = vec![Line::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        )];
        if !author.is_empty() {
            header.push(Line::styled(format!("by {author}"), Style::default().fg(Color::Gray)));
        }
        frame.render_widget(
            Paragraph::new(Text::from(header)).block(Block::default().borders(Borders::BOTTOM)),
            layout[0],
        );

        let chapters = self.ctrl.chapters();
        if chapters.is_empty() {
            let message = if self.ctrl.is_loading() {
                "loading chapters..."
            } else {
                "(no chapters)"
            };
            frame.render_widget(
                Paragraph::new(message).alignment(Alignment::Center),
                layout[1],
            );
            return;
        }

        let items: Vec<ListItem> = chapters
            .iter()
            .map(|chapter| ListItem::new(Line::raw(chapter_label(chapter))))
            .collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::NONE))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        state.select(Some(self.ctrl.selected_chapter_index().min(chapters.len() - 1)));
        frame.render_stateful_widget(list, layout[1], &mut state);
    }

    fn draw_reader(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(2),
            ])
            .split(area);

        let manga_title = self
            .ctrl
            .selected_manga()
            .map(|m| m.title.clone())
            .unwrap_or_default();
        let chapter_title = self
            .ctrl
            .current_chapter()
            .map(|c| format!("Chapter {}  {}", c.number_label(), c.title.trim()))
            .unwrap_or_default();
        let position = match self.ctrl.progress() {
            Some(p) => format!("{} / {}", p.current_page + 1, p.total_pages),
            None => "- / -".to_string(),
        };
        let mut spans = vec![
            Span::styled(manga_title, Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::raw(chapter_title),
            Span::raw("  "),
            Span::styled(position, Style::default().fg(ACCENT)),
        ];
        if let Some(notice) = &self.reader.notice {
            spans.push(Span::styled(
                format!("  {notice}"),
                Style::default().fg(Color::Green),
            ));
        }
        frame.render_widget(
            Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM)),
            layout[0],
        );

        let block = Block::default().borders(Borders::ALL);
        frame.render_widget(block.clone(), layout[1]);
        let inner = block.inner(layout[1]);

        let page = self
            .ctrl
            .current_page()
            .map(|p| (p.image_url.clone(), self.ctrl.page_index() + 1));
        match page {
            None => {
                let message = if self.ctrl.is_loading() {
                    "loading pages..."
                } else {
                    "(no pages)"
                };
                frame.render_widget(Paragraph::new(message).alignment(Alignment::Center), inner);
            }
            Some((url, number)) => {
                self.reader.ensure_rendered(&self.image_picker, &url, inner);
                if let Some(protocol) = self.reader.protocol_for(&url, inner) {
                    let proto_area = protocol.area();
                    let draw_width = proto_area.width.min(inner.width);
                    let draw_height = proto_area.height.min(inner.height);
                    let draw_area = Rect::new(
                        inner.x + inner.width.saturating_sub(draw_width) / 2,
                        inner.y + inner.height.saturating_sub(draw_height) / 2,
                        draw_width,
                        draw_height,
                    );
                    frame.render_widget(ImageWidget::new(protocol), draw_area);
                } else {
                    let text = match self.reader.failure(&url) {
                        Some(err) => Text::from(vec![
                            Line::styled(
                                format!("Page {number} could not be displayed"),
                                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                            ),
                            Line::raw(err.to_string()),
                        ]),
                        None => Text::raw(format!("loading page {number}...")),
                    };
                    frame.render_widget(
                        Paragraph::new(text)
                            .alignment(Alignment::Center)
                            .wrap(Wrap { trim: true }),
                        inner,
                    );
                }
            }
        }

        let (percent, label) = match self.ctrl.progress() {
            Some(p) => (
                p.percent().round().clamp(0.0, 100.0) as u16,
                format!("{:.0}%", p.percent()),
            ),
            None => (0, "0%".to_string()),
        };
        let gauge = Gauge::default()
            .block(Block::default().borders(Borders::TOP))
            .gauge_style(Style::default().fg(ACCENT).bg(Color::DarkGray))
            .percent(percent)
            .label(label);
        frame.render_widget(gauge, layout[2]);
    }

    fn draw_library(&self, area: Rect, frame: &mut ratatui::Frame) {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);

        let library = self.ctrl.library();
        if library.is_empty() {
            let message = if self.ctrl.is_loading() {
                "loading library..."
            } else {
                "Your library is empty. Add manga from search with `a`."
            };
            frame.render_widget(
                Paragraph::new(message)
                    .block(Block::default().borders(Borders::ALL).title("Library"))
                    .wrap(Wrap { trim: true }),
                body[0],
            );
            return;
        }

        let items: Vec<ListItem> = library
            .iter()
            .map(|entry| {
                ListItem::new(vec![
                    Line::styled(
                        entry.title.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Line::styled(library_status_line(entry), Style::default().fg(Color::Gray)),
                ])
            })
            .collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Library"))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        state.select(Some(self.ctrl.selected_library_index().min(library.len() - 1)));
        frame.render_stateful_widget(list, body[0], &mut state);

        let details = match self.ctrl.selected_library_entry() {
            Some(entry) => library_details(entry),
            None => Text::raw(""),
        };
        frame.render_widget(
            Paragraph::new(details)
                .block(Block::default().borders(Borders::ALL).title("Details"))
                .wrap(Wrap { trim: true }),
            body[1],
        );
    }

    fn draw_goto_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(48, 28, area);
        frame.render_widget(Clear, popup_area);

        let total = self.ctrl.pages().len();
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            format!("Go to page (1..={total})"),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);

        let mut lines = vec![
            Line::from(vec![
                Span::styled("Page: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(self.goto_panel.input.clone()),
            ]),
            Line::raw(""),
            Line::raw("Enter jumps, Esc cancels, Ctrl+u clears."),
        ];
        if let Some(err) = &self.goto_panel.error {
            lines.push(Line::raw(""));
            lines.push(Line::styled(
                err.clone(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ));
        }
        frame.render_widget(
            Paragraph::new(Text::from(lines)).wrap(Wrap { trim: true }),
            block.inner(popup_area),
        );
    }

    fn draw_bookmarks_panel(&self, area: Rect, frame: &mut ratatui::Frame) {
        let popup_area = centered_rect(70, 55, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            "Bookmarks",
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(block.inner(popup_area));

        let bookmarks = self.ctrl.current_bookmarks();
        let items = if bookmarks.is_empty() {
            vec![ListItem::new(Line::raw("(none)"))]
        } else {
            bookmarks
                .iter()
                .map(|b| ListItem::new(Line::raw(bookmark_label(b))))
                .collect()
        };
        let list = List::new(items)
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(ACCENT)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        if !bookmarks.is_empty() {
            state.select(Some(self.bookmarks_panel.selected.min(bookmarks.len() - 1)));
        }
        frame.render_stateful_widget(list, sections[0], &mut state);

        let footer = Paragraph::new(Line::from(vec![
            Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" close  "),
            Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" jump  "),
            Span::styled("a", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" add current page"),
        ]));
        frame.render_widget(footer, sections[1]);
    }
}

fn draw_help(area: Rect, frame: &mut ratatui::Frame) {
    let popup_area = centered_rect(70, 70, area);
    frame.render_widget(Clear, popup_area);

    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::styled("Anywhere", bold),
        Line::raw("  Ctrl+c quit, F1 search, F2 library"),
    ];
    for (mode, focus) in [
        (ViewMode::Search, SearchFocus::Query),
        (ViewMode::Search, SearchFocus::Results),
        (ViewMode::Chapters, SearchFocus::Query),
        (ViewMode::Reader, SearchFocus::Query),
        (ViewMode::Library, SearchFocus::Query),
    ] {
        let heading = match (mode, focus) {
            (ViewMode::Search, SearchFocus::Query) => "Search (query)".to_string(),
            (ViewMode::Search, SearchFocus::Results) => "Search (results)".to_string(),
            _ => mode_title(mode).to_string(),
        };
        let keys = footer_hints(mode, focus)
            .iter()
            .map(|(key, label)| format!("{key} {label}"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(Line::raw(""));
        lines.push(Line::styled(heading, bold));
        lines.push(Line::raw(format!("  {keys}")));
    }
    lines.push(Line::raw(""));
    lines.push(Line::styled("Any key closes this help.", Style::default().fg(Color::Gray)));

    let block = Block::default()
        .borders(Borders::ALL)
        .title(Span::styled("Keys", bold));
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .block(block)
            .wrap(Wrap { trim: false }),
        popup_area,
    );
}

#[derive(Debug, Clone, Default)]
struct GotoPanel {
    open: bool,
    input: String,
    error: Option<String>,
}

impl GotoPanel {
    fn close(&mut self) {
        self.open = false;
        self.input.clear();
        self.error = None;
    }
}

#[derive(Debug, Clone, Default)]
struct BookmarksPanel {
    open: bool,
    selected: usize,
}

#[derive(Debug, Clone)]
struct CachedPageImage {
    url: String,
    image: Arc<DynamicImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ReaderRenderKey {
    url: String,
    width: u16,
    height: u16,
}

/// Page image state for the reader: decoded pages, in-flight fetches and the
/// protocol currently on screen.
#[derive(Default)]
struct ReaderPanel {
    page_image_cache: VecDeque<CachedPageImage>,
    requested: HashSet<String>,
    failed: HashMap<String, String>,
    current_image: Option<(ReaderRenderKey, ImageProtocol)>,
    notice: Option<String>,
}

impl ReaderPanel {
    /// The fetch to issue for `url`, unless it is cached, pending or known bad.
    fn request_for(&mut self, url: &str) -> Option<ApiRequest> {
        if url.trim().is_empty()
            || self.cached(url).is_some()
            || self.requested.contains(url)
            || self.failed.contains_key(url)
        {
            return None;
        }
        self.requested.insert(url.to_string());
        Some(ApiRequest::PageImage {
            url: url.to_string(),
        })
    }

    fn accept_image<E: Display>(&mut self, url: String, result: Result<Vec<u8>, E>) {
        self.requested.remove(&url);
        let decoded = result.map_err(|err| err.to_string()).and_then(|bytes| {
            image::load_from_memory(&bytes).map_err(|err| format!("decode failed: {err}"))
        });
        match decoded {
            Ok(image) => {
                debug!(%url, width = image.width(), height = image.height(), "page image ready");
                self.cache_page_image(CachedPageImage {
                    url,
                    image: Arc::new(image),
                });
            }
            Err(err) => {
                warn!(%url, error = %err, "page image unavailable");
                self.failed.insert(url, err);
            }
        }
    }

    fn cache_page_image(&mut self, image: CachedPageImage) {
        if let Some(pos) = self.page_image_cache.iter().position(|c| c.url == image.url) {
            let _ = self.page_image_cache.remove(pos);
        }
        self.page_image_cache.push_front(image);
        while self.page_image_cache.len() > MAX_CACHED_PAGES {
            self.page_image_cache.pop_back();
        }
    }

    fn cached(&self, url: &str) -> Option<Arc<DynamicImage>> {
        self.page_image_cache
            .iter()
            .find(|c| c.url == url)
            .map(|c| Arc::clone(&c.image))
    }

    fn failure(&self, url: &str) -> Option<&str> {
        self.failed.get(url).map(String::as_str)
    }

    fn invalidate_render(&mut self) {
        self.current_image = None;
    }

    /// Builds the terminal protocol for `url` at `area` if the decoded page is
    /// available and the one on screen does not already match.
    fn ensure_rendered(&mut self, picker: &Picker, url: &str, area: Rect) {
        let key = ReaderRenderKey {
            url: url.to_string(),
            width: area.width,
            height: area.height,
        };
        if self
            .current_image
            .as_ref()
            .is_some_and(|(current, _)| *current == key)
        {
            return;
        }
        let Some(image) = self.cached(url) else {
            return;
        };
        // Touch so paging back and forth keeps the neighbours cached.
        self.cache_page_image(CachedPageImage {
            url: url.to_string(),
            image: Arc::clone(&image),
        });

        match picker.new_protocol(image.as_ref().clone(), area, Resize::Fit(None)) {
            Ok(protocol) => self.current_image = Some((key, protocol)),
            Err(err) => {
                warn!(%url, error = %err, "page render failed");
                self.current_image = None;
                self.failed.insert(url.to_string(), format!("render failed: {err}"));
            }
        }
    }

    fn protocol_for(&self, url: &str, area: Rect) -> Option<&ImageProtocol> {
        self.current_image
            .as_ref()
            .filter(|(key, _)| {
                key.url == url && key.width == area.width && key.height == area.height
            })
            .map(|(_, protocol)| protocol)
    }
}

fn mode_title(mode: ViewMode) -> &'static str {
    match mode {
        ViewMode::Search => "Search",
        ViewMode::Chapters => "Chapters",
        ViewMode::Reader => "Reader",
        ViewMode::Library => "Library",
    }
}

fn footer_hints(mode: ViewMode, focus: SearchFocus) -> &'static [(&'static str, &'static str)] {
    match (mode, focus) {
        (ViewMode::Search, SearchFocus::Query) => &[
            ("Enter", "search"),
            ("Tab", "results"),
            ("Ctrl+u", "clear"),
            ("F2", "library"),
            ("Esc", "quit"),
        ],
        (ViewMode::Search, SearchFocus::Results) => &[
            ("Enter", "read"),
            ("a", "add to library"),
            ("Tab", "query"),
            ("l", "library"),
            ("?", "help"),
            ("q", "quit"),
        ],
        (ViewMode::Chapters, _) => &[
            ("Enter", "read"),
            ("a", "add to library"),
            ("Esc", "search"),
            ("l", "library"),
            ("?", "help"),
            ("q", "quit"),
        ],
        (ViewMode::Reader, _) => &[
            ("Right/Space", "next"),
            ("Left", "prev"),
            ("g", "go to"),
            ("b", "bookmarks"),
            ("Esc", "chapters"),
            ("q", "quit"),
        ],
        (ViewMode::Library, _) => &[
            ("Enter", "continue"),
            ("r", "reload"),
            ("Esc", "search"),
            ("?", "help"),
            ("q", "quit"),
        ],
    }
}

/// One-based page input to a zero-based index within `total` pages.
fn parse_page_input(input: &str, total: usize) -> Result<usize, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Enter a page number".to_string());
    }
    let page = match input.parse::<usize>() {
        Ok(p) if p >= 1 => p,
        _ => return Err("Invalid page number".to_string()),
    };
    if page > total {
        return Err(format!("Page out of range (1..={total})"));
    }
    Ok(page - 1)
}

fn chapter_label(chapter: &Chapter) -> String {
    let mut label = format!("Chapter {}", chapter.number_label());
    if let Some(volume) = chapter.volume.as_deref().filter(|v| !v.trim().is_empty()) {
        label = format!("Vol. {} {label}", volume.trim());
    }
    if !chapter.title.trim().is_empty() {
        label.push_str(": ");
        label.push_str(chapter.title.trim());
    }
    if chapter.pages > 0 {
        label.push_str(&format!("  ({} pages)", chapter.pages));
    }
    label
}

fn library_status_line(entry: &LibraryEntry) -> String {
    let status = if entry.status.trim().is_empty() {
        "reading"
    } else {
        entry.status.trim()
    };
    match entry.last_read_chapter {
        Some(_) => format!("{status} · last read: page {}", entry.last_read_page + 1),
        None => status.to_string(),
    }
}

fn bookmark_label(bookmark: &Bookmark) -> String {
    if bookmark.title.trim().is_empty() {
        format!("Page {}", bookmark.page_number + 1)
    } else {
        bookmark.title.trim().to_string()
    }
}

fn manga_details(manga: &Manga) -> Text<'static> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![Line::styled(manga.title.clone(), bold)];
    if !manga.author.trim().is_empty() {
        lines.push(Line::raw(format!("Author: {}", manga.author.trim())));
    }
    if let Some(status) = manga.status.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push(Line::raw(format!("Status: {}", status.trim())));
    }
    if !manga.tags.is_empty() {
        lines.push(Line::raw(format!("Tags: {}", manga.tags.join(", "))));
    }
    lines.push(Line::raw(""));
    if manga.description.trim().is_empty() {
        lines.push(Line::styled("(no description)", Style::default().fg(Color::Gray)));
    } else {
        lines.push(Line::raw(manga.description.trim().to_string()));
    }
    if !manga.cover_art.trim().is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            format!("Cover: {}", manga.cover_art.trim()),
            Style::default().fg(Color::Gray),
        ));
    }
    Text::from(lines)
}

fn library_details(entry: &LibraryEntry) -> Text<'static> {
    let mut lines = vec![
        Line::styled(entry.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Line::raw(library_status_line(entry)),
    ];
    if let Some(chapter) = &entry.last_read_chapter {
        lines.push(Line::raw(format!("Chapter id: {chapter}")));
    }
    if !entry.cover_art.trim().is_empty() {
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            format!("Cover: {}", entry.cover_art.trim()),
            Style::default().fg(Color::Gray),
        ));
    }
    lines.push(Line::raw(""));
    lines.push(Line::raw("Enter continues reading."));
    Text::from(lines)
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen).context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

/// Word wraps by display width; words wider than a line are split.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;

    for word in text.split_whitespace() {
        let word_width = UnicodeWidthStr::width(word);
        let sep = usize::from(!current.is_empty());

        if current_width + sep + word_width <= max_width {
            if sep == 1 {
                current.push(' ');
            }
            current.push_str(word);
            current_width += sep + word_width;
            continue;
        }

        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }

        if word_width <= max_width {
            current.push_str(word);
            current_width = word_width;
            continue;
        }

        for ch in word.chars() {
            let mut buf = [0u8; 4];
            let w = UnicodeWidthStr::width(&*ch.encode_utf8(&mut buf));
            if current_width + w > max_width && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }
            current.push(ch);
            current_width += w;
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
