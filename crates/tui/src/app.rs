use std::{io, thread, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame, Terminal,
};
use saga_core::{
    catalog::{Catalog, Collection},
    paging::{LoaderStatus, Page, PaginatedLoader, PagingResult},
    watch::WatchEvent,
    Record,
};
use tokio::{spawn, sync::mpsc, task::spawn_blocking};
use tracing::{debug, error, info, warn};

const TICK_RATE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
struct Theme {
    accent: Color,
    muted: Color,
    selection_bg: Color,
    selection_fg: Color,
    danger: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            selection_fg: Color::White,
            danger: Color::Red,
        }
    }
}

/// Which foreground load a pane asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Navigation {
    Jump(i64),
    Next,
    Previous,
    Last,
    /// Drop the cache and reload the cursor page.
    Reload,
    /// Recount the items and reload the cursor page.
    Recount,
}

impl Navigation {
    /// Refreshes requested during a load are queued instead of dropped.
    fn is_refresh(self) -> bool {
        matches!(self, Navigation::Reload | Navigation::Recount)
    }

    fn run(self, loader: &PaginatedLoader<Record>) -> PagingResult<Page<Record>> {
        match self {
            Navigation::Jump(page) => loader.load_page(page),
            Navigation::Next => loader.load_next_page(),
            Navigation::Previous => loader.load_previous_page(),
            Navigation::Last => {
                let last = loader.total_pages()?.saturating_sub(1);
                loader.load_page(last as i64)
            }
            Navigation::Reload => {
                loader.invalidate_cache();
                loader.load_page(loader.current_page() as i64)
            }
            Navigation::Recount => {
                loader.refresh_total_count();
                loader.load_page(loader.current_page() as i64)
            }
        }
    }
}

enum AppEvent {
    Input(Event),
    Tick,
    PageLoaded {
        pane: usize,
        navigation: Navigation,
        result: PagingResult<Page<Record>>,
        status: LoaderStatus,
    },
    LoadAborted {
        pane: usize,
        reason: String,
    },
    Prefetched {
        pane: usize,
        page: usize,
        result: PagingResult<()>,
        status: Option<LoaderStatus>,
    },
}

/// One browsable list. Drawing reads only `rows` and `status`; the loader is
/// touched from blocking tasks so a slow fetch never stalls a redraw.
struct Pane {
    collection: Collection,
    loader: PaginatedLoader<Record>,
    rows: Page<Record>,
    status: Option<LoaderStatus>,
    selected: usize,
    loading: bool,
    pending: Option<Navigation>,
}

impl Pane {
    fn new(collection: Collection, loader: PaginatedLoader<Record>) -> Self {
        Self {
            collection,
            loader,
            rows: Vec::new().into(),
            status: None,
            selected: 0,
            loading: false,
            pending: None,
        }
    }

    fn page_label(&self) -> String {
        let Some(status) = &self.status else {
            return "not loaded".to_string();
        };
        match &status.total_pages {
            Ok(0) => "no pages".to_string(),
            Ok(total) => format!("page {} of {}", status.cursor + 1, total),
            Err(err) => format!("page {} (count failed: {err})", status.cursor + 1),
        }
    }

    /// Queue a refresh behind the load in flight. A reload covers a recount.
    fn queue(&mut self, navigation: Navigation) {
        if self.pending != Some(Navigation::Reload) {
            self.pending = Some(navigation);
        }
    }
}

pub struct SagaApp {
    panes: Vec<Pane>,
    active: usize,
    prefetch_ahead: usize,
    status: String,
    should_quit: bool,
    theme: Theme,
    event_tx: Option<mpsc::Sender<AppEvent>>,
    watch_rx: Option<mpsc::Receiver<WatchEvent>>,
}

impl SagaApp {
    pub fn new(catalog: &Catalog, prefetch_ahead: usize) -> Self {
        let panes = Collection::ALL
            .into_iter()
            .map(|collection| Pane::new(collection, catalog.loader(collection)))
            .collect();
        Self::with_panes(
            panes,
            prefetch_ahead,
            format!("Browsing {}", catalog.data_dir().display()),
        )
    }

    fn with_panes(panes: Vec<Pane>, prefetch_ahead: usize, status: String) -> Self {
        Self {
            panes,
            active: 0,
            prefetch_ahead,
            status,
            should_quit: false,
            theme: Theme::default(),
            event_tx: None,
            watch_rx: None,
        }
    }

    pub fn attach_watch(&mut self, receiver: mpsc::Receiver<WatchEvent>) {
        self.watch_rx = Some(receiver);
    }

    pub async fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        self.event_tx = Some(event_tx);

        for pane in 0..self.panes.len() {
            self.navigate(pane, Navigation::Jump(0));
        }

        let mut watch_rx = self.watch_rx.take();

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }

            if let Some(rx) = watch_rx.as_mut() {
                let mut watch_closed = false;
                tokio::select! {
                    maybe_event = event_rx.recv() => {
                        if !self.process_app_event(maybe_event) {
                            break;
                        }
                    }
                    maybe_watch = rx.recv() => {
                        match maybe_watch {
                            Some(event) => self.handle_watch_event(event),
                            None => watch_closed = true,
                        }
                    }
                }
                if watch_closed {
                    watch_rx = None;
                }
            } else {
                let maybe_event = event_rx.recv().await;
                if !self.process_app_event(maybe_event) {
                    break;
                }
            }
        }

        restore_terminal(&mut terminal)?;
        self.event_tx = None;
        Ok(())
    }

    fn process_app_event(&mut self, maybe_event: Option<AppEvent>) -> bool {
        match maybe_event {
            Some(AppEvent::Input(event)) => {
                if let Err(err) = self.handle_input(event) {
                    error!(?err, "Input handling failed");
                    self.status = format!("Error: {err}");
                }
            }
            Some(AppEvent::Tick) => {}
            Some(AppEvent::PageLoaded {
                pane,
                navigation,
                result,
                status,
            }) => self.handle_page_loaded(pane, navigation, result, status),
            Some(AppEvent::LoadAborted { pane, reason }) => {
                let title = self.panes[pane].collection.title();
                self.panes[pane].loading = false;
                self.status = format!("Error: {title} load aborted: {reason}");
                self.resume_pending(pane);
            }
            Some(AppEvent::Prefetched {
                pane,
                page,
                result,
                status,
            }) => {
                // A load in flight will bring a newer snapshot.
                if !self.panes[pane].loading && status.is_some() {
                    self.panes[pane].status = status;
                }
                match result {
                    Ok(()) => debug!(pane, page, "Prefetch settled"),
                    Err(err) => {
                        warn!(pane, page, %err, "Prefetch failed");
                        self.status = format!("Prefetch of page {} failed: {err}", page + 1);
                    }
                }
            }
            None => return false,
        }
        true
    }

    fn handle_watch_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Changed(collection) => {
                let Some(index) = self
                    .panes
                    .iter()
                    .position(|pane| pane.collection == collection)
                else {
                    return;
                };
                info!(collection = collection.title(), "Data file changed");
                self.navigate(index, Navigation::Reload);
                self.status = format!("{} changed on disk; reloaded", collection.title());
            }
            WatchEvent::Error(err) => {
                error!(?err, "Watcher failed");
                self.status = format!("Watch failed: {err}");
            }
        }
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        self.handle_key(key);
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent) {
        let active = self.active;
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true
            }
            KeyCode::Tab => self.active = (self.active + 1) % self.panes.len(),
            KeyCode::BackTab => {
                self.active = (self.active + self.panes.len() - 1) % self.panes.len()
            }
            KeyCode::PageDown | KeyCode::Right | KeyCode::Char('n') => {
                self.navigate(active, Navigation::Next)
            }
            KeyCode::PageUp | KeyCode::Left | KeyCode::Char('p') => {
                self.navigate(active, Navigation::Previous)
            }
            KeyCode::Home => self.navigate(active, Navigation::Jump(0)),
            KeyCode::End => self.navigate(active, Navigation::Last),
            KeyCode::Down | KeyCode::Char('j') => {
                let pane = &mut self.panes[active];
                if pane.selected + 1 < pane.rows.len() {
                    pane.selected += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                let pane = &mut self.panes[active];
                pane.selected = pane.selected.saturating_sub(1);
            }
            KeyCode::Char('r') => {
                info!(
                    collection = self.panes[active].collection.title(),
                    "Cache invalidated by user"
                );
                self.navigate(active, Navigation::Reload);
                self.status = "Cache cleared".to_string();
            }
            KeyCode::Char('c') => {
                self.navigate(active, Navigation::Recount);
                self.status = format!("{}: recounting", self.panes[active].collection.title());
            }
            _ => {}
        }
    }

    /// Run a foreground load off the UI thread and report back through the event channel.
    fn navigate(&mut self, index: usize, navigation: Navigation) {
        let Some(sender) = self.event_tx.clone() else {
            error!("event_channel_missing");
            return;
        };
        let pane = &mut self.panes[index];
        if pane.loading {
            if navigation.is_refresh() {
                debug!(pane = index, ?navigation, "Refresh queued behind load");
                pane.queue(navigation);
            }
            return;
        }
        pane.loading = true;
        let loader = pane.loader.clone();
        debug!(pane = index, ?navigation, "Foreground load requested");
        spawn(async move {
            let outcome = spawn_blocking(move || {
                let result = navigation.run(&loader);
                (result, loader.status())
            })
            .await;
            let event = match outcome {
                Ok((result, status)) => AppEvent::PageLoaded {
                    pane: index,
                    navigation,
                    result,
                    status,
                },
                Err(err) => {
                    error!(?err, "Foreground load task failed");
                    AppEvent::LoadAborted {
                        pane: index,
                        reason: err.to_string(),
                    }
                }
            };
            let _ = sender.send(event).await;
        });
    }

    fn handle_page_loaded(
        &mut self,
        index: usize,
        navigation: Navigation,
        result: PagingResult<Page<Record>>,
        status: LoaderStatus,
    ) {
        let pane = &mut self.panes[index];
        pane.loading = false;
        pane.status = Some(status);
        match result {
            // Navigation past either end yields nothing; keep what is on screen.
            Ok(rows) if rows.is_empty() && !pane.rows.is_empty() && !navigation.is_refresh() => {
                self.status = format!("{}: no more pages", pane.collection.title());
            }
            Ok(rows) => {
                pane.rows = rows;
                pane.selected = pane.selected.min(pane.rows.len().saturating_sub(1));
                debug!(pane = index, label = %pane.page_label(), "Page shown");
                if navigation == Navigation::Recount {
                    self.status = format!("{}: {}", pane.collection.title(), pane.page_label());
                }
                self.schedule_prefetch(index);
            }
            Err(err) => {
                error!(pane = index, %err, "Page load failed");
                self.status = format!("{}: {err}", pane.collection.title());
            }
        }
        self.resume_pending(index);
    }

    fn resume_pending(&mut self, index: usize) {
        if let Some(navigation) = self.panes[index].pending.take() {
            self.navigate(index, navigation);
        }
    }

    fn schedule_prefetch(&self, index: usize) {
        let Some(sender) = self.event_tx.clone() else {
            return;
        };
        let pane = &self.panes[index];
        let Some(cursor) = pane.status.as_ref().map(|status| status.cursor) else {
            return;
        };
        if self.prefetch_ahead == 0 {
            return;
        }
        let loader = pane.loader.clone();
        let ahead = self.prefetch_ahead;
        spawn(async move {
            let tasks: Vec<_> = (1..=ahead)
                .map(|offset| loader.prefetch((cursor + offset) as i64))
                .collect();
            for task in tasks {
                let page = task.page();
                let result = task.await;
                let snapshot = loader.clone();
                let status = spawn_blocking(move || snapshot.status()).await.ok();
                let _ = sender
                    .send(AppEvent::Prefetched {
                        pane: index,
                        page,
                        result,
                        status,
                    })
                    .await;
            }
        });
    }

    fn draw(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(5),
                Constraint::Length(4),
            ])
            .split(frame.size());

        self.render_tabs(frame, chunks[0]);
        self.render_rows(frame, chunks[1]);
        self.render_status(frame, chunks[2]);
    }

    fn render_tabs(&self, frame: &mut Frame, area: Rect) {
        let titles: Vec<Line> = self
            .panes
            .iter()
            .map(|pane| Line::from(pane.collection.title()))
            .collect();
        let tabs = Tabs::new(titles)
            .block(Block::default().borders(Borders::ALL).title("saga"))
            .select(self.active)
            .highlight_style(
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            );
        frame.render_widget(tabs, area);
    }

    fn render_rows(&self, frame: &mut Frame, area: Rect) {
        let pane = &self.panes[self.active];
        let title = if pane.loading {
            format!("{} · {} · loading…", pane.collection.title(), pane.page_label())
        } else {
            format!("{} · {}", pane.collection.title(), pane.page_label())
        };
        let items: Vec<ListItem> = pane
            .rows
            .iter()
            .map(|record| ListItem::new(record.display_line()))
            .collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(
                Style::default()
                    .bg(self.theme.selection_bg)
                    .fg(self.theme.selection_fg),
            )
            .highlight_symbol("> ");
        let mut state = ListState::default();
        if !pane.rows.is_empty() {
            state.select(Some(pane.selected));
        }
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let pane = &self.panes[self.active];
        let (cached, capacity, epoch) = match &pane.status {
            Some(status) => (
                status
                    .resident
                    .iter()
                    .map(|page| (page + 1).to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
                status.capacity.to_string(),
                status.epoch.to_string(),
            ),
            None => (String::new(), "-".to_string(), "-".to_string()),
        };
        let style = if self.status.starts_with("Error") {
            Style::default().fg(self.theme.danger)
        } else {
            Style::default()
        };
        let secondary = format!(
            "cached pages [{cached}] of {capacity} · epoch {epoch} · n/p page  tab list  r reload  c recount  q quit"
        );
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(self.status.clone(), style)),
            Line::from(Span::styled(secondary, Style::default().fg(self.theme.muted))),
        ])
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use saga_core::{models::StatRecord, paging::LoaderOptions};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc as std_mpsc, Arc, Mutex,
    };

    fn stat(index: usize) -> Record {
        Record::Stat(StatRecord {
            key: format!("k{index}"),
            label: format!("stat {index}"),
            value: index as f64,
        })
    }

    fn app_with(loader: PaginatedLoader<Record>) -> (SagaApp, mpsc::Receiver<AppEvent>) {
        let pane = Pane::new(Collection::Statistics, loader);
        let mut app = SagaApp::with_panes(vec![pane], 0, String::new());
        let (event_tx, event_rx) = mpsc::channel(16);
        app.event_tx = Some(event_tx);
        (app, event_rx)
    }

    fn screen(app: &SagaApp) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 16)).expect("terminal");
        terminal.draw(|frame| app.draw(frame)).expect("draw");
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn redraw_does_not_wait_for_a_fetch() {
        let (entered_tx, entered_rx) = std_mpsc::channel::<()>();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let entered = Mutex::new(entered_tx);
        let release = Mutex::new(release_rx);
        let fetch = move |skip: usize, take: usize| -> anyhow::Result<Vec<Record>> {
            let _ = entered.lock().expect("entered").send(());
            let _ = release
                .lock()
                .expect("release")
                .recv_timeout(Duration::from_secs(5));
            Ok((skip..skip + take).map(stat).collect())
        };
        let loader = PaginatedLoader::with_counter(
            fetch,
            || -> anyhow::Result<usize> { Ok(40) },
            LoaderOptions::new(10, 2),
        );
        let (mut app, _events) = app_with(loader.clone());
        app.panes[0].loading = true;

        let fetching = thread::spawn(move || loader.load_page(0).map(|page| page.len()));
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("fetch never started");

        let (drawn_tx, drawn_rx) = std_mpsc::channel();
        let drawer = thread::spawn(move || {
            let _ = drawn_tx.send(screen(&app));
        });
        let drawn = drawn_rx.recv_timeout(Duration::from_millis(500));
        let _ = release_tx.send(());
        drawer.join().expect("drawer panicked");
        assert_eq!(fetching.join().expect("fetch panicked").expect("load"), 10);

        let drawn = drawn.expect("redraw waited on the loader");
        assert!(drawn.contains("loading"));
        assert!(drawn.contains("not loaded"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn page_label_comes_from_the_loaded_snapshot() {
        let source = saga_core::paging::VecSource::new((0..45).map(stat).collect());
        let loader =
            PaginatedLoader::with_counter(source.clone(), source, LoaderOptions::new(10, 3));
        let (mut app, mut events) = app_with(loader);

        app.navigate(0, Navigation::Last);
        assert!(app.process_app_event(events.recv().await));

        let pane = &app.panes[0];
        assert!(!pane.loading);
        assert_eq!(pane.rows.len(), 5);
        assert_eq!(pane.page_label(), "page 5 of 5");
        assert!(screen(&app).contains("cached pages [5] of 3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_load_frees_the_pane() {
        let fetch = |_skip: usize, _take: usize| -> anyhow::Result<Vec<Record>> {
            panic!("source crashed")
        };
        let (mut app, mut events) = app_with(PaginatedLoader::new(fetch, LoaderOptions::default()));

        app.navigate(0, Navigation::Jump(0));
        assert!(app.panes[0].loading);
        let event = events.recv().await;
        assert!(matches!(event, Some(AppEvent::LoadAborted { pane: 0, .. })));
        assert!(app.process_app_event(event));

        assert!(!app.panes[0].loading);
        assert!(app.status.starts_with("Error"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reload_during_a_load_runs_once_it_settles() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let fetch = {
            let fetches = Arc::clone(&fetches);
            move |skip: usize, take: usize| -> anyhow::Result<Vec<Record>> {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok((skip..(skip + take).min(30)).map(stat).collect())
            }
        };
        let loader = PaginatedLoader::with_counter(
            fetch,
            || -> anyhow::Result<usize> { Ok(30) },
            LoaderOptions::new(10, 3),
        );
        let (mut app, mut events) = app_with(loader);

        app.navigate(0, Navigation::Jump(1));
        app.navigate(0, Navigation::Recount);
        app.navigate(0, Navigation::Reload);
        app.navigate(0, Navigation::Next);
        assert_eq!(app.panes[0].pending, Some(Navigation::Reload));

        assert!(app.process_app_event(events.recv().await));
        assert!(app.panes[0].loading);
        assert_eq!(app.panes[0].pending, None);

        let event = events.recv().await;
        assert!(matches!(
            event,
            Some(AppEvent::PageLoaded {
                navigation: Navigation::Reload,
                ..
            })
        ));
        assert!(app.process_app_event(event));

        let pane = &app.panes[0];
        assert!(!pane.loading);
        let status = pane.status.as_ref().expect("status");
        assert_eq!((status.cursor, status.epoch), (1, 1));
        assert_eq!(status.resident, vec![1]);
        assert!(matches!(&pane.rows[0], Record::Stat(stat) if stat.key == "k10"));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }
}
