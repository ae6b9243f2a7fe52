use crate::api::{BranchesPage, DashboardPage, ProductsPage, SalespeoplePage};
use crate::cache::CacheManager;
use crate::commands::{self, Action, Page};
use crate::config::Config;
use crate::dashboard::DashboardClient;
use crate::event::{Event, EventHandler};
use crate::filters::{FilterState, FilterStore};
use crate::preferences::DataMode;
use crate::storage::LocalStorage;
use crate::ui;
use crate::ui::components::{BranchTabs, CommandEvent, CommandLine, KeyResult};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{PageView, UploadView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const TICK_RATE: Duration = Duration::from_millis(250);

/// Main application state
pub struct App {
  config: Config,
  storage: Arc<dyn LocalStorage>,
  filters: FilterStore,
  client: DashboardClient,
  manager: CacheManager,

  page: Page,
  /// Current KPI page; unused while the upload screen is shown
  view: Box<dyn View>,
  /// Kept across navigation so ingestion polling continues in the background
  upload: UploadView,

  command: CommandLine,
  branch_tabs: BranchTabs,
  status: Option<String>,
  should_quit: bool,
}

impl App {
  pub fn new(
    config: Config,
    storage: Arc<dyn LocalStorage>,
    filters: FilterStore,
    client: DashboardClient,
  ) -> Self {
    let manager = CacheManager::new(client.clone());
    let view: Box<dyn View> = Box::new(PageView::<DashboardPage>::new(
      client.clone(),
      filters.state(),
    ));
    let upload = UploadView::new(
      client.api().clone(),
      &config.ingest.datasource_name,
      config.ingest.poll_interval(),
    );

    let mut branch_tabs = BranchTabs::new(&config.filters.prefetch_branches);
    branch_tabs.select(&filters.state().selected_branch);

    Self {
      config,
      storage,
      filters,
      client,
      manager,
      page: Page::Dashboard,
      view,
      upload,
      command: CommandLine::new(),
      branch_tabs,
      status: None,
      should_quit: false,
    }
  }

  /// Run the main event loop
  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut events = EventHandler::new(TICK_RATE);
    self.warm_start();

    let result = self.event_loop(&mut terminal, &mut events).await;

    // Cleanup terminal even when the loop failed
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    if let Some(persister) = self.client.cache().persister() {
      persister.flush();
    }
    info!("Shutting down");
    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| ui::draw(frame, self))?;

      match events.next().await {
        Some(Event::Key(key)) => self.handle_key(key),
        Some(Event::Tick) => self.tick(),
        Some(Event::Resize) => {}
        None => break,
      }
    }
    Ok(())
  }

  /// Prefetch what the user is likely to look at first
  fn warm_start(&self) {
    let state = self.filters.state();
    self.manager.warm_cache(state);
    if !self.config.filters.prefetch_branches.is_empty() {
      self
        .manager
        .prefetch_branches(state, &self.config.filters.prefetch_branches);
    }
  }

  fn tick(&mut self) {
    let action = self.upload.tick();
    self.handle_view_action(action);

    if self.page != Page::Upload {
      let action = self.view.tick();
      self.handle_view_action(action);
      let names = self.view.branch_names();
      self.branch_tabs.merge(&names);
    }

    if let Some(persister) = self.client.cache().persister() {
      persister.flush_if_due();
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      self.should_quit = true;
      return;
    }

    match self.command.handle_key(key) {
      KeyResult::Event(CommandEvent::Submitted(line)) => {
        self.execute(&line);
        return;
      }
      KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
      KeyResult::NotHandled => {}
    }

    if let KeyResult::Event(branch) = self.branch_tabs.handle_key(key) {
      self.apply(Action::Branch(branch));
      return;
    }

    match key.code {
      KeyCode::Char('q') => self.should_quit = true,
      KeyCode::Char('[') => self.shift_month(-1),
      KeyCode::Char(']') => self.shift_month(1),
      KeyCode::Char('g') => self.set_data_mode(self.client.data_mode().toggled()),
      KeyCode::Char('w') => {
        let warming = self.manager.prefetch_adjacent_months(self.filters.state());
        self.status = Some(if warming.is_empty() {
          "Pick a month range to prefetch its neighbours".to_string()
        } else {
          "Prefetching adjacent months".to_string()
        });
      }
      KeyCode::Char('r') => self.current_view_mut().revalidate(),
      KeyCode::Tab => self.open(self.page.next()),
      _ => {
        let action = self.current_view_mut().handle_key(key);
        self.handle_view_action(action);
      }
    }
  }

  fn execute(&mut self, line: &str) {
    match commands::parse(line) {
      Ok(action) => self.apply(action),
      Err(message) => self.status = Some(message),
    }
  }

  fn apply(&mut self, action: Action) {
    match action {
      Action::Open(page) => self.open(page),
      Action::Upload(path) => {
        self.open(Page::Upload);
        if let Some(path) = path {
          let action = self.upload.select(&path);
          self.handle_view_action(action);
        }
      }
      Action::Branch(branch) => {
        self.filters.set_selected_branch(branch);
        self.filters_changed();
      }
      Action::ProductLine(line) => {
        self.filters.set_selected_product_line(line);
        self.filters_changed();
      }
      Action::Range(range) => {
        self.filters.set_date_range(range);
        self.filters_changed();
      }
      Action::Target(target) => {
        self.filters.set_sales_target(target);
        self.filters_changed();
      }
      Action::Reset => {
        self.filters.reset_filters();
        self.filters_changed();
        self.status = Some("Filters reset".to_string());
      }
      Action::Invalidate(entity) => {
        let count = match entity {
          Some(entity) => self.manager.invalidate_related_data(entity),
          None => self.manager.invalidate_dashboard(),
        };
        self.view.refresh();
        self.status = Some(format!("Marked {} cached queries stale", count));
      }
      Action::Mode(mode) => {
        let mode = mode.unwrap_or_else(|| self.client.data_mode().toggled());
        self.set_data_mode(mode);
      }
      Action::ClearCache => {
        self.manager.clear();
        self.view.refresh();
        self.status = Some("Cache cleared".to_string());
      }
      Action::Quit => self.should_quit = true,
    }
  }

  fn handle_view_action(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Status(message) => self.status = Some(message),
      ViewAction::IngestCompleted { rows_ingested } => {
        self.manager.invalidate_dashboard();
        self.view.refresh();
        self.status = Some(match rows_ingested {
          Some(rows) => format!("Ingested {} rows, dashboard data refreshed", rows),
          None => "Ingestion completed, dashboard data refreshed".to_string(),
        });
      }
    }
  }

  fn open(&mut self, page: Page) {
    if let Some(view) = page_view(page, &self.client, self.filters.state()) {
      self.view = view;
    }
    self.page = page;
  }

  fn shift_month(&mut self, delta: i32) {
    if self.filters.shift_month(delta) {
      self.filters_changed();
    } else {
      self.status = Some("Pick a month first: :month YYYY-MM".to_string());
    }
  }

  fn set_data_mode(&mut self, mode: DataMode) {
    if mode == self.client.data_mode() {
      return;
    }
    self.client.set_data_mode(mode);
    mode.save(self.storage.as_ref());
    self.view.refresh();
    self.status = Some(format!("Data source: {}", mode));
  }

  /// Push the new filter state to everything that depends on it
  fn filters_changed(&mut self) {
    let state = self.filters.state().clone();
    self.branch_tabs.select(&state.selected_branch);
    self.view.on_filters_changed(&state);
    self.status = None;
  }

  // ==========================================================================
  // Accessors for rendering
  // ==========================================================================

  pub fn current_view(&self) -> &dyn View {
    match self.page {
      Page::Upload => &self.upload,
      _ => self.view.as_ref(),
    }
  }

  pub fn current_view_mut(&mut self) -> &mut dyn View {
    match self.page {
      Page::Upload => &mut self.upload,
      _ => self.view.as_mut(),
    }
  }

  pub fn base_url(&self) -> &str {
    &self.config.api.base_url
  }

  pub fn data_mode(&self) -> DataMode {
    self.client.data_mode()
  }

  pub fn filter_summary(&self) -> String {
    self.filters.state().summary()
  }

  pub fn status(&self) -> Option<&str> {
    self.status.as_deref()
  }

  pub fn branch_tabs(&self) -> &BranchTabs {
    &self.branch_tabs
  }

  pub fn command_line(&self) -> &CommandLine {
    &self.command
  }
}

/// Build the view for a KPI page. The upload screen is owned by the App.
fn page_view(page: Page, client: &DashboardClient, filters: &FilterState) -> Option<Box<dyn View>> {
  let client = client.clone();
  let view: Box<dyn View> = match page {
    Page::Dashboard => Box::new(PageView::<DashboardPage>::new(client, filters)),
    Page::Products => Box::new(PageView::<ProductsPage>::new(client, filters)),
    Page::Branches => Box::new(PageView::<BranchesPage>::new(client, filters)),
    Page::Salespeople => Box::new(PageView::<SalespeoplePage>::new(client, filters)),
    Page::Upload => return None,
  };
  Some(view)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{KpiFilters, QueryKey};
  use crate::dashboard::tests::test_client;
  use crate::filters::{Branch, DateRange};
  use crate::storage::{SqliteStorage, DATA_MODE_KEY};
  use chrono::NaiveDate;
  use wiremock::MockServer;

  fn app(server: &MockServer) -> App {
    let storage: Arc<dyn LocalStorage> = Arc::new(SqliteStorage::in_memory(None).unwrap());
    let filters = FilterStore::load(storage.clone(), FilterState::default());
    App::new(
      Config::default(),
      storage,
      filters,
      test_client(server, DataMode::Rest),
    )
  }

  fn press(app: &mut App, c: char) {
    app.handle_key(KeyEvent::from(KeyCode::Char(c)));
  }

  fn command(app: &mut App, line: &str) {
    press(app, ':');
    for c in line.chars() {
      press(app, c);
    }
    app.handle_key(KeyEvent::from(KeyCode::Enter));
  }

  #[tokio::test]
  async fn test_commands_update_filters() {
    let server = MockServer::start().await;
    let mut app = app(&server);

    command(&mut app, "month 2024-03");
    command(&mut app, "branch Nairobi");

    let state = app.filters.state();
    assert_eq!(
      state.date_range,
      DateRange::month_of(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    );
    assert_eq!(state.selected_branch, Branch::Named("Nairobi".into()));
    assert_eq!(app.branch_tabs.selected(), Branch::Named("Nairobi".into()));

    press(&mut app, ']');
    assert_eq!(
      app.filters.state().date_range.start(),
      NaiveDate::from_ymd_opt(2024, 4, 1)
    );
  }

  #[tokio::test]
  async fn test_bad_command_sets_status() {
    let server = MockServer::start().await;
    let mut app = app(&server);
    command(&mut app, "month March");
    assert_eq!(app.status(), Some("expected YYYY-MM, got 'March'"));
  }

  #[tokio::test]
  async fn test_mode_toggle_is_saved() {
    let server = MockServer::start().await;
    let mut app = app(&server);

    press(&mut app, 'g');
    assert_eq!(app.data_mode(), DataMode::GraphQl);
    assert_eq!(
      app.storage.get_item(DATA_MODE_KEY).unwrap().as_deref(),
      Some("graphql")
    );
    assert_eq!(app.status(), Some("Data source: GraphQL"));
  }

  #[tokio::test]
  async fn test_ingest_completion_invalidates_dashboard() {
    let server = MockServer::start().await;
    let mut app = app(&server);
    let key = QueryKey::new(crate::api::KpiOperation::RevenueSummary, &KpiFilters::default());
    app.client.cache().set(&key, serde_json::json!({}));
    assert!(app.client.cache().is_fresh(&key));

    app.handle_view_action(ViewAction::IngestCompleted {
      rows_ingested: Some(12),
    });
    assert!(!app.client.cache().is_fresh(&key));
    assert_eq!(app.status(), Some("Ingested 12 rows, dashboard data refreshed"));
  }

  #[tokio::test]
  async fn test_tab_cycles_pages_and_upload_keeps_state() {
    let server = MockServer::start().await;
    let mut app = app(&server);
    for _ in 0..4 {
      app.handle_key(KeyEvent::from(KeyCode::Tab));
    }
    assert_eq!(app.page, Page::Upload);
    assert_eq!(app.current_view().title(), "Upload");
    app.handle_key(KeyEvent::from(KeyCode::Tab));
    assert_eq!(app.current_view().title(), "Dashboard");
  }
}
