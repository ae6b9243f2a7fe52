//! Generic KPI page: one keyed query, re-pointed whenever filters change.

use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};

use crate::cache::{CacheResult, CacheSource, QueryKey};
use crate::dashboard::{DashboardClient, PageData};
use crate::filters::FilterState;
use crate::query::{Query, QueryStatus};
use crate::ui::renderfns::source_label;
use crate::ui::view::{ShortcutInfo, View, ViewAction};

/// How a page payload draws itself.
pub trait PageBody: PageData {
  const TITLE: &'static str;

  /// Draw the page. `scroll` is the number of list rows to skip.
  fn render(&self, frame: &mut Frame, area: Rect, scroll: usize);

  /// Number of scrollable rows
  fn rows(&self) -> usize;

  fn branch_names(&self) -> Vec<String> {
    Vec::new()
  }
}

pub struct PageView<P: PageBody> {
  query: Query<CacheResult<P>>,
  scroll: usize,
  /// Source of the last applied result, to report offline transitions once
  last_source: Option<CacheSource>,
}

impl<P: PageBody> PageView<P> {
  pub fn new(client: DashboardClient, filters: &FilterState) -> Self {
    let mut query = Query::new(move |key: QueryKey, policy| {
      let client = client.clone();
      async move { client.page::<P>(&key.filters.to_kpi_filters(), policy).await }
    });
    query.set_key(DashboardClient::page_key::<P>(&filters.kpi_filters()));

    Self {
      query,
      scroll: 0,
      last_source: None,
    }
  }

  pub fn query(&self) -> &Query<CacheResult<P>> {
    &self.query
  }

  fn render_status(&self, frame: &mut Frame, area: Rect) {
    let mut spans = Vec::new();
    match self.query.data() {
      Some(result) => {
        let (label, color) = source_label(result.source, result.cached_at, Utc::now());
        spans.push(Span::styled(format!(" {} ", label), Style::default().fg(color)));
      }
      None => spans.push(Span::raw(" ")),
    }
    if self.query.is_loading() {
      spans.push(Span::styled("loading…", Style::default().fg(Color::DarkGray)));
    }
    if let (Some(error), Some(_)) = (self.query.error(), self.query.data()) {
      spans.push(Span::styled(
        format!("refresh failed: {}", error),
        Style::default().fg(Color::Red),
      ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }
}

impl<P: PageBody> View for PageView<P> {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => {
        let rows = self.query.data().map(|r| r.data.rows()).unwrap_or(0);
        if self.scroll + 1 < rows {
          self.scroll += 1;
        }
      }
      KeyCode::Char('k') | KeyCode::Up => {
        self.scroll = self.scroll.saturating_sub(1);
      }
      KeyCode::Home => self.scroll = 0,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(0)])
      .split(area);

    self.render_status(frame, chunks[0]);

    match (self.query.state(), self.query.data()) {
      (_, Some(result)) => result.data.render(frame, chunks[1], self.scroll),
      (QueryStatus::Error, None) => {
        let message = self
          .query
          .error()
          .map(|e| e.to_string())
          .unwrap_or_default();
        let text = vec![
          Line::styled(
            format!(" Could not load {}", P::TITLE.to_lowercase()),
            Style::default().fg(Color::Red).bold(),
          ),
          Line::styled(format!(" {}", message), Style::default().fg(Color::Red)),
          Line::raw(""),
          Line::styled(" Press r to retry", Style::default().fg(Color::DarkGray)),
        ];
        frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: false }), chunks[1]);
      }
      _ => {
        frame.render_widget(
          Paragraph::new(" Loading…").style(Style::default().fg(Color::DarkGray)),
          chunks[1],
        );
      }
    }
  }

  fn title(&self) -> &'static str {
    P::TITLE
  }

  fn tick(&mut self) -> ViewAction {
    if !self.query.poll() {
      return ViewAction::None;
    }
    let source = self.query.data().map(|r| r.source);
    let went_offline = source == Some(CacheSource::Offline) && self.last_source != source;
    self.last_source = source;
    if went_offline {
      ViewAction::Status("Backend unreachable, showing cached data".to_string())
    } else {
      ViewAction::None
    }
  }

  fn on_filters_changed(&mut self, filters: &FilterState) {
    if self
      .query
      .set_key(DashboardClient::page_key::<P>(&filters.kpi_filters()))
    {
      self.scroll = 0;
    }
  }

  fn refresh(&mut self) {
    self.query.refetch();
  }

  fn revalidate(&mut self) {
    self.query.mutate();
  }

  fn branch_names(&self) -> Vec<String> {
    self
      .query
      .data()
      .map(|r| r.data.branch_names())
      .unwrap_or_default()
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("[ ]", "month").with_priority(20),
      ShortcutInfo::new("g", "rest/graphql").with_priority(30),
      ShortcutInfo::new("r", "refresh").with_priority(40),
      ShortcutInfo::new("j/k", "scroll").with_priority(50),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ProductsPage;
  use crate::dashboard::tests::test_client;
  use crate::filters::{DateRange, ProductLine};
  use crate::preferences::DataMode;
  use chrono::NaiveDate;
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn settle(view: &mut PageView<ProductsPage>) {
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      view.tick();
      if !view.query().is_loading() {
        return;
      }
    }
  }

  #[tokio::test]
  async fn test_filter_change_moves_query_to_new_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/product-analytics"))
      .and(query_param("product_line", "Sports"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"product": "Ball", "units_sold": 3, "revenue": 30.0}
      ])))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/product-analytics"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;

    let client = test_client(&server, DataMode::Rest);
    let mut filters = FilterState {
      date_range: DateRange::month_of(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
      ..FilterState::default()
    };
    let mut view = PageView::<ProductsPage>::new(client, &filters);
    settle(&mut view).await;
    assert_eq!(view.query().data().map(|r| r.data.rows()), Some(0));

    filters.selected_product_line = ProductLine::Named("Sports".into());
    view.on_filters_changed(&filters);
    assert!(view.query().data().is_none());
    settle(&mut view).await;

    let page = &view.query().data().unwrap().data;
    assert_eq!(page.product_analytics[0].product, "Ball");
  }

  #[tokio::test]
  async fn test_error_then_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/product-analytics"))
      .respond_with(ResponseTemplate::new(404))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/kpis/product-analytics"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;

    let client = test_client(&server, DataMode::Rest);
    let mut view = PageView::<ProductsPage>::new(client, &FilterState::default());
    settle(&mut view).await;
    assert_eq!(view.query().state(), QueryStatus::Error);

    view.refresh();
    settle(&mut view).await;
    assert_eq!(view.query().state(), QueryStatus::Success);
  }
}
