use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::ApiClient;
use crate::ui::view::{ShortcutInfo, View, ViewAction};
use crate::upload::{spawn_upload, SelectedFile, UploadEvent, UploadState, Uploader};

/// Upload screen. Lives for the whole session so polling continues while
/// other screens are shown.
pub struct UploadView {
  api: ApiClient,
  uploader: Uploader,
  poll_interval: Duration,
  events: Option<mpsc::UnboundedReceiver<UploadEvent>>,
}

impl UploadView {
  pub fn new(api: ApiClient, datasource_name: &str, poll_interval: Duration) -> Self {
    Self {
      api,
      uploader: Uploader::new(datasource_name),
      poll_interval,
      events: None,
    }
  }

  #[cfg(test)]
  pub fn uploader(&self) -> &Uploader {
    &self.uploader
  }

  /// Choose `path` for the next upload
  pub fn select(&mut self, path: &Path) -> ViewAction {
    if self.uploader.is_busy() {
      return ViewAction::Status("An upload is already in progress".to_string());
    }
    match SelectedFile::inspect(path) {
      Ok(file) => {
        let name = file.file_name.clone();
        self.uploader.select_file(file);
        ViewAction::Status(format!("Selected {}, press Enter to upload", name))
      }
      Err(e) => ViewAction::Status(e.to_string()),
    }
  }

  fn submit(&mut self) -> ViewAction {
    match self.uploader.begin() {
      Some(request) => {
        self.events = Some(spawn_upload(self.api.clone(), request, self.poll_interval));
        ViewAction::None
      }
      None => ViewAction::Status("Select a file first: :upload <path>".to_string()),
    }
  }

  fn state_line(&self) -> Line<'static> {
    match self.uploader.state() {
      UploadState::Idle => Line::styled(
        "No file selected",
        Style::default().fg(Color::DarkGray),
      ),
      UploadState::Selected => Line::styled("Ready to upload", Style::default().fg(Color::White)),
      UploadState::Uploading => Line::styled("Uploading…", Style::default().fg(Color::Yellow)),
      UploadState::Processing { task_id, status } => Line::styled(
        format!(
          "Ingesting (task {}): {}",
          task_id,
          status.map(|s| format!("{:?}", s).to_lowercase()).unwrap_or_else(|| "queued".into())
        ),
        Style::default().fg(Color::Yellow),
      ),
      UploadState::Completed {
        task_id,
        rows_ingested,
      } => Line::styled(
        match rows_ingested {
          Some(rows) => format!("Completed (task {}): {} rows ingested", task_id, rows),
          None => format!("Completed (task {})", task_id),
        },
        Style::default().fg(Color::Green).bold(),
      ),
      UploadState::Failed { message } => Line::styled(
        format!("Failed: {}", message),
        Style::default().fg(Color::Red),
      ),
    }
  }
}

impl View for UploadView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Enter => self.submit(),
      KeyCode::Char('c') => {
        self.uploader.clear();
        ViewAction::None
      }
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let file_line = match self.uploader.file() {
      Some(file) => Line::from(vec![
        Span::styled(" File: ", Style::default().fg(Color::DarkGray)),
        Span::styled(file.file_name.clone(), Style::default().fg(Color::Cyan)),
        Span::styled(
          format!("  ({:.1} KB)", file.size_bytes as f64 / 1024.0),
          Style::default().fg(Color::DarkGray),
        ),
      ]),
      None => Line::styled(" File: -", Style::default().fg(Color::DarkGray)),
    };

    let mut state = self.state_line();
    state.spans.insert(0, Span::raw(" "));

    let hint = if self.uploader.can_submit() {
      " Enter: upload   c: clear"
    } else if self.uploader.can_retry() {
      " Enter: retry   c: clear"
    } else if self.uploader.is_busy() {
      " Polling ingestion status…"
    } else {
      " :upload <path> to choose a CSV or Excel file"
    };

    let text = vec![
      file_line,
      Line::raw(""),
      state,
      Line::raw(""),
      Line::styled(hint, Style::default().fg(Color::DarkGray)),
    ];

    let paragraph = Paragraph::new(text).wrap(Wrap { trim: false }).block(
      Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Upload sales data "),
    );
    frame.render_widget(paragraph, area);
  }

  fn title(&self) -> &'static str {
    "Upload"
  }

  fn tick(&mut self) -> ViewAction {
    let Some(events) = self.events.as_mut() else {
      return ViewAction::None;
    };

    let mut action = ViewAction::None;
    loop {
      match events.try_recv() {
        Ok(UploadEvent::Uploaded(result)) => self.uploader.upload_finished(result),
        Ok(UploadEvent::Status(result)) => {
          if self.uploader.status_received(result) {
            let rows_ingested = match self.uploader.state() {
              UploadState::Completed { rows_ingested, .. } => *rows_ingested,
              _ => None,
            };
            action = ViewAction::IngestCompleted { rows_ingested };
          }
        }
        Err(mpsc::error::TryRecvError::Empty) => break,
        Err(mpsc::error::TryRecvError::Disconnected) => {
          self.events = None;
          break;
        }
      }
    }
    action
  }

  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("enter", "upload").with_priority(20),
      ShortcutInfo::new("c", "clear").with_priority(30),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn test_select_missing_file_reports_error() {
    let api = ApiClient::new(&Config::default()).unwrap();
    let mut view = UploadView::new(api, "sales", Duration::from_millis(1));
    let action = view.select(Path::new("/nonexistent/salescope/april.csv"));
    assert!(matches!(action, ViewAction::Status(msg) if msg.contains("april.csv")));
    assert_eq!(view.uploader().state(), &UploadState::Idle);
  }

  #[tokio::test]
  async fn test_completed_ingest_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/api/ingest/upload"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-3"})))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/ingest/status/t-3"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "task_id": "t-3",
        "status": "completed",
        "rows_ingested": 7
      })))
      .mount(&server)
      .await;

    let dir = std::env::temp_dir().join(format!("salescope-upload-view-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("apr.csv");
    std::fs::write(&file, "branch,total\n").unwrap();

    let mut config = Config::default();
    config.api.base_url = server.uri();
    let mut view = UploadView::new(ApiClient::new(&config).unwrap(), "sales", Duration::from_millis(1));

    view.select(&file);
    assert_eq!(view.handle_key(KeyEvent::from(KeyCode::Enter)), ViewAction::None);

    let mut completions = Vec::new();
    for _ in 0..100 {
      tokio::time::sleep(Duration::from_millis(10)).await;
      match view.tick() {
        ViewAction::None => {}
        other => completions.push(other),
      }
      if view.events.is_none() {
        break;
      }
    }

    assert_eq!(
      completions,
      vec![ViewAction::IngestCompleted {
        rows_ingested: Some(7)
      }]
    );
    std::fs::remove_dir_all(&dir).ok();
  }
}
