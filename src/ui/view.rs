use crossterm::event::KeyEvent;
use ratatui::prelude::*;

use crate::filters::FilterState;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone)]
pub struct ShortcutInfo {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl ShortcutInfo {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// What a view asks the App to do after input or a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
  /// No action needed
  None,
  /// Show a message in the status line
  Status(String),
  /// An upload finished ingesting; dashboard data is now out of date
  IngestCompleted { rows_ingested: Option<u64> },
}

/// Trait for screen behavior
///
/// Views that load data asynchronously use `Query<T>` internally and poll it
/// in `tick()`. Filter changes arrive through `on_filters_changed`, which
/// moves the query to the new key.
pub trait View {
  /// Handle a key event the App did not consume
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Screen title for the header
  fn title(&self) -> &'static str;

  /// Called on each tick to poll async work
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// The global filters changed
  fn on_filters_changed(&mut self, _filters: &FilterState) {}

  /// Fetch again, from the cache when fresh
  fn refresh(&mut self) {}

  /// Fetch again from the network, keeping current data on screen
  fn revalidate(&mut self) {}

  /// Branch names seen in the loaded data
  fn branch_names(&self) -> Vec<String> {
    Vec::new()
  }

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<ShortcutInfo> {
    vec![
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("[ ]", "month").with_priority(20),
      ShortcutInfo::new("r", "refresh").with_priority(30),
      ShortcutInfo::new("q", "quit").with_priority(90),
    ]
  }
}
