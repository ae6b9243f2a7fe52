use super::KeyResult;
use crate::filters::Branch;
use crate::ui::renderfns::truncate;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Quick branch switcher shown above the page body.
///
/// Slot 0 is "All"; the rest are branch names learned from loaded data
/// plus the configured prefetch list.
#[derive(Debug, Clone, Default)]
pub struct BranchTabs {
  names: Vec<String>,
  selected: usize,
}

impl BranchTabs {
  pub fn new(names: &[String]) -> Self {
    let mut tabs = Self::default();
    tabs.merge(names);
    tabs
  }

  /// The branch under the cursor
  pub fn selected(&self) -> Branch {
    match self.selected {
      0 => Branch::All,
      i => self
        .names
        .get(i - 1)
        .map(|n| Branch::Named(n.clone()))
        .unwrap_or(Branch::All),
    }
  }

  /// Add names not seen before. Returns whether anything was added.
  pub fn merge(&mut self, names: &[String]) -> bool {
    let current = self.selected();
    let before = self.names.len();
    for name in names {
      let name = name.trim();
      if !name.is_empty() && !self.names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        self.names.push(name.to_string());
      }
    }
    if self.names.len() == before {
      return false;
    }
    self.names.sort();
    self.select(&current);
    true
  }

  /// Move the cursor to `branch`, adding it if unknown
  pub fn select(&mut self, branch: &Branch) {
    self.selected = match branch.name() {
      None => 0,
      Some(name) => match self.names.iter().position(|n| n.eq_ignore_ascii_case(name)) {
        Some(i) => i + 1,
        None => {
          self.names.push(name.to_string());
          self.names.len()
        }
      },
    };
  }

  /// PageDown/PageUp cycle through branches
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<Branch> {
    let slots = self.names.len() + 1;
    match key.code {
      KeyCode::PageDown => {
        self.selected = (self.selected + 1) % slots;
        KeyResult::Event(self.selected())
      }
      KeyCode::PageUp => {
        self.selected = (self.selected + slots - 1) % slots;
        KeyResult::Event(self.selected())
      }
      _ => KeyResult::NotHandled,
    }
  }

  pub fn render(&self, frame: &mut Frame, area: Rect) {
    let mut spans = vec![Span::styled(" Branch: ", Style::default().fg(Color::DarkGray))];
    let labels = std::iter::once("All").chain(self.names.iter().map(String::as_str));
    for (i, label) in labels.enumerate() {
      if i > 0 {
        spans.push(Span::styled(" │ ", Style::default().fg(Color::DarkGray)));
      }
      let style = if i == self.selected {
        Style::default().fg(Color::Black).bg(Color::Cyan).bold()
      } else {
        Style::default().fg(Color::White)
      };
      spans.push(Span::styled(truncate(label, 16), style));
    }
    spans.push(Span::styled(
      "   PgUp/PgDn",
      Style::default().fg(Color::DarkGray),
    ));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
  }
}
