use super::KeyResult;
use crate::commands::{self, Command};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph};

/// Events emitted by the command line that the App handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
  /// Command submitted, with the suggestion applied and arguments kept
  Submitted(String),
  Cancelled,
}

/// `:` command line with autocomplete overlay
#[derive(Debug, Clone, Default)]
pub struct CommandLine {
  buffer: String,
  active: bool,
  selected_suggestion: usize,
}

impl CommandLine {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.active
  }

  pub fn value(&self) -> &str {
    &self.buffer
  }

  pub fn activate(&mut self) {
    self.active = true;
    self.reset();
  }

  pub fn suggestions(&self) -> Vec<&'static Command> {
    commands::get_suggestions(&self.buffer)
  }

  /// Handle a key event. Handles activation with `:` too.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<CommandEvent> {
    if !self.active {
      if key.code == KeyCode::Char(':') {
        self.activate();
        return KeyResult::Handled;
      }
      return KeyResult::NotHandled;
    }

    match key.code {
      KeyCode::Esc => {
        self.active = false;
        self.reset();
        KeyResult::Event(CommandEvent::Cancelled)
      }
      KeyCode::Enter => {
        self.active = false;
        let cmd = self.resolve_command();
        self.reset();
        KeyResult::Event(CommandEvent::Submitted(cmd))
      }
      KeyCode::Tab | KeyCode::Down => {
        let count = self.suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + 1) % count;
        }
        KeyResult::Handled
      }
      KeyCode::BackTab | KeyCode::Up => {
        let count = self.suggestions().len();
        if count > 0 {
          self.selected_suggestion = (self.selected_suggestion + count - 1) % count;
        }
        KeyResult::Handled
      }
      KeyCode::Backspace => {
        self.buffer.pop();
        self.selected_suggestion = 0;
        KeyResult::Handled
      }
      KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
        self.reset();
        KeyResult::Handled
      }
      KeyCode::Char(c) => {
        self.buffer.push(c);
        self.selected_suggestion = 0;
        KeyResult::Handled
      }
      _ => KeyResult::Handled,
    }
  }

  fn reset(&mut self) {
    self.buffer.clear();
    self.selected_suggestion = 0;
  }

  /// The typed line with its command word replaced by the selected suggestion
  fn resolve_command(&self) -> String {
    match self.suggestions().get(self.selected_suggestion) {
      Some(cmd) => commands::complete(&self.buffer, cmd),
      None => self.buffer.trim().to_string(),
    }
  }

  /// Render the command overlay if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.active {
      return;
    }

    let suggestions = self.suggestions();
    let shown = suggestions.len().min(8);

    let width = (area.width * 60 / 100).clamp(30, 72).min(area.width);
    let height = (3 + shown as u16).min(area.height);
    let overlay_area = Rect::new(area.x + 1, area.y + 1, width.saturating_sub(1), height);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(" Command ");
    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    if inner.height == 0 {
      return;
    }

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Length(1), Constraint::Min(0)])
      .split(inner);

    let input_line = Line::from(vec![
      Span::styled(":", Style::default().fg(Color::Yellow)),
      Span::raw(self.buffer.as_str()),
      Span::styled("_", Style::default().fg(Color::Yellow)),
    ]);
    frame.render_widget(Paragraph::new(input_line), chunks[0]);

    if shown == 0 || chunks[1].height == 0 {
      return;
    }

    let items: Vec<ListItem> = suggestions
      .iter()
      .take(shown)
      .map(|cmd| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<13}", cmd.name), Style::default().fg(Color::Cyan)),
          Span::styled(cmd.description, Style::default().fg(Color::DarkGray)),
        ]))
      })
      .collect();

    let list =
      List::new(items).highlight_style(Style::default().bg(Color::DarkGray).fg(Color::White));
    let mut state = ListState::default();
    state.select(Some(self.selected_suggestion.min(shown - 1)));
    frame.render_stateful_widget(list, chunks[1], &mut state);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn press(line: &mut CommandLine, code: KeyCode) -> KeyResult<CommandEvent> {
    line.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
  }

  fn type_str(line: &mut CommandLine, s: &str) {
    for c in s.chars() {
      press(line, KeyCode::Char(c));
    }
  }

  #[test]
  fn test_colon_activates() {
    let mut line = CommandLine::new();
    assert_eq!(press(&mut line, KeyCode::Char('x')), KeyResult::NotHandled);
    assert_eq!(press(&mut line, KeyCode::Char(':')), KeyResult::Handled);
    assert!(line.is_active());
  }

  #[test]
  fn test_submit_completes_command_and_keeps_arguments() {
    let mut line = CommandLine::new();
    line.activate();
    type_str(&mut line, "bra Nairobi");
    assert_eq!(
      press(&mut line, KeyCode::Enter),
      KeyResult::Event(CommandEvent::Submitted("branch Nairobi".into()))
    );
    assert!(!line.is_active());
    assert_eq!(line.value(), "");
  }

  #[test]
  fn test_tab_cycles_suggestions() {
    let mut line = CommandLine::new();
    line.activate();
    type_str(&mut line, "bran");
    // "branch" then "branches" by prefix order
    press(&mut line, KeyCode::Tab);
    assert_eq!(
      press(&mut line, KeyCode::Enter),
      KeyResult::Event(CommandEvent::Submitted("branches".into()))
    );
  }

  #[test]
  fn test_unknown_word_submitted_as_typed() {
    let mut line = CommandLine::new();
    line.activate();
    type_str(&mut line, "zzz 1");
    assert_eq!(
      press(&mut line, KeyCode::Enter),
      KeyResult::Event(CommandEvent::Submitted("zzz 1".into()))
    );
  }

  #[test]
  fn test_escape_cancels() {
    let mut line = CommandLine::new();
    line.activate();
    type_str(&mut line, "reset");
    assert_eq!(
      press(&mut line, KeyCode::Esc),
      KeyResult::Event(CommandEvent::Cancelled)
    );
    assert!(!line.is_active());
  }
}
