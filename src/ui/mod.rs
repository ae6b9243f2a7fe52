pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Length(1), // Branch tabs
      Constraint::Min(1),    // Current view
      Constraint::Length(1), // Filters and status
    ])
    .split(frame.area());

  let shortcuts = app.current_view().shortcuts();
  let title = app.current_view().title();
  renderfns::draw_header(
    frame,
    chunks[0],
    app.base_url(),
    title,
    app.data_mode(),
    &shortcuts,
  );

  app.branch_tabs().render(frame, chunks[1]);
  app.current_view_mut().render(frame, chunks[2]);

  let summary = app.filter_summary();
  renderfns::draw_footer(frame, chunks[3], &summary, app.status());

  // Overlay last so it draws on top
  app.command_line().render_overlay(frame, chunks[2]);
}
