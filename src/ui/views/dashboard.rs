use ratatui::prelude::*;
use ratatui::widgets::{BarChart, Block, Borders, Cell, Gauge, Paragraph, Row, Table};

use super::page::PageBody;
use crate::api::DashboardPage;
use crate::ui::renderfns::{format_currency, format_pct, growth_color, truncate};

impl PageBody for DashboardPage {
  const TITLE: &'static str = "Dashboard";

  fn render(&self, frame: &mut Frame, area: Rect, scroll: usize) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(4), // KPI cards
        Constraint::Length(3), // Target gauge
        Constraint::Min(6),    // Chart + branches
      ])
      .split(area);

    draw_cards(self, frame, rows[0]);
    draw_target(self, frame, rows[1]);

    let bottom = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
      .split(rows[2]);
    draw_monthly_chart(self, frame, bottom[0]);
    draw_branches(self, frame, bottom[1], scroll);
  }

  fn rows(&self) -> usize {
    self.branch_performance.len()
  }

  fn branch_names(&self) -> Vec<String> {
    self
      .branch_performance
      .iter()
      .map(|b| b.branch.clone())
      .collect()
  }
}

fn draw_cards(page: &DashboardPage, frame: &mut Frame, area: Rect) {
  let summary = &page.revenue_summary;
  let cards = [
    ("Total sales", format_currency(summary.total_sales)),
    ("Gross profit", format_currency(summary.gross_profit)),
    ("Transactions", format_currency(summary.transactions as f64)),
    ("Average sale", format_currency(summary.average_sale)),
  ];

  let columns = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Ratio(1, 4); 4])
    .split(area);

  for ((label, value), column) in cards.into_iter().zip(columns.iter()) {
    let card = Paragraph::new(Line::styled(
      format!(" {}", value),
      Style::default().fg(Color::White).bold(),
    ))
    .block(
      Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", label)),
    );
    frame.render_widget(card, *column);
  }
}

fn draw_target(page: &DashboardPage, frame: &mut Frame, area: Rect) {
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
    .title(" Target achievement ");

  let Some(pct) = page.revenue_summary.target_achievement_pct else {
    let empty = Paragraph::new(" No target data").style(Style::default().fg(Color::DarkGray));
    frame.render_widget(empty.block(block), area);
    return;
  };

  let color = if pct >= 100.0 {
    Color::Green
  } else if pct >= 75.0 {
    Color::Yellow
  } else {
    Color::Red
  };
  let gauge = Gauge::default()
    .block(block)
    .gauge_style(Style::default().fg(color).bg(Color::Black))
    .ratio((pct / 100.0).clamp(0.0, 1.0))
    .label(format!("{:.1}% of target", pct));
  frame.render_widget(gauge, area);
}

fn draw_monthly_chart(page: &DashboardPage, frame: &mut Frame, area: Rect) {
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
    .title(" Monthly sales (thousands) ");

  if page.monthly_sales_growth.is_empty() {
    let empty = Paragraph::new(" No sales in range").style(Style::default().fg(Color::DarkGray));
    frame.render_widget(empty.block(block), area);
    return;
  }

  // Keep the most recent months that fit
  let fits = (area.width.saturating_sub(2) / 7).max(1) as usize;
  let months = &page.monthly_sales_growth;
  let recent = &months[months.len().saturating_sub(fits)..];

  let labels: Vec<String> = recent.iter().map(|m| month_label(&m.month)).collect();
  let data: Vec<(&str, u64)> = labels
    .iter()
    .zip(recent)
    .map(|(label, m)| (label.as_str(), (m.sales.max(0.0) / 1000.0).round() as u64))
    .collect();

  let chart = BarChart::default()
    .block(block)
    .data(data.as_slice())
    .bar_width(6)
    .bar_gap(1)
    .bar_style(Style::default().fg(Color::Cyan))
    .value_style(Style::default().fg(Color::Black).bg(Color::Cyan));
  frame.render_widget(chart, area);
}

/// "2024-03" and "2024-03-01" become "24-03"
fn month_label(month: &str) -> String {
  let mut parts = month.split('-');
  match (parts.next(), parts.next()) {
    (Some(year), Some(m)) if year.len() == 4 => format!("{}-{}", &year[2..], m),
    _ => truncate(month, 6),
  }
}

fn draw_branches(page: &DashboardPage, frame: &mut Frame, area: Rect, scroll: usize) {
  let header = Row::new(["Branch", "Sales", "Growth"])
    .style(Style::default().fg(Color::Cyan).bold());

  let rows: Vec<Row> = page
    .branch_performance
    .iter()
    .skip(scroll)
    .map(|b| {
      Row::new(vec![
        Cell::from(truncate(&b.branch, 18)),
        Cell::from(format_currency(b.total_sales)),
        Cell::from(format_pct(b.growth_pct)).style(Style::default().fg(growth_color(b.growth_pct))),
      ])
    })
    .collect();

  let table = Table::new(
    rows,
    [
      Constraint::Min(10),
      Constraint::Length(14),
      Constraint::Length(8),
    ],
  )
  .header(header)
  .block(
    Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray))
      .title(" Branches "),
  );
  frame.render_widget(table, area);
}
