use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use super::page::PageBody;
use crate::api::{SalespeoplePage, SalespersonPerformance};
use crate::ui::renderfns::{format_currency, truncate};

/// Salespeople ordered by total sales, best first
fn leaderboard(page: &SalespeoplePage) -> Vec<&SalespersonPerformance> {
  let mut ranked: Vec<_> = page.salesperson_performance.iter().collect();
  ranked.sort_by(|a, b| {
    b.total_sales
      .total_cmp(&a.total_sales)
      .then_with(|| a.salesperson.cmp(&b.salesperson))
  });
  ranked
}

impl PageBody for SalespeoplePage {
  const TITLE: &'static str = "Salespeople";

  fn render(&self, frame: &mut Frame, area: Rect, scroll: usize) {
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray))
      .title(" Leaderboard ");

    if self.salesperson_performance.is_empty() {
      let empty = Paragraph::new(" No salesperson data in range")
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
      frame.render_widget(empty, area);
      return;
    }

    let header = Row::new(["#", "Salesperson", "Branch", "Sales", "Deals", "Target"])
      .style(Style::default().fg(Color::Cyan).bold());
    let rows: Vec<Row> = leaderboard(self)
      .into_iter()
      .enumerate()
      .skip(scroll)
      .map(|(rank, s)| {
        let target = match s.target_achievement_pct {
          Some(pct) => Cell::from(format!("{:.0}%", pct)).style(Style::default().fg(
            if pct >= 100.0 {
              Color::Green
            } else {
              Color::Yellow
            },
          )),
          None => Cell::from("-"),
        };
        Row::new(vec![
          Cell::from((rank + 1).to_string()),
          Cell::from(truncate(&s.salesperson, 24)),
          Cell::from(truncate(s.branch.as_deref().unwrap_or("-"), 16)),
          Cell::from(format_currency(s.total_sales)),
          Cell::from(s.deals.to_string()),
          target,
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Length(4),
        Constraint::Min(16),
        Constraint::Length(16),
        Constraint::Length(14),
        Constraint::Length(7),
        Constraint::Length(7),
      ],
    )
    .header(header)
    .block(block);
    frame.render_widget(table, area);
  }

  fn rows(&self) -> usize {
    self.salesperson_performance.len()
  }

  fn branch_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .salesperson_performance
      .iter()
      .filter_map(|s| s.branch.clone())
      .collect();
    names.sort();
    names.dedup();
    names
  }
}
