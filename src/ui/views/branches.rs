use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};
use std::collections::{BTreeMap, BTreeSet};

use super::page::PageBody;
use crate::api::{BranchesPage, HeatmapCell};
use crate::ui::renderfns::{format_currency, format_pct, growth_color, truncate};

/// Branch x product line sales grid
struct Heatmap<'a> {
  branches: Vec<&'a str>,
  lines: Vec<&'a str>,
  sales: BTreeMap<(&'a str, &'a str), f64>,
  max: f64,
}

impl<'a> Heatmap<'a> {
  fn build(cells: &'a [HeatmapCell]) -> Self {
    let mut branches = BTreeSet::new();
    let mut lines = BTreeSet::new();
    let mut sales = BTreeMap::new();
    for cell in cells {
      branches.insert(cell.branch.as_str());
      lines.insert(cell.product_line.as_str());
      *sales
        .entry((cell.branch.as_str(), cell.product_line.as_str()))
        .or_insert(0.0) += cell.sales;
    }
    let max = sales.values().copied().fold(0.0, f64::max);
    Self {
      branches: branches.into_iter().collect(),
      lines: lines.into_iter().collect(),
      sales,
      max,
    }
  }

  fn get(&self, branch: &'a str, line: &'a str) -> Option<f64> {
    self.sales.get(&(branch, line)).copied()
  }

  /// Share of the busiest cell, bucketed into five shades
  fn shade(&self, value: f64) -> Color {
    if self.max <= 0.0 {
      return Color::DarkGray;
    }
    match ((value / self.max) * 4.0).round() as u8 {
      0 => Color::DarkGray,
      1 => Color::Blue,
      2 => Color::Cyan,
      3 => Color::Green,
      _ => Color::Yellow,
    }
  }
}

impl PageBody for BranchesPage {
  const TITLE: &'static str = "Branches";

  fn render(&self, frame: &mut Frame, area: Rect, scroll: usize) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
      .split(area);

    draw_performance(self, frame, chunks[0], scroll);
    draw_heatmap(self, frame, chunks[1]);
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

fn draw_performance(page: &BranchesPage, frame: &mut Frame, area: Rect, scroll: usize) {
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
    .title(" Branch performance ");

  if page.branch_performance.is_empty() {
    let empty = Paragraph::new(" No branch data in range")
      .style(Style::default().fg(Color::DarkGray))
      .block(block);
    frame.render_widget(empty, area);
    return;
  }

  let header = Row::new(["Branch", "Sales", "Transactions", "Avg sale", "Growth"])
    .style(Style::default().fg(Color::Cyan).bold());
  let rows: Vec<Row> = page
    .branch_performance
    .iter()
    .skip(scroll)
    .map(|b| {
      Row::new(vec![
        Cell::from(truncate(&b.branch, 20)),
        Cell::from(format_currency(b.total_sales)),
        Cell::from(b.transactions.to_string()),
        Cell::from(format_currency(b.average_sale)),
        Cell::from(format_pct(b.growth_pct)).style(Style::default().fg(growth_color(b.growth_pct))),
      ])
    })
    .collect();

  let table = Table::new(
    rows,
    [
      Constraint::Min(12),
      Constraint::Length(14),
      Constraint::Length(13),
      Constraint::Length(12),
      Constraint::Length(8),
    ],
  )
  .header(header)
  .block(block);
  frame.render_widget(table, area);
}

fn draw_heatmap(page: &BranchesPage, frame: &mut Frame, area: Rect) {
  let block = Block::default()
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray))
    .title(" Sales by branch and product line ");

  let heatmap = Heatmap::build(&page.branch_product_heatmap);
  if heatmap.branches.is_empty() {
    let empty = Paragraph::new(" No heatmap data in range")
      .style(Style::default().fg(Color::DarkGray))
      .block(block);
    frame.render_widget(empty, area);
    return;
  }

  let header = Row::new(
    std::iter::once(String::new()).chain(heatmap.lines.iter().map(|l| truncate(l, 12))),
  )
  .style(Style::default().fg(Color::Cyan).bold());

  let rows: Vec<Row> = heatmap
    .branches
    .iter()
    .map(|branch| {
      let cells = heatmap.lines.iter().map(|line| match heatmap.get(*branch, *line) {
        Some(value) => Cell::from(format_currency(value))
          .style(Style::default().fg(Color::Black).bg(heatmap.shade(value))),
        None => Cell::from("-").style(Style::default().fg(Color::DarkGray)),
      });
      Row::new(std::iter::once(Cell::from(truncate(branch, 14))).chain(cells))
    })
    .collect();

  let widths = std::iter::once(Constraint::Length(14))
    .chain(heatmap.lines.iter().map(|_| Constraint::Length(12)))
    .collect::<Vec<_>>();

  let table = Table::new(rows, widths).header(header).block(block);
  frame.render_widget(table, area);
}

#[cfg(test)]
mod tests {
  use super::*;

  fn cell(branch: &str, line: &str, sales: f64) -> HeatmapCell {
    HeatmapCell {
      branch: branch.into(),
      product_line: line.into(),
      sales,
    }
  }

  #[test]
  fn test_heatmap_grid() {
    let cells = vec![
      cell("Nairobi", "Sports", 100.0),
      cell("Kisumu", "Food", 10.0),
      cell("Nairobi", "Sports", 60.0),
    ];
    let heatmap = Heatmap::build(&cells);
    assert_eq!(heatmap.branches, vec!["Kisumu", "Nairobi"]);
    assert_eq!(heatmap.lines, vec!["Food", "Sports"]);
    assert_eq!(heatmap.get("Nairobi", "Sports"), Some(160.0));
    assert_eq!(heatmap.get("Kisumu", "Sports"), None);
    assert_eq!(heatmap.shade(160.0), Color::Yellow);
    assert_eq!(heatmap.shade(10.0), Color::DarkGray);
  }
}
