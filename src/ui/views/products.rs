use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Row, Table};

use super::page::PageBody;
use crate::api::ProductsPage;
use crate::ui::renderfns::{format_currency, truncate};

impl PageBody for ProductsPage {
  const TITLE: &'static str = "Products";

  fn render(&self, frame: &mut Frame, area: Rect, scroll: usize) {
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::DarkGray))
      .title(format!(" Products ({}) ", self.product_analytics.len()));

    if self.product_analytics.is_empty() {
      let empty = Paragraph::new(" No product sales in range")
        .style(Style::default().fg(Color::DarkGray))
        .block(block);
      frame.render_widget(empty, area);
      return;
    }

    let mut products: Vec<_> = self.product_analytics.iter().collect();
    products.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));

    let header = Row::new(["Product", "Line", "Units", "Revenue", "Margin"])
      .style(Style::default().fg(Color::Cyan).bold());
    let rows: Vec<Row> = products
      .into_iter()
      .skip(scroll)
      .map(|p| {
        Row::new(vec![
          truncate(&p.product, 28),
          truncate(p.product_line.as_deref().unwrap_or("-"), 20),
          p.units_sold.to_string(),
          format_currency(p.revenue),
          p.margin_pct
            .map(|m| format!("{:.1}%", m))
            .unwrap_or_else(|| "-".to_string()),
        ])
      })
      .collect();

    let table = Table::new(
      rows,
      [
        Constraint::Min(16),
        Constraint::Length(20),
        Constraint::Length(8),
        Constraint::Length(14),
        Constraint::Length(8),
      ],
    )
    .header(header)
    .block(block);
    frame.render_widget(table, area);
  }

  fn rows(&self) -> usize {
    self.product_analytics.len()
  }
}
