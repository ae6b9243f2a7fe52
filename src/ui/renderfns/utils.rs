use chrono::{DateTime, Utc};
use ratatui::prelude::Color;

use crate::cache::CacheSource;

/// Truncate a string to a maximum length in chars, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Format an amount with thousands separators and no decimals
pub fn format_currency(amount: f64) -> String {
  let rounded = amount.round();
  let digits = format!("{:.0}", rounded.abs());
  let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  if rounded < 0.0 {
    format!("-{}", out)
  } else {
    out
  }
}

/// Format a percentage, "n/a" when unknown
pub fn format_pct(value: Option<f64>) -> String {
  match value {
    Some(v) if v > 0.0 => format!("+{:.1}%", v),
    Some(v) => format!("{:.1}%", v),
    None => "n/a".to_string(),
  }
}

pub fn growth_color(value: Option<f64>) -> Color {
  match value {
    Some(v) if v > 0.0 => Color::Green,
    Some(v) if v < 0.0 => Color::Red,
    _ => Color::White,
  }
}

/// Label and color describing where displayed data came from
pub fn source_label(
  source: CacheSource,
  cached_at: Option<DateTime<Utc>>,
  now: DateTime<Utc>,
) -> (String, Color) {
  let age = cached_at.map(|at| {
    let minutes = (now - at).num_minutes().max(0);
    if minutes < 1 {
      "just now".to_string()
    } else if minutes < 60 {
      format!("{}m ago", minutes)
    } else {
      format!("{}h ago", minutes / 60)
    }
  });

  match source {
    CacheSource::Network => ("live".to_string(), Color::Green),
    CacheSource::CacheFresh => (
      format!("cached {}", age.unwrap_or_default()).trim_end().to_string(),
      Color::Cyan,
    ),
    CacheSource::Offline => (
      format!("offline, cached {}", age.unwrap_or_default())
        .trim_end()
        .to_string(),
      Color::Yellow,
    ),
  }
}
