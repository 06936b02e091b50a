use crate::api::PropertyStatus;
use ratatui::prelude::Color;

/// Truncate to at most `max_len` chars, ending in "..." when cut
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Truncate and left-align in a column of `width` chars
pub fn column(s: &str, width: usize) -> String {
  format!("{:<width$}", truncate(s, width), width = width)
}

pub fn status_color(status: PropertyStatus) -> Color {
  match status {
    PropertyStatus::Available => Color::Green,
    PropertyStatus::Rented => Color::Cyan,
    PropertyStatus::Maintenance => Color::Yellow,
    PropertyStatus::Unavailable => Color::DarkGray,
  }
}
