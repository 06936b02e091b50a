//! Terminal UI: a stack of views over shared components.

pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use ratatui::widgets::ListState;

/// Keep the selection inside `0..len`, selecting the first row when there
/// is something to select.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match (state.selected(), len) {
    (_, 0) => state.select(None),
    (None, _) => state.select(Some(0)),
    (Some(idx), len) if idx >= len => state.select(Some(len - 1)),
    _ => {}
  }
}
