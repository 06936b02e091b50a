use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// A keyboard shortcut hint for display in the header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
  pub key: &'static str,
  pub label: &'static str,
  pub priority: u8, // Lower = shown first
}

impl Shortcut {
  pub const fn new(key: &'static str, label: &'static str) -> Self {
    Self {
      key,
      label,
      priority: 100,
    }
  }

  pub const fn with_priority(mut self, priority: u8) -> Self {
    self.priority = priority;
    self
  }
}

/// Actions that a view can request in response to user input
pub enum ViewAction {
  /// No action needed
  None,
  /// Push a new view onto the stack
  Push(Box<dyn View>),
  /// Replace the current view, e.g. a create form with the created record
  Replace(Box<dyn View>),
  /// Pop current view from stack (go back)
  Pop,
}

impl std::fmt::Debug for ViewAction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ViewAction::None => f.write_str("None"),
      ViewAction::Push(view) => write!(f, "Push({})", view.route()),
      ViewAction::Replace(view) => write!(f, "Replace({})", view.route()),
      ViewAction::Pop => f.write_str("Pop"),
    }
  }
}

/// Trait for view behavior
///
/// Views handle their own input modes (search, edit, confirm) and return
/// actions for the App to execute: App → View → Components.
///
/// Views that load data hold pollable handles from `crate::data` and poll
/// them in `tick()`.
pub trait View {
  /// Handle a key event, returning an action for App to execute
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction;

  /// Render the view to the frame
  fn render(&mut self, frame: &mut Frame, area: Rect);

  /// Get the breadcrumb label for this view
  fn breadcrumb_label(&self) -> String;

  /// Location of this view, e.g. `/properties/7`
  fn route(&self) -> String;

  /// Called on each tick to poll async handles. A view may ask to be
  /// closed or replaced here, e.g. once a save completes.
  fn tick(&mut self) -> ViewAction {
    ViewAction::None
  }

  /// True while the view owns the keyboard (text entry, confirmation), so
  /// global keys like `:` are passed through to it
  fn captures_input(&self) -> bool {
    false
  }

  /// Get keyboard shortcuts to display in the header
  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
