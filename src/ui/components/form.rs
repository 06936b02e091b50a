//! Field-by-field editor shared by the property and tenant forms.

use super::input::{InputResult, TextInput};
use super::KeyResult;
use crate::validation::ValidationErrors;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
  Text,
  /// One of a fixed set of values, cycled with Enter
  Choice(&'static [&'static str]),
  /// "yes" or "no"
  Toggle,
}

#[derive(Debug, Clone)]
pub struct FormField {
  pub key: &'static str,
  pub label: &'static str,
  pub kind: FieldKind,
  pub value: String,
}

impl FormField {
  pub fn text(key: &'static str, label: &'static str, value: impl Into<String>) -> Self {
    Self {
      key,
      label,
      kind: FieldKind::Text,
      value: value.into(),
    }
  }

  pub fn choice(
    key: &'static str,
    label: &'static str,
    options: &'static [&'static str],
    value: &str,
  ) -> Self {
    Self {
      key,
      label,
      kind: FieldKind::Choice(options),
      value: value.to_string(),
    }
  }

  pub fn toggle(key: &'static str, label: &'static str, value: bool) -> Self {
    Self {
      key,
      label,
      kind: FieldKind::Toggle,
      value: yes_no(value).to_string(),
    }
  }
}

fn yes_no(value: bool) -> &'static str {
  if value {
    "yes"
  } else {
    "no"
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
  Submit,
  Cancel,
  /// A field value changed
  Changed(&'static str),
}

pub struct Form {
  fields: Vec<FormField>,
  state: ListState,
  editing: Option<TextInput>,
  errors: ValidationErrors,
}

impl Form {
  pub fn new(fields: Vec<FormField>) -> Self {
    Self {
      fields,
      state: ListState::default().with_selected(Some(0)),
      editing: None,
      errors: ValidationErrors::default(),
    }
  }

  /// Value of a field, `None` when the form has no such field.
  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|f| f.key == key)
      .map(|f| f.value.as_str())
  }

  pub fn value(&self, key: &str) -> &str {
    self.get(key).unwrap_or("")
  }

  pub fn flag(&self, key: &str) -> bool {
    self.value(key) == "yes"
  }

  pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
    if let Some(field) = self.fields.iter_mut().find(|f| f.key == key) {
      field.value = value.into();
    }
  }

  pub fn is_editing(&self) -> bool {
    self.editing.is_some()
  }

  pub fn errors(&self) -> &ValidationErrors {
    &self.errors
  }

  pub fn set_errors(&mut self, errors: ValidationErrors) {
    // Jump to the first invalid field
    if let Some(first) = errors.iter().next() {
      if let Some(idx) = self.fields.iter().position(|f| f.key == first.path) {
        self.state.select(Some(idx));
      }
    }
    self.errors = errors;
  }

  pub fn clear_errors(&mut self) {
    self.errors = ValidationErrors::default();
  }

  fn selected(&self) -> usize {
    self.state.selected().unwrap_or(0).min(self.fields.len().saturating_sub(1))
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<FormEvent> {
    if let Some(input) = self.editing.as_mut() {
      return match input.handle_key(key) {
        InputResult::Submitted(value) => {
          self.editing = None;
          let idx = self.selected();
          match self.fields.get_mut(idx) {
            Some(field) => {
              field.value = value;
              KeyResult::Event(FormEvent::Changed(field.key))
            }
            None => KeyResult::Handled,
          }
        }
        InputResult::Cancelled => {
          self.editing = None;
          KeyResult::Handled
        }
        _ => KeyResult::Handled,
      };
    }

    match key.code {
      KeyCode::Char('s') => KeyResult::Event(FormEvent::Submit),
      KeyCode::Char('q') | KeyCode::Esc => KeyResult::Event(FormEvent::Cancel),
      KeyCode::Char('j') | KeyCode::Down | KeyCode::Tab => {
        let next = (self.selected() + 1).min(self.fields.len().saturating_sub(1));
        self.state.select(Some(next));
        KeyResult::Handled
      }
      KeyCode::Char('k') | KeyCode::Up | KeyCode::BackTab => {
        self.state.select(Some(self.selected().saturating_sub(1)));
        KeyResult::Handled
      }
      KeyCode::Enter | KeyCode::Char(' ') => self.activate_selected(),
      _ => KeyResult::NotHandled,
    }
  }

  fn activate_selected(&mut self) -> KeyResult<FormEvent> {
    let idx = self.selected();
    let Some(field) = self.fields.get_mut(idx) else {
      return KeyResult::Handled;
    };

    match field.kind {
      FieldKind::Text => {
        self.editing = Some(TextInput::with_value(field.value.clone()));
        KeyResult::Handled
      }
      FieldKind::Choice(options) => {
        let pos = options.iter().position(|o| *o == field.value);
        let next = pos.map(|p| (p + 1) % options.len()).unwrap_or(0);
        if let Some(option) = options.get(next) {
          field.value = option.to_string();
        }
        KeyResult::Event(FormEvent::Changed(field.key))
      }
      FieldKind::Toggle => {
        field.value = yes_no(field.value != "yes").to_string();
        KeyResult::Event(FormEvent::Changed(field.key))
      }
    }
  }

  /// Draw the fields, with inline errors and an optional status line.
  pub fn render(&mut self, frame: &mut Frame, area: Rect, title: &str, status: Option<Line>) {
    let block = Block::default()
      .title(format!(" {} ", title))
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [fields_area, status_area] =
      Layout::vertical([Constraint::Min(1), Constraint::Length(2)]).areas(inner);

    let selected = self.selected();
    let items: Vec<ListItem> = self
      .fields
      .iter()
      .enumerate()
      .map(|(idx, field)| {
        let mut spans = vec![Span::styled(
          format!("{:<16}", field.label),
          Style::default().fg(Color::DarkGray),
        )];

        match (&self.editing, idx == selected) {
          (Some(input), true) => {
            let (before, after) = input.split_at_cursor();
            spans.push(Span::raw(before.to_string()));
            spans.push(Span::styled("_", Style::default().fg(Color::Yellow)));
            spans.push(Span::raw(after.to_string()));
          }
          _ => {
            let style = match field.kind {
              FieldKind::Text => Style::default(),
              _ => Style::default().fg(Color::Cyan),
            };
            spans.push(Span::styled(field.value.clone(), style));
          }
        }

        if let Some(message) = self.errors.get(field.key) {
          spans.push(Span::styled(
            format!("  {}", message),
            Style::default().fg(Color::Red),
          ));
        }
        ListItem::new(Line::from(spans))
      })
      .collect();

    let list = List::new(items)
      .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, fields_area, &mut self.state);

    let hint = Line::from(Span::styled(
      "Enter: edit/cycle  s: save  Esc: cancel",
      Style::default().fg(Color::DarkGray),
    ));
    let lines = match status {
      Some(status) => vec![status, hint],
      None => vec![hint],
    };
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), status_area);
  }
}
