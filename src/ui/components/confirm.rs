use super::KeyResult;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Yes/no prompt shown before destructive actions.
#[derive(Debug, Clone, Default)]
pub struct Confirm {
  prompt: Option<String>,
}

impl Confirm {
  pub fn ask(&mut self, prompt: impl Into<String>) {
    self.prompt = Some(prompt.into());
  }

  pub fn is_active(&self) -> bool {
    self.prompt.is_some()
  }

  /// `Event(true)` on y, `Event(false)` on n or Esc. Other keys are swallowed
  /// while the prompt is open.
  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<bool> {
    if self.prompt.is_none() {
      return KeyResult::NotHandled;
    }
    match key.code {
      KeyCode::Char('y') | KeyCode::Char('Y') => {
        self.prompt = None;
        KeyResult::Event(true)
      }
      KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
        self.prompt = None;
        KeyResult::Event(false)
      }
      _ => KeyResult::Handled,
    }
  }

  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    let Some(prompt) = &self.prompt else {
      return;
    };

    let width = (prompt.chars().count() as u16 + 4).clamp(30, 70).min(area.width);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(5) / 2;
    let overlay_area = Rect::new(x, y, width, 5).intersection(area);

    frame.render_widget(Clear, overlay_area);
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Red))
      .title(" Confirm ");

    let text = vec![
      Line::from(prompt.as_str()),
      Line::from(vec![
        Span::styled("y", Style::default().fg(Color::Cyan)),
        Span::styled(" yes   ", Style::default().fg(Color::DarkGray)),
        Span::styled("n", Style::default().fg(Color::Cyan)),
        Span::styled(" no", Style::default().fg(Color::DarkGray)),
      ]),
    ];
    frame.render_widget(
      Paragraph::new(text).block(block).wrap(Wrap { trim: true }),
      overlay_area,
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_confirm_flow() {
    let mut confirm = Confirm::default();
    assert_eq!(confirm.handle_key(key(KeyCode::Char('y'))), KeyResult::NotHandled);

    confirm.ask("Delete Oak Court?");
    assert_eq!(confirm.handle_key(key(KeyCode::Char('d'))), KeyResult::Handled);
    assert_eq!(confirm.handle_key(key(KeyCode::Char('y'))), KeyResult::Event(true));
    assert!(!confirm.is_active());

    confirm.ask("Delete Oak Court?");
    assert_eq!(confirm.handle_key(key(KeyCode::Esc)), KeyResult::Event(false));
  }
}
