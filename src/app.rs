use crate::commands::Command;
use crate::event::{Event, EventHandler};
use crate::services::Services;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult};
use crate::ui::renderfns::{draw_footer, draw_header};
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{PropertyFormView, PropertyListView, TenantFormView, TenantListView};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::time::Duration;
use tracing::{debug, info};

const TICK_RATE: Duration = Duration::from_millis(250);

/// Screen shown at startup and by the `:properties` / `:tenants` commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RootView {
  #[default]
  Properties,
  Tenants,
}

impl RootView {
  fn build(self, services: &Services) -> Box<dyn View> {
    match self {
      RootView::Properties => Box::new(PropertyListView::new(services.clone())),
      RootView::Tenants => Box::new(TenantListView::new(services.clone())),
    }
  }
}

/// Main application state
pub struct App {
  services: Services,
  /// Navigation stack - root is always at index 0
  view_stack: Vec<Box<dyn View>>,
  command: CommandInput,
  /// Shown in the footer until the next key press
  message: Option<String>,
  should_quit: bool,
}

impl App {
  pub fn new(services: Services, root: RootView) -> Self {
    let root = root.build(&services);
    Self {
      services,
      view_stack: vec![root],
      command: CommandInput::new(),
      message: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    install_restore_hook();
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    info!(route = %self.route(), "ui started");
    let result = self.event_loop(&mut terminal).await;

    restore_terminal()?;
    info!("ui stopped");
    result
  }

  async fn event_loop<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
    let mut events = EventHandler::new(TICK_RATE);
    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      match events.next().await {
        Some(event) => self.handle_event(event),
        None => break,
      }
    }
    Ok(())
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }

  /// Route of the view on top of the stack
  pub fn route(&self) -> String {
    self
      .view_stack
      .last()
      .map(|v| v.route())
      .unwrap_or_default()
  }

  pub fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      // Next draw uses the new size
      Event::Resize(..) => {}
    }
  }

  fn tick(&mut self) {
    let action = match self.view_stack.last_mut() {
      Some(view) => view.tick(),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }
    self.message = None;

    let view_owns_keys = self.view_stack.last().is_some_and(|v| v.captures_input());
    if !view_owns_keys {
      match self.command.handle_key(key) {
        KeyResult::Event(CommandEvent::Run(cmd)) => return self.run_command(cmd),
        KeyResult::Event(CommandEvent::Unknown(input)) => {
          self.message = Some(format!("Unknown command: {}", input));
          return;
        }
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled => return,
        KeyResult::NotHandled => {}
      }
    }

    let action = match self.view_stack.last_mut() {
      Some(view) => view.handle_key(key),
      None => ViewAction::None,
    };
    self.apply(action);
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => return,
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Replace(view) => {
        self.view_stack.pop();
        self.view_stack.push(view);
      }
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
    debug!(route = %self.route(), depth = self.view_stack.len(), "navigated");
  }

  fn run_command(&mut self, cmd: &Command) {
    debug!(command = cmd.name, "running command");
    match cmd.name {
      "properties" => self.reset_to(RootView::Properties),
      "tenants" => self.reset_to(RootView::Tenants),
      "new-property" => self.apply(ViewAction::Push(Box::new(PropertyFormView::new(
        self.services.clone(),
      )))),
      "new-tenant" => self.apply(ViewAction::Push(Box::new(TenantFormView::new(
        self.services.clone(),
      )))),
      "quit" => self.should_quit = true,
      other => self.message = Some(format!("Unknown command: {}", other)),
    }
  }

  fn reset_to(&mut self, root: RootView) {
    self.view_stack = vec![root.build(&self.services)];
    debug!(route = %self.route(), "switched root view");
  }

  fn breadcrumb(&self) -> Vec<String> {
    self.view_stack.iter().map(|v| v.breadcrumb_label()).collect()
  }

  pub fn draw(&mut self, frame: &mut Frame) {
    let [header_area, content_area, footer_area] = Layout::vertical([
      Constraint::Length(1),
      Constraint::Min(1),
      Constraint::Length(1),
    ])
    .areas(frame.area());

    let breadcrumb = self.breadcrumb();
    let Some(view) = self.view_stack.last_mut() else {
      return;
    };

    draw_header(
      frame,
      header_area,
      &self.services.title,
      &view.route(),
      &view.shortcuts(),
    );
    view.render(frame, content_area);
    draw_footer(frame, footer_area, &breadcrumb, self.message.as_deref());

    self.command.render_overlay(frame, content_area);
  }
}

fn restore_terminal() -> Result<()> {
  disable_raw_mode()?;
  stdout().execute(LeaveAlternateScreen)?;
  Ok(())
}

/// Leave the alternate screen before any panic report is printed.
fn install_restore_hook() {
  let previous = std::panic::take_hook();
  std::panic::set_hook(Box::new(move |info| {
    let _ = restore_terminal();
    previous(info);
  }));
}
