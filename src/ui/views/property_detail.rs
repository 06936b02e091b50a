use crate::api::{EntityId, Property};
use crate::data::{MutationEvent, PropertyWithParent};
use crate::format::{format_area, format_currency, format_date_str};
use crate::query::Query;
use crate::services::Services;
use crate::ui::components::{Confirm, KeyResult};
use crate::ui::renderfns::status_color;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{PropertyFormView, PropertyListView, TenantFormView, TenantListView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// One property, with its parent resolved when it is a unit
pub struct PropertyDetailView {
  services: Services,
  id: EntityId,
  data: PropertyWithParent,
  events: broadcast::Receiver<MutationEvent<Property>>,
  confirm: Confirm,
  delete: Option<Query<EntityId>>,
  notice: Option<String>,
  deleted: bool,
}

impl PropertyDetailView {
  pub fn new(services: Services, id: EntityId) -> Self {
    Self {
      data: PropertyWithParent::new(id, &services.api, &services.properties)
        .reporting_to(&services.reporter),
      events: services.property_events.subscribe(),
      services,
      id,
      confirm: Confirm::default(),
      delete: None,
      notice: None,
      deleted: false,
    }
  }

  fn label(&self) -> String {
    self
      .data
      .property()
      .map(|p| p.display_name().to_string())
      .unwrap_or_else(|| format!("Property #{}", self.id))
  }

  fn parent_line(&self) -> Option<Line<'static>> {
    let property = self.data.property()?;
    if !property.is_unit() {
      return None;
    }
    let value = if let Some(parent) = self.data.parent() {
      Span::raw(format!("{} ({})", parent.display_name(), parent.full_address()))
    } else if self.data.is_parent_loading() {
      Span::styled("loading...", Style::default().fg(Color::DarkGray))
    } else if let Some(error) = self.data.parent_error() {
      Span::styled(error.to_string(), Style::default().fg(Color::Red))
    } else {
      Span::styled("none", Style::default().fg(Color::DarkGray))
    };
    Some(field("Parent", value))
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let title = if self.data.is_loading() {
      format!(" {} (loading...) ", self.label())
    } else if self.data.error().is_some() {
      format!(" {} (error) ", self.label())
    } else {
      format!(" {} ", self.label())
    };

    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if self.deleted {
      let paragraph = Paragraph::new("This property has been deleted. Press 'q' to go back.")
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, inner);
      return;
    }

    let Some(property) = self.data.property() else {
      let (text, color) = match self.data.error() {
        Some(error) if error.is_not_found() => (
          format!("Property #{} does not exist. Press 'q' to go back.", self.id),
          Color::Red,
        ),
        Some(error) => (format!("{}\n\nPress 'r' to retry.", error), Color::Red),
        None => ("Loading property...".to_string(), Color::DarkGray),
      };
      frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(color)),
        inner,
      );
      return;
    };

    let dim = |s: &str| Span::styled(s.to_string(), Style::default().fg(Color::DarkGray));
    let count = |n: Option<String>| n.map(Span::raw).unwrap_or_else(|| dim("-"));

    let mut lines = vec![
      field("Address", Span::raw(property.full_address())),
      field("Type", Span::raw(property.property_type.label())),
    ];
    lines.extend(self.parent_line());
    lines.extend([
      field(
        "Status",
        Span::styled(
          property.status.as_str(),
          Style::default().fg(status_color(property.status)),
        ),
      ),
      field("Active", Span::raw(if property.is_active { "yes" } else { "no" })),
      field("Bedrooms", count(property.bedrooms.map(|b| b.to_string()))),
      field("Bathrooms", count(property.bathrooms.map(|b| b.to_string()))),
      field("Area", count(property.square_feet.map(format_area))),
      field("Rent", count(property.monthly_rent.map(format_currency))),
      field("Created", count(property.created_at.as_deref().map(format_date_str))),
      field("Updated", count(property.updated_at.as_deref().map(format_date_str))),
    ]);

    if let Some(notice) = &self.notice {
      lines.push(Line::default());
      lines.push(Line::from(Span::styled(
        notice.clone(),
        Style::default().fg(Color::Yellow),
      )));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
  }

  fn drain_events(&mut self) {
    loop {
      match self.events.try_recv() {
        Ok(MutationEvent::Updated(p)) if p.id == self.id => self.data.set_property(p),
        Ok(MutationEvent::Deleted(id)) if id == self.id => self.deleted = true,
        Ok(_) => {}
        Err(TryRecvError::Lagged(_)) => self.data.refetch(),
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
  }
}

fn field(label: &str, value: Span<'static>) -> Line<'static> {
  Line::from(vec![
    Span::styled(format!("{:<12}", label), Style::default().fg(Color::DarkGray)),
    value,
  ])
}

impl View for PropertyDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.confirm.handle_key(key) {
      KeyResult::Event(true) => {
        self.delete = Some(self.services.property_writer().delete(self.id));
        return ViewAction::None;
      }
      KeyResult::Event(false) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
      return ViewAction::Pop;
    }
    if self.deleted {
      return ViewAction::None;
    }

    match key.code {
      KeyCode::Char('r') => {
        self.notice = None;
        self.data.refetch();
        return ViewAction::None;
      }
      KeyCode::Char('d') if self.data.property().is_some() => {
        self.confirm.ask(format!("Delete {}?", self.label()));
        return ViewAction::None;
      }
      _ => {}
    }

    let services = self.services.clone();
    let next: Box<dyn View> = match (key.code, self.data.property(), self.data.parent()) {
      (KeyCode::Char('e'), Some(p), _) => Box::new(PropertyFormView::edit(services, p)),
      (KeyCode::Char('u'), Some(p), _) if !p.is_unit() => {
        Box::new(PropertyListView::units_of(services, p))
      }
      (KeyCode::Char('a'), Some(p), _) if !p.is_unit() => {
        Box::new(PropertyFormView::unit_of(services, p))
      }
      (KeyCode::Char('t'), Some(p), _) => {
        let label = p.display_name().to_string();
        Box::new(TenantListView::for_property(services, p.id, label))
      }
      (KeyCode::Char('n'), Some(p), _) => Box::new(TenantFormView::for_property(services, p.id)),
      (KeyCode::Char('p'), _, Some(parent)) => {
        Box::new(PropertyDetailView::new(services, parent.id))
      }
      _ => return ViewAction::None,
    };
    ViewAction::Push(next)
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
    self.confirm.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.label()
  }

  fn route(&self) -> String {
    format!("/properties/{}", self.id)
  }

  fn tick(&mut self) -> ViewAction {
    self.drain_events();
    self.data.poll();

    if let Some(delete) = self.delete.as_mut() {
      if delete.poll() {
        // Already gone on the server counts as deleted
        let gone = delete.error().map_or(delete.is_done(), |e| e.is_not_found());
        self.notice = delete.error().map(ToString::to_string);
        self.delete = None;
        if gone {
          return ViewAction::Pop;
        }
      }
    }
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.confirm.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    let mut shortcuts = vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("e", "edit").with_priority(20),
      Shortcut::new("t", "tenants").with_priority(30),
      Shortcut::new("d", "delete").with_priority(60),
      Shortcut::new("r", "refresh").with_priority(70),
      Shortcut::new("q", "back").with_priority(90),
    ];
    match self.data.property() {
      Some(p) if p.is_unit() => shortcuts.push(Shortcut::new("p", "parent").with_priority(25)),
      Some(_) => {
        shortcuts.push(Shortcut::new("u", "units").with_priority(25));
        shortcuts.push(Shortcut::new("a", "add unit").with_priority(26));
      }
      None => {}
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::data::entity::tests::poll_until;
  use crate::services::tests::services_for;
  use crate::ui::testing::render_view;
  use crossterm::event::KeyModifiers;
  use serde_json::json;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn settle(view: &mut PropertyDetailView) {
    poll_until(view, |v| {
      v.tick();
      !v.data.is_loading() && !v.data.is_parent_loading()
    })
    .await;
  }

  #[tokio::test]
  async fn test_unit_shows_parent_and_formatted_fields() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/7"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 7,
        "name": "Apt 2B",
        "address": "10 Elm St",
        "property_type": "UNIT",
        "parent_property_id": 3,
        "square_feet": 1500.5,
        "monthly_rent": "1250.00",
        "created_at": "2024-01-01T09:30:00"
      })))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/3"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 3, "name": "Elm Building", "address": "10 Elm St"
      })))
      .expect(1)
      .mount(&server)
      .await;

    let mut view = PropertyDetailView::new(services_for(&server.uri()), 7);
    settle(&mut view).await;

    let screen = render_view(&mut view, 90, 20);
    assert!(screen.contains("Apt 2B"), "{}", screen);
    assert!(screen.contains("Elm Building"));
    assert!(screen.contains("1,501 sqft"));
    assert!(screen.contains("$1,250"));
    assert!(screen.contains("January 1, 2024"));
    assert_eq!(view.route(), "/properties/7");

    match view.handle_key(key(KeyCode::Char('p'))) {
      ViewAction::Push(parent) => assert_eq!(parent.route(), "/properties/3"),
      other => panic!("expected push, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_missing_property_shows_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/99"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let mut view = PropertyDetailView::new(services_for(&server.uri()), 99);
    settle(&mut view).await;

    let screen = render_view(&mut view, 80, 10);
    assert!(screen.contains("Property #99 does not exist"), "{}", screen);
    assert!(!screen.contains("retry"));
  }

  #[tokio::test]
  async fn test_server_error_offers_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/98"))
      .respond_with(ResponseTemplate::new(503).set_body_string("maintenance window"))
      .mount(&server)
      .await;

    let mut view = PropertyDetailView::new(services_for(&server.uri()), 98);
    settle(&mut view).await;

    let screen = render_view(&mut view, 80, 10);
    assert!(screen.contains("Failed to load property: maintenance window"), "{}", screen);
    assert!(screen.contains("Press 'r' to retry."));
  }

  #[tokio::test]
  async fn test_update_elsewhere_refreshes_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/4"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": 4, "name": "Old Name", "address": "4 Main St"
      })))
      .mount(&server)
      .await;

    let services = services_for(&server.uri());
    let mut view = PropertyDetailView::new(services.clone(), 4);
    settle(&mut view).await;

    let renamed: Property =
      serde_json::from_value(json!({"id": 4, "name": "New Name", "address": "4 Main St"})).unwrap();
    services
      .property_events
      .publish(MutationEvent::Updated(renamed));
    view.tick();

    assert_eq!(view.breadcrumb_label(), "New Name");
  }
}
