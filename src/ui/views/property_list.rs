use crate::api::{EntityId, Property, PropertyFilter, PropertyStatus, PropertyType};
use crate::data::{ListController, MutationEvent};
use crate::format::format_currency;
use crate::query::Query;
use crate::services::Services;
use crate::ui::components::{Confirm, KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{column, status_color};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{PropertyDetailView, PropertyFormView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;

/// Paginated, filterable list of properties
pub struct PropertyListView {
  services: Services,
  list: ListController<Property>,
  events: broadcast::Receiver<MutationEvent<Property>>,
  list_state: ListState,
  search: SearchInput,
  confirm: Confirm,
  /// Units of this property only
  parent: Option<(EntityId, String)>,
  pending_delete: Option<(EntityId, String)>,
  delete: Option<Query<EntityId>>,
  notice: Option<String>,
}

impl PropertyListView {
  pub fn new(services: Services) -> Self {
    let mut list =
      ListController::for_api(&services.api, services.lists).reporting_to(&services.reporter);
    list.load();
    Self::with_list(services, list, None)
  }

  /// Units belonging to `parent`.
  pub fn units_of(services: Services, parent: &Property) -> Self {
    let mut list =
      ListController::for_api(&services.api, services.lists).reporting_to(&services.reporter);
    list.set_filters([
      PropertyFilter::Parent(Some(parent.id)),
      PropertyFilter::Type(Some(PropertyType::Unit)),
    ]);
    list.flush_filters();
    let parent = Some((parent.id, parent.display_name().to_string()));
    Self::with_list(services, list, parent)
  }

  fn with_list(
    services: Services,
    list: ListController<Property>,
    parent: Option<(EntityId, String)>,
  ) -> Self {
    Self {
      events: services.property_events.subscribe(),
      services,
      list,
      list_state: ListState::default(),
      search: SearchInput::new(),
      confirm: Confirm::default(),
      parent,
      pending_delete: None,
      delete: None,
      notice: None,
    }
  }

  fn selected(&self) -> Option<&Property> {
    self.list_state.selected().and_then(|idx| self.list.item(idx))
  }

  fn cycle_status(&mut self) {
    let next = match self.list.draft_filters().status {
      None => Some(PropertyStatus::Available),
      Some(PropertyStatus::Unavailable) => None,
      Some(status) => Some(status.next()),
    };
    self.list.set_filters([PropertyFilter::Status(next)]);
    self.list.flush_filters();
  }

  fn cycle_type(&mut self) {
    let next = match self.list.draft_filters().property_type {
      None => Some(PropertyType::Principal),
      Some(PropertyType::Principal) => Some(PropertyType::Unit),
      Some(PropertyType::Unit) => None,
    };
    self.list.set_filters([PropertyFilter::Type(next)]);
    self.list.flush_filters();
  }

  fn clear_filters(&mut self) {
    let mut fields = vec![
      PropertyFilter::Search(None),
      PropertyFilter::Status(None),
      PropertyFilter::MinPrice(None),
      PropertyFilter::MaxPrice(None),
      PropertyFilter::MinBedrooms(None),
      PropertyFilter::MinBathrooms(None),
    ];
    if self.parent.is_none() {
      fields.push(PropertyFilter::Type(None));
    }
    self.list.set_filters(fields);
    self.list.flush_filters();
  }

  fn filter_summary(&self) -> String {
    let filters = self.list.draft_filters();
    let mut parts = Vec::new();
    if let Some(search) = &filters.search {
      parts.push(format!("/{}", search));
    }
    if let Some(status) = filters.status {
      parts.push(format!("status:{}", status));
    }
    if let (Some(t), None) = (filters.property_type, &self.parent) {
      parts.push(format!("type:{}", t.label().to_lowercase()));
    }
    if parts.is_empty() {
      String::new()
    } else {
      format!(" [{}]", parts.join(" "))
    }
  }

  fn title(&self) -> String {
    let name = match &self.parent {
      Some((_, name)) => format!("Units of {}", name),
      None => "Properties".to_string(),
    };
    let state = if self.list.is_loading() || self.list.is_debouncing() {
      "loading...".to_string()
    } else if self.list.has_next_page() && self.list.item_count() > 0 {
      format!("{}+", self.list.item_count())
    } else {
      self.list.item_count().to_string()
    };
    format!(" {}{} ({}) ", name, self.filter_summary(), state)
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.list.item_count();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let message = self
      .list
      .error()
      .map(|e| (format!("{}. Press 'r' to retry.", e), Color::Red))
      .or_else(|| self.notice.clone().map(|n| (n, Color::Yellow)));

    let [message_area, header_area, rows_area, more_area] = Layout::vertical([
      Constraint::Length(message.is_some() as u16),
      Constraint::Length(1),
      Constraint::Min(1),
      Constraint::Length(self.list.is_fetching_next_page() as u16),
    ])
    .areas(inner);

    if let Some((text, color)) = message {
      frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(color)),
        message_area,
      );
    }

    let header = format!(
      "  {} {} {:>10} {} {}",
      column("NAME", 24),
      column("ADDRESS", 28),
      "RENT",
      column("STATUS", 12),
      "TYPE"
    );
    frame.render_widget(
      Paragraph::new(header).style(Style::default().fg(Color::DarkGray)),
      header_area,
    );

    if len == 0 {
      let content = if self.list.is_loading() {
        "Loading properties..."
      } else if self.list.error().is_some() {
        ""
      } else {
        "No properties found."
      };
      frame.render_widget(
        Paragraph::new(content).style(Style::default().fg(Color::DarkGray)),
        rows_area,
      );
      return;
    }

    let items: Vec<ListItem> = self
      .list
      .items()
      .map(|property| {
        let rent = property
          .monthly_rent
          .map(format_currency)
          .unwrap_or_else(|| "-".to_string());
        let name_style = if property.is_active {
          Style::default().fg(Color::Cyan)
        } else {
          Style::default().fg(Color::DarkGray)
        };

        ListItem::new(Line::from(vec![
          Span::styled(column(property.display_name(), 24), name_style),
          Span::raw(" "),
          Span::raw(column(&property.address, 28)),
          Span::raw(" "),
          Span::raw(format!("{:>10}", rent)),
          Span::raw(" "),
          Span::styled(
            column(property.status.as_str(), 12),
            Style::default().fg(status_color(property.status)),
          ),
          Span::raw(" "),
          Span::raw(property.property_type.label()),
        ]))
      })
      .collect();

    let list = List::new(items)
      .highlight_style(
        Style::default()
          .bg(Color::DarkGray)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");
    frame.render_stateful_widget(list, rows_area, &mut self.list_state);

    if self.list.is_fetching_next_page() {
      frame.render_widget(
        Paragraph::new("Loading more...").style(Style::default().fg(Color::DarkGray)),
        more_area,
      );
    }

    // The last row on screen acts as the sentinel for the next page
    let last_visible = self.list_state.offset() + rows_area.height as usize;
    if last_visible >= len {
      self.list.on_sentinel_visible();
    }
  }

  fn drain_events(&mut self) {
    loop {
      match self.events.try_recv() {
        Ok(event) => self.list.apply_mutation(event),
        Err(TryRecvError::Lagged(skipped)) => {
          debug!(skipped, "property list missed mutations, reloading");
          self.list.refetch();
        }
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
  }

  fn poll_delete(&mut self) {
    let Some(delete) = self.delete.as_mut() else {
      return;
    };
    if !delete.poll() {
      return;
    }
    match delete.error() {
      // Someone else got there first; the row is stale either way
      Some(error) if error.is_not_found() => {
        if let Some((id, name)) = self.pending_delete.take() {
          self.list.remove_item(id);
          self.notice = Some(format!("{} was already deleted", name));
        }
      }
      Some(error) => self.notice = Some(error.to_string()),
      None if delete.is_done() => {
        self.notice = self.pending_delete.take().map(|(_, name)| format!("Deleted {}", name));
      }
      None => {}
    }
    self.delete = None;
  }
}

impl View for PropertyListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.confirm.handle_key(key) {
      KeyResult::Event(true) => {
        if let Some((id, _)) = &self.pending_delete {
          self.delete = Some(self.services.property_writer().delete(*id));
        }
        return ViewAction::None;
      }
      KeyResult::Event(false) => {
        self.pending_delete = None;
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(query)) => {
        self.list.set_filters([PropertyFilter::Search(Some(query))]);
        return ViewAction::None;
      }
      KeyResult::Event(SearchEvent::Submitted) => {
        self.list.flush_filters();
        return ViewAction::None;
      }
      KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Char('r') => {
        self.notice = None;
        self.list.refetch();
      }
      KeyCode::Char('s') => self.cycle_status(),
      KeyCode::Char('t') if self.parent.is_none() => self.cycle_type(),
      KeyCode::Char('c') => self.clear_filters(),
      KeyCode::Char('n') => {
        let form = match &self.parent {
          Some((id, _)) => match self.services.properties.peek(*id) {
            Some(parent) => PropertyFormView::unit_of(self.services.clone(), &parent),
            None => PropertyFormView::new(self.services.clone()),
          },
          None => PropertyFormView::new(self.services.clone()),
        };
        return ViewAction::Push(Box::new(form));
      }
      KeyCode::Char('d') => {
        if let Some(property) = self.selected() {
          let target = (property.id, property.display_name().to_string());
          self.confirm.ask(format!("Delete {}?", target.1));
          self.pending_delete = Some(target);
        }
      }
      KeyCode::Enter => {
        if let Some(property) = self.selected() {
          return ViewAction::Push(Box::new(PropertyDetailView::new(
            self.services.clone(),
            property.id,
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
    self.confirm.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.parent {
      Some((_, name)) => format!("Units [{}]", name),
      None => "Properties".to_string(),
    }
  }

  fn route(&self) -> String {
    match &self.parent {
      Some((id, _)) => format!("/properties/{}/units", id),
      None => "/properties".to_string(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    self.drain_events();
    self.list.poll();
    self.poll_delete();
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.search.is_active() || self.confirm.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("/", "search").with_priority(20),
      Shortcut::new("s", "status").with_priority(30),
      Shortcut::new("t", "type").with_priority(31),
      Shortcut::new("n", "new").with_priority(40),
      Shortcut::new("d", "delete").with_priority(50),
      Shortcut::new("r", "refresh").with_priority(60),
      Shortcut::new("q", "back").with_priority(90),
    ]
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
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  async fn settle(view: &mut PropertyListView) {
    poll_until(view, |v| {
      v.tick();
      !v.list.is_loading() && !v.list.is_debouncing()
    })
    .await;
  }

  #[tokio::test]
  async fn test_renders_rows_and_opens_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
        "id": 1,
        "title": "Test Property",
        "address": "123 Test St",
        "price": 1000,
        "status": "available"
      }])))
      .mount(&server)
      .await;

    let services = services_for(&server.uri());
    let mut view = PropertyListView::new(services);
    settle(&mut view).await;

    let screen = render_view(&mut view, 100, 12);
    assert!(screen.contains("Test Property"), "{}", screen);
    assert!(screen.contains("123 Test St"));
    assert!(screen.contains("$1,000"));
    assert!(screen.contains("Properties (1)"));

    match view.handle_key(key(KeyCode::Enter)) {
      ViewAction::Push(detail) => assert!(detail.route().contains("/properties/1")),
      other => panic!("expected push, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_search_goes_to_search_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/search"))
      .and(query_param("q", "oak"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": 5, "name": "Oak Court", "address": "5 Oak St"}
      ])))
      .expect(1)
      .mount(&server)
      .await;

    let mut view = PropertyListView::new(services_for(&server.uri()));
    settle(&mut view).await;

    view.handle_key(key(KeyCode::Char('/')));
    for c in "oak".chars() {
      view.handle_key(key(KeyCode::Char(c)));
    }
    assert!(view.captures_input());
    view.handle_key(key(KeyCode::Enter));
    settle(&mut view).await;

    assert_eq!(view.list.item(0).map(|p| p.id), Some(5));
    assert!(view.title().contains("/oak"));
  }

  #[tokio::test]
  async fn test_list_error_keeps_screen_usable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties"))
      .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "database unavailable"})))
      .mount(&server)
      .await;

    let mut view = PropertyListView::new(services_for(&server.uri()));
    settle(&mut view).await;

    let screen = render_view(&mut view, 100, 12);
    assert!(screen.contains("Failed to load properties: database unavailable"), "{}", screen);
  }

  #[tokio::test]
  async fn test_confirmed_delete_removes_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": 1, "name": "Keep", "address": "1 Main St"},
        {"id": 2, "name": "Drop", "address": "2 Main St"}
      ])))
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/api/v1/properties/2"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let mut view = PropertyListView::new(services_for(&server.uri()));
    settle(&mut view).await;
    render_view(&mut view, 100, 12);

    view.handle_key(key(KeyCode::Char('j')));
    view.handle_key(key(KeyCode::Char('d')));
    assert!(view.captures_input());
    view.handle_key(key(KeyCode::Char('y')));

    poll_until(&mut view, |v| {
      v.tick();
      v.list.item_count() == 1
    })
    .await;
    assert_eq!(view.list.item(0).map(|p| p.id), Some(1));
    assert_eq!(view.notice.as_deref(), Some("Deleted Drop"));
  }

  #[tokio::test]
  async fn test_delete_of_missing_property_drops_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": 1, "name": "Keep", "address": "1 Main St"},
        {"id": 2, "name": "Gone", "address": "2 Main St"}
      ])))
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path("/api/v1/properties/2"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Property not found"})))
      .mount(&server)
      .await;

    let mut view = PropertyListView::new(services_for(&server.uri()));
    settle(&mut view).await;
    render_view(&mut view, 100, 12);

    view.handle_key(key(KeyCode::Char('j')));
    view.handle_key(key(KeyCode::Char('d')));
    view.handle_key(key(KeyCode::Char('y')));

    poll_until(&mut view, |v| {
      v.tick();
      v.delete.is_none()
    })
    .await;
    assert_eq!(view.list.item_count(), 1);
    assert_eq!(view.notice.as_deref(), Some("Gone was already deleted"));
  }
}
