use std::collections::HashMap;

use crate::api::{EntityId, Property, Tenant, TenantFilter};
use crate::data::{EntityQuery, ListController, MutationEvent};
use crate::format::{format_currency, format_date};
use crate::services::Services;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::column;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{TenantDetailView, TenantFormView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Paginated list of tenants, optionally limited to one property
pub struct TenantListView {
  services: Services,
  list: ListController<Tenant>,
  events: broadcast::Receiver<MutationEvent<Tenant>>,
  /// Property of each listed tenant, resolved through the property cache
  properties: HashMap<EntityId, EntityQuery<Property>>,
  list_state: ListState,
  search: SearchInput,
  property: Option<(EntityId, String)>,
}

impl TenantListView {
  pub fn new(services: Services) -> Self {
    let mut list =
      ListController::for_api(&services.api, services.lists).reporting_to(&services.reporter);
    list.load();
    Self::with_list(services, list, None)
  }

  pub fn for_property(services: Services, property_id: EntityId, label: String) -> Self {
    let mut list =
      ListController::for_api(&services.api, services.lists).reporting_to(&services.reporter);
    list.set_filters([TenantFilter::Property(Some(property_id))]);
    list.flush_filters();
    Self::with_list(services, list, Some((property_id, label)))
  }

  fn with_list(
    services: Services,
    list: ListController<Tenant>,
    property: Option<(EntityId, String)>,
  ) -> Self {
    Self {
      events: services.tenant_events.subscribe(),
      services,
      list,
      properties: HashMap::new(),
      list_state: ListState::default(),
      search: SearchInput::new(),
      property,
    }
  }

  fn selected(&self) -> Option<&Tenant> {
    self.list_state.selected().and_then(|idx| self.list.item(idx))
  }

  /// Start resolving properties of newly listed tenants.
  fn resolve_properties(&mut self) {
    if self.property.is_some() {
      return;
    }
    let mut ids: Vec<EntityId> = self
      .list
      .items()
      .map(|t| t.property_id)
      .filter(|id| !self.properties.contains_key(id))
      .collect();
    ids.sort_unstable();
    ids.dedup();
    for id in ids {
      let query = EntityQuery::new(Some(id), &self.services.api, &self.services.properties)
        .reporting_to(&self.services.reporter);
      self.properties.insert(id, query);
    }
  }

  fn property_label(&self, id: EntityId) -> String {
    match self.properties.get(&id) {
      Some(q) if q.entity().is_some() => q
        .entity()
        .map(|p| p.display_name().to_string())
        .unwrap_or_default(),
      Some(q) if q.is_loading() => "...".to_string(),
      _ => format!("#{}", id),
    }
  }

  fn title(&self) -> String {
    let name = match &self.property {
      Some((_, label)) => format!("Tenants of {}", label),
      None => "Tenants".to_string(),
    };
    let search = match &self.list.draft_filters().search {
      Some(s) => format!(" [/{}]", s),
      None => String::new(),
    };
    let state = if self.list.is_loading() || self.list.is_debouncing() {
      "loading...".to_string()
    } else if self.list.has_next_page() && self.list.item_count() > 0 {
      format!("{}+", self.list.item_count())
    } else {
      self.list.item_count().to_string()
    };
    format!(" {}{} ({}) ", name, search, state)
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

    let error = self.list.error().map(|e| format!("{}. Press 'r' to retry.", e));
    let [error_area, header_area, rows_area] = Layout::vertical([
      Constraint::Length(error.is_some() as u16),
      Constraint::Length(1),
      Constraint::Min(1),
    ])
    .areas(inner);

    if let Some(error) = error {
      frame.render_widget(
        Paragraph::new(error).style(Style::default().fg(Color::Red)),
        error_area,
      );
    }

    let header = format!(
      "  {} {} {} {:>10} {}",
      column("NAME", 22),
      column("PROPERTY", 22),
      column("LEASE ENDS", 18),
      "RENT",
      "DUE"
    );
    frame.render_widget(
      Paragraph::new(header).style(Style::default().fg(Color::DarkGray)),
      header_area,
    );

    if len == 0 {
      let content = match (self.list.is_loading(), self.list.error()) {
        (true, _) => "Loading tenants...",
        (false, Some(_)) => "",
        (false, None) => "No tenants found.",
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
      .map(|tenant| {
        let property = match &self.property {
          Some((_, label)) => label.clone(),
          None => self.property_label(tenant.property_id),
        };
        ListItem::new(Line::from(vec![
          Span::styled(column(&tenant.full_name(), 22), Style::default().fg(Color::Cyan)),
          Span::raw(" "),
          Span::raw(column(&property, 22)),
          Span::raw(" "),
          Span::raw(column(&format_date(tenant.lease_end), 18)),
          Span::raw(" "),
          Span::raw(format!("{:>10}", format_currency(tenant.monthly_rent))),
          Span::raw(" "),
          Span::raw(tenant.payment_day.to_string()),
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

    if self.list_state.offset() + rows_area.height as usize >= len {
      self.list.on_sentinel_visible();
    }
  }
}

impl View for TenantListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Changed(query)) => {
        self.list.set_filters([TenantFilter::Search(Some(query))]);
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
      KeyCode::Char('r') => self.list.refetch(),
      KeyCode::Char('n') => {
        let form = match &self.property {
          Some((id, _)) => TenantFormView::for_property(self.services.clone(), *id),
          None => TenantFormView::new(self.services.clone()),
        };
        return ViewAction::Push(Box::new(form));
      }
      KeyCode::Enter => {
        if let Some(tenant) = self.selected() {
          return ViewAction::Push(Box::new(TenantDetailView::new(
            self.services.clone(),
            tenant.id,
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
  }

  fn breadcrumb_label(&self) -> String {
    match &self.property {
      Some((_, label)) => format!("Tenants [{}]", label),
      None => "Tenants".to_string(),
    }
  }

  fn route(&self) -> String {
    match &self.property {
      Some((id, _)) => format!("/properties/{}/tenants", id),
      None => "/tenants".to_string(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    loop {
      match self.events.try_recv() {
        Ok(event) => self.list.apply_mutation(event),
        Err(TryRecvError::Lagged(_)) => self.list.refetch(),
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }
    if self.list.poll() {
      self.resolve_properties();
    }
    for query in self.properties.values_mut() {
      query.poll();
    }
    ViewAction::None
  }

  fn captures_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("/", "search").with_priority(20),
      Shortcut::new("n", "new").with_priority(40),
      Shortcut::new("r", "refresh").with_priority(60),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
