use crate::api::{EntityId, Property, Tenant};
use crate::data::{EntityQuery, MutationEvent};
use crate::format::{format_currency, format_date, format_date_str};
use crate::query::Query;
use crate::services::Services;
use crate::ui::components::{Confirm, KeyResult};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::{PropertyDetailView, TenantFormView};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// One tenant and the property they lease
pub struct TenantDetailView {
  services: Services,
  id: EntityId,
  tenant: EntityQuery<Tenant>,
  /// Follows `tenant.property_id`; inert until the tenant is known
  property: EntityQuery<Property>,
  events: broadcast::Receiver<MutationEvent<Tenant>>,
  confirm: Confirm,
  delete: Option<Query<EntityId>>,
  notice: Option<String>,
}

impl TenantDetailView {
  pub fn new(services: Services, id: EntityId) -> Self {
    let tenant =
      EntityQuery::new(Some(id), &services.api, &services.tenants).reporting_to(&services.reporter);
    let property = EntityQuery::new(
      tenant.entity().map(|t| t.property_id),
      &services.api,
      &services.properties,
    )
    .reporting_to(&services.reporter);
    Self {
      events: services.tenant_events.subscribe(),
      services,
      id,
      tenant,
      property,
      confirm: Confirm::default(),
      delete: None,
      notice: None,
    }
  }

  /// Point the property handle at the tenant's current property.
  fn sync_property(&mut self) {
    let wanted = self.tenant.entity().map(|t| t.property_id);
    if wanted != self.property.id() {
      self.property = EntityQuery::new(wanted, &self.services.api, &self.services.properties)
        .reporting_to(&self.services.reporter);
    }
  }

  fn label(&self) -> String {
    self
      .tenant
      .entity()
      .map(Tenant::full_name)
      .unwrap_or_else(|| format!("Tenant #{}", self.id))
  }

  fn render_detail(&self, frame: &mut Frame, area: Rect) {
    let title = if self.tenant.is_loading() {
      format!(" {} (loading...) ", self.label())
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

    let Some(tenant) = self.tenant.entity() else {
      let (text, color) = match self.tenant.error() {
        Some(error) if error.is_not_found() => (
          format!("Tenant #{} does not exist. Press 'q' to go back.", self.id),
          Color::Red,
        ),
        Some(error) => (format!("{}\n\nPress 'r' to retry.", error), Color::Red),
        None => ("Loading tenant...".to_string(), Color::DarkGray),
      };
      frame.render_widget(Paragraph::new(text).style(Style::default().fg(color)), inner);
      return;
    };

    let property = match (self.property.entity(), self.property.error()) {
      (Some(p), _) => Span::raw(format!("{} ({})", p.display_name(), p.full_address())),
      (None, Some(e)) => Span::styled(e.to_string(), Style::default().fg(Color::Red)),
      (None, None) => Span::styled("loading...", Style::default().fg(Color::DarkGray)),
    };

    let mut lines = vec![
      field("Property", property),
      field(
        "Lease",
        Span::raw(format!(
          "{} to {}",
          format_date(tenant.lease_start),
          format_date(tenant.lease_end)
        )),
      ),
      field("Rent", Span::raw(format_currency(tenant.monthly_rent))),
      field("Deposit", Span::raw(format_currency(tenant.deposit))),
      field("Payment day", Span::raw(tenant.payment_day.to_string())),
    ];
    if let Some(created) = &tenant.created_at {
      lines.push(field("Created", Span::raw(format_date_str(created))));
    }
    if let Some(notice) = &self.notice {
      lines.push(Line::default());
      lines.push(Line::styled(notice.clone(), Style::default().fg(Color::Yellow)));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
  }
}

fn field(label: &str, value: Span<'static>) -> Line<'static> {
  Line::from(vec![
    Span::styled(format!("{:<12}", label), Style::default().fg(Color::DarkGray)),
    value,
  ])
}

impl View for TenantDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.confirm.handle_key(key) {
      KeyResult::Event(true) => {
        self.delete = Some(self.services.tenant_writer().delete(self.id));
        return ViewAction::None;
      }
      KeyResult::Event(false) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('q') | KeyCode::Esc => ViewAction::Pop,
      KeyCode::Char('r') => {
        self.notice = None;
        self.tenant.refetch();
        ViewAction::None
      }
      KeyCode::Char('d') if self.tenant.entity().is_some() => {
        self.confirm.ask(format!("Delete tenant {}?", self.label()));
        ViewAction::None
      }
      KeyCode::Char('e') => match self.tenant.entity() {
        Some(t) => ViewAction::Push(Box::new(TenantFormView::edit(self.services.clone(), t))),
        None => ViewAction::None,
      },
      KeyCode::Char('p') => match self.property.id() {
        Some(id) => ViewAction::Push(Box::new(PropertyDetailView::new(self.services.clone(), id))),
        None => ViewAction::None,
      },
      _ => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_detail(frame, area);
    self.confirm.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    self.label()
  }

  fn route(&self) -> String {
    format!("/tenants/{}", self.id)
  }

  fn tick(&mut self) -> ViewAction {
    loop {
      match self.events.try_recv() {
        Ok(MutationEvent::Updated(t)) if t.id == self.id => self.tenant.set_entity(t),
        Ok(MutationEvent::Deleted(id)) if id == self.id => return ViewAction::Pop,
        Ok(_) => {}
        Err(TryRecvError::Lagged(_)) => self.tenant.refetch(),
        Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
      }
    }

    self.tenant.poll();
    self.sync_property();
    self.property.poll();

    if let Some(delete) = self.delete.as_mut() {
      if delete.poll() {
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
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("e", "edit").with_priority(20),
      Shortcut::new("p", "property").with_priority(30),
      Shortcut::new("d", "delete").with_priority(60),
      Shortcut::new("r", "refresh").with_priority(70),
      Shortcut::new("q", "back").with_priority(90),
    ]
  }
}
