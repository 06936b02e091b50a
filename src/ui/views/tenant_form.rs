use crate::api::{EntityId, Tenant};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::TenantDetailView;
use crate::validation::TenantDraft;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

/// Create or edit a tenant and their lease
pub struct TenantFormView {
  services: Services,
  editing: Option<EntityId>,
  form: Form,
  save: Option<Query<Tenant>>,
}

impl TenantFormView {
  pub fn new(services: Services) -> Self {
    Self::with_draft(services, None, TenantDraft::default())
  }

  pub fn for_property(services: Services, property_id: EntityId) -> Self {
    Self::with_draft(services, None, TenantDraft::for_property(property_id))
  }

  pub fn edit(services: Services, tenant: &Tenant) -> Self {
    Self::with_draft(services, Some(tenant.id), TenantDraft::from_tenant(tenant))
  }

  fn with_draft(services: Services, editing: Option<EntityId>, draft: TenantDraft) -> Self {
    let form = Form::new(vec![
      FormField::text("first_name", "First name", draft.first_name),
      FormField::text("last_name", "Last name", draft.last_name),
      FormField::text("property_id", "Property id", draft.property_id),
      FormField::text("lease_start", "Lease start", draft.lease_start),
      FormField::text("lease_end", "Lease end", draft.lease_end),
      FormField::text("monthly_rent", "Monthly rent", draft.monthly_rent),
      FormField::text("deposit", "Deposit", draft.deposit),
      FormField::text("payment_day", "Payment day", draft.payment_day),
    ]);
    Self {
      services,
      editing,
      form,
      save: None,
    }
  }

  fn draft(&self) -> TenantDraft {
    let get = |key: &str| self.form.value(key).to_string();
    TenantDraft {
      first_name: get("first_name"),
      last_name: get("last_name"),
      property_id: get("property_id"),
      lease_start: get("lease_start"),
      lease_end: get("lease_end"),
      monthly_rent: get("monthly_rent"),
      deposit: get("deposit"),
      payment_day: get("payment_day"),
    }
  }

  fn submit(&mut self) {
    if self.save.as_ref().is_some_and(Query::is_loading) {
      return;
    }

    let draft = self.draft();
    let writer = self.services.tenant_writer();
    let result = match self.editing {
      Some(id) => draft.to_update().map(|payload| writer.update(id, payload)),
      None => draft.validate().map(|payload| writer.create(payload)),
    };

    match result {
      Ok(query) => {
        self.form.clear_errors();
        self.save = Some(query);
      }
      Err(errors) => self.form.set_errors(errors),
    }
  }

  fn title(&self) -> &'static str {
    match self.editing {
      Some(_) => "Edit tenant",
      None => "New tenant",
    }
  }

  fn status_line(&self) -> Option<Line<'static>> {
    if !self.form.errors().is_empty() {
      return Some(Line::styled(
        self.form.errors().to_string(),
        Style::default().fg(Color::Red),
      ));
    }
    match self.save.as_ref().map(Query::state) {
      Some(QueryState::Loading) => Some(Line::styled("Saving...", Style::default().fg(Color::Yellow))),
      Some(QueryState::Failed(e)) => Some(Line::styled(e.to_string(), Style::default().fg(Color::Red))),
      _ => None,
    }
  }
}

impl View for TenantFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submit) => self.submit(),
      KeyResult::Event(FormEvent::Cancel) => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let status = self.status_line();
    let title = self.title();
    self.form.render(frame, area, title, status);
  }

  fn breadcrumb_label(&self) -> String {
    self.title().to_string()
  }

  fn route(&self) -> String {
    match self.editing {
      Some(id) => format!("/tenants/{}/edit", id),
      None => "/tenants/new".to_string(),
    }
  }

  fn tick(&mut self) -> ViewAction {
    let Some(save) = self.save.as_mut() else {
      return ViewAction::None;
    };
    if !save.poll() {
      return ViewAction::None;
    }
    match (save.data(), self.editing) {
      (Some(_), Some(_)) => ViewAction::Pop,
      (Some(created), None) => ViewAction::Replace(Box::new(TenantDetailView::new(
        self.services.clone(),
        created.id,
      ))),
      (None, _) => ViewAction::None,
    }
  }

  fn captures_input(&self) -> bool {
    self.form.is_editing()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("enter", "edit").with_priority(10),
      Shortcut::new("s", "save").with_priority(20),
      Shortcut::new("esc", "cancel").with_priority(90),
    ]
  }
}
