use crate::api::{EntityId, Property, PropertyStatus, PropertyType};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{Form, FormEvent, FormField, KeyResult};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::PropertyDetailView;
use crate::validation::PropertyDraft;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;

const TYPES: &[&str] = &["PRINCIPAL", "UNIT"];
const STATUSES: &[&str] = &["available", "rented", "maintenance", "unavailable"];

/// Create or edit a property.
///
/// Type and parent can only be chosen when creating; the update payload does
/// not carry them.
pub struct PropertyFormView {
  services: Services,
  editing: Option<EntityId>,
  base: PropertyDraft,
  form: Form,
  save: Option<Query<Property>>,
}

impl PropertyFormView {
  pub fn new(services: Services) -> Self {
    Self::create(services, PropertyDraft::default())
  }

  pub fn unit_of(services: Services, parent: &Property) -> Self {
    Self::create(services, PropertyDraft::unit_of(parent))
  }

  pub fn edit(services: Services, property: &Property) -> Self {
    let base = PropertyDraft::from_property(property);
    let form = Form::new(common_fields(&base));
    Self {
      services,
      editing: Some(property.id),
      base,
      form,
      save: None,
    }
  }

  fn create(services: Services, base: PropertyDraft) -> Self {
    let mut fields = vec![FormField::choice(
      "property_type",
      "Type",
      TYPES,
      base.property_type.as_str(),
    )];
    fields.extend(common_fields(&base));
    fields.push(FormField::text(
      "parent_property_id",
      "Parent id",
      &base.parent_property_id,
    ));

    Self {
      services,
      editing: None,
      form: Form::new(fields),
      base,
      save: None,
    }
  }

  /// Current form contents on top of the starting draft.
  fn draft(&self) -> PropertyDraft {
    let mut draft = self.base.clone();
    let text = |key: &str, slot: &mut String| {
      if let Some(value) = self.form.get(key) {
        *slot = value.to_string();
      }
    };
    text("name", &mut draft.name);
    text("address", &mut draft.address);
    text("city", &mut draft.city);
    text("state", &mut draft.state);
    text("zip_code", &mut draft.zip_code);
    text("bedrooms", &mut draft.bedrooms);
    text("bathrooms", &mut draft.bathrooms);
    text("parent_property_id", &mut draft.parent_property_id);

    if let Some(value) = self.form.get("property_type") {
      draft.property_type = match value {
        "UNIT" => PropertyType::Unit,
        _ => PropertyType::Principal,
      };
    }
    if let Some(value) = self.form.get("status") {
      if let Some(status) = PropertyStatus::ALL.iter().find(|s| s.as_str() == value) {
        draft.status = *status;
      }
    }
    if self.form.get("is_active").is_some() {
      draft.is_active = self.form.flag("is_active");
    }
    draft
  }

  fn submit(&mut self) {
    if self.save.as_ref().is_some_and(Query::is_loading) {
      return;
    }

    let draft = self.draft();
    let writer = self.services.property_writer();
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

  fn title(&self) -> String {
    match (self.editing, self.base.property_type) {
      (Some(_), _) => format!("Edit {}", self.base_label()),
      (None, PropertyType::Unit) => "New unit".to_string(),
      (None, PropertyType::Principal) => "New property".to_string(),
    }
  }

  fn base_label(&self) -> &str {
    if self.base.name.trim().is_empty() {
      &self.base.address
    } else {
      &self.base.name
    }
  }

  fn status_line(&self) -> Option<Line<'static>> {
    let errors = self.form.errors();
    if !errors.is_empty() {
      return Some(Line::styled(
        format!("{} field(s) need attention", errors.len()),
        Style::default().fg(Color::Red),
      ));
    }
    match self.save.as_ref().map(Query::state) {
      Some(QueryState::Loading) => Some(Line::styled(
        "Saving...",
        Style::default().fg(Color::Yellow),
      )),
      Some(QueryState::Failed(e)) => Some(Line::styled(e.to_string(), Style::default().fg(Color::Red))),
      _ => None,
    }
  }
}

fn common_fields(draft: &PropertyDraft) -> Vec<FormField> {
  vec![
    FormField::text("name", "Name", &draft.name),
    FormField::text("address", "Address", &draft.address),
    FormField::text("city", "City", &draft.city),
    FormField::text("state", "State", &draft.state),
    FormField::text("zip_code", "ZIP code", &draft.zip_code),
    FormField::text("bedrooms", "Bedrooms", &draft.bedrooms),
    FormField::text("bathrooms", "Bathrooms", &draft.bathrooms),
    FormField::choice("status", "Status", STATUSES, draft.status.as_str()),
    FormField::toggle("is_active", "Active", draft.is_active),
  ]
}

impl View for PropertyFormView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.form.handle_key(key) {
      KeyResult::Event(FormEvent::Submit) => self.submit(),
      KeyResult::Event(FormEvent::Cancel) => return ViewAction::Pop,
      KeyResult::Event(FormEvent::Changed(field)) => {
        if field == "property_type" {
          self.form.clear_errors();
        }
      }
      KeyResult::Handled | KeyResult::NotHandled => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let title = self.title();
    let status = self.status_line();
    self.form.render(frame, area, &title, status);
  }

  fn breadcrumb_label(&self) -> String {
    self.title()
  }

  fn route(&self) -> String {
    match self.editing {
      Some(id) => format!("/properties/{}/edit", id),
      None => "/properties/new".to_string(),
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
      (Some(created), None) => {
        let detail = PropertyDetailView::new(self.services.clone(), created.id);
        ViewAction::Replace(Box::new(detail))
      }
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
