//! Filtered, paginated list state for one collection.
//!
//! The controller owns the committed filter state, the pages loaded for it,
//! and at most one page request in flight. Filter edits are debounced and
//! pages are requested lazily as the user scrolls towards the end.
//!
//! Rows removed locally (deleted, or updated out of the filter) shift the
//! server's offsets, so later pages are requested that many rows earlier.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError, EntityId, ListFilters, Resource};
use crate::config::ListsConfig;
use crate::query::QueryError;
use crate::telemetry::ErrorReporter;

use super::debounce::Debouncer;
use super::mutation::MutationEvent;

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSettings {
  pub page_size: usize,
  pub debounce: Duration,
}

impl Default for ListSettings {
  fn default() -> Self {
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      debounce: DEFAULT_DEBOUNCE,
    }
  }
}

impl From<&ListsConfig> for ListSettings {
  fn from(config: &ListsConfig) -> Self {
    Self {
      page_size: config.page_size.max(1),
      debounce: Duration::from_millis(config.debounce_ms),
    }
  }
}

/// One page of a filtered collection.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest<F> {
  pub skip: usize,
  pub limit: usize,
  pub filters: F,
}

type PageResult<T> = Result<Vec<T>, ApiError>;

/// Produces the request for one page.
pub type PageFetcher<R> =
  Arc<dyn Fn(PageRequest<<R as Resource>::Filters>) -> BoxFuture<'static, PageResult<R>> + Send + Sync>;

struct PendingPage<T> {
  identity: String,
  page: usize,
  rx: oneshot::Receiver<PageResult<T>>,
}

pub struct ListController<R: Resource> {
  settings: ListSettings,
  fetcher: PageFetcher<R>,
  filters: R::Filters,
  identity: String,
  draft: Debouncer<R::Filters>,
  pages: Vec<Vec<R>>,
  /// Rows dropped from loaded pages since the first page arrived
  removed: usize,
  has_next_page: bool,
  pending: Option<PendingPage<R>>,
  error: Option<QueryError>,
  reporter: ErrorReporter,
}

impl<R: Resource> ListController<R> {
  pub fn new(fetcher: PageFetcher<R>, settings: ListSettings) -> Self {
    let filters = R::Filters::default();
    Self {
      identity: filters.identity(),
      filters,
      draft: Debouncer::new(settings.debounce),
      settings,
      fetcher,
      pages: Vec::new(),
      removed: 0,
      has_next_page: true,
      pending: None,
      error: None,
      reporter: ErrorReporter::disabled(),
    }
  }

  /// Forward page failures to `reporter`.
  pub fn reporting_to(mut self, reporter: &ErrorReporter) -> Self {
    self.reporter = reporter.clone();
    self
  }

  /// Controller backed by the collection endpoint.
  ///
  /// A filter state holding nothing but search text goes to the dedicated
  /// search route.
  pub fn for_api(api: &ApiClient, settings: ListSettings) -> Self {
    let api = api.clone();
    let fetcher: PageFetcher<R> = Arc::new(move |request: PageRequest<R::Filters>| {
      let api = api.clone();
      async move {
        match request.filters.search_only() {
          Some(term) => api.search::<R>(&term, request.skip, request.limit).await,
          None => {
            api
              .list::<R>(request.skip, request.limit, &request.filters)
              .await
          }
        }
      }
      .boxed()
    });
    Self::new(fetcher, settings)
  }

  // -- state --------------------------------------------------------------

  /// Committed filters, the ones the loaded pages belong to.
  pub fn filters(&self) -> &R::Filters {
    &self.filters
  }

  /// Filters as the user is editing them, including uncommitted patches.
  pub fn draft_filters(&self) -> &R::Filters {
    self.draft.pending().unwrap_or(&self.filters)
  }

  pub fn items(&self) -> impl Iterator<Item = &R> {
    self.pages.iter().flatten()
  }

  pub fn item_count(&self) -> usize {
    self.pages.iter().map(Vec::len).sum()
  }

  pub fn item(&self, index: usize) -> Option<&R> {
    self.items().nth(index)
  }

  pub fn pages_loaded(&self) -> usize {
    self.pages.len()
  }

  pub fn has_next_page(&self) -> bool {
    self.has_next_page
  }

  /// First page of the current filters in flight.
  pub fn is_loading(&self) -> bool {
    self.pending.as_ref().is_some_and(|p| p.page == 0)
  }

  pub fn is_fetching_next_page(&self) -> bool {
    self.pending.as_ref().is_some_and(|p| p.page > 0)
  }

  pub fn is_debouncing(&self) -> bool {
    self.draft.is_pending()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.error.as_ref()
  }

  pub fn settings(&self) -> ListSettings {
    self.settings
  }

  // -- commands -----------------------------------------------------------

  /// Queue filter changes. They are committed once the debounce delay passes
  /// without another change.
  pub fn set_filters(&mut self, fields: impl IntoIterator<Item = <R::Filters as ListFilters>::Field>) {
    let mut draft = self.draft_filters().clone();
    for field in fields {
      draft.set(field);
    }
    self.draft.push(draft);
  }

  /// Commit queued filter changes immediately.
  pub fn flush_filters(&mut self) {
    if let Some(filters) = self.draft.pending().cloned() {
      self.draft.cancel();
      self.commit(filters);
    }
  }

  /// Load the first page unless something is loaded or loading.
  pub fn load(&mut self) {
    if self.pages.is_empty() && self.pending.is_none() && self.error.is_none() {
      self.request(0);
    }
  }

  /// Request the next page when more are expected and nothing is in flight.
  ///
  /// Blocked while an error is shown; `refetch` clears it.
  pub fn fetch_next_page(&mut self) {
    if self.pending.is_some() || !self.has_next_page || self.error.is_some() {
      return;
    }
    if self.pages.is_empty() {
      return self.request(0);
    }
    self.request(self.pages.len());
  }

  /// The end of the rendered list came into view.
  pub fn on_sentinel_visible(&mut self) {
    self.fetch_next_page();
  }

  /// Reload from the first page. Loaded pages stay visible until the first
  /// page of the reload replaces them.
  pub fn refetch(&mut self) {
    self.error = None;
    self.request(0);
  }

  /// Patch an item in place without a reload. An item that no longer
  /// passes the committed filters is dropped instead.
  pub fn update_item(&mut self, item: R) {
    let id = item.cache_id();
    if item.excluded_by(&self.filters) {
      debug!(entity = R::entity_type(), id, "updated item left the filter");
      return self.remove_item(id);
    }
    if let Some(slot) = self
      .pages
      .iter_mut()
      .flat_map(|page| page.iter_mut())
      .find(|existing| existing.cache_id() == id)
    {
      *slot = item;
    }
  }

  pub fn remove_item(&mut self, id: EntityId) {
    let before = self.item_count();
    for page in &mut self.pages {
      page.retain(|item| item.cache_id() != id);
    }
    let dropped = before - self.item_count();
    if dropped == 0 {
      return;
    }
    self.removed += dropped;

    // A next page already requested was cut at the old offset
    if let Some(page) = self.pending.as_ref().map(|p| p.page).filter(|&page| page > 0) {
      debug!(entity = R::entity_type(), page, "re-requesting page after removal");
      self.request(page);
    }
  }

  pub fn apply_mutation(&mut self, event: MutationEvent<R>) {
    match event {
      MutationEvent::Created(_) => self.refetch(),
      MutationEvent::Updated(item) => self.update_item(item),
      MutationEvent::Deleted(id) => self.remove_item(id),
    }
  }

  /// Advance debounce timers and collect a finished page.
  ///
  /// Returns true when anything visible changed.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    if let Some(filters) = self.draft.take_ready() {
      changed |= self.commit(filters);
    }

    let Some(pending) = self.pending.as_mut() else {
      return changed;
    };

    let result = match pending.rx.try_recv() {
      Ok(result) => result,
      Err(oneshot::error::TryRecvError::Empty) => return changed,
      Err(oneshot::error::TryRecvError::Closed) => Err(ApiError::Transport("request was dropped".into())),
    };

    let Some(PendingPage { identity, page, .. }) = self.pending.take() else {
      return changed;
    };
    if identity != self.identity {
      debug!(entity = R::entity_type(), page, "ignoring page for previous filters");
      return changed;
    }

    match result {
      Ok(items) => {
        debug!(entity = R::entity_type(), page, count = items.len(), "page loaded");
        self.has_next_page = items.len() >= self.settings.page_size;
        if page == 0 {
          self.pages = vec![items];
          self.removed = 0;
        } else if page == self.pages.len() {
          self.pages.push(items);
        }
      }
      Err(e) => {
        warn!(entity = R::entity_type(), page, error = %e, "page fetch failed");
        let error = QueryError::failed("load", R::PATH, e);
        self
          .reporter
          .capture_error(&format!("{}.list", R::entity_type()), &error);
        self.error = Some(error);
      }
    }
    true
  }

  // -- internals ----------------------------------------------------------

  fn commit(&mut self, filters: R::Filters) -> bool {
    let identity = filters.identity();
    self.filters = filters;
    if identity == self.identity {
      return false;
    }

    debug!(entity = R::entity_type(), filters = ?self.filters, "filters changed");
    self.identity = identity;
    self.pages.clear();
    self.removed = 0;
    self.has_next_page = true;
    self.error = None;
    self.pending = None;
    self.request(0);
    true
  }

  fn request(&mut self, page: usize) {
    let offset = if page == 0 { 0 } else { self.removed };
    let request = PageRequest {
      skip: (page * self.settings.page_size).saturating_sub(offset),
      limit: self.settings.page_size,
      filters: self.filters.clone(),
    };
    let future = (self.fetcher)(request);
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
      // Receiver is gone when the filters changed meanwhile
      let _ = tx.send(future.await);
    });

    self.pending = Some(PendingPage {
      identity: self.identity.clone(),
      page,
      rx,
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{Property, PropertyFilter, PropertyFilters, PropertyStatus};
  use crate::data::entity::tests::client_for;
  use crate::telemetry::tests::{reporter_for, wait_for_requests};
  use serde_json::json;
  use std::sync::Mutex;
  use wiremock::matchers::{method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn property(id: EntityId) -> Property {
    serde_json::from_value(json!({"id": id, "address": format!("{} Main St", id)})).unwrap()
  }

  type Log = Arc<Mutex<Vec<PageRequest<PropertyFilters>>>>;

  /// Fetcher serving `total` items, recording every request.
  fn fake(total: usize) -> (PageFetcher<Property>, Log) {
    let log: Log = Arc::default();
    let seen = log.clone();
    let fetcher: PageFetcher<Property> = Arc::new(move |request: PageRequest<PropertyFilters>| {
      seen.lock().unwrap().push(request.clone());
      let end = total.min(request.skip + request.limit);
      let items: Vec<Property> = (request.skip..end).map(|i| property(i as EntityId + 1)).collect();
      async move { Ok::<_, ApiError>(items) }.boxed()
    });
    (fetcher, log)
  }

  type Rows = Arc<Mutex<Vec<EntityId>>>;

  /// Fetcher paging over a mutable set of server rows.
  fn backed_by(ids: impl IntoIterator<Item = EntityId>) -> (PageFetcher<Property>, Rows, Log) {
    let rows: Rows = Arc::new(Mutex::new(ids.into_iter().collect()));
    let log: Log = Arc::default();
    let (served, seen) = (rows.clone(), log.clone());
    let fetcher: PageFetcher<Property> = Arc::new(move |request: PageRequest<PropertyFilters>| {
      seen.lock().unwrap().push(request.clone());
      let items: Vec<Property> = served
        .lock()
        .unwrap()
        .iter()
        .skip(request.skip)
        .take(request.limit)
        .map(|&id| property(id))
        .collect();
      async move { Ok::<_, ApiError>(items) }.boxed()
    });
    (fetcher, rows, log)
  }

  fn ids(list: &ListController<Property>) -> Vec<EntityId> {
    list.items().map(|p| p.id).collect()
  }

  fn skips(log: &Log) -> Vec<usize> {
    log.lock().unwrap().iter().map(|r| r.skip).collect()
  }

  fn failing() -> PageFetcher<Property> {
    Arc::new(|_: PageRequest<PropertyFilters>| {
      async {
        Err::<Vec<Property>, _>(ApiError::Status {
          status: 500,
          message: "database unavailable".into(),
        })
      }
      .boxed()
    })
  }

  async fn settle(list: &mut ListController<Property>) {
    for _ in 0..50 {
      tokio::task::yield_now().await;
      list.poll();
      if list.pending.is_none() && !list.is_debouncing() {
        return;
      }
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_debounced_patches_issue_one_request() {
    let (fetcher, log) = fake(3);
    let mut list = ListController::new(fetcher, ListSettings::default());

    for term in ["a", "ab", "abc"] {
      list.set_filters([PropertyFilter::Search(Some(term.into()))]);
      tokio::time::advance(Duration::from_millis(100)).await;
      list.poll();
    }
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(list.draft_filters().search.as_deref(), Some("abc"));

    tokio::time::advance(DEFAULT_DEBOUNCE).await;
    settle(&mut list).await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].filters.search.as_deref(), Some("abc"));
    assert_eq!(list.filters().search.as_deref(), Some("abc"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_unchanged_identity_does_not_refetch() {
    let (fetcher, log) = fake(3);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;

    list.set_filters([PropertyFilter::Search(Some("  ".into()))]);
    tokio::time::advance(DEFAULT_DEBOUNCE).await;
    settle(&mut list).await;

    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(list.item_count(), 3);
  }

  #[tokio::test]
  async fn test_short_page_ends_pagination() {
    let (fetcher, log) = fake(30);
    let mut list = ListController::new(fetcher, ListSettings::default());

    list.load();
    settle(&mut list).await;
    for _ in 0..5 {
      list.on_sentinel_visible();
      settle(&mut list).await;
    }

    let log = log.lock().unwrap();
    let skips: Vec<usize> = log.iter().map(|r| r.skip).collect();
    assert_eq!(skips, vec![0, 12, 24]);
    assert!(log.iter().all(|r| r.limit == 12));
    assert_eq!(list.item_count(), 30);
    assert!(!list.has_next_page());
  }

  #[tokio::test]
  async fn test_next_page_blocked_while_in_flight() {
    let (fetcher, log) = fake(30);
    let mut list = ListController::new(fetcher, ListSettings::default());

    list.load();
    list.fetch_next_page();
    list.load();
    assert!(list.is_loading());
    assert_eq!(log.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_failure_sets_error_and_keeps_pages() {
    let (fetcher, _) = fake(30);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;
    assert_eq!(list.item_count(), 12);

    list.fetcher = failing();
    list.fetch_next_page();
    settle(&mut list).await;

    assert_eq!(
      list.error().map(ToString::to_string).as_deref(),
      Some("Failed to load properties: database unavailable")
    );
    assert!(!list.is_loading());
    assert!(!list.is_fetching_next_page());
    assert_eq!(list.item_count(), 12);

    // No retry until the error is cleared
    list.on_sentinel_visible();
    assert!(list.pending.is_none());
  }

  #[tokio::test]
  async fn test_refetch_keeps_old_pages_until_replaced() {
    let (fetcher, log) = fake(30);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;
    list.fetch_next_page();
    settle(&mut list).await;
    assert_eq!(list.item_count(), 24);

    list.refetch();
    assert_eq!(list.item_count(), 24);
    settle(&mut list).await;

    assert_eq!(list.item_count(), 12);
    assert_eq!(log.lock().unwrap().last().unwrap().skip, 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_filter_change_drops_stale_page() {
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));
    let fetcher: PageFetcher<Property> = Arc::new(move |request: PageRequest<PropertyFilters>| {
      let gate = gate.lock().unwrap().take();
      async move {
        if let Some(gate) = gate {
          let _ = gate.await;
          return Ok::<_, ApiError>(vec![property(100)]);
        }
        assert_eq!(request.filters.status, Some(PropertyStatus::Rented));
        Ok(vec![property(1)])
      }
      .boxed()
    });

    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    list.set_filters([PropertyFilter::Status(Some(PropertyStatus::Rented))]);
    tokio::time::advance(DEFAULT_DEBOUNCE).await;
    list.poll();
    let _ = release.send(());
    settle(&mut list).await;

    let ids: Vec<EntityId> = list.items().map(|p| p.id).collect();
    assert_eq!(ids, vec![1]);
  }

  #[tokio::test]
  async fn test_mutations_patch_pages() {
    let (fetcher, log) = fake(3);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;

    let mut renamed = property(2);
    renamed.name = Some("Renamed".into());
    list.apply_mutation(MutationEvent::Updated(renamed));
    list.apply_mutation(MutationEvent::Deleted(3));

    let names: Vec<&str> = list.items().map(Property::display_name).collect();
    assert_eq!(names, vec!["1 Main St", "Renamed"]);
    assert_eq!(log.lock().unwrap().len(), 1);

    list.apply_mutation(MutationEvent::Created(property(4)));
    settle(&mut list).await;
    assert_eq!(log.lock().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_delete_then_scroll_loads_every_remaining_row() {
    let (fetcher, rows, log) = backed_by(1..=30);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;

    rows.lock().unwrap().retain(|&id| id != 2);
    list.apply_mutation(MutationEvent::Deleted(2));
    for _ in 0..5 {
      list.on_sentinel_visible();
      settle(&mut list).await;
    }

    let expected: Vec<EntityId> = (1..=30).filter(|&id| id != 2).collect();
    assert_eq!(ids(&list), expected);
    assert_eq!(skips(&log), vec![0, 11, 23]);
    assert!(!list.has_next_page());
  }

  #[tokio::test(start_paused = true)]
  async fn test_delete_while_next_page_loads_requests_it_again() {
    let (fetcher, rows, log) = backed_by(1..=30);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;

    list.fetch_next_page();
    assert!(list.is_fetching_next_page());
    rows.lock().unwrap().retain(|&id| id != 5);
    list.apply_mutation(MutationEvent::Deleted(5));
    settle(&mut list).await;

    assert_eq!(skips(&log), vec![0, 12, 11]);
    let expected: Vec<EntityId> = (1..=24).filter(|&id| id != 5).collect();
    assert_eq!(ids(&list), expected);
  }

  #[tokio::test]
  async fn test_reload_resets_removed_offset() {
    let (fetcher, rows, log) = backed_by(1..=30);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.load();
    settle(&mut list).await;

    rows.lock().unwrap().retain(|&id| id != 1);
    list.apply_mutation(MutationEvent::Deleted(1));
    list.refetch();
    settle(&mut list).await;
    list.fetch_next_page();
    settle(&mut list).await;

    assert_eq!(skips(&log), vec![0, 0, 12]);
    assert_eq!(ids(&list), (2..=25).collect::<Vec<_>>());
  }

  #[tokio::test]
  async fn test_update_out_of_filter_drops_row() {
    let (fetcher, rows, log) = backed_by(1..=20);
    let mut list = ListController::new(fetcher, ListSettings::default());
    list.set_filters([PropertyFilter::Status(Some(PropertyStatus::Available))]);
    list.flush_filters();
    settle(&mut list).await;
    assert_eq!(list.item_count(), 12);

    let mut still_available = property(3);
    still_available.name = Some("Fresh paint".into());
    list.apply_mutation(MutationEvent::Updated(still_available));

    let mut rented = property(4);
    rented.status = PropertyStatus::Rented;
    rows.lock().unwrap().retain(|&id| id != 4);
    list.apply_mutation(MutationEvent::Updated(rented));

    assert!(!ids(&list).contains(&4));
    assert_eq!(list.item(2).map(Property::display_name), Some("Fresh paint"));

    list.fetch_next_page();
    settle(&mut list).await;
    assert_eq!(skips(&log), vec![0, 11]);
    let expected: Vec<EntityId> = (1..=20).filter(|&id| id != 4).collect();
    assert_eq!(ids(&list), expected);
  }

  #[tokio::test]
  async fn test_page_failure_is_reported() {
    let collector = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/events"))
      .respond_with(ResponseTemplate::new(202))
      .mount(&collector)
      .await;

    let mut list = ListController::new(failing(), ListSettings::default())
      .reporting_to(&reporter_for(&collector));
    list.load();
    settle(&mut list).await;
    assert!(list.error().is_some());

    let events = wait_for_requests(&collector, 1).await;
    assert_eq!(events.len(), 1);
    let body: serde_json::Value = events[0].body_json().unwrap();
    assert_eq!(body["kind"], "property.list");
    assert_eq!(body["message"], "Failed to load properties: database unavailable");
  }

  #[tokio::test]
  async fn test_api_backed_list_filters_and_searches() {
    let server = MockServer::start().await;
    let row = json!([{
      "id": 1,
      "title": "Test Property",
      "address": "123 Test St",
      "price": 1000,
      "status": "available"
    }]);
    Mock::given(method("GET"))
      .and(path("/api/v1/properties"))
      .and(query_param("status", "available"))
      .respond_with(ResponseTemplate::new(200).set_body_json(row.clone()))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("GET"))
      .and(path("/api/v1/properties/search"))
      .and(query_param("q", "Test Property"))
      .respond_with(ResponseTemplate::new(200).set_body_json(row))
      .expect(1)
      .mount(&server)
      .await;

    let settings = ListSettings {
      page_size: 12,
      debounce: Duration::ZERO,
    };
    let mut list = ListController::<Property>::for_api(&client_for(&server), settings);

    list.set_filters([PropertyFilter::Status(Some(PropertyStatus::Available))]);
    list.flush_filters();
    wait_for_page(&mut list).await;
    assert_eq!(list.item_count(), 1);

    list.set_filters([
      PropertyFilter::Status(None),
      PropertyFilter::Search(Some("Test Property".into())),
    ]);
    list.flush_filters();
    wait_for_page(&mut list).await;

    let rows: Vec<&Property> = list.items().collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].display_name(), "Test Property");
    assert!(!list.has_next_page());
  }

  async fn wait_for_page(list: &mut ListController<Property>) {
    for _ in 0..200 {
      list.poll();
      if list.pending.is_none() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  }
}
