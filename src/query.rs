//! Pollable request handles for views.
//!
//! The UI thread never awaits. A view that needs an entity, or wants to save
//! one, starts a [`Query`]: the request runs as a tokio task and the view
//! picks up the outcome from [`Query::poll`] on a later tick. Failures keep
//! their [`ApiError`] so a view can tell a missing entity from a dead server.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::api::ApiError;

/// A failed request together with what it was trying to do.
///
/// Displays as `Failed to load property: not found`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context}: {}", .source.user_message())]
pub struct QueryError {
  context: String,
  #[source]
  source: ApiError,
}

impl QueryError {
  /// `action` and `entity` read as "Failed to {action} {entity}".
  pub fn failed(action: &str, entity: &str, source: ApiError) -> Self {
    Self {
      context: format!("Failed to {} {}", action, entity),
      source,
    }
  }

  /// The task driving the request ended without an answer.
  fn interrupted() -> Self {
    Self {
      context: "Request interrupted".to_string(),
      source: ApiError::Transport("request task ended without a result".to_string()),
    }
  }

  pub fn api_error(&self) -> &ApiError {
    &self.source
  }

  pub fn is_not_found(&self) -> bool {
    self.source.is_not_found()
  }
}

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Nothing requested yet
  Idle,
  Loading,
  Done(T),
  Failed(QueryError),
}

type Starter<T> = Box<dyn Fn() -> BoxFuture<'static, QueryResult<T>> + Send + Sync>;

/// One entity read or write, restartable.
///
/// Starting the request again (`refetch`) or overwriting the value
/// (`set_data`) abandons whatever was in flight: its answer is dropped
/// unread when it arrives.
pub struct Query<T> {
  state: QueryState<T>,
  start: Starter<T>,
  inbox: Option<oneshot::Receiver<QueryResult<T>>>,
}

impl<T: Send + 'static> Query<T> {
  /// Wrap a request. Nothing runs until `fetch` or `refetch`.
  pub fn new<F, Fut>(start: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QueryResult<T>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      start: Box::new(move || Box::pin(start())),
      inbox: None,
    }
  }

  /// Begin with a value that is already known, e.g. a cache hit.
  pub fn with_data(mut self, data: T) -> Self {
    self.state = QueryState::Done(data);
    self
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    match &self.state {
      QueryState::Done(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&QueryError> {
    match &self.state {
      QueryState::Failed(e) => Some(e),
      _ => None,
    }
  }

  pub fn is_loading(&self) -> bool {
    matches!(self.state, QueryState::Loading)
  }

  pub fn is_done(&self) -> bool {
    matches!(self.state, QueryState::Done(_))
  }

  pub fn is_failed(&self) -> bool {
    matches!(self.state, QueryState::Failed(_))
  }

  /// Show a value produced locally, such as a save response.
  pub fn set_data(&mut self, data: T) {
    self.inbox = None;
    self.state = QueryState::Done(data);
  }

  /// Start the request unless it is already running.
  pub fn fetch(&mut self) {
    if !self.is_loading() {
      self.spawn();
    }
  }

  /// Start the request again, abandoning one in flight.
  pub fn refetch(&mut self) {
    self.spawn();
  }

  /// Collect the answer if it has arrived. Returns true when the state
  /// changed.
  pub fn poll(&mut self) -> bool {
    let Some(inbox) = self.inbox.as_mut() else {
      return false;
    };

    let outcome = match inbox.try_recv() {
      Ok(outcome) => outcome,
      Err(oneshot::error::TryRecvError::Empty) => return false,
      Err(oneshot::error::TryRecvError::Closed) => Err(QueryError::interrupted()),
    };

    self.inbox = None;
    self.state = match outcome {
      Ok(data) => QueryState::Done(data),
      Err(e) => QueryState::Failed(e),
    };
    true
  }

  fn spawn(&mut self) {
    let (tx, rx) = oneshot::channel();
    let request = (self.start)();
    tokio::spawn(async move {
      // Nobody is listening once the handle was restarted or dropped
      let _ = tx.send(request.await);
    });
    self.inbox = Some(rx);
    self.state = QueryState::Loading;
  }
}

impl<T: fmt::Debug> fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("in_flight", &self.inbox.is_some())
      .finish_non_exhaustive()
  }
}
