//! Optimistic mutation services.
//!
//! Each mutation resolves its context in
//! the [`EntityStore`], records what it
//! needs to undo itself, applies the change
//! locally, then awaits the backend. A
//! failed backend call reverts the local
//! change and is recorded in the
//! [`ErrorHandler`]; nothing is returned as
//! an error to the caller.

mod project;
mod recurrence;
mod sub_task;
mod tag;
mod task;

use std::sync::Arc;

pub use project::ProjectService;
pub use recurrence::RecurrenceService;
pub use sub_task::SubTaskService;
pub use tag::TagService;
pub use task::TaskService;
use tracing::warn;
use uuid::Uuid;

use crate::errors::{
  EntityKind,
  ErrorHandler
};
use crate::gateway::CommandGateway;
use crate::store::{
  Change,
  EntityStore,
  StoreEvent
};
use crate::workspace::Workspace;

/// The three handles every service shares.
#[derive(Clone)]
pub struct ServiceContext {
  pub store:   Arc<EntityStore>,
  pub gateway: Arc<dyn CommandGateway>,
  pub errors:  Arc<ErrorHandler>
}

impl ServiceContext {
  pub fn new(
    store: Arc<EntityStore>,
    gateway: Arc<dyn CommandGateway>,
    errors: Arc<ErrorHandler>
  ) -> Self {
    Self {
      store,
      gateway,
      errors
    }
  }

  /// Settles a backend outcome. On failure
  /// `rollback` runs against the store and
  /// the error is recorded under `action`.
  pub(crate) fn settle<T>(
    &self,
    outcome: anyhow::Result<T>,
    action: &str,
    kind: EntityKind,
    id: Uuid,
    rollback: impl FnOnce(
      &mut Workspace
    ) -> anyhow::Result<()>
  ) -> Option<T> {
    match outcome {
      | Ok(value) => Some(value),
      | Err(err) => {
        let reverted = self.store.mutate(
          StoreEvent::new(
            kind,
            id,
            Change::RolledBack
          ),
          rollback
        );
        if let Err(rollback_err) = reverted {
          warn!(
            entity_kind = %kind,
            entity_id = %id,
            error = %rollback_err,
            "rollback could not restore local state"
          );
        }
        self.errors.add_sync_error(
          action, kind, id, &err
        );
        None
      }
    }
  }
}

impl std::fmt::Debug for ServiceContext {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("ServiceContext")
      .field("store", &self.store)
      .field("errors", &self.errors)
      .finish_non_exhaustive()
  }
}
