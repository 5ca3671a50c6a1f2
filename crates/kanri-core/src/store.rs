use chrono::NaiveDate;
use kanri_shared::{
  Project,
  SubTask,
  Task,
  TaskList,
  TaskStatus
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{
  debug,
  trace
};
use uuid::Uuid;

use crate::datetime::to_project_date;
use crate::errors::EntityKind;
use crate::workspace::Workspace;

const EVENT_CAPACITY: usize = 256;

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct Selection {
  pub project_id:  Option<Uuid>,
  pub list_id:     Option<Uuid>,
  pub task_id:     Option<Uuid>,
  pub sub_task_id: Option<Uuid>
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Change {
  Inserted,
  Updated,
  Removed,
  Moved,
  RolledBack,
  Reloaded,
  Selected
}

/// Emitted after each store mutation that
/// changed something.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct StoreEvent {
  pub kind:   Option<EntityKind>,
  pub id:     Option<Uuid>,
  pub change: Change
}

impl StoreEvent {
  pub fn new(
    kind: EntityKind,
    id: Uuid,
    change: Change
  ) -> Self {
    Self {
      kind: Some(kind),
      id: Some(id),
      change
    }
  }

  pub fn reloaded() -> Self {
    Self {
      kind:   None,
      id:     None,
      change: Change::Reloaded
    }
  }

  pub fn selected() -> Self {
    Self {
      kind:   None,
      id:     None,
      change: Change::Selected
    }
  }
}

/// Reports whether a mutation closure
/// actually changed the workspace. Absent
/// values and errors mean it did not.
pub trait Mutation {
  fn changed(&self) -> bool;
}

impl Mutation for bool {
  fn changed(&self) -> bool {
    *self
  }
}

impl<T> Mutation for Option<T> {
  fn changed(&self) -> bool {
    self.is_some()
  }
}

impl<T: Mutation, E> Mutation
  for Result<T, E>
{
  fn changed(&self) -> bool {
    matches!(self, Ok(v) if v.changed())
  }
}

macro_rules! always_changed {
  ($($ty:ty),* $(,)?) => {
    $(
      impl Mutation for $ty {
        fn changed(&self) -> bool {
          true
        }
      }
    )*
  };
}

always_changed!(
  (),
  usize,
  Project,
  TaskList,
  Task,
  SubTask,
  (Option<Uuid>, usize),
);

#[derive(Debug, Default)]
struct StoreState {
  workspace: Workspace,
  selection: Selection
}

/// The client-side view of every entity.
/// Mutations run synchronously under one
/// lock; subscribers hear about each real
/// change after the lock is released.
#[derive(Debug)]
pub struct EntityStore {
  state:  Mutex<StoreState>,
  events: broadcast::Sender<StoreEvent>
}

impl Default for EntityStore {
  fn default() -> Self {
    Self::new(Workspace::default())
  }
}

impl EntityStore {
  pub fn new(
    workspace: Workspace
  ) -> Self {
    let (events, _) =
      broadcast::channel(EVENT_CAPACITY);
    Self {
      state: Mutex::new(StoreState {
        workspace,
        selection: Selection::default()
      }),
      events
    }
  }

  pub fn subscribe(
    &self
  ) -> broadcast::Receiver<StoreEvent> {
    self.events.subscribe()
  }

  fn emit(&self, event: StoreEvent) {
    trace!(?event, "store event");
    // no receivers is fine
    let _ = self.events.send(event);
  }

  pub fn replace(
    &self,
    workspace: Workspace
  ) {
    {
      let mut state = self.state.lock();
      debug!(
        projects = workspace.projects.len(),
        tags = workspace.tags.len(),
        "replacing store contents"
      );
      state.workspace = workspace;
      state.selection =
        Selection::default();
    }
    self.emit(StoreEvent::reloaded());
  }

  pub fn read<R>(
    &self,
    f: impl FnOnce(&Workspace) -> R
  ) -> R {
    f(&self.state.lock().workspace)
  }

  /// Runs `f` under the lock and emits
  /// `event` only if `f` reports a change.
  pub fn mutate<R: Mutation>(
    &self,
    event: StoreEvent,
    f: impl FnOnce(&mut Workspace) -> R
  ) -> R {
    let out = {
      let mut state = self.state.lock();
      f(&mut state.workspace)
    };
    if out.changed() {
      self.emit(event);
    } else {
      trace!(?event, "mutation changed nothing");
    }
    out
  }

  pub fn task(
    &self,
    id: Uuid
  ) -> Option<Task> {
    self.read(|ws| ws.task(id).cloned())
  }

  pub fn selection(&self) -> Selection {
    self.state.lock().selection.clone()
  }

  fn update_selection(
    &self,
    f: impl FnOnce(&mut Selection)
  ) {
    {
      let mut state = self.state.lock();
      f(&mut state.selection);
    }
    self.emit(StoreEvent::selected());
  }

  pub fn select_project(
    &self,
    id: Option<Uuid>
  ) {
    self.update_selection(|sel| {
      sel.project_id = id;
      sel.list_id = None;
    });
  }

  pub fn select_list(
    &self,
    id: Option<Uuid>
  ) {
    self.update_selection(|sel| {
      sel.list_id = id;
      sel.project_id = None;
    });
  }

  pub fn select_task(
    &self,
    id: Option<Uuid>
  ) {
    self.update_selection(|sel| {
      sel.task_id = id;
      sel.sub_task_id = None;
    });
  }

  pub fn select_sub_task(
    &self,
    id: Option<Uuid>
  ) {
    self.update_selection(|sel| {
      sel.sub_task_id = id;
      sel.task_id = None;
    });
  }

  /// Drops every selection slot that
  /// points at one of `ids`.
  pub fn clear_selection_of(
    &self,
    ids: &[Uuid]
  ) {
    let changed = {
      let mut state = self.state.lock();
      let sel = &mut state.selection;
      let mut changed = false;
      for slot in [
        &mut sel.project_id,
        &mut sel.list_id,
        &mut sel.task_id,
        &mut sel.sub_task_id
      ] {
        if slot
          .is_some_and(|id| ids.contains(&id))
        {
          *slot = None;
          changed = true;
        }
      }
      changed
    };
    if changed {
      self.emit(StoreEvent::selected());
    }
  }

  fn collect_tasks(
    &self,
    pred: impl Fn(&Task) -> bool
  ) -> Vec<Task> {
    self.read(|ws| {
      ws.tasks()
        .filter(|t| !t.is_archived)
        .filter(|t| pred(t))
        .cloned()
        .collect()
    })
  }

  /// Open tasks planned for `today`,
  /// including ranges that span it.
  pub fn today_tasks(
    &self,
    today: NaiveDate
  ) -> Vec<Task> {
    self.collect_tasks(|task| {
      if is_closed(task.status) {
        return false;
      }
      match (
        task.plan_start_date,
        task.plan_end_date
      ) {
        | (Some(start), Some(end))
          if task.is_range_date =>
        {
          to_project_date(start) <= today
            && today <= to_project_date(end)
        }
        | _ => task
          .due_date()
          .is_some_and(|due| {
            to_project_date(due) == today
          })
      }
    })
  }

  pub fn overdue_tasks(
    &self,
    today: NaiveDate
  ) -> Vec<Task> {
    self.collect_tasks(|task| {
      !is_closed(task.status)
        && task.due_date().is_some_and(
          |due| to_project_date(due) < today
        )
    })
  }

  pub fn completed_tasks(
    &self
  ) -> Vec<Task> {
    self.collect_tasks(|task| {
      task.status.is_completed()
    })
  }
}

fn is_closed(status: TaskStatus) -> bool {
  matches!(
    status,
    TaskStatus::Completed
      | TaskStatus::Cancelled
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn project_and_list_selection_exclude_each_other(
  ) {
    let store = EntityStore::default();
    let project = Uuid::new_v4();
    let list = Uuid::new_v4();

    store.select_project(Some(project));
    store.select_list(Some(list));
    let sel = store.selection();
    assert_eq!(sel.project_id, None);
    assert_eq!(sel.list_id, Some(list));

    store.select_project(Some(project));
    let sel = store.selection();
    assert_eq!(
      sel.project_id,
      Some(project)
    );
    assert_eq!(sel.list_id, None);
  }

  #[test]
  fn task_and_sub_task_selection_exclude_each_other(
  ) {
    let store = EntityStore::default();
    let task = Uuid::new_v4();
    let sub_task = Uuid::new_v4();

    store.select_task(Some(task));
    store.select_sub_task(Some(sub_task));
    assert_eq!(
      store.selection().task_id,
      None
    );

    store.select_task(Some(task));
    assert_eq!(
      store.selection().sub_task_id,
      None
    );
  }

  #[test]
  fn mutations_that_change_nothing_stay_silent(
  ) {
    let store = EntityStore::default();
    let mut rx = store.subscribe();
    let missing = Uuid::new_v4();

    let found = store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        missing,
        Change::Updated
      ),
      |ws| ws.task_mut(missing).map(|_| ())
    );
    assert!(found.is_none());
    let failed = store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        missing,
        Change::Moved
      ),
      |_| -> anyhow::Result<usize> {
        Err(anyhow::anyhow!("nope"))
      }
    );
    assert!(failed.is_err());
    let unchanged = store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        missing,
        Change::Updated
      ),
      |_| -> anyhow::Result<bool> { Ok(false) }
    );
    assert!(matches!(unchanged, Ok(false)));
    assert!(rx.try_recv().is_err());

    store.mutate(
      StoreEvent::new(
        EntityKind::Tag,
        missing,
        Change::Inserted
      ),
      |ws| ws.tags.len()
    );
    let event =
      rx.try_recv().expect("event");
    assert_eq!(
      event.change,
      Change::Inserted
    );
    assert_eq!(event.id, Some(missing));
  }

  #[test]
  fn subscribers_see_selection_events() {
    let store = EntityStore::default();
    let mut rx = store.subscribe();
    store.select_task(Some(Uuid::new_v4()));
    let event =
      rx.try_recv().expect("event");
    assert_eq!(
      event.change,
      Change::Selected
    );
  }
}
