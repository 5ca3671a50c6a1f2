use chrono::Utc;
use kanri_shared::{
  NewProject,
  NewTaskList,
  Project,
  ProjectPatch,
  TaskList,
  TaskListPatch
};
use tracing::{
  error,
  info,
  warn
};
use uuid::Uuid;

use super::ServiceContext;
use crate::errors::{
  EntityKind,
  labels
};
use crate::store::{
  Change,
  StoreEvent
};
use crate::undo::UpdateRecord;

/// Projects and the task lists inside
/// them.
#[derive(Debug, Clone)]
pub struct ProjectService {
  ctx: ServiceContext
}

fn descendant_ids(
  lists: &[TaskList]
) -> Vec<Uuid> {
  lists
    .iter()
    .flat_map(|list| {
      std::iter::once(list.id).chain(
        list.tasks.iter().flat_map(|task| {
          std::iter::once(task.id).chain(
            task.sub_tasks.iter().map(|s| s.id)
          )
        })
      )
    })
    .collect()
}

impl ProjectService {
  pub fn new(ctx: ServiceContext) -> Self {
    Self { ctx }
  }

  pub fn projects(&self) -> Vec<Project> {
    self
      .ctx
      .store
      .read(|ws| ws.projects.clone())
  }

  #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
  pub async fn create_project(
    &self,
    draft: NewProject,
    index: Option<usize>
  ) -> Option<Project> {
    if draft.name.trim().is_empty() {
      warn!("project name is empty; not created");
      return None;
    }

    let project =
      draft.into_project(Utc::now());
    let id = project.id;
    let project = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Project,
        id,
        Change::Inserted
      ),
      |ws| {
        let idx =
          ws.insert_project(project, index);
        ws.projects[idx].clone()
      }
    );

    let outcome = self
      .ctx
      .gateway
      .create_project(&project)
      .await;
    let stored = self.ctx.settle(
      outcome,
      labels::CREATE_PROJECT,
      EntityKind::Project,
      id,
      |ws| {
        ws.remove_project(id);
        Ok(())
      }
    )?;
    info!(project_id = %id, "project created");
    Some(stored)
  }

  #[tracing::instrument(skip(self, patch))]
  pub async fn update_project(
    &self,
    id: Uuid,
    patch: ProjectPatch
  ) -> bool {
    let Some(record) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Project,
        id,
        Change::Updated
      ),
      |ws| {
        let project = ws.project_mut(id)?;
        let previous_updated_at =
          project.updated_at;
        let inverse = patch.apply(project);
        project.updated_at = Utc::now();
        Some(UpdateRecord {
          id,
          inverse,
          previous_updated_at
        })
      }
    ) else {
      error!(project_id = %id, "project not found; update skipped");
      return false;
    };

    let outcome = self
      .ctx
      .gateway
      .update_project(id, &patch)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::UPDATE_PROJECT,
        EntityKind::Project,
        id,
        |ws| {
          if let Some(project) =
            ws.project_mut(id)
          {
            record.inverse.apply(project);
            project.updated_at =
              record.previous_updated_at;
          }
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_project(
    &self,
    id: Uuid
  ) -> bool {
    let Some(removal) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Project,
        id,
        Change::Removed
      ),
      |ws| ws.remove_project(id)
    ) else {
      error!(project_id = %id, "project not found; delete skipped");
      return false;
    };
    let mut cleared =
      descendant_ids(&removal.entity.task_lists);
    cleared.push(id);
    self.ctx.store.clear_selection_of(&cleared);

    let outcome = self
      .ctx
      .gateway
      .delete_project(id)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::DELETE_PROJECT,
        EntityKind::Project,
        id,
        |ws| {
          ws.insert_project(
            removal.entity,
            Some(removal.index)
          );
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn move_project(
    &self,
    id: Uuid,
    index: usize
  ) -> bool {
    let Some(from_index) =
      self.ctx.store.mutate(
        StoreEvent::new(
          EntityKind::Project,
          id,
          Change::Moved
        ),
        |ws| {
          let removal = ws.remove_project(id)?;
          ws.insert_project(
            removal.entity,
            Some(index)
          );
          Some(removal.index)
        }
      )
    else {
      error!(project_id = %id, "project not found; move skipped");
      return false;
    };

    let outcome = self
      .ctx
      .gateway
      .move_project(id, index)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::MOVE_PROJECT,
        EntityKind::Project,
        id,
        |ws| {
          if let Some(removal) =
            ws.remove_project(id)
          {
            ws.insert_project(
              removal.entity,
              Some(from_index)
            );
          }
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self, draft), fields(name = %draft.name))]
  pub async fn create_task_list(
    &self,
    project_id: Uuid,
    draft: NewTaskList,
    index: Option<usize>
  ) -> Option<TaskList> {
    if draft.name.trim().is_empty() {
      warn!("task list name is empty; not created");
      return None;
    }

    let list = draft
      .into_task_list(project_id, Utc::now());
    let id = list.id;
    let inserted = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::TaskList,
        id,
        Change::Inserted
      ),
      |ws| -> anyhow::Result<TaskList> {
        ws.insert_task_list(
          project_id, list, index
        )?;
        ws.task_list(id).cloned().ok_or_else(
          || {
            anyhow::anyhow!(
              "task list vanished"
            )
          }
        )
      }
    );
    let list = match inserted {
      | Ok(list) => list,
      | Err(err) => {
        error!(%project_id, error = %err, "project not found; task list not created");
        return None;
      }
    };

    let outcome = self
      .ctx
      .gateway
      .create_task_list(&list)
      .await;
    self.ctx.settle(
      outcome,
      labels::CREATE_TASK_LIST,
      EntityKind::TaskList,
      id,
      |ws| {
        ws.remove_task_list(id);
        Ok(())
      }
    )
  }

  #[tracing::instrument(skip(self, patch))]
  pub async fn update_task_list(
    &self,
    id: Uuid,
    patch: TaskListPatch
  ) -> bool {
    let Some((project_id, record)) =
      self.ctx.store.mutate(
        StoreEvent::new(
          EntityKind::TaskList,
          id,
          Change::Updated
        ),
        |ws| {
          let list = ws.task_list_mut(id)?;
          let previous_updated_at =
            list.updated_at;
          let inverse = patch.apply(list);
          list.updated_at = Utc::now();
          Some((
            list.project_id,
            UpdateRecord {
              id,
              inverse,
              previous_updated_at
            }
          ))
        }
      )
    else {
      error!(list_id = %id, "task list not found; update skipped");
      return false;
    };

    let outcome = self
      .ctx
      .gateway
      .update_task_list(project_id, id, &patch)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::UPDATE_TASK_LIST,
        EntityKind::TaskList,
        id,
        |ws| {
          if let Some(list) =
            ws.task_list_mut(id)
          {
            record.inverse.apply(list);
            list.updated_at =
              record.previous_updated_at;
          }
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_task_list(
    &self,
    id: Uuid
  ) -> bool {
    let Some(removal) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::TaskList,
        id,
        Change::Removed
      ),
      |ws| ws.remove_task_list(id)
    ) else {
      error!(list_id = %id, "task list not found; delete skipped");
      return false;
    };
    let Some(project_id) = removal.container
    else {
      return false;
    };
    self.ctx.store.clear_selection_of(
      &descendant_ids(std::slice::from_ref(
        &removal.entity
      ))
    );

    let outcome = self
      .ctx
      .gateway
      .delete_task_list(project_id, id)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::DELETE_TASK_LIST,
        EntityKind::TaskList,
        id,
        |ws| {
          ws.insert_task_list(
            project_id,
            removal.entity,
            Some(removal.index)
          )?;
          Ok(())
        }
      )
      .is_some()
  }

  /// Moves a list, and every task in it,
  /// to `index` under `to_project_id`.
  #[tracing::instrument(skip(self))]
  pub async fn move_task_list(
    &self,
    id: Uuid,
    to_project_id: Uuid,
    index: usize
  ) -> bool {
    let resolved = self.ctx.store.read(|ws| {
      ws.task_list(id)?;
      ws.project(to_project_id)?;
      Some(())
    });
    if resolved.is_none() {
      error!(list_id = %id, %to_project_id, "task list or target project not found; move skipped");
      return false;
    }

    let moved = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::TaskList,
        id,
        Change::Moved
      ),
      |ws| -> anyhow::Result<_> {
        let removal = ws
          .remove_task_list(id)
          .ok_or_else(|| {
            anyhow::anyhow!(
              "task list vanished"
            )
          })?;
        let origin = (
          removal.container,
          removal.index
        );
        if let Err(err) = ws.insert_task_list(
          to_project_id,
          removal.entity.clone(),
          Some(index)
        ) {
          if let Some(project_id) = origin.0 {
            ws.insert_task_list(
              project_id,
              removal.entity,
              Some(origin.1)
            )?;
          }
          return Err(err);
        }
        Ok(origin)
      }
    );
    let (from_project, from_index) =
      match moved {
        | Ok(origin) => origin,
        | Err(err) => {
          error!(list_id = %id, error = %err, "local move failed");
          return false;
        }
      };

    let outcome = self
      .ctx
      .gateway
      .move_task_list(id, to_project_id, index)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::MOVE_TASK_LIST,
        EntityKind::TaskList,
        id,
        |ws| {
          let project_id = from_project
            .ok_or_else(|| {
              anyhow::anyhow!(
                "moved task list had no \
                 project"
              )
            })?;
          let removal = ws
            .remove_task_list(id)
            .ok_or_else(|| {
              anyhow::anyhow!(
                "moved task list vanished"
              )
            })?;
          ws.insert_task_list(
            project_id,
            removal.entity,
            Some(from_index)
          )?;
          Ok(())
        }
      )
      .is_some()
  }
}
