use chrono::Utc;
use kanri_shared::{
  NewTask,
  OccurrenceRequest,
  Task,
  TaskPatch,
  TaskStatus
};
use tracing::{
  debug,
  error,
  info,
  warn
};
use uuid::Uuid;

use super::{
  ServiceContext,
  TagService
};
use crate::errors::{
  EntityKind,
  labels
};
use crate::store::{
  Change,
  StoreEvent
};
use crate::tag_completion::{
  extract_tag_names,
  strip_tag_tokens
};
use crate::undo::{
  TagOwner,
  UpdateRecord
};

#[derive(Debug, Clone)]
pub struct TaskService {
  ctx:  ServiceContext,
  tags: TagService
}

impl TaskService {
  pub fn new(ctx: ServiceContext) -> Self {
    let tags = TagService::new(ctx.clone());
    Self { ctx, tags }
  }

  /// Inserts a task into `list_id` at
  /// `index` (the end when `None`).
  #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
  pub async fn create_task(
    &self,
    list_id: Uuid,
    draft: NewTask,
    index: Option<usize>
  ) -> Option<Task> {
    let Some(project_id) =
      self.ctx.store.read(|ws| {
        ws.task_list(list_id)
          .map(|l| l.project_id)
      })
    else {
      error!(%list_id, "task list not found; task not created");
      return None;
    };

    let task = draft.into_task(
      project_id,
      list_id,
      Utc::now()
    );
    let id = task.id;
    let inserted = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        id,
        Change::Inserted
      ),
      |ws| -> anyhow::Result<Task> {
        ws.insert_task(
          list_id,
          task,
          index
        )?;
        ws.task(id).cloned().ok_or_else(
          || anyhow::anyhow!("task vanished")
        )
      }
    );
    let task = match inserted {
      | Ok(task) => task,
      | Err(err) => {
        error!(task_id = %id, error = %err, "local insert failed");
        return None;
      }
    };

    let outcome =
      self.ctx.gateway.create_task(&task).await;
    let stored = self.ctx.settle(
      outcome,
      labels::CREATE_TASK,
      EntityKind::Task,
      id,
      |ws| {
        ws.remove_task(id);
        Ok(())
      }
    )?;
    info!(task_id = %id, "task created");
    Some(stored)
  }

  /// Creates a task from free text:
  /// `#tag` tokens become tags and are
  /// dropped from the title.
  #[tracing::instrument(skip(self))]
  pub async fn create_task_from_text(
    &self,
    list_id: Uuid,
    text: &str
  ) -> Option<Task> {
    let title = strip_tag_tokens(text);
    if title.is_empty() {
      warn!("task text has no title besides tags");
      return None;
    }
    let task = self
      .create_task(
        list_id,
        NewTask {
          title,
          ..NewTask::default()
        },
        None
      )
      .await?;

    for name in extract_tag_names(text) {
      let Some(tag) = self
        .tags
        .get_or_create_tag(&name, None)
        .await
      else {
        continue;
      };
      self
        .add_tag_to_task(task.id, tag.id)
        .await;
    }
    self.ctx.store.task(task.id)
  }

  #[tracing::instrument(skip(self, patch))]
  pub async fn update_task(
    &self,
    id: Uuid,
    patch: TaskPatch
  ) -> bool {
    let Some((project_id, previous_status)) =
      self.ctx.store.read(|ws| {
        ws.task(id)
          .map(|t| (t.project_id, t.status))
      })
    else {
      error!(task_id = %id, "task not found; update skipped");
      return false;
    };
    if patch.is_empty() {
      debug!(task_id = %id, "empty patch; nothing to sync");
      return true;
    }

    let now = Utc::now();
    let applied = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        id,
        Change::Updated
      ),
      |ws| {
        let task = ws.task_mut(id)?;
        let previous_updated_at =
          task.updated_at;
        let inverse = patch.apply(task);
        task.updated_at = now;
        Some((
          UpdateRecord {
            id,
            inverse,
            previous_updated_at
          },
          task.clone()
        ))
      }
    );
    let Some((record, updated)) = applied
    else {
      error!(task_id = %id, "task disappeared before update");
      return false;
    };

    if patch.status == Some(TaskStatus::Completed)
      && previous_status
        != TaskStatus::Completed
      && let Some(rule) =
        updated.recurrence_rule.clone()
    {
      self
        .schedule_next_occurrence(
          OccurrenceRequest {
            task_id: id,
            project_id,
            list_id: updated.list_id,
            rule,
            completed_at: now
          }
        )
        .await;
    }

    let outcome = self
      .ctx
      .gateway
      .update_task(project_id, id, &patch)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::UPDATE_TASK,
        EntityKind::Task,
        id,
        |ws| {
          if let Some(task) =
            ws.task_mut(record.id)
          {
            record.inverse.apply(task);
            task.updated_at =
              record.previous_updated_at;
          }
          Ok(())
        }
      )
      .is_some()
  }

  /// Asks the backend for the next
  /// occurrence. A returned task is kept
  /// even if the completion itself later
  /// fails to sync.
  async fn schedule_next_occurrence(
    &self,
    request: OccurrenceRequest
  ) {
    let task_id = request.task_id;
    match self
      .ctx
      .gateway
      .schedule_next_occurrence(&request)
      .await
    {
      | Ok(Some(next)) => {
        let next_id = next.id;
        let list_id = next.list_id;
        let index = next.order_index as usize;
        let inserted = self.ctx.store.mutate(
          StoreEvent::new(
            EntityKind::Task,
            next_id,
            Change::Inserted
          ),
          |ws| {
            ws.insert_task(
              list_id,
              next,
              Some(index)
            )
          }
        );
        if let Err(err) = inserted {
          warn!(task_id = %next_id, error = %err, "could not place next occurrence");
        } else {
          info!(%task_id, next_id = %next_id, "next occurrence created");
        }
      }
      | Ok(None) => {
        debug!(%task_id, "next occurrence queued");
      }
      | Err(err) => {
        self.ctx.errors.add_sync_error(
          labels::SCHEDULE_OCCURRENCE,
          EntityKind::Task,
          task_id,
          &err
        );
      }
    }
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_task(
    &self,
    id: Uuid
  ) -> bool {
    let Some(project_id) =
      self.ctx.store.read(|ws| {
        ws.task(id).map(|t| t.project_id)
      })
    else {
      error!(task_id = %id, "task not found; delete skipped");
      return false;
    };

    let Some(removal) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        id,
        Change::Removed
      ),
      |ws| ws.remove_task(id)
    ) else {
      return false;
    };
    let sub_task_ids: Vec<Uuid> = removal
      .entity
      .sub_tasks
      .iter()
      .map(|s| s.id)
      .chain(std::iter::once(id))
      .collect();
    self
      .ctx
      .store
      .clear_selection_of(&sub_task_ids);

    let outcome = self
      .ctx
      .gateway
      .delete_task(project_id, id)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::DELETE_TASK,
        EntityKind::Task,
        id,
        |ws| {
          let list_id = removal
            .container
            .ok_or_else(|| {
              anyhow::anyhow!(
                "removed task had no list"
              )
            })?;
          ws.insert_task(
            list_id,
            removal.entity,
            Some(removal.index)
          )?;
          Ok(())
        }
      )
      .is_some()
  }

  /// Moves a task to `index` in
  /// `to_list_id`, which may belong to a
  /// different project.
  #[tracing::instrument(skip(self))]
  pub async fn move_task(
    &self,
    id: Uuid,
    to_list_id: Uuid,
    index: usize
  ) -> bool {
    let resolved = self.ctx.store.read(|ws| {
      ws.task(id)?;
      ws.task_list(to_list_id)?;
      Some(())
    });
    if resolved.is_none() {
      error!(task_id = %id, %to_list_id, "task or target list not found; move skipped");
      return false;
    }

    let moved = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        id,
        Change::Moved
      ),
      |ws| -> anyhow::Result<_> {
        let removal =
          ws.remove_task(id).ok_or_else(
            || anyhow::anyhow!("task vanished")
          )?;
        let origin = (
          removal.container,
          removal.index
        );
        if let Err(err) = ws.insert_task(
          to_list_id,
          removal.entity.clone(),
          Some(index)
        ) {
          if let Some(list_id) = origin.0 {
            ws.insert_task(
              list_id,
              removal.entity,
              Some(origin.1)
            )?;
          }
          return Err(err);
        }
        Ok(origin)
      }
    );
    let (from_list, from_index) = match moved
    {
      | Ok(origin) => origin,
      | Err(err) => {
        error!(task_id = %id, error = %err, "local move failed");
        return false;
      }
    };

    let outcome = self
      .ctx
      .gateway
      .move_task(id, to_list_id, index)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::MOVE_TASK,
        EntityKind::Task,
        id,
        |ws| {
          let list_id =
            from_list.ok_or_else(|| {
              anyhow::anyhow!(
                "moved task had no list"
              )
            })?;
          let removal =
            ws.remove_task(id).ok_or_else(
              || {
                anyhow::anyhow!(
                  "moved task vanished"
                )
              }
            )?;
          ws.insert_task(
            list_id,
            removal.entity,
            Some(from_index)
          )?;
          Ok(())
        }
      )
      .is_some()
  }

  /// Completed goes back to not started;
  /// anything else becomes completed.
  #[tracing::instrument(skip(self))]
  pub async fn toggle_task_status(
    &self,
    id: Uuid
  ) -> bool {
    let Some(status) =
      self.ctx.store.read(|ws| {
        ws.task(id).map(|t| t.status)
      })
    else {
      error!(task_id = %id, "task not found; toggle skipped");
      return false;
    };
    self
      .update_task(
        id,
        TaskPatch::status(status.toggled())
      )
      .await
  }

  #[tracing::instrument(skip(self))]
  pub async fn add_tag_to_task(
    &self,
    task_id: Uuid,
    tag_id: Uuid
  ) -> bool {
    let resolved = self.ctx.store.read(|ws| {
      let project_id =
        ws.task(task_id)?.project_id;
      let tag = ws.tag(tag_id)?.clone();
      Some((project_id, tag))
    });
    let Some((project_id, tag)) = resolved
    else {
      error!(%task_id, %tag_id, "task or tag not found; attach skipped");
      return false;
    };

    let owner = TagOwner::Task(task_id);
    let attached = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Task,
        task_id,
        Change::Updated
      ),
      |ws| ws.attach_tag(owner, tag)
    );
    match attached {
      | Ok(true) => {}
      | Ok(false) => {
        debug!(%task_id, %tag_id, "tag already attached");
        return true;
      }
      | Err(err) => {
        error!(%task_id, error = %err, "local attach failed");
        return false;
      }
    }

    let outcome = self
      .ctx
      .gateway
      .add_tag_to_task(
        project_id, task_id, tag_id
      )
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::ADD_TAG,
        EntityKind::Task,
        task_id,
        |ws| {
          ws.detach_tag(owner, tag_id);
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn remove_tag_from_task(
    &self,
    task_id: Uuid,
    tag_id: Uuid
  ) -> bool {
    let Some(project_id) =
      self.ctx.store.read(|ws| {
        ws.task(task_id).map(|t| t.project_id)
      })
    else {
      error!(%task_id, "task not found; detach skipped");
      return false;
    };

    let owner = TagOwner::Task(task_id);
    let Some(detachment) =
      self.ctx.store.mutate(
        StoreEvent::new(
          EntityKind::Task,
          task_id,
          Change::Updated
        ),
        |ws| ws.detach_tag(owner, tag_id)
      )
    else {
      debug!(%task_id, %tag_id, "tag was not attached");
      return true;
    };

    let outcome = self
      .ctx
      .gateway
      .remove_tag_from_task(
        project_id, task_id, tag_id
      )
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::REMOVE_TAG,
        EntityKind::Task,
        task_id,
        |ws| ws.restore_detachment(detachment)
      )
      .is_some()
  }
}
