use chrono::Utc;
use kanri_shared::{
  NewSubTask,
  SubTask,
  SubTaskPatch
};
use tracing::{
  debug,
  error,
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
use crate::undo::{
  TagOwner,
  UpdateRecord
};

#[derive(Debug, Clone)]
pub struct SubTaskService {
  ctx: ServiceContext
}

impl SubTaskService {
  pub fn new(ctx: ServiceContext) -> Self {
    Self { ctx }
  }

  fn project_of(
    &self,
    sub_task_id: Uuid
  ) -> Option<Uuid> {
    self.ctx.store.read(|ws| {
      ws.parent_task(sub_task_id)
        .map(|t| t.project_id)
    })
  }

  #[tracing::instrument(skip(self, draft), fields(title = %draft.title))]
  pub async fn create_sub_task(
    &self,
    task_id: Uuid,
    draft: NewSubTask,
    index: Option<usize>
  ) -> Option<SubTask> {
    if draft.title.trim().is_empty() {
      warn!(%task_id, "sub task title is empty; not created");
      return None;
    }
    let Some(project_id) =
      self.ctx.store.read(|ws| {
        ws.task(task_id).map(|t| t.project_id)
      })
    else {
      error!(%task_id, "parent task not found; sub task not created");
      return None;
    };

    let sub_task =
      draft.into_sub_task(task_id, Utc::now());
    let id = sub_task.id;
    let inserted = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::SubTask,
        id,
        Change::Inserted
      ),
      |ws| -> anyhow::Result<SubTask> {
        ws.insert_sub_task(
          task_id, sub_task, index
        )?;
        ws.sub_task(id).cloned().ok_or_else(
          || {
            anyhow::anyhow!(
              "sub task vanished"
            )
          }
        )
      }
    );
    let sub_task = match inserted {
      | Ok(sub_task) => sub_task,
      | Err(err) => {
        error!(sub_task_id = %id, error = %err, "local insert failed");
        return None;
      }
    };

    let outcome = self
      .ctx
      .gateway
      .create_sub_task(project_id, &sub_task)
      .await;
    self.ctx.settle(
      outcome,
      labels::CREATE_SUB_TASK,
      EntityKind::SubTask,
      id,
      |ws| {
        ws.remove_sub_task(id);
        Ok(())
      }
    )
  }

  #[tracing::instrument(skip(self, patch))]
  pub async fn update_sub_task(
    &self,
    id: Uuid,
    patch: SubTaskPatch
  ) -> bool {
    let Some(project_id) = self.project_of(id)
    else {
      error!(sub_task_id = %id, "sub task not found; update skipped");
      return false;
    };
    if patch.is_empty() {
      debug!(sub_task_id = %id, "empty patch; nothing to sync");
      return true;
    }

    let Some(record) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::SubTask,
        id,
        Change::Updated
      ),
      |ws| {
        let sub_task = ws.sub_task_mut(id)?;
        let previous_updated_at =
          sub_task.updated_at;
        let inverse = patch.apply(sub_task);
        sub_task.updated_at = Utc::now();
        Some(UpdateRecord {
          id,
          inverse,
          previous_updated_at
        })
      }
    ) else {
      return false;
    };

    let outcome = self
      .ctx
      .gateway
      .update_sub_task(project_id, id, &patch)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::UPDATE_SUB_TASK,
        EntityKind::SubTask,
        id,
        |ws| {
          if let Some(sub_task) =
            ws.sub_task_mut(record.id)
          {
            record.inverse.apply(sub_task);
            sub_task.updated_at =
              record.previous_updated_at;
          }
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_sub_task(
    &self,
    id: Uuid
  ) -> bool {
    let Some(project_id) = self.project_of(id)
    else {
      error!(sub_task_id = %id, "sub task not found; delete skipped");
      return false;
    };

    let Some(removal) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::SubTask,
        id,
        Change::Removed
      ),
      |ws| ws.remove_sub_task(id)
    ) else {
      return false;
    };
    self.ctx.store.clear_selection_of(&[id]);

    let outcome = self
      .ctx
      .gateway
      .delete_sub_task(project_id, id)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::DELETE_SUB_TASK,
        EntityKind::SubTask,
        id,
        |ws| {
          let task_id =
            removal.container.ok_or_else(
              || {
                anyhow::anyhow!(
                  "removed sub task had no \
                   task"
                )
              }
            )?;
          ws.insert_sub_task(
            task_id,
            removal.entity,
            Some(removal.index)
          )?;
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn move_sub_task(
    &self,
    id: Uuid,
    to_task_id: Uuid,
    index: usize
  ) -> bool {
    let resolved = self.ctx.store.read(|ws| {
      ws.sub_task(id)?;
      ws.task(to_task_id)?;
      Some(())
    });
    if resolved.is_none() {
      error!(sub_task_id = %id, %to_task_id, "sub task or target task not found; move skipped");
      return false;
    }

    let moved = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::SubTask,
        id,
        Change::Moved
      ),
      |ws| -> anyhow::Result<_> {
        let removal = ws
          .remove_sub_task(id)
          .ok_or_else(|| {
            anyhow::anyhow!(
              "sub task vanished"
            )
          })?;
        let origin = (
          removal.container,
          removal.index
        );
        if let Err(err) = ws.insert_sub_task(
          to_task_id,
          removal.entity.clone(),
          Some(index)
        ) {
          if let Some(task_id) = origin.0 {
            ws.insert_sub_task(
              task_id,
              removal.entity,
              Some(origin.1)
            )?;
          }
          return Err(err);
        }
        Ok(origin)
      }
    );
    let (from_task, from_index) = match moved
    {
      | Ok(origin) => origin,
      | Err(err) => {
        error!(sub_task_id = %id, error = %err, "local move failed");
        return false;
      }
    };

    let outcome = self
      .ctx
      .gateway
      .move_sub_task(id, to_task_id, index)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::MOVE_SUB_TASK,
        EntityKind::SubTask,
        id,
        |ws| {
          let task_id =
            from_task.ok_or_else(|| {
              anyhow::anyhow!(
                "moved sub task had no task"
              )
            })?;
          let removal = ws
            .remove_sub_task(id)
            .ok_or_else(|| {
              anyhow::anyhow!(
                "moved sub task vanished"
              )
            })?;
          ws.insert_sub_task(
            task_id,
            removal.entity,
            Some(from_index)
          )?;
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn toggle_sub_task_status(
    &self,
    id: Uuid
  ) -> bool {
    let Some(status) =
      self.ctx.store.read(|ws| {
        ws.sub_task(id).map(|s| s.status)
      })
    else {
      error!(sub_task_id = %id, "sub task not found; toggle skipped");
      return false;
    };
    self
      .update_sub_task(
        id,
        SubTaskPatch::status(
          status.toggled()
        )
      )
      .await
  }

  #[tracing::instrument(skip(self))]
  pub async fn add_tag_to_sub_task(
    &self,
    sub_task_id: Uuid,
    tag_id: Uuid
  ) -> bool {
    let resolved = self.ctx.store.read(|ws| {
      let project_id =
        ws.parent_task(sub_task_id)?.project_id;
      let tag = ws.tag(tag_id)?.clone();
      Some((project_id, tag))
    });
    let Some((project_id, tag)) = resolved
    else {
      error!(%sub_task_id, %tag_id, "sub task or tag not found; attach skipped");
      return false;
    };

    let owner = TagOwner::SubTask(sub_task_id);
    let attached = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::SubTask,
        sub_task_id,
        Change::Updated
      ),
      |ws| ws.attach_tag(owner, tag)
    );
    match attached {
      | Ok(true) => {}
      | Ok(false) => return true,
      | Err(err) => {
        error!(%sub_task_id, error = %err, "local attach failed");
        return false;
      }
    }

    let outcome = self
      .ctx
      .gateway
      .add_tag_to_sub_task(
        project_id,
        sub_task_id,
        tag_id
      )
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::ADD_TAG,
        EntityKind::SubTask,
        sub_task_id,
        |ws| {
          ws.detach_tag(owner, tag_id);
          Ok(())
        }
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn remove_tag_from_sub_task(
    &self,
    sub_task_id: Uuid,
    tag_id: Uuid
  ) -> bool {
    let Some(project_id) =
      self.project_of(sub_task_id)
    else {
      error!(%sub_task_id, "sub task not found; detach skipped");
      return false;
    };

    let owner = TagOwner::SubTask(sub_task_id);
    let Some(detachment) =
      self.ctx.store.mutate(
        StoreEvent::new(
          EntityKind::SubTask,
          sub_task_id,
          Change::Updated
        ),
        |ws| ws.detach_tag(owner, tag_id)
      )
    else {
      return true;
    };

    let outcome = self
      .ctx
      .gateway
      .remove_tag_from_sub_task(
        project_id,
        sub_task_id,
        tag_id
      )
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::REMOVE_TAG,
        EntityKind::SubTask,
        sub_task_id,
        |ws| ws.restore_detachment(detachment)
      )
      .is_some()
  }
}
