use anyhow::{
  anyhow,
  bail
};
use async_trait::async_trait;
use chrono::Utc;
use kanri_shared::{
  OccurrenceRequest,
  Project,
  ProjectPatch,
  RecurrenceRule,
  SubTask,
  SubTaskPatch,
  Tag,
  TagPatch,
  Task,
  TaskList,
  TaskListPatch,
  TaskPatch
};
use serde::{
  Deserialize,
  Serialize
};
use tracing::debug;
use uuid::Uuid;

use super::CommandGateway;
use crate::undo::TagOwner;
use crate::workspace::Workspace;

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct StoredRule {
  pub project_id: Uuid,
  pub rule:       RecurrenceRule
}

/// Everything a local backend persists.
#[derive(Debug, Clone, Default)]
pub struct BackendState {
  pub workspace:   Workspace,
  pub rules:       Vec<StoredRule>,
  pub occurrences: Vec<OccurrenceRequest>
}

/// A backend that keeps a [`BackendState`]
/// somewhere and can run a change against
/// it atomically. Every such backend gets
/// [`CommandGateway`] for free.
#[async_trait]
pub trait StateBackend: Send + Sync {
  /// Runs before each command; may fail
  /// the command outright.
  async fn begin(
    &self,
    command: &'static str
  ) -> anyhow::Result<()>;

  fn read<R>(
    &self,
    f: impl FnOnce(&BackendState) -> R
  ) -> anyhow::Result<R>;

  /// Applies `f`; the change is kept only
  /// if `f` succeeds.
  fn transact<R>(
    &self,
    f: impl FnOnce(
      &mut BackendState
    ) -> anyhow::Result<R>
  ) -> anyhow::Result<R>;

  fn occurrence_reply(
    &self,
    _request: &OccurrenceRequest
  ) -> Option<Task> {
    None
  }
}

fn ensure_task_in_project(
  ws: &Workspace,
  project_id: Uuid,
  task_id: Uuid
) -> anyhow::Result<()> {
  let task = ws.task(task_id).ok_or_else(
    || anyhow!("task not found: {task_id}")
  )?;
  if task.project_id != project_id {
    bail!(
      "task {task_id} does not belong \
       to project {project_id}"
    );
  }
  Ok(())
}

fn ensure_sub_task_in_project(
  ws: &Workspace,
  project_id: Uuid,
  sub_task_id: Uuid
) -> anyhow::Result<()> {
  let parent = ws
    .parent_task(sub_task_id)
    .ok_or_else(|| {
      anyhow!(
        "sub task not found: \
         {sub_task_id}"
      )
    })?;
  if parent.project_id != project_id {
    bail!(
      "sub task {sub_task_id} does not \
       belong to project {project_id}"
    );
  }
  Ok(())
}

fn attach_registered_tag(
  ws: &mut Workspace,
  owner: TagOwner,
  tag_id: Uuid
) -> anyhow::Result<()> {
  let tag = ws
    .tag(tag_id)
    .cloned()
    .ok_or_else(|| {
      anyhow!("tag not found: {tag_id}")
    })?;
  ws.attach_tag(owner, tag)?;
  Ok(())
}

#[async_trait]
impl<B: StateBackend> CommandGateway for B {
  async fn load_projects(
    &self
  ) -> anyhow::Result<Vec<Project>> {
    self.begin("load_projects").await?;
    self.read(|state| {
      state.workspace.projects.clone()
    })
  }

  async fn load_tags(
    &self
  ) -> anyhow::Result<Vec<Tag>> {
    self.begin("load_tags").await?;
    self.read(|state| {
      state.workspace.tags.clone()
    })
  }

  async fn create_project(
    &self,
    project: &Project
  ) -> anyhow::Result<Project> {
    self.begin("create_project").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.project(project.id).is_some() {
        bail!(
          "project already exists: {}",
          project.id
        );
      }
      ws.insert_project(
        project.clone(),
        Some(project.order_index as usize)
      );
      Ok(project.clone())
    })
  }

  async fn update_project(
    &self,
    id: Uuid,
    patch: &ProjectPatch
  ) -> anyhow::Result<()> {
    self.begin("update_project").await?;
    self.transact(|state| {
      let project = state
        .workspace
        .project_mut(id)
        .ok_or_else(|| {
          anyhow!(
            "project not found: {id}"
          )
        })?;
      patch.apply(project);
      project.updated_at = Utc::now();
      Ok(())
    })
  }

  async fn delete_project(
    &self,
    id: Uuid
  ) -> anyhow::Result<()> {
    self.begin("delete_project").await?;
    self.transact(|state| {
      state
        .workspace
        .remove_project(id)
        .ok_or_else(|| {
          anyhow!(
            "project not found: {id}"
          )
        })?;
      state
        .rules
        .retain(|r| r.project_id != id);
      Ok(())
    })
  }

  async fn move_project(
    &self,
    id: Uuid,
    index: usize
  ) -> anyhow::Result<()> {
    self.begin("move_project").await?;
    self.transact(|state| {
      let removed = state
        .workspace
        .remove_project(id)
        .ok_or_else(|| {
          anyhow!(
            "project not found: {id}"
          )
        })?;
      state.workspace.insert_project(
        removed.entity,
        Some(index)
      );
      Ok(())
    })
  }

  async fn create_task_list(
    &self,
    list: &TaskList
  ) -> anyhow::Result<TaskList> {
    self
      .begin("create_task_list")
      .await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.task_list(list.id).is_some() {
        bail!(
          "task list already exists: {}",
          list.id
        );
      }
      ws.insert_task_list(
        list.project_id,
        list.clone(),
        Some(list.order_index as usize)
      )?;
      Ok(list.clone())
    })
  }

  async fn update_task_list(
    &self,
    project_id: Uuid,
    id: Uuid,
    patch: &TaskListPatch
  ) -> anyhow::Result<()> {
    self
      .begin("update_task_list")
      .await?;
    self.transact(|state| {
      let list = state
        .workspace
        .task_list_mut(id)
        .filter(|l| {
          l.project_id == project_id
        })
        .ok_or_else(|| {
          anyhow!(
            "task list not found: {id}"
          )
        })?;
      patch.apply(list);
      list.updated_at = Utc::now();
      Ok(())
    })
  }

  async fn delete_task_list(
    &self,
    project_id: Uuid,
    id: Uuid
  ) -> anyhow::Result<()> {
    self
      .begin("delete_task_list")
      .await?;
    self.transact(|state| {
      let removed = state
        .workspace
        .remove_task_list(id)
        .ok_or_else(|| {
          anyhow!(
            "task list not found: {id}"
          )
        })?;
      if removed.container
        != Some(project_id)
      {
        bail!(
          "task list {id} does not \
           belong to project \
           {project_id}"
        );
      }
      Ok(())
    })
  }

  async fn move_task_list(
    &self,
    id: Uuid,
    to_project_id: Uuid,
    index: usize
  ) -> anyhow::Result<()> {
    self.begin("move_task_list").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.project(to_project_id).is_none()
      {
        bail!(
          "project not found: \
           {to_project_id}"
        );
      }
      let removed = ws
        .remove_task_list(id)
        .ok_or_else(|| {
          anyhow!(
            "task list not found: {id}"
          )
        })?;
      ws.insert_task_list(
        to_project_id,
        removed.entity,
        Some(index)
      )?;
      Ok(())
    })
  }

  async fn create_task(
    &self,
    task: &Task
  ) -> anyhow::Result<Task> {
    self.begin("create_task").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.task(task.id).is_some() {
        bail!(
          "task already exists: {}",
          task.id
        );
      }
      ws.insert_task(
        task.list_id,
        task.clone(),
        Some(task.order_index as usize)
      )?;
      debug!(task_id = %task.id, "stored task");
      Ok(task.clone())
    })
  }

  async fn update_task(
    &self,
    project_id: Uuid,
    id: Uuid,
    patch: &TaskPatch
  ) -> anyhow::Result<()> {
    self.begin("update_task").await?;
    self.transact(|state| {
      ensure_task_in_project(
        &state.workspace,
        project_id,
        id
      )?;
      if let Some(task) =
        state.workspace.task_mut(id)
      {
        patch.apply(task);
        task.updated_at = Utc::now();
      }
      Ok(())
    })
  }

  async fn delete_task(
    &self,
    project_id: Uuid,
    id: Uuid
  ) -> anyhow::Result<()> {
    self.begin("delete_task").await?;
    self.transact(|state| {
      ensure_task_in_project(
        &state.workspace,
        project_id,
        id
      )?;
      state.workspace.remove_task(id);
      Ok(())
    })
  }

  async fn move_task(
    &self,
    id: Uuid,
    to_list_id: Uuid,
    index: usize
  ) -> anyhow::Result<()> {
    self.begin("move_task").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.task_list(to_list_id).is_none()
      {
        bail!(
          "task list not found: \
           {to_list_id}"
        );
      }
      let removed =
        ws.remove_task(id).ok_or_else(
          || anyhow!("task not found: {id}")
        )?;
      ws.insert_task(
        to_list_id,
        removed.entity,
        Some(index)
      )?;
      Ok(())
    })
  }

  async fn create_sub_task(
    &self,
    project_id: Uuid,
    sub_task: &SubTask
  ) -> anyhow::Result<SubTask> {
    self.begin("create_sub_task").await?;
    self.transact(|state| {
      ensure_task_in_project(
        &state.workspace,
        project_id,
        sub_task.task_id
      )?;
      if state
        .workspace
        .sub_task(sub_task.id)
        .is_some()
      {
        bail!(
          "sub task already exists: {}",
          sub_task.id
        );
      }
      state.workspace.insert_sub_task(
        sub_task.task_id,
        sub_task.clone(),
        Some(sub_task.order_index as usize)
      )?;
      Ok(sub_task.clone())
    })
  }

  async fn update_sub_task(
    &self,
    project_id: Uuid,
    id: Uuid,
    patch: &SubTaskPatch
  ) -> anyhow::Result<()> {
    self.begin("update_sub_task").await?;
    self.transact(|state| {
      ensure_sub_task_in_project(
        &state.workspace,
        project_id,
        id
      )?;
      if let Some(sub_task) =
        state.workspace.sub_task_mut(id)
      {
        patch.apply(sub_task);
        sub_task.updated_at = Utc::now();
      }
      Ok(())
    })
  }

  async fn delete_sub_task(
    &self,
    project_id: Uuid,
    id: Uuid
  ) -> anyhow::Result<()> {
    self.begin("delete_sub_task").await?;
    self.transact(|state| {
      ensure_sub_task_in_project(
        &state.workspace,
        project_id,
        id
      )?;
      state.workspace.remove_sub_task(id);
      Ok(())
    })
  }

  async fn move_sub_task(
    &self,
    id: Uuid,
    to_task_id: Uuid,
    index: usize
  ) -> anyhow::Result<()> {
    self.begin("move_sub_task").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.task(to_task_id).is_none() {
        bail!(
          "task not found: {to_task_id}"
        );
      }
      let removed = ws
        .remove_sub_task(id)
        .ok_or_else(|| {
          anyhow!(
            "sub task not found: {id}"
          )
        })?;
      ws.insert_sub_task(
        to_task_id,
        removed.entity,
        Some(index)
      )?;
      Ok(())
    })
  }

  async fn create_tag(
    &self,
    tag: &Tag
  ) -> anyhow::Result<Tag> {
    self.begin("create_tag").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      if ws.tag(tag.id).is_some() {
        bail!(
          "tag already exists: {}",
          tag.id
        );
      }
      ws.insert_tag(tag.clone(), None);
      Ok(tag.clone())
    })
  }

  async fn update_tag(
    &self,
    id: Uuid,
    patch: &TagPatch
  ) -> anyhow::Result<()> {
    self.begin("update_tag").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      let tag = ws.tag_mut(id).ok_or_else(
        || anyhow!("tag not found: {id}")
      )?;
      patch.apply(tag);
      tag.updated_at = Utc::now();
      let updated = tag.clone();
      ws.refresh_tag_copies(&updated);
      Ok(())
    })
  }

  async fn delete_tag(
    &self,
    id: Uuid
  ) -> anyhow::Result<()> {
    self.begin("delete_tag").await?;
    self.transact(|state| {
      let ws = &mut state.workspace;
      ws.remove_tag(id).ok_or_else(|| {
        anyhow!("tag not found: {id}")
      })?;
      let swept = ws.sweep_tag(id);
      debug!(tag_id = %id, owners = swept.len(), "swept deleted tag");
      Ok(())
    })
  }

  async fn add_tag_to_task(
    &self,
    project_id: Uuid,
    task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()> {
    self.begin("add_tag_to_task").await?;
    self.transact(|state| {
      ensure_task_in_project(
        &state.workspace,
        project_id,
        task_id
      )?;
      attach_registered_tag(
        &mut state.workspace,
        TagOwner::Task(task_id),
        tag_id
      )
    })
  }

  async fn remove_tag_from_task(
    &self,
    project_id: Uuid,
    task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()> {
    self
      .begin("remove_tag_from_task")
      .await?;
    self.transact(|state| {
      ensure_task_in_project(
        &state.workspace,
        project_id,
        task_id
      )?;
      state.workspace.detach_tag(
        TagOwner::Task(task_id),
        tag_id
      );
      Ok(())
    })
  }

  async fn add_tag_to_sub_task(
    &self,
    project_id: Uuid,
    sub_task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()> {
    self
      .begin("add_tag_to_sub_task")
      .await?;
    self.transact(|state| {
      ensure_sub_task_in_project(
        &state.workspace,
        project_id,
        sub_task_id
      )?;
      attach_registered_tag(
        &mut state.workspace,
        TagOwner::SubTask(sub_task_id),
        tag_id
      )
    })
  }

  async fn remove_tag_from_sub_task(
    &self,
    project_id: Uuid,
    sub_task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()> {
    self
      .begin("remove_tag_from_sub_task")
      .await?;
    self.transact(|state| {
      ensure_sub_task_in_project(
        &state.workspace,
        project_id,
        sub_task_id
      )?;
      state.workspace.detach_tag(
        TagOwner::SubTask(sub_task_id),
        tag_id
      );
      Ok(())
    })
  }

  async fn get_recurrence_rule(
    &self,
    project_id: Uuid,
    rule_id: Uuid
  ) -> anyhow::Result<Option<RecurrenceRule>>
  {
    self
      .begin("get_recurrence_rule")
      .await?;
    self.read(|state| {
      state
        .rules
        .iter()
        .find(|r| {
          r.project_id == project_id
            && r.rule.id == rule_id
        })
        .map(|r| r.rule.clone())
    })
  }

  async fn save_recurrence_rule(
    &self,
    project_id: Uuid,
    rule: &RecurrenceRule
  ) -> anyhow::Result<()> {
    self
      .begin("save_recurrence_rule")
      .await?;
    self.transact(|state| {
      if state
        .workspace
        .project(project_id)
        .is_none()
      {
        bail!(
          "project not found: \
           {project_id}"
        );
      }
      let stored = StoredRule {
        project_id,
        rule: rule.clone()
      };
      match state.rules.iter_mut().find(
        |r| {
          r.project_id == project_id
            && r.rule.id == rule.id
        }
      ) {
        | Some(existing) => {
          *existing = stored
        }
        | None => state.rules.push(stored)
      }
      Ok(())
    })
  }

  async fn delete_recurrence_rule(
    &self,
    project_id: Uuid,
    rule_id: Uuid
  ) -> anyhow::Result<()> {
    self
      .begin("delete_recurrence_rule")
      .await?;
    self.transact(|state| {
      let before = state.rules.len();
      state.rules.retain(|r| {
        !(r.project_id == project_id
          && r.rule.id == rule_id)
      });
      if state.rules.len() == before {
        bail!(
          "recurrence rule not found: \
           {rule_id}"
        );
      }
      Ok(())
    })
  }

  async fn schedule_next_occurrence(
    &self,
    request: &OccurrenceRequest
  ) -> anyhow::Result<Option<Task>> {
    self
      .begin("schedule_next_occurrence")
      .await?;
    let reply = self.occurrence_reply(request);
    self.transact(|state| {
      state.occurrences.push(request.clone());
      if let Some(next) = reply.as_ref() {
        state.workspace.insert_task(
          next.list_id,
          next.clone(),
          Some(next.order_index as usize)
        )?;
      }
      Ok(reply)
    })
  }
}
