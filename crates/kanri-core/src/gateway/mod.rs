//! Typed backend commands. The services
//! only ever talk to persistence through
//! [`CommandGateway`].

mod memory;
mod native;
mod state;

use std::str::FromStr;

use anyhow::anyhow;
use async_trait::async_trait;
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
pub use memory::MemoryGateway;
pub use native::FileGateway;
pub use state::{
  BackendState,
  StateBackend,
  StoredRule
};
use uuid::Uuid;

#[async_trait]
pub trait CommandGateway: Send + Sync {
  async fn load_projects(
    &self
  ) -> anyhow::Result<Vec<Project>>;

  async fn load_tags(
    &self
  ) -> anyhow::Result<Vec<Tag>>;

  async fn create_project(
    &self,
    project: &Project
  ) -> anyhow::Result<Project>;

  async fn update_project(
    &self,
    id: Uuid,
    patch: &ProjectPatch
  ) -> anyhow::Result<()>;

  async fn delete_project(
    &self,
    id: Uuid
  ) -> anyhow::Result<()>;

  async fn move_project(
    &self,
    id: Uuid,
    index: usize
  ) -> anyhow::Result<()>;

  async fn create_task_list(
    &self,
    list: &TaskList
  ) -> anyhow::Result<TaskList>;

  async fn update_task_list(
    &self,
    project_id: Uuid,
    id: Uuid,
    patch: &TaskListPatch
  ) -> anyhow::Result<()>;

  async fn delete_task_list(
    &self,
    project_id: Uuid,
    id: Uuid
  ) -> anyhow::Result<()>;

  async fn move_task_list(
    &self,
    id: Uuid,
    to_project_id: Uuid,
    index: usize
  ) -> anyhow::Result<()>;

  async fn create_task(
    &self,
    task: &Task
  ) -> anyhow::Result<Task>;

  async fn update_task(
    &self,
    project_id: Uuid,
    id: Uuid,
    patch: &TaskPatch
  ) -> anyhow::Result<()>;

  async fn delete_task(
    &self,
    project_id: Uuid,
    id: Uuid
  ) -> anyhow::Result<()>;

  async fn move_task(
    &self,
    id: Uuid,
    to_list_id: Uuid,
    index: usize
  ) -> anyhow::Result<()>;

  async fn create_sub_task(
    &self,
    project_id: Uuid,
    sub_task: &SubTask
  ) -> anyhow::Result<SubTask>;

  async fn update_sub_task(
    &self,
    project_id: Uuid,
    id: Uuid,
    patch: &SubTaskPatch
  ) -> anyhow::Result<()>;

  async fn delete_sub_task(
    &self,
    project_id: Uuid,
    id: Uuid
  ) -> anyhow::Result<()>;

  async fn move_sub_task(
    &self,
    id: Uuid,
    to_task_id: Uuid,
    index: usize
  ) -> anyhow::Result<()>;

  async fn create_tag(
    &self,
    tag: &Tag
  ) -> anyhow::Result<Tag>;

  async fn update_tag(
    &self,
    id: Uuid,
    patch: &TagPatch
  ) -> anyhow::Result<()>;

  /// Also drops the tag from every task
  /// and sub task that carries it.
  async fn delete_tag(
    &self,
    id: Uuid
  ) -> anyhow::Result<()>;

  async fn add_tag_to_task(
    &self,
    project_id: Uuid,
    task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()>;

  async fn remove_tag_from_task(
    &self,
    project_id: Uuid,
    task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()>;

  async fn add_tag_to_sub_task(
    &self,
    project_id: Uuid,
    sub_task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()>;

  async fn remove_tag_from_sub_task(
    &self,
    project_id: Uuid,
    sub_task_id: Uuid,
    tag_id: Uuid
  ) -> anyhow::Result<()>;

  async fn get_recurrence_rule(
    &self,
    project_id: Uuid,
    rule_id: Uuid
  ) -> anyhow::Result<Option<RecurrenceRule>>;

  async fn save_recurrence_rule(
    &self,
    project_id: Uuid,
    rule: &RecurrenceRule
  ) -> anyhow::Result<()>;

  async fn delete_recurrence_rule(
    &self,
    project_id: Uuid,
    rule_id: Uuid
  ) -> anyhow::Result<()>;

  /// Hands a completed recurring task to
  /// the backend. A backend that creates
  /// the next occurrence right away
  /// returns it.
  async fn schedule_next_occurrence(
    &self,
    request: &OccurrenceRequest
  ) -> anyhow::Result<Option<Task>>;
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum BackendKind {
  Native,
  Memory
}

impl FromStr for BackendKind {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str()
    {
      | "native" | "file" | "tauri" => {
        Ok(BackendKind::Native)
      }
      | "memory" | "web" | "mock" => {
        Ok(BackendKind::Memory)
      }
      | other => Err(anyhow!(
        "unknown backend: {other}"
      ))
    }
  }
}
