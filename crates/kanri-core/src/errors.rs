use std::fmt;

use chrono::{
  DateTime,
  Utc
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Project,
  TaskList,
  Task,
  SubTask,
  Tag,
  RecurrenceRule
}

impl EntityKind {
  pub fn as_str(self) -> &'static str {
    match self {
      | EntityKind::Project => "project",
      | EntityKind::TaskList => {
        "task_list"
      }
      | EntityKind::Task => "task",
      | EntityKind::SubTask => "subtask",
      | EntityKind::Tag => "tag",
      | EntityKind::RecurrenceRule => {
        "recurrence_rule"
      }
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// User-facing labels for the action
/// that failed to sync.
pub mod labels {
  pub const CREATE_PROJECT: &str =
    "プロジェクトの作成";
  pub const UPDATE_PROJECT: &str =
    "プロジェクトの更新";
  pub const DELETE_PROJECT: &str =
    "プロジェクトの削除";
  pub const MOVE_PROJECT: &str =
    "プロジェクトの並び替え";
  pub const CREATE_TASK_LIST: &str =
    "タスクリストの作成";
  pub const UPDATE_TASK_LIST: &str =
    "タスクリストの更新";
  pub const DELETE_TASK_LIST: &str =
    "タスクリストの削除";
  pub const MOVE_TASK_LIST: &str =
    "タスクリストの移動";
  pub const CREATE_TASK: &str =
    "タスクの作成";
  pub const UPDATE_TASK: &str =
    "タスクの更新";
  pub const DELETE_TASK: &str =
    "タスクの削除";
  pub const MOVE_TASK: &str =
    "タスクの移動";
  pub const SCHEDULE_OCCURRENCE: &str =
    "次回タスクの作成";
  pub const CREATE_SUB_TASK: &str =
    "サブタスクの作成";
  pub const UPDATE_SUB_TASK: &str =
    "サブタスクの更新";
  pub const DELETE_SUB_TASK: &str =
    "サブタスクの削除";
  pub const MOVE_SUB_TASK: &str =
    "サブタスクの移動";
  pub const CREATE_TAG: &str =
    "タグの作成";
  pub const UPDATE_TAG: &str =
    "タグの更新";
  pub const DELETE_TAG: &str =
    "タグの削除";
  pub const ADD_TAG: &str =
    "タグの追加";
  pub const REMOVE_TAG: &str =
    "タグの取り外し";
  pub const SAVE_RECURRENCE: &str =
    "繰り返し設定の保存";
  pub const DELETE_RECURRENCE: &str =
    "繰り返し設定の削除";
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncError {
  pub id:          Uuid,
  pub action:      String,
  pub entity_kind: EntityKind,
  pub entity_id:   Uuid,
  pub message:     String,
  pub occurred_at: DateTime<Utc>
}

/// Accumulates failed backend syncs for
/// display. Nothing here is re-thrown.
#[derive(Debug, Default)]
pub struct ErrorHandler {
  records: Mutex<Vec<SyncError>>
}

impl ErrorHandler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_sync_error(
    &self,
    action: &str,
    entity_kind: EntityKind,
    entity_id: Uuid,
    err: &anyhow::Error
  ) -> Uuid {
    let record = SyncError {
      id: Uuid::new_v4(),
      action: action.to_string(),
      entity_kind,
      entity_id,
      message: format!("{err:#}"),
      occurred_at: Utc::now()
    };
    error!(
      action,
      entity_kind = %entity_kind,
      entity_id = %entity_id,
      error = %record.message,
      "backend sync failed"
    );
    let id = record.id;
    self.records.lock().push(record);
    id
  }

  pub fn records(&self) -> Vec<SyncError> {
    self.records.lock().clone()
  }

  pub fn records_for(
    &self,
    entity_id: Uuid
  ) -> Vec<SyncError> {
    self
      .records
      .lock()
      .iter()
      .filter(|r| r.entity_id == entity_id)
      .cloned()
      .collect()
  }

  pub fn latest(
    &self
  ) -> Option<SyncError> {
    self.records.lock().last().cloned()
  }

  pub fn dismiss(
    &self,
    id: Uuid
  ) -> bool {
    let mut records =
      self.records.lock();
    let before = records.len();
    records.retain(|r| r.id != id);
    records.len() != before
  }

  pub fn clear(&self) {
    self.records.lock().clear();
  }

  pub fn len(&self) -> usize {
    self.records.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.lock().is_empty()
  }
}

#[cfg(test)]
mod tests {
  use anyhow::anyhow;

  use super::*;

  #[test]
  fn records_are_queryable_and_dismissable(
  ) {
    let handler = ErrorHandler::new();
    let task_id = Uuid::new_v4();
    let err = anyhow!("disk full")
      .context("failed to save");

    let id = handler.add_sync_error(
      labels::UPDATE_TASK,
      EntityKind::Task,
      task_id,
      &err
    );
    handler.add_sync_error(
      labels::DELETE_TAG,
      EntityKind::Tag,
      Uuid::new_v4(),
      &anyhow!("offline")
    );

    assert_eq!(handler.len(), 2);
    let for_task =
      handler.records_for(task_id);
    assert_eq!(for_task.len(), 1);
    assert_eq!(
      for_task[0].action,
      "タスクの更新"
    );
    assert_eq!(
      for_task[0].message,
      "failed to save: disk full"
    );

    assert!(handler.dismiss(id));
    assert!(!handler.dismiss(id));
    assert_eq!(
      handler
        .latest()
        .map(|r| r.entity_kind),
      Some(EntityKind::Tag)
    );
  }

  #[test]
  fn tag_actions_are_told_apart() {
    let actions = [
      labels::CREATE_TAG,
      labels::UPDATE_TAG,
      labels::DELETE_TAG,
      labels::ADD_TAG,
      labels::REMOVE_TAG
    ];
    for (i, a) in actions.iter().enumerate() {
      for b in &actions[i + 1..] {
        assert_ne!(a, b);
      }
    }
    assert_eq!(
      labels::REMOVE_TAG,
      "タグの取り外し"
    );
  }
}
