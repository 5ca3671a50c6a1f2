use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  NaiveDate,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  NotStarted,
  InProgress,
  Waiting,
  Completed,
  Cancelled
}

impl TaskStatus {
  pub fn is_completed(self) -> bool {
    self == TaskStatus::Completed
  }

  /// Completed flips back to not
  /// started; anything else completes.
  pub fn toggled(self) -> Self {
    match self {
      | TaskStatus::Completed => {
        TaskStatus::NotStarted
      }
      | _ => TaskStatus::Completed
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | TaskStatus::NotStarted => {
        "not_started"
      }
      | TaskStatus::InProgress => {
        "in_progress"
      }
      | TaskStatus::Waiting => "waiting",
      | TaskStatus::Completed => {
        "completed"
      }
      | TaskStatus::Cancelled => {
        "cancelled"
      }
    }
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .replace('-', "_")
      .as_str()
    {
      | "not_started" | "todo" => {
        Ok(TaskStatus::NotStarted)
      }
      | "in_progress" | "doing" => {
        Ok(TaskStatus::InProgress)
      }
      | "waiting" => Ok(TaskStatus::Waiting),
      | "completed" | "done" => {
        Ok(TaskStatus::Completed)
      }
      | "cancelled" | "canceled" => {
        Ok(TaskStatus::Cancelled)
      }
      | other => Err(format!(
        "unknown task status: {other}"
      ))
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct Tag {
  pub id:          Uuid,
  pub name:        String,
  #[serde(default)]
  pub color:       Option<String>,
  #[serde(default)]
  pub order_index: Option<u32>,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>
}

impl Tag {
  pub fn new(
    name: String,
    color: Option<String>,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      name,
      color,
      order_index: None,
      created_at: now,
      updated_at: now
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceUnit {
  Day,
  Week,
  Month,
  Year
}

/// "The second Tuesday" style month
/// anchoring. `week` is 1..=5, or -1
/// for the last one in the month.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct MonthPosition {
  pub week:    i8,
  pub weekday: u8
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceAdjustment {
  SkipHolidays,
  NextWeekday,
  PreviousWeekday
}

/// Stored recurrence settings. Date
/// expansion belongs to the backend.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct RecurrenceRule {
  pub id:              Uuid,
  pub unit:            RecurrenceUnit,
  pub interval:        u32,
  #[serde(default)]
  pub days_of_week:    Vec<u8>,
  #[serde(default)]
  pub day_of_month:    Option<u8>,
  #[serde(default)]
  pub month_position:  Option<MonthPosition>,
  #[serde(default)]
  pub adjustment:
    Option<RecurrenceAdjustment>,
  #[serde(default)]
  pub exceptions:      Vec<NaiveDate>,
  #[serde(default)]
  pub end_date:        Option<NaiveDate>,
  #[serde(default)]
  pub max_occurrences: Option<u32>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct SubTask {
  pub id:                Uuid,
  pub task_id:           Uuid,
  pub title:             String,
  #[serde(default)]
  pub description:       Option<String>,
  #[serde(default)]
  pub status:            TaskStatus,
  #[serde(default)]
  pub priority:          u8,
  #[serde(default)]
  pub plan_start_date:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub plan_end_date:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub do_start_date:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub do_end_date:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_range_date:     bool,
  #[serde(default)]
  pub order_index:       u32,
  #[serde(default)]
  pub completed:         bool,
  #[serde(default)]
  pub assigned_user_ids: Vec<String>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
  #[serde(default)]
  pub tags:              Vec<Tag>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Task {
  pub id:                Uuid,
  pub project_id:        Uuid,
  pub list_id:           Uuid,
  pub title:             String,
  #[serde(default)]
  pub description:       Option<String>,
  #[serde(default)]
  pub status:            TaskStatus,
  #[serde(default)]
  pub priority:          u8,
  #[serde(default)]
  pub plan_start_date:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub plan_end_date:
    Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_range_date:     bool,
  #[serde(default)]
  pub recurrence_rule:
    Option<RecurrenceRule>,
  #[serde(default)]
  pub order_index:       u32,
  #[serde(default)]
  pub is_archived:       bool,
  #[serde(default)]
  pub assigned_user_ids: Vec<String>,
  #[serde(default)]
  pub tag_ids:           Vec<Uuid>,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
  #[serde(default)]
  pub updated_by:        Option<String>,
  #[serde(default)]
  pub sub_tasks:         Vec<SubTask>,
  #[serde(default)]
  pub tags:              Vec<Tag>
}

impl Task {
  pub fn has_tag(
    &self,
    tag_id: Uuid
  ) -> bool {
    self.tag_ids.contains(&tag_id)
  }

  /// The day a task is due: the end of
  /// its range, or its single date.
  pub fn due_date(
    &self
  ) -> Option<DateTime<Utc>> {
    self
      .plan_end_date
      .or(self.plan_start_date)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct TaskList {
  pub id:          Uuid,
  pub project_id:  Uuid,
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub color:       Option<String>,
  #[serde(default)]
  pub order_index: u32,
  #[serde(default)]
  pub is_archived: bool,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
  #[serde(default)]
  pub tasks:       Vec<Task>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Project {
  pub id:          Uuid,
  pub name:        String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub color:       Option<String>,
  #[serde(default)]
  pub order_index: u32,
  #[serde(default)]
  pub is_archived: bool,
  pub created_at:  DateTime<Utc>,
  pub updated_at:  DateTime<Utc>,
  #[serde(default)]
  pub task_lists:  Vec<TaskList>
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct NewProject {
  pub name:        String,
  pub description: Option<String>,
  pub color:       Option<String>
}

impl NewProject {
  pub fn into_project(
    self,
    now: DateTime<Utc>
  ) -> Project {
    Project {
      id:          Uuid::new_v4(),
      name:        self.name,
      description: self.description,
      color:       self.color,
      order_index: 0,
      is_archived: false,
      created_at:  now,
      updated_at:  now,
      task_lists:  vec![]
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct NewTaskList {
  pub name:        String,
  pub description: Option<String>,
  pub color:       Option<String>
}

impl NewTaskList {
  pub fn into_task_list(
    self,
    project_id: Uuid,
    now: DateTime<Utc>
  ) -> TaskList {
    TaskList {
      id: Uuid::new_v4(),
      project_id,
      name: self.name,
      description: self.description,
      color: self.color,
      order_index: 0,
      is_archived: false,
      created_at: now,
      updated_at: now,
      tasks: vec![]
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct NewTask {
  pub title:             String,
  pub description:       Option<String>,
  pub status:            TaskStatus,
  pub priority:          u8,
  pub plan_start_date:
    Option<DateTime<Utc>>,
  pub plan_end_date:
    Option<DateTime<Utc>>,
  pub is_range_date:     bool,
  pub recurrence_rule:
    Option<RecurrenceRule>,
  pub assigned_user_ids: Vec<String>,
  pub updated_by:        Option<String>
}

impl NewTask {
  pub fn into_task(
    self,
    project_id: Uuid,
    list_id: Uuid,
    now: DateTime<Utc>
  ) -> Task {
    Task {
      id: Uuid::new_v4(),
      project_id,
      list_id,
      title: self.title,
      description: self.description,
      status: self.status,
      priority: self.priority,
      plan_start_date: self
        .plan_start_date,
      plan_end_date: self.plan_end_date,
      is_range_date: self.is_range_date,
      recurrence_rule: self
        .recurrence_rule,
      order_index: 0,
      is_archived: false,
      assigned_user_ids: self
        .assigned_user_ids,
      tag_ids: vec![],
      created_at: now,
      updated_at: now,
      updated_by: self.updated_by,
      sub_tasks: vec![],
      tags: vec![]
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct NewSubTask {
  pub title:             String,
  pub description:       Option<String>,
  pub status:            TaskStatus,
  pub priority:          u8,
  pub plan_start_date:
    Option<DateTime<Utc>>,
  pub plan_end_date:
    Option<DateTime<Utc>>,
  pub is_range_date:     bool,
  pub assigned_user_ids: Vec<String>
}

impl NewSubTask {
  pub fn into_sub_task(
    self,
    task_id: Uuid,
    now: DateTime<Utc>
  ) -> SubTask {
    SubTask {
      id: Uuid::new_v4(),
      task_id,
      title: self.title,
      description: self.description,
      completed: self.status.is_completed(),
      status: self.status,
      priority: self.priority,
      plan_start_date: self
        .plan_start_date,
      plan_end_date: self.plan_end_date,
      do_start_date: None,
      do_end_date: None,
      is_range_date: self.is_range_date,
      order_index: 0,
      assigned_user_ids: self
        .assigned_user_ids,
      created_at: now,
      updated_at: now,
      tags: vec![]
    }
  }
}

fn swap<T: Clone>(
  slot: &mut T,
  value: &Option<T>
) -> Option<T> {
  value.as_ref().map(|next| {
    std::mem::replace(
      slot,
      next.clone()
    )
  })
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(default)]
pub struct ProjectPatch {
  pub name:        Option<String>,
  pub description:
    Option<Option<String>>,
  pub color: Option<Option<String>>,
  pub is_archived: Option<bool>
}

impl ProjectPatch {
  /// Merges the patch and returns the
  /// patch that undoes it.
  pub fn apply(
    &self,
    project: &mut Project
  ) -> ProjectPatch {
    ProjectPatch {
      name:        swap(
        &mut project.name,
        &self.name
      ),
      description: swap(
        &mut project.description,
        &self.description
      ),
      color:       swap(
        &mut project.color,
        &self.color
      ),
      is_archived: swap(
        &mut project.is_archived,
        &self.is_archived
      )
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(default)]
pub struct TaskListPatch {
  pub name:        Option<String>,
  pub description:
    Option<Option<String>>,
  pub color: Option<Option<String>>,
  pub is_archived: Option<bool>
}

impl TaskListPatch {
  pub fn apply(
    &self,
    list: &mut TaskList
  ) -> TaskListPatch {
    TaskListPatch {
      name:        swap(
        &mut list.name,
        &self.name
      ),
      description: swap(
        &mut list.description,
        &self.description
      ),
      color:       swap(
        &mut list.color,
        &self.color
      ),
      is_archived: swap(
        &mut list.is_archived,
        &self.is_archived
      )
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(default)]
pub struct TaskPatch {
  pub title:             Option<String>,
  pub description:
    Option<Option<String>>,
  pub status: Option<TaskStatus>,
  pub priority:          Option<u8>,
  pub plan_start_date:
    Option<Option<DateTime<Utc>>>,
  pub plan_end_date:
    Option<Option<DateTime<Utc>>>,
  pub is_range_date:     Option<bool>,
  pub recurrence_rule:
    Option<Option<RecurrenceRule>>,
  pub is_archived:       Option<bool>,
  pub assigned_user_ids:
    Option<Vec<String>>,
  pub updated_by:
    Option<Option<String>>
}

impl TaskPatch {
  pub fn status(
    status: TaskStatus
  ) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  pub fn apply(
    &self,
    task: &mut Task
  ) -> TaskPatch {
    TaskPatch {
      title:             swap(
        &mut task.title,
        &self.title
      ),
      description:       swap(
        &mut task.description,
        &self.description
      ),
      status:            swap(
        &mut task.status,
        &self.status
      ),
      priority:          swap(
        &mut task.priority,
        &self.priority
      ),
      plan_start_date:   swap(
        &mut task.plan_start_date,
        &self.plan_start_date
      ),
      plan_end_date:     swap(
        &mut task.plan_end_date,
        &self.plan_end_date
      ),
      is_range_date:     swap(
        &mut task.is_range_date,
        &self.is_range_date
      ),
      recurrence_rule:   swap(
        &mut task.recurrence_rule,
        &self.recurrence_rule
      ),
      is_archived:       swap(
        &mut task.is_archived,
        &self.is_archived
      ),
      assigned_user_ids: swap(
        &mut task.assigned_user_ids,
        &self.assigned_user_ids
      ),
      updated_by:        swap(
        &mut task.updated_by,
        &self.updated_by
      )
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(default)]
pub struct SubTaskPatch {
  pub title:             Option<String>,
  pub description:
    Option<Option<String>>,
  pub status: Option<TaskStatus>,
  pub priority:          Option<u8>,
  pub plan_start_date:
    Option<Option<DateTime<Utc>>>,
  pub plan_end_date:
    Option<Option<DateTime<Utc>>>,
  pub do_start_date:
    Option<Option<DateTime<Utc>>>,
  pub do_end_date:
    Option<Option<DateTime<Utc>>>,
  pub is_range_date:     Option<bool>,
  pub completed:         Option<bool>,
  pub assigned_user_ids:
    Option<Vec<String>>
}

impl SubTaskPatch {
  pub fn status(
    status: TaskStatus
  ) -> Self {
    Self {
      status: Some(status),
      ..Self::default()
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }

  /// A status change also rewrites the
  /// legacy `completed` flag unless the
  /// patch sets that flag itself.
  pub fn apply(
    &self,
    sub_task: &mut SubTask
  ) -> SubTaskPatch {
    let completed = self
      .completed
      .or_else(|| {
        self
          .status
          .map(TaskStatus::is_completed)
      });

    SubTaskPatch {
      title:             swap(
        &mut sub_task.title,
        &self.title
      ),
      description:       swap(
        &mut sub_task.description,
        &self.description
      ),
      status:            swap(
        &mut sub_task.status,
        &self.status
      ),
      priority:          swap(
        &mut sub_task.priority,
        &self.priority
      ),
      plan_start_date:   swap(
        &mut sub_task.plan_start_date,
        &self.plan_start_date
      ),
      plan_end_date:     swap(
        &mut sub_task.plan_end_date,
        &self.plan_end_date
      ),
      do_start_date:     swap(
        &mut sub_task.do_start_date,
        &self.do_start_date
      ),
      do_end_date:       swap(
        &mut sub_task.do_end_date,
        &self.do_end_date
      ),
      is_range_date:     swap(
        &mut sub_task.is_range_date,
        &self.is_range_date
      ),
      completed:         swap(
        &mut sub_task.completed,
        &completed
      ),
      assigned_user_ids: swap(
        &mut sub_task.assigned_user_ids,
        &self.assigned_user_ids
      )
    }
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(default)]
pub struct TagPatch {
  pub name:        Option<String>,
  pub color: Option<Option<String>>,
  pub order_index: Option<Option<u32>>
}

impl TagPatch {
  pub fn apply(
    &self,
    tag: &mut Tag
  ) -> TagPatch {
    TagPatch {
      name:        swap(
        &mut tag.name,
        &self.name
      ),
      color:       swap(
        &mut tag.color,
        &self.color
      ),
      order_index: swap(
        &mut tag.order_index,
        &self.order_index
      )
    }
  }
}

/// A request for the backend to work out
/// and create the next occurrence of a
/// recurring task.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct OccurrenceRequest {
  pub task_id:      Uuid,
  pub project_id:   Uuid,
  pub list_id:      Uuid,
  pub rule:         RecurrenceRule,
  pub completed_at: DateTime<Utc>
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn sample_task() -> Task {
    let now = Utc
      .with_ymd_and_hms(
        2026, 3, 1, 9, 0, 0
      )
      .single()
      .expect("valid timestamp");
    NewTask {
      title: "write report".to_string(),
      priority: 2,
      ..NewTask::default()
    }
    .into_task(
      Uuid::new_v4(),
      Uuid::new_v4(),
      now
    )
  }

  #[test]
  fn task_patch_inverse_restores_fields()
  {
    let mut task = sample_task();
    let before = task.clone();

    let patch = TaskPatch {
      title: Some(
        "final report".to_string()
      ),
      description: Some(Some(
        "with appendix".to_string()
      )),
      status: Some(
        TaskStatus::InProgress
      ),
      ..TaskPatch::default()
    };
    let inverse = patch.apply(&mut task);
    assert_eq!(task.title, "final report");
    assert_eq!(
      task.status,
      TaskStatus::InProgress
    );
    assert_eq!(inverse.priority, None);

    inverse.apply(&mut task);
    assert_eq!(task, before);
  }

  #[test]
  fn sub_task_status_tracks_legacy_flag()
  {
    let now = Utc::now();
    let mut sub_task = NewSubTask {
      title: "draft".to_string(),
      ..NewSubTask::default()
    }
    .into_sub_task(Uuid::new_v4(), now);
    assert!(!sub_task.completed);

    let inverse = SubTaskPatch::status(
      TaskStatus::Completed
    )
    .apply(&mut sub_task);
    assert!(sub_task.completed);

    inverse.apply(&mut sub_task);
    assert!(!sub_task.completed);
    assert_eq!(
      sub_task.status,
      TaskStatus::NotStarted
    );
  }

  #[test]
  fn status_parses_aliases_and_toggles()
  {
    assert_eq!(
      "done".parse::<TaskStatus>(),
      Ok(TaskStatus::Completed)
    );
    assert_eq!(
      "in-progress".parse::<TaskStatus>(),
      Ok(TaskStatus::InProgress)
    );
    assert_eq!(
      TaskStatus::Completed.toggled(),
      TaskStatus::NotStarted
    );
    assert_eq!(
      TaskStatus::Waiting.toggled(),
      TaskStatus::Completed
    );
  }

  #[test]
  fn status_serializes_snake_case() {
    let raw = serde_json::to_string(
      &TaskStatus::NotStarted
    )
    .expect("serialize status");
    assert_eq!(raw, "\"not_started\"");
  }
}
