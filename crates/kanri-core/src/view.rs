use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDate;
use kanri_shared::Task;

use crate::store::EntityStore;

const PROJECT_FALLBACK_TITLE: &str =
  "プロジェクト";
const TASK_LIST_FALLBACK_TITLE: &str =
  "タスクリスト";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ViewKind {
  Project,
  TaskList,
  Today,
  Overdue,
  Completed
}

impl ViewKind {
  pub fn as_str(self) -> &'static str {
    match self {
      | ViewKind::Project => "project",
      | ViewKind::TaskList => "tasklist",
      | ViewKind::Today => "today",
      | ViewKind::Overdue => "overdue",
      | ViewKind::Completed => "completed"
    }
  }

  /// Only container views can take new
  /// tasks directly.
  pub fn show_add_button(self) -> bool {
    matches!(
      self,
      ViewKind::Project | ViewKind::TaskList
    )
  }
}

impl fmt::Display for ViewKind {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ViewKind {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str()
    {
      | "project" => Ok(ViewKind::Project),
      | "tasklist" | "list" => {
        Ok(ViewKind::TaskList)
      }
      | "today" => Ok(ViewKind::Today),
      | "overdue" => Ok(ViewKind::Overdue),
      | "completed" | "done" => {
        Ok(ViewKind::Completed)
      }
      | other => {
        Err(anyhow!("unknown view: {other}"))
      }
    }
  }
}

pub fn show_add_button(kind: ViewKind) -> bool {
  kind.show_add_button()
}

/// Tasks for a view, in display order.
/// Container views follow the current
/// selection and are empty without one.
pub fn tasks_for_view(
  store: &EntityStore,
  kind: ViewKind,
  today: NaiveDate
) -> Vec<Task> {
  let selection = store.selection();
  match kind {
    | ViewKind::Project => {
      let Some(project_id) = selection.project_id
      else {
        return vec![];
      };
      store.read(|ws| {
        ws.project(project_id)
          .map(|project| {
            project
              .task_lists
              .iter()
              .flat_map(|list| list.tasks.iter())
              .cloned()
              .collect()
          })
          .unwrap_or_default()
      })
    }
    | ViewKind::TaskList => {
      let Some(list_id) = selection.list_id
      else {
        return vec![];
      };
      store.read(|ws| {
        ws.task_list(list_id)
          .map(|list| list.tasks.clone())
          .unwrap_or_default()
      })
    }
    | ViewKind::Today => store.today_tasks(today),
    | ViewKind::Overdue => {
      store.overdue_tasks(today)
    }
    | ViewKind::Completed => {
      store.completed_tasks()
    }
  }
}

pub fn view_title(
  store: &EntityStore,
  kind: ViewKind
) -> String {
  let selection = store.selection();
  match kind {
    | ViewKind::Project => selection
      .project_id
      .and_then(|id| {
        store.read(|ws| {
          ws.project(id).map(|p| p.name.clone())
        })
      })
      .unwrap_or_else(|| {
        PROJECT_FALLBACK_TITLE.to_string()
      }),
    | ViewKind::TaskList => selection
      .list_id
      .and_then(|id| {
        store.read(|ws| {
          let list = ws.task_list(id)?;
          let project =
            ws.project(list.project_id)?;
          Some(format!(
            "{} > {}",
            project.name, list.name
          ))
        })
      })
      .unwrap_or_else(|| {
        TASK_LIST_FALLBACK_TITLE.to_string()
      }),
    | ViewKind::Today => "今日".to_string(),
    | ViewKind::Overdue => {
      "期限切れ".to_string()
    }
    | ViewKind::Completed => {
      "完了済み".to_string()
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Duration,
    TimeZone,
    Utc
  };
  use kanri_shared::{
    NewProject,
    NewTask,
    NewTaskList,
    TaskStatus
  };
  use uuid::Uuid;

  use super::*;
  use crate::workspace::Workspace;

  struct Fixture {
    store:    EntityStore,
    project:  Uuid,
    lists:    [Uuid; 2],
    today:    NaiveDate
  }

  fn fixture() -> Fixture {
    let now = Utc
      .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
      .single()
      .expect("valid now");
    let today = NaiveDate::from_ymd_opt(2026, 2, 17)
      .expect("valid date");
    let project = NewProject {
      name: "仕事".to_string(),
      ..NewProject::default()
    }
    .into_project(now);
    let project_id = project.id;
    let mut ws =
      Workspace::new(vec![project], vec![]);

    let mut lists = [Uuid::nil(); 2];
    for (slot, (name, titles)) in [
      ("first", vec!["A", "B"]),
      ("second", vec!["C"])
    ]
    .into_iter()
    .enumerate()
    {
      let list = NewTaskList {
        name: name.to_string(),
        ..NewTaskList::default()
      }
      .into_task_list(project_id, now);
      lists[slot] = list.id;
      ws.insert_task_list(project_id, list, None)
        .expect("insert list");
      for title in titles {
        let task = NewTask {
          title: title.to_string(),
          ..NewTask::default()
        }
        .into_task(project_id, lists[slot], now);
        ws.insert_task(lists[slot], task, None)
          .expect("insert task");
      }
    }

    Fixture {
      store: EntityStore::new(ws),
      project: project_id,
      lists,
      today
    }
  }

  fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
  }

  #[test]
  fn project_view_walks_lists_in_order() {
    let fx = fixture();
    assert!(
      tasks_for_view(&fx.store, ViewKind::Project, fx.today)
        .is_empty()
    );

    fx.store.select_project(Some(fx.project));
    let tasks = tasks_for_view(
      &fx.store,
      ViewKind::Project,
      fx.today
    );
    assert_eq!(titles(&tasks), vec!["A", "B", "C"]);
    assert_eq!(
      view_title(&fx.store, ViewKind::Project),
      "仕事"
    );
  }

  #[test]
  fn list_view_is_scoped_to_the_selected_list() {
    let fx = fixture();
    assert_eq!(
      view_title(&fx.store, ViewKind::TaskList),
      "タスクリスト"
    );

    fx.store.select_list(Some(fx.lists[1]));
    let tasks = tasks_for_view(
      &fx.store,
      ViewKind::TaskList,
      fx.today
    );
    assert_eq!(titles(&tasks), vec!["C"]);
    assert_eq!(
      view_title(&fx.store, ViewKind::TaskList),
      "仕事 > second"
    );
    assert_eq!(
      view_title(&fx.store, ViewKind::Project),
      "プロジェクト"
    );
  }

  #[test]
  fn smart_views_filter_by_date_and_status() {
    let fx = fixture();
    let noon = Utc
      .with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
      .single()
      .expect("valid time");
    let ids: Vec<Uuid> = fx
      .store
      .read(|ws| ws.tasks().map(|t| t.id).collect());

    fx.store.mutate(
      crate::store::StoreEvent::reloaded(),
      |ws| {
        if let Some(a) = ws.task_mut(ids[0]) {
          a.plan_start_date = Some(noon);
        }
        if let Some(b) = ws.task_mut(ids[1]) {
          b.plan_start_date =
            Some(noon - Duration::days(3));
        }
        if let Some(c) = ws.task_mut(ids[2]) {
          c.status = TaskStatus::Completed;
          c.plan_start_date =
            Some(noon - Duration::days(3));
        }
      }
    );

    let today =
      tasks_for_view(&fx.store, ViewKind::Today, fx.today);
    assert_eq!(titles(&today), vec!["A"]);
    let overdue = tasks_for_view(
      &fx.store,
      ViewKind::Overdue,
      fx.today
    );
    assert_eq!(titles(&overdue), vec!["B"]);
    let done = tasks_for_view(
      &fx.store,
      ViewKind::Completed,
      fx.today
    );
    assert_eq!(titles(&done), vec!["C"]);
  }

  #[test]
  fn add_button_only_on_container_views() {
    assert!(show_add_button(ViewKind::Project));
    assert!(show_add_button(ViewKind::TaskList));
    assert!(!show_add_button(ViewKind::Today));
    assert!(!show_add_button(ViewKind::Completed));
    assert_eq!(
      "list".parse::<ViewKind>().expect("parse"),
      ViewKind::TaskList
    );
  }
}
