use anyhow::anyhow;
use kanri_shared::{
  Project,
  SubTask,
  Tag,
  Task,
  TaskList
};
use serde::{
  Deserialize,
  Serialize
};
use uuid::Uuid;

use crate::undo::{
  RemovalRecord,
  TagDetachment,
  TagOwner
};

/// Siblings carry a dense, zero-based
/// `order_index`.
pub trait Ordered {
  fn order_index(&self) -> u32;
  fn set_order_index(
    &mut self,
    index: u32
  );
}

macro_rules! impl_ordered {
  ($($ty:ty),*) => {
    $(
      impl Ordered for $ty {
        fn order_index(&self) -> u32 {
          self.order_index
        }

        fn set_order_index(
          &mut self,
          index: u32
        ) {
          self.order_index = index;
        }
      }
    )*
  };
}

impl_ordered!(
  Project, TaskList, Task, SubTask
);

pub fn renumber<T: Ordered>(
  items: &mut [T]
) {
  for (idx, item) in
    items.iter_mut().enumerate()
  {
    item.set_order_index(idx as u32);
  }
}

fn sort_and_renumber<T: Ordered>(
  items: &mut [T]
) {
  items.sort_by_key(|item| item.order_index());
  renumber(items);
}

fn clamp_index(
  index: Option<usize>,
  len: usize
) -> usize {
  index.map_or(len, |idx| idx.min(len))
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct ListPath {
  pub project: usize,
  pub list:    usize
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct TaskPath {
  pub project: usize,
  pub list:    usize,
  pub task:    usize
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct SubTaskPath {
  pub project:  usize,
  pub list:     usize,
  pub task:     usize,
  pub sub_task: usize
}

/// The Project → TaskList → Task →
/// SubTask tree plus the flat tag
/// registry.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct Workspace {
  pub projects: Vec<Project>,
  pub tags:     Vec<Tag>
}

impl Workspace {
  /// Builds a workspace from loaded
  /// data, ordering every level by its
  /// stored `order_index`.
  pub fn new(
    mut projects: Vec<Project>,
    tags: Vec<Tag>
  ) -> Self {
    sort_and_renumber(&mut projects);
    for project in &mut projects {
      sort_and_renumber(
        &mut project.task_lists
      );
      for list in
        &mut project.task_lists
      {
        sort_and_renumber(
          &mut list.tasks
        );
        for task in &mut list.tasks {
          sort_and_renumber(
            &mut task.sub_tasks
          );
        }
      }
    }
    Self { projects, tags }
  }

  pub fn project_index(
    &self,
    id: Uuid
  ) -> Option<usize> {
    self
      .projects
      .iter()
      .position(|p| p.id == id)
  }

  pub fn project(
    &self,
    id: Uuid
  ) -> Option<&Project> {
    self
      .projects
      .iter()
      .find(|p| p.id == id)
  }

  pub fn project_mut(
    &mut self,
    id: Uuid
  ) -> Option<&mut Project> {
    self
      .projects
      .iter_mut()
      .find(|p| p.id == id)
  }

  pub fn insert_project(
    &mut self,
    project: Project,
    index: Option<usize>
  ) -> usize {
    let idx = clamp_index(
      index,
      self.projects.len()
    );
    self.projects.insert(idx, project);
    renumber(&mut self.projects);
    idx
  }

  pub fn remove_project(
    &mut self,
    id: Uuid
  ) -> Option<RemovalRecord<Project>> {
    let index = self.project_index(id)?;
    let entity =
      self.projects.remove(index);
    renumber(&mut self.projects);
    Some(RemovalRecord {
      entity,
      container: None,
      index
    })
  }

  pub fn locate_list(
    &self,
    id: Uuid
  ) -> Option<ListPath> {
    self.projects.iter().enumerate().find_map(
      |(pi, project)| {
        project
          .task_lists
          .iter()
          .position(|l| l.id == id)
          .map(|li| ListPath {
            project: pi,
            list:    li
          })
      }
    )
  }

  pub fn task_list(
    &self,
    id: Uuid
  ) -> Option<&TaskList> {
    let path = self.locate_list(id)?;
    Some(
      &self.projects[path.project]
        .task_lists[path.list]
    )
  }

  pub fn task_list_mut(
    &mut self,
    id: Uuid
  ) -> Option<&mut TaskList> {
    let path = self.locate_list(id)?;
    Some(
      &mut self.projects[path.project]
        .task_lists[path.list]
    )
  }

  /// Inserts a list under `project_id`,
  /// pointing the list and its tasks at
  /// the new owner.
  pub fn insert_task_list(
    &mut self,
    project_id: Uuid,
    mut list: TaskList,
    index: Option<usize>
  ) -> anyhow::Result<usize> {
    let project = self
      .project_mut(project_id)
      .ok_or_else(|| {
        anyhow!(
          "project not found: \
           {project_id}"
        )
      })?;
    list.project_id = project_id;
    for task in &mut list.tasks {
      task.project_id = project_id;
    }
    let idx = clamp_index(
      index,
      project.task_lists.len()
    );
    project.task_lists.insert(idx, list);
    renumber(&mut project.task_lists);
    Ok(idx)
  }

  pub fn remove_task_list(
    &mut self,
    id: Uuid
  ) -> Option<RemovalRecord<TaskList>>
  {
    let path = self.locate_list(id)?;
    let project =
      &mut self.projects[path.project];
    let entity = project
      .task_lists
      .remove(path.list);
    renumber(&mut project.task_lists);
    Some(RemovalRecord {
      entity,
      container: Some(project.id),
      index: path.list
    })
  }

  pub fn locate_task(
    &self,
    id: Uuid
  ) -> Option<TaskPath> {
    for (pi, project) in
      self.projects.iter().enumerate()
    {
      for (li, list) in project
        .task_lists
        .iter()
        .enumerate()
      {
        if let Some(ti) = list
          .tasks
          .iter()
          .position(|t| t.id == id)
        {
          return Some(TaskPath {
            project: pi,
            list:    li,
            task:    ti
          });
        }
      }
    }
    None
  }

  pub fn task(
    &self,
    id: Uuid
  ) -> Option<&Task> {
    let path = self.locate_task(id)?;
    Some(
      &self.projects[path.project]
        .task_lists[path.list]
        .tasks[path.task]
    )
  }

  pub fn task_mut(
    &mut self,
    id: Uuid
  ) -> Option<&mut Task> {
    let path = self.locate_task(id)?;
    Some(
      &mut self.projects[path.project]
        .task_lists[path.list]
        .tasks[path.task]
    )
  }

  pub fn insert_task(
    &mut self,
    list_id: Uuid,
    mut task: Task,
    index: Option<usize>
  ) -> anyhow::Result<usize> {
    let list = self
      .task_list_mut(list_id)
      .ok_or_else(|| {
        anyhow!(
          "task list not found: \
           {list_id}"
        )
      })?;
    task.project_id = list.project_id;
    task.list_id = list.id;
    let idx =
      clamp_index(index, list.tasks.len());
    list.tasks.insert(idx, task);
    renumber(&mut list.tasks);
    Ok(idx)
  }

  pub fn remove_task(
    &mut self,
    id: Uuid
  ) -> Option<RemovalRecord<Task>> {
    let path = self.locate_task(id)?;
    let list = &mut self.projects
      [path.project]
      .task_lists[path.list];
    let entity =
      list.tasks.remove(path.task);
    renumber(&mut list.tasks);
    Some(RemovalRecord {
      entity,
      container: Some(list.id),
      index: path.task
    })
  }

  pub fn locate_sub_task(
    &self,
    id: Uuid
  ) -> Option<SubTaskPath> {
    for (pi, project) in
      self.projects.iter().enumerate()
    {
      for (li, list) in project
        .task_lists
        .iter()
        .enumerate()
      {
        for (ti, task) in
          list.tasks.iter().enumerate()
        {
          if let Some(si) = task
            .sub_tasks
            .iter()
            .position(|s| s.id == id)
          {
            return Some(SubTaskPath {
              project:  pi,
              list:     li,
              task:     ti,
              sub_task: si
            });
          }
        }
      }
    }
    None
  }

  pub fn sub_task(
    &self,
    id: Uuid
  ) -> Option<&SubTask> {
    let path =
      self.locate_sub_task(id)?;
    Some(
      &self.projects[path.project]
        .task_lists[path.list]
        .tasks[path.task]
        .sub_tasks[path.sub_task]
    )
  }

  pub fn sub_task_mut(
    &mut self,
    id: Uuid
  ) -> Option<&mut SubTask> {
    let path =
      self.locate_sub_task(id)?;
    Some(
      &mut self.projects[path.project]
        .task_lists[path.list]
        .tasks[path.task]
        .sub_tasks[path.sub_task]
    )
  }

  /// The task that owns a sub task.
  pub fn parent_task(
    &self,
    sub_task_id: Uuid
  ) -> Option<&Task> {
    let path =
      self.locate_sub_task(sub_task_id)?;
    Some(
      &self.projects[path.project]
        .task_lists[path.list]
        .tasks[path.task]
    )
  }

  pub fn insert_sub_task(
    &mut self,
    task_id: Uuid,
    mut sub_task: SubTask,
    index: Option<usize>
  ) -> anyhow::Result<usize> {
    let task = self
      .task_mut(task_id)
      .ok_or_else(|| {
        anyhow!(
          "task not found: {task_id}"
        )
      })?;
    sub_task.task_id = task_id;
    let idx = clamp_index(
      index,
      task.sub_tasks.len()
    );
    task.sub_tasks.insert(idx, sub_task);
    renumber(&mut task.sub_tasks);
    Ok(idx)
  }

  pub fn remove_sub_task(
    &mut self,
    id: Uuid
  ) -> Option<RemovalRecord<SubTask>> {
    let path =
      self.locate_sub_task(id)?;
    let task = &mut self.projects
      [path.project]
      .task_lists[path.list]
      .tasks[path.task];
    let entity =
      task.sub_tasks.remove(path.sub_task);
    renumber(&mut task.sub_tasks);
    Some(RemovalRecord {
      entity,
      container: Some(task.id),
      index: path.sub_task
    })
  }

  /// Every task, in project, list, then
  /// task order.
  pub fn tasks(
    &self
  ) -> impl Iterator<Item = &Task> {
    self.projects.iter().flat_map(
      |project| {
        project
          .task_lists
          .iter()
          .flat_map(|list| {
            list.tasks.iter()
          })
      }
    )
  }

  pub fn tag(
    &self,
    id: Uuid
  ) -> Option<&Tag> {
    self.tags.iter().find(|t| t.id == id)
  }

  pub fn tag_mut(
    &mut self,
    id: Uuid
  ) -> Option<&mut Tag> {
    self
      .tags
      .iter_mut()
      .find(|t| t.id == id)
  }

  pub fn tag_by_name(
    &self,
    name: &str
  ) -> Option<&Tag> {
    self
      .tags
      .iter()
      .find(|t| t.name == name)
  }

  pub fn insert_tag(
    &mut self,
    tag: Tag,
    index: Option<usize>
  ) -> usize {
    let idx =
      clamp_index(index, self.tags.len());
    self.tags.insert(idx, tag);
    idx
  }

  pub fn remove_tag(
    &mut self,
    id: Uuid
  ) -> Option<RemovalRecord<Tag>> {
    let index = self
      .tags
      .iter()
      .position(|t| t.id == id)?;
    Some(RemovalRecord {
      entity: self.tags.remove(index),
      container: None,
      index
    })
  }

  pub fn owner_has_tag(
    &self,
    owner: TagOwner,
    tag_id: Uuid
  ) -> bool {
    match owner {
      | TagOwner::Task(id) => self
        .task(id)
        .is_some_and(|t| t.has_tag(tag_id)),
      | TagOwner::SubTask(id) => self
        .sub_task(id)
        .is_some_and(|s| {
          s.tags
            .iter()
            .any(|t| t.id == tag_id)
        })
    }
  }

  /// Appends `tag` to the owner. Returns
  /// `Ok(false)` when it was already
  /// attached.
  pub fn attach_tag(
    &mut self,
    owner: TagOwner,
    tag: Tag
  ) -> anyhow::Result<bool> {
    self.attach_tag_at(owner, tag, None)
  }

  pub fn attach_tag_at(
    &mut self,
    owner: TagOwner,
    tag: Tag,
    index: Option<usize>
  ) -> anyhow::Result<bool> {
    match owner {
      | TagOwner::Task(id) => {
        let task = self
          .task_mut(id)
          .ok_or_else(|| {
            anyhow!(
              "task not found: {id}"
            )
          })?;
        if task.has_tag(tag.id) {
          return Ok(false);
        }
        let idx = clamp_index(
          index,
          task.tag_ids.len()
        );
        task.tag_ids.insert(idx, tag.id);
        let tag_idx =
          idx.min(task.tags.len());
        task.tags.insert(tag_idx, tag);
        Ok(true)
      }
      | TagOwner::SubTask(id) => {
        let sub_task = self
          .sub_task_mut(id)
          .ok_or_else(|| {
            anyhow!(
              "sub task not found: {id}"
            )
          })?;
        if sub_task
          .tags
          .iter()
          .any(|t| t.id == tag.id)
        {
          return Ok(false);
        }
        let idx = clamp_index(
          index,
          sub_task.tags.len()
        );
        sub_task.tags.insert(idx, tag);
        Ok(true)
      }
    }
  }

  pub fn detach_tag(
    &mut self,
    owner: TagOwner,
    tag_id: Uuid
  ) -> Option<TagDetachment> {
    match owner {
      | TagOwner::Task(id) => {
        let task = self.task_mut(id)?;
        let index = task
          .tag_ids
          .iter()
          .position(|t| *t == tag_id)?;
        let tag_idx = task
          .tags
          .iter()
          .position(|t| t.id == tag_id)?;
        task.tag_ids.remove(index);
        let tag = task.tags.remove(tag_idx);
        Some(TagDetachment {
          owner,
          tag,
          index
        })
      }
      | TagOwner::SubTask(id) => {
        let sub_task =
          self.sub_task_mut(id)?;
        let index = sub_task
          .tags
          .iter()
          .position(|t| t.id == tag_id)?;
        let tag =
          sub_task.tags.remove(index);
        Some(TagDetachment {
          owner,
          tag,
          index
        })
      }
    }
  }

  pub fn restore_detachment(
    &mut self,
    detachment: TagDetachment
  ) -> anyhow::Result<()> {
    self.attach_tag_at(
      detachment.owner,
      detachment.tag,
      Some(detachment.index)
    )?;
    Ok(())
  }

  /// Pulls a tag off every task and sub
  /// task that carries it.
  pub fn sweep_tag(
    &mut self,
    tag_id: Uuid
  ) -> Vec<TagDetachment> {
    let mut owners = Vec::new();
    for task in self.tasks() {
      if task.has_tag(tag_id) {
        owners.push(TagOwner::Task(task.id));
      }
      for sub_task in &task.sub_tasks {
        if sub_task
          .tags
          .iter()
          .any(|t| t.id == tag_id)
        {
          owners.push(TagOwner::SubTask(
            sub_task.id
          ));
        }
      }
    }

    owners
      .into_iter()
      .filter_map(|owner| {
        self.detach_tag(owner, tag_id)
      })
      .collect()
  }

  /// Rewrites the denormalized copies of
  /// `tag` held by tasks and sub tasks.
  pub fn refresh_tag_copies(
    &mut self,
    tag: &Tag
  ) -> usize {
    let mut refreshed = 0;
    for project in &mut self.projects {
      for list in
        &mut project.task_lists
      {
        for task in &mut list.tasks {
          for copy in task
            .tags
            .iter_mut()
            .chain(
              task.sub_tasks.iter_mut().flat_map(
                |s| s.tags.iter_mut()
              )
            )
            .filter(|t| t.id == tag.id)
          {
            *copy = tag.clone();
            refreshed += 1;
          }
        }
      }
    }
    refreshed
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use kanri_shared::{
    NewProject,
    NewSubTask,
    NewTask,
    NewTaskList
  };

  use super::*;

  fn sample() -> (Workspace, Uuid, Uuid)
  {
    let now = Utc::now();
    let project = NewProject {
      name: "home".to_string(),
      ..NewProject::default()
    }
    .into_project(now);
    let project_id = project.id;
    let list = NewTaskList {
      name: "errands".to_string(),
      ..NewTaskList::default()
    }
    .into_task_list(project_id, now);
    let list_id = list.id;

    let mut ws =
      Workspace::new(vec![project], vec![]);
    ws.insert_task_list(
      project_id, list, None
    )
    .expect("insert list");
    for title in ["a", "b", "c"] {
      let task = NewTask {
        title: title.to_string(),
        ..NewTask::default()
      }
      .into_task(
        Uuid::nil(),
        Uuid::nil(),
        now
      );
      ws.insert_task(list_id, task, None)
        .expect("insert task");
    }
    (ws, project_id, list_id)
  }

  fn titles(
    ws: &Workspace,
    list_id: Uuid
  ) -> Vec<(String, u32)> {
    ws.task_list(list_id)
      .expect("list")
      .tasks
      .iter()
      .map(|t| {
        (t.title.clone(), t.order_index)
      })
      .collect()
  }

  #[test]
  fn insert_sets_back_references_and_renumbers(
  ) {
    let (ws, project_id, list_id) =
      sample();
    let list =
      ws.task_list(list_id).expect("list");
    assert!(list.tasks.iter().all(|t| {
      t.project_id == project_id
        && t.list_id == list_id
    }));
    assert_eq!(
      titles(&ws, list_id),
      vec![
        ("a".to_string(), 0),
        ("b".to_string(), 1),
        ("c".to_string(), 2)
      ]
    );
  }

  #[test]
  fn remove_then_reinsert_restores_order()
  {
    let (mut ws, _, list_id) = sample();
    let b = ws
      .task_list(list_id)
      .expect("list")
      .tasks[1]
      .id;

    let record =
      ws.remove_task(b).expect("removed");
    assert_eq!(record.index, 1);
    assert_eq!(
      titles(&ws, list_id),
      vec![
        ("a".to_string(), 0),
        ("c".to_string(), 1)
      ]
    );

    ws.insert_task(
      list_id,
      record.entity,
      Some(record.index)
    )
    .expect("reinsert");
    assert_eq!(
      titles(&ws, list_id),
      vec![
        ("a".to_string(), 0),
        ("b".to_string(), 1),
        ("c".to_string(), 2)
      ]
    );
  }

  #[test]
  fn insert_index_is_clamped() {
    let (mut ws, _, list_id) = sample();
    let task = NewTask {
      title: "z".to_string(),
      ..NewTask::default()
    }
    .into_task(
      Uuid::nil(),
      Uuid::nil(),
      Utc::now()
    );
    let idx = ws
      .insert_task(list_id, task, Some(99))
      .expect("insert");
    assert_eq!(idx, 3);
  }

  #[test]
  fn sweep_and_restore_tag() {
    let (mut ws, _, list_id) = sample();
    let now = Utc::now();
    let tag = Tag::new(
      "urgent".to_string(),
      None,
      now
    );
    ws.insert_tag(tag.clone(), None);

    let tasks: Vec<Uuid> = ws
      .task_list(list_id)
      .expect("list")
      .tasks
      .iter()
      .map(|t| t.id)
      .collect();
    let sub_task = NewSubTask {
      title: "step".to_string(),
      ..NewSubTask::default()
    }
    .into_sub_task(tasks[2], now);
    let sub_id = sub_task.id;
    ws.insert_sub_task(
      tasks[2], sub_task, None
    )
    .expect("insert sub task");

    assert!(
      ws.attach_tag(
        TagOwner::Task(tasks[0]),
        tag.clone()
      )
      .expect("attach")
    );
    assert!(
      !ws
        .attach_tag(
          TagOwner::Task(tasks[0]),
          tag.clone()
        )
        .expect("attach twice")
    );
    ws.attach_tag(
      TagOwner::SubTask(sub_id),
      tag.clone()
    )
    .expect("attach sub");

    let swept = ws.sweep_tag(tag.id);
    assert_eq!(swept.len(), 2);
    assert!(ws.tasks().all(|t| {
      t.tag_ids.is_empty()
        && t.tags.is_empty()
    }));

    for detachment in swept {
      ws.restore_detachment(detachment)
        .expect("restore");
    }
    assert!(
      ws.owner_has_tag(
        TagOwner::Task(tasks[0]),
        tag.id
      )
    );
    assert!(
      ws.owner_has_tag(
        TagOwner::SubTask(sub_id),
        tag.id
      )
    );
  }

  #[test]
  fn new_orders_by_stored_index() {
    let (ws, _, list_id) = sample();
    let mut projects = ws.projects.clone();
    projects[0].task_lists[0]
      .tasks
      .reverse();
    let rebuilt =
      Workspace::new(projects, vec![]);
    assert_eq!(
      titles(&rebuilt, list_id)
        .into_iter()
        .map(|(title, _)| title)
        .collect::<Vec<_>>(),
      vec!["a", "b", "c"]
    );
  }

  #[test]
  fn detach_leaves_mismatched_lists_alone() {
    let (mut ws, _, list_id) = sample();
    let tag = Tag::new(
      "stale".to_string(),
      None,
      Utc::now()
    );
    let task_id = ws
      .task_list(list_id)
      .expect("list")
      .tasks[0]
      .id;
    // id recorded without the denormalized copy
    ws.task_mut(task_id)
      .expect("task")
      .tag_ids
      .push(tag.id);

    assert!(
      ws.detach_tag(
        TagOwner::Task(task_id),
        tag.id
      )
      .is_none()
    );
    let task = ws.task(task_id).expect("task");
    assert_eq!(task.tag_ids, vec![tag.id]);
    assert!(task.tags.is_empty());
  }
}
