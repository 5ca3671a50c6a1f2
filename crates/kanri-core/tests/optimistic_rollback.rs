use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kanri_core::app::App;
use kanri_core::errors::{EntityKind, labels};
use kanri_core::gateway::{CommandGateway, MemoryGateway};
use kanri_shared::{
    NewProject, NewTask, NewTaskList, RecurrenceRule, RecurrenceUnit, TaskPatch, TaskStatus,
};
use uuid::Uuid;

struct Harness {
    gateway: Arc<MemoryGateway>,
    app: App,
    project: Uuid,
    lists: [Uuid; 2],
}

async fn harness() -> Harness {
    let gateway = Arc::new(MemoryGateway::new());
    let app = App::load(gateway.clone() as Arc<dyn CommandGateway>)
        .await
        .expect("load app");

    let project = app
        .projects
        .create_project(
            NewProject {
                name: "仕事".to_string(),
                ..NewProject::default()
            },
            None,
        )
        .await
        .expect("create project");

    let mut lists = [Uuid::nil(); 2];
    for (slot, name) in ["inbox", "later"].into_iter().enumerate() {
        lists[slot] = app
            .projects
            .create_task_list(
                project.id,
                NewTaskList {
                    name: name.to_string(),
                    ..NewTaskList::default()
                },
                None,
            )
            .await
            .expect("create list")
            .id;
    }

    Harness {
        gateway,
        app,
        project: project.id,
        lists,
    }
}

async fn add_task(h: &Harness, list: Uuid, title: &str) -> Uuid {
    h.app
        .tasks
        .create_task(
            list,
            NewTask {
                title: title.to_string(),
                ..NewTask::default()
            },
            None,
        )
        .await
        .expect("create task")
        .id
}

fn list_titles(h: &Harness, list: Uuid) -> Vec<String> {
    h.app.store.read(|ws| {
        ws.task_list(list)
            .map(|l| l.tasks.iter().map(|t| t.title.clone()).collect())
            .unwrap_or_default()
    })
}

async fn wait_for_call(gateway: &MemoryGateway, name: &str) {
    while !(gateway.calls().iter().any(|c| c == name) && gateway.in_flight() == 1) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn failed_update_restores_fields_and_records_one_error() {
    let h = harness().await;
    let id = add_task(&h, h.lists[0], "draft report").await;
    let before = h.app.store.task(id).expect("task");

    h.gateway.fail_next(1);
    let patch = TaskPatch {
        title: Some("final report".to_string()),
        priority: Some(3),
        ..TaskPatch::default()
    };
    assert!(!h.app.tasks.update_task(id, patch).await);

    let after = h.app.store.task(id).expect("task");
    assert_eq!(after.title, "draft report");
    assert_eq!(after.priority, before.priority);
    assert_eq!(after.updated_at, before.updated_at);

    let records = h.app.errors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, labels::UPDATE_TASK);
    assert_eq!(records[0].entity_kind, EntityKind::Task);
    assert_eq!(records[0].entity_id, id);

    let backend = h.gateway.workspace();
    assert_eq!(backend.task(id).expect("backend task").title, "draft report");
}

#[tokio::test]
async fn failed_delete_puts_the_task_back_at_its_index() {
    let h = harness().await;
    add_task(&h, h.lists[0], "A").await;
    let b = add_task(&h, h.lists[0], "B").await;
    add_task(&h, h.lists[0], "C").await;

    h.gateway.fail_next(1);
    assert!(!h.app.tasks.delete_task(b).await);

    assert_eq!(list_titles(&h, h.lists[0]), vec!["A", "B", "C"]);
    assert_eq!(h.app.errors.len(), 1);
    assert_eq!(h.app.errors.records()[0].action, labels::DELETE_TASK);
}

#[tokio::test]
async fn failed_create_removes_the_optimistic_entity() {
    let h = harness().await;
    h.gateway.fail_next(1);

    let created = h
        .app
        .tasks
        .create_task(
            h.lists[0],
            NewTask {
                title: "never synced".to_string(),
                ..NewTask::default()
            },
            None,
        )
        .await;

    assert!(created.is_none());
    assert!(list_titles(&h, h.lists[0]).is_empty());
    let records = h.app.errors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, labels::CREATE_TASK);
}

#[tokio::test]
async fn failed_move_returns_the_task_to_its_origin() {
    let h = harness().await;
    let first = add_task(&h, h.lists[0], "first").await;
    add_task(&h, h.lists[0], "second").await;
    add_task(&h, h.lists[1], "other").await;

    h.gateway.fail_next(1);
    assert!(!h.app.tasks.move_task(first, h.lists[1], 0).await);

    assert_eq!(list_titles(&h, h.lists[0]), vec!["first", "second"]);
    assert_eq!(list_titles(&h, h.lists[1]), vec!["other"]);
    let task = h.app.store.task(first).expect("task");
    assert_eq!(task.list_id, h.lists[0]);
    assert_eq!(h.app.errors.records()[0].action, labels::MOVE_TASK);
}

#[tokio::test]
async fn successful_move_lands_in_the_target_list() {
    let h = harness().await;
    let first = add_task(&h, h.lists[0], "first").await;
    add_task(&h, h.lists[1], "other").await;

    assert!(h.app.tasks.move_task(first, h.lists[1], 0).await);

    assert!(list_titles(&h, h.lists[0]).is_empty());
    assert_eq!(list_titles(&h, h.lists[1]), vec!["first", "other"]);
    let backend = h.gateway.workspace();
    assert_eq!(backend.task(first).expect("backend task").list_id, h.lists[1]);
    assert!(h.app.errors.is_empty());
}

#[tokio::test]
async fn optimistic_state_is_visible_while_the_backend_call_is_pending() {
    let h = harness().await;
    let id = add_task(&h, h.lists[0], "write tests").await;

    h.gateway.hold();
    let (done, ()) = tokio::join!(h.app.tasks.toggle_task_status(id), async {
        h.gateway.wait_for_in_flight(1).await;
        let task = h.app.store.task(id).expect("task");
        assert_eq!(task.status, TaskStatus::Completed);
        let backend = h.gateway.workspace();
        assert_eq!(
            backend.task(id).expect("backend task").status,
            TaskStatus::NotStarted
        );
        h.gateway.release(1);
    });

    assert!(done);
    assert_eq!(
        h.gateway.workspace().task(id).expect("backend task").status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn next_occurrence_survives_a_failed_completion() {
    let h = harness().await;
    let rule = RecurrenceRule {
        id: Uuid::new_v4(),
        unit: RecurrenceUnit::Week,
        interval: 1,
        days_of_week: vec![1],
        day_of_month: None,
        month_position: None,
        adjustment: None,
        exceptions: vec![],
        end_date: None,
        max_occurrences: None,
    };
    let id = h
        .app
        .tasks
        .create_task(
            h.lists[0],
            NewTask {
                title: "weekly review".to_string(),
                recurrence_rule: Some(rule.clone()),
                ..NewTask::default()
            },
            None,
        )
        .await
        .expect("create task")
        .id;

    let next = NewTask {
        title: "weekly review".to_string(),
        recurrence_rule: Some(rule),
        ..NewTask::default()
    }
    .into_task(h.project, h.lists[0], Utc::now());
    let next_id = next.id;
    h.gateway.set_next_occurrence(next);

    h.gateway.hold();
    let (done, ()) = tokio::join!(h.app.tasks.toggle_task_status(id), async {
        wait_for_call(&h.gateway, "schedule_next_occurrence").await;
        h.gateway.release(1);
        wait_for_call(&h.gateway, "update_task").await;
        h.gateway.fail_next(1);
        h.gateway.release(1);
    });

    assert!(!done);
    let original = h.app.store.task(id).expect("task");
    assert_eq!(original.status, TaskStatus::NotStarted);
    assert!(h.app.store.task(next_id).is_some());

    let records = h.app.errors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, labels::UPDATE_TASK);

    let requests = h.gateway.occurrence_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].task_id, id);
    assert!(h.gateway.workspace().task(next_id).is_some());
}

#[tokio::test]
async fn failed_untag_restores_the_tag_in_place() {
    let h = harness().await;
    let id = add_task(&h, h.lists[0], "groceries").await;
    let mut tag_ids = vec![];
    for name in ["shop", "home", "weekend"] {
        let tag = h
            .app
            .tags
            .get_or_create_tag(name, None)
            .await
            .expect("tag");
        assert!(h.app.tasks.add_tag_to_task(id, tag.id).await);
        tag_ids.push(tag.id);
    }

    h.gateway.fail_next(1);
    assert!(!h.app.tasks.remove_tag_from_task(id, tag_ids[1]).await);

    let task = h.app.store.task(id).expect("task");
    let names: Vec<&str> = task.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["shop", "home", "weekend"]);
    assert_eq!(h.app.errors.records()[0].action, labels::REMOVE_TAG);
}

#[tokio::test]
async fn failed_tag_delete_restores_registry_and_every_owner() {
    let h = harness().await;
    let a = add_task(&h, h.lists[0], "A").await;
    let b = add_task(&h, h.lists[1], "B").await;
    let tag = h
        .app
        .tags
        .get_or_create_tag("#urgent", None)
        .await
        .expect("tag");
    assert!(h.app.tasks.add_tag_to_task(a, tag.id).await);
    assert!(h.app.tasks.add_tag_to_task(b, tag.id).await);

    h.gateway.fail_next(1);
    assert!(!h.app.tags.delete_tag(tag.id).await);

    assert!(h.app.tags.find_by_name("urgent").is_some());
    for id in [a, b] {
        let task = h.app.store.task(id).expect("task");
        assert!(task.tags.iter().any(|t| t.id == tag.id));
    }
    assert_eq!(h.app.errors.records()[0].action, labels::DELETE_TAG);

    assert!(h.app.tags.delete_tag(tag.id).await);
    assert!(h.app.tags.find_by_name("urgent").is_none());
    let task = h.app.store.task(a).expect("task");
    assert!(task.tags.is_empty());
}

#[tokio::test]
async fn offline_backend_keeps_the_store_unchanged() {
    let h = harness().await;
    h.gateway.set_offline(true);

    let created = h
        .app
        .projects
        .create_project(
            NewProject {
                name: "趣味".to_string(),
                ..NewProject::default()
            },
            None,
        )
        .await;

    assert!(created.is_none());
    assert_eq!(h.app.projects.projects().len(), 1);
    let records = h.app.errors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, labels::CREATE_PROJECT);
    assert!(records[0].message.contains("offline"));
}

#[tokio::test]
async fn reload_replaces_the_store_from_the_backend() {
    let h = harness().await;
    add_task(&h, h.lists[0], "kept").await;

    let fresh = App::load(h.gateway.clone() as Arc<dyn CommandGateway>)
        .await
        .expect("reload");
    assert_eq!(fresh.projects.projects().len(), 1);
    assert_eq!(
        fresh.store.read(|ws| ws.tasks().count()),
        1
    );
}
