use std::sync::Arc;

use kanri_core::app::App;
use kanri_core::datastore::DataStore;
use kanri_core::gateway::{CommandGateway, FileGateway};
use kanri_core::view::{ViewKind, tasks_for_view, view_title};
use kanri_shared::{
    NewProject, NewSubTask, NewTask, NewTaskList, RecurrenceRule, RecurrenceUnit, TaskStatus,
};
use tempfile::tempdir;

async fn open(dir: &std::path::Path) -> App {
    let gateway = FileGateway::open(dir).expect("open data dir");
    App::load(Arc::new(gateway) as Arc<dyn CommandGateway>)
        .await
        .expect("load app")
}

#[tokio::test]
async fn changes_survive_a_reload_from_disk() {
    let temp = tempdir().expect("tempdir");

    let (project_id, list_id, task_id) = {
        let app = open(temp.path()).await;
        let project = app
            .projects
            .create_project(
                NewProject {
                    name: "家事".to_string(),
                    ..NewProject::default()
                },
                None,
            )
            .await
            .expect("create project");
        let list = app
            .projects
            .create_task_list(
                project.id,
                NewTaskList {
                    name: "買い物".to_string(),
                    ..NewTaskList::default()
                },
                None,
            )
            .await
            .expect("create list");
        let task = app
            .tasks
            .create_task_from_text(list.id, "buy #milk and #eggs")
            .await
            .expect("create task");
        assert_eq!(task.title, "buy and");

        app.sub_tasks
            .create_sub_task(
                task.id,
                NewSubTask {
                    title: "check fridge".to_string(),
                    ..NewSubTask::default()
                },
                None,
            )
            .await
            .expect("create sub task");
        assert!(app.tasks.toggle_task_status(task.id).await);
        assert!(app.errors.is_empty());

        (project.id, list.id, task.id)
    };

    let app = open(temp.path()).await;
    let task = app.store.task(task_id).expect("task after reload");
    assert_eq!(task.project_id, project_id);
    assert_eq!(task.list_id, list_id);
    assert_eq!(task.status, TaskStatus::Completed);
    let tags: Vec<&str> = task.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tags, vec!["milk", "eggs"]);
    assert_eq!(task.sub_tasks.len(), 1);
    assert_eq!(app.tags.tags().len(), 2);

    let done = tasks_for_view(&app.store, ViewKind::Completed, chrono::Utc::now().date_naive());
    assert_eq!(done.len(), 1);

    app.store.select_list(Some(list_id));
    assert_eq!(view_title(&app.store, ViewKind::TaskList), "家事 > 買い物");

    assert!(app.tasks.delete_task(task_id).await);
    let reopened = open(temp.path()).await;
    assert!(reopened.store.task(task_id).is_none());
    assert_eq!(reopened.tags.tags().len(), 2);
}

#[tokio::test]
async fn rejected_commands_leave_files_untouched() {
    let temp = tempdir().expect("tempdir");
    let app = open(temp.path()).await;
    let project = app
        .projects
        .create_project(
            NewProject {
                name: "solo".to_string(),
                ..NewProject::default()
            },
            None,
        )
        .await
        .expect("create project");

    let store = DataStore::open(temp.path()).expect("datastore");
    store.save_projects(&[]).expect("wipe projects behind the app");

    assert!(!app.projects.delete_project(project.id).await);
    assert_eq!(app.projects.projects().len(), 1);
    assert_eq!(app.errors.len(), 1);
    assert!(store.load_projects().expect("load").is_empty());
}

#[tokio::test]
async fn completing_a_recurring_task_queues_an_occurrence_on_disk() {
    let temp = tempdir().expect("tempdir");
    let gateway = Arc::new(FileGateway::open(temp.path()).expect("open data dir"));
    let app = App::load(gateway.clone() as Arc<dyn CommandGateway>)
        .await
        .expect("load app");

    let project = app
        .projects
        .create_project(
            NewProject {
                name: "ops".to_string(),
                ..NewProject::default()
            },
            None,
        )
        .await
        .expect("create project");
    let list = app
        .projects
        .create_task_list(
            project.id,
            NewTaskList {
                name: "daily".to_string(),
                ..NewTaskList::default()
            },
            None,
        )
        .await
        .expect("create list");
    let rule = RecurrenceRule {
        id: uuid::Uuid::new_v4(),
        unit: RecurrenceUnit::Day,
        interval: 1,
        days_of_week: vec![],
        day_of_month: None,
        month_position: None,
        adjustment: None,
        exceptions: vec![],
        end_date: None,
        max_occurrences: None,
    };
    let task = app
        .tasks
        .create_task(
            list.id,
            NewTask {
                title: "backup".to_string(),
                recurrence_rule: Some(rule.clone()),
                ..NewTask::default()
            },
            None,
        )
        .await
        .expect("create task");

    assert!(app.tasks.toggle_task_status(task.id).await);

    let pending = gateway.pending_occurrences().expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_id, task.id);
    assert_eq!(pending[0].list_id, list.id);
    assert_eq!(pending[0].rule, rule);
    assert_eq!(app.store.read(|ws| ws.tasks().count()), 1);
}
