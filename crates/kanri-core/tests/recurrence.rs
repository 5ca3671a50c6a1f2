use std::sync::Arc;

use kanri_core::app::App;
use kanri_core::errors::labels;
use kanri_core::gateway::{CommandGateway, MemoryGateway};
use kanri_shared::{NewProject, RecurrenceRule, RecurrenceUnit};
use uuid::Uuid;

fn monthly(interval: u32) -> RecurrenceRule {
    RecurrenceRule {
        id: Uuid::new_v4(),
        unit: RecurrenceUnit::Month,
        interval,
        days_of_week: vec![],
        day_of_month: Some(25),
        month_position: None,
        adjustment: None,
        exceptions: vec![],
        end_date: None,
        max_occurrences: Some(12),
    }
}

async fn app_with_project() -> (Arc<MemoryGateway>, App, Uuid) {
    let gateway = Arc::new(MemoryGateway::new());
    let app = App::load(gateway.clone() as Arc<dyn CommandGateway>)
        .await
        .expect("load app");
    let project = app
        .projects
        .create_project(
            NewProject {
                name: "経理".to_string(),
                ..NewProject::default()
            },
            None,
        )
        .await
        .expect("create project");
    (gateway, app, project.id)
}

#[tokio::test]
async fn rules_are_saved_per_project_and_replaced_by_id() {
    let (gateway, app, project) = app_with_project().await;
    let mut rule = monthly(1);

    assert!(app.recurrence.save_rule(project, &rule).await);
    rule.interval = 2;
    assert!(app.recurrence.save_rule(project, &rule).await);

    assert_eq!(gateway.rules().len(), 1);
    let loaded = app
        .recurrence
        .get_rule(project, rule.id)
        .await
        .expect("stored rule");
    assert_eq!(loaded.interval, 2);
    assert!(app.recurrence.get_rule(Uuid::new_v4(), rule.id).await.is_none());

    assert!(app.recurrence.delete_rule(project, rule.id).await);
    assert!(app.recurrence.get_rule(project, rule.id).await.is_none());
    assert!(app.errors.is_empty());
}

#[tokio::test]
async fn zero_interval_is_rejected_without_a_backend_call() {
    let (gateway, app, project) = app_with_project().await;
    gateway.clear_calls();

    assert!(!app.recurrence.save_rule(project, &monthly(0)).await);
    assert!(gateway.calls().is_empty());
    assert!(app.errors.is_empty());
}

#[tokio::test]
async fn failures_are_recorded_against_the_rule() {
    let (gateway, app, project) = app_with_project().await;
    let rule = monthly(1);

    gateway.fail_next(1);
    assert!(!app.recurrence.save_rule(project, &rule).await);
    assert!(!app.recurrence.delete_rule(project, rule.id).await);

    let records = app.errors.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].action, labels::SAVE_RECURRENCE);
    assert_eq!(records[1].action, labels::DELETE_RECURRENCE);
    assert!(records.iter().all(|r| r.entity_id == rule.id));
    assert_eq!(app.errors.records_for(rule.id).len(), 2);

    let latest = app.errors.latest().expect("latest");
    assert!(app.errors.dismiss(latest.id));
    assert_eq!(app.errors.len(), 1);
    app.errors.clear();
    assert!(app.errors.is_empty());
}
