use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::Utc;
use kanri_shared::{
    NewProject, NewSubTask, NewTaskList, ProjectPatch, TagPatch, TaskListPatch, TaskPatch,
    TaskStatus,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::app::App;
use crate::cli::{
    Command, ListCommand, ProjectCommand, SubTaskCommand, TagCommand, TaskCommand, TaskFields,
    ViewArgs,
};
use crate::config::Config;
use crate::datetime::{parse_date_expr, project_today};
use crate::gateway::{BackendKind, CommandGateway, FileGateway, MemoryGateway};
use crate::render::{Renderer, short_id};
use crate::tag_completion::clean_tag_name;
use crate::view::{ViewKind, tasks_for_view, view_title};

/// Picks the backend named by `backend`
/// in the config.
#[instrument(skip(cfg))]
pub fn open_gateway(cfg: &Config, data_dir: &Path) -> anyhow::Result<Arc<dyn CommandGateway>> {
    let gateway: Arc<dyn CommandGateway> = match cfg.backend_kind()? {
        BackendKind::Native => Arc::new(FileGateway::open(data_dir).with_context(|| {
            format!("failed to open data directory {}", data_dir.display())
        })?),
        BackendKind::Memory => {
            warn!("memory backend selected; changes are not saved");
            Arc::new(MemoryGateway::new())
        }
    };
    Ok(gateway)
}

/// Runs one command to completion on a
/// single-threaded runtime.
pub fn dispatch(
    gateway: Arc<dyn CommandGateway>,
    cfg: &Config,
    renderer: &Renderer,
    command: Option<Command>,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let app = App::load(gateway).await?;
        let command = match command {
            Some(command) => command,
            None => Command::View(ViewArgs {
                kind: cfg.get("default.view"),
                id: None,
            }),
        };

        let outcome = run_command(&app, cfg, renderer, command).await;

        let records = app.errors.records();
        if !records.is_empty() {
            renderer.print_sync_errors(&records)?;
        }
        outcome?;
        if !records.is_empty() {
            return Err(anyhow!("{} change(s) failed to sync", records.len()));
        }
        Ok::<_, anyhow::Error>(())
    })
}

async fn run_command(
    app: &App,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Project(cmd) => cmd_project(app, renderer, cmd).await,
        Command::List(cmd) => cmd_list(app, cmd).await,
        Command::Task(cmd) => cmd_task(app, renderer, cmd).await,
        Command::Subtask(cmd) => cmd_sub_task(app, cmd).await,
        Command::Tag(cmd) => cmd_tag(app, cfg, renderer, cmd).await,
        Command::View(args) => cmd_view(app, renderer, args),
    }
}

#[instrument(skip(app, renderer))]
async fn cmd_project(app: &App, renderer: &Renderer, cmd: ProjectCommand) -> anyhow::Result<()> {
    info!("command project");

    match cmd {
        ProjectCommand::Add {
            name,
            description,
            color,
        } => {
            let draft = NewProject {
                name,
                description,
                color,
            };
            if let Some(project) = app.projects.create_project(draft, None).await {
                println!("Created project {}.", short_id(project.id));
            }
        }
        ProjectCommand::List => {
            renderer.print_projects(&app.projects.projects())?;
        }
        ProjectCommand::Rename { id, name } => {
            let id = resolve_project(app, &id)?;
            let patch = ProjectPatch {
                name: Some(name),
                ..ProjectPatch::default()
            };
            if app.projects.update_project(id, patch).await {
                println!("Renamed project.");
            }
        }
        ProjectCommand::Rm { id } => {
            let id = resolve_project(app, &id)?;
            if app.projects.delete_project(id).await {
                println!("Deleted project.");
            }
        }
        ProjectCommand::Move { id, index } => {
            let id = resolve_project(app, &id)?;
            if app.projects.move_project(id, index).await {
                println!("Moved project to position {index}.");
            }
        }
    }

    Ok(())
}

#[instrument(skip(app))]
async fn cmd_list(app: &App, cmd: ListCommand) -> anyhow::Result<()> {
    info!("command list");

    match cmd {
        ListCommand::Add { project, name } => {
            let project_id = resolve_project(app, &project)?;
            let draft = NewTaskList {
                name,
                ..NewTaskList::default()
            };
            if let Some(list) = app
                .projects
                .create_task_list(project_id, draft, None)
                .await
            {
                println!("Created list {}.", short_id(list.id));
            }
        }
        ListCommand::Rename { id, name } => {
            let id = resolve_list(app, &id)?;
            let patch = TaskListPatch {
                name: Some(name),
                ..TaskListPatch::default()
            };
            if app.projects.update_task_list(id, patch).await {
                println!("Renamed list.");
            }
        }
        ListCommand::Rm { id } => {
            let id = resolve_list(app, &id)?;
            if app.projects.delete_task_list(id).await {
                println!("Deleted list.");
            }
        }
        ListCommand::Move { id, project, index } => {
            let id = resolve_list(app, &id)?;
            let project_id = resolve_project(app, &project)?;
            if app.projects.move_task_list(id, project_id, index).await {
                println!("Moved list.");
            }
        }
    }

    Ok(())
}

#[instrument(skip(app, renderer))]
async fn cmd_task(app: &App, renderer: &Renderer, cmd: TaskCommand) -> anyhow::Result<()> {
    info!("command task");

    match cmd {
        TaskCommand::Add { list, text, fields } => {
            let list_id = resolve_list(app, &list)?;
            let patch = task_patch(None, &fields)?;
            let text = text.join(" ");
            let Some(task) = app.tasks.create_task_from_text(list_id, &text).await else {
                return Ok(());
            };
            if !patch.is_empty() {
                app.tasks.update_task(task.id, patch).await;
            }
            println!("Created task {}.", short_id(task.id));
        }
        TaskCommand::Edit { id, title, fields } => {
            let id = resolve_task(app, &id)?;
            let patch = task_patch(title, &fields)?;
            if patch.is_empty() {
                return Err(anyhow!("nothing to change"));
            }
            if app.tasks.update_task(id, patch).await {
                println!("Modified task {}.", short_id(id));
            }
        }
        TaskCommand::Done { id } => {
            let id = resolve_task(app, &id)?;
            if app.tasks.toggle_task_status(id).await {
                let status = app
                    .store
                    .task(id)
                    .map(|task| task.status.to_string())
                    .unwrap_or_default();
                println!("Task {} is now {status}.", short_id(id));
            }
        }
        TaskCommand::Rm { id } => {
            let id = resolve_task(app, &id)?;
            if app.tasks.delete_task(id).await {
                println!("Deleted task {}.", short_id(id));
            }
        }
        TaskCommand::Move { id, list, index } => {
            let id = resolve_task(app, &id)?;
            let list_id = resolve_list(app, &list)?;
            if app.tasks.move_task(id, list_id, index).await {
                println!("Moved task {}.", short_id(id));
            }
        }
        TaskCommand::Tag { id, tag } => {
            let id = resolve_task(app, &id)?;
            let Some(tag) = app.tags.get_or_create_tag(&tag, None).await else {
                return Ok(());
            };
            if app.tasks.add_tag_to_task(id, tag.id).await {
                println!("Tagged with #{}.", tag.name);
            }
        }
        TaskCommand::Untag { id, tag } => {
            let id = resolve_task(app, &id)?;
            let tag_id = resolve_tag(app, &tag)?;
            if app.tasks.remove_tag_from_task(id, tag_id).await {
                println!("Removed tag.");
            }
        }
        TaskCommand::Info { id } => {
            let id = resolve_task(app, &id)?;
            let task = app
                .store
                .task(id)
                .ok_or_else(|| anyhow!("task vanished: {id}"))?;
            renderer.print_task_info(&task)?;
        }
    }

    Ok(())
}

#[instrument(skip(app))]
async fn cmd_sub_task(app: &App, cmd: SubTaskCommand) -> anyhow::Result<()> {
    info!("command subtask");

    match cmd {
        SubTaskCommand::Add { task, title } => {
            let task_id = resolve_task(app, &task)?;
            let draft = NewSubTask {
                title: title.join(" "),
                ..NewSubTask::default()
            };
            if let Some(sub_task) = app.sub_tasks.create_sub_task(task_id, draft, None).await {
                println!("Created subtask {}.", short_id(sub_task.id));
            }
        }
        SubTaskCommand::Done { id } => {
            let id = resolve_sub_task(app, &id)?;
            if app.sub_tasks.toggle_sub_task_status(id).await {
                println!("Toggled subtask {}.", short_id(id));
            }
        }
        SubTaskCommand::Rm { id } => {
            let id = resolve_sub_task(app, &id)?;
            if app.sub_tasks.delete_sub_task(id).await {
                println!("Deleted subtask {}.", short_id(id));
            }
        }
    }

    Ok(())
}

#[instrument(skip(app, cfg, renderer))]
async fn cmd_tag(
    app: &App,
    cfg: &Config,
    renderer: &Renderer,
    cmd: TagCommand,
) -> anyhow::Result<()> {
    info!("command tag");

    match cmd {
        TagCommand::Add { name, color } => {
            if let Some(tag) = app.tags.create_tag(&name, color).await {
                println!("Created tag #{}.", tag.name);
            }
        }
        TagCommand::List { query } => {
            let tags = match query {
                Some(query) => app.tags.search_tags(&query, Some(cfg.suggestion_limit())),
                None => app.tags.tags(),
            };
            renderer.print_tags(&tags)?;
        }
        TagCommand::Rename { id, name } => {
            let id = resolve_tag(app, &id)?;
            let patch = TagPatch {
                name: Some(clean_tag_name(&name)),
                ..TagPatch::default()
            };
            if app.tags.update_tag(id, patch).await {
                println!("Renamed tag.");
            }
        }
        TagCommand::Rm { id } => {
            let id = resolve_tag(app, &id)?;
            if app.tags.delete_tag(id).await {
                println!("Deleted tag.");
            }
        }
    }

    Ok(())
}

#[instrument(skip(app, renderer))]
fn cmd_view(app: &App, renderer: &Renderer, args: ViewArgs) -> anyhow::Result<()> {
    info!("command view");

    let kind: ViewKind = args.kind.as_deref().unwrap_or("today").parse()?;
    match (kind, args.id) {
        (ViewKind::Project, Some(id)) => {
            let id = resolve_project(app, &id)?;
            app.store.select_project(Some(id));
        }
        (ViewKind::TaskList, Some(id)) => {
            let id = resolve_list(app, &id)?;
            app.store.select_list(Some(id));
        }
        (ViewKind::Project | ViewKind::TaskList, None) => {
            return Err(anyhow!("the {kind} view needs an id"));
        }
        (_, Some(id)) => {
            debug!(%id, "ignoring id for date view");
        }
        (_, None) => {}
    }

    let today = project_today(Utc::now());
    let tasks = tasks_for_view(&app.store, kind, today);
    renderer.print_view_header(&view_title(&app.store, kind), kind.show_add_button())?;
    renderer.print_task_table(&tasks, today)?;
    Ok(())
}

fn task_patch(title: Option<String>, fields: &TaskFields) -> anyhow::Result<TaskPatch> {
    let now = Utc::now();
    let mut patch = TaskPatch {
        title,
        priority: fields.priority,
        ..TaskPatch::default()
    };
    if let Some(description) = &fields.description {
        patch.description = Some((!description.is_empty()).then(|| description.clone()));
    }
    if let Some(status) = &fields.status {
        let status: TaskStatus = status.parse().map_err(|e: String| anyhow!(e))?;
        patch.status = Some(status);
    }
    if let Some(start) = &fields.start {
        patch.plan_start_date = Some(parse_optional_date(start, now)?);
    }
    if let Some(due) = &fields.due {
        patch.plan_end_date = Some(parse_optional_date(due, now)?);
    }
    Ok(patch)
}

/// An empty value clears the date.
fn parse_optional_date(
    raw: &str,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<Option<chrono::DateTime<Utc>>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_date_expr(raw, now).map(Some)
}

fn resolve_project(app: &App, raw: &str) -> anyhow::Result<Uuid> {
    let ids = app.store.read(|ws| ws.projects.iter().map(|p| p.id).collect::<Vec<_>>());
    resolve_prefix("project", raw, &ids)
}

fn resolve_list(app: &App, raw: &str) -> anyhow::Result<Uuid> {
    let ids = app.store.read(|ws| {
        ws.projects
            .iter()
            .flat_map(|p| p.task_lists.iter().map(|l| l.id))
            .collect::<Vec<_>>()
    });
    resolve_prefix("list", raw, &ids)
}

fn resolve_task(app: &App, raw: &str) -> anyhow::Result<Uuid> {
    let ids = app.store.read(|ws| ws.tasks().map(|t| t.id).collect::<Vec<_>>());
    resolve_prefix("task", raw, &ids)
}

fn resolve_sub_task(app: &App, raw: &str) -> anyhow::Result<Uuid> {
    let ids = app.store.read(|ws| {
        ws.tasks()
            .flat_map(|t| t.sub_tasks.iter().map(|s| s.id))
            .collect::<Vec<_>>()
    });
    resolve_prefix("subtask", raw, &ids)
}

/// Tags resolve by name first, then by
/// id prefix.
fn resolve_tag(app: &App, raw: &str) -> anyhow::Result<Uuid> {
    if let Some(tag) = app.tags.find_by_name(&clean_tag_name(raw)) {
        return Ok(tag.id);
    }
    let ids = app.store.read(|ws| ws.tags.iter().map(|t| t.id).collect::<Vec<_>>());
    resolve_prefix("tag", raw, &ids)
}

fn resolve_prefix(kind: &str, raw: &str, ids: &[Uuid]) -> anyhow::Result<Uuid> {
    let needle = raw.trim().to_ascii_lowercase().replace('-', "");
    if needle.is_empty() {
        return Err(anyhow!("empty {kind} id"));
    }

    let matches: Vec<Uuid> = ids
        .iter()
        .copied()
        .filter(|id| id.simple().to_string().starts_with(&needle))
        .collect();

    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(anyhow!("no {kind} matches '{raw}'")),
        many => Err(anyhow!(
            "'{raw}' is ambiguous: {} {kind}s match",
            many.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_resolution_requires_a_unique_match() {
        let a = Uuid::parse_str("0a1b2c3d-0000-4000-8000-000000000001").expect("uuid");
        let b = Uuid::parse_str("0a1b9999-0000-4000-8000-000000000002").expect("uuid");
        let ids = [a, b];

        assert_eq!(resolve_prefix("task", "0a1b2", &ids).expect("unique"), a);
        assert_eq!(
            resolve_prefix("task", "0A1B-9", &ids).expect("dashes and case"),
            b
        );
        let err = resolve_prefix("task", "0a1b", &ids).expect_err("ambiguous");
        assert!(err.to_string().contains("ambiguous"));
        assert!(resolve_prefix("task", "ff", &ids).is_err());
        assert!(resolve_prefix("task", "  ", &ids).is_err());
    }

    #[test]
    fn task_patch_parses_status_and_clears_empty_dates() {
        let fields = TaskFields {
            status: Some("doing".to_string()),
            due: Some(String::new()),
            priority: Some(2),
            ..TaskFields::default()
        };
        let patch = task_patch(Some("new".to_string()), &fields).expect("patch");
        assert_eq!(patch.title.as_deref(), Some("new"));
        assert_eq!(patch.status, Some(TaskStatus::InProgress));
        assert_eq!(patch.plan_end_date, Some(None));
        assert_eq!(patch.priority, Some(2));
        assert!(patch.plan_start_date.is_none());

        let bad = TaskFields {
            status: Some("sleeping".to_string()),
            ..TaskFields::default()
        };
        assert!(task_patch(None, &bad).is_err());
    }
}
