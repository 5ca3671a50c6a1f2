use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use kanri_shared::{Project, Tag, Task, TaskStatus};
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::{format_project_date, to_project_date};
use crate::errors::SyncError;

/// Ids are shown by their first eight hex
/// digits; commands accept any unique
/// prefix.
pub fn short_id(id: uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn print_task_table(&self, tasks: &[Task], today: NaiveDate) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        let headers = vec![
            "ID".to_string(),
            "Status".to_string(),
            "Due".to_string(),
            "Title".to_string(),
            "Tags".to_string(),
            "Sub".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let due = task
                .due_date()
                .map(|date| {
                    let label = format_project_date(date);
                    if to_project_date(date) < today && !task.status.is_completed() {
                        self.paint(&label, "31")
                    } else {
                        label
                    }
                })
                .unwrap_or_default();

            let status = match task.status {
                TaskStatus::Completed => self.paint(task.status.as_str(), "32"),
                _ => task.status.to_string(),
            };
            let tags = task
                .tags
                .iter()
                .map(|tag| format!("#{}", tag.name))
                .collect::<Vec<_>>()
                .join(" ");
            let sub = if task.sub_tasks.is_empty() {
                String::new()
            } else {
                let done = task.sub_tasks.iter().filter(|s| s.completed).count();
                format!("{done}/{}", task.sub_tasks.len())
            };

            rows.push(vec![
                self.paint(&short_id(task.id), "33"),
                status,
                due,
                task.title.clone(),
                tags,
                sub,
            ]);
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, task))]
    pub fn print_task_info(&self, task: &Task) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", task.id)?;
        writeln!(out, "title     {}", task.title)?;
        writeln!(out, "status    {}", task.status)?;
        writeln!(out, "priority  {}", task.priority)?;
        if let Some(description) = &task.description {
            writeln!(out, "desc      {description}")?;
        }
        writeln!(out, "project   {}", task.project_id)?;
        writeln!(out, "list      {}", task.list_id)?;
        if let Some(start) = task.plan_start_date {
            writeln!(out, "start     {}", format_project_date(start))?;
        }
        if let Some(end) = task.plan_end_date {
            writeln!(out, "end       {}", format_project_date(end))?;
        }
        if let Some(rule) = &task.recurrence_rule {
            writeln!(out, "repeats   every {} {:?}", rule.interval, rule.unit)?;
        }
        let tags = task
            .tags
            .iter()
            .map(|tag| tag.name.as_str())
            .collect::<Vec<_>>();
        writeln!(out, "tags      {}", tags.join(", "))?;
        writeln!(out, "created   {}", task.created_at.format("%Y%m%dT%H%M%SZ"))?;
        writeln!(out, "modified  {}", task.updated_at.format("%Y%m%dT%H%M%SZ"))?;

        for sub_task in &task.sub_tasks {
            let mark = if sub_task.completed { "x" } else { " " };
            writeln!(
                out,
                "  [{mark}] {} {}",
                self.paint(&short_id(sub_task.id), "33"),
                sub_task.title
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, projects))]
    pub fn print_projects(&self, projects: &[Project]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "ID".to_string(),
            "Project".to_string(),
            "List".to_string(),
            "Tasks".to_string(),
        ];

        let mut rows = Vec::new();
        for project in projects {
            let total: usize = project.task_lists.iter().map(|l| l.tasks.len()).sum();
            rows.push(vec![
                self.paint(&short_id(project.id), "33"),
                project.name.clone(),
                String::new(),
                total.to_string(),
            ]);
            for list in &project.task_lists {
                rows.push(vec![
                    self.paint(&short_id(list.id), "33"),
                    String::new(),
                    list.name.clone(),
                    list.tasks.len().to_string(),
                ]);
            }
        }

        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tags))]
    pub fn print_tags(&self, tags: &[Tag]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec!["ID".to_string(), "Tag".to_string(), "Color".to_string()];
        let rows = tags
            .iter()
            .map(|tag| {
                vec![
                    self.paint(&short_id(tag.id), "33"),
                    format!("#{}", tag.name),
                    tag.color.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_view_header(&self, title: &str, show_add: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let marker = if show_add { "  [+]" } else { "" };
        writeln!(out, "{}{marker}", self.paint(title, "1"))?;
        Ok(())
    }

    /// Sync failures go to stderr.
    pub fn print_sync_errors(&self, records: &[SyncError]) -> anyhow::Result<()> {
        let mut err = io::stderr().lock();
        for record in records {
            writeln!(
                err,
                "sync error: {} ({} {}): {}",
                record.action,
                record.entity_kind,
                short_id(record.entity_id),
                record.message
            )?;
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
