use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use kanri_shared::{OccurrenceRequest, Project, Tag};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::gateway::{BackendState, StoredRule};
use crate::workspace::Workspace;

/// Line-delimited JSON files under the
/// data directory, one entity per line.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub projects_path: PathBuf,
    pub tags_path: PathBuf,
    pub recurrence_path: PathBuf,
    pub occurrences_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let projects_path = data_dir.join("projects.data");
        let tags_path = data_dir.join("tags.data");
        let recurrence_path = data_dir.join("recurrence.data");
        let occurrences_path = data_dir.join("occurrences.data");

        for path in [
            &projects_path,
            &tags_path,
            &recurrence_path,
            &occurrences_path,
        ] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            projects = %projects_path.display(),
            tags = %tags_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            projects_path,
            tags_path,
            recurrence_path,
            occurrences_path,
        })
    }

    #[tracing::instrument(skip(self))]
    pub fn load_projects(&self) -> anyhow::Result<Vec<Project>> {
        load_jsonl(&self.projects_path).context("failed to load projects.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_tags(&self) -> anyhow::Result<Vec<Tag>> {
        load_jsonl(&self.tags_path).context("failed to load tags.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_rules(&self) -> anyhow::Result<Vec<StoredRule>> {
        load_jsonl(&self.recurrence_path).context("failed to load recurrence.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_occurrences(&self) -> anyhow::Result<Vec<OccurrenceRequest>> {
        load_jsonl(&self.occurrences_path).context("failed to load occurrences.data")
    }

    #[tracing::instrument(skip(self, projects))]
    pub fn save_projects(&self, projects: &[Project]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.projects_path, projects).context("failed to save projects.data")
    }

    #[tracing::instrument(skip(self, tags))]
    pub fn save_tags(&self, tags: &[Tag]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tags_path, tags).context("failed to save tags.data")
    }

    #[tracing::instrument(skip(self, rules))]
    pub fn save_rules(&self, rules: &[StoredRule]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.recurrence_path, rules).context("failed to save recurrence.data")
    }

    #[tracing::instrument(skip(self, requests))]
    pub fn save_occurrences(&self, requests: &[OccurrenceRequest]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.occurrences_path, requests)
            .context("failed to save occurrences.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn load_state(&self) -> anyhow::Result<BackendState> {
        let workspace = Workspace::new(self.load_projects()?, self.load_tags()?);
        Ok(BackendState {
            workspace,
            rules: self.load_rules()?,
            occurrences: self.load_occurrences()?,
        })
    }

    #[tracing::instrument(skip(self, state))]
    pub fn save_state(&self, state: &BackendState) -> anyhow::Result<()> {
        self.save_projects(&state.workspace.projects)?;
        self.save_tags(&state.workspace.tags)?;
        self.save_rules(&state.rules)?;
        self.save_occurrences(&state.occurrences)?;
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use kanri_shared::NewProject;

    use super::*;

    #[test]
    fn state_survives_a_save_and_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");

        let mut state = store.load_state().expect("empty state");
        assert!(state.workspace.projects.is_empty());

        let project = NewProject {
            name: "garden".to_string(),
            ..NewProject::default()
        }
        .into_project(Utc::now());
        state.workspace.insert_project(project.clone(), None);
        state
            .workspace
            .insert_tag(Tag::new("outdoor".to_string(), None, Utc::now()), None);
        store.save_state(&state).expect("save");

        let reopened = DataStore::open(dir.path()).expect("reopen");
        let loaded = reopened.load_state().expect("load");
        assert_eq!(loaded.workspace, state.workspace);
        assert_eq!(loaded.workspace.projects[0].id, project.id);
    }

    #[test]
    fn malformed_line_reports_file_and_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DataStore::open(dir.path()).expect("open");
        fs::write(&store.tags_path, "\n{not json}\n").expect("write");

        let err = store.load_tags().expect_err("should fail");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("tags.data"));
        assert!(rendered.contains("line 2"));
    }
}
