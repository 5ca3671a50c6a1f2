use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::errors::ErrorHandler;
use crate::gateway::CommandGateway;
use crate::services::{
  ProjectService,
  RecurrenceService,
  ServiceContext,
  SubTaskService,
  TagService,
  TaskService
};
use crate::store::EntityStore;
use crate::tag_completion::TagCompletion;
use crate::workspace::Workspace;

/// The store, the error log, and every
/// service, wired to one gateway.
#[derive(Debug, Clone)]
pub struct App {
  pub store:      Arc<EntityStore>,
  pub errors:     Arc<ErrorHandler>,
  pub projects:   ProjectService,
  pub tasks:      TaskService,
  pub sub_tasks:  SubTaskService,
  pub tags:       TagService,
  pub recurrence: RecurrenceService,
  ctx:            ServiceContext
}

impl App {
  pub fn new(
    gateway: Arc<dyn CommandGateway>
  ) -> Self {
    let ctx = ServiceContext::new(
      Arc::new(EntityStore::default()),
      gateway,
      Arc::new(ErrorHandler::new())
    );
    Self {
      store:      Arc::clone(&ctx.store),
      errors:     Arc::clone(&ctx.errors),
      projects:   ProjectService::new(
        ctx.clone()
      ),
      tasks:      TaskService::new(ctx.clone()),
      sub_tasks:  SubTaskService::new(
        ctx.clone()
      ),
      tags:       TagService::new(ctx.clone()),
      recurrence: RecurrenceService::new(
        ctx.clone()
      ),
      ctx
    }
  }

  /// Builds the app and fills the store
  /// from the backend.
  pub async fn load(
    gateway: Arc<dyn CommandGateway>
  ) -> anyhow::Result<Self> {
    let app = Self::new(gateway);
    app.reload().await?;
    Ok(app)
  }

  #[tracing::instrument(skip(self))]
  pub async fn reload(&self) -> anyhow::Result<()> {
    let projects = self
      .ctx
      .gateway
      .load_projects()
      .await
      .context("failed to load projects")?;
    let tags = self
      .ctx
      .gateway
      .load_tags()
      .await
      .context("failed to load tags")?;
    info!(
      projects = projects.len(),
      tags = tags.len(),
      "workspace loaded"
    );
    self
      .store
      .replace(Workspace::new(projects, tags));
    Ok(())
  }

  pub fn tag_completion(&self) -> TagCompletion {
    TagCompletion::new(self.tags.clone())
  }
}
