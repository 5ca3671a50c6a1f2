use kanri_shared::RecurrenceRule;
use tracing::{
  error,
  warn
};
use uuid::Uuid;

use super::ServiceContext;
use crate::errors::{
  EntityKind,
  labels
};

/// Stored recurrence rules. These live
/// only in the backend, so there is no
/// local state to roll back.
#[derive(Debug, Clone)]
pub struct RecurrenceService {
  ctx: ServiceContext
}

impl RecurrenceService {
  pub fn new(ctx: ServiceContext) -> Self {
    Self { ctx }
  }

  #[tracing::instrument(skip(self))]
  pub async fn get_rule(
    &self,
    project_id: Uuid,
    rule_id: Uuid
  ) -> Option<RecurrenceRule> {
    match self
      .ctx
      .gateway
      .get_recurrence_rule(project_id, rule_id)
      .await
    {
      | Ok(rule) => rule,
      | Err(err) => {
        error!(%rule_id, error = %err, "failed to load recurrence rule");
        None
      }
    }
  }

  #[tracing::instrument(skip(self, rule), fields(rule_id = %rule.id))]
  pub async fn save_rule(
    &self,
    project_id: Uuid,
    rule: &RecurrenceRule
  ) -> bool {
    if rule.interval == 0 {
      warn!("recurrence interval must be at least 1");
      return false;
    }
    let outcome = self
      .ctx
      .gateway
      .save_recurrence_rule(project_id, rule)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::SAVE_RECURRENCE,
        EntityKind::RecurrenceRule,
        rule.id,
        |_| Ok(())
      )
      .is_some()
  }

  #[tracing::instrument(skip(self))]
  pub async fn delete_rule(
    &self,
    project_id: Uuid,
    rule_id: Uuid
  ) -> bool {
    let outcome = self
      .ctx
      .gateway
      .delete_recurrence_rule(
        project_id, rule_id
      )
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::DELETE_RECURRENCE,
        EntityKind::RecurrenceRule,
        rule_id,
        |_| Ok(())
      )
      .is_some()
  }
}
