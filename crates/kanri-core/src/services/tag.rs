use chrono::Utc;
use kanri_shared::{
  Tag,
  TagPatch
};
use tracing::{
  debug,
  error,
  info,
  warn
};
use uuid::Uuid;

use super::ServiceContext;
use crate::errors::{
  EntityKind,
  labels
};
use crate::store::{
  Change,
  StoreEvent
};
use crate::tag_completion::clean_tag_name;
use crate::undo::UpdateRecord;

#[derive(Debug, Clone)]
pub struct TagService {
  ctx: ServiceContext
}

impl TagService {
  pub fn new(ctx: ServiceContext) -> Self {
    Self { ctx }
  }

  pub fn tags(&self) -> Vec<Tag> {
    self.ctx.store.read(|ws| ws.tags.clone())
  }

  pub fn find_by_name(
    &self,
    name: &str
  ) -> Option<Tag> {
    self
      .ctx
      .store
      .read(|ws| ws.tag_by_name(name).cloned())
  }

  /// Case-insensitive substring search.
  /// Prefix matches come first; an empty
  /// query matches every tag.
  pub fn search_tags(
    &self,
    query: &str,
    limit: Option<usize>
  ) -> Vec<Tag> {
    let needle =
      query.trim().to_lowercase();
    let (mut prefixed, rest): (Vec<_>, Vec<_>) =
      self
        .tags()
        .into_iter()
        .filter(|tag| {
          tag.name.to_lowercase().contains(&needle)
        })
        .partition(|tag| {
          tag
            .name
            .to_lowercase()
            .starts_with(&needle)
        });
    prefixed.extend(rest);
    if let Some(limit) = limit {
      prefixed.truncate(limit);
    }
    prefixed
  }

  #[tracing::instrument(skip(self))]
  pub async fn create_tag(
    &self,
    name: &str,
    color: Option<String>
  ) -> Option<Tag> {
    let name = name.trim();
    if name.is_empty() {
      warn!("tag name is empty; not created");
      return None;
    }

    let tag =
      Tag::new(name.to_string(), color, Utc::now());
    let id = tag.id;
    self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Tag,
        id,
        Change::Inserted
      ),
      |ws| ws.insert_tag(tag.clone(), None)
    );

    let outcome =
      self.ctx.gateway.create_tag(&tag).await;
    let stored = self.ctx.settle(
      outcome,
      labels::CREATE_TAG,
      EntityKind::Tag,
      id,
      |ws| {
        ws.remove_tag(id);
        Ok(())
      }
    )?;
    info!(tag_id = %id, name = %stored.name, "tag created");
    Some(stored)
  }

  /// Returns the tag with exactly this
  /// cleaned name, creating it if needed.
  #[tracing::instrument(skip(self))]
  pub async fn get_or_create_tag(
    &self,
    raw_name: &str,
    color: Option<String>
  ) -> Option<Tag> {
    let name = clean_tag_name(raw_name);
    if name.is_empty() {
      warn!("cleaned tag name is empty");
      return None;
    }
    if let Some(existing) =
      self.find_by_name(&name)
    {
      debug!(tag_id = %existing.id, "reusing existing tag");
      return Some(existing);
    }
    self.create_tag(&name, color).await
  }

  #[tracing::instrument(skip(self, patch))]
  pub async fn update_tag(
    &self,
    id: Uuid,
    patch: TagPatch
  ) -> bool {
    if patch
      .name
      .as_ref()
      .is_some_and(|n| n.trim().is_empty())
    {
      warn!(tag_id = %id, "tag name is empty; update skipped");
      return false;
    }

    let Some(record) = self.ctx.store.mutate(
      StoreEvent::new(
        EntityKind::Tag,
        id,
        Change::Updated
      ),
      |ws| {
        let tag = ws.tag_mut(id)?;
        let previous_updated_at =
          tag.updated_at;
        let inverse = patch.apply(tag);
        tag.updated_at = Utc::now();
        let updated = tag.clone();
        ws.refresh_tag_copies(&updated);
        Some(UpdateRecord {
          id,
          inverse,
          previous_updated_at
        })
      }
    ) else {
      error!(tag_id = %id, "tag not found; update skipped");
      return false;
    };

    let outcome = self
      .ctx
      .gateway
      .update_tag(id, &patch)
      .await;
    self
      .ctx
      .settle(
        outcome,
        labels::UPDATE_TAG,
        EntityKind::Tag,
        id,
        |ws| {
          if let Some(tag) = ws.tag_mut(id) {
            record.inverse.apply(tag);
            tag.updated_at =
              record.previous_updated_at;
            let restored = tag.clone();
            ws.refresh_tag_copies(&restored);
          }
          Ok(())
        }
      )
      .is_some()
  }

  /// Removes the tag from the registry and
  /// from every task and sub task.
  #[tracing::instrument(skip(self))]
  pub async fn delete_tag(
    &self,
    id: Uuid
  ) -> bool {
    let Some((removal, detachments)) =
      self.ctx.store.mutate(
        StoreEvent::new(
          EntityKind::Tag,
          id,
          Change::Removed
        ),
        |ws| {
          let removal = ws.remove_tag(id)?;
          Some((removal, ws.sweep_tag(id)))
        }
      )
    else {
      error!(tag_id = %id, "tag not found; delete skipped");
      return false;
    };
    debug!(tag_id = %id, owners = detachments.len(), "tag swept locally");

    let outcome =
      self.ctx.gateway.delete_tag(id).await;
    self
      .ctx
      .settle(
        outcome,
        labels::DELETE_TAG,
        EntityKind::Tag,
        id,
        |ws| {
          ws.insert_tag(
            removal.entity,
            Some(removal.index)
          );
          for detachment in detachments {
            ws.restore_detachment(detachment)?;
          }
          Ok(())
        }
      )
      .is_some()
  }
}
