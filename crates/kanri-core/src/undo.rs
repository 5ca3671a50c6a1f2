//! Undo records captured before an
//! optimistic change is applied, so a
//! failed sync can be reverted exactly.

use chrono::{
  DateTime,
  Utc
};
use kanri_shared::Tag;
use uuid::Uuid;

/// A field-level update: the inverse
/// patch plus the timestamp it replaced.
#[derive(Debug, Clone)]
pub struct UpdateRecord<P> {
  pub id:                 Uuid,
  pub inverse:            P,
  pub previous_updated_at: DateTime<Utc>
}

/// An entity taken out of its container.
/// `container` is `None` for top-level
/// entities (projects, tags).
#[derive(Debug, Clone)]
pub struct RemovalRecord<T> {
  pub entity:    T,
  pub container: Option<Uuid>,
  pub index:     usize
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum TagOwner {
  Task(Uuid),
  SubTask(Uuid)
}

impl TagOwner {
  pub fn id(self) -> Uuid {
    match self {
      | TagOwner::Task(id)
      | TagOwner::SubTask(id) => id
    }
  }
}

/// One tag pulled off one owner.
#[derive(Debug, Clone)]
pub struct TagDetachment {
  pub owner: TagOwner,
  pub tag:   Tag,
  pub index: usize
}
