use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{
  debug,
  warn
};

use super::state::{
  BackendState,
  StateBackend
};
use crate::datastore::DataStore;

/// The desktop backend: every command
/// reloads the data directory, applies
/// itself, and writes the files back.
#[derive(Debug)]
pub struct FileGateway {
  store: Mutex<DataStore>
}

impl FileGateway {
  pub fn open(
    data_dir: &Path
  ) -> anyhow::Result<Self> {
    Ok(Self::new(DataStore::open(
      data_dir
    )?))
  }

  pub fn new(store: DataStore) -> Self {
    Self {
      store: Mutex::new(store)
    }
  }

  /// Occurrence requests waiting for a
  /// scheduler to pick them up.
  pub fn pending_occurrences(
    &self
  ) -> anyhow::Result<
    Vec<kanri_shared::OccurrenceRequest>
  > {
    self.store.lock().load_occurrences()
  }
}

#[async_trait]
impl StateBackend for FileGateway {
  async fn begin(
    &self,
    command: &'static str
  ) -> anyhow::Result<()> {
    debug!(command, "file gateway command");
    Ok(())
  }

  fn read<R>(
    &self,
    f: impl FnOnce(&BackendState) -> R
  ) -> anyhow::Result<R> {
    let store = self.store.lock();
    let state = store.load_state()?;
    Ok(f(&state))
  }

  fn transact<R>(
    &self,
    f: impl FnOnce(
      &mut BackendState
    ) -> anyhow::Result<R>
  ) -> anyhow::Result<R> {
    let store = self.store.lock();
    let mut state = store.load_state()?;
    match f(&mut state) {
      | Ok(out) => {
        store.save_state(&state)?;
        Ok(out)
      }
      | Err(err) => {
        warn!(
          error = %err,
          "command rejected; data left untouched"
        );
        Err(err)
      }
    }
  }
}
