use std::sync::Arc;
use std::sync::atomic::{
  AtomicUsize,
  Ordering
};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use kanri_shared::{
  OccurrenceRequest,
  Task
};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{
  debug,
  trace
};

use super::state::{
  BackendState,
  StateBackend,
  StoredRule
};
use crate::workspace::Workspace;

#[derive(Debug, Default)]
struct Faults {
  fail_next: usize,
  offline:   bool
}

/// In-process backend for the web build
/// and for tests. Commands can be made to
/// fail, and can be held at a gate so the
/// optimistic state is observable while a
/// call is in flight.
#[derive(Debug, Default)]
pub struct MemoryGateway {
  state:           Mutex<BackendState>,
  faults:          Mutex<Faults>,
  calls:           Mutex<Vec<String>>,
  gate:            Mutex<Option<Arc<Semaphore>>>,
  waiting:         AtomicUsize,
  next_occurrence: Mutex<Option<Task>>
}

impl MemoryGateway {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_workspace(
    workspace: Workspace
  ) -> Self {
    let gateway = Self::default();
    gateway.state.lock().workspace =
      workspace;
    gateway
  }

  pub fn workspace(&self) -> Workspace {
    self.state.lock().workspace.clone()
  }

  pub fn rules(&self) -> Vec<StoredRule> {
    self.state.lock().rules.clone()
  }

  pub fn occurrence_requests(
    &self
  ) -> Vec<OccurrenceRequest> {
    self.state.lock().occurrences.clone()
  }

  /// The next `count` commands fail.
  pub fn fail_next(&self, count: usize) {
    self.faults.lock().fail_next = count;
  }

  pub fn set_offline(&self, offline: bool) {
    self.faults.lock().offline = offline;
  }

  /// Names of every command received, in
  /// order, including failed ones.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().clone()
  }

  pub fn clear_calls(&self) {
    self.calls.lock().clear();
  }

  /// The task handed back by the next
  /// `schedule_next_occurrence`.
  pub fn set_next_occurrence(
    &self,
    task: Task
  ) {
    *self.next_occurrence.lock() =
      Some(task);
  }

  /// Makes later commands wait until
  /// [`release`](Self::release) lets them
  /// through.
  pub fn hold(&self) {
    *self.gate.lock() =
      Some(Arc::new(Semaphore::new(0)));
  }

  pub fn release(&self, count: usize) {
    if let Some(gate) = self.gate.lock().as_ref()
    {
      gate.add_permits(count);
    }
  }

  /// Lets every waiting and future
  /// command through.
  pub fn open(&self) {
    if let Some(gate) = self.gate.lock().take()
    {
      gate.close();
    }
  }

  /// Commands currently parked at the
  /// gate.
  pub fn in_flight(&self) -> usize {
    self.waiting.load(Ordering::SeqCst)
  }

  pub async fn wait_for_in_flight(
    &self,
    count: usize
  ) {
    while self.in_flight() < count {
      tokio::time::sleep(
        Duration::from_millis(1)
      )
      .await;
    }
  }
}

#[async_trait]
impl StateBackend for MemoryGateway {
  async fn begin(
    &self,
    command: &'static str
  ) -> anyhow::Result<()> {
    self.calls.lock().push(command.to_string());
    trace!(command, "memory gateway command");

    let gate = self.gate.lock().clone();
    if let Some(gate) = gate {
      self
        .waiting
        .fetch_add(1, Ordering::SeqCst);
      // a closed gate lets the call through
      if let Ok(permit) = gate.acquire().await
      {
        permit.forget();
      }
      self
        .waiting
        .fetch_sub(1, Ordering::SeqCst);
    }

    let mut faults = self.faults.lock();
    if faults.offline {
      bail!("backend is offline");
    }
    if faults.fail_next > 0 {
      faults.fail_next -= 1;
      debug!(command, "injected failure");
      bail!("injected failure in {command}");
    }
    Ok(())
  }

  fn read<R>(
    &self,
    f: impl FnOnce(&BackendState) -> R
  ) -> anyhow::Result<R> {
    Ok(f(&self.state.lock()))
  }

  fn transact<R>(
    &self,
    f: impl FnOnce(
      &mut BackendState
    ) -> anyhow::Result<R>
  ) -> anyhow::Result<R> {
    let mut state = self.state.lock();
    let mut draft = state.clone();
    let out = f(&mut draft)?;
    *state = draft;
    Ok(out)
  }

  fn occurrence_reply(
    &self,
    _request: &OccurrenceRequest
  ) -> Option<Task> {
    self.next_occurrence.lock().take()
  }
}
