//! Fire-and-forget tasks that no stage waits for.
//!
//! Nested fetches (role assignments per job info response, client entities
//! after a selection) are spawned here. Nothing joins them and they may
//! outlive the screen that started them; the counter only lets a caller
//! that is about to exit wait for quiescence.

use color_eyre::Result;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::error;

#[derive(Debug, Default)]
struct Inner {
  in_flight: AtomicUsize,
  idle: Notify,
}

/// Decrements the in-flight count even if the task panics.
struct InFlightGuard(Arc<Inner>);

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
      self.0.idle.notify_waiters();
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetachedTasks {
  inner: Arc<Inner>,
}

impl DetachedTasks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Spawn `task`. Errors it returns are logged, there is nobody to hand them to.
  pub fn spawn<F>(&self, name: &'static str, task: F) -> JoinHandle<()>
  where
    F: Future<Output = Result<()>> + Send + 'static,
  {
    self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
    let guard = InFlightGuard(Arc::clone(&self.inner));

    tokio::spawn(async move {
      let _guard = guard;
      if let Err(e) = task.await {
        error!(task = name, error = %e, "Detached fetch failed");
      }
    })
  }

  pub fn in_flight(&self) -> usize {
    self.inner.in_flight.load(Ordering::SeqCst)
  }

  /// Wait until no detached task is running, including ones spawned while waiting.
  pub async fn idle(&self) {
    loop {
      let notified = self.inner.idle.notified();
      tokio::pin!(notified);
      // Register before checking so a notify between check and await is not lost
      notified.as_mut().enable();
      if self.in_flight() == 0 {
        return;
      }
      notified.await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::time::Duration;

  #[tokio::test]
  async fn test_idle_with_nothing_spawned() {
    let tasks = DetachedTasks::new();
    tokio::time::timeout(Duration::from_millis(50), tasks.idle())
      .await
      .expect("idle returns immediately");
  }

  #[tokio::test]
  async fn test_idle_waits_for_all_tasks() {
    let tasks = DetachedTasks::new();
    let done = Arc::new(AtomicUsize::new(0));

    for delay in [5u64, 20, 10] {
      let done = done.clone();
      tasks.spawn("sleep", async move {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        done.fetch_add(1, Ordering::SeqCst);
        Ok(())
      });
    }
    assert_eq!(tasks.in_flight(), 3);

    tokio::time::timeout(Duration::from_secs(2), tasks.idle())
      .await
      .expect("tasks finish");
    assert_eq!(done.load(Ordering::SeqCst), 3);
    assert_eq!(tasks.in_flight(), 0);
  }

  #[tokio::test]
  async fn test_failed_task_still_counts_down() {
    let tasks = DetachedTasks::new();
    let handle = tasks.spawn("fails", async { Err(eyre!("boom")) });

    handle.await.unwrap();
    assert_eq!(tasks.in_flight(), 0);
  }
}
