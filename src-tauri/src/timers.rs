//! Keyed one-slot timers. Scheduling a key aborts whatever was pending under it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// clears the speech bubble
    MessageExpiry,
    /// returns a blurred compose box to idle
    ComposeBlur,
    /// proactive greeting loop
    Greeting,
}

#[derive(Default)]
pub struct Timers {
    tasks: Mutex<HashMap<TimerKey, JoinHandle<()>>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless `key` is cancelled or rescheduled first.
    /// Must be called from inside a tokio runtime.
    pub fn schedule<F>(&self, key: TimerKey, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Returns true when a still-pending timer was cancelled.
    pub fn cancel(&self, key: TimerKey) -> bool {
        let handle = self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&key);
        match handle {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, key: TimerKey) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&key)
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        let tasks = self
            .tasks
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}
