//! Request coalescing for concurrent inspections of the same key
//!
//! The first caller for a key registers a call and runs the work itself,
//! on the caller's task. Callers arriving while that call is registered wait for its outcome
//! instead of running the work again. The registration is removed as soon
//! as the call completes, so a later request always starts from the caches.

use crate::cache::CacheKey;
use crate::error::{InspectError, InspectResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

type Outcome<T> = Option<InspectResult<T>>;

/// Whether a call ran the work itself or waited on another caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Executor,
    Waiter,
}

/// Tracks in-progress computations per key
pub struct InflightTracker<T> {
    calls: Mutex<HashMap<CacheKey, watch::Receiver<Outcome<T>>>>,
}

impl<T: Clone> InflightTracker<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key`, or wait for the call already running it.
    ///
    /// Every caller for the same registered call gets a clone of the same
    /// outcome. Errors are not retried. If the executing caller is dropped
    /// before finishing, waiters get [`InspectError::Cancelled`].
    pub async fn run<F, Fut>(&self, key: &CacheKey, work: F) -> (InspectResult<T>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = InspectResult<T>>,
    {
        let entry = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            match calls.get(key) {
                Some(existing) => Entry::Wait(existing.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    calls.insert(key.clone(), rx.clone());
                    Entry::Run(tx, rx)
                }
            }
        };

        let (tx, rx) = match entry {
            Entry::Wait(rx) => return (Self::wait(rx).await, Role::Waiter),
            Entry::Run(tx, rx) => (tx, rx),
        };
        let registration = Registration {
            calls: &self.calls,
            key: key.clone(),
            rx,
        };

        let outcome = work().await;
        tx.send_replace(Some(outcome.clone()));
        drop(registration);

        (outcome, Role::Executor)
    }

    /// Number of keys currently being computed
    pub fn pending(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn wait(mut rx: watch::Receiver<Outcome<T>>) -> InspectResult<T> {
        match rx.wait_for(Option::is_some).await {
            Ok(done) => match &*done {
                Some(outcome) => outcome.clone(),
                None => Err(InspectError::Internal(
                    "inflight call completed without an outcome".to_string(),
                )),
            },
            Err(_) => Err(InspectError::Cancelled),
        }
    }
}

impl<T: Clone> Default for InflightTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

enum Entry<T> {
    Wait(watch::Receiver<Outcome<T>>),
    Run(watch::Sender<Outcome<T>>, watch::Receiver<Outcome<T>>),
}

/// Removes a registered call from the table when the executor finishes or
/// is dropped mid-flight.
struct Registration<'a, T> {
    calls: &'a Mutex<HashMap<CacheKey, watch::Receiver<Outcome<T>>>>,
    key: CacheKey,
    rx: watch::Receiver<Outcome<T>>,
}

impl<T> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        // Only remove our own entry; a newer call may have replaced it.
        if calls
            .get(&self.key)
            .is_some_and(|current| current.same_channel(&self.rx))
        {
            calls.remove(&self.key);
        }
    }
}
