//! Shared handles to background computations.
//!
//! External-tool invocations and cache-miss queries run on worker threads so
//! the driving loop never blocks. A [`Task`] is a cloneable handle to one such
//! computation: every clone observes the same result, and completion
//! callbacks give interactive drivers a place to hand the result back to
//! their own thread (typically by sending over an mpsc channel).

use std::fmt;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Error observed by everyone waiting on a cancelled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task cancelled")]
pub struct Cancelled;

/// Cloneable error shared by every observer of a failed task.
#[derive(Clone)]
pub struct TaskError(Arc<anyhow::Error>);

impl TaskError {
    fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The underlying error chain.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.downcast_ref::<Cancelled>().is_some()
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for TaskError {}

type Callback<T> = Box<dyn FnOnce(&Result<T, TaskError>) + Send>;

enum State<T> {
    Pending { callbacks: Vec<Callback<T>> },
    Done(Result<T, TaskError>),
}

struct Inner<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

/// Handle to a computation running on a worker thread.
pub struct Task<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Task<T> {
    /// Run `job` on a new worker thread and return a handle to its result.
    pub fn spawn<F>(label: &str, job: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let task = Self::pending();
        let inner = Arc::clone(&task.inner);
        let spawned = thread::Builder::new()
            .name(format!("fastamend-{label}"))
            .spawn(move || {
                let result = job().map_err(TaskError::new);
                Inner::complete(&inner, result);
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, label, "failed to spawn worker thread");
            Inner::complete(
                &task.inner,
                Err(TaskError::new(anyhow::Error::new(err).context("worker thread"))),
            );
        }
        task
    }

    /// A task that is already complete.
    pub fn ready(result: anyhow::Result<T>) -> Self {
        let task = Self::pending();
        Inner::complete(&task.inner, result.map_err(TaskError::new));
        task
    }

    fn pending() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Pending {
                    callbacks: Vec::new(),
                }),
                done: Condvar::new(),
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(&*self.inner.state.lock(), State::Done(_))
    }

    /// The result, if the task has completed.
    pub fn try_result(&self) -> Option<Result<T, TaskError>> {
        match &*self.inner.state.lock() {
            State::Done(result) => Some(result.clone()),
            State::Pending { .. } => None,
        }
    }

    /// Block the calling thread until the task completes.
    pub fn wait(&self) -> Result<T, TaskError> {
        let mut state = self.inner.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return result.clone();
            }
            self.inner.done.wait(&mut state);
        }
    }

    /// Run `callback` when the task completes. Fires on the worker thread,
    /// or inline when the task is already done; callbacks should only
    /// marshal the result onward (e.g. send it over a channel).
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(&Result<T, TaskError>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Pending { callbacks } => callbacks.push(Box::new(callback)),
            State::Done(result) => {
                let result = result.clone();
                drop(state);
                callback(&result);
            }
        }
    }

    /// Complete the task now with [`Cancelled`], waking every waiter.
    ///
    /// A worker still running is not interrupted; its result is discarded
    /// when it eventually finishes.
    pub fn cancel(&self) {
        Inner::complete(&self.inner, Err(TaskError::new(anyhow::Error::new(Cancelled))));
    }

    /// True when both handles observe the same underlying computation.
    pub fn same(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T: Clone> Inner<T> {
    fn complete(inner: &Arc<Self>, result: Result<T, TaskError>) {
        let callbacks = {
            let mut state = inner.state.lock();
            let callbacks = match &mut *state {
                State::Pending { callbacks } => std::mem::take(callbacks),
                // complete() runs once per task; a done task keeps its
                // first result.
                State::Done(_) => return,
            };
            *state = State::Done(result.clone());
            inner.done.notify_all();
            callbacks
        };
        // Callbacks run without the state lock held.
        for callback in callbacks {
            callback(&result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn spawn_delivers_result_to_waiters() {
        let task = Task::spawn("test", || Ok(21 * 2));
        assert_eq!(task.wait().unwrap(), 42);
        assert!(task.is_done());
        assert_eq!(task.try_result().unwrap().unwrap(), 42);
    }

    #[test]
    fn ready_task_is_immediately_done() {
        let task = Task::ready(Ok("done".to_string()));
        assert!(task.is_done());
        assert_eq!(task.wait().unwrap(), "done");
    }

    #[test]
    fn failure_is_shared_by_all_clones() {
        let task: Task<u32> = Task::spawn("test", || Err(anyhow::anyhow!("boom")));
        let clone = task.clone();
        assert!(task.wait().unwrap_err().to_string().contains("boom"));
        assert!(clone.wait().unwrap_err().to_string().contains("boom"));
    }

    #[test]
    fn on_complete_fires_for_pending_and_done_tasks() {
        let (tx, rx) = mpsc::channel();

        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let task = Task::spawn("test", {
            let gate = Arc::clone(&gate);
            move || {
                let mut open = gate.0.lock();
                while !*open {
                    gate.1.wait(&mut open);
                }
                Ok(7)
            }
        });

        let early = tx.clone();
        task.on_complete(move |result| {
            let _ = early.send(*result.as_ref().unwrap_or(&0));
        });

        *gate.0.lock() = true;
        gate.1.notify_all();
        assert_eq!(rx.recv().unwrap(), 7);

        // Registration after completion fires inline.
        task.on_complete(move |result| {
            let _ = tx.send(*result.as_ref().unwrap_or(&0) + 1);
        });
        assert_eq!(rx.recv().unwrap(), 8);
    }

    #[test]
    fn cancel_wakes_waiters_and_discards_the_late_result() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let task = Task::spawn("test", {
            let gate = Arc::clone(&gate);
            move || {
                let mut open = gate.0.lock();
                while !*open {
                    gate.1.wait(&mut open);
                }
                Ok(1)
            }
        });

        task.cancel();
        let err = task.wait().unwrap_err();
        assert!(err.is_cancelled());

        // The worker's result no longer changes the outcome.
        *gate.0.lock() = true;
        gate.1.notify_all();
        assert!(task.wait().unwrap_err().is_cancelled());

        // Cancelling a finished task is a no-op.
        let done = Task::ready(Ok(2));
        done.cancel();
        assert_eq!(done.wait().unwrap(), 2);
    }

    #[test]
    fn clones_share_identity() {
        let task = Task::ready(Ok(1));
        let clone = task.clone();
        let other = Task::ready(Ok(1));
        assert!(Task::same(&task, &clone));
        assert!(!Task::same(&task, &other));
    }
}
