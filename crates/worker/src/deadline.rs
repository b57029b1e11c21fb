//! Deadline supervision for blocking calls.
//!
//! The deadline bounds how long the supervisor *waits*, not how long the
//! call runs. When the budget elapses the join handle is dropped, which
//! detaches the blocking call: it keeps running to completion on its own
//! thread and its result is discarded. Interrupting it would need a
//! cooperative work contract or a killable subprocess.

use std::any::Any;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};

/// How a supervised call ended, from the supervisor's point of view.
#[derive(Debug, PartialEq)]
pub enum Outcome<R> {
    /// Returned within the budget.
    Finished(R),
    /// Panicked within the budget; carries the panic message.
    Panicked(String),
    /// Still running when the budget elapsed.
    DeadlineExceeded,
}

/// Wait for `handle` for at most `budget`.
pub async fn supervise<R>(handle: JoinHandle<R>, budget: Duration) -> Outcome<R> {
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(value)) => Outcome::Finished(value),
        Ok(Err(e)) => Outcome::Panicked(join_error_message(e)),
        Err(_) => Outcome::DeadlineExceeded,
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
