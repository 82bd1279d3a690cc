mod backoff;
mod coordinator;
mod log;
mod supervisor;
mod worker;

pub use backoff::RetryPolicy;
pub use coordinator::{AggregateResult, PendingRelays, RelayCoordinator, RestartOutcome};
pub use supervisor::{AttemptOutcome, Outcome, RelayAttempt, RelayEvent};
pub use worker::{Exit, RelayOptions, RelayWorker, Verdict};
