//! Primary-store boundary. The store's write and delete operations are
//! asynchronous: each call returns a one-shot `Completion` the store
//! resolves from wherever its own machinery runs. A resolved `Ok(false)`
//! is a reported failure (retryable, silently); a `StoreFault` is an
//! exceptional failure (retryable, visibly).

use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::Duration;

use thiserror::Error;

use tsmeta_core::CatalogEntity;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StoreFault(pub String);

pub type StoreResult = Result<bool, StoreFault>;

/// Resolver half of a completion pair, handed to the store implementation.
pub struct Completer {
    tx: SyncSender<StoreResult>,
}

impl Completer {
    /// Resolves the paired completion. Resolving after the waiter has given
    /// up is a no-op.
    pub fn resolve(self, result: StoreResult) {
        let _ = self.tx.send(result);
    }
}

/// Waiter half of a completion pair, held by the reconciler.
pub struct Completion {
    rx: Receiver<StoreResult>,
}

impl Completion {
    pub fn pair() -> (Completer, Completion) {
        let (tx, rx) = sync_channel(1);
        (Completer { tx }, Completion { rx })
    }

    /// An already-resolved completion, for synchronous store implementations.
    pub fn resolved(result: StoreResult) -> Completion {
        let (completer, completion) = Self::pair();
        completer.resolve(result);
        completion
    }

    /// Waits up to `timeout` for the store to resolve. `None` means the
    /// callback is still outstanding (or its completer was dropped) -- the
    /// caller moves on and the work is retried later.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<StoreResult> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_result(&self) -> Option<StoreResult> {
        self.rx.try_recv().ok()
    }
}

/// Asynchronous write/delete contract of the authoritative time-series
/// store, keyed by natural identity.
pub trait TsdbStore: Send + Sync {
    fn upsert(&self, entity: CatalogEntity) -> Completion;
    fn delete(&self, entity: CatalogEntity) -> Completion;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn resolved_completion_is_immediately_ready() {
        let completion = Completion::resolved(Ok(true));
        assert_eq!(completion.try_result(), Some(Ok(true)));
    }

    #[test]
    fn unresolved_completion_times_out() {
        let (_completer, completion) = Completion::pair();
        assert_eq!(completion.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn dropped_completer_reads_as_outstanding() {
        let (completer, completion) = Completion::pair();
        drop(completer);
        assert_eq!(completion.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn resolve_crosses_threads() {
        let (completer, completion) = Completion::pair();
        let handle = std::thread::spawn(move || {
            completer.resolve(Err(StoreFault("connection reset".into())));
        });
        let result = completion.wait_timeout(Duration::from_secs(1));
        handle.join().unwrap();
        assert!(matches!(result, Some(Err(StoreFault(_)))));
    }
}
