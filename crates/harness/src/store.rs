use std::sync::Mutex;

use tsmeta_core::CatalogEntity;
use tsmeta_sync::{Completion, StoreFault, TsdbStore};

/// How the fake store resolves the next operations it receives.
#[derive(Debug, Clone)]
pub enum StoreBehavior {
    /// Resolve `Ok(true)`.
    Succeed,
    /// Resolve `Ok(false)` -- a reported, non-exceptional failure.
    ReportFailure,
    /// Resolve a fault with the given message.
    Fault(String),
    /// Drop the completer without resolving, as a store whose callback
    /// never comes back within the cycle.
    NeverResolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOpKind {
    Upsert,
    Delete,
}

#[derive(Debug, Clone)]
pub struct StoreOp {
    pub kind: StoreOpKind,
    pub entity: CatalogEntity,
}

/// In-process primary-store fake: records every operation it receives and
/// resolves completions according to the configured behavior.
pub struct RecordingStore {
    behavior: Mutex<StoreBehavior>,
    ops: Mutex<Vec<StoreOp>>,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::with_behavior(StoreBehavior::Succeed)
    }

    pub fn with_behavior(behavior: StoreBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            ops: Mutex::new(Vec::new()),
        }
    }

    pub fn set_behavior(&self, behavior: StoreBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn ops(&self) -> Vec<StoreOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn upserts(&self) -> Vec<StoreOp> {
        self.ops().into_iter().filter(|op| op.kind == StoreOpKind::Upsert).collect()
    }

    pub fn deletes(&self) -> Vec<StoreOp> {
        self.ops().into_iter().filter(|op| op.kind == StoreOpKind::Delete).collect()
    }

    fn respond(&self, kind: StoreOpKind, entity: CatalogEntity) -> Completion {
        self.ops.lock().unwrap().push(StoreOp { kind, entity });
        match self.behavior.lock().unwrap().clone() {
            StoreBehavior::Succeed => Completion::resolved(Ok(true)),
            StoreBehavior::ReportFailure => Completion::resolved(Ok(false)),
            StoreBehavior::Fault(message) => Completion::resolved(Err(StoreFault(message))),
            StoreBehavior::NeverResolve => {
                let (completer, completion) = Completion::pair();
                drop(completer);
                completion
            }
        }
    }
}

impl TsdbStore for RecordingStore {
    fn upsert(&self, entity: CatalogEntity) -> Completion {
        self.respond(StoreOpKind::Upsert, entity)
    }

    fn delete(&self, entity: CatalogEntity) -> Completion {
        self.respond(StoreOpKind::Delete, entity)
    }
}
