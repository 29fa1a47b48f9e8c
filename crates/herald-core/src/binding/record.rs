use std::fmt;
use std::sync::Arc;

use super::constraint::{self, Constraint, IndexKey};
use super::variance::Variance;
use crate::callback::{Outcome, Payload};
use crate::error::Result;
use crate::handler::{CallbackHandler, Handler};
use crate::types::assign_stable_id;

pub type HandlerFn = Arc<dyn Fn(&Payload, &Context<'_>) -> Result<Outcome> + Send + Sync>;
pub type RemovedFn = Arc<dyn Fn(&Binding) + Send + Sync>;

/// Context は束縛ハンドラに渡される呼び出し文脈
pub struct Context<'a> {
    /// The top-level handler chain for nested requests.
    pub composer: &'a dyn CallbackHandler,
    /// The handler whose definitions matched.
    pub handler: &'a Handler,
    pub greedy: bool,
}

/// Binding は 1 つの (制約, ハンドラ) の組
///
/// 構築後は不変。等価性は「同じ制約」かつ「同じハンドラ、または同じ dedupe キー」。
pub struct Binding {
    id: u64,
    constraint: Constraint,
    invariant: bool,
    handler: HandlerFn,
    removed: Option<RemovedFn>,
    key: Option<String>,
}

impl Binding {
    pub fn new(constraint: Constraint, handler: HandlerFn) -> Self {
        let (invariant, constraint) = match constraint {
            Constraint::Exact(inner) => (true, *inner),
            other => (false, other),
        };
        Self {
            id: assign_stable_id(),
            constraint,
            invariant,
            handler,
            removed: None,
            key: None,
        }
    }

    pub fn with_removed(mut self, removed: Option<RemovedFn>) -> Self {
        self.removed = removed;
        self
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn is_invariant(&self) -> bool {
        self.invariant
    }

    pub fn index(&self) -> Option<IndexKey> {
        self.constraint.index()
    }

    pub fn matches(&self, candidate: &Constraint, variance: Variance) -> bool {
        if self.invariant {
            let (candidate, _, _) = candidate.unwrap_modifiers();
            return constraint::exact(&self.constraint, candidate);
        }
        constraint::matches(&self.constraint, candidate, variance)
    }

    pub fn invoke(&self, callback: &Payload, context: &Context<'_>) -> Result<Outcome> {
        (self.handler)(callback, context)
    }

    pub(crate) fn notify_removed(&self) {
        if let Some(removed) = &self.removed {
            removed(self);
        }
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        if self.constraint != other.constraint || self.invariant != other.invariant {
            return false;
        }
        std::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(&other.handler))
            || (self.key.is_some() && self.key == other.key)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("id", &self.id)
            .field("constraint", &self.constraint)
            .field("invariant", &self.invariant)
            .field("key", &self.key)
            .finish()
    }
}
