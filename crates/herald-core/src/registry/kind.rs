//! Kind - binding kind（handle / provide / lookup）とディスパッチアルゴリズム
//!
//! # 学習ポイント
//! - kind ごとに固定の variance と「処理済み」判定を持つ
//! - スナップショット走査（ハンドラ実行中にリストを変更しても安全）
//! - 未処理はエラーではなく `Outcome::Unhandled`

use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use super::definitions::Definitions;
use crate::binding::{
    Binding, Constraint, Context, HandlerFn, IndexKey, RemovedFn, Variance,
};
use crate::callback::{Outcome, Payload, callback_type};
use crate::error::{MediatorError, Result};
use crate::handler::{CallbackHandler, Handler, builtin};
use crate::observability;

/// Kind は名前付きディスパッチ表（固有のキーと固定の variance）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind {
    key: &'static str,
    variance: Variance,
}

/// Contravariant: handlers accept the registered type and its subtypes.
pub static HANDLE: Kind = Kind::new("handle", Variance::Contravariant);
/// Covariant: providers may return something more specific than requested.
pub static PROVIDE: Kind = Kind::new("provide", Variance::Covariant);
/// Invariant: exact key lookups only.
pub static LOOKUP: Kind = Kind::new("lookup", Variance::Invariant);

impl Kind {
    pub const fn new(key: &'static str, variance: Variance) -> Self {
        Self { key, variance }
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn variance(&self) -> Variance {
        self.variance
    }

    /// Contravariant kinds count void results as handled; the others need a value.
    pub fn is_handled(&self, outcome: &Outcome) -> bool {
        match self.variance {
            Variance::Contravariant => !outcome.is_unhandled(),
            Variance::Covariant | Variance::Invariant => {
                !outcome.is_unhandled() && !outcome.is_void()
            }
        }
    }

    /// Register one binding per constraint (`Any` when none are given).
    pub fn define(&self, owner: &Arc<Definitions>, definition: Definition) -> Result<Unregister> {
        let Definition {
            constraints,
            handler,
            removed,
            key,
        } = definition;
        let handler = handler.ok_or_else(|| MediatorError::IncompleteDefinition {
            kind: self.key,
            reason: "no handler was supplied".to_string(),
        })?;
        let constraints = if constraints.is_empty() {
            vec![Constraint::Any]
        } else {
            constraints
        };
        let ids: Vec<u64> = constraints
            .into_iter()
            .map(|constraint| {
                let binding = Binding::new(constraint, handler.clone())
                    .with_removed(removed.clone())
                    .with_key(key.clone());
                owner.insert(self.key, self.variance, binding).id()
            })
            .collect();
        debug!(kind = self.key, bindings = ids.len(), "bindings defined");
        Ok(Unregister {
            owner: Arc::downgrade(owner),
            kind: self.key,
            ids,
        })
    }

    /// Notify every binding of this kind that it is gone, then drop the list.
    pub fn remove_all(&self, owner: &Definitions) {
        let removed = owner.remove_list(self.key);
        debug!(kind = self.key, bindings = removed.len(), "bindings removed");
        for binding in removed {
            binding.notify_removed();
        }
    }

    pub fn dispatch(
        &self,
        handler: &Handler,
        callback: &Payload,
        constraint: Option<&Constraint>,
        composer: &dyn CallbackHandler,
        all: bool,
    ) -> Result<Outcome> {
        self.dispatch_with(handler, callback, constraint, composer, all, &mut |_| Ok(true))
    }

    /// `on_result` sees every handled outcome; returning `false` disqualifies
    /// it and the scan continues.
    pub fn dispatch_with(
        &self,
        handler: &Handler,
        callback: &Payload,
        constraint: Option<&Constraint>,
        composer: &dyn CallbackHandler,
        all: bool,
        on_result: &mut dyn FnMut(&Outcome) -> Result<bool>,
    ) -> Result<Outcome> {
        let requested = match constraint {
            Some(constraint) => constraint.clone(),
            None => Constraint::Type(callback_type(callback)),
        };
        let (candidate, invariant, _) = requested.unwrap_modifiers();
        let variance = if invariant {
            Variance::Invariant
        } else {
            self.variance
        };
        let mut scan = Scan {
            kind: self,
            callback,
            candidate,
            variance,
            index: candidate.index(),
            context: Context {
                composer,
                handler,
                greedy: all,
            },
            all,
            on_result,
            first: None,
        };

        if let Some(definitions) = handler.delegate().and_then(|d| d.definitions()) {
            scan.level(definitions)?;
        }
        if scan.first.is_none() || all {
            for definitions in [handler.definitions(), builtin::definitions()] {
                if scan.level(definitions)? && !all {
                    break;
                }
            }
        }

        let outcome = scan.first.unwrap_or_else(Outcome::unhandled);
        observability::record_dispatch(!outcome.is_unhandled());
        if outcome.is_unhandled() {
            trace!(kind = self.key, callback = ?callback, constraint = %candidate, "no binding matched");
        }
        Ok(outcome)
    }
}

struct Scan<'a, 'b> {
    kind: &'a Kind,
    callback: &'a Payload,
    candidate: &'a Constraint,
    variance: Variance,
    index: Option<IndexKey>,
    context: Context<'a>,
    all: bool,
    on_result: &'b mut dyn FnMut(&Outcome) -> Result<bool>,
    first: Option<Outcome>,
}

impl Scan<'_, '_> {
    /// Scan one owner level. Returns whether anything was handled there.
    fn level(&mut self, definitions: &Definitions) -> Result<bool> {
        let Some(bindings) = definitions.candidates(self.kind.key, self.index.as_ref(), self.variance)
        else {
            return Ok(false);
        };
        let mut handled = false;
        for binding in bindings {
            if !binding.matches(self.candidate, self.variance) {
                continue;
            }
            let outcome = binding.invoke(self.callback, &self.context)?;
            if !self.kind.is_handled(&outcome) || !(self.on_result)(&outcome)? {
                continue;
            }
            handled = true;
            if self.first.is_none() {
                self.first = Some(outcome);
            }
            if !self.all {
                break;
            }
        }
        Ok(handled)
    }
}

/// Definition は `Kind::define` に渡す登録内容のビルダー
#[derive(Default)]
pub struct Definition {
    constraints: Vec<Constraint>,
    handler: Option<HandlerFn>,
    removed: Option<RemovedFn>,
    key: Option<String>,
}

impl Definition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constraint(mut self, constraint: impl Into<Constraint>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn constraints(mut self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        self.constraints.extend(constraints);
        self
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Payload, &Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Reuse an existing handler, keeping its identity for dedupe.
    pub fn handler_fn(mut self, handler: HandlerFn) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Lift a constant into a handler returning it.
    pub fn returns(self, outcome: Outcome) -> Self {
        self.handler(move |_, _| Ok(outcome.clone()))
    }

    pub fn on_removed<F>(mut self, removed: F) -> Self
    where
        F: Fn(&Binding) + Send + Sync + 'static,
    {
        self.removed = Some(Arc::new(removed));
        self
    }

    /// Dedupe key: bindings with equal constraints and keys are the same binding.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Unregister は登録を取り消すハンドル
#[must_use]
#[derive(Debug)]
pub struct Unregister {
    owner: Weak<Definitions>,
    kind: &'static str,
    ids: Vec<u64>,
}

impl Unregister {
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Merge two handles for the same owner and kind.
    pub fn and(mut self, other: Unregister) -> Self {
        self.ids.extend(other.ids);
        self
    }

    pub fn unregister(self) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        for id in self.ids {
            if let Some(binding) = owner.remove_binding(self.kind, id) {
                binding.notify_removed();
            }
        }
        debug!(kind = self.kind, "bindings unregistered");
    }
}
