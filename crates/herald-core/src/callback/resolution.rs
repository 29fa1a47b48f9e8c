use std::fmt;
use std::sync::Arc;

use super::accumulator::Accumulator;
use super::outcome::{CallbackResult, Outcome, Value};
use super::{Callback, ResultSlot};
use crate::binding::Constraint;
use crate::error::Result;
use crate::handler::CallbackHandler;

pub type SatisfiesFn = Arc<dyn Fn(&Value, &dyn CallbackHandler) -> Result<bool> + Send + Sync>;

/// Resolution は「キーを満たすインスタンスをくれ」という要求
///
/// `satisfies` があれば、各候補はそれを通過したときだけ受理される。
/// 受理されなかった候補は数えず、ディスパッチは走査を続ける。
pub struct Resolution {
    key: Constraint,
    results: Accumulator,
    satisfies: Option<SatisfiesFn>,
}

impl Resolution {
    pub fn new(key: impl Into<Constraint>, many: bool) -> Self {
        let key = key.into();
        let instant = key.is_instant();
        Self {
            key,
            results: Accumulator::new(many, instant),
            satisfies: None,
        }
    }

    pub fn satisfied_by<F>(mut self, satisfies: F) -> Self
    where
        F: Fn(&Value, &dyn CallbackHandler) -> Result<bool> + Send + Sync + 'static,
    {
        self.satisfies = Some(Arc::new(satisfies));
        self
    }

    pub fn key(&self) -> &Constraint {
        &self.key
    }

    pub fn is_many(&self) -> bool {
        self.results.is_many()
    }

    /// Whether any accepted resolution was asynchronous.
    pub fn is_promised(&self) -> bool {
        self.results.is_promised()
    }

    pub fn is_resolved(&self) -> bool {
        self.results.len() > 0
    }

    pub fn resolve(&self, outcome: &Outcome, composer: &dyn CallbackHandler) -> Result<bool> {
        if let (Some(satisfies), Outcome::Value(value)) = (&self.satisfies, outcome)
            && !satisfies(value, composer)?
        {
            return Ok(false);
        }
        Ok(self.results.include(outcome))
    }
}

impl Callback for Resolution {
    fn result_slot(&self) -> Option<&ResultSlot> {
        Some(&self.results.memo)
    }

    fn callback_result(&self) -> Option<CallbackResult> {
        Some(self.results.result())
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("key", &self.key)
            .field("many", &self.is_many())
            .field("results", &self.results.len())
            .finish()
    }
}
