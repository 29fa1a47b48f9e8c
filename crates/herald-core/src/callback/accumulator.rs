use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::outcome::{Answer, CallbackResult, Eventual, Outcome, Value, flatten};
use super::ResultSlot;

/// Result accumulation shared by `Lookup` and `Resolution`.
pub(super) struct Accumulator {
    many: bool,
    instant: bool,
    results: Mutex<Vec<Eventual<Option<Value>>>>,
    promised: AtomicBool,
    pub(super) memo: ResultSlot,
}

impl Accumulator {
    pub(super) fn new(many: bool, instant: bool) -> Self {
        Self {
            many,
            instant,
            results: Mutex::new(Vec::new()),
            promised: AtomicBool::new(false),
            memo: ResultSlot::new(),
        }
    }

    pub(super) fn is_many(&self) -> bool {
        self.many
    }

    pub(super) fn is_promised(&self) -> bool {
        self.promised.load(Ordering::Acquire)
    }

    pub(super) fn len(&self) -> usize {
        self.results.lock().len()
    }

    /// Null-like outcomes never count; pending ones are refused for instant keys.
    pub(super) fn include(&self, outcome: &Outcome) -> bool {
        let entry = match outcome {
            Outcome::Unhandled(_) | Outcome::Void => return false,
            Outcome::Value(value) => Eventual::Ready(Some(value.clone())),
            Outcome::Pending(promise) => {
                if self.instant {
                    return false;
                }
                self.promised.store(true, Ordering::Release);
                Eventual::Pending(promise.clone())
            }
        };
        {
            let mut results = self.results.lock();
            if self.many || results.is_empty() {
                results.push(entry);
            }
        }
        self.memo.clear();
        true
    }

    pub(super) fn result(&self) -> CallbackResult {
        self.memo.get_or_compute(|| self.compute())
    }

    fn compute(&self) -> CallbackResult {
        let results = self.results.lock().clone();
        if self.many {
            return match Eventual::join_all(results) {
                Eventual::Ready(values) => Eventual::Ready(many(values)),
                Eventual::Pending(promise) => Eventual::Pending(promise.map(|values| Ok(many(values)))),
            };
        }
        match results.into_iter().next() {
            None => Eventual::Ready(Answer::One(None)),
            Some(Eventual::Ready(value)) => Eventual::Ready(Answer::One(value)),
            Some(Eventual::Pending(promise)) => {
                Eventual::Pending(promise.map(|value| Ok(Answer::One(value))))
            }
        }
    }
}

fn many(values: Vec<Option<Value>>) -> Answer {
    Answer::Many(flatten(values.into_iter().flatten()))
}
