use std::fmt;

use parking_lot::Mutex;

use super::outcome::{Answer, CallbackResult, Eventual, Outcome, Promise, Value, flatten};
use super::{Callback, Payload, ResultSlot};

/// Deferred は内側のコールバックを処理し、発生した非同期結果を追跡する
pub struct Deferred {
    callback: Payload,
    many: bool,
    pending: Mutex<Vec<Promise<Option<Value>>>>,
    memo: ResultSlot,
}

impl Deferred {
    pub fn new(callback: Payload, many: bool) -> Self {
        Self {
            callback,
            many,
            pending: Mutex::new(Vec::new()),
            memo: ResultSlot::new(),
        }
    }

    pub fn callback(&self) -> &Payload {
        &self.callback
    }

    pub fn is_many(&self) -> bool {
        self.many
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Record a handled outcome, capturing it when asynchronous.
    pub fn track(&self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::Unhandled(_) => false,
            Outcome::Pending(promise) => {
                self.pending.lock().push(promise.clone());
                self.memo.clear();
                true
            }
            _ => true,
        }
    }
}

impl Callback for Deferred {
    fn result_slot(&self) -> Option<&ResultSlot> {
        Some(&self.memo)
    }

    fn callback_result(&self) -> Option<CallbackResult> {
        Some(self.memo.get_or_compute(|| {
            let pending: Vec<_> = self.pending.lock().iter().cloned().map(Eventual::Pending).collect();
            let many = self.many;
            let answer = move |values: Vec<Option<Value>>| {
                let values = flatten(values.into_iter().flatten());
                if many {
                    Answer::Many(values)
                } else {
                    Answer::One(values.into_iter().next())
                }
            };
            match Eventual::join_all(pending) {
                Eventual::Ready(values) => Eventual::Ready(answer(values)),
                Eventual::Pending(promise) => Eventual::Pending(promise.map(move |v| Ok(answer(v)))),
            }
        }))
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("callback", &self.callback)
            .field("many", &self.many)
            .field("pending", &self.pending_count())
            .finish()
    }
}
