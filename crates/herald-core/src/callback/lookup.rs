use std::fmt;

use super::accumulator::Accumulator;
use super::outcome::{CallbackResult, Outcome};
use super::{Callback, ResultSlot};
use crate::binding::Constraint;

/// Lookup はキー（名前・型）で登録値を完全一致検索する
///
/// `many = false` なら最初の結果のみ保持する。
pub struct Lookup {
    key: Constraint,
    results: Accumulator,
}

impl Lookup {
    pub fn new(key: impl Into<Constraint>, many: bool) -> Self {
        let key = key.into();
        let instant = key.is_instant();
        Self {
            key,
            results: Accumulator::new(many, instant),
        }
    }

    pub fn key(&self) -> &Constraint {
        &self.key
    }

    pub fn is_many(&self) -> bool {
        self.results.is_many()
    }

    pub fn is_promised(&self) -> bool {
        self.results.is_promised()
    }

    pub fn add_result(&self, outcome: &Outcome) -> bool {
        self.results.include(outcome)
    }
}

impl Callback for Lookup {
    fn result_slot(&self) -> Option<&ResultSlot> {
        Some(&self.results.memo)
    }

    fn callback_result(&self) -> Option<CallbackResult> {
        Some(self.results.result())
    }
}

impl fmt::Debug for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lookup")
            .field("key", &self.key)
            .field("many", &self.is_many())
            .field("results", &self.results.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Answer, Eventual, Promise};
    use rstest::rstest;
    use std::sync::Arc;

    fn values(result: CallbackResult) -> Vec<u32> {
        let answer = result.ready().cloned().unwrap();
        answer
            .many()
            .into_iter()
            .map(|v| *v.downcast_ref::<u32>().unwrap())
            .collect()
    }

    #[rstest]
    #[case::single(false, vec![1])]
    #[case::many(true, vec![1, 2])]
    fn many_policy(#[case] many: bool, #[case] expected: Vec<u32>) {
        let lookup = Lookup::new("answer", many);
        assert!(lookup.add_result(&Outcome::value(1_u32)));
        assert!(lookup.add_result(&Outcome::value(2_u32)));
        let result = lookup.callback_result().unwrap();
        if many {
            assert!(matches!(result.ready(), Some(Answer::Many(v)) if v.len() == 2));
        }
        assert_eq!(values(result), expected);
    }

    #[test]
    fn null_results_are_refused() {
        let lookup = Lookup::new("answer", true);
        assert!(!lookup.add_result(&Outcome::Void));
        assert!(!lookup.add_result(&Outcome::unhandled()));
        assert_eq!(values(lookup.callback_result().unwrap()), Vec::<u32>::new());
    }

    #[test]
    fn result_is_memoized_until_next_add() {
        let lookup = Lookup::new("answer", true);
        lookup.add_result(&Outcome::Pending(Promise::resolved(Some(Arc::new(1_u32) as _))));
        let first = lookup.callback_result().unwrap();
        let second = lookup.callback_result().unwrap();
        let (Eventual::Pending(a), Eventual::Pending(b)) = (&first, &second) else {
            panic!("expected pending results");
        };
        assert!(a.ptr_eq(b));

        lookup.add_result(&Outcome::value(2_u32));
        let third = lookup.callback_result().unwrap();
        let Eventual::Pending(c) = &third else {
            panic!("expected pending result");
        };
        assert!(!a.ptr_eq(c));
    }

    #[test]
    fn instant_keys_refuse_pending_results() {
        let lookup = Lookup::new(Constraint::name("answer").instant(), false);
        assert!(!lookup.add_result(&Outcome::Pending(Promise::resolved(None))));
        assert!(!lookup.is_promised());
        assert!(lookup.add_result(&Outcome::value(5_u32)));
        assert_eq!(values(lookup.callback_result().unwrap()), vec![5]);
    }

    #[tokio::test]
    async fn pending_results_settle_into_a_flat_list() {
        let lookup = Lookup::new("answer", true);
        lookup.add_result(&Outcome::value(1_u32));
        lookup.add_result(&Outcome::Pending(Promise::resolved(Some(Arc::new(2_u32) as _))));
        assert!(lookup.is_promised());
        let answer = lookup.callback_result().unwrap().settle().await.unwrap();
        assert_eq!(answer.many().len(), 2);
    }
}
