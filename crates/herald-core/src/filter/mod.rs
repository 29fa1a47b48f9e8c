//! Filter - handle_callback を包むパイプライン
//!
//! # 学習ポイント
//! - デコレータは `Arc<dyn CallbackHandler>` を包む構造体（型消去されたまま合成）
//! - `Proceed` は元のディスパッチを一度だけ実行する権利（`self` を消費）
//! - Composition で包まれた内部コールバックには、reentrant でない限り適用しない
//!
//! aspect / guard / activity / promise / timeout はすべて filter の上に作られる。

mod activity;
mod aspect;
mod guard;
mod promise;
mod timeout;

use std::fmt;
use std::sync::{Arc, Weak};

pub use activity::{activity, activity_count};
pub use aspect::{AfterFn, BeforeFn, Gate, aspect};
pub use guard::guard;
pub use promise::promised;
pub use timeout::{TimeoutErrorFn, timeout};

use crate::batch::Batching;
use crate::callback::{Composition, Payload, Value};
use crate::error::Result;
use crate::handler::{CallbackHandler, CompositionScope, HandlerExt};

pub type FilterFn =
    Arc<dyn Fn(&Payload, &dyn CallbackHandler, Proceed<'_>) -> Result<bool> + Send + Sync>;

/// Proceed は包まれたハンドラへのディスパッチを続行する
pub struct Proceed<'a> {
    inner: &'a Arc<dyn CallbackHandler>,
    callback: &'a Payload,
    greedy: bool,
    composer: &'a dyn CallbackHandler,
}

impl Proceed<'_> {
    pub fn callback(&self) -> &Payload {
        self.callback
    }

    pub fn is_greedy(&self) -> bool {
        self.greedy
    }

    pub fn run(self) -> Result<bool> {
        self.inner
            .handle_callback(self.callback, self.greedy, self.composer)
    }

    /// An owned continuation for use after the current call has returned.
    ///
    /// The detached run composes through the same root handler as this call.
    /// A composer that keeps no owned handle falls back to a fresh scope over
    /// the wrapped handler.
    pub fn detach(&self) -> DetachedProceed {
        DetachedProceed {
            inner: self.inner.clone(),
            callback: self.callback.clone(),
            greedy: self.greedy,
            composer: self.composer.shared(),
        }
    }
}

pub struct DetachedProceed {
    inner: Arc<dyn CallbackHandler>,
    callback: Payload,
    greedy: bool,
    composer: Option<Arc<dyn CallbackHandler>>,
}

impl DetachedProceed {
    pub fn run(self) -> Result<bool> {
        match &self.composer {
            Some(composer) => {
                let scope = CompositionScope::new(composer.as_ref());
                self.inner.handle_callback(&self.callback, self.greedy, &scope)
            }
            None => self.inner.handle(&self.callback, self.greedy),
        }
    }
}

/// Filtered は FilterFn で包まれたハンドラ
pub struct Filtered {
    this: Weak<Filtered>,
    inner: Arc<dyn CallbackHandler>,
    filter: FilterFn,
    reentrant: bool,
}

impl Filtered {
    pub fn new(inner: Arc<dyn CallbackHandler>, filter: FilterFn, reentrant: bool) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            inner,
            filter,
            reentrant,
        })
    }

    pub fn inner(&self) -> &Arc<dyn CallbackHandler> {
        &self.inner
    }
}

impl CallbackHandler for Filtered {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        if !self.reentrant && Composition::is_composition(callback) {
            return self.inner.handle_callback(callback, greedy, composer);
        }
        let proceed = Proceed {
            inner: &self.inner,
            callback,
            greedy,
            composer,
        };
        (self.filter)(callback, composer, proceed)
    }

    fn delegate_value(&self) -> Option<&Value> {
        self.inner.delegate_value()
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        self.inner.as_batching()
    }

    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.this.upgrade().map(|this| this as Arc<dyn CallbackHandler>)
    }
}

impl fmt::Debug for Filtered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filtered")
            .field("reentrant", &self.reentrant)
            .finish_non_exhaustive()
    }
}

/// Wrap `inner` so that `filter` sees every outer callback.
pub fn filter<F>(inner: Arc<dyn CallbackHandler>, filter: F, reentrant: bool) -> Arc<Filtered>
where
    F: Fn(&Payload, &dyn CallbackHandler, Proceed<'_>) -> Result<bool> + Send + Sync + 'static,
{
    Filtered::new(inner, Arc::new(filter), reentrant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Constraint;
    use crate::callback::{Callback, Outcome, payload};
    use crate::handler::Handler;
    use parking_lot::Mutex;
    use rstest::rstest;

    struct Ping;
    impl Callback for Ping {}

    fn nested() -> Arc<dyn CallbackHandler> {
        let handler = Handler::new();
        let _ = handler
            .define(
                &crate::registry::PROVIDE,
                crate::registry::Definition::new().constraint("inner").returns(Outcome::value(1_u32)),
            )
            .unwrap();
        let _ = handler
            .define(
                &crate::registry::HANDLE,
                crate::registry::Definition::new()
                    .constraint(Constraint::of::<Ping>())
                    .handler(|_, ctx| {
                        ctx.composer.resolve("inner")?;
                        Ok(Outcome::Void)
                    }),
            )
            .unwrap();
        handler
    }

    #[rstest]
    #[case::outer_only(false, 1)]
    #[case::reentrant(true, 2)]
    fn filter_skips_compositions_unless_reentrant(#[case] reentrant: bool, #[case] seen: usize) {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let filtered = filter(
            nested(),
            move |_, _, proceed| {
                *counter.lock() += 1;
                proceed.run()
            },
            reentrant,
        );
        assert!(filtered.handle(&payload(Ping), false).unwrap());
        assert_eq!(*calls.lock(), seen);
    }

    #[test]
    fn filter_can_short_circuit() {
        let filtered = filter(nested(), |_, _, _| Ok(false), false);
        assert!(!filtered.handle(&payload(Ping), false).unwrap());
    }
}
