use std::sync::Arc;
use std::time::Duration;

use super::policy::{Policy, with_policy};
use super::CallbackHandler;
use crate::batch::Batched;
use crate::callback::Payload;
use crate::error::Result;
use crate::filter::{self, AfterFn, BeforeFn, Proceed, TimeoutErrorFn};
use crate::invocation::{CallOptions, InvocationOptions};
use crate::types::{Expando, TypeKey};

/// HandlerDecorators はハンドラを包むチェーン可能なデコレータ
///
/// # 使用例
/// ```ignore
/// let handler = core
///     .guard(target, "guarded")
///     .timeout(Duration::from_secs(1), None)
///     .call_options(InvocationOptions::NOTIFY);
/// ```
pub trait HandlerDecorators: Sized {
    fn filter<F>(self, hook: F, reentrant: bool) -> Arc<dyn CallbackHandler>
    where
        F: Fn(&Payload, &dyn CallbackHandler, Proceed<'_>) -> Result<bool> + Send + Sync + 'static;

    fn aspect(
        self,
        before: Option<BeforeFn>,
        after: Option<AfterFn>,
        reentrant: bool,
    ) -> Arc<dyn CallbackHandler>;

    fn guard(self, target: Arc<Expando>, property: &str) -> Arc<dyn CallbackHandler>;

    fn activity(self, target: Arc<Expando>, delay: Duration, property: &str) -> Arc<dyn CallbackHandler>;

    fn promised(self) -> Arc<dyn CallbackHandler>;

    fn timeout(self, duration: Duration, error: Option<TimeoutErrorFn>) -> Arc<dyn CallbackHandler>;

    /// Keeps the concrete type so that the caller can `dispose` the batch.
    fn batch(self, protocols: Vec<TypeKey>) -> Result<Arc<Batched>>;

    fn call_options(self, options: InvocationOptions) -> Arc<dyn CallbackHandler>;

    fn with_policy(self, name: &str, policy: Arc<dyn Policy>) -> Result<Arc<dyn CallbackHandler>>;
}

impl HandlerDecorators for Arc<dyn CallbackHandler> {
    fn filter<F>(self, hook: F, reentrant: bool) -> Arc<dyn CallbackHandler>
    where
        F: Fn(&Payload, &dyn CallbackHandler, Proceed<'_>) -> Result<bool> + Send + Sync + 'static,
    {
        filter::filter(self, hook, reentrant)
    }

    fn aspect(
        self,
        before: Option<BeforeFn>,
        after: Option<AfterFn>,
        reentrant: bool,
    ) -> Arc<dyn CallbackHandler> {
        filter::aspect(self, before, after, reentrant)
    }

    fn guard(self, target: Arc<Expando>, property: &str) -> Arc<dyn CallbackHandler> {
        filter::guard(self, target, property)
    }

    fn activity(self, target: Arc<Expando>, delay: Duration, property: &str) -> Arc<dyn CallbackHandler> {
        filter::activity(self, target, delay, property)
    }

    fn promised(self) -> Arc<dyn CallbackHandler> {
        filter::promised(self)
    }

    fn timeout(self, duration: Duration, error: Option<TimeoutErrorFn>) -> Arc<dyn CallbackHandler> {
        filter::timeout(self, duration, error)
    }

    fn batch(self, protocols: Vec<TypeKey>) -> Result<Arc<Batched>> {
        Batched::new(self, protocols)
    }

    fn call_options(self, options: InvocationOptions) -> Arc<dyn CallbackHandler> {
        CallOptions::new(self, options)
    }

    fn with_policy(self, name: &str, policy: Arc<dyn Policy>) -> Result<Arc<dyn CallbackHandler>> {
        with_policy(self, name, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Constraint;
    use crate::callback::{Callback, Outcome, payload};
    use crate::error::MediatorError;
    use crate::handler::{Handler, HandlerExt};
    use crate::invocation::InvocationSemantics;
    use parking_lot::Mutex;

    struct Ping;
    impl Callback for Ping {}

    #[test]
    fn decorators_chain_outside_in() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let core: Arc<dyn CallbackHandler> =
            Handler::accepting(Constraint::of::<Ping>(), |_, _| Ok(Outcome::Void)).unwrap();
        let (inner_log, outer_log) = (log.clone(), log.clone());
        let decorated = core
            .filter(
                move |_, _, proceed| {
                    inner_log.lock().push("inner");
                    proceed.run()
                },
                false,
            )
            .filter(
                move |_, _, proceed| {
                    outer_log.lock().push("outer");
                    proceed.run()
                },
                false,
            );
        assert!(decorated.handle(&payload(Ping), false).unwrap());
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn call_options_policy_can_be_installed_by_name() {
        crate::handler::register_policy::<InvocationSemantics>("invocation").unwrap();
        let handler: Arc<dyn CallbackHandler> = Handler::new();
        let decorated = handler
            .with_policy("invocation", Arc::new(InvocationSemantics::new(InvocationOptions::STRICT)))
            .unwrap();
        let query = Arc::new(InvocationSemantics::default());
        let callback: Payload = query.clone();
        assert!(decorated.handle(&callback, true).unwrap());
        assert!(query.get_option(InvocationOptions::STRICT));

        let plain: Arc<dyn CallbackHandler> = Handler::new();
        let err = plain
            .with_policy("missing", Arc::new(InvocationSemantics::default()))
            .err().unwrap();
        assert!(matches!(err, MediatorError::UnknownPolicy(_)));
    }
}
