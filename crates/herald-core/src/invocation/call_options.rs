use std::sync::{Arc, Weak};

use super::options::InvocationOptions;
use super::semantics::InvocationSemantics;
use crate::batch::Batching;
use crate::callback::{Composition, Payload, Value, downcast};
use crate::error::Result;
use crate::handler::CallbackHandler;

/// CallOptions は呼び出しオプションを外側のスコープとして与えるデコレータ
///
/// - InvocationSemantics の問い合わせにはオプションをマージして答える
/// - 通常のコールバックでは、周囲のセマンティクスが BROADCAST なら greedy にする
pub struct CallOptions {
    this: Weak<CallOptions>,
    inner: Arc<dyn CallbackHandler>,
    semantics: InvocationSemantics,
}

impl CallOptions {
    pub fn new(inner: Arc<dyn CallbackHandler>, options: InvocationOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            inner,
            semantics: InvocationSemantics::new(options),
        })
    }

    pub fn semantics(&self) -> &InvocationSemantics {
        &self.semantics
    }
}

impl CallbackHandler for CallOptions {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        if let Some(query) = downcast::<InvocationSemantics>(callback) {
            self.semantics.merge(query);
            if greedy {
                self.inner.handle_callback(callback, greedy, composer)?;
            }
            return Ok(true);
        }
        if Composition::is_composition(callback) {
            return self.inner.handle_callback(callback, greedy, composer);
        }
        let ambient = Arc::new(InvocationSemantics::default());
        let query: Payload = ambient.clone();
        composer.handle_callback(&query, true, composer)?;
        let greedy = greedy || ambient.get_option(InvocationOptions::BROADCAST);
        self.inner.handle_callback(callback, greedy, composer)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Constraint;
    use crate::callback::{Callback, Outcome, payload};
    use crate::handler::{CompositeHandler, Handler, HandlerExt};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Ping;
    impl Callback for Ping {}

    fn pair(hits: &Arc<AtomicU32>) -> Arc<dyn CallbackHandler> {
        let children: Vec<Arc<dyn CallbackHandler>> = (0..2)
            .map(|_| {
                let hits = hits.clone();
                Handler::accepting(Constraint::of::<Ping>(), move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(Outcome::Void)
                })
                .unwrap() as Arc<dyn CallbackHandler>
            })
            .collect();
        CompositeHandler::with_handlers(children)
    }

    #[test]
    fn broadcast_forces_greedy_dispatch() {
        let hits = Arc::new(AtomicU32::new(0));
        let plain = pair(&hits);
        plain.handle(&payload(Ping), false).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let broadcast = CallOptions::new(pair(&hits), InvocationOptions::BROADCAST);
        broadcast.handle(&payload(Ping), false).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn outer_options_fill_in_what_inner_left_open() {
        let inner: Arc<dyn CallbackHandler> =
            CallOptions::new(Handler::new(), InvocationOptions::STRICT);
        let outer = CallOptions::new(inner, InvocationOptions::BEST_EFFORT);
        let query = Arc::new(InvocationSemantics::default());
        let callback: Payload = query.clone();
        assert!(outer.handle(&callback, true).unwrap());
        assert!(query.get_option(InvocationOptions::STRICT));
        assert!(query.get_option(InvocationOptions::BEST_EFFORT));
    }
}
