use std::sync::Arc;

use super::base::Handler;
use super::CallbackHandler;
use crate::callback::Payload;
use crate::error::Result;

/// CascadeHandler は自身の定義 → primary → secondary の順に試す
///
/// greedy でなければ最初に処理したところで止まる。
pub struct CascadeHandler {
    core: Arc<Handler>,
    primary: Arc<dyn CallbackHandler>,
    secondary: Arc<dyn CallbackHandler>,
}

impl CascadeHandler {
    pub fn new(primary: Arc<dyn CallbackHandler>, secondary: Arc<dyn CallbackHandler>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core: Handler::owned_by(this.clone()),
            primary,
            secondary,
        })
    }

    /// Bindings answered before either wrapped handler.
    pub fn core(&self) -> &Arc<Handler> {
        &self.core
    }

    pub fn primary(&self) -> &Arc<dyn CallbackHandler> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn CallbackHandler> {
        &self.secondary
    }
}

impl CallbackHandler for CascadeHandler {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        if greedy {
            let core = self.core.handle_callback(callback, true, composer)?;
            let primary = self.primary.handle_callback(callback, true, composer)?;
            let secondary = self.secondary.handle_callback(callback, true, composer)?;
            return Ok(core || primary || secondary);
        }
        Ok(self.core.handle_callback(callback, false, composer)?
            || self.primary.handle_callback(callback, false, composer)?
            || self.secondary.handle_callback(callback, false, composer)?)
    }

    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.core.shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Constraint;
    use crate::callback::{Callback, Outcome, payload};
    use crate::handler::HandlerExt;
    use crate::registry::{Definition, HANDLE};
    use rstest::rstest;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Ping;
    impl Callback for Ping {}

    fn counting(hits: &Arc<AtomicU32>) -> Arc<dyn CallbackHandler> {
        let hits = hits.clone();
        Handler::accepting(Constraint::of::<Ping>(), move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Void)
        })
        .unwrap()
    }

    #[rstest]
    #[case::first_wins(false, 1, 0)]
    #[case::greedy_reaches_both(true, 1, 1)]
    fn cascade_order(#[case] greedy: bool, #[case] primary: u32, #[case] secondary: u32) {
        let (first, second) = (Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
        let cascade = CascadeHandler::new(counting(&first), counting(&second));
        assert!(cascade.handle(&payload(Ping), greedy).unwrap());
        assert_eq!(first.load(Ordering::SeqCst), primary);
        assert_eq!(second.load(Ordering::SeqCst), secondary);
    }

    #[test]
    fn core_bindings_answer_before_the_primary() {
        let (own, first, second) = (
            Arc::new(AtomicU32::new(0)),
            Arc::new(AtomicU32::new(0)),
            Arc::new(AtomicU32::new(0)),
        );
        let cascade = CascadeHandler::new(counting(&first), counting(&second));
        let hits = own.clone();
        let _ = cascade
            .core()
            .define(
                &HANDLE,
                Definition::new().constraint(Constraint::of::<Ping>()).handler(move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(Outcome::Void)
                }),
            )
            .unwrap();
        assert!(cascade.handle(&payload(Ping), false).unwrap());
        assert_eq!(own.load(Ordering::SeqCst), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn the_cascade_resolves_as_itself() {
        let cascade = CascadeHandler::new(Handler::new(), Handler::new());
        let found = cascade.resolve_as::<CascadeHandler>().unwrap().ready().cloned().flatten();
        assert!(found.is_some_and(|found| Arc::ptr_eq(&found, &cascade)));
    }
}
