use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use super::base::{Delegate, Handler};
use super::CallbackHandler;
use crate::callback::{Payload, Value};
use crate::error::Result;

/// ToHandler は子ハンドラへの正規化
///
/// ハンドラはそのまま、ドメインオブジェクトは delegate として包む。
pub trait ToHandler {
    fn to_handler(self) -> Arc<dyn CallbackHandler>;
}

impl<T: CallbackHandler + 'static> ToHandler for Arc<T> {
    fn to_handler(self) -> Arc<dyn CallbackHandler> {
        self
    }
}

impl ToHandler for Arc<dyn CallbackHandler> {
    fn to_handler(self) -> Arc<dyn CallbackHandler> {
        self
    }
}

impl ToHandler for Delegate {
    fn to_handler(self) -> Arc<dyn CallbackHandler> {
        Handler::with_delegate(self)
    }
}

/// Identity of two handlers, ignoring vtables.
pub fn same_handler(a: &Arc<dyn CallbackHandler>, b: &Arc<dyn CallbackHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn same_value(a: &Value, b: &Value) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// CompositeHandler は子ハンドラへの順序付きファンアウト
///
/// # ディスパッチ
/// - 自身の定義表を最初に試す
/// - greedy でなければ最初に処理した子で止まる
/// - greedy なら全ての子を試し、どれかが処理したかを返す
///
/// 子リストはスナップショットで走査するため、処理中に変更しても安全。
pub struct CompositeHandler {
    core: Arc<Handler>,
    handlers: RwLock<Vec<Arc<dyn CallbackHandler>>>,
}

impl CompositeHandler {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self::owned_by(this.clone()))
    }

    /// A composite embedded in `owner`, which it resolves as.
    pub fn owned_by<T: CallbackHandler + Any>(owner: Weak<T>) -> Self {
        Self {
            core: Handler::owned_by(owner),
            handlers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_handlers<H: ToHandler>(handlers: impl IntoIterator<Item = H>) -> Arc<Self> {
        let composite = Self::new();
        composite.add_handlers(handlers);
        composite
    }

    pub fn core(&self) -> &Arc<Handler> {
        &self.core
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Snapshot of the children.
    pub fn handlers(&self) -> Vec<Arc<dyn CallbackHandler>> {
        self.handlers.read().clone()
    }

    pub fn add_handlers<H: ToHandler>(&self, handlers: impl IntoIterator<Item = H>) -> &Self {
        let added: Vec<_> = handlers.into_iter().map(ToHandler::to_handler).collect();
        debug!(added = added.len(), "handlers added");
        self.handlers.write().extend(added);
        self
    }

    /// Insert before position `at`; out of range appends.
    pub fn insert_handlers<H: ToHandler>(
        &self,
        at: usize,
        handlers: impl IntoIterator<Item = H>,
    ) -> &Self {
        let added: Vec<_> = handlers.into_iter().map(ToHandler::to_handler).collect();
        let mut children = self.handlers.write();
        let at = at.min(children.len());
        children.splice(at..at, added);
        self
    }

    /// Remove the first child matching each argument by identity, or by the
    /// argument's delegate.
    pub fn remove_handlers(&self, handlers: &[Arc<dyn CallbackHandler>]) -> &Self {
        let mut children = self.handlers.write();
        for handler in handlers {
            let position = children.iter().position(|child| {
                same_handler(child, handler)
                    || matches!(
                        (child.delegate_value(), handler.delegate_value()),
                        (Some(a), Some(b)) if same_value(a, b)
                    )
            });
            if let Some(position) = position {
                children.remove(position);
            }
        }
        self
    }

    /// Remove the first child delegating to `value`.
    pub fn remove_delegate(&self, value: &Value) -> &Self {
        let mut children = self.handlers.write();
        if let Some(position) = children
            .iter()
            .position(|child| child.delegate_value().is_some_and(|d| same_value(d, value)))
        {
            children.remove(position);
        }
        self
    }

    /// Does any child delegate to a `T`?
    pub fn has_delegate<T: Any>(&self) -> bool {
        self.handlers
            .read()
            .iter()
            .any(|child| child.delegate_value().is_some_and(|d| d.is::<T>()))
    }
}

impl CallbackHandler for CompositeHandler {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        let mut handled = self.core.handle_callback(callback, greedy, composer)?;
        if handled && !greedy {
            return Ok(true);
        }
        for child in self.handlers() {
            if child.handle_callback(callback, greedy, composer)? {
                if !greedy {
                    return Ok(true);
                }
                handled = true;
            }
        }
        Ok(handled)
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
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Ping;
    impl Callback for Ping {}
    struct Pong;
    impl Callback for Pong {}

    #[derive(Debug, PartialEq)]
    struct Widget {
        id: u32,
    }

    fn counting<C: Callback>(hits: &Arc<AtomicU32>) -> Arc<dyn CallbackHandler> {
        let hits = hits.clone();
        Handler::accepting(Constraint::of::<C>(), move |_, _| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(Outcome::Void)
        })
        .unwrap()
    }

    #[test]
    fn greedy_reaches_every_child_and_non_greedy_stops_at_the_first() {
        let hits: Vec<_> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
        let composite = CompositeHandler::with_handlers([
            counting::<Ping>(&hits[0]),
            counting::<Pong>(&hits[1]),
            counting::<Ping>(&hits[2]),
        ]);
        let count = |i: usize| hits[i].load(Ordering::SeqCst);

        assert!(composite.handle(&payload(Ping), false).unwrap());
        assert_eq!((count(0), count(1), count(2)), (1, 0, 0));

        assert!(composite.handle(&payload(Ping), true).unwrap());
        assert_eq!((count(0), count(1), count(2)), (2, 0, 1));
    }

    #[test]
    fn resolve_all_collects_in_registration_order() {
        let first = Handler::providing(Constraint::of::<Widget>(), |_, _| Ok(Outcome::value(Widget { id: 1 })))
            .unwrap();
        let widget = first.resolve_as::<Widget>().unwrap().ready().cloned().flatten();
        assert_eq!(widget.as_deref(), Some(&Widget { id: 1 }));

        let second = Handler::providing(Constraint::of::<Widget>(), |_, _| Ok(Outcome::value(Widget { id: 2 })))
            .unwrap();
        let composite = CompositeHandler::with_handlers([first, second]);
        let all = composite.resolve_all(Constraint::of::<Widget>()).unwrap().ready().cloned().unwrap();
        let ids: Vec<u32> = all.iter().filter_map(|v| v.downcast_ref::<Widget>()).map(|w| w.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn children_can_be_inserted_and_removed() {
        let hits = Arc::new(AtomicU32::new(0));
        let ping = counting::<Ping>(&hits);
        let composite = CompositeHandler::new();
        composite
            .add_handlers([Delegate::new(Widget { id: 3 })])
            .insert_handlers(0, [ping.clone()]);
        assert_eq!(composite.len(), 2);
        assert!(composite.has_delegate::<Widget>());
        assert!(same_handler(&composite.handlers()[0], &ping));

        composite.remove_handlers(&[ping.clone(), ping]);
        assert_eq!(composite.len(), 1);
        let delegate = composite.handlers()[0].delegate_value().cloned().unwrap();
        composite.remove_delegate(&delegate);
        assert!(composite.is_empty());
    }

    #[test]
    fn children_can_be_removed_by_their_delegate() {
        let composite = CompositeHandler::with_handlers([
            Delegate::new(Widget { id: 4 }),
            Delegate::new(Widget { id: 5 }),
        ]);
        let second = composite.handlers()[1].delegate_value().cloned().unwrap();
        let stand_in: Arc<dyn CallbackHandler> = Handler::with_delegate(Delegate::from_value(second));
        composite.remove_handlers(&[stand_in]);
        assert_eq!(composite.len(), 1);
        let left = composite.resolve_as::<Widget>().unwrap().ready().cloned().flatten();
        assert_eq!(left.map(|w| w.id), Some(4));
    }

    #[test]
    fn delegates_resolve_through_the_composite() {
        let composite = CompositeHandler::with_handlers([Delegate::new(Widget { id: 9 })]);
        let widget = composite.resolve_as::<Widget>().unwrap().ready().cloned().flatten();
        assert_eq!(widget.map(|w| w.id), Some(9));
    }

    #[test]
    fn the_composite_resolves_as_itself() {
        let composite = CompositeHandler::new();
        let found = composite.resolve_as::<CompositeHandler>().unwrap().ready().cloned().flatten();
        assert!(found.is_some_and(|found| Arc::ptr_eq(&found, &composite)));
        let core = composite.resolve(Constraint::of::<Handler>()).unwrap().ready().cloned().flatten();
        assert!(core.is_none());
    }
}
