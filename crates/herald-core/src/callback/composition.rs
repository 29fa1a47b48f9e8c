use std::fmt;

use super::{Callback, CallbackResult, Payload, ResultSlot, downcast};
use crate::invocation::InvocationSemantics;

/// Composition は「すでに一度標準ディスパッチを通った」ことを示す透過ラッパー
///
/// composer 経由の入れ子呼び出しはこれで包まれ、フィルタの二重適用と
/// 汎用コールバックの無限再帰を防ぐ。
pub struct Composition {
    callback: Option<Payload>,
}

impl Composition {
    pub fn new(callback: Payload) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn empty() -> Self {
        Self { callback: None }
    }

    pub fn callback(&self) -> Option<&Payload> {
        self.callback.as_ref()
    }

    /// `payload` is a composition wrapping a `C`.
    pub fn is_composed<C: Callback>(payload: &Payload) -> bool {
        downcast::<Composition>(payload)
            .and_then(Composition::callback)
            .is_some_and(|inner| downcast::<C>(inner).is_some())
    }

    /// Compositions and their subtypes (`InvocationSemantics`).
    pub fn is_composition(payload: &Payload) -> bool {
        downcast::<Composition>(payload).is_some() || downcast::<InvocationSemantics>(payload).is_some()
    }
}

impl Callback for Composition {
    fn result_slot(&self) -> Option<&ResultSlot> {
        self.callback.as_ref().and_then(|inner| inner.result_slot())
    }

    fn callback_result(&self) -> Option<CallbackResult> {
        self.callback.as_ref().and_then(|inner| inner.callback_result())
    }

    fn set_callback_result(&self, result: CallbackResult) -> bool {
        self.callback
            .as_ref()
            .is_some_and(|inner| inner.set_callback_result(result))
    }
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Composition").field(&self.callback).finish()
    }
}
