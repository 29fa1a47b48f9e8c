use std::sync::Arc;

use crate::batch::Batching;
use crate::callback::{Composition, Payload, Value, payload};
use crate::error::Result;

use super::CallbackHandler;

/// CompositionScope は composer として渡される薄いラッパー
///
/// 入れ子の呼び出しで流れてくるコールバックを `Composition` で包んでから
/// 元のハンドラへ渡す。すでに Composition ならそのまま渡す。
pub struct CompositionScope<'a> {
    handler: &'a dyn CallbackHandler,
}

impl<'a> CompositionScope<'a> {
    pub fn new(handler: &'a dyn CallbackHandler) -> Self {
        Self { handler }
    }
}

impl CallbackHandler for CompositionScope<'_> {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        if Composition::is_composition(callback) {
            return self.handler.handle_callback(callback, greedy, composer);
        }
        let composed = payload(Composition::new(callback.clone()));
        self.handler.handle_callback(&composed, greedy, composer)
    }

    fn delegate_value(&self) -> Option<&Value> {
        self.handler.delegate_value()
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        self.handler.as_batching()
    }

    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.handler.shared()
    }
}
