//! Handler - メディエーターの入口とハンドラ合成
//!
//! # 学習ポイント
//! - object-safe な `CallbackHandler` と、ジェネリックな便利メソッドを持つ
//!   拡張 trait `HandlerExt` の分離（DynHandler と同じ型消去パターン）
//! - composer は明示的な引数として呼び出し全体に渡される
//! - 組み込みバインディングが汎用コールバックを各処理へ振り分ける

mod base;
pub(crate) mod builtin;
mod builder;
mod cascade;
mod composite;
mod decorators;
mod policy;
mod scope;

use std::any::Any;
use std::sync::Arc;

pub use builder::HandlerBuilder;
pub use cascade::CascadeHandler;
pub use composite::{CompositeHandler, ToHandler, same_handler};
pub use base::{Delegate, Handler};
pub use decorators::HandlerDecorators;
pub use policy::{Policy, register_policy, with_policy};
pub use scope::CompositionScope;

use crate::batch::Batching;
use crate::binding::Constraint;
use crate::callback::{
    Answer, CallbackResult, Deferred, Eventual, Lookup, Payload, Resolution, Value,
};
use crate::error::Result;

/// CallbackHandler はコールバックを処理できるもの
///
/// # Object Safety
/// - ジェネリックメソッドを持たない
/// - `Arc<dyn CallbackHandler>` として合成・装飾できる
pub trait CallbackHandler: Send + Sync {
    /// Low-level entry: returns whether anything handled `callback`.
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool>;

    /// The wrapped domain object, if any.
    fn delegate_value(&self) -> Option<&Value> {
        None
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        None
    }

    /// An owned handle on this handler, when it keeps one.
    ///
    /// Continuations that outlive the current call compose through it.
    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        None
    }
}

/// HandlerExt は呼び出し側の便利 API
///
/// # 使用例
/// ```ignore
/// let widget = handler.resolve_as::<Widget>()?.settle().await?;
/// let all = handler.resolve_all(Constraint::of::<Widget>())?;
/// handler.handle(&payload(CreateWidget { id: 1 }), false)?;
/// ```
pub trait HandlerExt: CallbackHandler {
    fn as_dyn(&self) -> &dyn CallbackHandler;

    /// Dispatch with a fresh composition scope over this handler as composer.
    fn handle(&self, callback: &Payload, greedy: bool) -> Result<bool> {
        let scope = CompositionScope::new(self.as_dyn());
        self.handle_callback(callback, greedy, &scope)
    }

    fn handle_with(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        self.handle_callback(callback, greedy, composer)
    }

    fn resolve(&self, key: impl Into<Constraint>) -> Result<Eventual<Option<Value>>> {
        let callback: Payload = Arc::new(Resolution::new(key, false));
        if !self.handle(&callback, false)? {
            return Ok(Eventual::Ready(None));
        }
        answer(&callback).map(|answer| Ok(answer.one()))
    }

    fn resolve_all(&self, key: impl Into<Constraint>) -> Result<Eventual<Vec<Value>>> {
        let callback: Payload = Arc::new(Resolution::new(key, true));
        if !self.handle(&callback, true)? {
            return Ok(Eventual::Ready(Vec::new()));
        }
        answer(&callback).map(|answer| Ok(answer.many()))
    }

    fn resolve_as<T: Any + Send + Sync>(&self) -> Result<Eventual<Option<Arc<T>>>> {
        self.resolve(Constraint::of::<T>())?
            .map(|value| Ok(value.and_then(|v| v.downcast::<T>().ok())))
    }

    fn lookup(&self, key: impl Into<Constraint>) -> Result<Eventual<Option<Value>>> {
        let callback: Payload = Arc::new(Lookup::new(key, false));
        if !self.handle(&callback, false)? {
            return Ok(Eventual::Ready(None));
        }
        answer(&callback).map(|answer| Ok(answer.one()))
    }

    fn lookup_all(&self, key: impl Into<Constraint>) -> Result<Eventual<Vec<Value>>> {
        let callback: Payload = Arc::new(Lookup::new(key, true));
        if !self.handle(&callback, true)? {
            return Ok(Eventual::Ready(Vec::new()));
        }
        answer(&callback).map(|answer| Ok(answer.many()))
    }

    /// Handle `callback`, settling once every asynchronous result has settled.
    fn defer(&self, callback: Payload) -> Result<Eventual<bool>> {
        self.defer_with(callback, false)
    }

    fn defer_all(&self, callback: Payload) -> Result<Eventual<bool>> {
        self.defer_with(callback, true)
    }

    fn defer_with(&self, callback: Payload, many: bool) -> Result<Eventual<bool>> {
        let deferred: Payload = Arc::new(Deferred::new(callback, many));
        if !self.handle(&deferred, many)? {
            return Ok(Eventual::Ready(false));
        }
        answer(&deferred).map(|_| Ok(true))
    }
}

impl<T: CallbackHandler> HandlerExt for T {
    fn as_dyn(&self) -> &dyn CallbackHandler {
        self
    }
}

impl<'a> HandlerExt for dyn CallbackHandler + 'a {
    fn as_dyn(&self) -> &dyn CallbackHandler {
        self
    }
}

fn answer(callback: &Payload) -> CallbackResult {
    callback
        .callback_result()
        .unwrap_or(Eventual::Ready(Answer::One(None)))
}
