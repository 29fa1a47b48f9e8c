//! HandlerBuilder - 宣言的なバインディング登録
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - アノテーションの代わりに一度きりの登録呼び出しを使う

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::base::{Delegate, Handler};
use crate::binding::{Constraint, Context};
use crate::callback::{Callback, Outcome, Payload, downcast};
use crate::error::{MediatorError, Result};
use crate::registry::{Definition, Definitions, HANDLE, Kind, LOOKUP, PROVIDE};

/// HandlerBuilder は Handler を構築する
///
/// # 使用例
/// ```ignore
/// let handler = HandlerBuilder::new()
///     .handle::<CreateWidget, _>(|cmd, _| { store(cmd); Ok(Outcome::Void) })?
///     .provide::<Widget, _>(|_| Ok(Widget { id: 1 }))?
///     .expect_callbacks(&["CreateWidget", "Widget"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_callbacks() で期待される制約名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば MediatorError::MissingBindings を返す
pub struct HandlerBuilder {
    delegate: Option<Delegate>,
    definitions: Arc<Definitions>,
    registered: BTreeSet<String>,
    expected: Option<Vec<String>>,
}

impl Default for HandlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerBuilder {
    pub fn new() -> Self {
        Self {
            delegate: None,
            definitions: Definitions::new(),
            registered: BTreeSet::new(),
            expected: None,
        }
    }

    pub fn delegate(mut self, delegate: Delegate) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Typed "handle" binding for callbacks of exactly type `C`.
    ///
    /// Subtypes of `C` still match the binding but cannot be downcast to `C`;
    /// use [`handle_when`](Self::handle_when) to receive them.
    pub fn handle<C, F>(self, handler: F) -> Result<Self>
    where
        C: Callback,
        F: Fn(&C, &Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        self.handle_when(Constraint::of::<C>(), move |callback, ctx| {
            match downcast::<C>(callback) {
                Some(callback) => handler(callback, ctx),
                None => Ok(Outcome::unhandled()),
            }
        })
    }

    pub fn handle_when<F>(self, constraint: impl Into<Constraint>, handler: F) -> Result<Self>
    where
        F: Fn(&Payload, &Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        self.define(&HANDLE, Definition::new().constraint(constraint).handler(handler))
    }

    /// Typed "provide" binding producing a `T`.
    pub fn provide<T, F>(self, provider: F) -> Result<Self>
    where
        T: Any + Send + Sync,
        F: Fn(&Context<'_>) -> Result<T> + Send + Sync + 'static,
    {
        self.provide_when(Constraint::of::<T>(), move |_, ctx| {
            provider(ctx).map(Outcome::value)
        })
    }

    pub fn provide_when<F>(self, constraint: impl Into<Constraint>, provider: F) -> Result<Self>
    where
        F: Fn(&Payload, &Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        self.define(&PROVIDE, Definition::new().constraint(constraint).handler(provider))
    }

    /// "lookup" binding returning a constant.
    pub fn lookup(self, key: impl Into<Constraint>, value: Outcome) -> Result<Self> {
        self.define(&LOOKUP, Definition::new().constraint(key).returns(value))
    }

    pub fn define(mut self, kind: &Kind, definition: Definition) -> Result<Self> {
        let unregister = kind.define(&self.definitions, definition)?;
        debug!(kind = kind.key(), bindings = unregister.ids().len(), "builder binding");
        let names = self.names(kind);
        self.registered.extend(names);
        Ok(self)
    }

    /// 期待される制約名（型の短縮名またはキー文字列）のリストを設定
    pub fn expect_callbacks(mut self, names: &[&str]) -> Self {
        self.expected = Some(names.iter().map(|name| name.to_string()).collect());
        self
    }

    /// # 検証
    /// - expect_callbacks() で設定された名前が全て登録されているかチェック
    /// - 不足があれば MediatorError::MissingBindings を返す
    pub fn build(self) -> Result<Arc<Handler>> {
        if let Some(expected) = &self.expected {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.registered.contains(*name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(MediatorError::MissingBindings(missing));
            }
        }
        Ok(Handler::build(self.delegate, self.definitions))
    }

    fn names(&self, kind: &Kind) -> Vec<String> {
        self.definitions
            .bindings(kind.key())
            .iter()
            .filter_map(|binding| match binding.constraint() {
                Constraint::Type(key) | Constraint::Protocol(key) => Some(key.short_name().to_string()),
                Constraint::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}
