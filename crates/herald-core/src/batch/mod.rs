//! Batch - 呼び出しをバッファし、dispose 時にまとめて complete する
//!
//! # 学習ポイント
//! - `Batching` は能力（capability）trait。`CallbackHandler::as_batching` で発見する
//! - Batcher は "provide" で自身を公開し、入れ子のコードから取得できる
//! - dispose は一度だけ complete を呼び、保留中の結果をすべて待つ

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::binding::Constraint;
use crate::callback::{Answer, Eventual, Outcome, Payload, Promise, Value, flatten};
use crate::error::Result;
use crate::handler::{CallbackHandler, CompositeHandler, Handler, ToHandler};
use crate::registry::{Definition, PROVIDE};
use crate::types::{self, TypeKey};

/// Batching は バッファした作業を完了できるもの
pub trait Batching: Send + Sync {
    fn complete(&self, composer: &dyn CallbackHandler) -> Result<Eventual<Answer>>;
}

/// Batcher はバッチ処理に参加する子ハンドラの集合
pub struct Batcher {
    children: CompositeHandler,
    protocols: Vec<TypeKey>,
}

impl Batcher {
    /// An empty protocol list batches everything.
    pub fn new(protocols: Vec<TypeKey>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<Self>| Self {
            children: CompositeHandler::owned_by(this.clone()),
            protocols,
        })
    }

    pub fn should_batch(&self, protocol: TypeKey) -> bool {
        self.protocols.is_empty()
            || self
                .protocols
                .iter()
                .any(|batched| *batched == protocol || types::conforms_to(protocol, *batched))
    }

    pub fn children(&self) -> &CompositeHandler {
        &self.children
    }

    pub fn add_handlers<H: ToHandler>(&self, handlers: impl IntoIterator<Item = H>) -> &Self {
        self.children.add_handlers(handlers);
        self
    }
}

impl Batching for Batcher {
    /// Complete every batching child once, flattening their answers.
    fn complete(&self, composer: &dyn CallbackHandler) -> Result<Eventual<Answer>> {
        let mut parts = Vec::new();
        for child in self.children.handlers() {
            if let Some(batching) = child.as_batching() {
                parts.push(batching.complete(composer)?);
            }
        }
        debug!(children = parts.len(), "batch completed");
        Eventual::join_all(parts).map(|answers| {
            Ok(Answer::Many(flatten(answers.into_iter().flat_map(Answer::many))))
        })
    }
}

impl CallbackHandler for Batcher {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        self.children.handle_callback(callback, greedy, composer)
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        Some(self)
    }

    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.children.shared()
    }
}

impl fmt::Debug for Batcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batcher")
            .field("children", &self.children.len())
            .field("protocols", &self.protocols)
            .finish()
    }
}

#[derive(Default)]
struct BatchState {
    batcher: Option<Arc<Batcher>>,
    pending: Vec<Promise<Answer>>,
}

/// Batched は Batcher を内蔵したハンドラ
///
/// # ディスパッチ
/// 1. Batcher 自身の "provide"
/// 2. 非 greedy なら Batcher の子（処理されたら保留結果を記録）
/// 3. 包まれたハンドラ
pub struct Batched {
    inner: Arc<dyn CallbackHandler>,
    provider: Arc<Handler>,
    state: Arc<Mutex<BatchState>>,
}

impl Batched {
    pub fn new(inner: Arc<dyn CallbackHandler>, protocols: Vec<TypeKey>) -> Result<Arc<Self>> {
        let state = Arc::new(Mutex::new(BatchState {
            batcher: Some(Batcher::new(protocols)),
            pending: Vec::new(),
        }));
        let batched = Arc::new_cyclic(|this: &Weak<Self>| Self {
            inner,
            provider: Handler::owned_by(this.clone()),
            state: state.clone(),
        });
        let current = state;
        let _ = batched.provider.define(
            &PROVIDE,
            Definition::new()
                .constraint(Constraint::of::<Batcher>())
                .handler(move |_, _| {
                    Ok(match &current.lock().batcher {
                        Some(batcher) => Outcome::shared(batcher.clone() as Value),
                        None => Outcome::unhandled(),
                    })
                }),
        )?;
        Ok(batched)
    }

    /// The active batcher, until `dispose` is called.
    pub fn batcher(&self) -> Option<Arc<Batcher>> {
        self.state.lock().batcher.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().batcher.is_none()
    }

    /// Stop batching and complete the batch.
    ///
    /// The answer settles once every buffered asynchronous result and every
    /// child completion has settled. Disposing twice yields an empty answer.
    pub fn dispose(&self) -> Result<Eventual<Answer>> {
        let (batcher, pending) = {
            let mut state = self.state.lock();
            (state.batcher.take(), std::mem::take(&mut state.pending))
        };
        let Some(batcher) = batcher else {
            return Ok(Eventual::Ready(Answer::Many(Vec::new())));
        };
        let completed = batcher.complete(self)?;
        debug!(pending = pending.len(), "batch disposed");
        if pending.is_empty() {
            return Ok(completed);
        }
        let buffered = Promise::all(pending);
        Ok(Eventual::Pending(Promise::new(async move {
            buffered.await?;
            completed.settle().await
        })))
    }
}

impl CallbackHandler for Batched {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        if self.provider.handle_callback(callback, greedy, composer)? && !greedy {
            return Ok(true);
        }
        if !greedy
            && let Some(batcher) = self.batcher()
            && batcher.handle_callback(callback, false, composer)?
        {
            if let Some(Eventual::Pending(promise)) = callback.callback_result() {
                self.state.lock().pending.push(promise);
            }
            return Ok(true);
        }
        self.inner.handle_callback(callback, greedy, composer)
    }

    fn delegate_value(&self) -> Option<&Value> {
        self.inner.delegate_value()
    }

    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        self.provider.shared()
    }
}

impl fmt::Debug for Batched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batched")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
