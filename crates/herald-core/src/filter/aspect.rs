use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use super::{Filtered, Proceed};
use crate::callback::{Answer, Eventual, Payload, Promise, Value};
use crate::error::{MediatorError, Result};
use crate::handler::CallbackHandler;
use crate::observability;

/// Gate は before フックの判定
pub enum Gate {
    /// Proceed; the state is handed to the after hook.
    Accept(Option<Value>),
    /// Refuse synchronously with `MediatorError::Rejected`.
    Reject,
    /// Proceed once the future yields `true`, reject on `false`.
    Defer(BoxFuture<'static, bool>),
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gate::Accept(state) => f.debug_tuple("Accept").field(&state.is_some()).finish(),
            Gate::Reject => f.write_str("Reject"),
            Gate::Defer(_) => f.write_str("Defer"),
        }
    }
}

pub type BeforeFn = Arc<dyn Fn(&Payload, &dyn CallbackHandler) -> Result<Gate> + Send + Sync>;
pub type AfterFn = Arc<dyn Fn(&Payload, Option<&Value>) + Send + Sync>;

/// before / after フックで包む
///
/// # 順序
/// - 同期結果: `after` は `handle_callback` が戻る前に必ず 1 回走る
/// - 非同期結果: `after` は結果が確定した後に走る（コールバックの結果を差し替える）
/// - 非同期ゲート: 結果は結果スロット経由の Promise として公開される
pub fn aspect(
    inner: Arc<dyn CallbackHandler>,
    before: Option<BeforeFn>,
    after: Option<AfterFn>,
    reentrant: bool,
) -> Arc<Filtered> {
    Filtered::new(
        inner,
        Arc::new(move |callback, composer, proceed| {
            let gate = match &before {
                Some(before) => before(callback, composer)?,
                None => Gate::Accept(None),
            };
            match gate {
                Gate::Reject => Err(reject(callback)),
                Gate::Accept(state) => accept(callback, proceed, after.clone(), state),
                Gate::Defer(gate) => defer(callback, proceed, after.clone(), gate),
            }
        }),
        reentrant,
    )
}

fn reject(callback: &Payload) -> MediatorError {
    observability::record_rejection();
    debug!(callback = ?callback, "aspect rejected callback");
    MediatorError::Rejected {
        callback: callback.clone(),
    }
}

fn accept(
    callback: &Payload,
    proceed: Proceed<'_>,
    after: Option<AfterFn>,
    state: Option<Value>,
) -> Result<bool> {
    let result = proceed.run();
    let Some(after) = after else {
        return result;
    };
    if result.is_ok()
        && let Some(Eventual::Pending(promise)) = callback.callback_result()
    {
        let target = callback.clone();
        let hook = after.clone();
        let kept = state.clone();
        let settled = promise.finally(move || hook(&target, kept.as_ref()));
        if callback.set_callback_result(Eventual::Pending(settled)) {
            return result;
        }
    }
    after(callback, state.as_ref());
    result
}

fn defer(
    callback: &Payload,
    proceed: Proceed<'_>,
    after: Option<AfterFn>,
    gate: BoxFuture<'static, bool>,
) -> Result<bool> {
    if callback.result_slot().is_none() {
        return Err(MediatorError::MissingResultSlot(callback.clone()));
    }
    let detached = proceed.detach();
    let target = callback.clone();
    let promise = Promise::new(async move {
        if !gate.await {
            return Err(reject(&target));
        }
        target.clear_callback_result();
        let answer = match detached.run() {
            Ok(true) => match target.callback_result() {
                Some(result) => result.settle().await,
                None => Ok(Answer::One(None)),
            },
            Ok(false) => Ok(Answer::One(None)),
            Err(error) => Err(error),
        };
        if let Some(after) = after {
            after(&target, None);
        }
        answer
    });
    callback.set_callback_result(Eventual::Pending(promise));
    Ok(true)
}
