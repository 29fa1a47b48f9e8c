//! Callback - ディスパッチされるペイロードと結果の蓄積
//!
//! # 学習ポイント
//! - `trait Callback: Any` と trait upcasting によるダウンキャスト
//! - 結果は `ResultSlot` にメモ化し、追加のたびに無効化する
//! - 汎用コールバック（Lookup / Resolution / Deferred / Composition /
//!   HandleMethod / ResolveMethod）は組み込みバインディングが処理する

mod accumulator;
mod composition;
mod deferred;
mod lookup;
mod method;
mod outcome;
mod resolution;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

pub use composition::Composition;
pub use deferred::Deferred;
pub use lookup::Lookup;
pub use method::{HandleMethod, MethodKind, ResolveMethod};
pub use outcome::{
    Answer, CallbackResult, Eventual, NotHandled, Outcome, Promise, RejectFn, Value, flatten,
};
pub use resolution::{Resolution, SatisfiesFn};

use crate::types::TypeKey;

/// Callback はハンドラチェーンを流れるペイロード
///
/// 結果を公開したいコールバックは `result_slot` を返す。
/// aspect の非同期ゲートや `$promise` はそこへ結果を書き込む。
pub trait Callback: Any + Send + Sync {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn result_slot(&self) -> Option<&ResultSlot> {
        None
    }

    fn callback_result(&self) -> Option<CallbackResult> {
        self.result_slot().and_then(ResultSlot::get)
    }

    /// Override the exposed result. Returns false when there is no slot.
    fn set_callback_result(&self, result: CallbackResult) -> bool {
        match self.result_slot() {
            Some(slot) => {
                slot.set(result);
                true
            }
            None => false,
        }
    }

    fn clear_callback_result(&self) {
        if let Some(slot) = self.result_slot() {
            slot.clear();
        }
    }
}

pub type Payload = Arc<dyn Callback>;

impl fmt::Debug for dyn Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.type_name();
        f.write_str(name.rsplit("::").next().unwrap_or(name))
    }
}

pub fn payload<C: Callback>(callback: C) -> Payload {
    Arc::new(callback)
}

pub fn downcast<C: Callback>(payload: &Payload) -> Option<&C> {
    let any: &dyn Any = &**payload;
    any.downcast_ref::<C>()
}

pub fn is<C: Callback>(payload: &Payload) -> bool {
    downcast::<C>(payload).is_some()
}

/// Runtime type of the callback (not of the `Arc` around it).
pub fn callback_type(payload: &Payload) -> TypeKey {
    let any: &dyn Any = &**payload;
    TypeKey::from_parts(any.type_id(), payload.type_name())
}

/// ResultSlot はコールバック結果のメモ（または上書き）を保持する
#[derive(Default)]
pub struct ResultSlot(Mutex<Option<CallbackResult>>);

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<CallbackResult> {
        self.0.lock().clone()
    }

    pub fn set(&self, result: CallbackResult) {
        *self.0.lock() = Some(result);
    }

    pub fn clear(&self) {
        self.0.lock().take();
    }

    /// Return the memo, computing and storing it first if absent.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> CallbackResult) -> CallbackResult {
        let mut memo = self.0.lock();
        memo.get_or_insert_with(compute).clone()
    }
}

impl fmt::Debug for ResultSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResultSlot").field(&self.0.lock().is_some()).finish()
    }
}
