//! Binding - 分散（variance）と制約マッチング
//!
//! # 学習ポイント
//! - 3 種類の variance がマッチ・並び順・「処理済み」判定を決める
//! - 制約はタグ付き enum、マッチは単一の自由関数
//! - `BindingList` はインデックス付きの順序付き列

mod constraint;
mod list;
mod record;
mod variance;

pub use constraint::{Constraint, IndexKey, PredicateFn, exact, matches};
pub use list::BindingList;
pub use record::{Binding, Context, HandlerFn, RemovedFn};
pub use variance::Variance;
