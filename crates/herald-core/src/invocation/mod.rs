//! Invocation - プロトコルのメソッド呼び出しとそのセマンティクス
//!
//! # 学習ポイント
//! - bitflags による呼び出しオプション
//! - 「明示指定済み」集合を別に持つことで、外側はデフォルト・内側が優先
//! - セマンティクスはハンドラチェーンへの greedy な問い合わせで集める

mod call_options;
mod delegate;
mod options;
mod semantics;

pub use call_options::CallOptions;
pub use delegate::InvocationDelegate;
pub use options::InvocationOptions;
pub use semantics::InvocationSemantics;
