//! herald-core
//!
//! Variance-aware callback mediator: handlers register bindings per kind
//! ("handle" / "provide" / "lookup"), and callbacks are dispatched to the
//! most specific matching binding.
//!
//! # モジュール構成
//! - **types**: 型システム（クラス・プロトコル宣言、分類、メンバー表、Expando）
//! - **binding**: variance、制約、バインディング、インデックス付きリスト
//! - **registry**: binding kind とディスパッチアルゴリズム、owner ごとの定義表
//! - **callback**: 結果チャネル（Outcome / Eventual）と汎用コールバック
//! - **handler**: Handler、Cascade / Composite、ポリシー、ビルダー、デコレータ
//! - **filter**: filter / aspect / guard / activity / promised / timeout
//! - **batch**: Batcher と dispose 時の一括 complete
//! - **invocation**: 呼び出しオプション、セマンティクス、InvocationDelegate
//! - **config** / **observability** / **error**
//!
//! # 使用例
//! ```ignore
//! let handler = HandlerBuilder::new()
//!     .provide::<Widget, _>(|_| Ok(Widget { id: 1 }))?
//!     .build()?;
//! let widget = handler.resolve_as::<Widget>()?.settle().await?;
//! ```

pub mod batch;
pub mod binding;
pub mod callback;
pub mod config;
pub mod error;
pub mod filter;
pub mod handler;
pub mod invocation;
pub mod observability;
pub mod registry;
pub mod types;

pub use binding::{Constraint, Context, Variance};
pub use callback::{
    Answer, Callback, CallbackResult, Eventual, Outcome, Payload, Promise, Value, payload,
};
pub use config::MediatorConfig;
pub use error::{MediatorError, Result};
pub use handler::{
    CallbackHandler, CascadeHandler, CompositeHandler, Delegate, Handler, HandlerBuilder,
    HandlerDecorators, HandlerExt,
};
pub use invocation::{InvocationDelegate, InvocationOptions};
pub use registry::{Definition, HANDLE, LOOKUP, PROVIDE};
