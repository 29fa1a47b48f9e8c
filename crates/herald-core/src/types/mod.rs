//! Types - 型システム（分類・継承・プロトコル適合・メンバー表）
//!
//! ディスパッチエンジンが必要とする型情報はすべてここを経由する。
//! Rust の型そのものは `TypeId` で識別し、継承関係とプロトコル適合は
//! `class::<T>()` / `protocol::<T>()` で明示的に宣言する。

mod expando;
mod key;
mod member;
mod registry;

pub use expando::Expando;
pub use key::{TypeKey, assign_stable_id};
pub use member::{GetterFn, Member, MethodFn, SetterFn};
pub use registry::{
    TypeDecl, TypeInfo, TypeKind, class, classify, classify_value, conforms_to, info, is_class,
    is_protocol, is_subclass_of, member, member_of, protocol, value_conforms_to,
};

/// Marker protocol: protocols extending it are invoked through `ResolveMethod`.
pub struct Resolving;

pub(crate) fn declare_builtin() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        protocol::<Resolving>().declare();
    });
}
