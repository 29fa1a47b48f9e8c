//! TypeSystem - 型の分類・継承・プロトコル適合
//!
//! # 学習ポイント
//! - `LazyLock` によるプロセス全体のレジストリ
//! - `TypeId` をキーにした型消去
//! - 継承チェーンの走査（循環宣言にも耐える）

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::debug;

use super::expando::Expando;
use super::key::TypeKey;
use super::member::Member;
use crate::callback::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Protocol,
}

#[derive(Clone)]
pub struct TypeInfo {
    key: TypeKey,
    kind: TypeKind,
    base: Option<TypeKey>,
    protocols: Vec<TypeKey>,
    members: HashMap<String, Member>,
}

impl TypeInfo {
    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn base(&self) -> Option<TypeKey> {
        self.base
    }

    pub fn protocols(&self) -> &[TypeKey] {
        &self.protocols
    }
}

static TYPES: LazyLock<RwLock<HashMap<TypeId, TypeInfo>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// TypeDecl は型宣言のビルダー
///
/// # 使用例
/// ```ignore
/// types::protocol::<Walker>().declare();
/// types::class::<Dog>()
///     .extends::<Animal>()
///     .implements::<Walker>()
///     .method("walk", |dog: &Dog, _args, _composer| Ok(Outcome::Void))
///     .declare();
/// ```
pub struct TypeDecl<T> {
    info: TypeInfo,
    _marker: PhantomData<fn() -> T>,
}

pub fn class<T: Any + Send + Sync>() -> TypeDecl<T> {
    TypeDecl::new(TypeKind::Class)
}

pub fn protocol<T: Any + Send + Sync>() -> TypeDecl<T> {
    TypeDecl::new(TypeKind::Protocol)
}

impl<T: Any + Send + Sync> TypeDecl<T> {
    fn new(kind: TypeKind) -> Self {
        Self {
            info: TypeInfo {
                key: TypeKey::of::<T>(),
                kind,
                base: None,
                protocols: Vec::new(),
                members: HashMap::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Class: set the base class. Protocol: extend another protocol.
    pub fn extends<B: Any>(mut self) -> Self {
        match self.info.kind {
            TypeKind::Class => self.info.base = Some(TypeKey::of::<B>()),
            TypeKind::Protocol => self.info.protocols.push(TypeKey::of::<B>()),
        }
        self
    }

    pub fn implements<P: Any>(mut self) -> Self {
        self.info.protocols.push(TypeKey::of::<P>());
        self
    }

    pub fn member(mut self, name: impl Into<String>, member: Member) -> Self {
        self.info.members.insert(name.into(), member);
        self
    }

    pub fn method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T, &[Value], &dyn crate::handler::CallbackHandler) -> crate::Result<crate::Outcome>
            + Send
            + Sync
            + 'static,
    {
        self.member(name, Member::typed_method::<T, F>(f))
    }

    pub fn getter<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> crate::Result<crate::Outcome> + Send + Sync + 'static,
    {
        self.member(name, Member::typed_getter::<T, F>(f))
    }

    /// Register (or replace) the declaration.
    pub fn declare(self) -> TypeKey {
        let key = self.info.key;
        debug!(ty = %key, kind = ?self.info.kind, "type declared");
        TYPES.write().insert(key.id(), self.info);
        key
    }
}

pub fn info(key: TypeKey) -> Option<TypeInfo> {
    TYPES.read().get(&key.id()).cloned()
}

/// Classify an arbitrary value. Undeclared types classify as anonymous classes.
pub fn classify(value: &dyn Any) -> TypeKey {
    let id = value.type_id();
    TYPES
        .read()
        .get(&id)
        .map(|info| info.key)
        .unwrap_or_else(|| TypeKey::from_parts(id, "<undeclared>"))
}

/// `Value` は `Arc<dyn Any>` なので、Arc 自身ではなく中身を分類する
pub fn classify_value(value: &Value) -> TypeKey {
    if let Some(expando) = value.downcast_ref::<Expando>() {
        return expando.type_key();
    }
    classify(&**value)
}

pub fn is_protocol(key: TypeKey) -> bool {
    TYPES
        .read()
        .get(&key.id())
        .is_some_and(|info| info.kind == TypeKind::Protocol)
}

pub fn is_class(key: TypeKey) -> bool {
    !is_protocol(key)
}

/// True when `sub` is `sup` or inherits from it.
pub fn is_subclass_of(sub: TypeKey, sup: TypeKey) -> bool {
    let types = TYPES.read();
    let mut seen = HashSet::new();
    let mut current = Some(sub);
    while let Some(key) = current {
        if key == sup {
            return true;
        }
        if !seen.insert(key) {
            return false;
        }
        current = types.get(&key.id()).and_then(|info| info.base);
    }
    false
}

/// True when `ty` is `protocol`, adopts it, extends it, or inherits it from a base.
pub fn conforms_to(ty: TypeKey, protocol: TypeKey) -> bool {
    let types = TYPES.read();
    conforms(&types, ty, protocol)
}

fn conforms(types: &HashMap<TypeId, TypeInfo>, ty: TypeKey, protocol: TypeKey) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![ty];
    while let Some(key) = stack.pop() {
        if key == protocol {
            return true;
        }
        if !seen.insert(key) {
            continue;
        }
        if let Some(info) = types.get(&key.id()) {
            stack.extend(info.protocols.iter().copied());
            stack.extend(info.base);
        }
    }
    false
}

/// Protocol conformance of a value, honoring protocols adopted by `Expando`s.
pub fn value_conforms_to(value: &Value, protocol: TypeKey) -> bool {
    if let Some(expando) = value.downcast_ref::<Expando>()
        && expando.adopts(protocol)
    {
        return true;
    }
    conforms_to(classify_value(value), protocol)
}

/// Member lookup walks the base chain from the most derived type.
pub fn member(key: TypeKey, name: &str) -> Option<Member> {
    let types = TYPES.read();
    let mut seen = HashSet::new();
    let mut current = Some(key);
    while let Some(key) = current {
        if !seen.insert(key) {
            return None;
        }
        let info = types.get(&key.id())?;
        if let Some(member) = info.members.get(name) {
            return Some(member.clone());
        }
        current = info.base;
    }
    None
}

pub fn member_of(value: &Value, name: &str) -> Option<Member> {
    if let Some(expando) = value.downcast_ref::<Expando>() {
        return expando.member(name);
    }
    member(classify_value(value), name)
}
