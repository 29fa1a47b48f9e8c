use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use super::key::TypeKey;
use super::member::Member;
use crate::callback::Value;

/// Expando は実行時にプロパティとメンバーを後付けできるオブジェクト
///
/// `implementing` の使い捨てターゲットや、`$guard` / `$activity` が
/// フラグやカウンタを書き込む対象として使う。
#[derive(Default)]
pub struct Expando {
    properties: Mutex<HashMap<String, Value>>,
    members: RwLock<HashMap<String, Member>>,
    protocols: RwLock<Vec<TypeKey>>,
}

impl Expando {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_key(&self) -> TypeKey {
        TypeKey::of::<Expando>()
    }

    /// Declare that this object conforms to `protocol`.
    pub fn adopt(&self, protocol: TypeKey) {
        let mut protocols = self.protocols.write();
        if !protocols.contains(&protocol) {
            protocols.push(protocol);
        }
    }

    pub fn adopts(&self, protocol: TypeKey) -> bool {
        self.protocols
            .read()
            .iter()
            .any(|adopted| super::conforms_to(*adopted, protocol))
    }

    pub fn define_member(&self, name: impl Into<String>, member: Member) {
        self.members.write().insert(name.into(), member);
    }

    pub fn member(&self, name: &str) -> Option<Member> {
        self.members.read().get(name).cloned()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.properties.lock().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.properties.lock().insert(name.into(), value)
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.properties.lock().remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.properties.lock().contains_key(name)
    }

    /// Run `f` with the property table locked, for read-modify-write updates.
    pub fn with_properties<R>(&self, f: impl FnOnce(&mut HashMap<String, Value>) -> R) -> R {
        f(&mut self.properties.lock())
    }
}
