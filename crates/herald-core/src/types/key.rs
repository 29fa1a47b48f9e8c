use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// TypeKey は実行時の型を識別する
///
/// 等価性とハッシュは `TypeId` のみで決まる。`name` は表示用。
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: Any + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub(crate) fn from_parts(id: TypeId, name: &'static str) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `herald_core::callback::Lookup` -> `Lookup`
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

static NEXT_STABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique id for things that have no `TypeId` of their own
/// (bindings, handler closures).
pub fn assign_stable_id() -> u64 {
    NEXT_STABLE_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    #[test]
    fn keys_compare_by_type_id() {
        assert_eq!(TypeKey::of::<Widget>(), TypeKey::of::<Widget>());
        assert_ne!(TypeKey::of::<Widget>(), TypeKey::of::<String>());
    }

    #[test]
    fn short_name_strips_module_path() {
        assert_eq!(TypeKey::of::<Widget>().short_name(), "Widget");
        assert_eq!(TypeKey::of::<Vec<String>>().short_name(), "Vec");
    }

    #[test]
    fn stable_ids_are_unique() {
        let a = assign_stable_id();
        let b = assign_stable_id();
        assert_ne!(a, b);
    }
}
