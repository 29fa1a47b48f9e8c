use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::binding::{Binding, BindingList, IndexKey, Variance};

/// Definitions は 1 つの owner が持つ、binding kind ごとのバインディング表
///
/// ディスパッチ中はリストのスナップショットを走査するため、
/// ハンドラ実行中にロックは保持されない。
#[derive(Default)]
pub struct Definitions {
    tables: RwLock<HashMap<&'static str, BindingList>>,
}

impl Definitions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }

    pub fn len(&self, kind: &str) -> usize {
        self.tables.read().get(kind).map_or(0, BindingList::len)
    }

    /// Snapshot of the bindings registered under `kind`, in dispatch order.
    pub fn bindings(&self, kind: &str) -> Vec<Arc<Binding>> {
        self.tables
            .read()
            .get(kind)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Insert `binding`, or return the existing equal binding.
    pub(crate) fn insert(&self, kind: &'static str, variance: Variance, binding: Binding) -> Arc<Binding> {
        let mut tables = self.tables.write();
        let list = tables.entry(kind).or_default();
        if let Some(existing) = list.find(&binding) {
            return existing.clone();
        }
        let binding = Arc::new(binding);
        list.insert(binding.clone(), variance);
        binding
    }

    pub(crate) fn candidates(
        &self,
        kind: &str,
        index: Option<&IndexKey>,
        variance: Variance,
    ) -> Option<Vec<Arc<Binding>>> {
        self.tables.read().get(kind)?.candidates(index, variance)
    }

    /// Remove one binding; the list goes away with its last binding.
    pub(crate) fn remove_binding(&self, kind: &str, id: u64) -> Option<Arc<Binding>> {
        let mut tables = self.tables.write();
        let list = tables.get_mut(kind)?;
        let removed = list.remove(id);
        if list.is_empty() {
            tables.remove(kind);
        }
        removed
    }

    pub(crate) fn remove_list(&self, kind: &str) -> Vec<Arc<Binding>> {
        self.tables
            .write()
            .remove(kind)
            .map(|mut list| list.drain())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Definitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        let mut map = f.debug_map();
        for (kind, list) in tables.iter() {
            map.entry(kind, &list.len());
        }
        map.finish()
    }
}
