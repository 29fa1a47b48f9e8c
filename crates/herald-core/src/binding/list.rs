use std::collections::HashMap;
use std::sync::Arc;

use super::constraint::IndexKey;
use super::record::Binding;
use super::variance::Variance;

/// BindingList は (owner, kind) ごとの順序付きバインディング列
///
/// # 並び順
/// - 非 invariant: 新しい束縛がより具体的なら、それにマッチする既存の束縛の前へ
/// - invariant: 同じインデックスの連続グループの末尾へ
/// - インデックスを持たない束縛は末尾へ
///
/// `index` は各キーの最初の位置を指す。変更のたびに作り直す。
#[derive(Default)]
pub struct BindingList {
    entries: Vec<Arc<Binding>>,
    index: HashMap<IndexKey, usize>,
}

impl BindingList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Binding>> {
        self.entries.iter()
    }

    /// An existing binding equal to `binding`, if any.
    pub fn find(&self, binding: &Binding) -> Option<&Arc<Binding>> {
        self.entries.iter().find(|existing| existing.as_ref() == binding)
    }

    pub fn insert(&mut self, binding: Arc<Binding>, variance: Variance) {
        let position = match binding.index() {
            None => self.entries.len(),
            Some(index) if variance == Variance::Invariant => match self.index.get(&index) {
                Some(&start) => start + self.group_len(start, &index),
                None => self.entries.len(),
            },
            Some(index) => {
                let start = self.index.get(&index).copied().unwrap_or(0);
                self.entries[start..]
                    .iter()
                    .position(|existing| precedes(&binding, existing, variance))
                    .map_or(self.entries.len(), |offset| start + offset)
            }
        };
        self.entries.insert(position, binding);
        self.reindex();
    }

    pub fn remove(&mut self, id: u64) -> Option<Arc<Binding>> {
        let position = self.entries.iter().position(|b| b.id() == id)?;
        let removed = self.entries.remove(position);
        self.reindex();
        Some(removed)
    }

    pub fn drain(&mut self) -> Vec<Arc<Binding>> {
        self.index.clear();
        std::mem::take(&mut self.entries)
    }

    /// Snapshot of the bindings a dispatch should scan, in order.
    ///
    /// Invariant scans need an index hit and cover only that key's group;
    /// `None` means the list must not be scanned at all.
    pub fn candidates(&self, index: Option<&IndexKey>, variance: Variance) -> Option<Vec<Arc<Binding>>> {
        if variance == Variance::Invariant {
            let index = index?;
            let start = *self.index.get(index)?;
            let len = self.group_len(start, index);
            return Some(self.entries[start..start + len].to_vec());
        }
        let start = index.and_then(|i| self.index.get(i)).copied().unwrap_or(0);
        Some(self.entries[start..].to_vec())
    }

    fn group_len(&self, start: usize, index: &IndexKey) -> usize {
        self.entries[start..]
            .iter()
            .take_while(|b| b.index().as_ref() == Some(index))
            .count()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (position, binding) in self.entries.iter().enumerate() {
            if let Some(index) = binding.index() {
                self.index.entry(index).or_insert(position);
            }
        }
    }
}

/// `binding` goes before `existing` when `existing` accepts it under the
/// kind's variance without being an exact match.
fn precedes(binding: &Binding, existing: &Binding, variance: Variance) -> bool {
    let candidate = binding.constraint();
    !existing.matches(candidate, Variance::Invariant) && existing.matches(candidate, variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Constraint, HandlerFn};
    use crate::callback::Outcome;
    use crate::types;

    struct Animal;
    struct Dog;
    struct Puppy;

    fn declare() {
        types::class::<Animal>().declare();
        types::class::<Dog>().extends::<Animal>().declare();
        types::class::<Puppy>().extends::<Dog>().declare();
    }

    fn noop() -> HandlerFn {
        Arc::new(|_, _| Ok(Outcome::Void))
    }

    fn binding(constraint: Constraint) -> Arc<Binding> {
        Arc::new(Binding::new(constraint, noop()))
    }

    fn order(list: &BindingList) -> Vec<String> {
        list.iter().map(|b| format!("{:?}", b.constraint())).collect()
    }

    #[test]
    fn contravariant_keeps_most_specific_first_regardless_of_order() {
        declare();
        let mut forward = BindingList::new();
        for c in [Constraint::of::<Animal>(), Constraint::of::<Dog>(), Constraint::of::<Puppy>()] {
            forward.insert(binding(c), Variance::Contravariant);
        }
        let mut backward = BindingList::new();
        for c in [Constraint::of::<Puppy>(), Constraint::of::<Dog>(), Constraint::of::<Animal>()] {
            backward.insert(binding(c), Variance::Contravariant);
        }
        assert_eq!(order(&forward), vec!["Puppy", "Dog", "Animal"]);
        assert_eq!(order(&backward), vec!["Puppy", "Dog", "Animal"]);
    }

    #[test]
    fn unindexed_bindings_append() {
        declare();
        let mut list = BindingList::new();
        list.insert(binding(Constraint::Any), Variance::Contravariant);
        list.insert(binding(Constraint::of::<Dog>()), Variance::Contravariant);
        list.insert(binding(Constraint::predicate(|_, _| true)), Variance::Contravariant);
        assert_eq!(order(&list), vec!["Dog", "*", "fn(..)"]);
    }

    #[test]
    fn invariant_groups_by_index_and_requires_a_hit() {
        let mut list = BindingList::new();
        list.insert(binding(Constraint::name("a")), Variance::Invariant);
        list.insert(binding(Constraint::name("b")), Variance::Invariant);
        list.insert(binding(Constraint::name("A")), Variance::Invariant);

        assert_eq!(order(&list), vec!["\"a\"", "\"A\"", "\"b\""]);
        let key = Constraint::name("a").index();
        let group = list.candidates(key.as_ref(), Variance::Invariant).unwrap();
        assert_eq!(group.len(), 2);
        assert!(list.candidates(None, Variance::Invariant).is_none());
        let missing = Constraint::name("zzz").index();
        assert!(list.candidates(missing.as_ref(), Variance::Invariant).is_none());
    }

    #[test]
    fn remove_reindexes() {
        let mut list = BindingList::new();
        let first = binding(Constraint::name("a"));
        let id = first.id();
        list.insert(first, Variance::Invariant);
        list.insert(binding(Constraint::name("b")), Variance::Invariant);
        assert!(list.remove(id).is_some());
        assert!(list.remove(id).is_none());
        let key = Constraint::name("b").index();
        assert_eq!(list.candidates(key.as_ref(), Variance::Invariant).map(|g| g.len()), Some(1));
    }

    #[test]
    fn equal_bindings_are_found() {
        let handler = noop();
        let mut list = BindingList::new();
        list.insert(
            Arc::new(Binding::new(Constraint::name("a"), handler.clone())),
            Variance::Contravariant,
        );
        let same = Binding::new(Constraint::name("a"), handler);
        let keyed = Binding::new(Constraint::name("a"), noop()).with_key(Some("k".into()));
        assert!(list.find(&same).is_some());
        assert!(list.find(&keyed).is_none());
    }
}
