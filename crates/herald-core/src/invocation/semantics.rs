use std::fmt;

use parking_lot::Mutex;

use super::options::InvocationOptions;
use crate::callback::{Callback, Payload, downcast};
use crate::handler::Policy;

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    options: InvocationOptions,
    specified: InvocationOptions,
}

/// InvocationSemantics は呼び出しオプションの問い合わせ兼ポリシー
///
/// 明示的に指定されたオプションを別に記録するため、外側のスコープからの
/// マージは内側が未指定のオプションだけを埋める。
/// Composition の一種として扱われ、フィルタは適用されない。
#[derive(Default)]
pub struct InvocationSemantics {
    flags: Mutex<Flags>,
}

impl InvocationSemantics {
    pub fn new(options: InvocationOptions) -> Self {
        Self {
            flags: Mutex::new(Flags {
                options,
                specified: options,
            }),
        }
    }

    pub fn options(&self) -> InvocationOptions {
        self.flags.lock().options
    }

    /// True when every bit of `option` is set.
    pub fn get_option(&self, option: InvocationOptions) -> bool {
        self.flags.lock().options.contains(option)
    }

    pub fn set_option(&self, option: InvocationOptions, enabled: bool) {
        let mut flags = self.flags.lock();
        flags.options.set(option, enabled);
        flags.specified.insert(option);
    }

    pub fn is_specified(&self, option: InvocationOptions) -> bool {
        self.flags.lock().specified.contains(option)
    }

    /// Copy the options `target` has not specified itself.
    pub fn merge(&self, target: &InvocationSemantics) {
        if std::ptr::eq(self, target) {
            return;
        }
        let source = *self.flags.lock();
        let mut flags = target.flags.lock();
        for option in InvocationOptions::SINGLE {
            if source.specified.contains(option) && !flags.specified.contains(option) {
                flags.options.set(option, source.options.contains(option));
                flags.specified.insert(option);
            }
        }
    }
}

impl Callback for InvocationSemantics {}

impl Policy for InvocationSemantics {
    fn merge_into(&self, target: &Payload) -> bool {
        match downcast::<InvocationSemantics>(target) {
            Some(target) => {
                self.merge(target);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for InvocationSemantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = *self.flags.lock();
        f.debug_struct("InvocationSemantics")
            .field("options", &flags.options)
            .field("specified", &flags.specified)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::fills_unspecified(InvocationOptions::BROADCAST, InvocationOptions::empty(), true)]
    #[case::inner_wins(InvocationOptions::BROADCAST, InvocationOptions::BROADCAST, false)]
    fn merge_respects_inner_choices(
        #[case] outer: InvocationOptions,
        #[case] inner_specified: InvocationOptions,
        #[case] broadcast: bool,
    ) {
        let outer = InvocationSemantics::new(outer);
        let inner = InvocationSemantics::default();
        if !inner_specified.is_empty() {
            inner.set_option(inner_specified, false);
        }
        outer.merge(&inner);
        assert_eq!(inner.get_option(InvocationOptions::BROADCAST), broadcast);
        assert!(inner.is_specified(InvocationOptions::BROADCAST));
    }

    #[test]
    fn notify_is_broadcast_and_best_effort() {
        let semantics = InvocationSemantics::new(InvocationOptions::NOTIFY);
        assert!(semantics.get_option(InvocationOptions::BROADCAST));
        assert!(semantics.get_option(InvocationOptions::BEST_EFFORT));
        assert!(!semantics.get_option(InvocationOptions::STRICT));
        assert!(semantics.get_option(InvocationOptions::NOTIFY));
    }

    #[test]
    fn merging_into_itself_is_a_no_op() {
        let semantics = InvocationSemantics::new(InvocationOptions::STRICT);
        semantics.merge(&semantics);
        assert_eq!(semantics.options(), InvocationOptions::STRICT);
    }
}
