//! Policy - 外側のスコープからコールバックへ設定をマージする
//!
//! # 学習ポイント
//! - プロパティ名 → ポリシー型 のグローバル登録表（二重登録はエラー）
//! - ポリシーは "handle" バインディングとして CascadeHandler の前段に置かれる

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::debug;

use super::base::Handler;
use super::cascade::CascadeHandler;
use super::CallbackHandler;
use crate::binding::Constraint;
use crate::callback::{Callback, Outcome, Payload, callback_type};
use crate::error::{MediatorError, Result};
use crate::registry::{Definition, HANDLE};
use crate::types::TypeKey;

/// Policy は流れてくる同型のコールバックへ自分の設定をマージできる
pub trait Policy: Callback {
    /// Merge into `target`. Returns false when `target` is not applicable.
    fn merge_into(&self, target: &Payload) -> bool;
}

static POLICIES: LazyLock<RwLock<HashMap<String, TypeKey>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Register `P` under the decorator property `name`.
pub fn register_policy<P: Policy>(name: &str) -> Result<()> {
    let mut policies = POLICIES.write();
    if policies.contains_key(name) {
        return Err(MediatorError::DuplicatePolicy(name.to_string()));
    }
    let key = TypeKey::of::<P>();
    policies.insert(name.to_string(), key);
    debug!(policy = name, kind = %key, "policy registered");
    Ok(())
}

/// Decorate `handler` so that callbacks of the policy's type passing through
/// receive `policy` merged into them first.
pub fn with_policy(
    handler: Arc<dyn CallbackHandler>,
    name: &str,
    policy: Arc<dyn Policy>,
) -> Result<Arc<dyn CallbackHandler>> {
    let expected = POLICIES
        .read()
        .get(name)
        .copied()
        .ok_or_else(|| MediatorError::UnknownPolicy(name.to_string()))?;
    let payload: Payload = policy.clone();
    if callback_type(&payload) != expected {
        return Err(MediatorError::PolicyMismatch {
            name: name.to_string(),
            expected: expected.short_name(),
        });
    }
    let merging = Handler::anonymous();
    let _ = merging.define(
        &HANDLE,
        Definition::new()
            .constraint(Constraint::of_key(expected))
            .handler(move |callback, _| {
                Ok(if policy.merge_into(callback) {
                    Outcome::Void
                } else {
                    Outcome::unhandled()
                })
            }),
    )?;
    Ok(CascadeHandler::new(merging, handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{downcast, payload};
    use crate::handler::HandlerExt;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Tags(Mutex<Vec<&'static str>>);
    impl Callback for Tags {}
    impl Policy for Tags {
        fn merge_into(&self, target: &Payload) -> bool {
            let Some(target) = downcast::<Tags>(target) else {
                return false;
            };
            if std::ptr::eq(self, target) {
                return false;
            }
            target.0.lock().extend(self.0.lock().iter().copied());
            true
        }
    }

    #[derive(Default)]
    struct Other;
    impl Callback for Other {}
    impl Policy for Other {
        fn merge_into(&self, _: &Payload) -> bool {
            false
        }
    }

    #[test]
    fn policies_merge_into_passing_callbacks() {
        register_policy::<Tags>("tags").unwrap();
        let err = register_policy::<Tags>("tags").unwrap_err();
        assert!(matches!(err, MediatorError::DuplicatePolicy(_)));

        let policy = Arc::new(Tags(Mutex::new(vec!["audit"])));
        let inner = Handler::new();
        let decorated = with_policy(inner.clone(), "tags", policy).unwrap();
        let target = payload(Tags::default());
        assert!(decorated.handle(&target, false).unwrap());
        let tags = downcast::<Tags>(&target).unwrap().0.lock().clone();
        assert_eq!(tags, vec!["audit"]);

        let resolved = decorated.resolve_as::<Handler>().unwrap().ready().cloned().flatten();
        assert!(resolved.is_some_and(|handler| Arc::ptr_eq(&handler, &inner)));
    }

    #[test]
    fn unknown_and_mismatched_policies_are_rejected() {
        let err = with_policy(Handler::new(), "nope", Arc::new(Other)).err().unwrap();
        assert!(matches!(err, MediatorError::UnknownPolicy(_)));

        register_policy::<Tags>("labels").unwrap();
        let err = with_policy(Handler::new(), "labels", Arc::new(Other)).err().unwrap();
        assert!(matches!(err, MediatorError::PolicyMismatch { .. }));
    }
}
