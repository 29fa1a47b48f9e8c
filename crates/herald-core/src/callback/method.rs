//! HandleMethod / ResolveMethod - 名前付きメンバーへの get / set / invoke 要求

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::outcome::{Answer, CallbackResult, Eventual, Outcome, Value};
use super::Callback;
use crate::error::{MediatorError, Result};
use crate::handler::CallbackHandler;
use crate::types::{self, Member, TypeKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Get,
    Set,
    Invoke,
}

#[derive(Default)]
struct MethodState {
    return_value: Option<Outcome>,
    exception: Option<MediatorError>,
}

/// HandleMethod はプロトコルのメンバー呼び出し要求
///
/// 戻り値・例外はコールバック自身に記録され、呼び出し後も参照できる。
pub struct HandleMethod {
    kind: MethodKind,
    protocol: Option<TypeKey>,
    member: String,
    args: Vec<Value>,
    strict: bool,
    state: Mutex<MethodState>,
}

impl HandleMethod {
    pub fn new(
        kind: MethodKind,
        protocol: Option<TypeKey>,
        member: impl Into<String>,
        args: Vec<Value>,
        strict: bool,
    ) -> Self {
        Self {
            kind,
            protocol,
            member: member.into(),
            args,
            strict,
            state: Mutex::new(MethodState::default()),
        }
    }

    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    pub fn protocol(&self) -> Option<TypeKey> {
        self.protocol
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn return_value(&self) -> Option<Outcome> {
        self.state.lock().return_value.clone()
    }

    pub fn exception(&self) -> Option<MediatorError> {
        self.state.lock().exception.clone()
    }

    /// Strict calls require protocol conformance; otherwise any target
    /// exposing the member is acceptable.
    pub fn is_acceptable_target(&self, target: &Value) -> bool {
        match self.protocol {
            Some(protocol) if self.strict => types::value_conforms_to(target, protocol),
            _ => true,
        }
    }

    /// Perform the member access on `target`.
    ///
    /// Returns `Ok(false)` when the target does not apply. Member errors are
    /// recorded on the callback and then returned.
    pub fn invoke_on(&self, target: &Value, composer: &dyn CallbackHandler) -> Result<bool> {
        if !self.is_acceptable_target(target) {
            return Ok(false);
        }
        let Some(member) = types::member_of(target, &self.member) else {
            return Ok(false);
        };
        let result = match (self.kind, member) {
            (MethodKind::Invoke, Member::Method(method)) => method(target, &self.args, composer),
            (MethodKind::Get, Member::Property { get: Some(get), .. }) => get(target),
            (MethodKind::Set, Member::Property { set: Some(set), .. }) => {
                let value = self
                    .args
                    .first()
                    .cloned()
                    .ok_or_else(|| MediatorError::failed(format!("no value to set '{}'", self.member)))?;
                set(target, value).map(|_| Outcome::Void)
            }
            _ => return Ok(false),
        };
        let mut state = self.state.lock();
        match result {
            Ok(outcome) if outcome.is_unhandled() => Ok(false),
            Ok(outcome) => {
                state.return_value = Some(outcome);
                state.exception = None;
                Ok(true)
            }
            Err(error) => {
                state.exception = Some(error.clone());
                Err(error)
            }
        }
    }
}

impl Callback for HandleMethod {
    fn callback_result(&self) -> Option<CallbackResult> {
        let outcome = self.return_value()?;
        Some(match outcome.into_eventual()? {
            Eventual::Ready(value) => Eventual::Ready(Answer::One(value)),
            Eventual::Pending(promise) => Eventual::Pending(promise.map(|v| Ok(Answer::One(v)))),
        })
    }
}

impl fmt::Debug for HandleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleMethod")
            .field("kind", &self.kind)
            .field("protocol", &self.protocol)
            .field("member", &self.member)
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

/// ResolveMethod はまずプロトコルを実装する候補を解決し、候補上でメソッドを呼ぶ
pub struct ResolveMethod {
    method: Arc<HandleMethod>,
    all: bool,
}

impl ResolveMethod {
    pub fn new(method: HandleMethod, all: bool) -> Self {
        Self {
            method: Arc::new(method),
            all,
        }
    }

    pub fn method(&self) -> &Arc<HandleMethod> {
        &self.method
    }

    pub fn is_all(&self) -> bool {
        self.all
    }
}

impl Callback for ResolveMethod {
    fn callback_result(&self) -> Option<CallbackResult> {
        self.method.callback_result()
    }
}

impl fmt::Debug for ResolveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveMethod")
            .field("method", &self.method)
            .field("all", &self.all)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Counter {
        hits: AtomicU32,
    }
    struct Countable;
    struct Stranger;

    fn declare() {
        types::protocol::<Countable>().declare();
        types::class::<Counter>()
            .implements::<Countable>()
            .method("bump", |counter: &Counter, args, _| {
                let by = args.first().and_then(|v| v.downcast_ref::<u32>()).copied().unwrap_or(1);
                Ok(Outcome::value(counter.hits.fetch_add(by, Ordering::SeqCst) + by))
            })
            .method("explode", |_: &Counter, _, _| Err(MediatorError::failed("boom")))
            .declare();
        types::class::<Stranger>()
            .method("bump", |_: &Stranger, _, _| Ok(Outcome::value(0_u32)))
            .declare();
    }

    fn counter() -> Value {
        Arc::new(Counter {
            hits: AtomicU32::new(0),
        })
    }

    #[test]
    fn invoke_records_return_value() {
        declare();
        let composer = Handler::new();
        let method = HandleMethod::new(
            MethodKind::Invoke,
            Some(TypeKey::of::<Countable>()),
            "bump",
            vec![Arc::new(5_u32) as Value],
            true,
        );
        assert!(method.invoke_on(&counter(), composer.as_ref()).unwrap());
        let Some(Outcome::Value(value)) = method.return_value() else {
            panic!("expected a value");
        };
        assert_eq!(value.downcast_ref::<u32>(), Some(&5));
    }

    #[test]
    fn strict_calls_require_conformance() {
        declare();
        let composer = Handler::new();
        let stranger: Value = Arc::new(Stranger);
        let strict = HandleMethod::new(MethodKind::Invoke, Some(TypeKey::of::<Countable>()), "bump", vec![], true);
        assert!(!strict.invoke_on(&stranger, composer.as_ref()).unwrap());
        let duck = HandleMethod::new(MethodKind::Invoke, Some(TypeKey::of::<Countable>()), "bump", vec![], false);
        assert!(duck.invoke_on(&stranger, composer.as_ref()).unwrap());
    }

    #[test]
    fn member_errors_are_recorded_and_returned() {
        declare();
        let composer = Handler::new();
        let method = HandleMethod::new(MethodKind::Invoke, None, "explode", vec![], false);
        let err = method.invoke_on(&counter(), composer.as_ref()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(method.exception().is_some());
    }

    #[test]
    fn missing_members_do_not_apply() {
        declare();
        let composer = Handler::new();
        let method = HandleMethod::new(MethodKind::Get, None, "nothing", vec![], false);
        assert!(!method.invoke_on(&counter(), composer.as_ref()).unwrap());
        assert!(method.return_value().is_none());
    }
}
