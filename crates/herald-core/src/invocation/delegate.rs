use std::sync::Arc;

use tracing::debug;

use super::options::InvocationOptions;
use super::semantics::InvocationSemantics;
use crate::callback::{Eventual, HandleMethod, MethodKind, Payload, ResolveMethod, Value};
use crate::error::{MediatorError, Result};
use crate::handler::{CallbackHandler, HandlerExt};
use crate::types::{self, Resolving, TypeKey};

/// InvocationDelegate はプロトコルのメンバー呼び出しをハンドラ経由で行う
///
/// # 使用例
/// ```ignore
/// let greeter = InvocationDelegate::new(handler);
/// let reply = greeter.invoke(Some(TypeKey::of::<Greeting>()), "greet", vec![])?;
/// ```
///
/// # 呼び出しの流れ
/// 1. 周囲の InvocationSemantics を greedy に問い合わせる
/// 2. RESOLVE 指定か Resolving を拡張したプロトコルなら ResolveMethod、それ以外は HandleMethod
/// 3. 未処理なら BEST_EFFORT でない限り `MediatorError::NotHandled`
pub struct InvocationDelegate {
    handler: Arc<dyn CallbackHandler>,
}

impl InvocationDelegate {
    pub fn new(handler: Arc<dyn CallbackHandler>) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Arc<dyn CallbackHandler> {
        &self.handler
    }

    pub fn get(&self, protocol: Option<TypeKey>, member: &str) -> Result<Eventual<Option<Value>>> {
        self.dispatch(MethodKind::Get, protocol, member, Vec::new())
    }

    pub fn set(
        &self,
        protocol: Option<TypeKey>,
        member: &str,
        value: Value,
    ) -> Result<Eventual<Option<Value>>> {
        self.dispatch(MethodKind::Set, protocol, member, vec![value])
    }

    pub fn invoke(
        &self,
        protocol: Option<TypeKey>,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Eventual<Option<Value>>> {
        self.dispatch(MethodKind::Invoke, protocol, member, args)
    }

    fn dispatch(
        &self,
        kind: MethodKind,
        protocol: Option<TypeKey>,
        member: &str,
        args: Vec<Value>,
    ) -> Result<Eventual<Option<Value>>> {
        let semantics = Arc::new(InvocationSemantics::default());
        let query: Payload = semantics.clone();
        self.handler.handle(&query, true)?;

        let broadcast = semantics.get_option(InvocationOptions::BROADCAST);
        let best_effort = semantics.get_option(InvocationOptions::BEST_EFFORT);
        let strict = semantics.get_option(InvocationOptions::STRICT)
            && !semantics.get_option(InvocationOptions::DUCK);
        let resolve = semantics.get_option(InvocationOptions::RESOLVE)
            || protocol.is_some_and(|p| types::conforms_to(p, TypeKey::of::<Resolving>()));

        let method = HandleMethod::new(kind, protocol, member, args, strict);
        let (callback, method): (Payload, Arc<HandleMethod>) = if resolve {
            let request = Arc::new(ResolveMethod::new(method, broadcast));
            let method = request.method().clone();
            (request, method)
        } else {
            let method = Arc::new(method);
            (method.clone(), method)
        };

        if !self.handler.handle(&callback, broadcast)? {
            debug!(member, ?protocol, best_effort, "method not handled");
            if best_effort {
                return Ok(Eventual::Ready(None));
            }
            return Err(MediatorError::NotHandled {
                target: protocol.map_or("handler", |p| p.short_name()).to_string(),
                member: member.to_string(),
            });
        }
        if let Some(error) = method.exception() {
            return Err(error);
        }
        Ok(method
            .return_value()
            .and_then(|outcome| outcome.into_eventual())
            .unwrap_or(Eventual::Ready(None)))
    }
}
