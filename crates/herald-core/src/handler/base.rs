use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use super::CallbackHandler;
use crate::binding::{Constraint, Context};
use crate::callback::{Outcome, Payload, Value};
use crate::error::{MediatorError, Result};
use crate::registry::{Definition, Definitions, HANDLE, Kind, PROVIDE, Unregister};
use crate::types::{self, Expando, Member};

/// Delegate は Handler が代理するドメインオブジェクト
///
/// 自身の定義表を持てる。ディスパッチは Handler 本体より先に delegate を試す。
#[derive(Clone)]
pub struct Delegate {
    value: Value,
    definitions: Option<Arc<Definitions>>,
}

impl Delegate {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_value(Arc::new(value))
    }

    pub fn from_value(value: Value) -> Self {
        Self {
            value,
            definitions: None,
        }
    }

    pub fn with_definitions(mut self, definitions: Arc<Definitions>) -> Self {
        self.definitions = Some(definitions);
        self
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn definitions(&self) -> Option<&Arc<Definitions>> {
        self.definitions.as_ref()
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate")
            .field("type", &types::classify_value(&self.value))
            .field("definitions", &self.definitions)
            .finish()
    }
}

/// Handler はバインディング表を持つ基本ハンドラ
///
/// # ディスパッチ順
/// 1. delegate の定義表
/// 2. 自身の定義表
/// 3. 組み込み定義（Lookup / Resolution / Deferred / Composition / HandleMethod / ResolveMethod）
struct Owner {
    value: Weak<dyn Any + Send + Sync>,
    handler: Weak<dyn CallbackHandler>,
}

pub struct Handler {
    this: Weak<Handler>,
    owner: Option<Owner>,
    delegate: Option<Delegate>,
    definitions: Arc<Definitions>,
}

impl Handler {
    pub fn new() -> Arc<Self> {
        Self::build(None, Definitions::new())
    }

    pub fn with_delegate(delegate: Delegate) -> Arc<Self> {
        Self::build(Some(delegate), Definitions::new())
    }

    /// Share one definitions table between several handlers.
    pub fn with_definitions(definitions: Arc<Definitions>) -> Arc<Self> {
        Self::build(None, definitions)
    }

    pub(crate) fn build(delegate: Option<Delegate>, definitions: Arc<Definitions>) -> Arc<Self> {
        types::declare_builtin();
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            owner: None,
            delegate,
            definitions,
        })
    }

    /// A definitions-only handler whose implied binding answers with `owner`.
    ///
    /// Composite, cascade and batch wrappers dispatch through one of these
    /// first, so a request for the wrapper's own type resolves to the wrapper.
    pub fn owned_by<T: CallbackHandler + Any>(owner: Weak<T>) -> Arc<Self> {
        types::declare_builtin();
        let owner = Owner {
            value: owner.clone(),
            handler: owner,
        };
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            owner: Some(owner),
            delegate: None,
            definitions: Definitions::new(),
        })
    }

    pub fn delegate(&self) -> Option<&Delegate> {
        self.delegate.as_ref()
    }

    pub fn definitions(&self) -> &Arc<Definitions> {
        &self.definitions
    }

    /// A definitions-only handler that never resolves as itself.
    pub fn anonymous() -> Arc<Self> {
        Self::owned_by(Weak::<Handler>::new())
    }

    /// This handler (or its owner) as a resolvable value.
    pub fn as_value(&self) -> Option<Value> {
        match &self.owner {
            Some(owner) => owner.value.upgrade(),
            None => self.this.upgrade().map(|this| this as Value),
        }
    }

    pub fn define(&self, kind: &Kind, definition: Definition) -> Result<Unregister> {
        kind.define(&self.definitions, definition)
    }

    /// A one-off handler answering `constraint` through "handle".
    pub fn accepting<F>(constraint: impl Into<Constraint>, handler: F) -> Result<Arc<Self>>
    where
        F: Fn(&Payload, &Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        let this = Self::new();
        let _ = this.define(&HANDLE, Definition::new().constraint(constraint).handler(handler))?;
        Ok(this)
    }

    /// A one-off handler answering `constraint` through "provide".
    pub fn providing<F>(constraint: impl Into<Constraint>, provider: F) -> Result<Arc<Self>>
    where
        F: Fn(&Payload, &Context<'_>) -> Result<Outcome> + Send + Sync + 'static,
    {
        let this = Self::new();
        let _ = this.define(&PROVIDE, Definition::new().constraint(constraint).handler(provider))?;
        Ok(this)
    }

    /// A handler answering any `HandleMethod` naming `member`.
    pub fn implementing<F>(member: &str, method: F) -> Result<Arc<Self>>
    where
        F: Fn(&Value, &[Value], &dyn CallbackHandler) -> Result<Outcome> + Send + Sync + 'static,
    {
        if member.trim().is_empty() {
            return Err(MediatorError::EmptyMemberName);
        }
        let target = Expando::new();
        target.define_member(member, Member::method(method));
        Ok(Self::with_delegate(Delegate::new(target)))
    }
}

impl CallbackHandler for Handler {
    fn handle_callback(
        &self,
        callback: &Payload,
        greedy: bool,
        composer: &dyn CallbackHandler,
    ) -> Result<bool> {
        let outcome = HANDLE.dispatch(self, callback, None, composer, greedy)?;
        Ok(HANDLE.is_handled(&outcome))
    }

    fn delegate_value(&self) -> Option<&Value> {
        self.delegate.as_ref().map(Delegate::value)
    }

    fn shared(&self) -> Option<Arc<dyn CallbackHandler>> {
        match &self.owner {
            Some(owner) => owner.handler.upgrade(),
            None => self.this.upgrade().map(|this| this as Arc<dyn CallbackHandler>),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("delegate", &self.delegate)
            .field("definitions", &self.definitions)
            .finish()
    }
}
