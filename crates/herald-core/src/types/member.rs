use std::any::Any;
use std::sync::Arc;

use crate::callback::{Outcome, Value};
use crate::error::{MediatorError, Result};
use crate::handler::CallbackHandler;

pub type MethodFn =
    Arc<dyn Fn(&Value, &[Value], &dyn CallbackHandler) -> Result<Outcome> + Send + Sync>;
pub type GetterFn = Arc<dyn Fn(&Value) -> Result<Outcome> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&Value, Value) -> Result<()> + Send + Sync>;

/// A named member reachable through `HandleMethod`.
#[derive(Clone)]
pub enum Member {
    Method(MethodFn),
    Property {
        get: Option<GetterFn>,
        set: Option<SetterFn>,
    },
}

impl Member {
    pub fn method<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value], &dyn CallbackHandler) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self::Method(Arc::new(f))
    }

    /// Wrap a method written against the concrete receiver type.
    pub fn typed_method<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T, &[Value], &dyn CallbackHandler) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self::Method(Arc::new(move |target, args, composer| {
            f(receiver::<T>(target)?, args, composer)
        }))
    }

    pub fn typed_getter<T, F>(f: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> Result<Outcome> + Send + Sync + 'static,
    {
        Self::Property {
            get: Some(Arc::new(move |target| f(receiver::<T>(target)?))),
            set: None,
        }
    }

    pub fn typed_property<T, G, S>(get: G, set: S) -> Self
    where
        T: Any + Send + Sync,
        G: Fn(&T) -> Result<Outcome> + Send + Sync + 'static,
        S: Fn(&T, Value) -> Result<()> + Send + Sync + 'static,
    {
        Self::Property {
            get: Some(Arc::new(move |target| get(receiver::<T>(target)?))),
            set: Some(Arc::new(move |target, value| set(receiver::<T>(target)?, value))),
        }
    }
}

fn receiver<T: Any>(target: &Value) -> Result<&T> {
    target.downcast_ref::<T>().ok_or_else(|| {
        MediatorError::failed(format!(
            "receiver is not a {}",
            std::any::type_name::<T>()
        ))
    })
}
