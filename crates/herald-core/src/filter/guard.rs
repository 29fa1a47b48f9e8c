use std::sync::Arc;

use super::aspect::{Gate, aspect};
use super::Filtered;
use crate::callback::Value;
use crate::handler::CallbackHandler;
use crate::types::Expando;

fn is_set(value: Option<Value>) -> bool {
    value.and_then(|v| v.downcast_ref::<bool>().copied()).unwrap_or(false)
}

/// Mutual exclusion on `target[property]`.
///
/// A call made while the flag is set is rejected. The flag is released once
/// the guarded result settles; a property that did not exist before is
/// removed again rather than left behind as `false`.
pub fn guard(inner: Arc<dyn CallbackHandler>, target: Arc<Expando>, property: &str) -> Arc<Filtered> {
    let (claim, release) = (target.clone(), target);
    let (claimed, released) = (property.to_string(), property.to_string());
    aspect(
        inner,
        Some(Arc::new(move |_, _| {
            let existed = claim.with_properties(|properties| {
                let existed = properties.contains_key(&claimed);
                if is_set(properties.get(&claimed).cloned()) {
                    return None;
                }
                properties.insert(claimed.clone(), Arc::new(true));
                Some(existed)
            });
            Ok(match existed {
                Some(existed) => Gate::Accept(Some(Arc::new(existed))),
                None => Gate::Reject,
            })
        })),
        Some(Arc::new(move |_, state: Option<&Value>| {
            let existed = state
                .and_then(|s| s.downcast_ref::<bool>().copied())
                .unwrap_or(false);
            if existed {
                release.set(released.clone(), Arc::new(false));
            } else {
                release.remove(&released);
            }
        })),
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Outcome, Value};
    use crate::error::MediatorError;
    use crate::handler::{Handler, HandlerExt};
    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn overlapping_calls_are_refused_until_the_first_settles() {
        let pending = Arc::new(Mutex::new(Vec::<oneshot::Receiver<u32>>::new()));
        let queue = pending.clone();
        let handler = Handler::providing("work", move |_, _| {
            let Some(rx) = queue.lock().pop() else {
                return Ok(Outcome::value(0_u32));
            };
            Ok(Outcome::pending(async move {
                let value = rx.await.map_err(|e| MediatorError::failed(e.to_string()))?;
                Ok(Some(Arc::new(value) as Value))
            }))
        })
        .unwrap();
        let target = Arc::new(Expando::new());
        let guarded = guard(handler, target.clone(), "guarded");

        let (tx, rx) = oneshot::channel();
        pending.lock().push(rx);
        let first = guarded.resolve("work").unwrap();
        assert!(first.is_pending());
        assert!(target.has("guarded"));

        let second = guarded.resolve("work").unwrap_err();
        assert!(second.is_rejected());

        tx.send(5).unwrap();
        first.settle().await.unwrap();
        assert!(!target.has("guarded"));

        let third = guarded.resolve("work").unwrap();
        assert!(third.ready().is_some());
        assert!(!target.has("guarded"));
    }

    #[test]
    fn existing_properties_are_reset_not_removed() {
        let handler = Handler::providing("work", |_, _| Ok(Outcome::value(1_u32))).unwrap();
        let target = Arc::new(Expando::new());
        target.set("busy", Arc::new(false));
        let guarded = guard(handler, target.clone(), "busy");
        guarded.resolve("work").unwrap();
        let flag = target.get("busy").unwrap();
        assert_eq!(flag.downcast_ref::<bool>(), Some(&false));
    }
}
