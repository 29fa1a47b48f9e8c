use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{Filtered, filter};
use crate::callback::{Eventual, Payload, Promise};
use crate::error::MediatorError;
use crate::handler::CallbackHandler;
use crate::observability;

/// Builds the error reported when a guarded result misses its deadline.
pub type TimeoutErrorFn = Arc<dyn Fn(&Payload) -> MediatorError + Send + Sync>;

/// Race asynchronous results against `duration`.
///
/// On expiry the exposed result fails with `MediatorError::Timeout` (or the
/// factory's error) and the original promise's reject hook is called. The
/// producer itself is not aborted.
///
/// The deadline needs a tokio runtime where the result is awaited. Without
/// one the result passes through unraced.
pub fn timeout(
    inner: Arc<dyn CallbackHandler>,
    duration: Duration,
    error: Option<TimeoutErrorFn>,
) -> Arc<Filtered> {
    filter(
        inner,
        move |callback, _, proceed| {
            let handled = proceed.run()?;
            if !handled {
                return Ok(false);
            }
            let Some(Eventual::Pending(original)) = callback.callback_result() else {
                return Ok(true);
            };
            let target = callback.clone();
            let error = error.clone();
            let racing = original.clone();
            let raced = Promise::new(async move {
                if tokio::runtime::Handle::try_current().is_err() {
                    warn!(callback = ?target, "no tokio runtime, timeout not enforced");
                    return racing.await;
                }
                match tokio::time::timeout(duration, racing.clone()).await {
                    Ok(result) => result,
                    Err(_) => {
                        let error = match &error {
                            Some(factory) => factory(&target),
                            None => MediatorError::Timeout {
                                callback: target.clone(),
                                message: format!("timeout of {}ms exceeded", duration.as_millis()),
                            },
                        };
                        observability::record_timeout();
                        warn!(callback = ?target, timeout_ms = duration.as_millis() as u64, "callback timed out");
                        racing.reject(error.clone());
                        Err(error)
                    }
                }
            })
            .with_reject(move |error| {
                original.reject(error);
            });
            callback.set_callback_result(Eventual::Pending(raced));
            Ok(true)
        },
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Outcome, Value};
    use crate::handler::{Handler, HandlerExt};
    use parking_lot::Mutex;

    fn hanging(cancelled: Arc<Mutex<Option<String>>>) -> Arc<dyn CallbackHandler> {
        Handler::providing("slow", move |_, _| {
            let cancelled = cancelled.clone();
            let promise = Promise::new(futures::future::pending::<crate::Result<Option<Value>>>())
                .with_reject(move |error| *cancelled.lock() = Some(error.to_string()));
            Ok(Outcome::Pending(promise))
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_rejects_and_signals_the_producer() {
        let cancelled = Arc::new(Mutex::new(None));
        let guarded = timeout(hanging(cancelled.clone()), Duration::from_millis(100), None);
        let result = guarded.resolve("slow").unwrap().settle().await;
        let err = result.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "timeout of 100ms exceeded");
        assert_eq!(cancelled.lock().as_deref(), Some("timeout of 100ms exceeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn factory_errors_replace_the_default() {
        let factory: TimeoutErrorFn = Arc::new(|_| MediatorError::failed("too slow"));
        let guarded = timeout(hanging(Arc::default()), Duration::from_millis(10), Some(factory));
        let err = guarded.resolve("slow").unwrap().settle().await.unwrap_err();
        assert_eq!(err.to_string(), "too slow");
    }

    #[tokio::test(start_paused = true)]
    async fn prompt_results_pass_through() {
        let handler = Handler::providing("quick", |_, _| {
            Ok(Outcome::pending(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Some(Arc::new(9_u32) as Value))
            }))
        })
        .unwrap();
        let guarded = timeout(handler, Duration::from_millis(100), None);
        let value = guarded.resolve("quick").unwrap().settle().await.unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&9));
    }

    #[test]
    fn results_pass_through_without_a_runtime() {
        let handler = Handler::providing("quick", |_, _| {
            Ok(Outcome::pending(async { Ok(Some(Arc::new(4_u32) as Value)) }))
        })
        .unwrap();
        let guarded = timeout(handler, Duration::from_millis(100), None);
        let answer = guarded.resolve("quick").unwrap();
        let value = futures::executor::block_on(answer.settle()).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<u32>(), Some(&4));
    }
}
