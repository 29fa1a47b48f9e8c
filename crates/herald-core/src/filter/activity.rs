use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::trace;

use super::aspect::{Gate, aspect};
use super::Filtered;
use crate::callback::Value;
use crate::handler::CallbackHandler;
use crate::types::Expando;

/// Number of counted in-flight calls recorded on `target[property]`.
pub fn activity_count(target: &Expando, property: &str) -> usize {
    target
        .get(property)
        .and_then(|v| v.downcast_ref::<usize>().copied())
        .unwrap_or(0)
}

fn adjust(target: &Expando, property: &str, delta: isize) {
    target.with_properties(|properties| {
        let current = properties
            .get(property)
            .and_then(|v| v.downcast_ref::<usize>().copied())
            .unwrap_or(0);
        let next = current.saturating_add_signed(delta);
        if next == 0 {
            properties.remove(property);
        } else {
            properties.insert(property.to_string(), Arc::new(next));
        }
    });
}

#[derive(Default)]
struct TicketState {
    counted: bool,
    finished: bool,
    timer: Option<AbortHandle>,
}

/// One call's claim on the activity counter.
struct Ticket {
    target: Arc<Expando>,
    property: String,
    state: Mutex<TicketState>,
}

impl Ticket {
    fn start(&self) {
        let mut state = self.state.lock();
        if state.finished || state.counted {
            return;
        }
        state.counted = true;
        adjust(&self.target, &self.property, 1);
        trace!(property = %self.property, "activity counted");
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if state.counted {
            adjust(&self.target, &self.property, -1);
        }
    }
}

/// Count calls still running after `delay` on `target[property]`.
///
/// Calls finishing within the delay are never counted. Without a tokio
/// runtime there is no timer, so every call counts immediately.
pub fn activity(
    inner: Arc<dyn CallbackHandler>,
    target: Arc<Expando>,
    delay: Duration,
    property: &str,
) -> Arc<Filtered> {
    let property = property.to_string();
    aspect(
        inner,
        Some(Arc::new(move |_, _| {
            let ticket = Arc::new(Ticket {
                target: target.clone(),
                property: property.clone(),
                state: Mutex::new(TicketState::default()),
            });
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let pending = ticket.clone();
                    let task = runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        pending.start();
                    });
                    ticket.state.lock().timer = Some(task.abort_handle());
                }
                Err(_) => ticket.start(),
            }
            Ok(Gate::Accept(Some(ticket)))
        })),
        Some(Arc::new(|_, state: Option<&Value>| {
            if let Some(ticket) = state.and_then(|s| s.downcast_ref::<Ticket>()) {
                ticket.finish();
            }
        })),
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::Outcome;
    use crate::error::MediatorError;
    use crate::handler::{Handler, HandlerExt};
    use tokio::sync::oneshot;

    fn slow_handler(pending: Arc<Mutex<Option<oneshot::Receiver<u32>>>>) -> Arc<dyn CallbackHandler> {
        Handler::providing("work", move |_, _| {
            let Some(rx) = pending.lock().take() else {
                return Ok(Outcome::value(0_u32));
            };
            Ok(Outcome::pending(async move {
                let value = rx.await.map_err(|e| MediatorError::failed(e.to_string()))?;
                Ok(Some(Arc::new(value) as Value))
            }))
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn long_calls_are_counted_until_they_settle() {
        let (tx, rx) = oneshot::channel();
        let target = Arc::new(Expando::new());
        let tracked = activity(
            slow_handler(Arc::new(Mutex::new(Some(rx)))),
            target.clone(),
            Duration::from_millis(50),
            "$$activity",
        );
        let work = tracked.resolve("work").unwrap();
        assert_eq!(activity_count(&target, "$$activity"), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(activity_count(&target, "$$activity"), 1);

        tx.send(1).unwrap();
        work.settle().await.unwrap();
        assert_eq!(activity_count(&target, "$$activity"), 0);
        assert!(!target.has("$$activity"));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_calls_are_never_counted() {
        let target = Arc::new(Expando::new());
        let tracked = activity(
            slow_handler(Arc::new(Mutex::new(None))),
            target.clone(),
            Duration::from_millis(50),
            "$$activity",
        );
        tracked.resolve("work").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(activity_count(&target, "$$activity"), 0);
    }
}
