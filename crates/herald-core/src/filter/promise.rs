use std::sync::Arc;

use super::{Filtered, filter};
use crate::callback::{Eventual, Promise};
use crate::handler::CallbackHandler;

/// Always expose an asynchronous result.
///
/// Immediate results become resolved promises. Errors become rejected
/// promises when the callback has a result slot, and propagate otherwise.
pub fn promised(inner: Arc<dyn CallbackHandler>) -> Arc<Filtered> {
    filter(
        inner,
        |callback, _, proceed| match proceed.run() {
            Ok(handled) => {
                if handled && let Some(Eventual::Ready(answer)) = callback.callback_result() {
                    callback.set_callback_result(Eventual::Pending(Promise::resolved(answer)));
                }
                Ok(handled)
            }
            Err(error) => {
                if callback.set_callback_result(Eventual::Pending(Promise::rejected(error.clone()))) {
                    Ok(true)
                } else {
                    Err(error)
                }
            }
        },
        false,
    )
}
