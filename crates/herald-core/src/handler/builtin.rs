//! 組み込みバインディング - 汎用コールバックを各 kind へ振り分ける
//!
//! すべての Handler の最下層の定義表として参照される。

use std::sync::{Arc, LazyLock};

use crate::binding::{Binding, Constraint, Context, HandlerFn};
use crate::callback::{
    Composition, Deferred, HandleMethod, Lookup, Outcome, Payload, ResolveMethod, Resolution,
    Value, downcast,
};
use crate::error::Result;
use crate::registry::{Definitions, HANDLE, LOOKUP, PROVIDE};
use crate::types::{self, TypeKey};

use super::CallbackHandler;

static BUILTIN: LazyLock<Arc<Definitions>> = LazyLock::new(|| {
    let definitions = Definitions::default();
    let routes: [(TypeKey, HandlerFn); 6] = [
        (TypeKey::of::<Lookup>(), Arc::new(lookup)),
        (TypeKey::of::<Deferred>(), Arc::new(deferred)),
        (TypeKey::of::<Resolution>(), Arc::new(resolution)),
        (TypeKey::of::<Composition>(), Arc::new(composition)),
        (TypeKey::of::<HandleMethod>(), Arc::new(handle_method)),
        (TypeKey::of::<ResolveMethod>(), Arc::new(resolve_method)),
    ];
    for (key, handler) in routes {
        definitions.insert(
            HANDLE.key(),
            HANDLE.variance(),
            Binding::new(Constraint::Type(key), handler),
        );
    }
    Arc::new(definitions)
});

pub(crate) fn definitions() -> &'static Arc<Definitions> {
    &BUILTIN
}

fn handled(outcome: Outcome) -> Outcome {
    if outcome.is_unhandled() {
        outcome
    } else {
        Outcome::Void
    }
}

fn lookup(callback: &Payload, ctx: &Context<'_>) -> Result<Outcome> {
    let Some(lookup) = downcast::<Lookup>(callback) else {
        return Ok(Outcome::unhandled());
    };
    let outcome = LOOKUP.dispatch_with(
        ctx.handler,
        callback,
        Some(lookup.key()),
        ctx.composer,
        lookup.is_many(),
        &mut |result| Ok(lookup.add_result(result)),
    )?;
    Ok(handled(outcome))
}

fn deferred(callback: &Payload, ctx: &Context<'_>) -> Result<Outcome> {
    let Some(deferred) = downcast::<Deferred>(callback) else {
        return Ok(Outcome::unhandled());
    };
    let outcome = HANDLE.dispatch_with(
        ctx.handler,
        deferred.callback(),
        None,
        ctx.composer,
        deferred.is_many(),
        &mut |result| Ok(deferred.track(result)),
    )?;
    Ok(handled(outcome))
}

fn resolution(callback: &Payload, ctx: &Context<'_>) -> Result<Outcome> {
    let Some(resolution) = downcast::<Resolution>(callback) else {
        return Ok(Outcome::unhandled());
    };
    let many = resolution.is_many();
    let outcome = PROVIDE.dispatch_with(
        ctx.handler,
        callback,
        Some(resolution.key()),
        ctx.composer,
        many,
        &mut |result| resolution.resolve(result, ctx.composer),
    )?;
    let mut resolved = !outcome.is_unhandled();
    if resolved && !many {
        return Ok(Outcome::Void);
    }

    // Implied binding: the delegate, then the handler itself.
    let candidates = [ctx.handler.delegate_value().cloned(), ctx.handler.as_value()];
    for candidate in candidates.into_iter().flatten() {
        if implied(resolution.key(), &candidate)
            && resolution.resolve(&Outcome::Value(candidate), ctx.composer)?
        {
            resolved = true;
            if !many {
                break;
            }
        }
    }
    Ok(if resolved {
        Outcome::Void
    } else {
        Outcome::unhandled()
    })
}

/// Does `candidate` itself satisfy a request for `key`?
fn implied(key: &Constraint, candidate: &Value) -> bool {
    let (key, invariant, _) = key.unwrap_modifiers();
    let Some(key) = key.type_key() else {
        return false;
    };
    if invariant {
        return types::classify_value(candidate) == key;
    }
    if types::is_protocol(key) {
        types::value_conforms_to(candidate, key)
    } else {
        types::is_subclass_of(types::classify_value(candidate), key)
    }
}

fn composition(callback: &Payload, ctx: &Context<'_>) -> Result<Outcome> {
    let Some(inner) = downcast::<Composition>(callback).and_then(Composition::callback) else {
        return Ok(Outcome::unhandled());
    };
    HANDLE.dispatch(ctx.handler, inner, None, ctx.composer, ctx.greedy)
}

fn handle_method(callback: &Payload, ctx: &Context<'_>) -> Result<Outcome> {
    let Some(method) = downcast::<HandleMethod>(callback) else {
        return Ok(Outcome::unhandled());
    };
    let targets = [ctx.handler.delegate_value().cloned(), ctx.handler.as_value()];
    for target in targets.into_iter().flatten() {
        if method.invoke_on(&target, ctx.composer)? {
            return Ok(Outcome::Void);
        }
    }
    Ok(Outcome::unhandled())
}

/// Resolve instant candidates for the protocol on this handler and invoke the
/// method on each one until satisfied (or on all of them when broadcasting).
fn resolve_method(callback: &Payload, ctx: &Context<'_>) -> Result<Outcome> {
    let Some(request) = downcast::<ResolveMethod>(callback) else {
        return Ok(Outcome::unhandled());
    };
    let method = request.method().clone();
    let Some(protocol) = method.protocol() else {
        return Ok(Outcome::unhandled());
    };
    let resolution = Arc::new(
        Resolution::new(Constraint::of_key(protocol).instant(), request.is_all())
            .satisfied_by(move |target, composer| method.invoke_on(target, composer)),
    );
    let candidates: Payload = resolution.clone();
    let handled = ctx
        .handler
        .handle_callback(&candidates, request.is_all(), ctx.composer)?;
    Ok(if handled && resolution.is_resolved() {
        Outcome::Void
    } else {
        Outcome::unhandled()
    })
}
