//! Natives behind the script `Message` class

use std::sync::Weak;

use courier_protocol::{
    FLAG_DELIVERY_RECEIPT, FLAG_PRESENCE, FLAG_READ_RECEIPT, RESULT_FAIL, RESULT_OK,
};
use rquickjs::function::Func;
use rquickjs::{Ctx, Object, Value};

use crate::module::ModuleInner;
use crate::{bindings, ScriptError};

pub(crate) fn install<'js>(
    globals: &Object<'js>,
    module: Weak<ModuleInner>,
) -> rquickjs::Result<()> {
    globals.set(
        "__courier_message_send",
        Func::from(move |ctx, obj| -> i32 {
            // Unify the closure parameter lifetimes (rustc gives annotated
            // closure params independent lifetimes).
            struct Args<'js>(Ctx<'js>, Object<'js>);
            let Args(ctx, obj) = Args(ctx, obj);
            send_from_script(&ctx, &obj, &module)
        }),
    )?;
    globals.set(
        "__courier_message_enable",
        Func::from(|obj: Object<'_>, which: String, enable: Value<'_>| -> i32 {
            enable_property(&obj, &which, &enable)
        }),
    )?;
    Ok(())
}

/// `Message.send()`: validate, marshal, and hand the message to the host.
/// Failures are logged and surfaced as -1, never thrown into the script.
fn send_from_script<'js>(ctx: &Ctx<'js>, obj: &Object<'js>, module: &Weak<ModuleInner>) -> i32 {
    let Some(module) = module.upgrade() else {
        return RESULT_FAIL;
    };
    let params = bindings::params_from_object(obj);
    if params.aid == 0 || params.id == 0 {
        tracing::warn!(
            module = %module.name,
            "{}",
            ScriptError::InvalidParams("aid and id are required to send".into())
        );
        return RESULT_FAIL;
    }
    let payload = match obj.get::<_, Value>("message") {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(module = %module.name, error = %e, "message payload unreadable");
            return RESULT_FAIL;
        }
    };
    let body = match bindings::body_from_value(ctx, &payload) {
        Ok(body) => body,
        Err(reason) => {
            tracing::warn!(
                module = %module.name,
                "{}",
                ScriptError::InvalidParams(reason)
            );
            return RESULT_FAIL;
        }
    };
    match module.host.send_message(&params, body.as_bytes()) {
        Ok(()) => RESULT_OK,
        Err(e) => {
            tracing::warn!(module = %module.name, error = %e, "host refused message");
            RESULT_FAIL
        }
    }
}

/// `enableReadReceipt` and friends: flip a flag bit on the message object.
/// The argument must be a real boolean.
fn enable_property(obj: &Object<'_>, which: &str, enable: &Value<'_>) -> i32 {
    let Some(on) = enable.as_bool() else {
        tracing::warn!(property = which, "flag argument must be a boolean");
        return RESULT_FAIL;
    };
    if which == "online" {
        let online: u32 = on.into();
        if obj.set("toOnline", online).is_err() {
            return RESULT_FAIL;
        }
        return RESULT_OK;
    }
    let bit = match which {
        "read" => FLAG_READ_RECEIPT,
        "delivery" => FLAG_DELIVERY_RECEIPT,
        "presence" => FLAG_PRESENCE,
        _ => {
            tracing::warn!(property = which, "unknown message property");
            return RESULT_FAIL;
        }
    };
    let flags = bindings::get_uint(obj, "flags");
    let flags = if on { flags | bit } else { flags & !bit };
    if obj.set("flags", flags).is_err() {
        return RESULT_FAIL;
    }
    RESULT_OK
}
