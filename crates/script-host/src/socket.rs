//! Natives behind the script `Socket` class and the connection relay

use std::sync::atomic::Ordering;
use std::sync::Weak;

use courier_protocol::{
    ModuleResult, SocketHandler, SocketId, SocketRequest, RESULT_FAIL, RESULT_OK,
};
use rquickjs::function::{Func, Opt};
use rquickjs::{CatchResultExt, Ctx, Function, Object, Persistent, Value};

use crate::module::{self, ModuleInner};
use crate::runtime::{listener_outcome, report_exception};
use crate::{bindings, ScriptError};

pub(crate) fn install<'js>(
    globals: &Object<'js>,
    module: Weak<ModuleInner>,
) -> rquickjs::Result<()> {
    let weak = module.clone();
    globals.set(
        "__courier_socket_connect",
        Func::from(move |ctx, obj| -> i32 {
            // Unify the closure parameter lifetimes (rustc gives annotated
            // closure params independent lifetimes).
            struct Args<'js>(Ctx<'js>, Object<'js>);
            let Args(ctx, obj) = Args(ctx, obj);
            connect_from_script(&ctx, &obj, &weak)
        }),
    )?;
    let weak = module.clone();
    globals.set(
        "__courier_socket_write",
        Func::from(move |handle: i64, data: String, length: Opt<f64>| -> i32 {
            write_from_script(&weak, handle, &data, length.0)
        }),
    )?;
    globals.set(
        "__courier_socket_close",
        Func::from(move |handle: i64| -> i32 {
            let Some(strong) = module.upgrade() else {
                return RESULT_FAIL;
            };
            match strong.host.socket_close(SocketId(handle)) {
                Ok(()) => RESULT_OK,
                Err(e) => {
                    tracing::warn!(module = %strong.name, error = %e, "socket close failed");
                    RESULT_FAIL
                }
            }
        }),
    )?;
    Ok(())
}

/// `Socket.connect()`: validate the object, pin its callbacks, and ask the
/// host for a connection. The handle reaches the script via `onconnect`.
fn connect_from_script<'js>(ctx: &Ctx<'js>, obj: &Object<'js>, module: &Weak<ModuleInner>) -> i32 {
    let Some(strong) = module.upgrade() else {
        return RESULT_FAIL;
    };
    let Some(url) = bindings::get_string(obj, "url").filter(|u| !u.is_empty()) else {
        tracing::warn!(
            module = %strong.name,
            "{}",
            ScriptError::InvalidParams("socket url is required".into())
        );
        return RESULT_FAIL;
    };
    let on_connect = match pinned_callback(ctx, obj, "onconnect") {
        Ok(cb) => cb,
        Err(()) => {
            tracing::warn!(
                module = %strong.name,
                "{}",
                ScriptError::InvalidParams("socket onconnect must be a function".into())
            );
            return RESULT_FAIL;
        }
    };
    let on_data = match pinned_callback(ctx, obj, "ondata") {
        Ok(cb) => cb,
        Err(()) => {
            tracing::warn!(
                module = %strong.name,
                "{}",
                ScriptError::InvalidParams("socket ondata must be a function".into())
            );
            return RESULT_FAIL;
        }
    };
    let cbdata = match obj.get::<_, Value>("cbdata") {
        Ok(v) => Persistent::save(ctx, v),
        Err(_) => {
            return RESULT_FAIL;
        }
    };

    let request = SocketRequest {
        url,
        keepalive: obj.get::<_, Option<bool>>("keepalive").ok().flatten().unwrap_or(false),
        verify_host: obj.get::<_, Option<bool>>("verifyHost").ok().flatten().unwrap_or(true),
    };
    let relay = SocketRelay {
        module: module.clone(),
        generation: strong.generation.load(Ordering::SeqCst),
        cbdata,
        on_connect,
        on_data,
    };
    match strong.host.socket_connect(request, Box::new(relay)) {
        Ok(id) => {
            tracing::debug!(module = %strong.name, socket = %id, "socket connecting");
            RESULT_OK
        }
        Err(e) => {
            tracing::warn!(module = %strong.name, error = %e, "host refused socket");
            RESULT_FAIL
        }
    }
}

fn write_from_script(
    module: &Weak<ModuleInner>,
    handle: i64,
    data: &str,
    length: Option<f64>,
) -> i32 {
    let Some(strong) = module.upgrade() else {
        return RESULT_FAIL;
    };
    let bytes = data.as_bytes();
    let len = length
        .map(|l| l as usize)
        .unwrap_or(bytes.len())
        .min(bytes.len());
    match strong.host.socket_write(SocketId(handle), &bytes[..len]) {
        Ok(()) => RESULT_OK,
        Err(e) => {
            tracing::warn!(module = %strong.name, error = %e, "socket write failed");
            RESULT_FAIL
        }
    }
}

/// Absent slot is fine; a present non-function is a caller error
fn pinned_callback<'js>(
    ctx: &Ctx<'js>,
    obj: &Object<'js>,
    key: &str,
) -> Result<Option<Persistent<Function<'static>>>, ()> {
    let value = obj.get::<_, Value>(key).map_err(|_| ())?;
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    let func = value.into_function().ok_or(())?;
    Ok(Some(Persistent::save(ctx, func)))
}

/// Pending socket context: relays connection events into the script
struct SocketRelay {
    module: Weak<ModuleInner>,
    generation: u64,
    cbdata: Persistent<Value<'static>>,
    on_connect: Option<Persistent<Function<'static>>>,
    on_data: Option<Persistent<Function<'static>>>,
}

// SAFETY: the `Persistent` fields are only created and restored inside
// `Context::with`, which holds the `parallel` runtime lock.
unsafe impl Send for SocketRelay {}

impl SocketHandler for SocketRelay {
    fn on_connect(&mut self, id: SocketId) {
        let Some(listener) = &self.on_connect else {
            return;
        };
        let _ = module::with_live_session(&self.module, self.generation, |inner, session| {
            session.context.with(|ctx| {
                let invoked = (|| -> rquickjs::Result<()> {
                    let callback = listener.clone().restore(&ctx)?;
                    let cbdata = self.cbdata.clone().restore(&ctx)?;
                    if let Err(caught) = callback.call::<_, Value>((cbdata, id.0)).catch(&ctx) {
                        report_exception(&caught);
                    }
                    Ok(())
                })();
                if let Err(e) = invoked {
                    tracing::warn!(module = %inner.name, error = %e, "socket onconnect failed");
                }
            });
        });
    }

    fn on_data(&mut self, data: &[u8]) -> ModuleResult {
        let Some(listener) = &self.on_data else {
            return ModuleResult::Pass;
        };
        let text = String::from_utf8_lossy(data).into_owned();
        module::with_live_session(&self.module, self.generation, |inner, session| {
            session.context.with(|ctx| {
                let invoked = (|| -> rquickjs::Result<ModuleResult> {
                    let callback = listener.clone().restore(&ctx)?;
                    let cbdata = self.cbdata.clone().restore(&ctx)?;
                    let len = text.len() as u32;
                    let res = callback.call::<_, Value>((cbdata, text.as_str(), len));
                    Ok(listener_outcome(&ctx, res))
                })();
                invoked.unwrap_or_else(|e| {
                    tracing::warn!(module = %inner.name, error = %e, "socket ondata failed");
                    ModuleResult::Fail
                })
            })
        })
        .unwrap_or(ModuleResult::Fail)
    }

    fn on_close(&mut self) {
        tracing::debug!("socket closed");
    }
}
