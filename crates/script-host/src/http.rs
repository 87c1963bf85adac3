//! Natives behind the script `Http` class and the pending-transfer context

use std::sync::atomic::Ordering;
use std::sync::Weak;

use courier_protocol::{HttpHandler, HttpRequest, HttpState, ModuleResult, RESULT_FAIL, RESULT_OK};
use rquickjs::function::Func;
use rquickjs::{CatchResultExt, Ctx, Function, Object, Persistent, Value};

use crate::module::{self, ModuleInner};
use crate::runtime::report_exception;
use crate::{bindings, ScriptError};

/// Fixed capacity for an accumulated response body. A transfer that would
/// exceed it is failed permanently; its callback never fires.
pub const RESPONSE_BUFFER_CAP: usize = 64 * 1024;

pub(crate) fn install<'js>(
    globals: &Object<'js>,
    module: Weak<ModuleInner>,
) -> rquickjs::Result<()> {
    globals.set(
        "__courier_http_send",
        Func::from(move |ctx, obj| -> i32 {
            // Unify the closure parameter lifetimes (rustc gives annotated
            // closure params independent lifetimes).
            struct Args<'js>(Ctx<'js>, Object<'js>);
            let Args(ctx, obj) = Args(ctx, obj);
            send_from_script(&ctx, &obj, &module)
        }),
    )?;
    Ok(())
}

/// `Http.send()`: validate the request object, pin the object and its
/// completion callback, and hand the transfer to the host.
fn send_from_script<'js>(ctx: &Ctx<'js>, obj: &Object<'js>, module: &Weak<ModuleInner>) -> i32 {
    let Some(strong) = module.upgrade() else {
        return RESULT_FAIL;
    };
    let Some(url) = bindings::get_string(obj, "url").filter(|u| !u.is_empty()) else {
        tracing::warn!(
            module = %strong.name,
            "{}",
            ScriptError::InvalidParams("http url is required".into())
        );
        return RESULT_FAIL;
    };
    let Some(post) = bindings::get_string(obj, "post") else {
        tracing::warn!(
            module = %strong.name,
            "{}",
            ScriptError::InvalidParams("http post data is required".into())
        );
        return RESULT_FAIL;
    };
    let callback = match obj.get::<_, Value>("ondata").map(Value::into_function) {
        Ok(Some(f)) => f,
        _ => {
            tracing::warn!(
                module = %strong.name,
                "{}",
                ScriptError::InvalidParams("http ondata must be a function".into())
            );
            return RESULT_FAIL;
        }
    };

    let request = HttpRequest {
        url,
        post,
        content_type: bindings::get_string(obj, "contentType"),
        headers: bindings::get_string(obj, "headers"),
        user_agent: bindings::get_string(obj, "userAgent"),
        referrer: bindings::get_string(obj, "referrer"),
        origin: bindings::get_string(obj, "origin"),
        cookie: bindings::get_string(obj, "cookie"),
        encoding: bindings::get_string(obj, "encoding"),
        cache_control: bindings::get_string(obj, "cacheControl"),
        accept: bindings::get_string(obj, "accept"),
        etag: bindings::get_string(obj, "etag"),
        if_modified_since: bindings::get_uint64(obj, "ims"),
        conn_timeout: bindings::get_uint(obj, "connTimeout"),
        header_timeout: bindings::get_uint(obj, "headerTimeout"),
        body_timeout: bindings::get_uint(obj, "bodyTimeout"),
        total_timeout: bindings::get_uint(obj, "totalTimeout"),
    };

    let transfer = HttpTransfer {
        module: module.clone(),
        generation: strong.generation.load(Ordering::SeqCst),
        request_obj: Persistent::save(ctx, obj.clone()),
        callback: Persistent::save(ctx, callback),
        status: 0,
        content_type: None,
        body: Vec::new(),
        failed: false,
        closed: false,
    };
    match strong.host.http(request, Box::new(transfer)) {
        Ok(()) => RESULT_OK,
        Err(e) => {
            tracing::warn!(module = %strong.name, error = %e, "host refused http request");
            RESULT_FAIL
        }
    }
}

/// Pending HTTP request context: accumulates the response body and carries
/// the pinned script object and callback until the terminal close.
struct HttpTransfer {
    module: Weak<ModuleInner>,
    generation: u64,
    request_obj: Persistent<Object<'static>>,
    callback: Persistent<Function<'static>>,
    status: u32,
    content_type: Option<String>,
    body: Vec<u8>,
    failed: bool,
    closed: bool,
}

// SAFETY: the `Persistent` fields are only created and restored inside
// `Context::with`, which holds the `parallel` runtime lock.
unsafe impl Send for HttpTransfer {}

impl HttpHandler for HttpTransfer {
    fn on_status(&mut self, status: u32, content_type: Option<&str>) -> ModuleResult {
        self.status = status;
        self.content_type = content_type.map(str::to_owned);
        ModuleResult::Pass
    }

    fn on_data(&mut self, state: HttpState, progress: i64, chunk: &[u8]) -> ModuleResult {
        if self.failed {
            return ModuleResult::Fail;
        }
        if progress < 0 {
            self.failed = true;
            tracing::warn!(progress, "http transfer reported failure");
            return ModuleResult::Fail;
        }
        if state != HttpState::ResponseBody {
            return ModuleResult::Pass;
        }
        if self.body.len() + chunk.len() > RESPONSE_BUFFER_CAP {
            self.failed = true;
            tracing::warn!(
                "{}",
                ScriptError::BufferOverflow {
                    limit: RESPONSE_BUFFER_CAP
                }
            );
            return ModuleResult::Fail;
        }
        self.body.extend_from_slice(chunk);
        ModuleResult::Pass
    }

    fn on_close(&mut self, success: bool) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.failed || !success {
            tracing::debug!(success, "http transfer ended without delivery");
            return;
        }
        self.deliver();
    }
}

impl HttpTransfer {
    /// Re-enter the script exactly once with the completed response
    fn deliver(&self) {
        let _ = module::with_live_session(&self.module, self.generation, |inner, session| {
            let text = String::from_utf8_lossy(&self.body).into_owned();
            session.context.with(|ctx| {
                let invoked = (|| -> rquickjs::Result<()> {
                    let obj = self.request_obj.clone().restore(&ctx)?;
                    obj.set("response", text.as_str())?;
                    obj.set("status", self.status)?;
                    if let Some(ct) = &self.content_type {
                        obj.set("responseType", ct.as_str())?;
                    }
                    let callback = self.callback.clone().restore(&ctx)?;
                    if let Err(caught) = callback.call::<_, Value>((obj,)).catch(&ctx) {
                        report_exception(&caught);
                    }
                    Ok(())
                })();
                if let Err(e) = invoked {
                    tracing::warn!(
                        module = %inner.name,
                        error = %e,
                        "http completion callback failed"
                    );
                }
            });
        });
    }
}
