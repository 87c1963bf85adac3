//! QuickJS session for one script module instance
//!
//! A session owns the runtime and the current context. The context is
//! rebuilt from scratch whenever the script file changes on disk; the
//! runtime survives reloads so pending values stay restorable.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::SystemTime;

use courier_protocol::{LoginEvent, MessageParams, ModuleResult};
use rquickjs::convert::Coerced;
use rquickjs::function::{Func, Rest};
use rquickjs::{
    CatchResultExt, CaughtError, Context, Ctx, Function, Object, Persistent, Runtime, Value,
};

use crate::module::ModuleInner;
use crate::{bindings, http, message, socket, ScriptError};

/// Bootstrap evaluated into every context before the user script; defines
/// the Message/Http/Socket classes over the hidden natives.
const PRELUDE: &str = include_str!("prelude.js");

/// Live engine state for one module instance
///
/// Field order matters: the pinned listeners must drop before the context
/// and runtime, or QuickJS aborts on `JS_FreeRuntime` with live GC objects.
pub struct ScriptSession {
    listeners: Listeners,
    pub(crate) context: Context,
    runtime: Runtime,
    path: PathBuf,
    mtime: Option<SystemTime>,
}

struct Listeners {
    on_message: Persistent<Function<'static>>,
    on_message_status: Option<Persistent<Function<'static>>>,
    on_login: Option<Persistent<Function<'static>>>,
}

impl ScriptSession {
    /// Create the runtime, evaluate the script, and resolve its listeners
    pub(crate) fn open(module: &Arc<ModuleInner>) -> Result<Self, ScriptError> {
        let runtime = Runtime::new().map_err(|e| ScriptError::Init(e.to_string()))?;
        let path = module.config.script.clone();
        let mtime = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
        let (context, listeners) = build_context(&runtime, module)?;
        Ok(Self {
            runtime,
            context,
            path,
            mtime,
            listeners,
        })
    }

    /// Reload the script if its file changed on disk.
    ///
    /// A failed stat or a failed reload keeps the current context serving.
    /// The observed mtime is recorded before the attempt, so a broken script
    /// is compiled once per edit, not once per dispatch. The generation
    /// advances only on a successful reload.
    pub(crate) fn ensure_current(&mut self, module: &Arc<ModuleInner>) {
        let current = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(
                    module = %module.name,
                    path = %self.path.display(),
                    error = %e,
                    "script stat failed, keeping current context"
                );
                return;
            }
        };
        if self.mtime == Some(current) {
            return;
        }
        self.mtime = Some(current);
        match build_context(&self.runtime, module) {
            Ok((context, listeners)) => {
                self.context = context;
                self.listeners = listeners;
                let generation = module.generation.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::info!(
                    module = %module.name,
                    generation,
                    path = %self.path.display(),
                    "script reloaded"
                );
            }
            Err(e) => {
                tracing::warn!(
                    module = %module.name,
                    error = %e,
                    "script reload failed, keeping previous context"
                );
            }
        }
    }

    pub(crate) fn run_on_message(
        &self,
        params: &MessageParams,
        body: &[u8],
    ) -> Result<ModuleResult, ScriptError> {
        self.context.with(|ctx| {
            let func = restore(&ctx, &self.listeners.on_message)?;
            let msg = bindings::message_to_object(&ctx, params, body)
                .map_err(|e| ScriptError::Runtime(e.to_string()))?;
            let res = func.call::<_, Value>((msg,));
            Ok(listener_outcome(&ctx, res))
        })
    }

    pub(crate) fn run_on_message_status(
        &self,
        params: &MessageParams,
        status: u32,
    ) -> Result<ModuleResult, ScriptError> {
        let Some(listener) = &self.listeners.on_message_status else {
            return Ok(ModuleResult::Pass);
        };
        self.context.with(|ctx| {
            let func = restore(&ctx, listener)?;
            let obj = bindings::params_to_object(&ctx, params)
                .map_err(|e| ScriptError::Runtime(e.to_string()))?;
            let res = func.call::<_, Value>((obj, status));
            Ok(listener_outcome(&ctx, res))
        })
    }

    pub(crate) fn run_on_login(&self, event: &LoginEvent) -> Result<ModuleResult, ScriptError> {
        let Some(listener) = &self.listeners.on_login else {
            return Ok(ModuleResult::Pass);
        };
        self.context.with(|ctx| {
            let func = restore(&ctx, listener)?;
            let user = bindings::login_to_object(&ctx, event)
                .map_err(|e| ScriptError::Runtime(e.to_string()))?;
            let res = func.call::<_, Value>((user,));
            Ok(listener_outcome(&ctx, res))
        })
    }
}

fn restore<'js>(
    ctx: &Ctx<'js>,
    listener: &Persistent<Function<'static>>,
) -> Result<Function<'js>, ScriptError> {
    listener
        .clone()
        .restore(ctx)
        .map_err(|e| ScriptError::Runtime(e.to_string()))
}

/// Fresh context: natives, bootstrap, user script, listener resolution
fn build_context(
    runtime: &Runtime,
    module: &Arc<ModuleInner>,
) -> Result<(Context, Listeners), ScriptError> {
    let path = &module.config.script;
    let source = std::fs::read_to_string(path).map_err(|e| ScriptError::Load {
        path: path.clone(),
        source: e,
    })?;
    let context = Context::full(runtime).map_err(|e| ScriptError::Init(e.to_string()))?;
    let listeners = context.with(|ctx| -> Result<Listeners, ScriptError> {
        install_bindings(&ctx, module).map_err(|e| ScriptError::Init(e.to_string()))?;
        ctx.eval::<(), _>(PRELUDE)
            .catch(&ctx)
            .map_err(|e| ScriptError::Init(format!("bootstrap evaluation failed: {e}")))?;
        if let Err(e) = ctx.eval::<Value, _>(source) {
            return Err(classify_eval_error(&ctx, e));
        }
        resolve_listeners(&ctx)
    })?;
    Ok((context, listeners))
}

fn install_bindings(ctx: &Ctx<'_>, module: &Arc<ModuleInner>) -> rquickjs::Result<()> {
    let globals = ctx.globals();

    let ns = Object::new(ctx.clone())?;
    let name = module.name.clone();
    ns.set(
        "log",
        Func::from(move |args: Rest<Coerced<String>>| {
            let line = args
                .0
                .iter()
                .map(|a| a.0.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            tracing::info!(module = %name, "{line}");
        }),
    )?;
    ns.set("RESULT_OK", courier_protocol::RESULT_OK)?;
    ns.set("RESULT_FAIL", courier_protocol::RESULT_FAIL)?;
    globals.set("courier", ns)?;

    let weak = Arc::downgrade(module);
    message::install(&globals, weak.clone())?;
    http::install(&globals, weak.clone())?;
    socket::install(&globals, weak)?;
    Ok(())
}

fn resolve_listeners(ctx: &Ctx<'_>) -> Result<Listeners, ScriptError> {
    let ns: Object = ctx
        .globals()
        .get("courier")
        .map_err(|e| ScriptError::Runtime(e.to_string()))?;
    let on_message =
        optional_listener(ctx, &ns, "onmessage")?.ok_or(ScriptError::MissingListener("onmessage"))?;
    let on_message_status = optional_listener(ctx, &ns, "onmessagestatus")?;
    let on_login = optional_listener(ctx, &ns, "onlogin")?;
    Ok(Listeners {
        on_message,
        on_message_status,
        on_login,
    })
}

fn optional_listener<'js>(
    ctx: &Ctx<'js>,
    ns: &Object<'js>,
    name: &'static str,
) -> Result<Option<Persistent<Function<'static>>>, ScriptError> {
    let value: Value = ns
        .get(name)
        .map_err(|e| ScriptError::Runtime(e.to_string()))?;
    if value.is_undefined() || value.is_null() {
        return Ok(None);
    }
    let Some(func) = value.into_function() else {
        return Err(ScriptError::MissingListener(name));
    };
    Ok(Some(Persistent::save(ctx, func)))
}

/// Enforce the integer-result contract and the exception policy on a
/// listener call: a non-integer result or an uncaught exception is a
/// failure, never an error propagated to the host.
pub(crate) fn listener_outcome<'js>(
    ctx: &Ctx<'js>,
    res: rquickjs::Result<Value<'js>>,
) -> ModuleResult {
    match res.catch(ctx) {
        Ok(value) => {
            if let Some(code) = value.as_int() {
                return ModuleResult::from_code(code);
            }
            if let Some(n) = value.as_number() {
                if n.fract() == 0.0 {
                    return ModuleResult::from_code(n as i32);
                }
            }
            tracing::warn!(
                kind = ?value.type_of(),
                "listener returned a non-integer result"
            );
            ModuleResult::Fail
        }
        Err(caught) => {
            report_exception(&caught);
            ModuleResult::Fail
        }
    }
}

pub(crate) fn report_exception(caught: &CaughtError<'_>) {
    match caught {
        CaughtError::Exception(ex) => {
            let text = ex.message().unwrap_or_else(|| "<no message>".into());
            tracing::warn!(
                stack = ex.stack().as_deref().unwrap_or(""),
                "{}",
                ScriptError::ScriptException(text)
            );
        }
        other => tracing::warn!("script call failed: {other}"),
    }
}

/// Distinguish a script that would not parse from one that blew up while
/// running its top level.
fn classify_eval_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> ScriptError {
    if !matches!(err, rquickjs::Error::Exception) {
        return ScriptError::Runtime(err.to_string());
    }
    let exception = ctx.catch();
    let name = exception
        .as_object()
        .and_then(|o| o.get::<_, Option<Coerced<String>>>("name").ok().flatten())
        .map(|c| c.0);
    let text = describe_exception(&exception);
    match name.as_deref() {
        Some("SyntaxError") => ScriptError::Compile(text),
        _ => ScriptError::Runtime(text),
    }
}

fn describe_exception(exception: &Value<'_>) -> String {
    let Some(obj) = exception.as_object() else {
        return format!("exception of type {:?}", exception.type_of());
    };
    let name = obj
        .get::<_, Option<Coerced<String>>>("name")
        .ok()
        .flatten()
        .map(|c| c.0)
        .unwrap_or_else(|| "Error".into());
    let message = obj
        .get::<_, Option<Coerced<String>>>("message")
        .ok()
        .flatten()
        .map(|c| c.0)
        .unwrap_or_default();
    match obj
        .get::<_, Option<Coerced<String>>>("stack")
        .ok()
        .flatten()
    {
        Some(stack) if !stack.0.is_empty() => format!("{name}: {message}\n{}", stack.0),
        _ => format!("{name}: {message}"),
    }
}
