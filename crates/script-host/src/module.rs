//! Module lifecycle adapter between the host and a script session

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;

use courier_protocol::{Host, LoginEvent, MessageParams, ModuleResult};

use crate::runtime::ScriptSession;
use crate::{ScriptConfig, ScriptError};

/// Shared module state. Capability natives hold a `Weak` to this so a
/// dropped module tears the cycle; they must never take the session lock,
/// which is held for the whole of every dispatch.
pub(crate) struct ModuleInner {
    pub(crate) name: String,
    pub(crate) host: Arc<dyn Host>,
    pub(crate) config: ScriptConfig,
    /// Bumped on every successful reload; read by pending async contexts
    /// to refuse delivery into a context they were not created under.
    pub(crate) generation: AtomicU64,
    pub(crate) session: Mutex<Option<ScriptSession>>,
}

/// A loadable module backed by a JavaScript file.
///
/// One engine instance per module; dispatches run to completion under the
/// session lock, so callbacks for a given instance never overlap.
pub struct ScriptModule {
    inner: Arc<ModuleInner>,
}

impl std::fmt::Debug for ScriptModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptModule")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl ScriptModule {
    /// Initialize the module: read configuration, start the engine,
    /// evaluate the script, and resolve its listeners.
    pub fn new(name: impl Into<String>, host: Arc<dyn Host>) -> Result<Self, ScriptError> {
        let name = name.into();
        let config = ScriptConfig::from_host(host.as_ref())?;
        let inner = Arc::new(ModuleInner {
            name,
            host,
            config,
            generation: AtomicU64::new(0),
            session: Mutex::new(None),
        });
        let session = ScriptSession::open(&inner)?;
        *lock_session(&inner) = Some(session);
        tracing::info!(
            module = %inner.name,
            script = %inner.config.script.display(),
            "script module initialized"
        );
        Ok(Self { inner })
    }

    /// Dispatch an incoming message to `courier.onmessage`
    pub fn on_message(
        &self,
        params: &MessageParams,
        body: &[u8],
    ) -> Result<ModuleResult, ScriptError> {
        let started = Instant::now();
        let result = self.with_session(|session| session.run_on_message(params, body));
        self.log_dispatch("onmessage", started, &result);
        result
    }

    /// Dispatch a delivery-status update to `courier.onmessagestatus`.
    /// Scripts without that listener pass the status through.
    pub fn on_message_status(
        &self,
        params: &MessageParams,
        status: u32,
    ) -> Result<ModuleResult, ScriptError> {
        let started = Instant::now();
        let result = self.with_session(|session| session.run_on_message_status(params, status));
        self.log_dispatch("onmessagestatus", started, &result);
        result
    }

    /// Dispatch a login event to `courier.onlogin`
    pub fn on_login(&self, event: &LoginEvent) -> Result<ModuleResult, ScriptError> {
        let started = Instant::now();
        let result = self.with_session(|session| session.run_on_login(event));
        self.log_dispatch("onlogin", started, &result);
        result
    }

    /// Drop the engine. Further dispatches fail with an init error.
    pub fn on_cleanup(&self) {
        *lock_session(&self.inner) = None;
        tracing::info!(module = %self.inner.name, "script module cleaned up");
    }

    fn with_session<R>(
        &self,
        f: impl FnOnce(&ScriptSession) -> Result<R, ScriptError>,
    ) -> Result<R, ScriptError> {
        let mut guard = lock_session(&self.inner);
        let session = guard
            .as_mut()
            .ok_or_else(|| ScriptError::Init("module already cleaned up".into()))?;
        session.ensure_current(&self.inner);
        f(session)
    }

    fn log_dispatch(&self, listener: &str, started: Instant, result: &Result<ModuleResult, ScriptError>) {
        let elapsed_us = started.elapsed().as_micros() as u64;
        if self.inner.config.log > 0 {
            tracing::info!(module = %self.inner.name, listener, elapsed_us, ?result, "dispatch");
        } else {
            tracing::debug!(module = %self.inner.name, listener, elapsed_us, ?result, "dispatch");
        }
    }
}

pub(crate) fn lock_session(
    inner: &ModuleInner,
) -> std::sync::MutexGuard<'_, Option<ScriptSession>> {
    inner
        .session
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` against the module's session on behalf of a pending async
/// context created at `generation`. Refuses delivery when the module is
/// gone, cleaned up, or has been reloaded since the context was created.
pub(crate) fn with_live_session<R>(
    module: &Weak<ModuleInner>,
    generation: u64,
    f: impl FnOnce(&ModuleInner, &ScriptSession) -> R,
) -> Option<R> {
    let module = module.upgrade()?;
    let mut guard = lock_session(&module);
    let session = guard.as_mut()?;
    session.ensure_current(&module);
    if module.generation.load(Ordering::SeqCst) != generation {
        tracing::warn!(module = %module.name, "{}", ScriptError::StaleContext);
        return None;
    }
    Some(f(&module, session))
}
