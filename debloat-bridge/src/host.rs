//! The host side: the global scope a root manager attaches its `exec` to.
//!
//! Hosts may attach after the page has loaded, so nothing here assumes the
//! table is populated when the editor starts.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::HostError;

/// Values crossing the host boundary are untyped JSON.
pub type HostValue = serde_json::Value;

/// Trailing Node-style callback: `(result, stdout, stderr)`.
pub type ExecCallback = Box<dyn FnOnce(HostValue, String, String) + Send>;

/// What a direct `exec(cmd)` call hands back.
pub enum HostCall {
    /// A plain value.
    Ready(HostValue),
    /// A promise.
    Pending(BoxFuture<'static, Result<HostValue, HostError>>),
}

impl std::fmt::Debug for HostCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostCall::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            HostCall::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// A host-supplied `exec` function.
///
/// A host implements the conventions it understands; the others keep their
/// default `Unsupported` answer.
pub trait HostExec: Send + Sync {
    /// Declared parameter count, the only hint a host gives about its
    /// calling convention.
    fn arity(&self) -> usize {
        1
    }

    /// `exec(cmd)`: the result directly, or a promise of it.
    fn call(&self, command: &str) -> Result<HostCall, HostError>;

    /// `exec(cmd, callback)` with `callback(result, stdout, stderr)`.
    fn call_with_callback(&self, command: &str, callback: ExecCallback) -> Result<(), HostError> {
        let _ = (command, callback);
        Err(HostError::Unsupported)
    }

    /// `exec(cmd, "{}", name)`: the host later calls the global function
    /// `name(errno, stdout, stderr)` through [`HostGlobals::invoke_callback`].
    fn call_with_named_callback(&self, command: &str, callback_name: &str) -> Result<(), HostError> {
        let _ = (command, callback_name);
        Err(HostError::Unsupported)
    }
}

/// Arguments a host passes to a named global callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedCallbackArgs {
    pub errno: i64,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Default)]
struct GlobalsInner {
    namespaces: RwLock<HashMap<String, Arc<dyn HostExec>>>,
    callbacks: Mutex<HashMap<String, oneshot::Sender<NamedCallbackArgs>>>,
}

/// The global scope: exec objects by namespace, plus one-shot callbacks.
#[derive(Clone, Default)]
pub struct HostGlobals {
    inner: Arc<GlobalsInner>,
}

static GLOBAL_SCOPE: OnceLock<HostGlobals> = OnceLock::new();

impl std::fmt::Debug for HostGlobals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self
            .inner
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        f.debug_struct("HostGlobals")
            .field("namespaces", &names)
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

impl HostGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide scope hosts attach to.
    pub fn global() -> &'static HostGlobals {
        GLOBAL_SCOPE.get_or_init(HostGlobals::new)
    }

    /// Expose `exec` under `namespace` (e.g. `ksu`).
    pub fn attach(&self, namespace: impl Into<String>, exec: Arc<dyn HostExec>) {
        let namespace = namespace.into();
        debug!(%namespace, "host exec attached");
        self.inner
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(namespace, exec);
    }

    pub fn detach(&self, namespace: &str) -> bool {
        self.inner
            .namespaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(namespace)
            .is_some()
    }

    pub fn lookup(&self, namespace: &str) -> Option<Arc<dyn HostExec>> {
        self.inner
            .namespaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(namespace)
            .cloned()
    }

    /// Called by the host: fire the global callback `name` exactly once.
    /// Returns false if no such callback is registered (already fired or
    /// never existed).
    pub fn invoke_callback(&self, name: &str, errno: i64, stdout: &str, stderr: &str) -> bool {
        let Some(sender) = self.callbacks().remove(name) else {
            warn!(%name, "host invoked unknown callback");
            return false;
        };
        let args = NamedCallbackArgs {
            errno,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        };
        // The waiting side may have given up; the entry is gone either way.
        let _ = sender.send(args);
        true
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks().len()
    }

    pub(crate) fn register_callback(&self, name: &str) -> oneshot::Receiver<NamedCallbackArgs> {
        let (tx, rx) = oneshot::channel();
        self.callbacks().insert(name.to_string(), tx);
        rx
    }

    pub(crate) fn unregister_callback(&self, name: &str) -> bool {
        self.callbacks().remove(name).is_some()
    }

    fn callbacks(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<NamedCallbackArgs>>> {
        self.inner
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
