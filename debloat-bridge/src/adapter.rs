//! Calling-convention adapters.
//!
//! Hosts disagree on how `exec` returns its result. The adapter tries the
//! direct form first and falls back to wrapping a callback in a one-shot
//! channel when the host throws or declares a callback-style arity.

use serde_json::{Map, Value, json};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::error::{BridgeError, HostError};
use crate::host::{ExecCallback, HostCall, HostExec, HostGlobals, HostValue, NamedCallbackArgs};

/// Prefix of the global names used for named callbacks.
pub const CALLBACK_PREFIX: &str = "__debloat_exec_cb_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// `exec(cmd)` returns the result or a promise of it.
    Direct,
    /// `exec(cmd, callback)` with `callback(result, stdout, stderr)`.
    NodeCallback,
    /// `exec(cmd, options, name)`, host calls `name(errno, stdout, stderr)`.
    NamedCallback,
}

impl Convention {
    /// Convention implied by a host function's declared arity.
    pub fn from_arity(arity: usize) -> Self {
        match arity {
            0 | 1 => Convention::Direct,
            2 => Convention::NodeCallback,
            _ => Convention::NamedCallback,
        }
    }
}

/// A discovered host exec, bound to the scope its callbacks live in.
pub struct HostAdapter {
    namespace: String,
    exec: Arc<dyn HostExec>,
    globals: HostGlobals,
}

impl std::fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAdapter")
            .field("namespace", &self.namespace)
            .field("convention", &self.convention())
            .finish()
    }
}

impl HostAdapter {
    pub fn new(namespace: impl Into<String>, exec: Arc<dyn HostExec>, globals: HostGlobals) -> Self {
        Self {
            namespace: namespace.into(),
            exec,
            globals,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn convention(&self) -> Convention {
        Convention::from_arity(self.exec.arity())
    }

    /// Run `command` and return the host's raw result.
    pub async fn invoke(&self, command: &str) -> Result<HostValue, BridgeError> {
        match self.convention() {
            Convention::Direct => match self.exec.call(command) {
                Ok(HostCall::Ready(value)) => Ok(value),
                // A rejected promise means the command was attempted; retrying
                // through a callback would run it twice.
                Ok(HostCall::Pending(pending)) => pending.await.map_err(BridgeError::from),
                Err(err) => {
                    debug!(namespace = %self.namespace, error = %err, "direct exec threw, trying callback form");
                    self.invoke_with_callback(command).await
                }
            },
            Convention::NodeCallback => self.invoke_with_callback(command).await,
            Convention::NamedCallback => self.invoke_with_named_callback(command).await,
        }
    }

    async fn invoke_with_callback(&self, command: &str) -> Result<HostValue, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let callback: ExecCallback = Box::new(move |result, stdout, stderr| {
            let _ = tx.send(callback_result(result, stdout, stderr));
        });

        match self.exec.call_with_callback(command, callback) {
            Ok(()) => rx
                .await
                .map_err(|_| BridgeError::Host("host dropped the exec callback".to_string())),
            Err(HostError::Unsupported) => {
                debug!(namespace = %self.namespace, "no trailing-callback form, trying named callback");
                self.invoke_with_named_callback(command).await
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn invoke_with_named_callback(&self, command: &str) -> Result<HostValue, BridgeError> {
        let name = format!("{CALLBACK_PREFIX}{}", Uuid::new_v4().simple());
        let (guard, rx) = CallbackGuard::register(&self.globals, name);

        self.exec.call_with_named_callback(command, &guard.name)?;

        let args = rx
            .await
            .map_err(|_| BridgeError::Host("host never invoked the exec callback".to_string()))?;
        drop(guard);

        Ok(json!({
            "errno": args.errno,
            "stdout": args.stdout,
            "stderr": args.stderr,
        }))
    }
}

/// Unregisters a named callback when the call completes or is abandoned.
struct CallbackGuard {
    globals: HostGlobals,
    name: String,
}

impl CallbackGuard {
    fn register(globals: &HostGlobals, name: String) -> (Self, oneshot::Receiver<NamedCallbackArgs>) {
        let rx = globals.register_callback(&name);
        let guard = Self {
            globals: globals.clone(),
            name,
        };
        (guard, rx)
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        self.globals.unregister_callback(&self.name);
    }
}

/// Fold `(result, stdout, stderr)` into one object for normalization.
fn callback_result(result: HostValue, stdout: String, stderr: String) -> HostValue {
    let mut object = match result {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        Value::Bool(ok) => Map::from_iter([("success".to_string(), Value::Bool(ok))]),
        Value::String(text) if text.trim().parse::<i64>().is_ok() => {
            Map::from_iter([("code".to_string(), Value::String(text))])
        }
        Value::String(text) if text.is_empty() => Map::new(),
        Value::String(text) => Map::from_iter([
            ("success".to_string(), Value::Bool(false)),
            ("error".to_string(), Value::String(text)),
        ]),
        other => Map::from_iter([("code".to_string(), other)]),
    };

    if !stdout.is_empty() {
        object.entry("stdout").or_insert(Value::String(stdout));
    }
    if !stderr.is_empty() {
        object.entry("stderr").or_insert(Value::String(stderr));
    }
    Value::Object(object)
}
