//! Discovery and the cached bridge handle.
//!
//! Lifecycle: `Uninitialized` until a probe finds a host, then `Discovered`
//! for the rest of the session. Only `reset()` goes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::CommandRunner;
use crate::adapter::HostAdapter;
use crate::error::BridgeError;
use crate::host::HostGlobals;
use crate::normalize::{CommandOutput, normalize};
use crate::observer::CommandObserver;

/// Global names probed for an `exec`, in priority order. `ksu` is the
/// primary API; the rest are used by other root managers and WebUI shells.
pub const NAMESPACES: &[&str] = &["ksu", "kernelsu", "apatch", "mmrl", "webui"];

/// Bounded polling budget for hosts that attach after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay_ms: 200,
        }
    }
}

impl DiscoveryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone)]
enum BridgeState {
    Uninitialized,
    Discovered(Arc<HostAdapter>),
}

pub struct Bridge {
    globals: HostGlobals,
    discovery: DiscoveryConfig,
    state: RwLock<BridgeState>,
    observer: Option<Arc<dyn CommandObserver>>,
}

static GLOBAL_BRIDGE: OnceLock<Bridge> = OnceLock::new();

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("discovery", &self.discovery)
            .field("adapter", &self.adapter())
            .finish()
    }
}

impl Bridge {
    pub fn new(globals: HostGlobals, discovery: DiscoveryConfig) -> Self {
        Self {
            globals,
            discovery,
            state: RwLock::new(BridgeState::Uninitialized),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn CommandObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The process-wide bridge. Defaults to [`HostGlobals::global`] with the
    /// default discovery budget unless [`Bridge::install_global`] ran first.
    pub fn global() -> &'static Bridge {
        GLOBAL_BRIDGE.get_or_init(|| Bridge::new(HostGlobals::global().clone(), DiscoveryConfig::default()))
    }

    /// Install the process-wide bridge. Hands `bridge` back when one is
    /// already installed (explicitly or by an earlier [`Bridge::global`]).
    pub fn install_global(bridge: Bridge) -> Result<&'static Bridge, Bridge> {
        GLOBAL_BRIDGE.set(bridge)?;
        Ok(Bridge::global())
    }

    pub fn globals(&self) -> &HostGlobals {
        &self.globals
    }

    /// The cached adapter, without probing.
    pub fn adapter(&self) -> Option<Arc<HostAdapter>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            BridgeState::Discovered(adapter) => Some(adapter.clone()),
            BridgeState::Uninitialized => None,
        }
    }

    /// One probe over [`NAMESPACES`]. A hit is cached for the session.
    pub fn discover(&self) -> Option<Arc<HostAdapter>> {
        if let Some(adapter) = self.adapter() {
            return Some(adapter);
        }

        let (namespace, exec) = NAMESPACES
            .iter()
            .find_map(|ns| self.globals.lookup(ns).map(|exec| (*ns, exec)))?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race between read and write.
        if let BridgeState::Discovered(adapter) = &*state {
            return Some(adapter.clone());
        }
        let adapter = Arc::new(HostAdapter::new(namespace, exec, self.globals.clone()));
        info!(namespace, convention = ?adapter.convention(), "host exec discovered");
        *state = BridgeState::Discovered(adapter.clone());
        Some(adapter)
    }

    /// Poll for a host within the configured budget.
    pub async fn wait_for_bridge(&self) -> Option<Arc<HostAdapter>> {
        let attempts = self.discovery.attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(adapter) = self.discover() {
                return Some(adapter);
            }
            debug!(attempt, attempts, "no host exec yet");
            if attempt < attempts {
                tokio::time::sleep(self.discovery.delay()).await;
            }
        }
        warn!(attempts, "no host exec API found, bridge unavailable");
        None
    }

    /// Forget the cached adapter; the next call probes again.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = BridgeState::Uninitialized;
    }

    async fn run_on(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        let Some(adapter) = self.discover() else {
            warn!(%command, "bridge unavailable, command not sent");
            return Err(BridgeError::Unavailable);
        };
        let value = adapter.invoke(command).await?;
        Ok(normalize(&value))
    }
}

/// [`CommandRunner`] handle onto [`Bridge::global`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalBridge;

#[async_trait]
impl CommandRunner for GlobalBridge {
    fn is_available(&self) -> bool {
        Bridge::global().is_available()
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        Bridge::global().run(command).await
    }
}

#[async_trait]
impl CommandRunner for Bridge {
    fn is_available(&self) -> bool {
        self.discover().is_some()
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, BridgeError> {
        if let Some(observer) = &self.observer {
            observer.on_start(command);
        }
        info!(%command, "exec");

        let started = Instant::now();
        let outcome = self.run_on(command).await;
        let elapsed = started.elapsed();

        match &outcome {
            Ok(output) => debug!(
                exit_code = output.exit_code,
                stdout_bytes = output.stdout.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "exec finished"
            ),
            Err(err) => warn!(error = %err, "exec failed"),
        }
        if let Some(observer) = &self.observer {
            observer.on_finish(command, &outcome, elapsed);
        }
        outcome
    }
}
