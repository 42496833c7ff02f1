//! The editor session.
//!
//! Owns the in-memory [`Document`] between loads. `load` and `save` take
//! `&mut self`, so operations never overlap, and a save's reload always runs
//! after the save command (and a foreground apply) returned.

use std::sync::Arc;

use debloat_bridge::{Bridge, BridgeError, CommandRunner, GlobalBridge, HostGlobals};
use debloat_codec::{Counts, Document, Entry, parse, serialize};
use serde::Serialize;
use tracing::{info, warn};

use crate::commands;
use crate::config::{EditorConfig, ReadMode};
use crate::error::EditorError;
use crate::source::{HttpSource, StaticSource};
use crate::status::{Status, StatusSink, TracingStatus};
use crate::steplog::StepLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoadSource {
    Bridge,
    /// Read-only webroot copy; saving still needs the bridge.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    #[default]
    None,
    /// Detached with `nohup`; returns as soon as the script is started.
    Background,
    /// Waits for the script and captures its combined output.
    Foreground,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Skipped,
    Triggered,
    Completed { output: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub source: LoadSource,
    pub counts: Counts,
    /// Set when the document parsed to zero groups.
    pub warning: Option<EditorError>,
}

/// Only produced once the write went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub apply: ApplyOutcome,
    /// A failed reload leaves the saved document in memory.
    pub reload: Result<LoadReport, EditorError>,
}

pub struct Editor {
    config: EditorConfig,
    runner: Arc<dyn CommandRunner>,
    fallback: Option<Arc<dyn StaticSource>>,
    status: Arc<dyn StatusSink>,
    steps: Option<Arc<StepLog>>,
    document: Option<Document>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("config", &self.config)
            .field("has_fallback", &self.fallback.is_some())
            .field("loaded", &self.document.is_some())
            .finish()
    }
}

impl Editor {
    /// The static fallback comes from `config.static_base_url` when set.
    pub fn new(config: EditorConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let fallback = HttpSource::from_config(&config)
            .map(|source| Arc::new(source) as Arc<dyn StaticSource>);
        Self {
            config,
            runner,
            fallback,
            status: Arc::new(TracingStatus),
            steps: None,
            document: None,
        }
    }

    /// Editor over the process-wide bridge, then waits for a host to attach.
    ///
    /// The first editor installs the bridge with this config's discovery
    /// budget and a step log. Later ones reuse it as is and get no step log.
    pub async fn start(config: EditorConfig) -> Self {
        let steps = Arc::new(StepLog::default());
        let bridge = Bridge::new(HostGlobals::global().clone(), config.discovery)
            .with_observer(steps.clone());
        let (global, steps) = match Bridge::install_global(bridge) {
            Ok(global) => (global, Some(steps)),
            Err(_) => {
                warn!(
                    discovery = ?config.discovery,
                    "process-wide bridge already installed, reusing it without this discovery budget or a step log"
                );
                (Bridge::global(), None)
            }
        };
        if global.wait_for_bridge().await.is_none() {
            warn!("starting without a bridge, saving is disabled");
        }
        let mut editor = Self::new(config, Arc::new(GlobalBridge));
        editor.steps = steps;
        editor
    }

    /// Editor over a private bridge on `globals`.
    pub async fn attach(config: EditorConfig, globals: HostGlobals) -> Self {
        let steps = Arc::new(StepLog::default());
        let bridge = Bridge::new(globals, config.discovery).with_observer(steps.clone());
        if bridge.wait_for_bridge().await.is_none() {
            warn!("starting without a bridge, saving is disabled");
        }
        Self::new(config, Arc::new(bridge)).with_steps(steps)
    }

    pub fn with_fallback(mut self, source: Arc<dyn StaticSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }

    pub fn with_status(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    pub fn with_steps(mut self, steps: Arc<StepLog>) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn steps(&self) -> Option<&Arc<StepLog>> {
        self.steps.as_ref()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn counts(&self) -> Counts {
        self.document.as_ref().map(Document::counts).unwrap_or_default()
    }

    /// Whether saving can reach the device right now.
    pub fn can_save(&self) -> bool {
        self.document.is_some() && self.runner.is_available()
    }

    // ========================================================================
    // Editing
    // ========================================================================

    pub fn set_enabled(&mut self, group: usize, item: usize, enabled: bool) -> bool {
        self.document
            .as_mut()
            .is_some_and(|doc| doc.set_enabled(group, item, enabled))
    }

    pub fn set_group_enabled(&mut self, group: usize, enabled: bool) -> usize {
        self.document
            .as_mut()
            .map_or(0, |doc| doc.set_group_enabled(group, enabled))
    }

    /// Flip a visible entry by identifier. Returns the new state.
    pub fn toggle(&mut self, identifier: &str) -> Option<bool> {
        let entry: &mut Entry = self.document.as_mut()?.find_entry_mut(identifier)?;
        entry.enabled = !entry.enabled;
        Some(entry.enabled)
    }

    // ========================================================================
    // Load
    // ========================================================================

    pub async fn load(&mut self) -> Result<LoadReport, EditorError> {
        self.status.set_status(&Status::Loading);

        let (text, source) = match self.read_text().await {
            Ok(read) => read,
            Err(err) => {
                warn!(error = %err, "load failed, keeping previous document");
                self.status.set_status(&Status::LoadFailed(err.to_string()));
                return Err(err);
            }
        };

        let document = parse(&text);
        let counts = document.counts();
        let warning = if document.groups.is_empty() {
            let preview = preview(&text, self.config.preview_chars);
            warn!(%preview, "document parsed to zero groups");
            Some(EditorError::ParseEmpty { preview })
        } else {
            None
        };

        info!(
            ?source,
            groups = document.groups.len(),
            enabled = counts.enabled,
            disabled = counts.disabled,
            ignored = counts.ignored,
            "document loaded"
        );
        self.document = Some(document);

        match &warning {
            Some(EditorError::ParseEmpty { preview }) => self.status.set_status(&Status::Empty {
                preview: preview.clone(),
            }),
            _ => self.status.set_status(&Status::Loaded { source, counts }),
        }

        Ok(LoadReport {
            source,
            counts,
            warning,
        })
    }

    async fn read_text(&self) -> Result<(String, LoadSource), EditorError> {
        let bridged = if self.runner.is_available() {
            self.read_via_bridge().await
        } else {
            Err(EditorError::BridgeUnavailable)
        };

        let reason = match bridged {
            Ok(text) if !text.trim().is_empty() => return Ok((text, LoadSource::Bridge)),
            Ok(text) => match &self.fallback {
                Some(_) => "bridge returned an empty document",
                None => return Ok((text, LoadSource::Bridge)),
            },
            Err(EditorError::BridgeUnavailable) if self.fallback.is_some() => "bridge unavailable",
            Err(err) => return Err(err),
        };

        let Some(fallback) = &self.fallback else {
            return Err(EditorError::BridgeUnavailable);
        };
        warn!(reason, "falling back to static document");
        let text = fallback.fetch_document().await?;
        Ok((text, LoadSource::Static))
    }

    async fn read_via_bridge(&self) -> Result<String, EditorError> {
        let output = self
            .runner
            .execute(&commands::read_document(&self.config))
            .await?;
        match self.config.read_mode {
            ReadMode::Plain => Ok(output),
            ReadMode::Base64 => commands::decode_payload(&output),
        }
    }

    // ========================================================================
    // Save / apply
    // ========================================================================

    /// Write the document back, apply per `mode`, then reload.
    ///
    /// Errors only when the write itself failed; apply and reload failures
    /// are reported inside the [`SaveReport`].
    pub async fn save(&mut self, mode: ApplyMode) -> Result<SaveReport, EditorError> {
        let Some(document) = &self.document else {
            return Err(EditorError::NothingLoaded);
        };
        self.status.set_status(&Status::Saving);

        let text = serialize(document);
        let payload = commands::encode_payload(&text);
        if let Err(err) = self.write_payload(&payload).await {
            warn!(error = %err, "save failed, edits kept in memory");
            self.status.set_status(&Status::SaveFailed(err.to_string()));
            return Err(err);
        }
        info!(bytes = text.len(), strategy = ?self.config.save_strategy, "document saved");

        let apply = self.apply(mode).await;
        let reload = self.load().await;
        if let Err(err) = &reload {
            warn!(error = %err, "reload after save failed, keeping the saved document");
        }
        self.status.set_status(&Status::Saved {
            apply: apply.clone(),
        });
        Ok(SaveReport { apply, reload })
    }

    async fn write_payload(&self, payload: &str) -> Result<(), EditorError> {
        if !self.runner.is_available() {
            return Err(EditorError::BridgeUnavailable);
        }
        self.runner
            .execute(&commands::save_document(&self.config, payload))
            .await?;
        Ok(())
    }

    /// Run the apply script. Failures are reported, never raised.
    pub async fn apply(&self, mode: ApplyMode) -> ApplyOutcome {
        let Some(command) = commands::apply(&self.config, mode) else {
            return ApplyOutcome::Skipped;
        };

        let outcome = match mode {
            ApplyMode::None => ApplyOutcome::Skipped,
            ApplyMode::Background => match self.runner.execute(&command).await {
                Ok(_) => ApplyOutcome::Triggered,
                Err(err) => ApplyOutcome::Failed {
                    message: EditorError::from(err).to_string(),
                },
            },
            ApplyMode::Foreground => match self.runner.run(&command).await {
                Ok(output) if output.success() => ApplyOutcome::Completed {
                    output: output.stdout,
                },
                Ok(output) => {
                    // stderr is folded into stdout by `2>&1`.
                    let detail = if output.stderr.trim().is_empty() {
                        &output.stdout
                    } else {
                        &output.stderr
                    };
                    ApplyOutcome::Failed {
                        message: BridgeError::command_failed(output.exit_code, detail).to_string(),
                    }
                }
                Err(err) => ApplyOutcome::Failed {
                    message: EditorError::from(err).to_string(),
                },
            },
        };

        match &outcome {
            ApplyOutcome::Failed { message } => warn!(%message, ?mode, "apply failed"),
            _ => info!(?mode, "apply finished"),
        }
        outcome
    }
}

/// First `limit` chars with line breaks folded to single spaces.
fn preview(text: &str, limit: usize) -> String {
    let head: String = text.chars().take(limit).collect();
    let mut out = String::with_capacity(head.len());
    let mut in_break = false;
    for c in head.chars() {
        if c == '\n' || c == '\r' {
            if !in_break {
                out.push(' ');
            }
            in_break = true;
        } else {
            out.push(c);
            in_break = false;
        }
    }
    out
}
