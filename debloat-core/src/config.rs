use anyhow::Context;
use debloat_bridge::DiscoveryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EditorError;

/// Where root managers mount module directories.
pub const MODULES_DIR: &str = "/data/adb/modules";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// `cat` the document.
    Plain,
    /// `base64` the document and decode locally. Survives hosts that mangle
    /// non-ASCII stdout.
    #[default]
    Base64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStrategy {
    /// Hand the payload to the module's save script.
    #[default]
    Script,
    /// Decode, replace and mirror the document in one shell pipeline.
    Inline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub module_id: String,
    /// Defaults to `/data/adb/modules/<module_id>`.
    pub module_root: Option<String>,
    pub document_name: String,
    pub save_script: String,
    pub apply_script: String,
    pub read_mode: ReadMode,
    pub save_strategy: SaveStrategy,
    /// Origin serving the webroot copy of the document. No fallback when unset.
    pub static_base_url: Option<String>,
    pub preview_chars: usize,
    pub discovery: DiscoveryConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            module_id: "coloros16_debloat".to_string(),
            module_root: None,
            document_name: "packages.txt".to_string(),
            save_script: "webui_save.sh".to_string(),
            apply_script: "apply_now.sh".to_string(),
            read_mode: ReadMode::default(),
            save_strategy: SaveStrategy::default(),
            static_base_url: None,
            preview_chars: 200,
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl EditorConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, EditorError> {
        toml::from_str(text).map_err(|e| EditorError::Config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading editor config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("parsing editor config {}", path.display()))?;
        Ok(config)
    }

    pub fn module_root(&self) -> String {
        match &self.module_root {
            Some(root) => root.trim_end_matches('/').to_string(),
            None => format!("{MODULES_DIR}/{}", self.module_id),
        }
    }

    pub fn document_path(&self) -> String {
        self.in_module(&self.document_name)
    }

    /// The copy served to the WebUI (and to the static fallback).
    pub fn webroot_document_path(&self) -> String {
        format!("{}/webroot/{}", self.module_root(), self.document_name)
    }

    pub fn save_script_path(&self) -> String {
        self.in_module(&self.save_script)
    }

    pub fn apply_script_path(&self) -> String {
        self.in_module(&self.apply_script)
    }

    fn in_module(&self, name: &str) -> String {
        if name.starts_with('/') {
            name.to_string()
        } else {
            format!("{}/{}", self.module_root(), name)
        }
    }
}
