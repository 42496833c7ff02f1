use std::fmt;

use debloat_codec::Counts;
use tracing::{info, warn};

use crate::editor::{ApplyOutcome, LoadSource};

/// One line for the status bar, worded for the WebUI's Chinese UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Loading,
    Loaded { source: LoadSource, counts: Counts },
    Empty { preview: String },
    LoadFailed(String),
    Saving,
    Saved { apply: ApplyOutcome },
    SaveFailed(String),
}

impl Status {
    pub fn is_error(&self) -> bool {
        matches!(self, Status::LoadFailed(_) | Status::SaveFailed(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Loading => write!(f, "加载中..."),
            Status::Loaded { source, counts } => {
                write!(f, "已加载: 启用 {} 个, 禁用 {} 个", counts.enabled, counts.disabled)?;
                if *source == LoadSource::Static {
                    write!(f, " (只读副本)")?;
                }
                Ok(())
            }
            Status::Empty { preview } => write!(f, "已加载, 但未找到分组: {preview}"),
            Status::LoadFailed(message) => write!(f, "加载失败: {message}"),
            Status::Saving => write!(f, "保存中..."),
            Status::Saved { apply } => match apply {
                ApplyOutcome::Skipped => write!(f, "保存成功"),
                ApplyOutcome::Triggered => write!(f, "保存成功 (已触发应用)"),
                ApplyOutcome::Completed { .. } => write!(f, "保存成功 (已应用)"),
                ApplyOutcome::Failed { message } => write!(f, "保存成功 (应用失败: {message})"),
            },
            Status::SaveFailed(message) => write!(f, "保存失败: {message}"),
        }
    }
}

pub trait StatusSink: Send + Sync {
    fn set_status(&self, status: &Status);
}

/// Default sink: status lines go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn set_status(&self, status: &Status) {
        if status.is_error() {
            warn!(status = %status, "status");
        } else {
            info!(status = %status, "status");
        }
    }
}
