//! Console presentation of status events.
//!
//! Every event becomes zero or more `[volarchd] Label: value` lines on stdout.

use std::fmt;

use crossterm::style::Stylize;

use crate::core::events::{EventReceiver, StatusEvent};

const APP_TAG: &str = "volarchd";
const RULE: &str = "=========================================";

/// The value half of a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusValue {
    Text(String),
    Bytes(u64),
    Count(u64),
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Bytes(bytes) => f.write_str(&format_bytes(*bytes)),
            Self::Count(count) => write!(f, "{count}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Rule,
    Status {
        label: &'static str,
        value: Option<StatusValue>,
    },
}

impl ConsoleLine {
    fn status(label: &'static str, value: StatusValue) -> Self {
        Self::Status {
            label,
            value: Some(value),
        }
    }

    /// An empty text renders as the label alone.
    fn text(label: &'static str, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::heading(label);
        }
        Self::status(label, StatusValue::Text(text))
    }

    fn heading(label: &'static str) -> Self {
        Self::Status { label, value: None }
    }

    pub fn plain(&self) -> String {
        match self {
            Self::Rule => RULE.to_string(),
            Self::Status { label, value: None } => format!("[{APP_TAG}] {label}"),
            Self::Status {
                label,
                value: Some(value),
            } => format!("[{APP_TAG}] {label}: {value}"),
        }
    }

    pub fn styled(&self) -> String {
        match self {
            Self::Rule => RULE.to_string(),
            Self::Status { label, value } => {
                let mut line = format!(
                    "{}{}{} {}",
                    "[".blue(),
                    APP_TAG.cyan(),
                    "]".blue(),
                    label.green()
                );
                if let Some(value) = value {
                    line.push_str(&format!("{}{}", ": ".white(), value.to_string().yellow()));
                }
                line
            }
        }
    }
}

pub fn lines_for(event: &StatusEvent) -> Vec<ConsoleLine> {
    match event {
        StatusEvent::DeviceDetected(volume) => vec![
            ConsoleLine::Rule,
            ConsoleLine::heading("USB Device Detected"),
            ConsoleLine::text("Mount Path", volume.mount_path.display().to_string()),
            ConsoleLine::text("Device ID", volume.device_id.clone()),
            ConsoleLine::status("Capacity", StatusValue::Bytes(volume.capacity)),
            ConsoleLine::status("Free Space", StatusValue::Bytes(volume.free)),
            ConsoleLine::status("Used Space", StatusValue::Bytes(volume.used_bytes())),
            ConsoleLine::text("File System", volume.filesystem.clone()),
            ConsoleLine::text("Label", volume.label.clone()),
            ConsoleLine::Rule,
        ],
        StatusEvent::VolumeRejected { volume, reason } => vec![ConsoleLine::text(
            "Skipping Volume",
            format!("{} ({reason})", volume.device_id),
        )],
        StatusEvent::DirectoryCreated { source, .. } => {
            vec![ConsoleLine::text("Creating Directory", source.display().to_string())]
        }
        StatusEvent::FileCopyStarted { source, .. } => {
            vec![ConsoleLine::text("Copying File", source.display().to_string())]
        }
        StatusEvent::VolumeArchived {
            destination,
            result,
            finished_at,
            ..
        } => vec![
            ConsoleLine::Rule,
            ConsoleLine::text("Archived To", destination.display().to_string()),
            ConsoleLine::status("Files Copied", StatusValue::Count(result.files_copied)),
            ConsoleLine::status("Data Copied", StatusValue::Bytes(result.total_bytes)),
            ConsoleLine::text("Finished At", finished_at.format("%H:%M:%S").to_string()),
            ConsoleLine::heading("Done. Waiting for new USB to be plugged in."),
            ConsoleLine::Rule,
        ],
        StatusEvent::VolumeFailed { volume, error } => vec![ConsoleLine::text(
            "Archive Failed",
            format!("{}: {error}", volume.device_id),
        )],
        StatusEvent::CycleComplete(_) => Vec::new(),
    }
}

/// Drain the event channel until every sender is gone.
pub async fn run(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        for line in lines_for(&event) {
            println!("{}", line.styled());
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}
