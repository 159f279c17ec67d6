use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::models::Volume;

/// How volumes with the same label are laid out under the destination root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LabelCollision {
    /// `root/<label>`; devices sharing a label write into the same tree.
    #[default]
    Merge,
    /// `root/<label>-<device id>`; every device gets its own tree.
    SuffixDeviceId,
}

/// Derives each volume's archive directory from an immutable root.
#[derive(Debug, Clone)]
pub struct DestinationLayout {
    root: PathBuf,
    collision: LabelCollision,
}

impl DestinationLayout {
    pub fn new(root: impl Into<PathBuf>, collision: LabelCollision) -> Self {
        Self {
            root: root.into(),
            collision,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn destination_for(&self, volume: &Volume) -> PathBuf {
        let id = path_component(&volume.device_id);
        let name = match (self.collision, volume.label.is_empty()) {
            (_, true) => id,
            (LabelCollision::Merge, false) => path_component(&volume.label),
            (LabelCollision::SuffixDeviceId, false) => {
                format!("{}-{}", path_component(&volume.label), id)
            }
        };
        self.root.join(name)
    }
}

/// Turn arbitrary label text into a single, non-traversing path component.
fn path_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
