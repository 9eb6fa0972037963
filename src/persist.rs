//! Versioned JSON snapshots of a collection.
//!
//! A snapshot stores identity and ROI state only — never datasets — so a
//! reloaded collection always starts with every entry unloaded and is
//! repopulated through the batch loader. Older snapshot versions are
//! mapped to the current shape by one migration function; defaults for
//! fields a version lacked are applied there and nowhere else.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::collection::ImageCollection;
use crate::data::entry::{ImageEntry, RoiRect};
use crate::error::{ImfcsError, Result};

/// Current snapshot schema version.
pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct SavedCollection {
    version: u32,
    label: String,
    entries: Vec<SavedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedEntry {
    key: String,
    associated_files: Vec<String>,
    #[serde(default)]
    roi: Option<RoiRect>,
    #[serde(default)]
    roi_valid: bool,
}

/// Write a collection snapshot to `path`.
pub fn save_collection(path: &Path, collection: &ImageCollection) -> Result<()> {
    let saved = SavedCollection {
        version: FORMAT_VERSION,
        label: collection.label().to_string(),
        entries: collection
            .entries()
            .map(|entry| SavedEntry {
                key: entry.key().to_string(),
                associated_files: entry.associated_files().to_vec(),
                roi: entry.roi().copied(),
                roi_valid: entry.roi_valid(),
            })
            .collect(),
    };

    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, &saved)?;
    log::info!("collection saved to {}", path.display());
    Ok(())
}

/// Read a snapshot from `path`, migrating older versions.
pub fn load_collection(path: &Path) -> Result<ImageCollection> {
    let file = BufReader::new(File::open(path)?);
    let raw: Value = serde_json::from_reader(file)?;
    let saved = migrate(raw)?;

    let mut collection = ImageCollection::new(saved.label);
    for entry in saved.entries {
        let mut image = ImageEntry::new(entry.key, entry.associated_files);
        image.restore_roi(entry.roi, entry.roi_valid);
        collection.append(image);
    }
    Ok(collection)
}

/// Map any supported snapshot version onto the current schema.
///
/// Version 1 predates ROI persistence; its entries deserialize with the
/// serde defaults (`roi: None`, `roi_valid: false`). A missing `version`
/// field means version 1.
fn migrate(mut raw: Value) -> Result<SavedCollection> {
    let version = raw
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;

    if version > FORMAT_VERSION {
        return Err(ImfcsError::UnsupportedVersion(version));
    }

    if let Some(obj) = raw.as_object_mut() {
        obj.insert("version".into(), Value::from(FORMAT_VERSION));
    }
    Ok(serde_json::from_value(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_collection() -> ImageCollection {
        let mut collection = ImageCollection::new("exp1");
        let mut a = ImageEntry::new("a", vec!["a_AVR.tif".into(), "a.xlsx".into()]);
        a.set_roi(Some(RoiRect {
            x: 1.0,
            y: 2.0,
            width: 8.0,
            height: 9.0,
        }))
        .unwrap();
        collection.append(a);
        collection.append(ImageEntry::new("b", vec!["b_AVR.tif".into(), "b.xlsx".into()]));
        collection
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.json");

        save_collection(&path, &sample_collection()).unwrap();
        let loaded = load_collection(&path).unwrap();

        assert_eq!(loaded.label(), "exp1");
        assert_eq!(loaded.len(), 2);

        let a = loaded.get("a").unwrap();
        assert_eq!(a.roi().unwrap().width, 8.0);
        assert!(a.roi_valid());
        // Datasets are never persisted.
        assert!(!a.loaded());
        assert!(!loaded.get("b").unwrap().loaded());
    }

    #[test]
    fn version_1_snapshot_migrates_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        std::fs::write(
            &path,
            r#"{
                "label": "legacy",
                "entries": [
                    { "key": "a", "associated_files": ["a_AVR.tif", "a.xlsx"] }
                ]
            }"#,
        )
        .unwrap();

        let loaded = load_collection(&path).unwrap();
        assert_eq!(loaded.label(), "legacy");
        let a = loaded.get("a").unwrap();
        assert!(a.roi().is_none());
        assert!(!a.roi_valid());
    }

    #[test]
    fn newer_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(&path, r#"{ "version": 99, "label": "x", "entries": [] }"#).unwrap();

        assert!(matches!(
            load_collection(&path),
            Err(ImfcsError::UnsupportedVersion(99))
        ));
    }
}
