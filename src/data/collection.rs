use std::collections::BTreeMap;

use ndarray::{Array2, Array4};

use super::entry::ImageEntry;
use super::model::{Field, FieldValue};
use crate::error::{ImfcsError, Result};

// ---------------------------------------------------------------------------
// ImageCollection – ordered, key-unique container of entries
// ---------------------------------------------------------------------------

/// All image entries of one experiment, in discovery order. Keys are unique
/// by construction ([`from_groups`](Self::from_groups)); lookup by key and
/// by position address the same underlying sequence.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    label: String,
    entries: Vec<ImageEntry>,
}

impl ImageCollection {
    pub fn new(label: impl Into<String>) -> Self {
        ImageCollection {
            label: label.into(),
            entries: Vec::new(),
        }
    }

    /// One entry per key, in the mapping's iteration order.
    pub fn from_groups(label: impl Into<String>, groups: &BTreeMap<String, Vec<String>>) -> Self {
        let mut collection = ImageCollection::new(label);
        for (key, files) in groups {
            collection.append(ImageEntry::new(key.clone(), files.clone()));
        }
        log::info!("total file groups: {}", collection.len());
        collection
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys must stay unique; callers outside `from_groups` are trusted,
    /// as collection construction is not a user-facing path.
    pub fn append(&mut self, entry: ImageEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, key: &str) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ImageEntry> {
        self.entries.iter_mut().find(|e| e.key() == key)
    }

    pub fn by_index(&self, index: usize) -> Result<&ImageEntry> {
        let len = self.entries.len();
        self.entries
            .get(index)
            .ok_or(ImfcsError::IndexOutOfRange { index, len })
    }

    pub fn by_index_mut(&mut self, index: usize) -> Result<&mut ImageEntry> {
        let len = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or(ImfcsError::IndexOutOfRange { index, len })
    }

    pub fn entries(&self) -> impl Iterator<Item = &ImageEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(ImageEntry::key)
    }

    // -- Cross-entry stacking ------------------------------------------------

    /// Stack a 3-D field across all entries into a
    /// `(num_entries, d0, d1, d2)` array. Every entry must be loaded, and
    /// every entry's field must share the first entry's shape.
    ///
    /// All entries are assumed to come out of one acquisition run; the
    /// shape check turns a mismatch into an error instead of relying on
    /// that assumption.
    pub fn stacked_grid(&self, name: &str) -> Result<Array4<f64>> {
        let field = Field::parse(name)?;

        let mut stack: Option<Array4<f64>> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let dataset = entry
                .dataset()
                .ok_or_else(|| ImfcsError::FieldNotLoaded { name: name.into() })?;
            let grid = match dataset.field(field) {
                FieldValue::Grid(g) => g,
                _ => return Err(ImfcsError::UnknownField { name: name.into() }),
            };

            let (d0, d1, d2) = grid.dim();
            let out = stack.get_or_insert_with(|| {
                Array4::zeros((self.entries.len(), d0, d1, d2))
            });
            let (_, e0, e1, e2) = out.dim();
            if (d0, d1, d2) != (e0, e1, e2) {
                return Err(ImfcsError::DimensionMismatch {
                    expected: vec![e0, e1, e2],
                    actual: vec![d0, d1, d2],
                });
            }
            out.slice_mut(ndarray::s![index, .., .., ..]).assign(grid);
        }

        stack.ok_or(ImfcsError::IndexOutOfRange { index: 0, len: 0 })
    }

    /// Lag-time axes of all entries as a `(num_entries, num_lag)` array.
    pub fn stacked_lag_times(&self) -> Result<Array2<f64>> {
        let mut stack: Option<Array2<f64>> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            let dataset = entry.dataset().ok_or_else(|| ImfcsError::FieldNotLoaded {
                name: "lagtimes".into(),
            })?;
            let lags = &dataset.lag_times;

            let out = stack
                .get_or_insert_with(|| Array2::zeros((self.entries.len(), lags.len())));
            if lags.len() != out.dim().1 {
                return Err(ImfcsError::DimensionMismatch {
                    expected: vec![out.dim().1],
                    actual: vec![lags.len()],
                });
            }
            out.slice_mut(ndarray::s![index, ..]).assign(lags);
        }

        stack.ok_or(ImfcsError::IndexOutOfRange { index: 0, len: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::test_support::make_dataset;

    fn groups() -> BTreeMap<String, Vec<String>> {
        let mut map = BTreeMap::new();
        for key in ["alpha", "beta", "gamma"] {
            map.insert(
                key.to_string(),
                vec![format!("{key}_AVR.tif"), format!("{key}.xlsx")],
            );
        }
        map
    }

    fn loaded_collection() -> ImageCollection {
        let mut collection = ImageCollection::from_groups("exp", &groups());
        for i in 0..collection.len() {
            let entry = collection.by_index_mut(i).unwrap();
            entry.install_dataset(make_dataset(2, 3, 4, 5));
        }
        collection
    }

    #[test]
    fn lookups_agree_on_order() {
        let collection = ImageCollection::from_groups("exp", &groups());
        assert_eq!(collection.len(), 3);

        let keys: Vec<&str> = collection.keys().collect();
        assert_eq!(keys, ["alpha", "beta", "gamma"]);

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(collection.by_index(i).unwrap().key(), *key);
            assert_eq!(collection.get(key).unwrap().key(), *key);
        }
        assert!(collection.get("delta").is_none());
    }

    #[test]
    fn by_index_out_of_range() {
        let collection = ImageCollection::from_groups("exp", &groups());
        let err = collection.by_index(7).unwrap_err();
        assert!(matches!(
            err,
            ImfcsError::IndexOutOfRange { index: 7, len: 3 }
        ));
    }

    #[test]
    fn stacked_grid_shape() {
        let collection = loaded_collection();
        let stack = collection.stacked_grid("acf1").unwrap();
        assert_eq!(stack.dim(), (3, 3, 2, 4));
        assert_eq!(stack[[2, 1, 1, 3]], 0.5);

        let lags = collection.stacked_lag_times().unwrap();
        assert_eq!(lags.dim(), (3, 4));
    }

    #[test]
    fn stacked_grid_requires_loaded_entries() {
        let collection = ImageCollection::from_groups("exp", &groups());
        assert!(matches!(
            collection.stacked_grid("acf1"),
            Err(ImfcsError::FieldNotLoaded { .. })
        ));
    }

    #[test]
    fn stacked_grid_rejects_mismatched_entry() {
        let mut collection = loaded_collection();
        collection.append({
            let mut entry = ImageEntry::new("delta", vec![]);
            entry.install_dataset(make_dataset(5, 5, 4, 5));
            entry
        });
        assert!(matches!(
            collection.stacked_grid("acf1"),
            Err(ImfcsError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn stacked_grid_rejects_non_grid_field() {
        let collection = loaded_collection();
        assert!(matches!(
            collection.stacked_grid("fit1_param"),
            Err(ImfcsError::UnknownField { .. })
        ));
    }
}
