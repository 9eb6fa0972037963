//! Input-folder discovery: find the `.tif`/`.xlsx` exports and group them
//! by basename.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Group the relevant files of `input_folder` by key.
///
/// Only `.tif` and `.xlsx` names are considered. The key of a file is its
/// name with the final `_suffix` stripped, so `cell1_AVR.tif`,
/// `cell1_ACF.xlsx` and `cell1_metadata.xlsx` all land under `cell1`. Keys
/// iterate in sorted order; file lists are sorted for determinism.
pub fn scan_input_folder(input_folder: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for dir_entry in std::fs::read_dir(input_folder)? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !(name.ends_with(".tif") || name.ends_with(".xlsx")) {
            continue;
        }
        grouped.entry(base_name(name)).or_default().push(name.to_string());
    }

    for files in grouped.values_mut() {
        files.sort();
    }
    Ok(grouped)
}

/// Everything before the final `_` separator. A name without one groups
/// under the empty key — the grouping collaborator's rule, reproduced
/// as-is.
fn base_name(file_name: &str) -> String {
    match file_name.rfind('_') {
        Some(pos) => file_name[..pos].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn base_name_strips_last_suffix() {
        assert_eq!(base_name("exp1_cell1_AVR.tif"), "exp1_cell1");
        assert_eq!(base_name("exp1_cell1_metadata.xlsx"), "exp1_cell1");
        assert_eq!(base_name("plain.xlsx"), "");
    }

    #[test]
    fn scan_groups_by_basename() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "cell1_AVR.tif",
            "cell1_ACF.xlsx",
            "cell1_metadata.xlsx",
            "cell2_AVR.tif",
            "cell2_ACF.xlsx",
            "notes.txt", // ignored extension
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let groups = scan_input_folder(dir.path()).unwrap();
        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, ["cell1", "cell2"]);
        assert_eq!(
            groups["cell1"],
            ["cell1_ACF.xlsx", "cell1_AVR.tif", "cell1_metadata.xlsx"]
        );
        assert_eq!(groups["cell2"].len(), 2);
    }
}
