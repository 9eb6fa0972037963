use std::path::Path;

use serde::{Deserialize, Serialize};

use super::decode::{
    correlation_grid, fit_parameter_names, fit_results, lag_times, panel_parameters, SHEET_ACF,
    SHEET_FIT_FUNCTIONS, SHEET_FIT_PARAMETERS, SHEET_SD,
};
use super::intensity;
use super::model::{EntryDataset, Field, FieldValue};
use super::table::XlsxBook;
use crate::error::{ImfcsError, Result};

/// Filename suffix of the primary (average-intensity) image.
const IMAGE_SUFFIX: &str = "_AVR.tif";
/// Table files end in `.xlsx`; the metadata companion is excluded.
const TABLE_SUFFIX: &str = ".xlsx";
const METADATA_SUFFIX: &str = "_metadata.xlsx";

/// Panel-parameter labels an entry needs to decode itself.
const PANEL_PARAMS: [&str; 5] = [
    "Image width",
    "Image height",
    "Binning X",
    "Binning Y",
    "Overlap",
];

// ---------------------------------------------------------------------------
// ROI
// ---------------------------------------------------------------------------

/// User-selected rectangular region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

// ---------------------------------------------------------------------------
// File selection
// ---------------------------------------------------------------------------

/// The two files an entry decodes from: exactly one image, exactly one
/// table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisFiles {
    pub image: String,
    pub table: String,
}

// ---------------------------------------------------------------------------
// EntryDecoder – the decode step behind a seam
// ---------------------------------------------------------------------------

/// Turns one entry's selected files into a complete dataset. A trait so the
/// batch loader can share one decoder across workers and tests can count
/// invocations.
pub trait EntryDecoder: Send + Sync {
    fn decode(&self, input_folder: &Path, files: &AnalysisFiles) -> Result<EntryDataset>;
}

/// Production decoder: calamine-backed workbook plus TIFF stack.
#[derive(Debug, Default)]
pub struct XlsxEntryDecoder;

impl EntryDecoder for XlsxEntryDecoder {
    fn decode(&self, input_folder: &Path, files: &AnalysisFiles) -> Result<EntryDataset> {
        let mut book = XlsxBook::open(&input_folder.join(&files.table))?;

        let params = panel_parameters(&mut book, &PANEL_PARAMS)?;
        let width = params["Image width"] as usize;
        let height = params["Image height"] as usize;

        let lag_times = lag_times(&mut book)?;
        let num_lag = lag_times.len();

        let acf = correlation_grid(&mut book, SHEET_ACF, width, height, num_lag)?;
        let sd = correlation_grid(&mut book, SHEET_SD, width, height, num_lag)?;
        let fit = correlation_grid(&mut book, SHEET_FIT_FUNCTIONS, width, height, num_lag)?;

        let fit_param_names = fit_parameter_names(&mut book, SHEET_FIT_PARAMETERS)?;
        let mut fit_results = fit_results(&mut book, SHEET_FIT_PARAMETERS, width, height)?;

        // The sheet stores the diffusion time in seconds; downstream code
        // works in picoseconds.
        if fit_results.dim().2 > 2 {
            fit_results
                .slice_mut(ndarray::s![.., .., 2])
                .mapv_inplace(|v| v * 1e12);
        }

        let avr_intensity = intensity::read_stack(&input_folder.join(&files.image))?;

        Ok(EntryDataset {
            lag_times,
            acf,
            sd,
            fit,
            fit_param_names,
            fit_results,
            avr_intensity,
        })
    }
}

// ---------------------------------------------------------------------------
// ImageEntry
// ---------------------------------------------------------------------------

/// One image record: identifying metadata, its file group, ROI state, and a
/// dataset decoded lazily on first load.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    key: String,
    associated_files: Vec<String>,
    roi: Option<RoiRect>,
    roi_valid: bool,
    dataset: Option<EntryDataset>,
}

impl ImageEntry {
    pub fn new(key: impl Into<String>, associated_files: Vec<String>) -> Self {
        ImageEntry {
            key: key.into(),
            associated_files,
            roi: None,
            roi_valid: false,
            dataset: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn associated_files(&self) -> &[String] {
        &self.associated_files
    }

    /// Whether the dataset has been decoded. Implied: `loaded()` means
    /// `dataset()` is `Some` and complete.
    pub fn loaded(&self) -> bool {
        self.dataset.is_some()
    }

    pub fn dataset(&self) -> Option<&EntryDataset> {
        self.dataset.as_ref()
    }

    // -- ROI -----------------------------------------------------------------

    pub fn roi(&self) -> Option<&RoiRect> {
        self.roi.as_ref()
    }

    pub fn roi_valid(&self) -> bool {
        self.roi_valid
    }

    /// Set the ROI with the default always-accepting validator.
    pub fn set_roi(&mut self, rect: Option<RoiRect>) -> Result<()> {
        self.set_roi_with(rect, |_| true)
    }

    /// Set the ROI under an injected validation predicate. A missing
    /// rectangle is an error; a rejected one clears both ROI fields. The
    /// two fields always change together.
    pub fn set_roi_with(
        &mut self,
        rect: Option<RoiRect>,
        is_valid: impl Fn(&RoiRect) -> bool,
    ) -> Result<()> {
        let rect = rect.ok_or(ImfcsError::InvalidRoi)?;
        if is_valid(&rect) {
            self.roi = Some(rect);
            self.roi_valid = true;
        } else {
            self.roi = None;
            self.roi_valid = false;
        }
        Ok(())
    }

    /// Restore persisted ROI state verbatim (snapshot loading only).
    pub(crate) fn restore_roi(&mut self, roi: Option<RoiRect>, roi_valid: bool) {
        self.roi = roi;
        self.roi_valid = roi_valid;
    }

    // -- File selection ------------------------------------------------------

    /// Pick the one image file and the one table file this entry decodes
    /// from. Fails with [`ImfcsError::AmbiguousFile`] unless exactly one
    /// file matches each role.
    pub fn select_analysis_files(&self) -> Result<AnalysisFiles> {
        let mut images: Vec<&String> = self
            .associated_files
            .iter()
            .filter(|f| f.ends_with(IMAGE_SUFFIX))
            .collect();
        let mut tables: Vec<&String> = self
            .associated_files
            .iter()
            .filter(|f| f.ends_with(TABLE_SUFFIX) && !f.ends_with(METADATA_SUFFIX))
            .collect();
        images.sort();
        tables.sort();

        if images.len() != 1 {
            return Err(ImfcsError::AmbiguousFile {
                role: "image",
                count: images.len(),
            });
        }
        if tables.len() != 1 {
            return Err(ImfcsError::AmbiguousFile {
                role: "table",
                count: tables.len(),
            });
        }

        Ok(AnalysisFiles {
            image: images[0].clone(),
            table: tables[0].clone(),
        })
    }

    // -- Loading -------------------------------------------------------------

    /// Decode this entry's dataset from `input_folder`. A no-op once
    /// loaded; on failure nothing is committed and the entry stays
    /// unloaded.
    pub fn load(&mut self, input_folder: &Path) -> Result<()> {
        self.load_with(input_folder, &XlsxEntryDecoder)
    }

    /// [`load`](Self::load) with an explicit decoder.
    pub fn load_with(&mut self, input_folder: &Path, decoder: &dyn EntryDecoder) -> Result<()> {
        if self.loaded() {
            return Ok(());
        }
        let files = self.select_analysis_files()?;
        let dataset = decoder.decode(input_folder, &files)?;
        self.install_dataset(dataset);
        Ok(())
    }

    /// Commit a fully decoded dataset. Keeps the first dataset if one is
    /// already present (loads are at-most-once).
    pub(crate) fn install_dataset(&mut self, dataset: EntryDataset) {
        if self.dataset.is_none() {
            self.dataset = Some(dataset);
        }
    }

    // -- Field access --------------------------------------------------------

    /// Look up a dataset field by its external name. Fails with
    /// [`ImfcsError::FieldNotLoaded`] before a successful load, and with
    /// [`ImfcsError::UnknownField`] for a name outside the fixed set.
    pub fn field(&self, name: &str) -> Result<FieldValue<'_>> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| ImfcsError::FieldNotLoaded { name: name.into() })?;
        Ok(dataset.field(Field::parse(name)?))
    }
}
