//! Reader and batch-loading cache for the spreadsheet/TIFF exports of an
//! ImFCS imaging pipeline.
//!
//! The export format stores per-pixel autocorrelation data as flat,
//! position-encoded spreadsheet rows; this crate reshapes those into
//! pixel-indexed [`ndarray`] datasets ([`data::decode`]), caches one
//! dataset per image entry ([`data::entry`]), and populates whole
//! collections with a cancellable, resumable batch loader ([`loader`]).
//! Presentation layers (plotting, ROI drawing, widgets) live outside this
//! crate and consume the typed accessors.

pub mod data;
pub mod error;
pub mod loader;
pub mod persist;
pub mod report;

pub use data::collection::ImageCollection;
pub use data::entry::{AnalysisFiles, EntryDecoder, ImageEntry, RoiRect, XlsxEntryDecoder};
pub use data::model::{EntryDataset, Field, FieldValue, PsfCalibration, PsfFitSummary};
pub use error::{ImfcsError, Result};
pub use loader::{BatchLoader, LoadMode, LoaderPhase};
pub use report::{ErrorSink, LogErrorSink};
