//! Data layer: sheet decoding, per-entry datasets, and the collection.
//!
//! Architecture:
//! ```text
//!  input folder (*_AVR.tif, *.xlsx, *_metadata.xlsx)
//!        │
//!        ▼
//!   ┌───────────┐
//!   │ discovery  │  group files by basename → key → [files]
//!   └───────────┘
//!        │
//!        ▼
//!   ┌───────────┐     ┌─────────────────┐
//!   │ collection │────▶│ entry (lazy)     │  select files, decode once
//!   └───────────┘     └─────────────────┘
//!                            │
//!              ┌─────────────┼──────────────┐
//!              ▼             ▼              ▼
//!        ┌─────────┐   ┌──────────┐   ┌───────────┐
//!        │ table    │   │ decode    │   │ intensity  │
//!        │ (xlsx)   │   │ (reshape) │   │ (tiff)     │
//!        └─────────┘   └──────────┘   └───────────┘
//! ```

pub mod collection;
pub mod decode;
pub mod discovery;
pub mod entry;
pub mod intensity;
pub mod metrics;
pub mod model;
pub mod table;
