//! Pure decoders for the sheets of an ImFCS export workbook.
//!
//! Every function reads one named table from a [`TableSource`] and reshapes
//! it into a typed array. Nothing here caches or mutates; calls are
//! independent. Each call materializes the whole target sheet before
//! reshaping, which dominates the cost.
//!
//! Pixel-indexed sheets use a fixed row layout: the row for pixel `(i, j)`
//! with `0 <= i < height`, `0 <= j < width` is `j + i * height` — the
//! multiplier is the image *height*, not the width. That is a convention of
//! the export format and must not be "corrected".

use std::collections::BTreeMap;

use ndarray::{Array1, Array3};

use super::model::PsfCalibration;
use super::table::{Cell, Table, TableSource};
use crate::error::{ImfcsError, Result};

/// Sheet names fixed by the export format.
pub const SHEET_PANEL_PARAMETERS: &str = "Panel Parameters";
pub const SHEET_LAGTIME: &str = "lagtime";
pub const SHEET_ACF: &str = "ACF1";
pub const SHEET_SD: &str = "SD (ACF1)";
pub const SHEET_FIT_FUNCTIONS: &str = "Fit functions (ACF1)";
pub const SHEET_FIT_PARAMETERS: &str = "Fit Parameters (ACF1)";
pub const SHEET_PSF: &str = "PSF";

/// Sentinel label preceding the PSF scan parameters.
const PSF_START_LABEL: &str = "PSF start";

// ---------------------------------------------------------------------------
// Panel parameters
// ---------------------------------------------------------------------------

/// Read scalar acquisition parameters from the `Panel Parameters` sheet.
///
/// Each requested name is matched exactly against the first column; the
/// value is the adjacent cell. Fails with
/// [`ImfcsError::ParameterNotFound`] for an absent label.
pub fn panel_parameters(
    book: &mut dyn TableSource,
    names: &[&str],
) -> Result<BTreeMap<String, f64>> {
    let table = book.table(SHEET_PANEL_PARAMETERS)?;

    let mut values = BTreeMap::new();
    for &name in names {
        let row = table
            .find_row_by_label(name)
            .ok_or_else(|| ImfcsError::ParameterNotFound { name: name.into() })?;
        values.insert(name.to_string(), table.cell(row, 1).to_f64()?);
    }
    Ok(values)
}

// ---------------------------------------------------------------------------
// Lag times
// ---------------------------------------------------------------------------

/// Read the lag-time axis: sheet `lagtime`, column 1, starting at row 1
/// (row 0 is a header).
pub fn lag_times(book: &mut dyn TableSource) -> Result<Array1<f64>> {
    let table = book.table(SHEET_LAGTIME)?;

    let mut values = Vec::with_capacity(table.n_rows().saturating_sub(1));
    for row in 1..table.n_rows() {
        values.push(table.cell(row, 1).to_f64()?);
    }
    Ok(Array1::from_vec(values))
}

// ---------------------------------------------------------------------------
// Correlation grids (ACF1 / SD (ACF1) / Fit functions (ACF1))
// ---------------------------------------------------------------------------

/// Read one lag-indexed per-pixel sheet into a `(height, width, num_lag)`
/// array. Values for pixel `(i, j)` sit in columns `1..=num_lag` of row
/// `j + i * height`.
pub fn correlation_grid(
    book: &mut dyn TableSource,
    sheet: &str,
    width: usize,
    height: usize,
    num_lag: usize,
) -> Result<Array3<f64>> {
    let table = book.table(sheet)?;

    let mut grid = Array3::zeros((height, width, num_lag));
    for i in 0..height {
        for j in 0..width {
            let row = j + i * height;
            for lag in 0..num_lag {
                grid[[i, j, lag]] = table.cell(row, 1 + lag).to_f64()?;
            }
        }
    }
    Ok(grid)
}

// ---------------------------------------------------------------------------
// Fit parameters
// ---------------------------------------------------------------------------

/// Column labels of the fit-result vector: row 0, columns 1.. of the fit
/// parameter sheet.
pub fn fit_parameter_names(book: &mut dyn TableSource, sheet: &str) -> Result<Vec<String>> {
    let table = book.table(sheet)?;

    let n = table.row_len(0);
    let mut names = Vec::with_capacity(n.saturating_sub(1));
    for col in 1..n {
        names.push(table.cell(0, col).to_text());
    }
    Ok(names)
}

/// Read the per-pixel fit-result vectors into a `(height, width, P)` array,
/// where `P` is the number of [`fit_parameter_names`].
///
/// Two passes over the sheet: pass 1 fills slots `1..P` from columns `2..`,
/// pass 2 fills slot 0 from column 1, whose cells hold the literal strings
/// `"true"`/`"false"` (mapped to `1.0`/`0.0`); any other text must parse as
/// a number. Rows are offset by one header row.
pub fn fit_results(
    book: &mut dyn TableSource,
    sheet: &str,
    width: usize,
    height: usize,
) -> Result<Array3<f64>> {
    let table = book.table(sheet)?;
    let num_param = fit_parameter_names(book, sheet)?.len();

    let mut results = Array3::zeros((height, width, num_param));
    if num_param == 0 {
        return Ok(results);
    }

    // Pass 1: named parameter slots.
    for i in 0..height {
        for j in 0..width {
            let row = j + i * height + 1;
            for p in 1..num_param {
                results[[i, j, p]] = table.cell(row, 1 + p).to_f64()?;
            }
        }
    }

    // Pass 2: "fit succeeded" flag.
    for i in 0..height {
        for j in 0..width {
            let row = j + i * height + 1;
            results[[i, j, 0]] = fit_flag(table.cell(row, 1))?;
        }
    }

    Ok(results)
}

fn fit_flag(cell: &Cell) -> Result<f64> {
    match cell {
        Cell::Text(s) if s == "true" => Ok(1.0),
        Cell::Text(s) if s == "false" => Ok(0.0),
        other => other.to_f64(),
    }
}

// ---------------------------------------------------------------------------
// PSF calibration
// ---------------------------------------------------------------------------

/// Decode the `PSF` calibration sheet.
///
/// The scan parameters `{start, end, step}` live in the row following the
/// `"PSF start"` sentinel label; the number of pixel-binning rows is the
/// distance from the top of the sheet to that row. The `(num_psf, num_bin,
/// 2)` grid of (mean D, std D) pairs is laid out with a column stride of 3
/// per PSF step.
pub fn psf_calibration(book: &mut dyn TableSource) -> Result<PsfCalibration> {
    let table = book.table(SHEET_PSF)?;

    let sentinel = table
        .find_row_by_label(PSF_START_LABEL)
        .ok_or_else(|| ImfcsError::ParameterNotFound {
            name: PSF_START_LABEL.into(),
        })?;
    let scan_row = sentinel + 1;

    let start = table.cell(scan_row, 0).to_f64()?;
    let end = table.cell(scan_row, 1).to_f64()?;
    let step = table.cell(scan_row, 2).to_f64()?;

    let num_psf = ((end - start) / step + 1.0).ceil() as usize;
    let num_bin = scan_row.saturating_sub(3);
    let bin_start = table.cell(1, 0).to_f64()? as i64;
    let bin_end = bin_start + num_bin as i64 - 1;

    let mut grid = Array3::zeros((num_psf, num_bin, 2));
    for i in 0..num_psf {
        for j in 0..num_bin {
            let row = j + 1;
            let col = i * 3;
            grid[[i, j, 0]] = table.cell(row, col + 1).to_f64()?;
            grid[[i, j, 1]] = table.cell(row, col + 2).to_f64()?;
        }
    }

    Ok(PsfCalibration {
        start,
        end,
        step,
        num_psf,
        num_bin,
        bin_start,
        bin_end,
        grid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::table::MemoryBook;

    fn num(v: f64) -> Cell {
        Cell::Number(v)
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.into())
    }

    fn book_with(table: Table) -> MemoryBook {
        let mut book = MemoryBook::new();
        book.insert(table);
        book
    }

    #[test]
    fn panel_parameters_by_label() {
        let mut book = book_with(Table::new(
            SHEET_PANEL_PARAMETERS,
            vec![
                vec![text("Frame time"), num(0.001)],
                vec![text("Image width"), num(4.0)],
                vec![text("Image height"), num(3.0)],
            ],
        ));

        let params = panel_parameters(&mut book, &["Image width", "Image height"]).unwrap();
        assert_eq!(params["Image width"], 4.0);
        assert_eq!(params["Image height"], 3.0);

        let err = panel_parameters(&mut book, &["Overlap"]).unwrap_err();
        assert!(matches!(err, ImfcsError::ParameterNotFound { name } if name == "Overlap"));
    }

    #[test]
    fn panel_parameters_missing_sheet() {
        let mut book = MemoryBook::new();
        let err = panel_parameters(&mut book, &["Image width"]).unwrap_err();
        assert!(
            matches!(err, ImfcsError::MissingTable { name } if name == SHEET_PANEL_PARAMETERS)
        );
    }

    #[test]
    fn lag_times_skip_header_row() {
        let mut book = book_with(Table::new(
            SHEET_LAGTIME,
            vec![
                vec![text("index"), text("lagtime")],
                vec![num(0.0), num(1e-6)],
                vec![num(1.0), num(2e-6)],
                vec![num(2.0), num(4e-6)],
            ],
        ));

        let lags = lag_times(&mut book).unwrap();
        assert_eq!(lags.len(), 3);
        assert_eq!(lags[0], 1e-6);
        assert_eq!(lags[2], 4e-6);
    }

    /// Encode the source position into each value so the row convention is
    /// checked cell by cell: row r, lag column c holds `r * 1000 + c`.
    fn position_encoded_grid(width: usize, height: usize, num_lag: usize) -> Table {
        let rows = (0..width * height)
            .map(|r| {
                let mut row = vec![num(-1.0)];
                row.extend((1..=num_lag).map(|c| num((r * 1000 + c) as f64)));
                row
            })
            .collect();
        Table::new(SHEET_ACF, rows)
    }

    #[test]
    fn correlation_grid_row_convention_uses_height() {
        let (width, height, num_lag) = (3, 2, 4);
        let mut book = book_with(position_encoded_grid(width, height, num_lag));

        let grid = correlation_grid(&mut book, SHEET_ACF, width, height, num_lag).unwrap();
        assert_eq!(grid.dim(), (height, width, num_lag));
        for i in 0..height {
            for j in 0..width {
                let row = j + i * height;
                for lag in 0..num_lag {
                    assert_eq!(grid[[i, j, lag]], (row * 1000 + lag + 1) as f64);
                }
            }
        }
    }

    #[test]
    fn correlation_grid_shape_round_trips() {
        let (width, height, num_lag) = (5, 4, 2);
        let mut book = book_with(position_encoded_grid(width, height, num_lag));

        let grid = correlation_grid(&mut book, SHEET_ACF, width, height, num_lag).unwrap();
        let (h, w, l) = grid.dim();
        assert_eq!((w, h, l), (width, height, num_lag));
    }

    fn fit_table(width: usize, height: usize, flags: &[Cell]) -> Table {
        // Header row with three named parameters, then one row per pixel:
        // [pixel, flag, N, D, G].
        let mut rows = vec![vec![
            text("pixel"),
            text("fitted"),
            text("N"),
            text("D"),
            text("G"),
        ]];
        for r in 0..width * height {
            rows.push(vec![
                num(r as f64),
                flags[r % flags.len()].clone(),
                num(10.0 + r as f64),
                num(20.0 + r as f64),
                num(30.0 + r as f64),
            ]);
        }
        Table::new(SHEET_FIT_PARAMETERS, rows)
    }

    #[test]
    fn fit_results_two_pass_fill() {
        let (width, height) = (2, 2);
        let mut book = book_with(fit_table(
            width,
            height,
            &[text("true"), text("false"), text("7"), num(0.0)],
        ));

        let names = fit_parameter_names(&mut book, SHEET_FIT_PARAMETERS).unwrap();
        assert_eq!(names, ["fitted", "N", "D", "G"]);

        let res = fit_results(&mut book, SHEET_FIT_PARAMETERS, width, height).unwrap();
        assert_eq!(res.dim(), (height, width, 4));

        // Flags: pixel (0,0) -> sheet row 1 -> "true"; (0,1) -> row 2 ->
        // "false"; (1,0) -> row 3 -> "7".
        assert_eq!(res[[0, 0, 0]], 1.0);
        assert_eq!(res[[0, 1, 0]], 0.0);
        assert_eq!(res[[1, 0, 0]], 7.0);

        // Named slots come from columns 2.. of the pixel's row.
        let row = 1 + 0 * height; // pixel (0, 1)
        assert_eq!(res[[0, 1, 1]], 10.0 + row as f64);
        assert_eq!(res[[0, 1, 2]], 20.0 + row as f64);
        assert_eq!(res[[0, 1, 3]], 30.0 + row as f64);
    }

    #[test]
    fn fit_results_decode_is_idempotent() {
        let (width, height) = (2, 3);
        let mut book = book_with(fit_table(width, height, &[text("true")]));

        let a = fit_results(&mut book, SHEET_FIT_PARAMETERS, width, height).unwrap();
        let b = fit_results(&mut book, SHEET_FIT_PARAMETERS, width, height).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fit_results_rejects_non_numeric_flag() {
        let (width, height) = (1, 1);
        let mut book = book_with(fit_table(width, height, &[text("maybe")]));

        let err = fit_results(&mut book, SHEET_FIT_PARAMETERS, width, height).unwrap_err();
        assert!(matches!(err, ImfcsError::NumericParse { value } if value == "maybe"));
    }

    /// PSF sheet with two binning rows: sentinel sits at row 4, so
    /// `num_bin = 5 - 3 = 2`. Three PSF steps, one (D, std) pair each at
    /// column stride 3.
    fn psf_table() -> Table {
        let bin_row = |bin: f64, base: f64| {
            vec![
                num(bin),
                num(base),
                num(base / 10.0),
                Cell::Empty,
                num(base + 1.0),
                num((base + 1.0) / 10.0),
                Cell::Empty,
                num(base + 2.0),
                num((base + 2.0) / 10.0),
            ]
        };
        Table::new(
            SHEET_PSF,
            vec![
                vec![text("bin")],
                bin_row(1.0, 10.0),
                bin_row(2.0, 20.0),
                vec![],
                vec![text("PSF start"), text("PSF end"), text("PSF step")],
                vec![num(0.5), num(0.6), num(0.05)],
            ],
        )
    }

    #[test]
    fn psf_scan_parameters_and_grid() {
        let mut book = book_with(psf_table());
        let psf = psf_calibration(&mut book).unwrap();

        // ceil((0.6 - 0.5) / 0.05 + 1) == 3 under f64 arithmetic.
        assert_eq!(psf.num_psf, 3);
        assert_eq!(psf.num_bin, 2);
        assert_eq!(psf.bin_start, 1);
        assert_eq!(psf.bin_end, 2);
        assert_eq!(psf.grid.dim(), (3, 2, 2));

        // PSF step i reads columns i*3+1 and i*3+2 of binning row j+1.
        assert_eq!(psf.grid[[0, 0, 0]], 10.0);
        assert_eq!(psf.grid[[0, 1, 1]], 2.0);
        assert_eq!(psf.grid[[1, 0, 0]], 11.0);
        assert_eq!(psf.grid[[2, 1, 0]], 22.0);
        assert_eq!(psf.grid[[2, 1, 1]], 2.2);
    }

    #[test]
    fn psf_missing_sentinel() {
        let mut book = book_with(Table::new(SHEET_PSF, vec![vec![text("bin")]]));
        let err = psf_calibration(&mut book).unwrap_err();
        assert!(matches!(err, ImfcsError::ParameterNotFound { name } if name == "PSF start"));
    }
}
