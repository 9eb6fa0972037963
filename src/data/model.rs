use ndarray::{Array1, Array3};

use crate::error::{ImfcsError, Result};

// ---------------------------------------------------------------------------
// EntryDataset – everything decoded for one image entry
// ---------------------------------------------------------------------------

/// The decoded dataset of one image entry. Built in full before it becomes
/// observable; a partially decoded dataset never leaves the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDataset {
    /// Lag-time axis, monotonically increasing.
    pub lag_times: Array1<f64>,
    /// Autocorrelation curves, `(height, width, num_lag)`.
    pub acf: Array3<f64>,
    /// Standard deviation of the ACF, same shape as `acf`.
    pub sd: Array3<f64>,
    /// Fitted model curves, same shape as `acf`.
    pub fit: Array3<f64>,
    /// Column labels of the fit-result vector.
    pub fit_param_names: Vec<String>,
    /// Per-pixel fit-result vectors, `(height, width, P)`. Slot 0 is the
    /// boolean-as-float "fit succeeded" flag; slot 2 holds the diffusion
    /// time rescaled by 1e12 relative to the sheet.
    pub fit_results: Array3<f64>,
    /// Intensity stack from the `_AVR` image, `(frames, height, width)`.
    pub avr_intensity: Array3<f64>,
}

impl EntryDataset {
    /// Pixel-grid height, derived from the ACF shape.
    pub fn height(&self) -> usize {
        self.acf.dim().0
    }

    /// Pixel-grid width, derived from the ACF shape.
    pub fn width(&self) -> usize {
        self.acf.dim().1
    }

    pub fn num_lag(&self) -> usize {
        self.acf.dim().2
    }
}

// ---------------------------------------------------------------------------
// Field – the names the presentation layer asks for
// ---------------------------------------------------------------------------

/// Dataset fields addressable by name through `ImageEntry::field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    LagTimes,
    Acf,
    Sd,
    Fit,
    FitParamNames,
    FitResults,
    AvrIntensity,
}

impl Field {
    /// The fixed external names, as consumed by the presentation layer.
    pub fn parse(name: &str) -> Result<Field> {
        match name {
            "lagtimes" => Ok(Field::LagTimes),
            "acf1" => Ok(Field::Acf),
            "sd1" => Ok(Field::Sd),
            "fit1" => Ok(Field::Fit),
            "fit1_param" => Ok(Field::FitParamNames),
            "fit1_results" => Ok(Field::FitResults),
            "avr_intensity" => Ok(Field::AvrIntensity),
            other => Err(ImfcsError::UnknownField { name: other.into() }),
        }
    }
}

/// A borrowed view of one dataset field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    LagTimes(&'a Array1<f64>),
    Grid(&'a Array3<f64>),
    Names(&'a [String]),
}

impl EntryDataset {
    pub fn field(&self, field: Field) -> FieldValue<'_> {
        match field {
            Field::LagTimes => FieldValue::LagTimes(&self.lag_times),
            Field::Acf => FieldValue::Grid(&self.acf),
            Field::Sd => FieldValue::Grid(&self.sd),
            Field::Fit => FieldValue::Grid(&self.fit),
            Field::FitParamNames => FieldValue::Names(&self.fit_param_names),
            Field::FitResults => FieldValue::Grid(&self.fit_results),
            Field::AvrIntensity => FieldValue::Grid(&self.avr_intensity),
        }
    }
}

// ---------------------------------------------------------------------------
// PSF calibration
// ---------------------------------------------------------------------------

/// Decoded PSF calibration scan: a grid of diffusion coefficients over
/// (PSF width, pixel binning) combinations.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfCalibration {
    pub start: f64,
    pub end: f64,
    pub step: f64,
    pub num_psf: usize,
    pub num_bin: usize,
    pub bin_start: i64,
    pub bin_end: i64,
    /// `(num_psf, num_bin, 2)` of (mean D, std D).
    pub grid: Array3<f64>,
}

/// Outcome of the calibration line fits: the PSF row whose D-vs-binning
/// slope is closest to zero wins.
#[derive(Debug, Clone, PartialEq)]
pub struct PsfFitSummary {
    /// Per-PSF-row slope of D over pixel binning (NaN when too few valid
    /// points survived the RSD mask).
    pub slopes: Vec<f64>,
    pub intercepts: Vec<f64>,
    /// Index of the flattest valid row.
    pub best_index: usize,
    /// PSF parameter of the winning row: `start + best_index * step`.
    pub best_psf: f64,
    /// Intercept of the winning fit.
    pub best_fit_d: f64,
    /// Mean D of the winning row's valid points.
    pub mean_d: f64,
}

impl PsfCalibration {
    /// PSF parameter value of row `i`.
    pub fn psf_value(&self, i: usize) -> f64 {
        self.start + i as f64 * self.step
    }

    /// Fit a line through D-vs-binning for every PSF row, masking points
    /// whose relative std dev exceeds `rsd_threshold`, and pick the row
    /// with the smallest absolute slope. `None` when no row has enough
    /// valid points for a fit.
    pub fn fit_summary(&self, rsd_threshold: f64) -> Option<PsfFitSummary> {
        let mut slopes = Vec::with_capacity(self.num_psf);
        let mut intercepts = Vec::with_capacity(self.num_psf);

        for i in 0..self.num_psf {
            let points = self.valid_points(i, rsd_threshold);
            if points.len() > 1 {
                let (slope, intercept) = linear_fit(&points);
                slopes.push(slope);
                intercepts.push(intercept);
            } else {
                slopes.push(f64::NAN);
                intercepts.push(f64::NAN);
            }
        }

        let best_index = slopes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_finite())
            .min_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
            .map(|(i, _)| i)?;

        let best_points = self.valid_points(best_index, rsd_threshold);
        let mean_d =
            best_points.iter().map(|&(_, d)| d).sum::<f64>() / best_points.len() as f64;

        Some(PsfFitSummary {
            best_psf: self.psf_value(best_index),
            best_fit_d: intercepts[best_index],
            best_index,
            mean_d,
            slopes,
            intercepts,
        })
    }

    /// (binning, mean D) points of row `i` passing the RSD mask.
    fn valid_points(&self, i: usize, rsd_threshold: f64) -> Vec<(f64, f64)> {
        (0..self.num_bin)
            .filter_map(|j| {
                let d = self.grid[[i, j, 0]];
                let std = self.grid[[i, j, 1]];
                let x = (self.bin_start + j as i64) as f64;
                (d.is_finite() && std / d <= rsd_threshold).then_some((x, d))
            })
            .collect()
    }
}

/// Ordinary least squares through `(x, y)` points; caller guarantees at
/// least two points.
fn linear_fit(points: &[(f64, f64)]) -> (f64, f64) {
    let n = points.len() as f64;
    let sx: f64 = points.iter().map(|p| p.0).sum();
    let sy: f64 = points.iter().map(|p| p.1).sum();
    let sxy: f64 = points.iter().map(|p| p.0 * p.1).sum();
    let sxx: f64 = points.iter().map(|p| p.0 * p.0).sum();

    let slope = (n * sxy - sx * sy) / (n * sxx - sx * sx);
    let intercept = (sy - slope * sx) / n;
    (slope, intercept)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::EntryDataset;
    use ndarray::{Array1, Array3};

    /// Small fully populated dataset for cache and loader tests.
    pub(crate) fn make_dataset(
        width: usize,
        height: usize,
        num_lag: usize,
        num_param: usize,
    ) -> EntryDataset {
        EntryDataset {
            lag_times: Array1::linspace(1e-6, 1e-3, num_lag),
            acf: Array3::from_elem((height, width, num_lag), 0.5),
            sd: Array3::from_elem((height, width, num_lag), 0.1),
            fit: Array3::from_elem((height, width, num_lag), 0.45),
            fit_param_names: (0..num_param).map(|p| format!("p{p}")).collect(),
            fit_results: Array3::from_elem((height, width, num_param), 1.0),
            avr_intensity: Array3::from_elem((2, height, width), 100.0),
        }
    }
}
