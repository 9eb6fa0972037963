//! Write a synthetic ImFCS export folder: per key one multi-frame
//! `*_AVR.tif` intensity stack, one `*_ACF.xlsx` workbook with every sheet
//! the reader consumes, and one decoy `*_metadata.xlsx`.
//!
//! Usage: `generate_sample [output_dir]` (default `sample_data`).

use std::fs::File;
use std::path::Path;

use rust_xlsxwriter::Workbook;
use tiff::encoder::{colortype, TiffEncoder};

use imfcs_reader::data::decode::{
    SHEET_ACF, SHEET_FIT_FUNCTIONS, SHEET_FIT_PARAMETERS, SHEET_LAGTIME,
    SHEET_PANEL_PARAMETERS, SHEET_PSF, SHEET_SD,
};

const WIDTH: usize = 8;
const HEIGHT: usize = 8;
const NUM_LAG: usize = 24;
const NUM_FRAMES: usize = 4;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// One-component 2D diffusion model, good enough for plotting demos.
fn acf_model(lag: f64, n: f64, tau_d: f64) -> f64 {
    1.0 / n / (1.0 + lag / tau_d)
}

fn lag_axis() -> Vec<f64> {
    // Quasi-logarithmic axis starting at 1 µs.
    (0..NUM_LAG).map(|i| 1e-6 * 1.5f64.powi(i as i32)).collect()
}

fn write_workbook(path: &Path, rng: &mut SimpleRng) -> Result<(), rust_xlsxwriter::XlsxError> {
    let mut workbook = Workbook::new();
    let lags = lag_axis();

    // Per-pixel "true" parameters the sheets are derived from.
    let n_pixels = WIDTH * HEIGHT;
    let particle_n: Vec<f64> = (0..n_pixels).map(|_| rng.gauss(2.0, 0.2).abs()).collect();
    let tau_d: Vec<f64> = (0..n_pixels).map(|_| rng.gauss(1e-3, 1e-4).abs()).collect();

    let sheet = workbook.add_worksheet().set_name(SHEET_PANEL_PARAMETERS)?;
    for (row, (label, value)) in [
        ("Frame time", 0.001),
        ("Image width", WIDTH as f64),
        ("Image height", HEIGHT as f64),
        ("Binning X", 1.0),
        ("Binning Y", 1.0),
        ("Overlap", 0.0),
    ]
    .iter()
    .enumerate()
    {
        sheet.write_string(row as u32, 0, *label)?;
        sheet.write_number(row as u32, 1, *value)?;
    }

    let sheet = workbook.add_worksheet().set_name(SHEET_LAGTIME)?;
    sheet.write_string(0, 0, "index")?;
    sheet.write_string(0, 1, "lagtime")?;
    for (i, lag) in lags.iter().enumerate() {
        sheet.write_number(i as u32 + 1, 0, i as f64)?;
        sheet.write_number(i as u32 + 1, 1, *lag)?;
    }

    // Pixel (i, j) lives in row j + i*HEIGHT of the correlation sheets.
    for (name, noise) in [
        (SHEET_ACF, 0.02),
        (SHEET_SD, 0.0),
        (SHEET_FIT_FUNCTIONS, 0.0),
    ] {
        let sheet = workbook.add_worksheet().set_name(name)?;
        for i in 0..HEIGHT {
            for j in 0..WIDTH {
                let row = (j + i * HEIGHT) as u32;
                let p = i * WIDTH + j;
                sheet.write_number(row, 0, row as f64)?;
                for (lag_idx, lag) in lags.iter().enumerate() {
                    let value = if name == SHEET_SD {
                        0.01
                    } else {
                        let g = acf_model(*lag, particle_n[p], tau_d[p]);
                        g + rng.gauss(0.0, noise * g)
                    };
                    sheet.write_number(row, lag_idx as u16 + 1, value)?;
                }
            }
        }
    }

    // Fit parameters: header row, then one row per pixel offset by one.
    let sheet = workbook.add_worksheet().set_name(SHEET_FIT_PARAMETERS)?;
    for (col, label) in ["pixel", "fitted", "N", "D", "chi2"].iter().enumerate() {
        sheet.write_string(0, col as u16, *label)?;
    }
    for i in 0..HEIGHT {
        for j in 0..WIDTH {
            let row = (j + i * HEIGHT) as u32 + 1;
            let p = i * WIDTH + j;
            let fitted = particle_n[p] > 1.0;
            sheet.write_number(row, 0, (row - 1) as f64)?;
            sheet.write_string(row, 1, if fitted { "true" } else { "false" })?;
            sheet.write_number(row, 2, particle_n[p])?;
            // Diffusion time in seconds; the reader rescales to ps.
            sheet.write_number(row, 3, tau_d[p])?;
            sheet.write_number(row, 4, rng.gauss(1.0, 0.1))?;
        }
    }

    // PSF calibration: binning rows first, then the sentinel and the scan
    // parameters two rows below the last binning row.
    let sheet = workbook.add_worksheet().set_name(SHEET_PSF)?;
    let (psf_start, psf_end, psf_step): (f64, f64, f64) = (0.7, 1.0, 0.1);
    let num_psf = ((psf_end - psf_start) / psf_step + 1.0).ceil() as usize;
    let num_bin = 5;
    sheet.write_string(0, 0, "bin")?;
    for j in 0..num_bin {
        let row = j as u32 + 1;
        sheet.write_number(row, 0, (j + 1) as f64)?;
        for i in 0..num_psf {
            let col = (i * 3) as u16;
            let d = 20.0 + 2.0 * (i as f64 - 1.5) * j as f64;
            sheet.write_number(row, col + 1, d)?;
            sheet.write_number(row, col + 2, d * 0.05)?;
        }
    }
    let sentinel_row = num_bin as u32 + 2;
    for (col, label) in ["PSF start", "PSF end", "PSF step"].iter().enumerate() {
        sheet.write_string(sentinel_row, col as u16, *label)?;
    }
    sheet.write_number(sentinel_row + 1, 0, psf_start)?;
    sheet.write_number(sentinel_row + 1, 1, psf_end)?;
    sheet.write_number(sentinel_row + 1, 2, psf_step)?;

    workbook.save(path)
}

fn write_metadata_workbook(path: &Path) -> Result<(), rust_xlsxwriter::XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet().set_name("acquisition")?;
    sheet.write_string(0, 0, "Camera")?;
    sheet.write_string(0, 1, "EMCCD")?;
    workbook.save(path)
}

fn write_stack(path: &Path, rng: &mut SimpleRng) -> Result<(), Box<dyn std::error::Error>> {
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(file)?;
    for _ in 0..NUM_FRAMES {
        let pixels: Vec<u16> = (0..WIDTH * HEIGHT)
            .map(|_| rng.gauss(1000.0, 50.0).max(0.0) as u16)
            .collect();
        encoder.write_image::<colortype::Gray16>(WIDTH as u32, HEIGHT as u32, &pixels)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sample_data".to_string());
    let output_dir = Path::new(&output_dir);
    std::fs::create_dir_all(output_dir)?;

    let mut rng = SimpleRng::new(42);
    let keys = ["exp1_cell1", "exp1_cell2", "exp1_cell3"];

    for key in keys {
        write_stack(&output_dir.join(format!("{key}_AVR.tif")), &mut rng)?;
        write_workbook(&output_dir.join(format!("{key}_ACF.xlsx")), &mut rng)?;
        write_metadata_workbook(&output_dir.join(format!("{key}_metadata.xlsx")))?;
    }

    println!(
        "Wrote {} file groups ({WIDTH}x{HEIGHT} px, {NUM_LAG} lag times, {NUM_FRAMES} frames) to {}",
        keys.len(),
        output_dir.display()
    );
    Ok(())
}
