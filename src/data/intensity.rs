//! Average-intensity stacks: multi-page grayscale TIFF -> `Array3<f64>`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::Array3;
use tiff::decoder::{Decoder, DecodingResult};

use crate::error::{ImfcsError, Result};

/// Read every page of a grayscale TIFF into a `(frames, height, width)`
/// array. All integer and float sample formats are widened to `f64`.
pub fn read_stack(path: &Path) -> Result<Array3<f64>> {
    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)?;

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let mut data: Vec<f64> = Vec::new();
    let mut frames = 0usize;

    loop {
        let (w, h) = decoder.dimensions()?;
        if (w as usize, h as usize) != (width, height) {
            return Err(ImfcsError::DimensionMismatch {
                expected: vec![height, width],
                actual: vec![h as usize, w as usize],
            });
        }

        append_samples(decoder.read_image()?, &mut data);
        frames += 1;

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    Array3::from_shape_vec((frames, height, width), data).map_err(|_| {
        ImfcsError::DimensionMismatch {
            expected: vec![frames, height, width],
            actual: vec![],
        }
    })
}

fn append_samples(result: DecodingResult, out: &mut Vec<f64>) {
    match result {
        DecodingResult::U8(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::U16(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::U32(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::U64(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::I8(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::I16(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::I32(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::I64(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::F32(v) => out.extend(v.iter().map(|&s| s as f64)),
        DecodingResult::F64(v) => out.extend(v),
    }
}
