use std::path::Path;

use anyhow::Context;
use image::{imageops, ImageBuffer, Luma};

/// Writes a frames x bands dB spectrogram as a grayscale PNG, low bands at
/// the bottom, time running left to right.
pub fn spectrogram_to_png(spectrogram: &[Vec<f32>], path: &Path) -> anyhow::Result<()> {
    let (width, height) = (
        spectrogram.len(),
        spectrogram.first().map_or(0, Vec::len),
    );
    anyhow::ensure!(width > 0 && height > 0, "cannot render an empty spectrogram");

    let (min, max) = spectrogram
        .iter()
        .flatten()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = (max - min).max(f32::EPSILON);

    let mut canvas: ImageBuffer<Luma<u8>, Vec<u8>> =
        ImageBuffer::new(height as u32, width as u32);
    canvas
        .rows_mut()
        .zip(spectrogram)
        .for_each(|(row, spect_row)| {
            row.zip(spect_row).for_each(|(pixel, value)| {
                *pixel = Luma([((value - min) / range * u8::MAX as f32) as u8])
            })
        });
    let rotated = imageops::rotate270(&canvas);
    rotated
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_time_along_x() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mel.png");
        let spectrogram = vec![vec![0.0, -80.0, -40.0]; 5];
        spectrogram_to_png(&spectrogram, &path).unwrap();

        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (5, 3));
        // band 0 is the loudest and sits on the bottom row
        assert_eq!(img.get_pixel(0, 2)[0], 255);
        assert_eq!(img.get_pixel(0, 1)[0], 0);
    }

    #[test]
    fn empty_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(spectrogram_to_png(&[], &dir.path().join("x.png")).is_err());
    }
}
