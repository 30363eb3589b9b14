use image::{GrayImage, Luma};
use ndarray::Array2;

/// Converts a flux array into an 8-bit grayscale preview.
///
/// Values are mapped through `asinh(v / softening)` between the array minimum
/// and maximum, which keeps faint lensed arcs visible next to bright cores.
/// Array row 0 is the bottom of the sky image, so rows are flipped to put
/// north up in the output picture.
///
/// # Arguments
/// * `arr` - Flux image indexed as `[y, x]`
/// * `softening` - Flux level where the stretch turns from linear to logarithmic
///
/// # Returns
/// * A new GrayImage with the same width and height
pub fn asinh_gray_image(arr: &Array2<f64>, softening: f64) -> GrayImage {
    let (height, width) = arr.dim();
    let softening = if softening > 0.0 { softening } else { 1.0 };

    let stretch = |v: f64| (v / softening).asinh();
    let (lo, hi) = arr
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(stretch(v)), hi.max(stretch(v)))
        });
    let range = if hi > lo { hi - lo } else { 1.0 };

    let mut img = GrayImage::new(width as u32, height as u32);
    for ((y, x), &v) in arr.indexed_iter() {
        let level = if v.is_finite() {
            ((stretch(v) - lo) / range * 255.0).round().clamp(0.0, 255.0) as u8
        } else {
            0
        };
        img.put_pixel(x as u32, (height - 1 - y) as u32, Luma([level]));
    }

    img
}
