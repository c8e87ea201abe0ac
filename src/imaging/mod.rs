//! Conversions between stored images and the tensors the inpainting model
//! consumes. Everything here is synchronous and CPU bound; callers run it on
//! the blocking pool.

use anyhow::{bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use ndarray::{Array2, Array4, ArrayView4, Axis};

/// Spatial stride of the model. Both axes must be a multiple of it.
pub const STRIDE: u32 = 8;

/// Mask pixels strictly brighter than this are "on".
pub const MASK_THRESHOLD: u8 = 127;

pub const OUTPUT_JPEG_QUALITY: u8 = 90;

pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).context("failed to decode image")
}

/// Rounds both dimensions down to the nearest multiple of [`STRIDE`].
/// Returns `None` when either axis would collapse to zero.
pub fn snap_to_stride(width: u32, height: u32) -> Option<(u32, u32)> {
    let w = width / STRIDE * STRIDE;
    let h = height / STRIDE * STRIDE;
    (w > 0 && h > 0).then_some((w, h))
}

/// RGB source resized (Lanczos) to `width`×`height` if needed.
pub fn prepare_image(image: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    if rgb.dimensions() == (width, height) {
        return rgb;
    }
    imageops::resize(&rgb, width, height, FilterType::Lanczos3)
}

/// Grayscale mask resized with nearest neighbour so hard edges survive.
pub fn prepare_mask(mask: &DynamicImage, width: u32, height: u32) -> GrayImage {
    let gray = mask.to_luma8();
    if gray.dimensions() == (width, height) {
        return gray;
    }
    imageops::resize(&gray, width, height, FilterType::Nearest)
}

/// Thresholds the mask to {0, 1} (1 = region to inpaint) and applies the
/// polarity heuristic. Returns the mask and whether it was inverted.
pub fn binarize_mask(mask: &GrayImage) -> (Array2<f32>, bool) {
    let (w, h) = mask.dimensions();
    let mut binary = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        if mask.get_pixel(x as u32, y as u32)[0] > MASK_THRESHOLD {
            1.0
        } else {
            0.0
        }
    });
    let inverted = apply_polarity(&mut binary);
    (binary, inverted)
}

/// Polarity heuristic: if the mean of the "on" pixels (> 0.5) is below the
/// midpoint, the mask was authored with the opposite convention and is
/// inverted. An empty "on" region is left untouched.
///
/// Heuristic only. On an already binarized mask the "on" mean is always 1.0,
/// so it never fires there.
pub fn apply_polarity(mask: &mut Array2<f32>) -> bool {
    let (sum, count) = mask
        .iter()
        .filter(|v| **v > 0.5)
        .fold((0.0f32, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 || sum / count as f32 >= 0.5 {
        return false;
    }
    mask.mapv_inplace(|v| 1.0 - v);
    true
}

/// `1×3×H×W`, channel first, values in 0–1.
pub fn image_to_tensor(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
}

/// `1×1×H×W`.
pub fn mask_to_tensor(mask: Array2<f32>) -> Array4<f32> {
    mask.insert_axis(Axis(0)).insert_axis(Axis(0))
}

/// Converts the model output (`N×3×H×W`, 0–1) back to 8-bit RGB, clipping
/// out-of-range values. Only the first batch item is used.
pub fn tensor_to_image(tensor: ArrayView4<f32>) -> Result<RgbImage> {
    let shape = tensor.shape();
    if shape[0] < 1 || shape[1] != 3 {
        bail!("unexpected output tensor shape {:?}, want 1x3xHxW", shape);
    }
    let (h, w) = (shape[2], shape[3]);
    if h == 0 || w == 0 {
        bail!("output tensor has an empty spatial size {:?}", shape);
    }

    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let at = |c: usize| to_u8(tensor[[0, c, y as usize, x as usize]]);
        Rgb([at(0), at(1), at(2)])
    }))
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0) as u8
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(image)
        .context("failed to encode jpeg")?;
    Ok(buf)
}
