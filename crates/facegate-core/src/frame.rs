//! Captured images: grayscale conversion, cropping, resizing.

use crate::types::Rect;
use image::DynamicImage;
use ndarray::{s, Array2, Array3, ArrayView2};
use std::path::Path;
use thiserror::Error;

// Fixed-point luminance weights (sum = 1 << 14): Y = 0.299 R + 0.587 G + 0.114 B.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("unsupported channel count: {0} (expected 3 or 4)")]
    UnsupportedChannels(usize),
    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("pixel buffer does not match dimensions: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A captured image, owned by the caller for the duration of one request.
#[derive(Debug, Clone)]
pub enum Image {
    /// `height x width` intensities.
    Gray(Array2<u8>),
    /// `height x width x channels`, channels in RGB(A) order.
    Color(Array3<u8>),
}

impl Image {
    pub fn gray(pixels: Array2<u8>) -> Self {
        Image::Gray(pixels)
    }

    /// Wrap an RGB or RGBA array. Any other channel count is rejected.
    pub fn color(pixels: Array3<u8>) -> Result<Self, ImageError> {
        match pixels.dim().2 {
            3 | 4 => Ok(Image::Color(pixels)),
            n => Err(ImageError::UnsupportedChannels(n)),
        }
    }

    /// Adapt a decoded `image` buffer without changing its pixel values.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self, ImageError> {
        let (w, h) = (img.width() as usize, img.height() as usize);
        match img {
            DynamicImage::ImageLuma8(gray) => {
                Ok(Image::Gray(Array2::from_shape_vec((h, w), gray.as_raw().clone())?))
            }
            other if other.color().has_alpha() => {
                let rgba = other.to_rgba8().into_raw();
                Ok(Image::Color(Array3::from_shape_vec((h, w, 4), rgba)?))
            }
            other if !other.color().has_color() => {
                let luma = other.to_luma8().into_raw();
                Ok(Image::Gray(Array2::from_shape_vec((h, w), luma)?))
            }
            other => {
                let rgb = other.to_rgb8().into_raw();
                Ok(Image::Color(Array3::from_shape_vec((h, w, 3), rgb)?))
            }
        }
    }

    /// Decode an image file (PNG, JPEG, ... as supported by `image`).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let decoded = image::open(path)?;
        Self::from_dynamic(&decoded)
    }

    pub fn width(&self) -> usize {
        match self {
            Image::Gray(p) => p.ncols(),
            Image::Color(p) => p.dim().1,
        }
    }

    pub fn height(&self) -> usize {
        match self {
            Image::Gray(p) => p.nrows(),
            Image::Color(p) => p.dim().0,
        }
    }

    /// Luminance-only view of the image. Color information is discarded.
    pub fn to_grayscale(&self) -> Array2<u8> {
        match self {
            Image::Gray(p) => p.clone(),
            Image::Color(p) => {
                let (h, w, _) = p.dim();
                Array2::from_shape_fn((h, w), |(y, x)| {
                    luminance(p[[y, x, 0]], p[[y, x, 1]], p[[y, x, 2]])
                })
            }
        }
    }
}

fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B;
    ((y + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8
}

/// Copy out the pixels under `rect`. The rect must already lie inside the image.
pub fn crop(gray: &Array2<u8>, rect: &Rect) -> Array2<u8> {
    let (x0, y0) = (rect.x as usize, rect.y as usize);
    let (x1, y1) = (rect.right() as usize, rect.bottom() as usize);
    gray.slice(s![y0..y1, x0..x1]).to_owned()
}

/// Resize with bilinear interpolation using pixel-center alignment.
///
/// Source coordinates are `(dst + 0.5) * scale - 0.5`, clamped to the border,
/// so an identity-size resize returns the input unchanged.
pub fn resize_bilinear(src: ArrayView2<u8>, out_width: usize, out_height: usize) -> Array2<u8> {
    let (height, width) = src.dim();
    if width == 0 || height == 0 || out_width == 0 || out_height == 0 {
        return Array2::zeros((out_height, out_width));
    }

    let scale_x = width as f32 / out_width as f32;
    let scale_y = height as f32 / out_height as f32;
    let mut resized = Array2::<u8>::zeros((out_height, out_width));

    for y in 0..out_height {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..out_width {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[[y0, x0]] as f32;
            let tr = src[[y0, x1]] as f32;
            let bl = src[[y1, x0]] as f32;
            let br = src[[y1, x1]] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[[y, x]] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}
