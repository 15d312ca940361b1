//! Page cleanup before OCR: grayscale, then binarize.

use std::io::Cursor;

use clap::ValueEnum;
use image::{GrayImage, ImageFormat, Luma};
use imageproc::contrast::{adaptive_threshold, otsu_level};

use crate::{page_iter::Page, prelude::*};

/// Neighborhood radius for adaptive thresholding (an 11×11 block).
const ADAPTIVE_BLOCK_RADIUS: u32 = 5;

/// How to binarize a page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ThresholdMethod {
    /// One global threshold chosen by Otsu's method. Best for clean scans.
    #[default]
    Otsu,
    /// Threshold each pixel against its neighborhood. Copes with uneven
    /// lighting and shadows.
    Adaptive,
    /// Grayscale only.
    None,
}

/// Convert a page to a grayscale, binarized PNG.
///
/// CPU-bound, so call this from a blocking thread.
pub fn preprocess_page(page: &Page, method: ThresholdMethod) -> Result<Page> {
    let image = image::load_from_memory(&page.data)
        .with_context(|| format!("failed to decode {} page", page.mime_type))?;
    let gray = binarize(image.into_luma8(), method);

    let mut data = Vec::new();
    gray.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .context("failed to encode preprocessed page")?;
    Ok(Page {
        mime_type: "image/png".to_owned(),
        data,
    })
}

/// Apply a threshold to a grayscale image.
pub fn binarize(gray: GrayImage, method: ThresholdMethod) -> GrayImage {
    match method {
        ThresholdMethod::Otsu => {
            let level = otsu_level(&gray);
            trace!(level, "Otsu threshold");
            let mut out = gray;
            for Luma([value]) in out.pixels_mut() {
                *value = if *value > level { 255 } else { 0 };
            }
            out
        }
        ThresholdMethod::Adaptive => adaptive_threshold(&gray, ADAPTIVE_BLOCK_RADIUS),
        ThresholdMethod::None => gray,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Dark "text" on the left half, light paper on the right, with a little
    /// noise in each.
    fn two_tone() -> GrayImage {
        GrayImage::from_fn(20, 10, |x, y| {
            let noise = ((x + y) % 3) as u8 * 5;
            if x < 10 { Luma([40 + noise]) } else { Luma([200 + noise]) }
        })
    }

    #[test]
    fn otsu_separates_ink_from_paper() {
        let out = binarize(two_tone(), ThresholdMethod::Otsu);
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
        assert_eq!(out.get_pixel(2, 2)[0], 0);
        assert_eq!(out.get_pixel(17, 7)[0], 255);
    }

    #[test]
    fn adaptive_output_is_binary() {
        let out = binarize(two_tone(), ThresholdMethod::Adaptive);
        assert_eq!(out.dimensions(), (20, 10));
        assert!(out.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn none_keeps_grayscale() {
        let out = binarize(two_tone(), ThresholdMethod::None);
        assert_eq!(out, two_tone());
    }

    #[test]
    fn preprocess_page_produces_png() -> Result<()> {
        let mut data = Vec::new();
        image::DynamicImage::ImageLuma8(two_tone())
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        let page = Page {
            mime_type: "image/png".to_owned(),
            data,
        };

        let out = preprocess_page(&page, ThresholdMethod::Otsu)?;
        assert_eq!(out.mime_type, "image/png");
        let decoded = image::load_from_memory(&out.data)?;
        assert_eq!(decoded.color(), image::ColorType::L8);
        Ok(())
    }

    #[test]
    fn garbage_pages_are_errors() {
        let page = Page {
            mime_type: "image/png".to_owned(),
            data: b"not an image".to_vec(),
        };
        assert!(preprocess_page(&page, ThresholdMethod::Otsu).is_err());
    }
}
