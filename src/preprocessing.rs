/// Preprocessing for canvas drawings sent by clients.
/// Turns a base64 image payload into the normalized single-channel input
/// the digit model expects. Do not use these functions to load images for
/// any other purpose.
use base64::{engine::general_purpose, Engine as _};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};

use crate::error::Error;
use crate::model::IMAGE_SIDE;

/// How drawn strokes are read out of the decoded image.
///
/// The browser canvas the original client ships draws black-on-transparent,
/// so the strokes live entirely in the alpha channel and the RGB channels
/// are useless. Clients that send true RGB drawings should select
/// `Luminance` instead; silently applying the alpha convention to them
/// would produce garbage input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPolicy {
    /// Read stroke intensity from the alpha channel when one is present.
    /// Falls back to luminance for images without alpha.
    #[default]
    AlphaAsInk,
    /// Standard grayscale conversion of the color channels.
    Luminance,
}

/// A decoded drawing, normalized to the model's input contract:
/// single channel, 28x28, values in [0, 1], row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pixels: Vec<f32>,
}

impl NormalizedImage {
    /// True when every pixel is exactly zero, i.e. the canvas was empty.
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&value| value == 0.0)
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Convert to the (1, 1, 28, 28) tensor shape the model consumes.
    pub fn to_tensor<B: burn::tensor::backend::Backend>(
        &self,
        device: &B::Device,
    ) -> burn::tensor::Tensor<B, 4> {
        let data =
            burn::tensor::TensorData::new(self.pixels.clone(), [1, 1, IMAGE_SIDE, IMAGE_SIDE]);
        burn::tensor::Tensor::from_data(data, device)
    }
}

/// Decode a client payload into a normalized image.
///
/// The payload is either a bare base64 string or a data URL such as
/// `data:image/png;base64,...`; the prefix is stripped before decoding.
pub fn decode_payload(payload: &str, policy: ChannelPolicy) -> Result<NormalizedImage, Error> {
    let encoded = match payload.split_once("base64,") {
        Some((_, rest)) => rest,
        None => payload,
    };
    let bytes = general_purpose::STANDARD.decode(encoded.trim())?;

    decode_image_bytes(&bytes, policy)
}

/// Decode raw image bytes (any format the `image` crate understands).
pub fn decode_image_bytes(bytes: &[u8], policy: ChannelPolicy) -> Result<NormalizedImage, Error> {
    let img = image::load_from_memory(bytes)?;
    Ok(normalize(&img, policy))
}

/// Apply the channel policy and scale to the model's input contract.
pub fn normalize(img: &DynamicImage, policy: ChannelPolicy) -> NormalizedImage {
    let gray = match policy {
        ChannelPolicy::AlphaAsInk if img.color().has_alpha() => alpha_as_gray(img),
        _ => img.to_luma8(),
    };

    // The canvas already draws at 28x28; anything else gets an explicit
    // resize rather than a hard error, so alternative clients still work.
    let side = IMAGE_SIDE as u32;
    let gray = if gray.dimensions() == (side, side) {
        gray
    } else {
        imageops::resize(&gray, side, side, FilterType::CatmullRom)
    };

    let pixels = gray
        .pixels()
        .map(|pixel| pixel.0[0] as f32 / 255.0)
        .collect();

    NormalizedImage { pixels }
}

/// Read the alpha channel out as a grayscale image.
/// Equivalent to replicating alpha into all three color channels and then
/// taking luminance, since the luminance weights sum to one.
fn alpha_as_gray(img: &DynamicImage) -> GrayImage {
    let rgba = img.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        image::Luma([rgba.get_pixel(x, y).0[3]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn data_url(img: DynamicImage) -> String {
        format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(png_bytes(img))
        )
    }

    /// A 28x28 transparent canvas with a few opaque "stroke" pixels,
    /// the way the browser canvas encodes a drawing.
    fn stroke_canvas() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(28, 28, Rgba([0, 0, 0, 0]));
        for x in 5..20 {
            img.put_pixel(x, 14, Rgba([0, 0, 0, 255]));
            img.put_pixel(x, 15, Rgba([0, 0, 0, 128]));
        }
        img
    }

    #[test]
    fn alpha_replication_matches_direct_alpha_read() {
        let rgba = stroke_canvas();

        // Build the equivalent RGB image the original workaround would
        // produce: every color channel replaced by the alpha value.
        let rgb = RgbImage::from_fn(28, 28, |x, y| {
            let a = rgba.get_pixel(x, y).0[3];
            Rgb([a, a, a])
        });

        let from_alpha = normalize(&DynamicImage::ImageRgba8(rgba), ChannelPolicy::AlphaAsInk);
        let from_rgb = normalize(&DynamicImage::ImageRgb8(rgb), ChannelPolicy::Luminance);

        assert_eq!(from_alpha, from_rgb);
    }

    #[test]
    fn transparent_canvas_is_blank() {
        let img = RgbaImage::from_pixel(28, 28, Rgba([0, 0, 0, 0]));
        let normalized = normalize(&DynamicImage::ImageRgba8(img), ChannelPolicy::AlphaAsInk);

        assert!(normalized.is_blank());
        assert_eq!(normalized.pixels().len(), 28 * 28);
    }

    #[test]
    fn drawn_canvas_is_not_blank() {
        let normalized = normalize(
            &DynamicImage::ImageRgba8(stroke_canvas()),
            ChannelPolicy::AlphaAsInk,
        );

        assert!(!normalized.is_blank());
        let max = normalized.pixels().iter().cloned().fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn data_url_prefix_is_stripped() {
        let img = DynamicImage::ImageRgba8(stroke_canvas());
        let bare = general_purpose::STANDARD.encode(png_bytes(img.clone()));

        let with_prefix = decode_payload(&data_url(img), ChannelPolicy::AlphaAsInk).unwrap();
        let without_prefix = decode_payload(&bare, ChannelPolicy::AlphaAsInk).unwrap();

        assert_eq!(with_prefix, without_prefix);
    }

    #[test]
    fn oversized_input_is_resized() {
        let img = RgbaImage::from_pixel(56, 56, Rgba([0, 0, 0, 255]));
        let normalized = normalize(&DynamicImage::ImageRgba8(img), ChannelPolicy::AlphaAsInk);

        assert_eq!(normalized.pixels().len(), 28 * 28);
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        let result = decode_payload("data:image/png;base64,???not-base64???", Default::default());
        assert!(matches!(result, Err(crate::error::Error::Base64(_))));
    }

    #[test]
    fn valid_base64_with_garbage_bytes_is_a_decode_error() {
        let garbage = general_purpose::STANDARD.encode(b"not an image at all");
        let result = decode_payload(&garbage, Default::default());
        assert!(matches!(result, Err(crate::error::Error::ImageDecode(_))));
    }
}
