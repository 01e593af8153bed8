//! Image I/O

use crate::buffer::Buffer2D;
use crate::geometry::Vector3f;
use crate::raydn::*;
use exr::prelude as exrs;
use exr::prelude::*;
use image::*;
use std::ffi::OsStr;
use std::path::Path;

/// Read a single layer OpenEXR file into a color buffer.
///
/// * `path` - Input file path.
pub fn read_exr(path: &str) -> std::result::Result<Buffer2D<Vector3f>, String> {
    let reader = exrs::read()
        .no_deep_data()
        .largest_resolution_level()
        .rgba_channels(
            |resolution, _channels| {
                Buffer2D::new(resolution.width(), resolution.height(), Vector3f::zero())
            },
            |buffer, position, (r, g, b, _a): (f32, f32, f32, f32)| {
                buffer.set(position.x(), position.y(), Vector3f::new(r, g, b));
            },
        )
        .first_valid_layer()
        .all_attributes();

    // Return the pixel buffer.
    match reader.from_file(path) {
        Ok(image) => {
            let pixels = image.layer_data.channel_data.pixels;
            info!(
                "Read EXR image {path} ({} x {})",
                pixels.width(),
                pixels.height()
            );
            Ok(pixels)
        }
        Err(err) => Err(err.to_string()),
    }
}

/// Write a color buffer to an output file. The format is selected by the
/// file extension: `.exr` stores linear floating point data, `.png` stores
/// gamma corrected 8-bit data.
///
/// * `path`   - Output file path.
/// * `buffer` - The color buffer to serialize.
pub fn write_image(path: &str, buffer: &Buffer2D<Vector3f>) -> std::result::Result<(), String> {
    match Path::new(path).extension().and_then(OsStr::to_str) {
        Some("exr") => write_exr(path, buffer),
        Some("png") => write_8_bit(path, buffer, ImageFormat::Png),
        Some(extension) => Err(format!("Extension {extension} is not supported")),
        None => Err(format!(
            "Can't determine file type from suffix of filename {path}"
        )),
    }
}

/// Writes the buffer in OpenEXR format.
///
/// * `path`   - Output file path.
/// * `buffer` - The color buffer to serialize.
fn write_exr(path: &str, buffer: &Buffer2D<Vector3f>) -> std::result::Result<(), String> {
    info!(
        "Writing image {} with resolution {}x{}",
        path,
        buffer.width(),
        buffer.height()
    );

    let size = Vec2(buffer.width(), buffer.height());

    let layer = Layer::new(
        size,
        LayerAttributes::named("denoised"),
        Encoding::SMALL_LOSSLESS,
        SpecificChannels::rgb(|pos: Vec2<usize>| {
            let p = buffer.get(pos.0, pos.1);
            (p.x, p.y, p.z)
        }),
    );

    let attributes = ImageAttributes::new(IntegerBounds::from_dimensions(size));
    match Image::empty(attributes).with_layer(layer).write().to_file(path) {
        Ok(()) => Ok(()),
        Err(err) => Err(format!("Error saving output image {path}: {err}")),
    }
}

/// Writes the buffer in an 8-bit image format.
///
/// * `path`         - Output file path.
/// * `buffer`       - The color buffer to serialize.
/// * `image_format` - Image format.
fn write_8_bit(
    path: &str,
    buffer: &Buffer2D<Vector3f>,
    image_format: ImageFormat,
) -> std::result::Result<(), String> {
    info!(
        "Writing image {} with resolution {}x{}",
        path,
        buffer.width(),
        buffer.height()
    );

    // Allocate an image buffer; 8-bit format needs gamma applied.
    let mut imgbuf = ImageBuffer::new(buffer.width() as u32, buffer.height() as u32);
    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            imgbuf.put_pixel(x as u32, y as u32, Rgb(apply_gamma(&buffer.get(x, y))));
        }
    }

    // Write the output file.
    match imgbuf.save_with_format(path, image_format) {
        Ok(()) => Ok(()),
        Err(err) => Err(format!("Error saving output image {path}: {err}.")),
    }
}

/// Apply gamma correction to convert a linear color value to 8-bit sRGB.
///
/// * `p` - The linear color value.
fn apply_gamma(p: &Vector3f) -> [u8; 3] {
    [to_8_bit(p.x), to_8_bit(p.y), to_8_bit(p.z)]
}

/// Apply gamma correction to a single channel and clamp to 8-bit range.
///
/// * `v` - The linear channel value.
fn to_8_bit(v: Float) -> u8 {
    clamp(255.0 * gamma_correct(v) + 0.5, 0.0, 255.0) as u8
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_maps_unit_range_to_8_bit() {
        assert_eq!(to_8_bit(0.0), 0);
        assert_eq!(to_8_bit(1.0), 255);
        assert_eq!(to_8_bit(2.0), 255);
        assert_eq!(to_8_bit(-1.0), 0);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let buffer = Buffer2D::new(1, 1, Vector3f::zero());
        assert!(write_image("out.bmp", &buffer).is_err());
        assert!(write_image("out", &buffer).is_err());
    }
}
