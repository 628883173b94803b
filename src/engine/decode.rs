//! Bytes to [`DecodedImage`] for both loaders.

use super::{DecoderConfig, EngineError};
use crate::model::{DecodedImage, GraySamples, PixelData, Voi};
use crate::utils::value_to_string;
use dicom::core::header::Header;
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{from_reader, DefaultDicomObject};
use dicom::pixeldata::{
    DecodedPixelData, PhotometricInterpretation, PixelDecoder, PlanarConfiguration,
};
use std::collections::BTreeMap;
use std::io::Cursor;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8] = b"DICM";

/// Decode a DICOM Part 10 file, first frame only.
pub fn decode_medical(
    bytes: &[u8],
    config: &DecoderConfig,
    downsample: u32,
) -> Result<DecodedImage, EngineError> {
    let object = parse_object(bytes)?;
    check_budget(&object, config, downsample)?;

    let decoded = object
        .decode_pixel_data()
        .map_err(|err| EngineError::Decode(format!("failed to decode pixel data: {err}")))?;
    if decoded.number_of_frames() == 0 {
        return Err(EngineError::Decode("no frames in pixel data".into()));
    }

    let width = decoded.columns();
    let height = decoded.rows();
    let photometric = decoded.photometric_interpretation().clone();
    let (pixels, channels) = if photometric.is_monochrome() {
        (PixelData::Gray(monochrome_samples(&decoded, config)?), 1)
    } else if matches!(photometric, PhotometricInterpretation::Rgb) {
        (PixelData::Rgba(rgb_to_rgba(&decoded)?), 4)
    } else {
        (PixelData::Rgba(fallback_to_rgba(&decoded, photometric.as_str())?), 4)
    };
    let (pixels, width, height) = subsample_pixels(pixels, width, height, channels, downsample);

    let mut image = DecodedImage::medical(width, height, pixels, collect_attributes(&object))
        .with_invert(matches!(photometric, PhotometricInterpretation::Monochrome1));
    if config.high_bit_depth {
        if let Some(voi) = window_from_tags(&object) {
            image = image.with_voi(voi);
        }
    }
    Ok(image)
}

/// Decode a plain web image (PNG, JPEG, GIF, BMP).
pub fn decode_raster(
    bytes: &[u8],
    config: &DecoderConfig,
    downsample: u32,
) -> Result<DecodedImage, EngineError> {
    let mut reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| EngineError::Format(format!("unreadable image: {err}")))?;
    let mut limits = image::Limits::default();
    limits.max_alloc = Some(config.max_decode_bytes as u64);
    reader.limits(limits);

    let decoded = reader.decode().map_err(|err| match err {
        image::ImageError::Limits(limit) => EngineError::Memory(limit.to_string()),
        other => EngineError::Format(other.to_string()),
    })?;
    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    let (pixels, width, height) =
        subsample_pixels(PixelData::Rgba(rgba.into_raw()), width, height, 4, downsample);
    match pixels {
        PixelData::Rgba(rgba) => Ok(DecodedImage::raster(width, height, rgba)),
        PixelData::Gray(_) => Err(EngineError::Decode("raster decode produced gray".into())),
    }
}

fn parse_object(bytes: &[u8]) -> Result<DefaultDicomObject, EngineError> {
    let body = if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
    {
        &bytes[PREAMBLE_LEN..]
    } else if bytes.starts_with(MAGIC) {
        bytes
    } else {
        return Err(EngineError::Format("missing DICM magic".into()));
    };

    from_reader(Cursor::new(body))
        .map_err(|err| EngineError::Format(format!("failed to parse DICOM: {err}")))
}

fn int_attribute(object: &DefaultDicomObject, tag: Tag) -> Option<u64> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_int::<u64>().ok())
}

fn check_budget(
    object: &DefaultDicomObject,
    config: &DecoderConfig,
    downsample: u32,
) -> Result<(), EngineError> {
    let rows = int_attribute(object, tags::ROWS).unwrap_or(0);
    let columns = int_attribute(object, tags::COLUMNS).unwrap_or(0);
    let frames = int_attribute(object, tags::NUMBER_OF_FRAMES).unwrap_or(1).max(1);
    let samples = int_attribute(object, tags::SAMPLES_PER_PIXEL).unwrap_or(1).max(1);
    let bits = int_attribute(object, tags::BITS_ALLOCATED).unwrap_or(16);

    let output_per_pixel = if samples > 1 || config.high_bit_depth { 4 } else { 1 };
    let factor = u64::from(downsample.max(1));
    let budget = config.max_decode_bytes as u64;

    let Some(estimate) = decode_estimate(
        [rows, columns, samples, frames, bits.div_ceil(8)],
        output_per_pixel,
        factor,
    ) else {
        return Err(EngineError::Memory(format!(
            "{columns}x{rows} image with {frames} frames exceeds addressable memory"
        )));
    };
    if estimate > budget {
        return Err(EngineError::Memory(format!(
            "{columns}x{rows} image needs ~{estimate} bytes, budget is {budget}"
        )));
    }
    Ok(())
}

/// Raw sample bytes plus output pixels, or `None` when the header's sizes
/// overflow `u64`.
fn decode_estimate(
    [rows, columns, samples, frames, bytes_per_sample]: [u64; 5],
    output_per_pixel: u64,
    factor: u64,
) -> Option<u64> {
    let pixel_count = rows.checked_mul(columns)?;
    let raw_bytes = pixel_count
        .checked_mul(samples)?
        .checked_mul(frames)?
        .checked_mul(bytes_per_sample)?;
    let output_bytes = pixel_count.checked_mul(output_per_pixel)? / factor.saturating_mul(factor);
    raw_bytes.checked_add(output_bytes)
}

fn monochrome_samples(
    decoded: &DecodedPixelData<'_>,
    config: &DecoderConfig,
) -> Result<GraySamples, EngineError> {
    if decoded.bits_allocated() <= 8 {
        let samples = decoded
            .to_vec_frame::<u8>(0)
            .map_err(|err| EngineError::Decode(format!("failed to materialize frame: {err}")))?;
        return Ok(GraySamples::Narrow(samples));
    }

    let samples = decoded
        .to_vec_frame::<i32>(0)
        .map_err(|err| EngineError::Decode(format!("failed to materialize frame: {err}")))?;
    if config.high_bit_depth {
        return Ok(GraySamples::Wide(samples));
    }

    let (min, max) = min_max(&samples).unwrap_or((0, 0));
    Ok(GraySamples::Narrow(
        samples
            .iter()
            .map(|&value| normalize(value, min, max))
            .collect(),
    ))
}

fn rgb_to_rgba(decoded: &DecodedPixelData<'_>) -> Result<Vec<u8>, EngineError> {
    let pixel_count = (decoded.columns() * decoded.rows()) as usize;

    if decoded.bits_allocated() <= 8 {
        let samples = decoded
            .to_vec_frame::<u8>(0)
            .map_err(|err| EngineError::Decode(format!("failed to materialize RGB frame: {err}")))?;
        return match decoded.planar_configuration() {
            PlanarConfiguration::Standard => rgb_interleaved_to_rgba(&samples),
            PlanarConfiguration::PixelFirst => rgb_planar_to_rgba(&samples, pixel_count),
        }
        .map_err(EngineError::Decode);
    }

    let samples = decoded
        .to_vec_frame::<u16>(0)
        .map_err(|err| EngineError::Decode(format!("failed to materialize RGB frame: {err}")))?;
    let samples = match decoded.planar_configuration() {
        PlanarConfiguration::Standard => samples,
        PlanarConfiguration::PixelFirst => interleave_planes(&samples, pixel_count)
            .map_err(EngineError::Decode)?,
    };
    rgb_interleaved_u16_to_rgba(&samples).map_err(EngineError::Decode)
}

fn fallback_to_rgba(
    decoded: &DecodedPixelData<'_>,
    interpretation: &str,
) -> Result<Vec<u8>, EngineError> {
    decoded
        .to_dynamic_image(0)
        .map(|image| image.into_rgba8().into_raw())
        .map_err(|err| {
            EngineError::Decode(format!(
                "unsupported photometric interpretation `{interpretation}`: {err}"
            ))
        })
}

fn collect_attributes(object: &DefaultDicomObject) -> BTreeMap<Tag, String> {
    object
        .iter()
        .filter(|element| element.tag() != tags::PIXEL_DATA)
        .map(|element| (element.tag(), value_to_string(element.value(), element.vr())))
        .collect()
}

fn first_float(object: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .and_then(|value| {
            value
                .split('\\')
                .next()
                .and_then(|first| first.trim().parse::<f64>().ok())
        })
}

fn window_from_tags(object: &DefaultDicomObject) -> Option<Voi> {
    let center = first_float(object, tags::WINDOW_CENTER)?;
    let width = first_float(object, tags::WINDOW_WIDTH)?;
    (width > 0.0).then(|| Voi::new(center, width))
}

fn subsample_pixels(
    pixels: PixelData,
    width: u32,
    height: u32,
    channels: usize,
    factor: u32,
) -> (PixelData, u32, u32) {
    if factor <= 1 {
        return (pixels, width, height);
    }
    let out_w = width.div_ceil(factor);
    let out_h = height.div_ceil(factor);
    let pixels = match pixels {
        PixelData::Gray(GraySamples::Wide(samples)) => PixelData::Gray(GraySamples::Wide(
            subsample(&samples, width, height, channels, factor),
        )),
        PixelData::Gray(GraySamples::Narrow(samples)) => PixelData::Gray(GraySamples::Narrow(
            subsample(&samples, width, height, channels, factor),
        )),
        PixelData::Rgba(rgba) => PixelData::Rgba(subsample(&rgba, width, height, channels, factor)),
    };
    (pixels, out_w, out_h)
}

fn subsample<T: Copy>(data: &[T], width: u32, height: u32, channels: usize, factor: u32) -> Vec<T> {
    let (width, height, factor) = (width as usize, height as usize, factor as usize);
    let mut out = Vec::with_capacity(data.len() / (factor * factor) + channels);
    for y in (0..height).step_by(factor) {
        for x in (0..width).step_by(factor) {
            let start = (y * width + x) * channels;
            if let Some(pixel) = data.get(start..start + channels) {
                out.extend_from_slice(pixel);
            }
        }
    }
    out
}

fn rgb_interleaved_to_rgba(samples: &[u8]) -> Result<Vec<u8>, String> {
    if !samples.len().is_multiple_of(3) {
        return Err(format!(
            "RGB buffer length {} is not divisible by 3",
            samples.len()
        ));
    }
    let mut rgba = Vec::with_capacity(samples.len() / 3 * 4);
    for chunk in samples.chunks(3) {
        if let [r, g, b] = *chunk {
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    Ok(rgba)
}

fn rgb_planar_to_rgba(samples: &[u8], pixel_count: usize) -> Result<Vec<u8>, String> {
    let interleaved = interleave_planes(samples, pixel_count)?;
    rgb_interleaved_to_rgba(&interleaved)
}

fn interleave_planes<T: Copy>(samples: &[T], pixel_count: usize) -> Result<Vec<T>, String> {
    if samples.len() < pixel_count * 3 {
        return Err(format!(
            "RGB buffer length {} is too small for {pixel_count} pixels",
            samples.len()
        ));
    }
    let (r_plane, rest) = samples.split_at(pixel_count);
    let (g_plane, b_plane) = rest.split_at(pixel_count);

    let mut interleaved = Vec::with_capacity(pixel_count * 3);
    for idx in 0..pixel_count {
        interleaved.extend_from_slice(&[r_plane[idx], g_plane[idx], b_plane[idx]]);
    }
    Ok(interleaved)
}

fn rgb_interleaved_u16_to_rgba(samples: &[u16]) -> Result<Vec<u8>, String> {
    if !samples.len().is_multiple_of(3) {
        return Err(format!(
            "RGB buffer length {} is not divisible by 3",
            samples.len()
        ));
    }

    let channel = |offset: usize| samples.iter().skip(offset).step_by(3).copied();
    let ranges: Vec<(i32, i32)> = (0..3)
        .map(|offset| {
            channel(offset)
                .map(i32::from)
                .fold(None, |acc: Option<(i32, i32)>, value| match acc {
                    None => Some((value, value)),
                    Some((min, max)) => Some((min.min(value), max.max(value))),
                })
                .unwrap_or((0, 0))
        })
        .collect();

    let mut rgba = Vec::with_capacity(samples.len() / 3 * 4);
    for chunk in samples.chunks(3) {
        if let [r, g, b] = *chunk {
            rgba.extend_from_slice(&[
                normalize(i32::from(r), ranges[0].0, ranges[0].1),
                normalize(i32::from(g), ranges[1].0, ranges[1].1),
                normalize(i32::from(b), ranges[2].0, ranges[2].1),
                255,
            ]);
        }
    }
    Ok(rgba)
}

fn min_max(values: &[i32]) -> Option<(i32, i32)> {
    values.iter().copied().fold(None, |acc, value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}

fn normalize(value: i32, min: i32, max: i32) -> u8 {
    if max <= min {
        return 0;
    }

    let range = f64::from(max) - f64::from(min);
    let normalized = (f64::from(value) - f64::from(min)) / range;
    (normalized * 255.0).clamp(0.0, 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::DicomFixture;
    use crate::model::{extract, Dimensions, PixelSpacing, Size};

    fn fixture_bytes(fixture: DicomFixture) -> Vec<u8> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slice.dcm");
        fixture.write(&path).unwrap();
        std::fs::read(&path).unwrap()
    }

    #[test]
    fn test_ct_slice_decodes_with_tags_and_window() {
        let bytes = fixture_bytes(
            DicomFixture::ct(4, 4)
                .pixel_spacing("0.5\\0.7")
                .window("40", "400"),
        );
        let image = decode_medical(&bytes, &DecoderConfig::conservative(), 1).unwrap();

        assert!(image.is_medical());
        assert_eq!(image.size(), Size::new(4, 4));
        match image.pixels() {
            PixelData::Gray(samples @ GraySamples::Wide(_)) => {
                assert_eq!(samples.min_max(), Some((0.0, 15.0)));
            }
            other => panic!("expected wide gray samples, got {other:?}"),
        }
        assert_eq!(image.default_voi(), Some(Voi::new(40.0, 400.0)));
        assert_eq!(image.attribute(tags::MODALITY), Some("CT"));
        assert!(image
            .attributes()
            .is_some_and(|attributes| !attributes.contains_key(&tags::PIXEL_DATA)));

        let metadata = extract(&image);
        assert_eq!(metadata.modality.as_deref(), Some("CT"));
        assert_eq!(
            metadata.dimensions,
            Some(Dimensions {
                width: 4,
                height: 4
            })
        );
        assert_eq!(
            metadata.pixel_spacing,
            Some(PixelSpacing {
                width: 0.7,
                height: 0.5
            })
        );
    }

    #[test]
    fn test_reduced_fidelity_normalizes_to_eight_bits() {
        let bytes = fixture_bytes(DicomFixture::ct(4, 4).window("40", "400"));
        let config = DecoderConfig::conservative().reduced_fidelity();
        let image = decode_medical(&bytes, &config, 1).unwrap();

        match image.pixels() {
            PixelData::Gray(samples @ GraySamples::Narrow(_)) => {
                assert_eq!(samples.min_max(), Some((0.0, 255.0)));
            }
            other => panic!("expected narrow gray samples, got {other:?}"),
        }
        // Window tags are ignored at 8 bits.
        assert_eq!(image.default_voi(), Some(Voi::from_range(0.0, 255.0)));
    }

    #[test]
    fn test_budget_overrun_fits_once_downsampled_at_reduced_fidelity() {
        let bytes = fixture_bytes(DicomFixture::ct(64, 64));
        let mut config = DecoderConfig::conservative();
        config.max_decode_bytes = 16 * 1024;

        let err = decode_medical(&bytes, &config, 1).unwrap_err();
        assert!(err.is_memory());

        let half = decode_medical(&bytes, &config.reduced_fidelity(), 2).unwrap();
        assert_eq!(half.size(), Size::new(32, 32));
    }

    #[test]
    fn test_huge_frame_count_is_a_memory_error() {
        let bytes = fixture_bytes(DicomFixture::ct(4, 4).number_of_frames("1000000000000000000"));
        let err = decode_medical(&bytes, &DecoderConfig::conservative(), 1).unwrap_err();
        assert!(err.is_memory());
    }

    #[test]
    fn test_decode_estimate_reports_overflow() {
        assert_eq!(decode_estimate([4, 4, 1, 1, 2], 4, 2), Some(32 + 16));
        assert_eq!(decode_estimate([u64::MAX, 2, 1, 1, 2], 4, 1), None);
        assert_eq!(decode_estimate([4, 4, 1, u64::MAX / 8, 2], 1, 1), None);
    }

    #[test]
    fn test_non_dicom_bytes_are_format_errors() {
        let err = decode_medical(b"\x89PNG\r\n\x1a\n", &DecoderConfig::conservative(), 1)
            .unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_garbage_raster_is_format_error() {
        let err = decode_raster(b"not an image", &DecoderConfig::conservative(), 1).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_subsample_keeps_every_nth_pixel() {
        let data: Vec<u8> = (0..16).collect();
        assert_eq!(subsample(&data, 4, 4, 1, 2), vec![0, 2, 8, 10]);
        let (pixels, w, h) =
            subsample_pixels(PixelData::Rgba(vec![1; 3 * 3 * 4]), 3, 3, 4, 2);
        assert_eq!((w, h), (2, 2));
        assert_eq!(pixels, PixelData::Rgba(vec![1; 16]));
    }

    #[test]
    fn test_planar_rgb_is_interleaved() {
        let planar = [1u8, 2, 10, 20, 100, 200];
        assert_eq!(
            rgb_planar_to_rgba(&planar, 2).unwrap(),
            vec![1, 10, 100, 255, 2, 20, 200, 255]
        );
        assert!(rgb_interleaved_to_rgba(&[1, 2]).is_err());
    }

    #[test]
    fn test_normalize_spreads_range() {
        assert_eq!(normalize(-1000, -1000, 1000), 0);
        assert_eq!(normalize(1000, -1000, 1000), 255);
        assert_eq!(normalize(5, 5, 5), 0);
    }

    #[test]
    fn test_png_decodes_and_downsamples() {
        let mut buffer = Cursor::new(Vec::new());
        image::RgbaImage::from_pixel(4, 2, image::Rgba([9, 8, 7, 255]))
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        let bytes = buffer.into_inner();

        let full = decode_raster(&bytes, &DecoderConfig::conservative(), 1).unwrap();
        assert_eq!((full.width(), full.height()), (4, 2));
        let half = decode_raster(&bytes, &DecoderConfig::conservative(), 2).unwrap();
        assert_eq!((half.width(), half.height()), (2, 1));
        assert!(!half.is_medical());
    }
}
