//! Pixel-level cleaning of partially covered image XObjects

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat};
use lopdf::{Dictionary, Document, Object, Stream};

use super::cleanup::Color;
use super::objects::{dict_number, dict_number_array, resolve, resolve_key, stream_content};
use crate::error::{Error, Result};
use crate::geometry::{Matrix, Rectangle};

/// Re-encoded image XObject replacing the original
#[derive(Debug, Clone)]
pub struct ImageReplacement {
    pub stream: Stream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Raw,
    Flate,
    Dct,
}

/// What the sample buffer looks like
#[derive(Debug)]
struct ImageLayout {
    width: usize,
    height: usize,
    components: usize,
    /// `/Decode` pairs per component
    decode: Vec<(f64, f64)>,
}

/// Map covered device-space areas into the image's unit square
pub fn unit_areas(ctm: &Matrix, areas: &[Rectangle]) -> Result<Vec<Rectangle>> {
    let inverse = ctm.inverse().ok_or(Error::DegenerateTransform)?;
    let unit = Rectangle::new(0.0, 0.0, 1.0, 1.0);
    Ok(areas
        .iter()
        .filter_map(|area| {
            let corners = inverse.transform_rect(area);
            Rectangle::bounding(&corners)?.intersection(&unit)
        })
        .collect())
}

/// Paint `areas` (unit image space) with `color` and re-encode in the same codec family
pub fn clean_image(
    doc: &Document,
    stream: &Stream,
    areas: &[Rectangle],
    color: Color,
    jpeg_quality: u8,
) -> Result<ImageReplacement> {
    let dict = &stream.dict;
    if matches!(resolve_key(doc, dict, b"ImageMask")?, Some(Object::Boolean(true))) {
        return Err(Error::UnsupportedImageCodec("stencil mask".to_string()));
    }
    let codec = codec(doc, dict)?;
    let layout = layout(doc, dict, codec)?;

    let (mut samples, layout) = match codec {
        Codec::Raw => (stream.content.clone(), layout),
        Codec::Flate => (inflate(doc, stream)?, layout),
        Codec::Dct => decode_jpeg(&stream.content, layout)?,
    };
    let expected = layout.width * layout.height * layout.components;
    if samples.len() < expected {
        return Err(Error::UnsupportedImageCodec(format!(
            "expected {} sample bytes, found {}",
            expected,
            samples.len()
        )));
    }

    let fill = fill_samples(&layout, color);
    for area in areas {
        paint(&mut samples, &layout, area, &fill);
    }

    let mut new_dict = dict.clone();
    new_dict.remove(b"DecodeParms");
    new_dict.remove(b"Length");
    let content = match codec {
        Codec::Raw => {
            new_dict.remove(b"Filter");
            samples
        }
        Codec::Flate => {
            new_dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
            deflate(&samples)?
        }
        Codec::Dct => {
            new_dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
            encode_jpeg(&samples, &layout, jpeg_quality)?
        }
    };
    let mut replacement = Stream::new(new_dict, content);
    if codec != Codec::Raw {
        replacement.allows_compression = false;
    }
    Ok(ImageReplacement { stream: replacement })
}

fn codec(doc: &Document, dict: &Dictionary) -> Result<Codec> {
    let filters: Vec<Vec<u8>> = match resolve_key(doc, dict, b"Filter")? {
        None => vec![],
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match resolve(doc, item).ok()? {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        Some(_) => return Err(Error::UnsupportedImageCodec("malformed /Filter".to_string())),
    };
    match filters.as_slice() {
        [] => Ok(Codec::Raw),
        [single] if single == b"FlateDecode" || single == b"Fl" => Ok(Codec::Flate),
        [single] if single == b"DCTDecode" || single == b"DCT" => Ok(Codec::Dct),
        _ => Err(Error::UnsupportedImageCodec(
            filters
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
        )),
    }
}

fn layout(doc: &Document, dict: &Dictionary, codec: Codec) -> Result<ImageLayout> {
    let width = dict_number(doc, dict, b"Width").unwrap_or(0.0) as usize;
    let height = dict_number(doc, dict, b"Height").unwrap_or(0.0) as usize;
    if width == 0 || height == 0 {
        return Err(Error::UnsupportedImageCodec("missing image dimensions".to_string()));
    }
    let bits = dict_number(doc, dict, b"BitsPerComponent").unwrap_or(8.0) as u32;
    if bits != 8 && codec != Codec::Dct {
        return Err(Error::UnsupportedImageCodec(format!("{} bits per component", bits)));
    }
    let components = match resolve_key(doc, dict, b"ColorSpace")? {
        Some(space) => color_space_components(doc, space)?,
        None if codec == Codec::Dct => 0,
        None => return Err(Error::UnsupportedImageCodec("missing /ColorSpace".to_string())),
    };
    let decode = match dict_number_array(doc, dict, b"Decode") {
        Some(values) if values.len() == components * 2 => {
            values.chunks(2).map(|pair| (pair[0], pair[1])).collect()
        }
        _ => vec![(0.0, 1.0); components],
    };
    Ok(ImageLayout {
        width,
        height,
        components,
        decode,
    })
}

fn color_space_components(doc: &Document, space: &Object) -> Result<usize> {
    match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(1),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(3),
            b"DeviceCMYK" | b"CMYK" => Ok(4),
            other => Err(unsupported_space(other)),
        },
        Object::Array(items) => {
            let family = items.first().and_then(|o| resolve(doc, o).ok()).and_then(|o| match o {
                Object::Name(n) => Some(n.as_slice()),
                _ => None,
            });
            match family {
                Some(b"CalGray") => Ok(1),
                Some(b"CalRGB") => Ok(3),
                Some(b"ICCBased") => {
                    let profile = items.get(1).map(|o| resolve(doc, o)).transpose()?;
                    let n = match profile {
                        Some(Object::Stream(s)) => dict_number(doc, &s.dict, b"N"),
                        _ => None,
                    };
                    match n {
                        Some(n) if n == 1.0 || n == 3.0 || n == 4.0 => Ok(n as usize),
                        _ => Err(unsupported_space(b"ICCBased")),
                    }
                }
                Some(other) => Err(unsupported_space(other)),
                None => Err(unsupported_space(b"[]")),
            }
        }
        _ => Err(unsupported_space(b"?")),
    }
}

fn unsupported_space(name: &[u8]) -> Error {
    Error::UnsupportedImageCodec(format!("colour space {}", String::from_utf8_lossy(name)))
}

/// FlateDecode samples through lopdf, which also undoes PNG predictors. lopdf only
/// reads a direct `/DecodeParms` dictionary, so references and single-filter arrays
/// are resolved first.
fn inflate(doc: &Document, stream: &Stream) -> Result<Vec<u8>> {
    let mut dict = stream.dict.clone();
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    let params = match resolve_key(doc, &stream.dict, b"DecodeParms")? {
        Some(Object::Dictionary(d)) => Some(d.clone()),
        Some(Object::Array(items)) => match items.first().map(|o| resolve(doc, o)).transpose()? {
            Some(Object::Dictionary(d)) => Some(d.clone()),
            _ => None,
        },
        _ => None,
    };
    match params {
        Some(params) => dict.set("DecodeParms", Object::Dictionary(params)),
        None => {
            dict.remove(b"DecodeParms");
        }
    }
    stream_content(&Stream::new(dict, stream.content.clone()))
}

fn decode_jpeg(data: &[u8], mut layout: ImageLayout) -> Result<(Vec<u8>, ImageLayout)> {
    let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?;
    let components = if layout.components == 0 {
        img.color().channel_count() as usize
    } else {
        layout.components
    };
    let samples = match components {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        n => {
            return Err(Error::UnsupportedImageCodec(format!("{}-component JPEG", n)));
        }
    };
    if layout.decode.len() != components {
        layout.decode = vec![(0.0, 1.0); components];
    }
    layout.components = components;
    layout.width = img.width() as usize;
    layout.height = img.height() as usize;
    Ok((samples, layout))
}

fn deflate(samples: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(samples)?;
    Ok(encoder.finish()?)
}

fn encode_jpeg(samples: &[u8], layout: &ImageLayout, quality: u8) -> Result<Vec<u8>> {
    let color_type = match layout.components {
        1 => ExtendedColorType::L8,
        _ => ExtendedColorType::Rgb8,
    };
    let size = layout.width * layout.height * layout.components;
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode(
        &samples[..size],
        layout.width as u32,
        layout.height as u32,
        color_type,
    )?;
    Ok(buf)
}

/// Sample bytes that decode to `color` in the image's colour space
fn fill_samples(layout: &ImageLayout, color: Color) -> Vec<u8> {
    let (r, g, b) = (color.r as f64, color.g as f64, color.b as f64);
    let device: Vec<f64> = match layout.components {
        1 => vec![0.299 * r + 0.587 * g + 0.114 * b],
        3 => vec![r, g, b],
        _ => {
            let k = 1.0 - r.max(g).max(b);
            if k >= 1.0 {
                vec![0.0, 0.0, 0.0, 1.0]
            } else {
                vec![
                    (1.0 - r - k) / (1.0 - k),
                    (1.0 - g - k) / (1.0 - k),
                    (1.0 - b - k) / (1.0 - k),
                    k,
                ]
            }
        }
    };
    device
        .iter()
        .zip(&layout.decode)
        .map(|(value, (dmin, dmax))| {
            let range = dmax - dmin;
            let t = if range.abs() < f64::EPSILON { 0.0 } else { (value - dmin) / range };
            (t.clamp(0.0, 1.0) * 255.0).round() as u8
        })
        .collect()
}

/// Snap values within 1e-6 of an integer before rounding outward
fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < 1e-6 {
        rounded
    } else {
        value
    }
}

fn paint(samples: &mut [u8], layout: &ImageLayout, area: &Rectangle, fill: &[u8]) {
    let (w, h) = (layout.width as f64, layout.height as f64);
    let x0 = snap(area.llx * w).floor().clamp(0.0, w) as usize;
    let x1 = snap(area.urx * w).ceil().clamp(0.0, w) as usize;
    // Row 0 is the top of the image
    let y0 = snap((1.0 - area.ury) * h).floor().clamp(0.0, h) as usize;
    let y1 = snap((1.0 - area.lly) * h).ceil().clamp(0.0, h) as usize;
    let n = layout.components;
    for y in y0..y1 {
        for x in x0..x1 {
            let offset = (y * layout.width + x) * n;
            samples[offset..offset + n].copy_from_slice(fill);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::test_support::rgb_image;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    const WHITE: Color = Color::WHITE;

    #[test]
    fn test_left_half_of_raw_image_is_painted() {
        let doc = Document::with_version("1.5");
        let source: Vec<u8> = (0..4 * 2).flat_map(|_| [200u8, 10, 10]).collect();
        let stream = rgb_image(4, 2, source.clone());
        let ctm = Matrix::new(100.0, 0.0, 0.0, 100.0, 50.0, 0.0);
        let areas = unit_areas(&ctm, &[Rectangle::new(50.0, 0.0, 100.0, 100.0)]).unwrap();
        assert_eq!(areas, vec![Rectangle::new(0.0, 0.0, 0.5, 1.0)]);

        let replacement = clean_image(&doc, &stream, &areas, WHITE, 90).unwrap();
        let out = &replacement.stream.content;
        for y in 0..2 {
            for x in 0..4 {
                let offset = (y * 4 + x) * 3;
                if x < 2 {
                    assert_eq!(&out[offset..offset + 3], &[255, 255, 255]);
                } else {
                    assert_eq!(&out[offset..offset + 3], &source[offset..offset + 3]);
                }
            }
        }
    }

    #[test]
    fn test_decode_array_inverts_fill() {
        let doc = Document::with_version("1.5");
        let mut stream = rgb_image(1, 1, vec![0, 0, 0]);
        stream.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        stream.dict.set("Decode", Object::Array(vec![Object::Integer(1), Object::Integer(0)]));
        stream.set_content(vec![0]);
        let full = [Rectangle::new(0.0, 0.0, 1.0, 1.0)];
        let replacement = clean_image(&doc, &stream, &full, WHITE, 90).unwrap();
        assert_eq!(replacement.stream.content, vec![0]);
    }

    #[test]
    fn test_png_predicted_flate_image() {
        let doc = Document::with_version("1.5");
        // 2x2 gray: row 0 [10, 20] with Sub, row 1 [15, 25] with Up
        let predicted = vec![1, 10, 10, 2, 5, 5];
        let compressed = deflate(&predicted).unwrap();
        let mut stream = rgb_image(2, 2, compressed);
        stream.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        stream.dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        let mut params = Dictionary::new();
        params.set("Predictor", Object::Integer(15));
        params.set("Colors", Object::Integer(1));
        params.set("Columns", Object::Integer(2));
        stream.dict.set("DecodeParms", Object::Dictionary(params));

        // Paint only the bottom row
        let areas = [Rectangle::new(0.0, 0.0, 1.0, 0.5)];
        let replacement = clean_image(&doc, &stream, &areas, WHITE, 90).unwrap();
        assert!(!replacement.stream.dict.has(b"DecodeParms"));
        assert!(!replacement.stream.allows_compression);

        let mut decoder = ZlibDecoder::new(replacement.stream.content.as_slice());
        let mut samples = Vec::new();
        decoder.read_to_end(&mut samples).unwrap();
        assert_eq!(samples, vec![10, 20, 255, 255]);
    }

    #[test]
    fn test_flate_image_with_referenced_decode_parms() {
        let mut doc = Document::with_version("1.5");
        // 2x1 gray, one Up-filtered row
        let compressed = deflate(&[2, 40, 50]).unwrap();
        let mut params = Dictionary::new();
        params.set("Predictor", Object::Integer(12));
        params.set("Columns", Object::Integer(2));
        let params_id = doc.add_object(params);

        let mut stream = rgb_image(2, 1, compressed);
        stream.dict.set("ColorSpace", Object::Name(b"DeviceGray".to_vec()));
        stream.dict.set("Filter", Object::Array(vec![Object::Name(b"FlateDecode".to_vec())]));
        stream.dict.set("DecodeParms", Object::Array(vec![Object::Reference(params_id)]));

        let areas = [Rectangle::new(0.5, 0.0, 1.0, 1.0)];
        let replacement = clean_image(&doc, &stream, &areas, WHITE, 90).unwrap();
        let mut decoder = ZlibDecoder::new(replacement.stream.content.as_slice());
        let mut samples = Vec::new();
        decoder.read_to_end(&mut samples).unwrap();
        assert_eq!(samples, vec![40, 255]);
    }

    #[test]
    fn test_jpeg_image_is_reencoded() {
        let doc = Document::with_version("1.5");
        let pixels = vec![0u8; 16 * 16 * 3];
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode(&pixels, 16, 16, ExtendedColorType::Rgb8)
            .unwrap();
        let mut stream = rgb_image(16, 16, jpeg);
        stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));

        let areas = [Rectangle::new(0.0, 0.0, 0.5, 1.0)];
        let replacement = clean_image(&doc, &stream, &areas, WHITE, 90).unwrap();
        let decoded = image::load_from_memory_with_format(&replacement.stream.content, ImageFormat::Jpeg)
            .unwrap()
            .to_rgb8();
        assert!(decoded.get_pixel(2, 8).0[0] > 200);
        assert!(decoded.get_pixel(13, 8).0[0] < 50);
    }

    #[test]
    fn test_unsupported_codec() {
        let doc = Document::with_version("1.5");
        let mut stream = rgb_image(1, 1, vec![0, 0, 0]);
        stream.dict.set("Filter", Object::Name(b"JBIG2Decode".to_vec()));
        let err = clean_image(&doc, &stream, &[], WHITE, 90).unwrap_err();
        assert!(matches!(err, Error::UnsupportedImageCodec(_)));

        let mut indexed = rgb_image(1, 1, vec![0]);
        indexed.dict.set(
            "ColorSpace",
            Object::Array(vec![Object::Name(b"Indexed".to_vec()), Object::Name(b"DeviceRGB".to_vec())]),
        );
        let err = clean_image(&doc, &indexed, &[], WHITE, 90).unwrap_err();
        assert!(matches!(err, Error::UnsupportedImageCodec(_)));
    }
}
