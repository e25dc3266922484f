#![allow(dead_code)]

use exif::experimental::Writer;
use exif::{Field, In, Rational, Tag, Value};
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;

pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 80, 40])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    image_bytes(width, height, ImageFormat::Jpeg)
}

/// A tiny Windows executable header.
pub fn mz_bytes() -> Vec<u8> {
    let mut bytes = b"MZ".to_vec();
    bytes.extend_from_slice(&[0x90, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04, 0x00]);
    bytes.resize(256, 0);
    bytes
}

pub fn ascii(tag: Tag, text: &str) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Ascii(vec![text.as_bytes().to_vec()]),
    }
}

pub fn rational(tag: Tag, values: &[(u32, u32)]) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Rational(
            values
                .iter()
                .map(|&(num, denom)| Rational { num, denom })
                .collect(),
        ),
    }
}

pub fn short(tag: Tag, value: u16) -> Field {
    Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![value]),
    }
}

/// A JPEG with the given fields in an APP1 Exif segment right after SOI.
pub fn jpeg_with_exif(width: u32, height: u32, fields: &[Field]) -> Vec<u8> {
    let mut writer = Writer::new();
    for field in fields {
        writer.push_field(field);
    }
    let mut tiff = Cursor::new(Vec::new());
    writer.write(&mut tiff, false).unwrap();
    let tiff = tiff.into_inner();

    let jpeg = jpeg_bytes(width, height);
    let segment_len = (2 + 6 + tiff.len()) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn nikon_z9_fields() -> Vec<Field> {
    vec![
        ascii(Tag::Make, "Nikon"),
        ascii(Tag::Model, "Z9"),
        short(Tag::PhotographicSensitivity, 100),
        rational(Tag::FNumber, &[(28, 10)]),
        ascii(Tag::DateTimeOriginal, "2024:05:21 12:30:00"),
    ]
}

pub fn paris_gps_fields() -> Vec<Field> {
    vec![
        ascii(Tag::Make, "Canon"),
        rational(Tag::GPSLatitude, &[(48, 1), (51, 1), (2376, 100)]),
        ascii(Tag::GPSLatitudeRef, "N"),
        rational(Tag::GPSLongitude, &[(2, 1), (21, 1), (768, 100)]),
        ascii(Tag::GPSLongitudeRef, "E"),
    ]
}
