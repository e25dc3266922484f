use crate::photometa_core::media::Dimensions;
use image::{ImageReader, ImageResult};
use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

fn decode(bytes: &[u8]) -> ImageResult<()> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.decode()?;
    Ok(())
}

/// Try a full decode of the bytes. Returns `true` (corrupted) when the decoder
/// rejects the data or panics on it.
pub fn probe_corrupted(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return true;
    }

    match panic::catch_unwind(AssertUnwindSafe(|| decode(bytes))) {
        Ok(Ok(())) => false,
        Ok(Err(e)) => {
            log::debug!("Decode probe failed: {}", e);
            true
        }
        Err(_) => {
            log::warn!("Image decoder panicked during decode probe");
            true
        }
    }
}

/// Read pixel dimensions from the image header. `0 x 0` when the format is
/// unknown or the header is unreadable.
pub fn measure_dimensions(bytes: &[u8]) -> Dimensions {
    let read = || -> ImageResult<(u32, u32)> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_dimensions()
    };

    match panic::catch_unwind(AssertUnwindSafe(read)) {
        Ok(Ok((width, height))) => Dimensions { width, height },
        Ok(Err(e)) => {
            log::debug!("Could not read image dimensions: {}", e);
            Dimensions::default()
        }
        Err(_) => {
            log::warn!("Image decoder panicked while reading dimensions");
            Dimensions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_valid_png_is_not_corrupted() {
        let bytes = png_bytes(8, 6);
        assert!(!probe_corrupted(&bytes));
        assert_eq!(measure_dimensions(&bytes), Dimensions { width: 8, height: 6 });
    }

    #[test]
    fn test_empty_bytes_are_corrupted() {
        assert!(probe_corrupted(&[]));
        assert_eq!(measure_dimensions(&[]), Dimensions::default());
    }

    #[test]
    fn test_truncated_png_is_corrupted() {
        let bytes = png_bytes(32, 32);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(probe_corrupted(truncated));
    }

    #[test]
    fn test_garbage_is_corrupted() {
        assert!(probe_corrupted(b"definitely not an image"));
        assert_eq!(measure_dimensions(b"definitely not an image"), Dimensions::default());
    }
}
