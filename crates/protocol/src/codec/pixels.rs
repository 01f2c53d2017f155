//! Pixel-buffer codec: lossless PNG wrapped in standard base64.
//!
//! MessagePack can carry binary, but the payload is also re-embedded by
//! workers into other structured formats, so the compressed image travels as
//! base64 text.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, ImageEncoder as _};

use crate::errors::CodecError;
use crate::payload::PixelBuffer;

/// Compresses `img` to PNG and returns it as base64 text.
pub fn encode(img: &PixelBuffer) -> Result<String, CodecError> {
    let color_type = match img.channels() {
        1 => ColorType::L8,
        3 => ColorType::Rgb8,
        4 => ColorType::Rgba8,
        other => {
            return Err(CodecError::Image(format!(
                "unsupported channel count: {other}"
            )));
        }
    };

    if img.as_bytes().len() != img.expected_len() {
        return Err(CodecError::Image(format!(
            "buffer holds {} samples, {}x{}x{} needs {}",
            img.as_bytes().len(),
            img.width(),
            img.height(),
            img.channels(),
            img.expected_len()
        )));
    }

    // PNG output is usually smaller than the raw samples.
    let mut buf = Vec::with_capacity(img.as_bytes().len() / 2);
    let encoder =
        PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::Adaptive);
    encoder
        .write_image(img.as_bytes(), img.width(), img.height(), color_type.into())
        .map_err(|e| CodecError::Image(e.to_string()))?;

    Ok(STANDARD.encode(buf))
}

/// Reverses [`encode`]. Also accepts JPEG, which some workers return.
///
/// Channel count is preserved for gray, RGB and RGBA sources; gray+alpha is
/// widened to RGBA and 16-bit sources are narrowed to 8-bit.
pub fn decode(text: &str) -> Result<PixelBuffer, CodecError> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| CodecError::Malformed(format!("invalid base64: {e}")))?;
    let img = image::load_from_memory(&bytes).map_err(|e| CodecError::Image(e.to_string()))?;

    let (width, height) = (img.width(), img.height());
    let (channels, data) = match img.color().channel_count() {
        1 => (1, img.into_luma8().into_raw()),
        2 | 4 => (4, img.into_rgba8().into_raw()),
        _ => (3, img.into_rgb8().into_raw()),
    };

    PixelBuffer::new(width, height, channels, data)
        .ok_or_else(|| CodecError::Image("decoded image has inconsistent dimensions".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32, channels: u8) -> PixelBuffer {
        let mut data = Vec::with_capacity((width * height * channels as u32) as usize);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels as u32 {
                    data.push(((x * 31 + y * 17 + c * 53) % 256) as u8);
                }
            }
        }
        PixelBuffer::new(width, height, channels, data).unwrap()
    }

    #[test]
    fn test_roundtrip_is_exact_for_every_channel_depth() {
        for channels in PixelBuffer::SUPPORTED_CHANNELS {
            let img = gradient(37, 23, channels);
            let decoded = decode(&encode(&img).unwrap()).unwrap();
            assert_eq!(decoded, img, "{channels}-channel roundtrip");
        }
    }

    #[test]
    fn test_encoded_text_is_base64_png() {
        let text = encode(&gradient(4, 4, 3)).unwrap();
        let raw = STANDARD.decode(&text).unwrap();
        assert_eq!(&raw[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_encode_rejects_short_buffer_without_panicking() {
        let short = PixelBuffer::unchecked(2, 2, 3, vec![0]);
        match encode(&short) {
            Err(CodecError::Image(message)) => assert!(message.contains("needs 12"), "{message}"),
            other => panic!("expected image error, got {other:?}"),
        }

        let bad_depth = PixelBuffer::unchecked(1, 1, 2, vec![0, 0]);
        assert!(matches!(encode(&bad_depth), Err(CodecError::Image(_))));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not base64!"), Err(CodecError::Malformed(_))));
        let not_an_image = STANDARD.encode(b"zbl");
        assert!(matches!(decode(&not_an_image), Err(CodecError::Image(_))));
    }
}
