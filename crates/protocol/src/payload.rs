//! Values exchanged with a worker: inputs, decoded outputs, and per-item
//! outcomes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pixel buffers
// ---------------------------------------------------------------------------

/// An 8-bit image held as row-major, interleaved samples.
///
/// One channel is the 2-D (grayscale) case; three or four channels are the
/// 3-D (RGB / RGBA) case. The sample count always equals
/// `width * height * channels`; deserialisation goes through
/// [`PixelBuffer::new`] so the same checks apply to decoded values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPixelBuffer")]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Channel counts accepted by [`PixelBuffer::new`].
    pub const SUPPORTED_CHANNELS: [u8; 3] = [1, 3, 4];

    /// Creates a buffer, returning `None` if `channels` is unsupported or the
    /// sample count does not match the dimensions.
    #[must_use]
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Option<Self> {
        let expected = width as usize * height as usize * channels as usize;
        if !Self::SUPPORTED_CHANNELS.contains(&channels) || data.len() != expected {
            return None;
        }
        Some(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Returns the raw interleaved samples.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, returning its samples.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Builds a buffer without checking it, for exercising the codec's own
    /// guards.
    #[cfg(test)]
    pub(crate) fn unchecked(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Sample count implied by the dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}

/// Unchecked wire form of a [`PixelBuffer`].
#[derive(Deserialize)]
struct RawPixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl TryFrom<RawPixelBuffer> for PixelBuffer {
    type Error = String;

    fn try_from(raw: RawPixelBuffer) -> Result<Self, Self::Error> {
        let len = raw.data.len();
        Self::new(raw.width, raw.height, raw.channels, raw.data).ok_or_else(|| {
            format!(
                "invalid pixel buffer: {}x{} with {} channels cannot hold {len} samples",
                raw.width, raw.height, raw.channels
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A domain value before encoding or after decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// A pixel buffer, carried by the image codec.
    Image(PixelBuffer),
    /// Any structured value, carried as-is by the identity and JSON codecs.
    Json(serde_json::Value),
}

impl Payload {
    /// Short name of the variant, used in codec error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Json(_) => "json",
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Image(_) => None,
        }
    }

}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<PixelBuffer> for Payload {
    fn from(img: PixelBuffer) -> Self {
        Self::Image(img)
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Ordered inputs for one invocation.
///
/// A single item converts into a one-element batch, so callers can pass
/// either one value or a `Vec`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch(Vec<Payload>);

impl Batch {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_items(self) -> Vec<Payload> {
        self.0
    }
}

impl From<Payload> for Batch {
    fn from(item: Payload) -> Self {
        Self(vec![item])
    }
}

impl From<PixelBuffer> for Batch {
    fn from(img: PixelBuffer) -> Self {
        Self(vec![Payload::Image(img)])
    }
}

impl From<serde_json::Value> for Batch {
    fn from(value: serde_json::Value) -> Self {
        Self(vec![Payload::Json(value)])
    }
}

impl From<Vec<Payload>> for Batch {
    fn from(items: Vec<Payload>) -> Self {
        Self(items)
    }
}

impl FromIterator<Payload> for Batch {
    fn from_iter<I: IntoIterator<Item = Payload>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one item within an invocation.
///
/// An invocation always yields exactly one outcome per input, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome {
    /// The worker answered with success and the output decoded cleanly.
    Success(Payload),
    /// Encoding failed, decoding failed, or the worker reported a failure.
    Failure(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Converts into the `(success, value-or-message)` view.
    pub fn into_parts(self) -> (bool, Result<Payload, String>) {
        let success = self.is_success();
        (success, self.into_result())
    }

    pub fn into_result(self) -> Result<Payload, String> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Failure(message) => Err(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_pixel_buffer_rejects_bad_shapes() {
        assert!(PixelBuffer::new(2, 2, 3, vec![0; 12]).is_some());
        assert!(PixelBuffer::new(2, 2, 3, vec![0; 11]).is_none());
        assert!(PixelBuffer::new(2, 2, 2, vec![0; 8]).is_none());
    }

    #[test]
    fn test_deserialized_pixel_buffer_is_checked() {
        let ok: PixelBuffer = serde_json::from_value(json!({
            "width": 1, "height": 2, "channels": 1, "data": [3, 4],
        }))
        .unwrap();
        assert_eq!(ok.as_bytes(), &[3, 4]);

        let err = serde_json::from_value::<PixelBuffer>(json!({
            "width": 2, "height": 2, "channels": 3, "data": [0],
        }))
        .unwrap_err();
        assert!(err.to_string().contains("cannot hold 1 samples"), "{err}");

        // A short buffer is not an image, so an untagged payload falls back to JSON.
        let payload: Payload = serde_json::from_value(json!({
            "width": 2, "height": 2, "channels": 3, "data": [0],
        }))
        .unwrap();
        assert_eq!(payload.kind(), "json");
    }

    #[test]
    fn test_single_item_is_one_element_batch() {
        let batch = Batch::from(json!([1, 2, 3]));
        assert_eq!(batch.len(), 1);

        let batch = Batch::from(vec![Payload::from(json!(1)), Payload::from(json!(2))]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_outcome_parts() {
        let (ok, value) = Outcome::Success(json!(42).into()).into_parts();
        assert!(ok);
        assert_eq!(value, Ok(Payload::Json(json!(42))));

        let (ok, value) = Outcome::Failure("oops".into()).into_parts();
        assert!(!ok);
        assert_eq!(value, Err("oops".to_string()));
    }
}
