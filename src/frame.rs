// THEORY:
// The `frame` module defines the unit of data that flows through the whole
// pipeline. Everything upstream (camera stream, goal requests) speaks in terms of
// an `ImageMessage`, a loosely typed payload with an encoding tag. Everything
// downstream (store, slots, estimator, display) speaks in terms of a `Frame`, an
// owned, packed BGR8 buffer with its capture header and optional goal id.
//
// Key architectural principles:
// 1.  **One canonical layout**: Decoding happens exactly once, at ingestion. After
//     that no stage needs to know what the camera produced.
// 2.  **Owned buffers**: A `Frame` owns its pixels. Copies are explicit
//     (`clone`, `copy_from`) so that sharing between threads never means sharing
//     memory.
// 3.  **Buffer reuse**: `copy_from` reuses the destination allocation when the
//     sizes match, so rotating slots do not reallocate every iteration.

use crate::error::DecodeError;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bytes per pixel of the canonical layout.
pub const BGR_CHANNELS: usize = 3;

/// Opaque identifier binding a frame to an external goal request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct GoalId(pub String);

impl fmt::Display for GoalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GoalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Capture metadata carried alongside the pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct FrameHeader {
    /// Monotonic sequence number assigned by the producer.
    pub seq: u64,
    /// Capture time as an offset from the Unix epoch.
    pub stamp: Duration,
    /// Name of the coordinate frame the image was captured in.
    pub frame_id: String,
}

impl FrameHeader {
    pub fn new(seq: u64, frame_id: impl Into<String>) -> Self {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seq,
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// An owned, packed BGR8 image plus its header and optional goal id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Packed BGR8 pixels, `width * height * 3` bytes.
    pub data: Vec<u8>,
    pub header: FrameHeader,
    /// Present for goal-driven frames, absent for stream frames.
    pub correlation: Option<GoalId>,
}

impl Frame {
    /// Creates a frame filled with a single BGR colour.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3], header: FrameHeader) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * BGR_CHANNELS);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            data,
            header,
            correlation: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Deep-copies `other` into `self`, reusing the existing allocation.
    pub fn copy_from(&mut self, other: &Frame) {
        self.width = other.width;
        self.height = other.height;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
        self.header.clone_from(&other.header);
        self.correlation.clone_from(&other.correlation);
    }

    /// Byte offset of pixel `(x, y)`, or `None` when out of bounds.
    pub fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BGR_CHANNELS)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        let at = self.offset(x as i64, y as i64)?;
        Some([self.data[at], self.data[at + 1], self.data[at + 2]])
    }

    /// Writes one BGR pixel; out-of-bounds writes are clipped.
    pub fn put_pixel(&mut self, x: i64, y: i64, bgr: [u8; 3]) {
        if let Some(at) = self.offset(x, y) {
            self.data[at..at + BGR_CHANNELS].copy_from_slice(&bgr);
        }
    }

    /// Cheap content fingerprint (FNV-1a over the pixel bytes).
    pub fn checksum(&self) -> u64 {
        self.data.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, byte| {
            (hash ^ *byte as u64).wrapping_mul(0x0100_0000_01b3)
        })
    }

    /// Converts the frame to an `image` RGB buffer, e.g. for saving.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        let rgb: Vec<u8> = self
            .data
            .chunks_exact(BGR_CHANNELS)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
            .collect();
        image::RgbImage::from_raw(self.width, self.height, rgb)
    }
}

/// Pixel layout tag of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
    Mono8,
    /// Any container the `image` crate can sniff (JPEG, PNG, ...).
    Compressed,
}

impl PixelEncoding {
    /// Parses the conventional encoding names used by camera drivers.
    pub fn parse(name: &str) -> Result<Self, DecodeError> {
        match name.to_ascii_lowercase().as_str() {
            "bgr8" => Ok(Self::Bgr8),
            "rgb8" => Ok(Self::Rgb8),
            "bgra8" => Ok(Self::Bgra8),
            "rgba8" => Ok(Self::Rgba8),
            "mono8" | "8uc1" => Ok(Self::Mono8),
            "jpeg" | "jpg" | "png" | "compressed" => Ok(Self::Compressed),
            other => Err(DecodeError::UnsupportedEncoding(other.to_string())),
        }
    }

    fn channels(self) -> usize {
        match self {
            Self::Bgr8 | Self::Rgb8 => 3,
            Self::Bgra8 | Self::Rgba8 => 4,
            Self::Mono8 => 1,
            Self::Compressed => 0,
        }
    }
}

/// An inbound image as delivered by a transport, before decoding.
#[derive(Debug, Clone)]
pub struct ImageMessage {
    pub header: FrameHeader,
    pub width: u32,
    pub height: u32,
    pub encoding: String,
    /// Bytes per row; ignored for compressed payloads.
    pub step: usize,
    pub data: Vec<u8>,
}

impl ImageMessage {
    /// Builds a raw BGR8 message with a tight row step.
    pub fn bgr8(header: FrameHeader, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            header,
            width,
            height,
            encoding: "bgr8".to_string(),
            step: width as usize * BGR_CHANNELS,
            data,
        }
    }

    /// Decodes into a canonical BGR8 frame with no correlation id.
    pub fn decode(&self) -> Result<Frame, DecodeError> {
        let encoding = PixelEncoding::parse(&self.encoding)?;
        if encoding == PixelEncoding::Compressed {
            return self.decode_compressed();
        }
        if self.width == 0 || self.height == 0 {
            return Err(DecodeError::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }

        let channels = encoding.channels();
        let row_bytes = self.width as usize * channels;
        if self.step < row_bytes {
            return Err(DecodeError::StepTooShort {
                step: self.step,
                row_bytes,
            });
        }
        let expected = self
            .step
            .checked_mul(self.height as usize - 1)
            .and_then(|rows| rows.checked_add(row_bytes))
            .ok_or(DecodeError::Oversized {
                width: self.width,
                height: self.height,
                step: self.step,
            })?;
        if self.data.len() < expected {
            return Err(DecodeError::PayloadTooShort {
                expected,
                actual: self.data.len(),
            });
        }

        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * BGR_CHANNELS);
        for row in self.data.chunks(self.step).take(self.height as usize) {
            let row = &row[..row_bytes];
            match encoding {
                PixelEncoding::Bgr8 => data.extend_from_slice(row),
                PixelEncoding::Rgb8 => {
                    data.extend(row.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]))
                }
                PixelEncoding::Bgra8 => {
                    data.extend(row.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]))
                }
                PixelEncoding::Rgba8 => {
                    data.extend(row.chunks_exact(4).flat_map(|p| [p[2], p[1], p[0]]))
                }
                PixelEncoding::Mono8 => data.extend(row.iter().flat_map(|&v| [v, v, v])),
                PixelEncoding::Compressed => unreachable!("handled above"),
            }
        }

        Ok(Frame {
            width: self.width,
            height: self.height,
            data,
            header: self.header.clone(),
            correlation: None,
        })
    }

    fn decode_compressed(&self) -> Result<Frame, DecodeError> {
        let rgb = image::load_from_memory(&self.data)?.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyImage { width, height });
        }
        let data = rgb
            .as_raw()
            .chunks_exact(3)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect();
        Ok(Frame {
            width,
            height,
            data,
            header: self.header.clone(),
            correlation: None,
        })
    }
}
