//! Shared frame value type and pixel-format utilities.

use chrono::Utc;

/// Supported pixel layouts carried by [`Frame::data`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    /// Packed BGR (24-bit), the layout produced by OpenCV readers.
    Bgr,
    /// Packed RGB (24-bit).
    Rgb,
    /// Single-channel grayscale.
    Gray,
    /// JPEG-compressed bytes.
    Jpeg,
    /// PNG-compressed bytes.
    Png,
}

impl FrameFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameFormat::Bgr => "bgr",
            FrameFormat::Rgb => "rgb",
            FrameFormat::Gray => "gray",
            FrameFormat::Jpeg => "jpeg",
            FrameFormat::Png => "png",
        }
    }

    /// Parse a format tag; unknown names are rejected.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bgr" => Some(FrameFormat::Bgr),
            "rgb" => Some(FrameFormat::Rgb),
            "gray" => Some(FrameFormat::Gray),
            "jpeg" => Some(FrameFormat::Jpeg),
            "png" => Some(FrameFormat::Png),
            _ => None,
        }
    }

    pub fn supported() -> &'static [&'static str] {
        &["bgr", "rgb", "gray", "jpeg", "png"]
    }
}

/// Expected buffer length for a frame of the given geometry.
///
/// Compressed formats return a rough estimate; callers treat the value as a
/// lower-bound reference, not an exact size.
pub fn expected_frame_size(width: i32, height: i32, format: FrameFormat) -> usize {
    if width <= 0 || height <= 0 {
        return 0;
    }
    let pixels = width as usize * height as usize;
    match format {
        FrameFormat::Bgr | FrameFormat::Rgb => pixels * 3,
        FrameFormat::Gray => pixels,
        FrameFormat::Jpeg | FrameFormat::Png => pixels * 3 / 2,
    }
}

/// Raw frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Frame pixel buffer in the layout declared by [`FrameFormat`].
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: i32,
    /// Frame height in pixels.
    pub height: i32,
    /// Format descriptor explaining how to interpret [`Frame::data`].
    pub format: FrameFormat,
    /// Capture timestamp in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: i32, height: i32, format: FrameFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    /// A valid frame has pixels, positive geometry, and a buffer no smaller
    /// than 80% of the expected size for its format.
    pub fn is_valid(&self) -> bool {
        if self.data.is_empty() || self.width <= 0 || self.height <= 0 {
            return false;
        }
        let expected = expected_frame_size(self.width, self.height, self.format);
        self.data.len() * 10 >= expected * 8
    }

    /// Build a synthetic gradient frame, used as the decoder-less fallback.
    pub fn test_frame(width: i32, height: i32, format: FrameFormat) -> Self {
        let mut frame = Frame::new(
            vec![0u8; expected_frame_size(width, height, format)],
            width,
            height,
            format,
        );

        match format {
            FrameFormat::Bgr | FrameFormat::Rgb => {
                for y in 0..height {
                    for x in 0..width {
                        let idx = (y as usize * width as usize + x as usize) * 3;
                        frame.data[idx] = ((x * 255) / width.max(1)) as u8;
                        frame.data[idx + 1] = ((y * 255) / height.max(1)) as u8;
                        frame.data[idx + 2] = 128;
                    }
                }
            }
            FrameFormat::Gray => {
                for y in 0..height {
                    for x in 0..width {
                        let idx = y as usize * width as usize + x as usize;
                        frame.data[idx] = ((x + y) % 256) as u8;
                    }
                }
            }
            // Compressed formats keep a zeroed placeholder buffer.
            FrameFormat::Jpeg | FrameFormat::Png => {}
        }

        frame
    }

    /// Build a uniformly coloured frame.
    pub fn solid(width: i32, height: i32, r: u8, g: u8, b: u8, format: FrameFormat) -> Self {
        let mut frame = Frame::new(
            vec![0u8; expected_frame_size(width, height, format)],
            width,
            height,
            format,
        );

        match format {
            FrameFormat::Bgr => {
                for px in frame.data.chunks_exact_mut(3) {
                    px[0] = b;
                    px[1] = g;
                    px[2] = r;
                }
            }
            FrameFormat::Rgb => {
                for px in frame.data.chunks_exact_mut(3) {
                    px[0] = r;
                    px[1] = g;
                    px[2] = b;
                }
            }
            FrameFormat::Gray => {
                let gray = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) as u8;
                frame.data.fill(gray);
            }
            FrameFormat::Jpeg | FrameFormat::Png => {}
        }

        frame
    }
}

/// Convert pixel data between formats.
///
/// Only the BGR/RGB channel swap is materialised today; any other pair
/// returns the input unchanged.
pub fn convert_format(
    data: &[u8],
    _width: i32,
    _height: i32,
    from: FrameFormat,
    to: FrameFormat,
) -> Vec<u8> {
    let mut out = data.to_vec();
    match (from, to) {
        (FrameFormat::Bgr, FrameFormat::Rgb) | (FrameFormat::Rgb, FrameFormat::Bgr) => {
            for px in out.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            out
        }
        _ => out,
    }
}
