//! Deterministic synthetic test patterns.
//!
//! The generator emits BGR frames and cycles through color bars, a
//! checkerboard, a moving box, uniform noise, and a time-coded pattern.

use std::time::Instant;

use rand::Rng;

use crate::{expected_frame_size, Frame, FrameFormat};

/// Synthetic image source for `test://` capture sessions.
pub struct TestPatternGenerator {
    width: i32,
    height: i32,
    frame_counter: u64,
    start: Instant,
}

impl TestPatternGenerator {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            frame_counter: 0,
            start: Instant::now(),
        }
    }

    pub fn set_size(&mut self, width: i32, height: i32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_frame_counter(&mut self, counter: u64) {
        self.frame_counter = counter;
    }

    fn blank(&self) -> Frame {
        Frame::new(
            vec![0u8; expected_frame_size(self.width, self.height, FrameFormat::Bgr)],
            self.width,
            self.height,
            FrameFormat::Bgr,
        )
    }

    /// Eight standard vertical color bars.
    pub fn color_bars(&mut self) -> Frame {
        let mut frame = self.blank();
        let bar_width = (self.width / 8).max(1);
        // Stored as [B, G, R] triples.
        const COLORS: [[u8; 3]; 8] = [
            [255, 255, 255], // white
            [0, 255, 255],   // yellow
            [255, 255, 0],   // cyan
            [0, 255, 0],     // green
            [255, 0, 255],   // magenta
            [0, 0, 255],     // red
            [255, 0, 0],     // blue
            [0, 0, 0],       // black
        ];

        for y in 0..self.height {
            for x in 0..self.width {
                let bar = ((x / bar_width) as usize).min(7);
                let idx = (y as usize * self.width as usize + x as usize) * 3;
                frame.data[idx..idx + 3].copy_from_slice(&COLORS[bar]);
            }
        }
        frame
    }

    /// Black-and-white checkerboard with 32-pixel squares.
    pub fn checkerboard(&mut self) -> Frame {
        let mut frame = self.blank();
        let square = 32;

        for y in 0..self.height {
            for x in 0..self.width {
                let is_white = ((x / square) + (y / square)) % 2 == 0;
                let color = if is_white { 255 } else { 0 };
                let idx = (y as usize * self.width as usize + x as usize) * 3;
                frame.data[idx..idx + 3].fill(color);
            }
        }
        frame
    }

    /// Green box moving over a gray field; advances the frame counter.
    pub fn moving_box(&mut self) -> Frame {
        let mut frame = Frame::solid(self.width, self.height, 50, 50, 50, FrameFormat::Bgr);

        let counter = self.frame_counter as i32;
        let box_size = 60;
        let x = (counter * 3) % (self.width - box_size).max(1);
        let y = (counter * 2) % (self.height - box_size).max(1);

        for dy in 0..box_size {
            for dx in 0..box_size {
                let px = x + dx;
                let py = y + dy;
                if px < self.width && py < self.height {
                    let idx = (py as usize * self.width as usize + px as usize) * 3;
                    frame.data[idx] = 0;
                    frame.data[idx + 1] = 255;
                    frame.data[idx + 2] = 0;
                }
            }
        }

        self.frame_counter += 1;
        frame
    }

    /// Uniform random noise.
    pub fn noise(&mut self) -> Frame {
        let mut frame = self.blank();
        let mut rng = rand::thread_rng();
        rng.fill(frame.data.as_mut_slice());
        frame
    }

    /// Dark blue field with an intensity strip keyed to elapsed seconds;
    /// advances the frame counter.
    pub fn time_code(&mut self) -> Frame {
        let mut frame = Frame::solid(self.width, self.height, 0, 0, 100, FrameFormat::Bgr);

        let elapsed_s = self.start.elapsed().as_secs() as i64;
        let intensity = ((elapsed_s % 10) * 25) as u8;

        for y in 20..60.min(self.height) {
            for x in 20..200.min(self.width) {
                let idx = (y as usize * self.width as usize + x as usize) * 3;
                if idx + 2 < frame.data.len() {
                    frame.data[idx] = intensity;
                    frame.data[idx + 1] = 255;
                    frame.data[idx + 2] = intensity;
                }
            }
        }

        self.frame_counter += 1;
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_have_full_bgr_buffers() {
        let mut generator = TestPatternGenerator::new(320, 240);
        for frame in [
            generator.color_bars(),
            generator.checkerboard(),
            generator.moving_box(),
            generator.noise(),
            generator.time_code(),
        ] {
            assert_eq!(frame.width, 320);
            assert_eq!(frame.height, 240);
            assert_eq!(frame.data.len(), 320 * 240 * 3);
            assert!(frame.is_valid());
        }
    }

    #[test]
    fn color_bars_start_white_and_end_black() {
        let mut generator = TestPatternGenerator::new(640, 16);
        let frame = generator.color_bars();
        assert_eq!(&frame.data[..3], &[255, 255, 255]);
        let last = frame.data.len() - 3;
        assert_eq!(&frame.data[last..], &[0, 0, 0]);
    }

    #[test]
    fn checkerboard_alternates_at_square_boundaries() {
        let mut generator = TestPatternGenerator::new(128, 128);
        let frame = generator.checkerboard();
        // Top-left square is white, the square to its right is black.
        assert_eq!(frame.data[0], 255);
        let idx = 32 * 3;
        assert_eq!(frame.data[idx], 0);
    }

    #[test]
    fn moving_box_advances_counter() {
        let mut generator = TestPatternGenerator::new(320, 240);
        let first = generator.moving_box();
        let second = generator.moving_box();
        // Box moved by (3, 2), so the frames differ.
        assert_ne!(first.data, second.data);
    }
}
