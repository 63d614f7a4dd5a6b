use crate::{ChannelLayout, Frame};

/// Bytes per PCM sample. Output is always signed 16-bit.
pub const BYTES_PER_SAMPLE: usize = 2;

/// Number of times a frame has to be played back to fill its time slot.
///
/// `floor(point_rate / (frame_rate * points))`. Empty frames, and frames with
/// more points than fit in one slot, get zero repetitions and are therefore
/// dropped from the output. The resulting audio can be shorter than the
/// animation when the rates do not match the point counts.
pub fn repeat_count(point_rate: u32, frame_rate: u32, points: usize) -> u32 {
    let per_slot = u64::from(frame_rate) * points as u64;
    if per_slot == 0 {
        return 0;
    }
    (u64::from(point_rate) / per_slot).min(u64::from(u32::MAX)) as u32
}

/// Renders frames into interleaved PCM.
///
/// Samples are little-endian `i16`. For every repetition, for every point,
/// one sample per channel of the layout is written in layout order. The
/// internal buffer is reused between frames.
#[derive(Debug, Default)]
pub struct FrameSynthesizer {
    buffer: Vec<u8>,
}

impl FrameSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders `frame` `repeat` times and returns the produced bytes. The slice
    /// is valid until the next call.
    pub fn synthesize(&mut self, frame: &Frame, layout: &ChannelLayout, repeat: u32) -> &[u8] {
        self.buffer.clear();
        if repeat == 0 || frame.is_empty() {
            return &self.buffer;
        }

        let block_len = frame.points().len() * layout.channels().len() * BYTES_PER_SAMPLE;
        self.buffer.reserve(block_len * repeat as usize);

        for point in frame.points() {
            for channel in layout.channels() {
                self.buffer
                    .extend_from_slice(&channel.sample(point).to_le_bytes());
            }
        }
        for _ in 1..repeat {
            self.buffer.extend_from_within(..block_len);
        }

        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Header, Point, Status, TableType};

    fn frame_of(points: Vec<Point>) -> Frame {
        let header = Header {
            table_type: TableType::Points2D,
            info: String::new(),
            length: 0,
            index: 1,
            total: 1,
            head: 0,
        };
        Frame::new(header, points).unwrap()
    }

    fn samples(bytes: &[u8]) -> Vec<i16> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    #[test]
    fn repeat_matches_rate_budget() {
        assert_eq!(repeat_count(20_000, 15, 100), 13);
        assert_eq!(repeat_count(20_000, 15, 1334), 0);
        assert_eq!(repeat_count(20_000, 15, 0), 0);
        assert_eq!(repeat_count(u32::MAX, 1, 1), u32::MAX);
    }

    #[test]
    fn output_size_follows_repeat() {
        let layout = ChannelLayout::parse("Y|-1X|B|C").unwrap();
        let frame = frame_of(vec![Point::default(); 100]);
        let repeat = repeat_count(20_000, 15, frame.points().len());

        let mut synth = FrameSynthesizer::new();
        let out = synth.synthesize(&frame, &layout, repeat);
        assert_eq!(out.len(), 100 * 4 * 13 * BYTES_PER_SAMPLE);
    }

    #[test]
    fn empty_frames_and_zero_repeat_produce_nothing() {
        let layout = ChannelLayout::parse("X|Y").unwrap();
        let mut synth = FrameSynthesizer::new();

        assert!(synth.synthesize(&frame_of(Vec::new()), &layout, 5).is_empty());
        let frame = frame_of(vec![Point::default(); 3]);
        assert!(synth.synthesize(&frame, &layout, 0).is_empty());
    }

    #[test]
    fn interleaves_points_and_channels_per_repetition() {
        let layout = ChannelLayout::parse("Y|-1X|B|C").unwrap();
        let frame = frame_of(vec![
            Point {
                x: 10,
                y: 20,
                z: 0,
                status: Status(0x0005),
            },
            Point {
                x: -30,
                y: 40,
                z: 0,
                status: Status(0xc001),
            },
        ]);

        let mut synth = FrameSynthesizer::new();
        let out = samples(synth.synthesize(&frame, &layout, 2));
        let block = [20, -10, i16::MAX, 5, 40, 30, 0, 1];
        assert_eq!(out, [block, block].concat());
    }

    #[test]
    fn buffer_is_reset_between_frames() {
        let layout = ChannelLayout::parse("X|Y").unwrap();
        let mut synth = FrameSynthesizer::new();
        let big = frame_of(vec![Point::default(); 50]);
        let small = frame_of(vec![Point {
            x: 7,
            y: 8,
            z: 0,
            status: Status(0),
        }]);

        synth.synthesize(&big, &layout, 3);
        let out = samples(synth.synthesize(&small, &layout, 1));
        assert_eq!(out, vec![7, 8]);
    }
}
