//! Core library for converting ILDA laser animations into PCM audio.
//!
//! The pipeline is split by concern: [`ilda`] decodes the point tables,
//! [`mapping`] parses the channel layout language, [`synth`] renders frames to
//! interleaved 16-bit samples, [`wav`] wraps them in a RIFF/WAVE container and
//! [`convert`] drives the whole sequence for one file, optionally on a worker
//! thread. [`config`] and [`playlist`] serve the batch front end.

pub mod config;
pub mod convert;
pub mod error;
pub mod ilda;
pub mod mapping;
pub mod playlist;
pub mod synth;
pub mod wav;

pub use config::{BatchConfig, FileJob, FileOptions};
pub use convert::{
    convert_file, convert_stream, spawn, ConversionEvent, ConversionEvents, ConversionParams,
    ConversionRequest, ConversionSummary, Outcome,
};
pub use error::{Ilda2WavError, Result};
pub use ilda::{read_animation, Animation, Frame, Header, Point, Status, TableType};
pub use mapping::{ChannelDescriptor, ChannelLayout, Selector};
pub use synth::{repeat_count, FrameSynthesizer};
pub use wav::{write_wav, WavSpec};
