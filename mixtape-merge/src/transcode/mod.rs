//! Merge transcoding: ffmpeg command construction, progress parsing, the engine

pub mod command;
pub mod engine;
pub mod progress;

pub use command::FfmpegCommandBuilder;
pub use engine::{MergeEngine, MergeRequest, Transcoder};
pub use progress::{MergeProgress, ProgressParser};
