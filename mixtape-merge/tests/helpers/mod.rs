//! Test Helper Utilities
//!
//! Shared fixtures for mixtape-merge integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod file_server;
pub mod harness;

pub use fakes::{flac_probe, mp3_probe, FakeProber, FakeTranscoder, RecordingSink};
pub use file_server::{spawn_file_server, SONG_BYTES};
pub use harness::{collect_events, local_item, wait_for_state, Harness, HarnessOptions, CAPACITY};
