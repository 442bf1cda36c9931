//! Negotiated output quality

use serde::{Deserialize, Serialize};

/// Output container formats the merge engine can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp3,
    /// AAC in an MP4 audio container
    M4a,
    Wav,
    Flac,
    Ogg,
}

impl ContainerFormat {
    /// File extension for outputs in this container
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::M4a => "m4a",
            ContainerFormat::Wav => "wav",
            ContainerFormat::Flac => "flac",
            ContainerFormat::Ogg => "ogg",
        }
    }
}

/// Encoding parameters for one merge job
///
/// Derived once per job from every resolved input; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub sample_rate: u32,
    pub channels: u16,
    pub lossless: bool,
    /// `None` for lossless output (encoded at full fidelity)
    pub bitrate_kbps: Option<u32>,
    pub container: ContainerFormat,
    /// Transcoder encoder name (e.g. `flac`, `libmp3lame`)
    pub codec: String,
}

