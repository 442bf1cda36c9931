//! Media probing via ffprobe

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Upper bound for one ffprobe run
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// What the analyzer needs to know about one input
#[derive(Debug, Clone, PartialEq)]
pub struct AudioProbe {
    pub codec: String,
    /// `None` when neither the stream nor the container reports one
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Option<Duration>,
}

impl AudioProbe {
    /// Assumptions used when a file cannot be probed
    pub fn fallback() -> Self {
        Self {
            codec: "unknown".to_string(),
            bitrate_kbps: Some(128),
            sample_rate: 44_100,
            channels: 2,
            duration: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to run prober: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Prober exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("Prober timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unreadable prober output: {0}")]
    Parse(String),

    #[error("No audio stream")]
    NoAudioStream,
}

/// Reads codec parameters from a media file
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<AudioProbe, ProbeError>;
}

/// [`MediaProber`] backed by the `ffprobe` executable
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<AudioProbe, ProbeError> {
        let child = tokio::process::Command::new(&self.program)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::Timeout(PROBE_TIMEOUT))??;

        if !output.status.success() {
            return Err(ProbeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_ffprobe_json(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    bit_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    bit_rate: Option<String>,
    duration: Option<String>,
}

/// Extract the first audio stream's parameters from `ffprobe -print_format json`
///
/// Bit rate and duration fall back from the stream to the container.
pub fn parse_ffprobe_json(bytes: &[u8]) -> Result<AudioProbe, ProbeError> {
    let output: FfprobeOutput =
        serde_json::from_slice(bytes).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let stream = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or(ProbeError::NoAudioStream)?;

    let codec = stream
        .codec_name
        .clone()
        .ok_or_else(|| ProbeError::Parse("audio stream without codec_name".to_string()))?;

    let sample_rate = stream
        .sample_rate
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|rate| *rate > 0)
        .ok_or_else(|| ProbeError::Parse("audio stream without sample_rate".to_string()))?;

    let channels = stream
        .channels
        .filter(|c| *c > 0)
        .ok_or_else(|| ProbeError::Parse("audio stream without channels".to_string()))?;

    let format = output.format.as_ref();
    let bitrate_kbps = stream
        .bit_rate
        .as_deref()
        .or_else(|| format.and_then(|f| f.bit_rate.as_deref()))
        .and_then(|bps| bps.parse::<u64>().ok())
        .filter(|bps| *bps > 0)
        .map(|bps| ((bps + 500) / 1000) as u32);

    let duration = stream
        .duration
        .as_deref()
        .or_else(|| format.and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok());

    Ok(AudioProbe {
        codec,
        bitrate_kbps,
        sample_rate,
        channels,
        duration,
    })
}
