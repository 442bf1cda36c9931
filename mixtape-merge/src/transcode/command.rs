//! ffmpeg argument construction for the merge step

use crate::models::{ContainerFormat, QualityProfile};
use std::path::{Path, PathBuf};

/// Highest FLAC compression level ffmpeg accepts
pub const FLAC_COMPRESSION_LEVEL: u32 = 12;

/// Best libmp3lame VBR quality (V0)
pub const MP3_VBR_QUALITY: u32 = 0;

/// Builds the argument list for one concatenating transcode
///
/// Each input is resampled to the profile's rate and channel layout before the
/// `concat` filter joins them in order, so inputs with different formats merge
/// into one continuous stream.
#[derive(Debug, Clone)]
pub struct FfmpegCommandBuilder {
    inputs: Vec<PathBuf>,
    output_path: PathBuf,
    profile: Option<QualityProfile>,
    threads: usize,
}

impl FfmpegCommandBuilder {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            inputs: Vec::new(),
            output_path: output_path.into(),
            profile: None,
            threads: 1,
        }
    }

    pub fn with_inputs<P: AsRef<Path>>(mut self, inputs: &[P]) -> Self {
        self.inputs = inputs.iter().map(|p| p.as_ref().to_path_buf()).collect();
        self
    }

    pub fn with_profile(mut self, profile: &QualityProfile) -> Self {
        self.profile = Some(profile.clone());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
        ];

        // Key/value progress blocks on stdout
        args.extend(["-nostats".into(), "-progress".into(), "pipe:1".into()]);

        args.extend(["-filter_complex_threads".into(), self.threads.to_string()]);

        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.to_string_lossy().into_owned());
        }

        let (sample_rate, channels) = self
            .profile
            .as_ref()
            .map(|p| (p.sample_rate, p.channels))
            .unwrap_or((44_100, 2));

        args.push("-filter_complex".into());
        args.push(concat_filter(self.inputs.len(), sample_rate, channels));
        args.extend(["-map".into(), "[out]".into(), "-vn".into()]);

        if let Some(profile) = &self.profile {
            args.extend(encoding_args(profile));
        }

        args.extend([
            "-ar".into(),
            sample_rate.to_string(),
            "-ac".into(),
            channels.to_string(),
            "-threads".into(),
            self.threads.to_string(),
        ]);

        args.push(self.output_path.to_string_lossy().into_owned());
        args
    }
}

/// Encoder flags for a profile
///
/// Lossless output uses maximum compression and no bit rate. MP3 uses the
/// highest-quality VBR mode; other lossy containers use the clamped bit rate.
fn encoding_args(profile: &QualityProfile) -> Vec<String> {
    let mut args = vec!["-c:a".to_string(), profile.codec.clone()];

    match profile.container {
        ContainerFormat::Flac => {
            args.extend([
                "-compression_level".into(),
                FLAC_COMPRESSION_LEVEL.to_string(),
            ]);
        }
        ContainerFormat::Wav => {}
        ContainerFormat::Mp3 => {
            args.extend(["-q:a".into(), MP3_VBR_QUALITY.to_string()]);
        }
        ContainerFormat::M4a | ContainerFormat::Ogg => {
            if let Some(kbps) = profile.bitrate_kbps {
                args.extend(["-b:a".into(), format!("{}k", kbps)]);
            }
        }
    }

    args
}

/// `filter_complex` graph resampling each input then concatenating in order
pub fn concat_filter(inputs: usize, sample_rate: u32, channels: u16) -> String {
    let layout = channel_layout(channels);
    let mut graph = String::new();

    for i in 0..inputs {
        graph.push_str(&format!(
            "[{i}:a:0]aresample={rate},aformat=sample_rates={rate}:channel_layouts={layout}[a{i}];",
            i = i,
            rate = sample_rate,
            layout = layout
        ));
    }
    for i in 0..inputs {
        graph.push_str(&format!("[a{}]", i));
    }
    graph.push_str(&format!("concat=n={}:v=0:a=1[out]", inputs));
    graph
}

/// ffmpeg channel layout name for a channel count
pub fn channel_layout(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        3 => "2.1".to_string(),
        4 => "quad".to_string(),
        5 => "5.0".to_string(),
        6 => "5.1".to_string(),
        7 => "6.1".to_string(),
        8 => "7.1".to_string(),
        n => format!("{}c", n),
    }
}
