//! Output quality negotiation across heterogeneous inputs
//!
//! Aggregation is deterministic and order-independent:
//! - sample rate and channel count are the maximum over inputs, floored at 44.1 kHz stereo
//! - any lossless input makes the output lossless FLAC (no bit rate)
//! - otherwise MP3 at `clamp(max(input bit rates, 192), 192, 320)` kbps

use super::codecs::{encoder_for, is_lossless_codec};
use super::probe::{AudioProbe, MediaProber};
use crate::models::{ContainerFormat, QualityProfile};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SAMPLE_RATE_FLOOR: u32 = 44_100;
pub const CHANNEL_FLOOR: u16 = 2;
pub const MIN_LOSSY_KBPS: u32 = 192;
pub const MAX_LOSSY_KBPS: u32 = 320;

/// Profile plus what the merge step needs for progress reporting
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub profile: QualityProfile,
    /// Sum of input durations; `None` if unknown or out of range
    pub total_duration: Option<Duration>,
    /// Per-input probe results (fallbacks included), in input order
    pub probes: Vec<AudioProbe>,
}

pub struct QualityAnalyzer {
    prober: Arc<dyn MediaProber>,
}

impl QualityAnalyzer {
    pub fn new(prober: Arc<dyn MediaProber>) -> Self {
        Self { prober }
    }

    /// Probe every input in order and compute the output profile
    ///
    /// Never fails: an input that cannot be probed contributes
    /// [`AudioProbe::fallback`].
    pub async fn analyze(&self, inputs: &[&Path]) -> Analysis {
        let mut probes = Vec::with_capacity(inputs.len());

        for path in inputs {
            let probe = match self.prober.probe(path).await {
                Ok(probe) => {
                    debug!(
                        file = %path.display(),
                        codec = %probe.codec,
                        sample_rate = probe.sample_rate,
                        channels = probe.channels,
                        bitrate_kbps = ?probe.bitrate_kbps,
                        "Probed input"
                    );
                    probe
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Probe failed, assuming defaults");
                    AudioProbe::fallback()
                }
            };
            probes.push(probe);
        }

        let total_duration = total_duration(&probes);

        Analysis {
            profile: aggregate(&probes),
            total_duration,
            probes,
        }
    }
}

/// Sum of input durations; `None` if any is unknown or the sum overflows
pub fn total_duration(probes: &[AudioProbe]) -> Option<Duration> {
    probes
        .iter()
        .try_fold(Duration::ZERO, |total, p| total.checked_add(p.duration?))
}

/// Compute the output profile from probe results
pub fn aggregate(probes: &[AudioProbe]) -> QualityProfile {
    let sample_rate = probes
        .iter()
        .map(|p| p.sample_rate)
        .fold(SAMPLE_RATE_FLOOR, u32::max);

    let channels = probes
        .iter()
        .map(|p| p.channels)
        .fold(CHANNEL_FLOOR, u16::max);

    let lossless = probes.iter().any(|p| is_lossless_codec(&p.codec));

    if lossless {
        return QualityProfile {
            sample_rate,
            channels,
            lossless: true,
            bitrate_kbps: None,
            container: ContainerFormat::Flac,
            codec: encoder_for(ContainerFormat::Flac).to_string(),
        };
    }

    let bitrate = probes
        .iter()
        .filter_map(|p| p.bitrate_kbps)
        .fold(MIN_LOSSY_KBPS, u32::max)
        .clamp(MIN_LOSSY_KBPS, MAX_LOSSY_KBPS);

    QualityProfile {
        sample_rate,
        channels,
        lossless: false,
        bitrate_kbps: Some(bitrate),
        container: ContainerFormat::Mp3,
        codec: encoder_for(ContainerFormat::Mp3).to_string(),
    }
}
