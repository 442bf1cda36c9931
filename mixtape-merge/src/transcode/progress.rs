//! Parser for ffmpeg `-progress` output
//!
//! ffmpeg writes blocks of `key=value` lines, each block terminated by
//! `progress=continue` or `progress=end`. Only the output timestamp matters here.

use mixtape_common::human_time::parse_clock;
use serde::Serialize;
use std::time::Duration;

/// One observation of a running merge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MergeProgress {
    /// Percent of total input duration written, when the total is known
    pub percent: Option<f32>,
    /// Wall-clock time since the transcoder started
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Accumulates `key=value` lines into output timestamps
#[derive(Debug, Default)]
pub struct ProgressParser {
    total: Option<Duration>,
    out_time: Option<Duration>,
}

impl ProgressParser {
    pub fn new(total: Option<Duration>) -> Self {
        Self {
            total: total.filter(|t| !t.is_zero()),
            out_time: None,
        }
    }

    /// Feed one line; returns the output timestamp when a block completes
    pub fn feed_line(&mut self, line: &str) -> Option<Duration> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // out_time_ms is microseconds as well (long-standing ffmpeg quirk)
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<u64>() {
                    self.out_time = Some(Duration::from_micros(us));
                }
                None
            }
            "out_time" => {
                if self.out_time.is_none() {
                    self.out_time = parse_clock(value);
                }
                None
            }
            "progress" => self.out_time.take(),
            _ => None,
        }
    }

    /// Percent of the total duration covered by `out_time`, capped at 100
    pub fn percent(&self, out_time: Duration) -> Option<f32> {
        let total = self.total?;
        let ratio = out_time.as_secs_f64() / total.as_secs_f64();
        Some((ratio * 100.0).clamp(0.0, 100.0) as f32)
    }
}
