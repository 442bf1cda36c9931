//! Quality analysis: probing inputs and negotiating one output profile

pub mod analyzer;
pub mod codecs;
pub mod probe;

pub use analyzer::{aggregate, Analysis, QualityAnalyzer};
pub use probe::{AudioProbe, FfprobeProber, MediaProber, ProbeError};
