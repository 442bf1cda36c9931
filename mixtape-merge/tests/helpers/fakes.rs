//! Test doubles for the external tools and the output collaborator

use async_trait::async_trait;
use mixtape_merge::error::{MergeError, MergeResult};
use mixtape_merge::models::{OwnerId, QualityProfile};
use mixtape_merge::orchestrator::{DeliveredOutput, OutputSink};
use mixtape_merge::quality::probe::parse_ffprobe_json;
use mixtape_merge::quality::{AudioProbe, MediaProber, ProbeError};
use mixtape_merge::source::{SourceHandle, WorkArea};
use mixtape_merge::transcode::{MergeProgress, MergeRequest, Transcoder};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

/// ffprobe JSON for an MP3 file
pub fn mp3_probe(kbps: u32, sample_rate: u32) -> String {
    format!(
        r#"{{"streams": [{{"codec_type": "audio", "codec_name": "mp3",
            "sample_rate": "{}", "channels": 2, "bit_rate": "{}", "duration": "60.0"}}],
            "format": {{"duration": "60.0"}}}}"#,
        sample_rate,
        kbps * 1000
    )
}

/// ffprobe JSON for a FLAC file
pub fn flac_probe(sample_rate: u32) -> String {
    format!(
        r#"{{"streams": [{{"codec_type": "audio", "codec_name": "flac",
            "sample_rate": "{}", "channels": 2}}],
            "format": {{"duration": "120.0", "bit_rate": "2100000"}}}}"#,
        sample_rate
    )
}

/// Prober that reads ffprobe JSON stored as the file's content
///
/// Files whose content is not ffprobe JSON fail to probe.
#[derive(Debug, Default)]
pub struct FakeProber;

#[async_trait]
impl MediaProber for FakeProber {
    async fn probe(&self, path: &Path) -> Result<AudioProbe, ProbeError> {
        let bytes = tokio::fs::read(path).await?;
        parse_ffprobe_json(&bytes)
    }
}

/// One recorded transcoder invocation
#[derive(Debug, Clone)]
pub struct MergeCall {
    /// Input file names, in the order given to the transcoder
    pub inputs: Vec<String>,
    pub profile: QualityProfile,
}

/// Transcoder that concatenates input bytes
pub struct FakeTranscoder {
    work: WorkArea,
    calls: Mutex<Vec<MergeCall>>,
    gate: Option<Arc<Semaphore>>,
    fail: bool,
}

impl FakeTranscoder {
    pub fn new(work: WorkArea) -> Self {
        Self {
            work,
            calls: Mutex::new(Vec::new()),
            gate: None,
            fail: false,
        }
    }

    /// Block every merge until a permit is added to `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> Vec<MergeCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn merge(
        &self,
        request: MergeRequest,
        progress: mpsc::Sender<MergeProgress>,
    ) -> MergeResult<SourceHandle> {
        self.calls.lock().unwrap().push(MergeCall {
            inputs: request
                .inputs
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect(),
            profile: request.profile.clone(),
        });

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| MergeError::TranscodeFailure(e.to_string()))?;
            permit.forget();
        }

        if self.fail {
            return Err(MergeError::TranscodeFailure("exit status: 1".to_string()));
        }

        let dir = self.work.create_dir("merge-")?;
        let output = dir
            .path()
            .join(format!("merged.{}", request.profile.container.extension()));
        let mut merged = Vec::new();
        for input in &request.inputs {
            merged.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(&output, &merged).await?;

        let _ = progress.try_send(MergeProgress {
            percent: Some(100.0),
            elapsed: Duration::from_millis(5),
        });

        Ok(self.work.handle(dir, output))
    }
}

/// One delivered output
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: Uuid,
    pub owner_id: OwnerId,
    pub bytes: Vec<u8>,
    pub profile: QualityProfile,
}

/// Sink that keeps delivered outputs in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn deliver(
        &self,
        job_id: Uuid,
        owner_id: OwnerId,
        output: &Path,
        profile: &QualityProfile,
    ) -> MergeResult<DeliveredOutput> {
        if self.fail {
            return Err(MergeError::Delivery("upload rejected".to_string()));
        }
        let bytes = tokio::fs::read(output).await?;
        self.deliveries.lock().unwrap().push(Delivery {
            job_id,
            owner_id,
            bytes,
            profile: profile.clone(),
        });
        let name = format!("{}.{}", job_id, profile.container.extension());
        Ok(DeliveredOutput {
            location: format!("memory://{}", name),
            name,
        })
    }
}
