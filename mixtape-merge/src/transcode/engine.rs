//! MergeEngine: concatenating transcode through an external ffmpeg process

use super::command::FfmpegCommandBuilder;
use super::progress::{MergeProgress, ProgressParser};
use crate::deadline::Deadline;
use crate::error::{MergeError, MergeResult};
use crate::models::QualityProfile;
use crate::source::{SourceHandle, WorkArea};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// stderr lines kept for failure diagnostics
const STDERR_TAIL_LINES: usize = 20;

/// Everything one merge needs
#[derive(Debug, Clone)]
pub struct MergeRequest {
    /// Inputs in concatenation order
    pub inputs: Vec<PathBuf>,
    pub profile: QualityProfile,
    /// Sum of input durations, used for percent progress
    pub total_duration: Option<Duration>,
    /// Job ceiling; the transcoder is killed when it passes
    pub deadline: Option<Deadline>,
}

/// Produces one merged output file
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Merge `request.inputs` into one output owned by the returned handle
    ///
    /// Progress is best effort: it is sent with `try_send` and dropped when the
    /// receiver is slow or gone. On failure no output file remains.
    async fn merge(
        &self,
        request: MergeRequest,
        progress: mpsc::Sender<MergeProgress>,
    ) -> MergeResult<SourceHandle>;
}

/// [`Transcoder`] running the `ffmpeg` executable
#[derive(Debug, Clone)]
pub struct MergeEngine {
    ffmpeg: PathBuf,
    threads: usize,
    work: WorkArea,
}

impl MergeEngine {
    pub fn new(ffmpeg: impl Into<PathBuf>, threads: usize, work: WorkArea) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            threads: threads.max(1),
            work,
        }
    }
}

#[async_trait]
impl Transcoder for MergeEngine {
    async fn merge(
        &self,
        request: MergeRequest,
        progress: mpsc::Sender<MergeProgress>,
    ) -> MergeResult<SourceHandle> {
        if request.inputs.is_empty() {
            return Err(MergeError::TranscodeFailure("no inputs".to_string()));
        }

        let dir = self.work.create_dir("merge-")?;
        let output = dir
            .path()
            .join(format!("merged.{}", request.profile.container.extension()));

        let args = FfmpegCommandBuilder::new(&output)
            .with_inputs(request.inputs.as_slice())
            .with_profile(&request.profile)
            .with_threads(self.threads)
            .build();
        debug!(program = %self.ffmpeg.display(), args = ?args, "Starting transcoder");

        let mut child = tokio::process::Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                MergeError::TranscodeFailure(format!(
                    "cannot start {}: {}",
                    self.ffmpeg.display(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MergeError::TranscodeFailure("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MergeError::TranscodeFailure("stderr not captured".to_string()))?;

        let started = Instant::now();
        let progress_task = tokio::spawn(relay_progress(
            stdout,
            ProgressParser::new(request.total_duration),
            started,
            progress,
        ));
        let stderr_task = tokio::spawn(collect_tail(stderr));

        let waited = match request.deadline {
            Some(deadline) => match deadline.run(child.wait()).await {
                Ok(status) => status,
                Err(expired) => {
                    warn!(budget = ?expired.budget, "Transcoder exceeded deadline, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "Failed to kill transcoder");
                    }
                    progress_task.abort();
                    stderr_task.abort();
                    return Err(MergeError::Timeout(expired.budget));
                }
            },
            None => child.wait().await,
        };

        let status = waited
            .map_err(|e| MergeError::TranscodeFailure(format!("waiting for transcoder: {}", e)))?;
        let _ = progress_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!(status = %status, stderr = %stderr_tail, "Transcoder failed");
            return Err(MergeError::TranscodeFailure(format!(
                "ffmpeg exited with {}: {}",
                status, stderr_tail
            )));
        }

        let size = match tokio::fs::metadata(&output).await {
            Ok(meta) if meta.len() > 0 => meta.len(),
            _ => {
                return Err(MergeError::TranscodeFailure(
                    "transcoder produced no output".to_string(),
                ));
            }
        };

        info!(
            inputs = request.inputs.len(),
            bytes = size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Merge transcode finished"
        );
        Ok(self.work.handle(dir, output))
    }
}

async fn relay_progress<R>(
    stdout: R,
    mut parser: ProgressParser,
    started: Instant,
    tx: mpsc::Sender<MergeProgress>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(out_time) = parser.feed_line(&line) {
            let _ = tx.try_send(MergeProgress {
                percent: parser.percent(out_time),
                elapsed: started.elapsed(),
            });
        }
    }
}

async fn collect_tail<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}
