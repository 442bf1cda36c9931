//! Fully wired pipeline over temporary directories

use super::fakes::{FakeProber, FakeTranscoder, RecordingSink};
use mixtape_common::events::EventBus;
use mixtape_merge::models::{ItemKind, OwnerId, QueueItem};
use mixtape_merge::orchestrator::{JobEvent, MergeRun, Orchestrator};
use mixtape_merge::quality::QualityAnalyzer;
use mixtape_merge::session::SessionStore;
use mixtape_merge::source::{Classifier, ResourceLedger, SourceResolver, WorkArea};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const CAPACITY: usize = 20;

#[derive(Default)]
pub struct HarnessOptions {
    pub gate: Option<Arc<Semaphore>>,
    pub transcoder_fails: bool,
    pub sink_fails: bool,
    pub merge_timeout: Option<Duration>,
    pub fetch_timeout: Option<Duration>,
    pub local_endpoint: Option<String>,
}

pub struct Harness {
    pub temp: TempDir,
    pub storage_root: PathBuf,
    pub work: WorkArea,
    pub ledger: Arc<ResourceLedger>,
    pub event_bus: EventBus,
    pub store: Arc<SessionStore>,
    pub resolver: Arc<SourceResolver>,
    pub transcoder: Arc<FakeTranscoder>,
    pub sink: Arc<RecordingSink>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let temp = TempDir::new().unwrap();
        let storage_root = temp.path().join("storage");
        std::fs::create_dir_all(&storage_root).unwrap();

        let ledger = Arc::new(ResourceLedger::new());
        let work = WorkArea::new(temp.path().join("work"), Arc::clone(&ledger));
        let event_bus = EventBus::new(256);
        let store = Arc::new(SessionStore::in_memory(CAPACITY).with_event_bus(event_bus.clone()));

        let endpoint = options
            .local_endpoint
            .as_deref()
            .map(|e| reqwest::Url::parse(e).unwrap());
        let resolver = Arc::new(SourceResolver::new(
            &storage_root,
            Classifier::new(endpoint, vec!["video.example".to_string()]),
            work.clone(),
            options.fetch_timeout.unwrap_or(Duration::from_secs(10)),
        ));

        let mut transcoder = FakeTranscoder::new(work.clone());
        if let Some(gate) = options.gate {
            transcoder = transcoder.gated(gate);
        }
        if options.transcoder_fails {
            transcoder = transcoder.failing();
        }
        let transcoder = Arc::new(transcoder);

        let sink = Arc::new(if options.sink_fails {
            RecordingSink::failing()
        } else {
            RecordingSink::default()
        });

        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::new(QualityAnalyzer::new(Arc::new(FakeProber))),
            Arc::clone(&transcoder) as Arc<dyn mixtape_merge::transcode::Transcoder>,
            event_bus.clone(),
        )
        .with_merge_timeout(options.merge_timeout);

        Self {
            temp,
            storage_root,
            work,
            ledger,
            event_bus,
            store,
            resolver,
            transcoder,
            sink,
            orchestrator,
        }
    }

    /// Create `name` under the storage root
    pub fn write_source(&self, name: &str, contents: &str) {
        let path = self.storage_root.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Create `name` under the storage root and queue it for `owner_id`
    pub fn enqueue_source(&self, owner_id: OwnerId, name: &str, contents: &str) {
        self.write_source(name, contents);
        assert!(self.store.enqueue(owner_id, local_item(name)));
    }

    pub fn run_merge(&self, owner_id: OwnerId) -> MergeRun {
        self.orchestrator
            .run_merge(owner_id, self.sink.clone())
            .expect("merge should start")
    }

    /// Entries left in the private work area
    pub fn work_entries(&self) -> usize {
        std::fs::read_dir(self.work.root())
            .map(|d| d.count())
            .unwrap_or(0)
    }
}

pub fn local_item(reference: &str) -> QueueItem {
    QueueItem::new(ItemKind::LocalReference, reference, reference)
}

/// Drain a job's events until the stream closes
pub async fn collect_events(run: &mut MergeRun) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Some(event) = tokio::time::timeout(Duration::from_secs(10), run.events.recv())
        .await
        .expect("job events stalled")
    {
        events.push(event);
    }
    events
}

/// Wait for a specific state on a job's stream, returning the events seen
pub async fn wait_for_state(
    run: &mut MergeRun,
    state: mixtape_common::events::JobState,
) -> Vec<JobEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(10), run.events.recv())
            .await
            .expect("job events stalled")
            .expect("job ended before reaching state");
        let reached = matches!(&event, JobEvent::StateChanged { state: s, .. } if *s == state);
        seen.push(event);
        if reached {
            return seen;
        }
    }
}
