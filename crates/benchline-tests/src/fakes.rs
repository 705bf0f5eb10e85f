//! In-process stand-ins for the toolchain, benchmark service and event sink.

use async_trait::async_trait;
use benchline_core::artifact::ArtifactSet;
use benchline_core::events::Event;
use benchline_core::ports::{
    BenchmarkService, BuildOutput, BuildRequest, EventSink, ExecutionOutput, ExecutionRequest, Toolchain,
};
use benchline_core::run::JobState;
use benchline_core::{Error, RunId, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

/// Writes `<target>-<hash>` binaries plus `.d` files into the output directory
/// and reports the binaries it wrote.
pub struct FakeToolchain {
    exit_code: i32,
    skip: BTreeSet<String>,
    gate: Option<(watch::Sender<bool>, watch::Receiver<bool>)>,
    panic: bool,
    builds: AtomicUsize,
    started: AtomicUsize,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self {
            exit_code: 0,
            skip: BTreeSet::new(),
            gate: None,
            panic: false,
            builds: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    /// Exit with `code` after producing output.
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Produce nothing for `target`.
    pub fn skip(mut self, target: &str) -> Self {
        self.skip.insert(target.to_string());
        self
    }

    /// Block every build until [`FakeToolchain::open_gate`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(watch::channel(false));
        self
    }

    /// Panic instead of building.
    pub fn panics(mut self) -> Self {
        self.panic = true;
        self
    }

    pub fn open_gate(&self) {
        if let Some((tx, _)) = &self.gate {
            let _ = tx.send(true);
        }
    }

    /// Builds that have finished.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Builds that have started, including ones waiting on the gate.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn build(&self, request: &BuildRequest) -> Result<BuildOutput> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some((_, rx)) = &self.gate {
            let mut rx = rx.clone();
            rx.wait_for(|open| *open)
                .await
                .map_err(|_| Error::Internal("gate closed".to_string()))?;
        }
        if self.panic {
            panic!("toolchain crashed");
        }

        let output_dir = request.workspace.join(&request.output_dir);
        fs::create_dir_all(&output_dir)?;
        let mut artifacts = ArtifactSet::new();
        for target in &request.targets {
            if self.skip.contains(target) {
                continue;
            }
            let executable = output_dir.join(format!("{target}-0f3c9a1b"));
            fs::write(&executable, format!("bench {target}"))?;
            fs::write(output_dir.join(format!("{target}-0f3c9a1b.d")), "deps")?;
            artifacts.insert(target.clone(), executable);
        }

        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(BuildOutput {
            exit_code: self.exit_code,
            output_dir,
            artifacts,
            captured_output: if self.exit_code == 0 {
                String::new()
            } else {
                "error: could not compile `oxc_benchmark`".to_string()
            },
        })
    }
}

/// Sets a flag when dropped, marking in-flight work as torn down.
struct Reclaim<'a>(&'a AtomicBool);

impl Drop for Reclaim<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Records invocations and answers with a fixed exit code.
pub struct FakeBenchmarkService {
    exit_code: i32,
    payload: String,
    hang: bool,
    invocations: Mutex<Vec<ExecutionRequest>>,
    staged: Mutex<Vec<Vec<String>>>,
    reclaimed: AtomicBool,
}

impl FakeBenchmarkService {
    pub fn new() -> Self {
        Self {
            exit_code: 0,
            payload: "Benchmarks uploaded".to_string(),
            hang: false,
            invocations: Mutex::new(Vec::new()),
            staged: Mutex::new(Vec::new()),
            reclaimed: AtomicBool::new(false),
        }
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn payload(mut self, payload: &str) -> Self {
        self.payload = payload.to_string();
        self
    }

    /// Never finish on its own; stop only when the request timeout elapses.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn last_artifact_dir(&self) -> Option<PathBuf> {
        self.invocations
            .lock()
            .unwrap()
            .last()
            .map(|r| r.artifact_dir.clone())
    }

    /// File names present in the artifact directory at each invocation.
    pub fn staged_files(&self) -> Vec<Vec<String>> {
        self.staged.lock().unwrap().clone()
    }

    /// Whether an in-flight execution was torn down by a timeout.
    pub fn was_reclaimed(&self) -> bool {
        self.reclaimed.load(Ordering::SeqCst)
    }
}

impl Default for FakeBenchmarkService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BenchmarkService for FakeBenchmarkService {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutput> {
        self.invocations.lock().unwrap().push(request.clone());

        let mut files: Vec<String> = fs::read_dir(&request.artifact_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        self.staged.lock().unwrap().push(files);

        if self.hang {
            let guard = Reclaim(&self.reclaimed);
            let forever = std::future::pending::<()>();
            if tokio::time::timeout(request.timeout, forever).await.is_err() {
                drop(guard);
                return Err(Error::Timeout {
                    timeout: request.timeout,
                });
            }
        }

        Ok(ExecutionOutput {
            exit_code: self.exit_code,
            payload: format!("{} (token {})", self.payload, request.credentials.token.expose()),
        })
    }
}

/// Collects published events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Events concerning `run_id`, in publish order.
    pub fn for_run(&self, run_id: RunId) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.run_id() == run_id)
            .collect()
    }

    /// Stages that `run_id` started.
    pub fn stages_started(&self, run_id: RunId) -> Vec<JobState> {
        self.for_run(run_id)
            .into_iter()
            .filter_map(|e| match e {
                Event::StageStarted(p) => Some(p.stage),
                _ => None,
            })
            .collect()
    }

    pub fn superseded(&self) -> Vec<RunId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::RunSuperseded(p) => Some(p.run_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn publish(&self, event: Event) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
