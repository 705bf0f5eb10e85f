//! Test context wiring a scheduler to in-process fakes.

use crate::fakes::{FakeBenchmarkService, FakeToolchain, MemorySink};
use crate::fixtures::ConfigFixture;
use benchline_core::config::DispatchConfig;
use benchline_core::secrets::{Credentials, SecretValue};
use benchline_scheduler::{RunPipeline, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Token handed to the fake benchmark service.
pub const TEST_TOKEN: &str = "codspeed-test-token";

/// Scheduler plus the fakes behind it, rooted in a temporary workspace.
///
/// Drop this to remove the workspace.
pub struct TestContext {
    pub workspace: TempDir,
    pub config: Arc<DispatchConfig>,
    pub toolchain: Arc<FakeToolchain>,
    pub service: Arc<FakeBenchmarkService>,
    pub sink: Arc<MemorySink>,
    pub scheduler: Scheduler,
}

impl TestContext {
    /// Create a context with default fakes.
    pub fn new() -> anyhow::Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> TestContextBuilder {
        TestContextBuilder::default()
    }

    /// Directory the runner reads staged artifacts from.
    pub fn dest_dir(&self) -> PathBuf {
        self.config.build.workspace.join(&self.config.artifacts.dest_dir)
    }

    /// Directory the fake toolchain writes to.
    pub fn output_dir(&self) -> PathBuf {
        self.config.build.output_path()
    }
}

#[derive(Default)]
pub struct TestContextBuilder {
    all_targets: bool,
    toolchain: Option<FakeToolchain>,
    service: Option<FakeBenchmarkService>,
    configure: Option<Box<dyn FnOnce(&mut DispatchConfig)>>,
}

impl TestContextBuilder {
    /// Use the default configuration with every bench target instead of
    /// the two-target fixture.
    pub fn all_targets(mut self) -> Self {
        self.all_targets = true;
        self
    }

    pub fn toolchain(mut self, toolchain: FakeToolchain) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    pub fn service(mut self, service: FakeBenchmarkService) -> Self {
        self.service = Some(service);
        self
    }

    /// Adjust the configuration before the scheduler is built.
    pub fn configure(mut self, f: impl FnOnce(&mut DispatchConfig) + 'static) -> Self {
        self.configure = Some(Box::new(f));
        self
    }

    pub fn build(self) -> anyhow::Result<TestContext> {
        crate::init_test_logging();

        let workspace = TempDir::new()?;
        let mut config = if self.all_targets {
            ConfigFixture::all_targets(workspace.path())
        } else {
            ConfigFixture::for_workspace(workspace.path())
        };
        if let Some(configure) = self.configure {
            configure(&mut config);
        }
        config.validate()?;
        let config = Arc::new(config);

        let toolchain = Arc::new(self.toolchain.unwrap_or_default());
        let service = Arc::new(self.service.unwrap_or_default());
        let sink = Arc::new(MemorySink::new());

        let pipeline = RunPipeline::new(
            config.clone(),
            toolchain.clone(),
            service.clone(),
            sink.clone(),
            Credentials::new(config.runner.token_env.clone(), SecretValue::new(TEST_TOKEN)),
        );
        let scheduler = Scheduler::new(Arc::new(pipeline), sink.clone());

        Ok(TestContext {
            workspace,
            config,
            toolchain,
            service,
            sink,
            scheduler,
        })
    }
}
