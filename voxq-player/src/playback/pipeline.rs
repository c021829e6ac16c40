//! Fetch → transcode → encode process pipeline
//!
//! Each track is played through three chained external processes. Stage N's
//! stdout is handed directly to stage N+1 as stdin; every stage's stderr goes
//! to the host's stderr. The encode stage's stdout is what the frame reader
//! consumes.
//!
//! Lifecycle: [`Pipeline::start`] spawns the stages in order and returns a
//! [`RunningPipeline`]; the caller takes the output stream, and the pipeline
//! is torn down when it is dropped (or explicitly via `teardown`/`shutdown`).
//! Teardown order between stages is not defined, so an upstream stage dying
//! of a broken pipe is expected.

use crate::error::{Error, Result};
use std::process::{ExitStatus, Stdio};
use tokio::io::BufReader;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, trace, warn};
use voxq_common::config::ToolsConfig;

/// Buffer size between the encode stage and the frame reader
pub const OUTPUT_BUFFER_SIZE: usize = 16 * 1024;

/// Placeholder replaced by the track's source URL
pub const URL_PLACEHOLDER: &str = "{url}";

/// Placeholder replaced by the format selector
pub const FORMAT_PLACEHOLDER: &str = "{format}";

/// Pipeline stage identity, in startup order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Transcode,
    Encode,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Fetch, Stage::Transcode, Stage::Encode];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transcode => "transcode",
            Stage::Encode => "encode",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Program plus argument template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl StageCommand {
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn render(&self, url: &str, format: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(URL_PLACEHOLDER, url).replace(FORMAT_PLACEHOLDER, format))
            .collect()
    }
}

/// Commands for the three stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub fetch: StageCommand,
    pub transcode: StageCommand,
    pub encode: StageCommand,
    pub format_selector: String,
    /// Prepend `-raw` to the encode stage arguments
    pub raw_framing: bool,
}

impl PipelineConfig {
    /// Explicit stage commands, run exactly as given (no `-raw` flag)
    pub fn new(fetch: StageCommand, transcode: StageCommand, encode: StageCommand) -> Self {
        Self {
            fetch,
            transcode,
            encode,
            format_selector: ToolsConfig::default().format_selector,
            raw_framing: false,
        }
    }

    /// Standard stage arguments around the configured program paths
    pub fn from_tools(tools: &ToolsConfig) -> Self {
        Self {
            fetch: StageCommand::new(
                &tools.fetch,
                ["-v", "-f", FORMAT_PLACEHOLDER, "-o", "-", URL_PLACEHOLDER],
            ),
            transcode: StageCommand::new(
                &tools.transcode,
                [
                    "-i", "pipe:0", "-f", "s16le", "-ar", "48000", "-ac", "2", "pipe:1",
                ],
            ),
            encode: StageCommand::new(&tools.encode, ["-i", "pipe:0"]),
            format_selector: tools.format_selector.clone(),
            raw_framing: tools.raw_framing,
        }
    }

    fn command(&self, stage: Stage) -> &StageCommand {
        match stage {
            Stage::Fetch => &self.fetch,
            Stage::Transcode => &self.transcode,
            Stage::Encode => &self.encode,
        }
    }

    /// Program and rendered arguments for one stage
    pub fn stage_argv(&self, stage: Stage, url: &str) -> (String, Vec<String>) {
        let command = self.command(stage);
        let mut args = command.render(url, &self.format_selector);
        if stage == Stage::Encode && self.raw_framing {
            args.insert(0, "-raw".to_string());
        }
        (command.program.clone(), args)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_tools(&ToolsConfig::default())
    }
}

struct StageProcess {
    stage: Stage,
    child: Child,
}

impl StageProcess {
    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            // Already exited; wait() still reaps it
            trace!(stage = %self.stage, error = %e, "Stage kill skipped");
        }
    }
}

/// Pipeline spawner
pub struct Pipeline;

impl Pipeline {
    /// Spawn fetch, transcode and encode for `url`, strictly in that order
    ///
    /// If any stage fails to start, the stages already running are torn
    /// down before the error is returned.
    pub fn start(config: &PipelineConfig, url: &str) -> Result<RunningPipeline> {
        let mut running = RunningPipeline {
            stages: Vec::with_capacity(Stage::ALL.len()),
            output: None,
        };
        let mut upstream: Option<Stdio> = None;

        for stage in Stage::ALL {
            let (program, args) = config.stage_argv(stage, url);
            trace!(%stage, %program, ?args, "Spawning pipeline stage");

            let mut command = Command::new(&program);
            command
                .args(&args)
                .stdin(upstream.take().unwrap_or_else(Stdio::null))
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);

            let mut child = command.spawn().map_err(|source| Error::PipelineSpawn {
                stage: stage.name(),
                source,
            })?;
            let stdout = child.stdout.take();
            running.stages.push(StageProcess { stage, child });

            let stdout = stdout.ok_or_else(|| Error::PipelineSpawn {
                stage: stage.name(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdout not captured"),
            })?;

            if stage == Stage::Encode {
                running.output = Some(stdout);
            } else {
                let next_stdin: Stdio = stdout.try_into().map_err(|source| Error::PipelineSpawn {
                    stage: stage.name(),
                    source,
                })?;
                upstream = Some(next_stdin);
            }
        }

        info!(pids = ?running.pids(), "Pipeline started");
        Ok(running)
    }
}

/// Three running stages and the encode output
///
/// Dropping it tears every stage down.
pub struct RunningPipeline {
    stages: Vec<StageProcess>,
    output: Option<ChildStdout>,
}

impl RunningPipeline {
    /// Buffered encode-stage output; `None` if already taken
    pub fn take_output(&mut self) -> Option<BufReader<ChildStdout>> {
        self.output
            .take()
            .map(|out| BufReader::with_capacity(OUTPUT_BUFFER_SIZE, out))
    }

    /// OS process ids of the stages still owned, in stage order
    pub fn pids(&self) -> Vec<u32> {
        self.stages.iter().filter_map(|s| s.child.id()).collect()
    }

    /// Kill every stage and reap it in the background
    ///
    /// Does not wait. Needs a tokio runtime for reaping; without one the
    /// children are only killed.
    pub fn teardown(&mut self) {
        self.output = None;
        let stages = std::mem::take(&mut self.stages);
        if stages.is_empty() {
            return;
        }

        let runtime = tokio::runtime::Handle::try_current().ok();
        for mut process in stages {
            process.kill();
            let StageProcess { stage, mut child } = process;

            match &runtime {
                Some(handle) => {
                    handle.spawn(async move {
                        match child.wait().await {
                            Ok(status) => debug!(%stage, %status, "Pipeline stage reaped"),
                            Err(e) => warn!(%stage, error = %e, "Failed to reap pipeline stage"),
                        }
                    });
                }
                None => drop(child),
            }
        }
    }

    /// Kill every stage and wait for all of them to exit
    pub async fn shutdown(mut self) -> Vec<(Stage, Option<ExitStatus>)> {
        self.output = None;
        let stages = std::mem::take(&mut self.stages);
        let mut statuses = Vec::with_capacity(stages.len());

        for mut process in stages {
            process.kill();
            let StageProcess { stage, mut child } = process;
            let status = match child.wait().await {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!(%stage, error = %e, "Failed to reap pipeline stage");
                    None
                }
            };
            statuses.push((stage, status));
        }
        statuses
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}
