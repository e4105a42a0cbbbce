//! Supervision loop
//!
//! Drives one run of the traversal tool: launch, line-by-line output
//! handling, and the terminal phase once the child exits or a shutdown is
//! requested. The supervisor is the only writer of the status record.

use super::launch::{Invocation, LaunchConfig};
use super::process::{decode_lossy, exit_code, ChildProcess};
use crate::{
    connectivity::{is_heartbeat, LineParser},
    storage::{LogSink, MonitorSettings, Phase, StatusRecord, StatusStore},
    Error, Result,
};
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, error, info};

/// How long to wait for trailing output once the child has exited
const DRAIN_IDLE: Duration = Duration::from_millis(500);

/// Supervisor for the traversal tool process
///
/// # Example
/// ```rust,no_run
/// use natmon::storage::MonitorSettings;
/// use natmon::supervisor::{LaunchConfig, Supervisor};
///
/// # async fn example() {
/// let mut launch = LaunchConfig::new();
/// launch.set("-p", 8080u16);
///
/// let mut supervisor = Supervisor::new(MonitorSettings::default(), launch);
/// let phase = supervisor.run(async {
///     let _ = tokio::signal::ctrl_c().await;
/// }).await;
/// println!("natter finished: {}", phase);
/// # }
/// ```
#[derive(Debug)]
pub struct Supervisor {
    settings: MonitorSettings,
    launch: LaunchConfig,
    parser: LineParser,
    store: StatusStore,
    sink: LogSink,
}

impl Supervisor {
    /// Create a supervisor; nothing is launched until `run`
    pub fn new(settings: MonitorSettings, launch: LaunchConfig) -> Self {
        let store = StatusStore::new(settings.status_path(), StatusRecord::new(launch.clone()));
        let sink = LogSink::new(settings.log_path());
        Self {
            settings,
            launch,
            parser: LineParser::new(),
            store,
            sink,
        }
    }

    /// Status store of the current (or last) run
    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Status record of the current (or last) run
    pub fn status(&self) -> &StatusRecord {
        self.store.record()
    }

    /// Program and arguments the child is launched with
    pub fn invocation(&self) -> Invocation {
        Invocation::build(&self.settings, &self.launch)
    }

    /// Run the child until it exits or `shutdown` resolves
    ///
    /// Each call is a new run: the status record is re-created and the raw
    /// log cleared. Returns the terminal phase.
    ///
    /// Log appends and status publishes are blocking file writes made inline
    /// on the calling task, one small file per accepted line. Pipe reading
    /// runs on separate tasks and is not held up by them.
    pub async fn run<F>(&mut self, shutdown: F) -> Phase
    where
        F: Future<Output = ()>,
    {
        self.store.reset(StatusRecord::new(self.launch.clone()));
        self.sink.clear();

        let invocation = self.invocation();
        info!("Starting natter monitor: {}", invocation);
        if !self.launch.is_empty() {
            info!("Launch flags: {}", self.launch);
        }
        self.store.transition(Phase::Running);

        let mut process = match ChildProcess::spawn(&invocation, self.settings.channel_capacity) {
            Ok(process) => process,
            Err(e) => {
                error!("{}", e);
                self.store.transition(Phase::Error(e.to_string()));
                return self.status().phase().clone();
            }
        };
        info!("natter running (pid {:?})", process.id());

        let phase = match self.supervise(&mut process, shutdown).await {
            Ok(code) => {
                info!("natter exited with code {:?}", code);
                Phase::Stopped { code }
            }
            Err(e) => {
                error!("Monitoring failed: {}", e);
                Phase::Error(e.to_string())
            }
        };

        self.store.transition(phase);
        self.status().phase().clone()
    }

    /// Consume output until exit; returns the exit code
    async fn supervise<F>(&mut self, process: &mut ChildProcess, shutdown: F) -> Result<Option<i32>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stream_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, terminating natter");
                    let status = process.terminate().await?;
                    return Ok(exit_code(status));
                }
                line = process.lines.recv(), if stream_open => match line {
                    Some(raw) => {
                        self.handle_line(&raw);
                        if let Some(status) = process.try_exit_status()? {
                            self.drain(process, shutdown.as_mut()).await;
                            return Ok(exit_code(status));
                        }
                    }
                    None => {
                        debug!("natter output stream closed");
                        stream_open = false;
                    }
                },
                status = process.child.wait() => {
                    let status = status
                        .map_err(|e| Error::Supervisor(format!("Failed to read exit status: {}", e)))?;
                    self.drain(process, shutdown.as_mut()).await;
                    return Ok(exit_code(status));
                }
            }
        }
    }

    /// Handle output still in flight when the child exited
    ///
    /// Stops at end of stream, once no line arrives within `DRAIN_IDLE`, or
    /// when `shutdown` resolves. A detached grandchild may hold the pipe open
    /// and keep writing to it.
    async fn drain<F>(&mut self, process: &mut ChildProcess, mut shutdown: Pin<&mut F>)
    where
        F: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, dropping remaining natter output");
                    break;
                }
                next = tokio::time::timeout(DRAIN_IDLE, process.next_line()) => match next {
                    Ok(Some(raw)) => self.handle_line(&raw),
                    Ok(None) => break,
                    Err(_) => {
                        debug!("No output for {:?} after exit, stop draining", DRAIN_IDLE);
                        break;
                    }
                },
            }
        }
    }

    fn handle_line(&mut self, raw: &[u8]) {
        let decoded = decode_lossy(raw);
        let line = decoded.trim_end_matches(['\r', '\n']);

        if self.settings.echo_output {
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", line.trim());
        }

        self.sink.append(line);

        if is_heartbeat(line) {
            return;
        }

        if let Some(fact) = self.parser.extract(line) {
            self.store.apply_fact(&fact, line);
        }
    }
}
