use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;

use crate::client::Client;
use crate::error::AgentError;
use crate::frame;
use crate::process::spawn_with_retry;
use crate::transport::Transport;

const DEFAULT_BINARY_ENV: &str = "AGENT_BINARY";
const DEFAULT_BINARY_NAME: &str = "agent";
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
const DEFAULT_SHUTDOWN_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved settings for spawning and supervising the agent binary.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub binary: PathBuf,
    pub extra_args: Vec<OsString>,
    pub model: Option<String>,
    pub sandbox: Option<String>,
    pub approval_mode: Option<String>,
    pub config_overrides: BTreeMap<String, String>,
    pub current_dir: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
    pub startup_timeout: Duration,
    pub grace_period: Duration,
    pub max_frame_len: usize,
}

impl SupervisorConfig {
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }
}

/// Builder for [`SupervisorConfig`], the typed replacement for a file-based
/// config layer: binary path, working directory, environment, timeouts, and
/// the safety flags from `--model`/`--sandbox`/`--approval-mode`/`--config`.
#[derive(Debug, Clone)]
pub struct SupervisorConfigBuilder {
    binary: Option<PathBuf>,
    extra_args: Vec<OsString>,
    model: Option<String>,
    sandbox: Option<String>,
    approval_mode: Option<String>,
    config_overrides: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
    env: Option<HashMap<String, String>>,
    startup_timeout: Duration,
    grace_period: Duration,
    max_frame_len: usize,
}

impl Default for SupervisorConfigBuilder {
    fn default() -> Self {
        SupervisorConfigBuilder {
            binary: None,
            extra_args: Vec::new(),
            model: None,
            sandbox: None,
            approval_mode: None,
            config_overrides: BTreeMap::new(),
            current_dir: None,
            env: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_frame_len: frame::DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl SupervisorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the agent binary; if unset, resolution falls back to the
    /// `AGENT_BINARY` environment variable, then to `agent` on `PATH`.
    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    /// Appends one caller-supplied extra CLI argument. Extras are placed
    /// ahead of the typed safety flags, so they cannot override them.
    pub fn extra_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn sandbox(mut self, mode: impl Into<String>) -> Self {
        self.sandbox = Some(mode.into());
        self
    }

    pub fn approval_mode(mut self, mode: impl Into<String>) -> Self {
        self.approval_mode = Some(mode.into());
        self
    }

    pub fn config_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_overrides.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Replaces the child's environment entirely. Leaving this unset
    /// inherits the parent process environment untouched.
    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn grace_period(mut self, period: Duration) -> Self {
        self.grace_period = period;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn build(self) -> SupervisorConfig {
        let binary = self.binary.unwrap_or_else(default_binary);
        SupervisorConfig {
            binary,
            extra_args: self.extra_args,
            model: self.model,
            sandbox: self.sandbox,
            approval_mode: self.approval_mode,
            config_overrides: self.config_overrides,
            current_dir: self.current_dir,
            env: self.env,
            startup_timeout: self.startup_timeout,
            grace_period: self.grace_period,
            max_frame_len: self.max_frame_len,
        }
    }
}

fn default_binary() -> PathBuf {
    std::env::var_os(DEFAULT_BINARY_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY_NAME))
}

/// Builds `exec --experimental-json`, then extras, then the typed safety
/// flags in lexicographic `--config` key order — last-wins CLI semantics
/// mean the typed flags always override a conflicting extra argument.
fn build_args(config: &SupervisorConfig) -> Result<Vec<OsString>, AgentError> {
    if config.extra_args.iter().any(|arg| arg == "--") {
        return Err(AgentError::InvalidParams(
            "extra arguments must not contain `--`".into(),
        ));
    }

    let mut args = vec![
        OsString::from("exec"),
        OsString::from("--experimental-json"),
    ];
    args.extend(config.extra_args.iter().cloned());

    if let Some(model) = &config.model {
        args.push(OsString::from("--model"));
        args.push(OsString::from(model));
    }
    if let Some(sandbox) = &config.sandbox {
        args.push(OsString::from("--sandbox"));
        args.push(OsString::from(sandbox));
    }
    if let Some(mode) = &config.approval_mode {
        args.push(OsString::from("--approval-mode"));
        args.push(OsString::from(mode));
    }
    for (key, value) in &config.config_overrides {
        args.push(OsString::from("--config"));
        args.push(OsString::from(format!("{key}={value}")));
    }

    Ok(args)
}

/// Owns the child process, its [`Client`]/[`Transport`], a one-shot init
/// latch, and the wait-completion bookkeeping needed for a clean close.
pub struct Supervisor {
    child: Mutex<Option<tokio::process::Child>>,
    client: std::sync::Arc<Client>,
    startup_timeout: Duration,
    grace_period: Duration,
    init: Mutex<bool>,
}

impl Supervisor {
    /// Spawns the agent binary per `config` and wires its stdio to a fresh
    /// [`Transport`]/[`Client`] pair. Retries `ETXTBSY` spawn failures; see
    /// [`crate::process`].
    pub async fn spawn(config: SupervisorConfig) -> Result<Supervisor, AgentError> {
        let args = build_args(&config)?;

        let mut command = Command::new(&config.binary);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(env) = &config.env {
            command.env_clear();
            command.envs(env);
        }
        if let Some(dir) = &config.current_dir {
            command.current_dir(dir);
        }

        let mut child = spawn_with_retry(&mut command, &config.binary)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            AgentError::Transport("child stdout unavailable".to_string())
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            AgentError::Transport("child stdin unavailable".to_string())
        })?;

        let transport = std::sync::Arc::new(Transport::spawn_io(stdout, stdin, config.max_frame_len));
        let client = Client::attach(transport).await;

        Ok(Supervisor {
            child: Mutex::new(Some(child)),
            client,
            startup_timeout: config.startup_timeout,
            grace_period: config.grace_period,
            init: Mutex::new(false),
        })
    }

    /// The client driving this supervised process.
    pub fn client(&self) -> &std::sync::Arc<Client> {
        &self.client
    }

    /// Performs the one-shot `initialize` handshake under a local latch: a
    /// successful call sets the latch so later callers short-circuit, a
    /// failed call leaves it clear so the next caller retries.
    pub async fn ensure_init(&self, params: Value) -> Result<(), AgentError> {
        let mut init = self.init.lock().await;
        if *init {
            return Ok(());
        }

        let _: Value = self
            .client
            .call("initialize", params, false, Some(self.startup_timeout), None)
            .await
            .map_err(|err| AgentError::Handshake(err.to_string()))?;

        *init = true;
        Ok(())
    }

    /// Closes the transport (which half-closes the child's stdin, the
    /// functional equivalent of interrupting it without a platform-specific
    /// signal), waits for exit within the configured grace period, and
    /// force-kills on timeout. Idempotent; exit statuses caused by the
    /// delivered kill are not surfaced as errors.
    pub async fn close(&self) -> Result<(), AgentError> {
        let _: Result<Value, AgentError> = self
            .client
            .call(
                "shutdown",
                Value::Null,
                false,
                Some(DEFAULT_SHUTDOWN_RPC_TIMEOUT),
                None,
            )
            .await;
        let _ = self.client.notify("exit", Value::Null, None).await;

        self.client.transport().close().await;

        let mut guard = self.child.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(Ok(status)) => filter_signal_exit(status),
            Ok(Err(source)) => Err(AgentError::Wait { source }),
            Err(_) => {
                let _ = child.start_kill();
                match child.wait().await {
                    Ok(status) => filter_signal_exit(status),
                    Err(source) => Err(AgentError::Wait { source }),
                }
            }
        }
    }
}

#[cfg(unix)]
fn filter_signal_exit(status: ExitStatus) -> Result<(), AgentError> {
    use std::os::unix::process::ExitStatusExt;
    if status.success() || status.signal().is_some() {
        return Ok(());
    }
    Err(AgentError::Wait {
        source: std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("child exited with {status:?}"),
        ),
    })
}

#[cfg(not(unix))]
fn filter_signal_exit(status: ExitStatus) -> Result<(), AgentError> {
    if status.success() {
        return Ok(());
    }
    Err(AgentError::Wait {
        source: std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("child exited with {status:?}"),
        ),
    })
}
