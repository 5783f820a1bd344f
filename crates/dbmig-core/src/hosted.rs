//! Engines running in a separate host process.
//!
//! The host is started with piped stdio and spoken to with the
//! [`dbmig_proto`] line protocol. Its stderr is forwarded to tracing under the
//! `dbmig::host` target.

use crate::engine::{Connection, ConnectionProperties, Driver, Engine};
use crate::error::EngineError;
use dbmig_proto::{accept_hello, read_message, write_message, Request, Response};
use parking_lot::Mutex;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

const SPAWN_ATTEMPTS: u32 = 5;

#[cfg(unix)]
const ETXTBSY: i32 = 26;

/// How to start an engine host.
#[derive(Debug, Clone)]
pub struct HostCommand {
    /// Program to run.
    pub program: PathBuf,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory. Inherited if unset.
    pub working_dir: Option<PathBuf>,
    /// Start from an empty environment, keeping only `PATH`.
    pub clear_env: bool,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl HostCommand {
    /// Create a command for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            clear_env: false,
            env: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Start the host from an empty environment.
    pub fn with_clean_env(mut self) -> Self {
        self.clear_env = true;
        self
    }

    /// Set an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        if self.clear_env {
            command.env_clear();
            if let Some(path) = std::env::var_os("PATH") {
                command.env("PATH", path);
            }
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

// A launcher written moments ago can still be open for writing in a child
// forked concurrently by another thread.
fn spawn_child(command: &HostCommand) -> std::io::Result<Child> {
    let mut attempt = 1;
    loop {
        match command.command().spawn() {
            Err(e) if is_text_busy(&e) && attempt < SPAWN_ATTEMPTS => {
                debug!(program = %command.program.display(), attempt, "launcher busy, retrying");
                attempt += 1;
                thread::sleep(EXIT_POLL_INTERVAL);
            }
            result => return result,
        }
    }
}

#[cfg(unix)]
fn is_text_busy(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(ETXTBSY)
}

#[cfg(not(unix))]
fn is_text_busy(_: &std::io::Error) -> bool {
    false
}

/// Request/response channel to a running host.
struct HostChannel {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    alive: bool,
}

impl HostChannel {
    /// Send a request and wait for its response, turning error responses
    /// into [`EngineError::Remote`].
    fn call(&mut self, request: &Request) -> Result<Response, EngineError> {
        if !self.alive {
            return Err(EngineError::HostExited("host is no longer running".to_string()));
        }
        if let Err(e) = write_message(&mut self.stdin, request) {
            self.alive = false;
            return Err(e.into());
        }
        match read_message::<_, Response>(&mut self.stdout) {
            Ok(Some(response)) => response.into_result().map_err(EngineError::remote),
            Ok(None) => {
                self.alive = false;
                Err(EngineError::HostExited(format!(
                    "host closed its output during `{}`",
                    request.op()
                )))
            }
            Err(e) => {
                self.alive = false;
                Err(e.into())
            }
        }
    }
}

/// An engine served by a child process.
pub struct HostedEngine {
    channel: Arc<Mutex<HostChannel>>,
    child: Child,
    program: PathBuf,
    build_id: u32,
    finished: bool,
}

impl HostedEngine {
    /// Start the host and perform the handshake.
    pub fn spawn(command: &HostCommand) -> Result<Self, EngineError> {
        let mut child = spawn_child(command)?;
        let program = command.program.clone();

        let (stdin, stdout, stderr) = match (
            child.stdin.take(),
            child.stdout.take(),
            child.stderr.take(),
        ) {
            (Some(stdin), Some(stdout), Some(stderr)) => (stdin, stdout, stderr),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::HostExited("host stdio unavailable".to_string()));
            }
        };

        let label = program.display().to_string();
        let mut engine = Self {
            channel: Arc::new(Mutex::new(HostChannel {
                stdin,
                stdout: BufReader::new(stdout),
                alive: true,
            })),
            child,
            program,
            build_id: 0,
            finished: false,
        };

        thread::Builder::new()
            .name("dbmig-host-stderr".to_string())
            .spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    debug!(target: "dbmig::host", program = %label, "{}", line);
                }
            })?;

        let response = engine.channel.lock().call(&Request::hello())?;
        let info = accept_hello(response)?;
        engine.build_id = info.build_id;

        debug!(
            program = %engine.program.display(),
            pid = engine.child.id(),
            build_id = info.build_id,
            "engine host started"
        );
        Ok(engine)
    }

    /// Process id of the host.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Ask the host to exit, killing it if it has not exited within
    /// `timeout`.
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), EngineError> {
        self.finish(timeout)
    }

    fn finish(&mut self, timeout: Duration) -> Result<(), EngineError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let requested = self.channel.lock().call(&Request::Shutdown);
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!(program = %self.program.display(), %status, "engine host exited");
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    program = %self.program.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "engine host did not exit, killing it"
                );
                self.child.kill()?;
                self.child.wait()?;
                break;
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }
        requested.map(|_| ())
    }
}

impl Drop for HostedEngine {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

impl Driver for HostedEngine {
    fn connect(
        &self,
        url: &str,
        properties: &ConnectionProperties,
    ) -> Result<Box<dyn Connection>, EngineError> {
        self.channel
            .lock()
            .call(&Request::connect(url, properties.to_map()))?;
        Ok(Box::new(HostedConnection {
            channel: Arc::clone(&self.channel),
            open: true,
        }))
    }
}

impl Engine for HostedEngine {
    fn build_id(&self) -> u32 {
        self.build_id
    }
}

/// A connection held open by an engine host.
pub struct HostedConnection {
    channel: Arc<Mutex<HostChannel>>,
    open: bool,
}

impl HostedConnection {
    /// Close the connection, reporting failures.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.open = false;
        self.channel.lock().call(&Request::Close).map(|_| ())
    }
}

impl Connection for HostedConnection {
    fn execute(&mut self, sql: &str) -> Result<u64, EngineError> {
        if !self.open {
            return Err(EngineError::NotConnected);
        }
        let response = self.channel.lock().call(&Request::execute(sql))?;
        Ok(response.update_count.unwrap_or(0))
    }
}

impl Drop for HostedConnection {
    fn drop(&mut self) {
        if self.open {
            let _ = self.channel.lock().call(&Request::Close);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // Answers hello with build 42, fails every execute, exits on shutdown.
    const SCRIPT: &str = r#"#!/bin/sh
while IFS= read -r line; do
  case "$line" in
    *'"op":"hello"'*) echo '{"status":"ok","build_id":42,"protocol_version":1}' ;;
    *'"op":"execute"'*) echo "execute rejected" >&2; echo '{"status":"error","message":"read only"}' ;;
    *'"op":"shutdown"'*) echo '{"status":"ok"}'; exit 0 ;;
    *) echo '{"status":"ok"}' ;;
  esac
done
"#;

    fn host_script(dir: &TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("host.sh");
        fs::write(&path, body).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_handshake_and_requests() {
        let dir = TempDir::new().unwrap();
        let command = HostCommand::new(host_script(&dir, SCRIPT)).with_clean_env();
        let engine = HostedEngine::spawn(&command).unwrap();
        assert_eq!(engine.build_id(), 42);

        let mut conn = engine
            .connect("jdbc:h2:/db", &ConnectionProperties::credentials("sa", ""))
            .unwrap();
        let err = conn.execute("DELETE FROM t").unwrap_err();
        assert!(matches!(err, EngineError::Remote { ref message } if message == "read only"));
        drop(conn);

        engine.shutdown(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_shutdown_kills_unresponsive_host() {
        let dir = TempDir::new().unwrap();
        let script = r#"#!/bin/sh
read -r line
echo '{"status":"ok","build_id":7}'
read -r line
echo '{"status":"ok"}'
sleep 30
"#;
        let engine = HostedEngine::spawn(&HostCommand::new(host_script(&dir, script))).unwrap();
        let started = Instant::now();
        engine.shutdown(Duration::from_millis(200)).unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_host_exiting_early() {
        let dir = TempDir::new().unwrap();
        let command = HostCommand::new(host_script(&dir, "#!/bin/sh\nexit 3\n"));
        assert!(HostedEngine::spawn(&command).is_err());
    }

    #[test]
    fn test_wrong_protocol_version() {
        let dir = TempDir::new().unwrap();
        let script = "#!/bin/sh\nread -r line\necho '{\"status\":\"ok\",\"build_id\":1,\"protocol_version\":9}'\n";
        let err = HostedEngine::spawn(&HostCommand::new(host_script(&dir, script)))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EngineError::Protocol(dbmig_proto::Error::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_program() {
        let command = HostCommand::new("/nonexistent/engine-host");
        assert!(matches!(
            HostedEngine::spawn(&command),
            Err(EngineError::Io(_))
        ));
    }
}
