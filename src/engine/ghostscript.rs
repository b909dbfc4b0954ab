use super::{types::*, Engine};
use crate::{config::Config, error::SqueezeError};
use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ECHO_TARGET: &str = "pdf_squeeze::echo";

pub struct GhostscriptEngine {
    binary: PathBuf,
    timeout: Duration,
    compatibility_level: String,
    extra_args: Vec<String>,
    echo: bool,
}

impl GhostscriptEngine {
    pub fn new(cfg: &Config) -> Result<Self> {
        let binary = resolve_binary(&cfg.engine)?;
        debug!("ghostscript binary: {}", binary.display());
        Ok(Self::with_binary(cfg, binary))
    }

    /// Skips PATH resolution; `binary` is used as given.
    pub fn with_binary(cfg: &Config, binary: PathBuf) -> Self {
        Self {
            binary,
            timeout: Duration::from_secs(cfg.engine.timeout_seconds),
            compatibility_level: cfg.engine.compatibility_level.clone(),
            extra_args: cfg.engine.extra_args.clone(),
            echo: cfg.debug.echo_commands,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command_line(&self, req: &CompressRequest<'_>) -> CommandLine {
        let mut args = self.extra_args.clone();
        args.extend([
            "-sDEVICE=pdfwrite".to_string(),
            format!("-dCompatibilityLevel={}", self.compatibility_level),
            format!("-dPDFSETTINGS={}", req.preset.pdf_settings()),
            "-dNOPAUSE".to_string(),
            "-dQUIET".to_string(),
            "-dBATCH".to_string(),
            format!("-sOutputFile={}", req.output.display()),
        ]);
        CommandLine {
            program: self.binary.clone(),
            args,
            secret: req
                .credential
                .map(|c| ("-sPDFPassword=", c.expose().to_string())),
            input: req.input.display().to_string(),
        }
    }

    fn echo_output(&self, output: &Output) {
        info!(target: ECHO_TARGET, "exit: {}", output.status);
        info!(
            target: ECHO_TARGET,
            "stdout: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        info!(
            target: ECHO_TARGET,
            "stderr: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
}

impl Engine for GhostscriptEngine {
    fn doctor(&self) -> Result<EngineDiag> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--version");
        isolate(&mut cmd);
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning {}", self.binary.display()))?;
        let waited = wait_with_timeout(&mut child, self.timeout)?;
        let binary = self.binary.display().to_string();
        if waited.timed_out || !waited.output.status.success() {
            return Ok(EngineDiag {
                binary,
                version: None,
                ok: false,
                error: Some(diagnostic_text(&waited.output)),
            });
        }
        let version = String::from_utf8_lossy(&waited.output.stdout)
            .trim()
            .to_string();
        Ok(EngineDiag {
            binary,
            version: Some(version),
            ok: true,
            error: None,
        })
    }

    fn compress(&self, req: &CompressRequest<'_>) -> CompressionAttempt {
        let line = self.command_line(req);
        debug!("ghostscript preset={} cmd={}", req.preset, line.render(false));
        if self.echo {
            info!(target: ECHO_TARGET, "$ {}", line.render(true));
        }

        let mut cmd = line.to_command();
        isolate(&mut cmd);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!("failed to launch {}: {err}", self.binary.display());
                return CompressionAttempt::failure(
                    req.preset,
                    format!("failed to launch {}: {err}", self.binary.display()),
                );
            }
        };

        let waited = match wait_with_timeout(&mut child, self.timeout) {
            Ok(w) => w,
            Err(err) => return CompressionAttempt::failure(req.preset, format!("{err:#}")),
        };

        if self.echo {
            self.echo_output(&waited.output);
        }

        if waited.timed_out {
            warn!(
                "ghostscript preset={} exceeded timeout ({:?})",
                req.preset, self.timeout
            );
            return CompressionAttempt::timeout(
                req.preset,
                format!(
                    "ghostscript timed out after {}s; {}",
                    self.timeout.as_secs(),
                    diagnostic_text(&waited.output)
                ),
            );
        }

        if !waited.output.status.success() {
            let diagnostic = diagnostic_text(&waited.output);
            warn!(
                "ghostscript preset={} failed ({}): {}",
                req.preset, waited.output.status, diagnostic
            );
            return CompressionAttempt::failure(req.preset, diagnostic);
        }

        debug!("ghostscript preset={} ok", req.preset);
        CompressionAttempt::success(req.preset)
    }
}

/// An engine invocation. The credential lives in its own slot so it can be
/// masked when rendered for logs.
struct CommandLine {
    program: PathBuf,
    args: Vec<String>,
    secret: Option<(&'static str, String)>,
    input: String,
}

impl CommandLine {
    fn argv(&self, reveal: bool) -> Vec<String> {
        let mut argv = self.args.clone();
        if let Some((flag, value)) = &self.secret {
            let shown = if reveal { value.as_str() } else { "***" };
            argv.push(format!("{flag}{shown}"));
        }
        argv.push(self.input.clone());
        argv
    }

    fn render(&self, reveal: bool) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.argv(reveal))
            .map(|a| shell_word(&a))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.argv(true));
        cmd
    }
}

fn shell_word(s: &str) -> String {
    if s.is_empty() || s.contains(char::is_whitespace) || s.contains('\'') {
        format!("'{}'", s.replace('\'', r"'\''"))
    } else {
        s.to_string()
    }
}

/// stderr, else stdout, else a generic message.
fn diagnostic_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_string();
    }
    format!("ghostscript failed without output ({})", output.status)
}

fn resolve_binary(cfg: &crate::config::Engine) -> Result<PathBuf> {
    let raw = cfg.binary.trim();
    let candidates: Vec<String> = if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        cfg.candidates.clone()
    } else {
        vec![raw.to_string()]
    };
    for candidate in &candidates {
        if let Some(found) = find_executable(&expand_tilde(candidate)) {
            return Ok(found);
        }
    }
    Err(SqueezeError::EngineNotFound {
        tried: candidates.join(", "),
    }
    .into())
}

fn find_executable(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let p = dir.join(candidate);
        if p.is_file() {
            return Some(p);
        }
        if cfg!(windows) {
            let exe = p.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
    }
    None
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

struct Waited {
    output: Output,
    timed_out: bool,
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Waited> {
    // Drain pipes while waiting so a chatty engine can't deadlock on a full
    // stdout/stderr buffer.
    let stdout_rx = spawn_reader(child.stdout.take(), "stdout");
    let stderr_rx = spawn_reader(child.stderr.take(), "stderr");

    let start = Instant::now();
    let (status, timed_out) = loop {
        if let Some(status) = child.try_wait().with_context(|| "try_wait")? {
            break (status, false);
        }
        if start.elapsed() > timeout {
            kill_group(child);
            let status = child.wait().with_context(|| "wait after kill")?;
            break (status, true);
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    // Descendants that outlive the engine may keep the pipes open; never wait
    // on them past the invocation budget.
    let grace = if timed_out {
        READER_GRACE
    } else {
        timeout.saturating_sub(start.elapsed()).max(READER_GRACE)
    };
    let deadline = Instant::now() + grace;
    let stdout = collect_reader(&stdout_rx, deadline, "stdout")?;
    let stderr = collect_reader(&stderr_rx, deadline, "stderr")?;
    Ok(Waited {
        output: Output {
            status,
            stdout,
            stderr,
        },
        timed_out,
    })
}

const READER_GRACE: Duration = Duration::from_millis(500);

fn spawn_reader<R: Read + Send + 'static>(
    reader: Option<R>,
    label: &'static str,
) -> mpsc::Receiver<Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let res = match reader {
            Some(mut r) => r
                .read_to_end(&mut buf)
                .map(|_| buf)
                .with_context(|| format!("read {label}")),
            None => Ok(buf),
        };
        let _ = tx.send(res);
    });
    rx
}

fn collect_reader(
    rx: &mpsc::Receiver<Result<Vec<u8>>>,
    deadline: Instant,
    label: &str,
) -> Result<Vec<u8>> {
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(res) => res,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!("{label} still held open after ghostscript exited; abandoning reader");
            Ok(Vec::new())
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(anyhow!("{label} reader thread panicked"))
        }
    }
}

/// Puts the engine in its own process group so a timeout can take down
/// wrapper scripts together with whatever they spawned.
fn isolate(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        // SAFETY: killpg takes plain integers; the group id is the child's pid
        // because it was spawned with process_group(0).
        unsafe {
            libc::killpg(child.id() as libc::pid_t, libc::SIGKILL);
        }
    }
    let _ = child.kill();
}
