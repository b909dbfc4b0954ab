use crate::{
    config::Config,
    engine::{ghostscript::GhostscriptEngine, Credential, Engine},
    error::SqueezeError,
    progress::{BarProgress, NoProgress, Progress},
    report::{summary_lines, RunReport},
    selector::{RunResult, RunStatus, TargetSizeSelector},
    util::{default_output_path, ensure_dir, hash_file, mb_to_bytes, now_rfc3339},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

const DEFAULT_CONFIG: &str = "pdf-squeeze.toml";

#[derive(Parser, Debug)]
#[command(name = "pdf-squeeze")]
#[command(about = "Compress a PDF under a target size by walking Ghostscript quality presets")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./pdf-squeeze.toml if present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress INPUT to at most --size megabytes.
    Compress {
        input: PathBuf,

        /// Target size in megabytes (MiB).
        #[arg(short, long, allow_negative_numbers = true)]
        size: f64,

        /// Output path. Defaults to <stem>_compressed<.ext> next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Prompt for the document password before compressing.
        #[arg(long)]
        password: bool,

        /// Echo every Ghostscript command line, exit code and output stream.
        /// WARNING: this prints the password in clear text.
        #[arg(long)]
        debug: bool,
    },
    /// Check that Ghostscript can be found and run.
    Doctor {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = match load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _ = init_logging(&args, &Config::default());
            return Err(err);
        }
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg)?;
            doctor(&cfg)
        }
        Command::Compress {
            input,
            size,
            output,
            password,
            debug,
        } => {
            if *debug {
                cfg.debug.echo_commands = true;
            }
            let _guard = init_logging(&args, &cfg)?;
            compress(&cfg, input, *size, output.as_deref(), *password)
        }
    }
}

fn load_config(user: Option<&Path>) -> Result<Config> {
    if let Some(p) = user {
        return Config::load(p);
    }
    let default = PathBuf::from(DEFAULT_CONFIG);
    if default.exists() {
        Config::load(&default)
    } else {
        Ok(Config::default())
    }
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Echo must survive any base level, RUST_LOG included.
    if cfg.debug.echo_commands {
        filter = filter.add_directive("pdf_squeeze::echo=info".parse::<Directive>()?);
    }

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match resolve_log_path(cfg) {
        Some(path) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            ensure_dir(parent)?;
            let file = std::fs::File::create(&path)
                .with_context(|| format!("create log file: {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("pdf-squeeze.log"))
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = GhostscriptEngine::new(cfg)?;
    let diag = engine.doctor()?;
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        return Err(anyhow!(
            "ghostscript at {} is not usable: {}",
            diag.binary,
            diag.error.unwrap_or_default()
        ));
    }
    Ok(())
}

fn compress(
    cfg: &Config,
    input: &Path,
    size_mb: f64,
    output: Option<&Path>,
    ask_password: bool,
) -> Result<()> {
    let target_size =
        mb_to_bytes(size_mb).ok_or_else(|| SqueezeError::InvalidTarget(size_mb.to_string()))?;
    if !input.exists() {
        return Err(SqueezeError::InputMissing(input.to_path_buf()).into());
    }
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(input, &cfg.output.suffix));

    let engine = GhostscriptEngine::new(cfg)?;
    let mut credential = if ask_password {
        Some(prompt_credential()?)
    } else {
        None
    };
    let selector = TargetSizeSelector::new(cfg, &engine)?;

    info!(
        "input={} output={} target_bytes={target_size}",
        input.display(),
        output.display()
    );

    let started = now_rfc3339();
    let mut result = run_with_bar(&selector, input, &output, target_size, credential.as_ref())?;

    if result.status == RunStatus::Failed
        && result.access_control_suspected
        && credential.is_none()
        && cfg.security.prompt_on_encrypted
        && std::io::stdin().is_terminal()
    {
        warn!("input looks password-protected; asking for a password and retrying");
        credential = Some(prompt_credential()?);
        result = run_with_bar(&selector, input, &output, target_size, credential.as_ref())?;
    }

    if cfg.output.print_summary {
        for line in summary_lines(&result) {
            println!("{line}");
        }
        if result.reached_output() {
            println!("output: {}", output.display());
        }
    }

    if cfg.output.write_report_json {
        write_report(cfg, input, &output, size_mb, started, &result)?;
    }

    if result.status == RunStatus::Failed {
        return Err(SqueezeError::AllPresetsFailed {
            last_error: result.last_error.unwrap_or_default(),
            access_control_suspected: result.access_control_suspected,
        }
        .into());
    }
    Ok(())
}

fn run_with_bar<E: Engine>(
    selector: &TargetSizeSelector<E>,
    input: &Path,
    output: &Path,
    target_size: u64,
    credential: Option<&Credential>,
) -> Result<RunResult> {
    let mut progress: Box<dyn Progress> = if std::io::stderr().is_terminal() {
        Box::new(BarProgress::new(selector.ladder().len()))
    } else {
        Box::new(NoProgress)
    };
    selector.run_with_progress(input, output, target_size, credential, progress.as_mut())
}

fn write_report(
    cfg: &Config,
    input: &Path,
    output: &Path,
    size_mb: f64,
    started: String,
    result: &RunResult,
) -> Result<()> {
    let report = RunReport {
        input: input.display().to_string(),
        output: output.display().to_string(),
        started,
        finished: now_rfc3339(),
        target_mb: size_mb,
        input_sha256: hash_file(input).with_context(|| "hashing input")?,
        output_sha256: if result.reached_output() {
            Some(hash_file(output).with_context(|| "hashing output")?)
        } else {
            None
        },
        result: result.clone(),
    };
    let mut path = output.as_os_str().to_owned();
    path.push(&cfg.output.report_suffix);
    let path = PathBuf::from(path);
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)
        .with_context(|| format!("writing report: {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}

/// Prompts on the terminal with echo disabled. Piped stdin is read as a
/// single line.
fn prompt_credential() -> Result<Credential> {
    let secret = if std::io::stdin().is_terminal() {
        rpassword::prompt_password("Password: ").with_context(|| "reading password")?
    } else {
        rpassword::read_password_from_bufread(&mut std::io::stdin().lock())
            .with_context(|| "reading password")?
    };
    Credential::new(secret).ok_or_else(|| SqueezeError::EmptyCredential.into())
}
