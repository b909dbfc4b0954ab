use crate::{
    config::Config,
    engine::{CompressRequest, CompressionAttempt, Credential, Engine, QualityPreset},
    error::SqueezeError,
    policy::{self, Standing},
    progress::{NoProgress, Progress},
    util::ensure_dir,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    AlreadyUnderTarget,
    Met,
    PartialOnly,
    Failed,
}

/// Outcome of one run.
///
/// `Met` implies `final_size <= target_size`; `PartialOnly` implies
/// `final_size > target_size` with at least one successful attempt; `Failed`
/// implies no attempt succeeded and no output was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub original_size: u64,
    pub target_size: u64,
    pub final_size: Option<u64>,
    pub final_preset: Option<QualityPreset>,
    pub last_error: Option<String>,
    pub access_control_suspected: bool,
    pub attempts: Vec<CompressionAttempt>,
}

impl RunResult {
    /// True when the output file was written.
    pub fn reached_output(&self) -> bool {
        self.status != RunStatus::Failed
    }

    pub fn reduction_percent(&self) -> Option<f64> {
        let final_size = self.final_size?;
        if self.original_size == 0 {
            return None;
        }
        Some((self.original_size as f64 - final_size as f64) / self.original_size as f64 * 100.0)
    }
}

/// The retained artifact. Owned by the selector; its file lives in the run's
/// scratch dir and is deleted when superseded.
struct BestCandidate {
    path: PathBuf,
    standing: Standing,
}

pub struct TargetSizeSelector<E: Engine> {
    engine: E,
    ladder: Vec<QualityPreset>,
    work_dir: Option<PathBuf>,
}

impl<E: Engine> TargetSizeSelector<E> {
    pub fn new(cfg: &Config, engine: E) -> Result<Self> {
        cfg.ladder.validate()?;
        let work_dir = (!cfg.paths.work_dir.is_empty()).then(|| PathBuf::from(&cfg.paths.work_dir));
        Ok(Self {
            engine,
            ladder: cfg.ladder.presets.clone(),
            work_dir,
        })
    }

    pub fn ladder(&self) -> &[QualityPreset] {
        &self.ladder
    }

    pub fn run(
        &self,
        input: &Path,
        output: &Path,
        target_size: u64,
        credential: Option<&Credential>,
    ) -> Result<RunResult> {
        self.run_with_progress(input, output, target_size, credential, &mut NoProgress)
    }

    pub fn run_with_progress(
        &self,
        input: &Path,
        output: &Path,
        target_size: u64,
        credential: Option<&Credential>,
        progress: &mut dyn Progress,
    ) -> Result<RunResult> {
        validate_request(input, output, target_size)?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }

        let original_size = std::fs::metadata(input)
            .with_context(|| format!("stat input: {}", input.display()))?
            .len();

        if original_size <= target_size {
            std::fs::copy(input, output).with_context(|| {
                format!("copy {} -> {}", input.display(), output.display())
            })?;
            info!("input already under target ({original_size} <= {target_size}); copied verbatim");
            return Ok(RunResult {
                status: RunStatus::AlreadyUnderTarget,
                original_size,
                target_size,
                final_size: Some(original_size),
                final_preset: None,
                last_error: None,
                access_control_suspected: false,
                attempts: Vec::new(),
            });
        }

        let scratch = self.scratch_dir()?;
        debug!("scratch dir: {}", scratch.path().display());

        let total = self.ladder.len();
        let mut best: Option<BestCandidate> = None;
        let mut last_error: Option<String> = None;
        let mut attempts = Vec::with_capacity(total);

        for (i, &preset) in self.ladder.iter().enumerate() {
            progress.attempt_started(i + 1, total, preset);

            let artifact = scratch.path().join(format!("compressed_{preset}.pdf"));
            let mut attempt = self.engine.compress(&CompressRequest {
                input: input.to_path_buf(),
                output: artifact.clone(),
                preset,
                credential,
            });

            if attempt.succeeded() {
                match std::fs::metadata(&artifact) {
                    Ok(meta) if meta.is_file() => attempt.size = Some(meta.len()),
                    _ => {
                        attempt = CompressionAttempt::failure(
                            preset,
                            "engine reported success but produced no output file",
                        );
                    }
                }
            }
            match attempt.size {
                Some(size) if attempt.succeeded() => {
                    let verdict = policy::judge(
                        best.as_ref().map(|b| &b.standing),
                        preset,
                        size,
                        target_size,
                    );
                    info!("preset={preset} size={size} target={target_size} verdict={verdict:?}");
                    if verdict.replaces() {
                        if let Some(old) = best.take() {
                            remove_artifact(&old.path)?;
                        }
                        best = Some(BestCandidate {
                            path: artifact,
                            standing: Standing {
                                preset,
                                size,
                                met_target: size <= target_size,
                            },
                        });
                    } else {
                        remove_artifact(&artifact)?;
                    }
                }
                _ => {
                    warn!("preset={preset} {:?}: {}", attempt.outcome, attempt.diagnostic);
                    last_error = Some(attempt.diagnostic.clone());
                    remove_artifact(&artifact)?;
                }
            }

            progress.attempt_finished(&attempt);
            attempts.push(attempt);
        }
        progress.finish();

        let result = match best {
            Some(best) => {
                std::fs::copy(&best.path, output).with_context(|| {
                    format!("copy {} -> {}", best.path.display(), output.display())
                })?;
                RunResult {
                    status: if best.standing.met_target {
                        RunStatus::Met
                    } else {
                        RunStatus::PartialOnly
                    },
                    original_size,
                    target_size,
                    final_size: Some(best.standing.size),
                    final_preset: Some(best.standing.preset),
                    last_error,
                    access_control_suspected: false,
                    attempts,
                }
            }
            None => {
                let access_control_suspected = last_error
                    .as_deref()
                    .is_some_and(policy::suggests_access_control);
                RunResult {
                    status: RunStatus::Failed,
                    original_size,
                    target_size,
                    final_size: None,
                    final_preset: None,
                    last_error,
                    access_control_suspected,
                    attempts,
                }
            }
        };

        scratch
            .close()
            .with_context(|| "removing scratch dir")?;
        info!(
            "run finished status={:?} final_size={:?} preset={:?}",
            result.status, result.final_size, result.final_preset
        );
        Ok(result)
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf-squeeze-");
        match &self.work_dir {
            Some(dir) => {
                ensure_dir(dir)?;
                builder
                    .tempdir_in(dir)
                    .with_context(|| format!("create scratch dir in {}", dir.display()))
            }
            None => builder.tempdir().with_context(|| "create scratch dir"),
        }
    }
}

fn validate_request(input: &Path, output: &Path, target_size: u64) -> Result<()> {
    if target_size == 0 {
        return Err(SqueezeError::InvalidTarget("0 bytes".into()).into());
    }
    if !input.exists() {
        return Err(SqueezeError::InputMissing(input.to_path_buf()).into());
    }
    if !input.is_file() {
        return Err(SqueezeError::InputNotFile(input.to_path_buf()).into());
    }
    if output.exists() {
        let a = input
            .canonicalize()
            .with_context(|| format!("canonicalize {}", input.display()))?;
        let b = output
            .canonicalize()
            .with_context(|| format!("canonicalize {}", output.display()))?;
        if a == b {
            return Err(SqueezeError::OutputIsInput(output.to_path_buf()).into());
        }
    }
    Ok(())
}

fn remove_artifact(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove artifact {}", path.display())),
    }
}
