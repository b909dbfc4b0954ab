use anyhow::Result;
use pdf_squeeze::engine::QualityPreset::*;
use pdf_squeeze::{
    config::Config,
    progress::Progress,
    engine::{CompressRequest, CompressionAttempt, Credential, Engine, EngineDiag, Outcome, QualityPreset},
    RunStatus, SqueezeError, TargetSizeSelector,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

const MB: u64 = 1024 * 1024;

#[derive(Clone)]
enum Behavior {
    Size(u64),
    Fail(&'static str),
    Timeout,
    NoFile,
}

#[derive(Default)]
struct Calls {
    presets: Vec<QualityPreset>,
    scratch_dirs: Vec<PathBuf>,
    max_files_seen: usize,
    max_files_after_write: usize,
    saw_credential: Vec<bool>,
}

struct ScriptedEngine {
    script: HashMap<QualityPreset, Behavior>,
    calls: RefCell<Calls>,
}

impl ScriptedEngine {
    fn new(script: &[(QualityPreset, Behavior)]) -> Self {
        Self {
            script: script.iter().cloned().collect(),
            calls: RefCell::new(Calls::default()),
        }
    }

    fn sizes(sizes: &[(QualityPreset, u64)]) -> Self {
        let script: Vec<_> = sizes.iter().map(|&(p, s)| (p, Behavior::Size(s))).collect();
        Self::new(&script)
    }
}

impl Engine for ScriptedEngine {
    fn doctor(&self) -> Result<EngineDiag> {
        Ok(EngineDiag {
            binary: "scripted".into(),
            version: None,
            ok: true,
            error: None,
        })
    }

    fn compress(&self, req: &CompressRequest<'_>) -> CompressionAttempt {
        let dir = req.output.parent().unwrap().to_path_buf();
        let files = std::fs::read_dir(&dir).unwrap().count();
        {
            let mut calls = self.calls.borrow_mut();
            calls.presets.push(req.preset);
            calls.max_files_seen = calls.max_files_seen.max(files);
            calls.saw_credential.push(req.credential.is_some());
            if !calls.scratch_dirs.contains(&dir) {
                calls.scratch_dirs.push(dir.clone());
            }
        }
        match self.script.get(&req.preset).cloned() {
            Some(Behavior::Size(n)) => {
                File::create(&req.output).unwrap().set_len(n).unwrap();
                let files = std::fs::read_dir(&dir).unwrap().count();
                let mut calls = self.calls.borrow_mut();
                calls.max_files_after_write = calls.max_files_after_write.max(files);
                CompressionAttempt::success(req.preset)
            }
            Some(Behavior::Fail(msg)) => CompressionAttempt::failure(req.preset, msg),
            Some(Behavior::Timeout) => {
                CompressionAttempt::timeout(req.preset, "ghostscript timed out after 60s")
            }
            Some(Behavior::NoFile) | None => CompressionAttempt::success(req.preset),
        }
    }
}

/// Counts scratch files once the selector has finished with each attempt.
struct RetainedCounter<'a> {
    engine: &'a ScriptedEngine,
    max_retained: usize,
    checks: usize,
}

impl Progress for RetainedCounter<'_> {
    fn attempt_started(&mut self, _: usize, _: usize, _: QualityPreset) {}

    fn attempt_finished(&mut self, _: &CompressionAttempt) {
        let calls = self.engine.calls.borrow();
        let dir = calls.scratch_dirs.last().unwrap();
        let files = std::fs::read_dir(dir).unwrap().count();
        self.max_retained = self.max_retained.max(files);
        self.checks += 1;
    }

    fn finish(&mut self) {}
}

struct Fixture {
    dir: tempfile::TempDir,
    cfg: Config,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.paths.work_dir = dir.path().join("work").display().to_string();
        Self { dir, cfg }
    }

    fn input(&self, len: u64) -> PathBuf {
        let p = self.dir.path().join("input.pdf");
        File::create(&p).unwrap().set_len(len).unwrap();
        p
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("out").join("input_compressed.pdf")
    }

    fn work_dir(&self) -> &Path {
        Path::new(&self.cfg.paths.work_dir)
    }

    fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir()).unwrap().next().is_none()
    }
}

fn sample_sizes() -> ScriptedEngine {
    ScriptedEngine::sizes(&[
        (Screen, 3 * MB),
        (Ebook, 6 * MB),
        (Printer, 4 * MB),
        (Prepress, 9 * MB),
    ])
}

#[test]
fn already_under_target_copies_verbatim() {
    let fx = Fixture::new();
    let input = fx.dir.path().join("small.pdf");
    std::fs::write(&input, b"%PDF-1.4 tiny").unwrap();
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::AlreadyUnderTarget);
    assert_eq!(std::fs::read(fx.output()).unwrap(), b"%PDF-1.4 tiny");
    assert!(engine.calls.borrow().presets.is_empty());
    assert!(result.attempts.is_empty());
}

#[test]
fn exactly_at_target_counts_as_under() {
    let fx = Fixture::new();
    let input = fx.input(5 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();
    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();
    assert_eq!(result.status, RunStatus::AlreadyUnderTarget);
    assert!(engine.calls.borrow().presets.is_empty());
}

#[test]
fn picks_highest_quality_preset_meeting_target() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::Met);
    assert_eq!(result.final_preset, Some(Printer));
    assert_eq!(result.final_size, Some(4 * MB));
    assert_eq!(std::fs::metadata(fx.output()).unwrap().len(), 4 * MB);
    assert_eq!(engine.calls.borrow().presets, QualityPreset::ALL.to_vec());
    let pct = result.reduction_percent().unwrap();
    assert!((pct - 66.666).abs() < 0.01);
}

#[test]
fn falls_back_to_smallest_when_nothing_meets_target() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 2 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::PartialOnly);
    assert_eq!(result.final_preset, Some(Screen));
    assert_eq!(result.final_size, Some(3 * MB));
    assert_eq!(std::fs::metadata(fx.output()).unwrap().len(), 3 * MB);
}

#[test]
fn fallback_tracks_minimum_with_non_monotonic_sizes() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::sizes(&[
        (Screen, 9 * MB),
        (Ebook, 3 * MB),
        (Printer, 4 * MB),
        (Prepress, 2 * MB),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), MB, None).unwrap();

    assert_eq!(result.status, RunStatus::PartialOnly);
    assert_eq!(result.final_preset, Some(Prepress));
    assert_eq!(result.final_size, Some(2 * MB));
}

#[test]
fn later_smaller_miss_never_replaces_a_met_candidate() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::sizes(&[
        (Screen, 6 * MB),
        (Ebook, 4 * MB),
        (Printer, 11 * MB),
        (Prepress, 5 * MB + 1),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::Met);
    assert_eq!(result.final_preset, Some(Ebook));
}

#[test]
fn equal_sizes_meeting_target_prefer_later_preset() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::sizes(&[
        (Screen, 2 * MB),
        (Ebook, 4 * MB),
        (Printer, 4 * MB),
        (Prepress, 8 * MB),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.final_preset, Some(Printer));
}

#[test]
fn encrypted_failures_flag_access_control() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::new(&[
        (Screen, Behavior::Fail("Error: file is encrypted")),
        (Ebook, Behavior::Fail("Error: file is encrypted")),
        (Printer, Behavior::Fail("Error: file is encrypted")),
        (Prepress, Behavior::Fail("This file requires a password for access.")),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.access_control_suspected);
    assert_eq!(
        result.last_error.as_deref(),
        Some("This file requires a password for access.")
    );
    assert!(!fx.output().exists());
    assert!(result.attempts.iter().all(|a| a.outcome == Outcome::EngineFailure));
}

#[test]
fn unrelated_failures_do_not_flag_access_control() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::new(&[
        (Screen, Behavior::Fail("Error: /syntaxerror")),
        (Ebook, Behavior::Timeout),
        (Printer, Behavior::NoFile),
        (Prepress, Behavior::Fail("Error: /undefined")),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(!result.access_control_suspected);
    assert_eq!(result.last_error.as_deref(), Some("Error: /undefined"));
    assert_eq!(result.attempts[1].outcome, Outcome::Timeout);
    assert_eq!(result.attempts[2].outcome, Outcome::EngineFailure);
}

#[test]
fn failures_are_skipped_and_last_error_kept() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::new(&[
        (Screen, Behavior::Size(3 * MB)),
        (Ebook, Behavior::Timeout),
        (Printer, Behavior::Fail("Error: /rangecheck")),
        (Prepress, Behavior::Size(9 * MB)),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();

    assert_eq!(result.status, RunStatus::Met);
    assert_eq!(result.final_preset, Some(Screen));
    assert_eq!(result.last_error.as_deref(), Some("Error: /rangecheck"));
    assert_eq!(result.attempts.len(), 4);
}

#[test]
fn at_most_one_artifact_is_retained() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::sizes(&[
        (Screen, 3 * MB),
        (Ebook, 4 * MB),
        (Printer, 2 * MB),
        (Prepress, 5 * MB),
    ]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let mut counter = RetainedCounter {
        engine: &engine,
        max_retained: 0,
        checks: 0,
    };

    selector
        .run_with_progress(&input, &fx.output(), 5 * MB, None, &mut counter)
        .unwrap();

    assert_eq!(counter.checks, 4);
    assert_eq!(counter.max_retained, 1);
    let calls = engine.calls.borrow();
    assert!(calls.max_files_seen <= 1);
    // The fresh artifact sits next to the retained one until it is judged.
    assert_eq!(calls.max_files_after_write, 2);
}

#[test]
fn scratch_dir_is_removed_for_every_status() {
    for (target, expected) in [
        (5 * MB, RunStatus::Met),
        (2 * MB, RunStatus::PartialOnly),
    ] {
        let fx = Fixture::new();
        let input = fx.input(12 * MB);
        let engine = sample_sizes();
        let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();
        let result = selector.run(&input, &fx.output(), target, None).unwrap();
        assert_eq!(result.status, expected);
        assert!(fx.work_dir_is_empty());
        for dir in &engine.calls.borrow().scratch_dirs {
            assert!(!dir.exists());
        }
    }

    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = ScriptedEngine::new(&[(Screen, Behavior::Fail("boom"))]);
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();
    let result = selector.run(&input, &fx.output(), 5 * MB, None).unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert!(fx.work_dir_is_empty());
}

#[test]
fn repeated_runs_are_identical() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let first_out = fx.dir.path().join("first.pdf");
    let second_out = fx.dir.path().join("second.pdf");
    let first = selector.run(&input, &first_out, 5 * MB, None).unwrap();
    let second = selector.run(&input, &second_out, 5 * MB, None).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        std::fs::read(&first_out).unwrap(),
        std::fs::read(&second_out).unwrap()
    );
}

#[test]
fn configured_ladder_subset_is_respected() {
    let mut fx = Fixture::new();
    fx.cfg.ladder.presets = vec![Ebook, Prepress];
    let input = fx.input(12 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let result = selector.run(&input, &fx.output(), 7 * MB, None).unwrap();

    assert_eq!(engine.calls.borrow().presets, vec![Ebook, Prepress]);
    assert_eq!(result.final_preset, Some(Ebook));
}

#[test]
fn credential_reaches_every_attempt() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();
    let cred = Credential::new("s3cret").unwrap();

    selector.run(&input, &fx.output(), 5 * MB, Some(&cred)).unwrap();

    assert_eq!(engine.calls.borrow().saw_credential, vec![true; 4]);
    assert!(!format!("{cred:?}").contains("s3cret"));
}

#[test]
fn rejects_bad_requests_before_any_attempt() {
    let fx = Fixture::new();
    let input = fx.input(12 * MB);
    let engine = sample_sizes();
    let selector = TargetSizeSelector::new(&fx.cfg, &engine).unwrap();

    let err = selector.run(&input, &fx.output(), 0, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SqueezeError>(),
        Some(SqueezeError::InvalidTarget(_))
    ));

    let missing = fx.dir.path().join("missing.pdf");
    let err = selector.run(&missing, &fx.output(), MB, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SqueezeError>(),
        Some(SqueezeError::InputMissing(_))
    ));

    let err = selector.run(&input, &input, MB, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SqueezeError>(),
        Some(SqueezeError::OutputIsInput(_))
    ));

    assert!(engine.calls.borrow().presets.is_empty());
    assert_eq!(std::fs::metadata(&input).unwrap().len(), 12 * MB);
}
