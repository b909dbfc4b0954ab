use crate::{selector::RunResult, util::bytes_to_mb};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub input: String,
    pub output: String,
    pub started: String,
    pub finished: String,
    pub target_mb: f64,
    pub input_sha256: String,
    #[serde(default)]
    pub output_sha256: Option<String>,
    pub result: RunResult,
}

/// Human-readable summary lines for a finished run.
pub fn summary_lines(result: &RunResult) -> Vec<String> {
    use crate::selector::RunStatus::*;

    let mut lines = vec![
        format!("original size: {:.2} MB", bytes_to_mb(result.original_size)),
        format!("target size:   {:.2} MB", bytes_to_mb(result.target_size)),
    ];
    match result.status {
        AlreadyUnderTarget => lines.push("already under target; copied unchanged".into()),
        Met => lines.push("compressed under target".into()),
        PartialOnly => lines.push("target not reached; kept the smallest result".into()),
        Failed => {
            lines.push("compression failed at every preset".into());
            if let Some(err) = &result.last_error {
                lines.push(format!("last error: {err}"));
            }
            return lines;
        }
    }
    if let Some(size) = result.final_size {
        lines.push(format!("final size:    {:.2} MB", bytes_to_mb(size)));
    }
    if let Some(preset) = result.final_preset {
        lines.push(format!("preset:        {preset}"));
    }
    if let Some(pct) = result.reduction_percent() {
        lines.push(format!("reduction:     {pct:.1}%"));
    }
    lines
}
