use crate::engine::QualityPreset;
use regex::Regex;
use std::sync::LazyLock;

static ACCESS_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)password|encrypted").expect("static regex"));

/// What the selector knows about the currently retained candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub preset: QualityPreset,
    pub size: u64,
    pub met_target: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Meets the target and beats the current candidate.
    Supersede,
    /// Misses the target but is the smallest result so far.
    Fallback,
    Keep,
}

impl Verdict {
    pub fn replaces(self) -> bool {
        !matches!(self, Verdict::Keep)
    }
}

/// Decide whether a successful attempt replaces the current best.
///
/// A target-meeting attempt wins over any non-meeting candidate and over a
/// meeting candidate of lower quality rank. A non-meeting attempt only wins
/// while nothing has met the target yet, and only by being strictly smaller.
/// Sizes need not shrink monotonically along the ladder.
pub fn judge(best: Option<&Standing>, preset: QualityPreset, size: u64, target: u64) -> Verdict {
    if size <= target {
        let wins = match best {
            None => true,
            Some(b) => !b.met_target || preset > b.preset,
        };
        return if wins { Verdict::Supersede } else { Verdict::Keep };
    }

    match best {
        None => Verdict::Fallback,
        Some(b) if !b.met_target && size < b.size => Verdict::Fallback,
        Some(_) => Verdict::Keep,
    }
}

/// Whether an engine diagnostic points at a password-protected input.
pub fn suggests_access_control(diagnostic: &str) -> bool {
    ACCESS_CONTROL.is_match(diagnostic)
}
