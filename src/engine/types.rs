use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Ghostscript `PDFSETTINGS` levels, lowest fidelity first.
///
/// The derived ordering is the quality rank: it drives both the ladder order
/// and the tie-break between candidates that meet the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Screen,
    Ebook,
    Printer,
    Prepress,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 4] = [
        QualityPreset::Screen,
        QualityPreset::Ebook,
        QualityPreset::Printer,
        QualityPreset::Prepress,
    ];

    pub fn name(self) -> &'static str {
        match self {
            QualityPreset::Screen => "screen",
            QualityPreset::Ebook => "ebook",
            QualityPreset::Printer => "printer",
            QualityPreset::Prepress => "prepress",
        }
    }

    /// Value for `-dPDFSETTINGS=`.
    pub fn pdf_settings(self) -> &'static str {
        match self {
            QualityPreset::Screen => "/screen",
            QualityPreset::Ebook => "/ebook",
            QualityPreset::Printer => "/printer",
            QualityPreset::Prepress => "/prepress",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Document password. Formatting never reveals the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for an empty secret. Whitespace is a valid password.
    pub fn new(secret: impl Into<String>) -> Option<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            None
        } else {
            Some(Self(secret))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone)]
pub struct CompressRequest<'a> {
    pub input: PathBuf,
    pub output: PathBuf,
    pub preset: QualityPreset,
    pub credential: Option<&'a Credential>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    EngineFailure,
    Timeout,
}

/// Result of one engine invocation at one preset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionAttempt {
    pub preset: QualityPreset,
    pub outcome: Outcome,
    /// Output size in bytes; set by the selector once the artifact is verified.
    pub size: Option<u64>,
    pub diagnostic: String,
}

impl CompressionAttempt {
    pub fn success(preset: QualityPreset) -> Self {
        Self {
            preset,
            outcome: Outcome::Success,
            size: None,
            diagnostic: String::new(),
        }
    }

    pub fn failure(preset: QualityPreset, diagnostic: impl Into<String>) -> Self {
        Self {
            preset,
            outcome: Outcome::EngineFailure,
            size: None,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn timeout(preset: QualityPreset, diagnostic: impl Into<String>) -> Self {
        Self {
            preset,
            outcome: Outcome::Timeout,
            size: None,
            diagnostic: diagnostic.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiag {
    pub binary: String,
    pub version: Option<String>,
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_empty_string_is_rejected() {
        assert!(Credential::new("").is_none());
        assert_eq!(Credential::new(" ").unwrap().expose(), " ");
        assert_eq!(Credential::new(" pass ").unwrap().expose(), " pass ");
    }

    #[test]
    fn formatting_masks_the_secret() {
        let cred = Credential::new("hunter2").unwrap();
        assert!(!format!("{cred:?}").contains("hunter2"));
        assert!(!format!("{cred}").contains("hunter2"));
    }
}
