use crate::{engine::QualityPreset, error::SqueezeError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub ladder: Ladder,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.ladder.validate()?;
        if self.engine.timeout_seconds == 0 {
            anyhow::bail!("engine.timeout_seconds must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    /// "auto" searches `candidates` on PATH.
    pub binary: String,
    pub candidates: Vec<String>,
    pub timeout_seconds: u64,
    pub compatibility_level: String,
    pub extra_args: Vec<String>,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            binary: "auto".into(),
            candidates: vec![
                "gs".into(),
                "gswin64c".into(),
                "gswin32c".into(),
                "ghostscript".into(),
                "/usr/local/bin/gs".into(),
            ],
            timeout_seconds: 60,
            compatibility_level: "1.4".into(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ladder {
    pub presets: Vec<QualityPreset>,
}
impl Default for Ladder {
    fn default() -> Self {
        Self {
            presets: QualityPreset::ALL.to_vec(),
        }
    }
}

impl Ladder {
    /// The ladder must be non-empty and strictly ascending in quality.
    pub fn validate(&self) -> Result<(), SqueezeError> {
        if self.presets.is_empty() {
            return Err(SqueezeError::InvalidLadder("no presets configured".into()));
        }
        if let Some(w) = self.presets.windows(2).find(|w| w[0] >= w[1]) {
            return Err(SqueezeError::InvalidLadder(format!(
                "presets must be strictly ascending in quality, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Parent for per-run temp dirs. Empty uses the system temp dir.
    pub work_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub suffix: String,
    pub write_report_json: bool,
    pub report_suffix: String,
    pub print_summary: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            suffix: "_compressed".into(),
            write_report_json: false,
            report_suffix: ".report.json".into(),
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    /// Echo full engine command lines and output streams, credential included.
    pub echo_commands: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub prompt_on_encrypted: bool,
}
