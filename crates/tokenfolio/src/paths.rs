use directories::ProjectDirs;
use eyre::{Context as _, ContextCompat as _};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct TokenfolioPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl TokenfolioPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        if let (Ok(data_dir), Ok(config_dir)) = (
            std::env::var("TOKENFOLIO_DATA_DIR"),
            std::env::var("TOKENFOLIO_CONFIG_DIR"),
        ) {
            return Ok(Self::from_dirs(
                PathBuf::from(config_dir),
                PathBuf::from(data_dir),
            ));
        }

        // Default locations:
        // macOS: ~/Library/Application Support/tokenfolio
        // Linux: ~/.config/tokenfolio (config) and ~/.local/share/tokenfolio (data)
        // Windows: %APPDATA%\\tokenfolio
        let proj =
            ProjectDirs::from("", "", "tokenfolio").context("failed to resolve project dirs")?;
        Ok(Self::from_dirs(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    pub fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join("tokenfolio.log.jsonl");
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn db_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn ensure_dirs(&self) -> eyre::Result<()> {
        ensure_dir(&self.config_dir)?;
        ensure_dir(&self.data_dir)?;
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> eyre::Result<()> {
    if dir.exists() {
        let md = std::fs::metadata(dir).with_context(|| format!("stat {}", dir.display()))?;
        if !md.is_dir() {
            eyre::bail!("expected directory at {}", dir.display());
        }
        return Ok(());
    }
    std::fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))
}
