use crate::{config::FolioConfig, paths::TokenfolioPaths};
use eyre::Context as _;
use std::{
    fs::{self, OpenOptions},
    io::Write as _,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

fn is_truthy_env(v: &str) -> bool {
    matches!(v, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

fn split_urls(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Apply environment overrides (endpoints, keys, cache backend). Never persisted.
///
/// `lookup` abstracts `std::env::var` so overrides can be exercised without touching the
/// process environment.
fn apply_env_overrides(cfg: &mut FolioConfig, lookup: &dyn Fn(&str) -> Option<String>) {
    /// Helper: if a var is set and non-empty, apply `setter` with the trimmed value.
    fn apply_env(
        lookup: &dyn Fn(&str) -> Option<String>,
        var: &str,
        setter: impl FnOnce(&str),
    ) {
        if let Some(u) = lookup(var) {
            let t = u.trim();
            if !t.is_empty() {
                setter(t);
            }
        }
    }

    // TOKENFOLIO_REDIS_URL wins over the conventional REDIS_URL.
    apply_env(lookup, "REDIS_URL", |v| {
        cfg.cache.redis_url = Some(v.to_owned());
    });
    apply_env(lookup, "TOKENFOLIO_REDIS_URL", |v| {
        cfg.cache.redis_url = Some(v.to_owned());
    });
    apply_env(lookup, "TOKENFOLIO_DEXSCREENER_BASE_URL", |v| {
        v.clone_into(&mut cfg.http.dexscreener_base_url);
    });
    apply_env(lookup, "TOKENFOLIO_JUPITER_BASE_URL", |v| {
        v.clone_into(&mut cfg.http.jupiter_price_url);
    });
    apply_env(lookup, "TOKENFOLIO_JUPITER_API_KEY", |v| {
        cfg.http.jupiter_api_key = Some(v.to_owned());
    });
    apply_env(lookup, "TOKENFOLIO_BINANCE_BASE_URL", |v| {
        v.clone_into(&mut cfg.http.binance_base_url);
    });
    apply_env(lookup, "TOKENFOLIO_STORE", |v| {
        cfg.store.enabled = is_truthy_env(v);
    });

    for (name, profile) in &mut cfg.chains {
        let var = format!(
            "TOKENFOLIO_{}_RPC_URLS",
            name.to_uppercase().replace('-', "_")
        );
        apply_env(lookup, &var, |v| {
            let urls = split_urls(v);
            if !urls.is_empty() {
                profile.rpc_urls = urls;
            }
        });
    }
}

fn write_string_atomic(path: &Path, s: &str) -> eyre::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| eyre::eyre!("missing parent for {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;

    let base = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let tmp = parent.join(format!(".{base}.tmp.{:016x}", rand::random::<u64>()));

    let mut f = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp)
        .with_context(|| format!("open temp {}", tmp.display()))?;
    f.write_all(s.as_bytes())
        .with_context(|| format!("write {}", tmp.display()))?;
    f.sync_all()
        .with_context(|| format!("fsync {}", tmp.display()))?;
    drop(f);

    // `rename` is atomic on Unix. On Windows, this can fail if the destination exists.
    #[cfg(windows)]
    {
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("remove existing {}", path.display()))?;
        }
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))
}

impl ConfigStore {
    pub fn new(paths: &TokenfolioPaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init_default(&self) -> eyre::Result<FolioConfig> {
        self.load_with_env(&|k| std::env::var(k).ok())
    }

    fn load_with_env(&self, lookup: &dyn Fn(&str) -> Option<String>) -> eyre::Result<FolioConfig> {
        let mut cfg = if self.path.exists() {
            let s = fs::read_to_string(&self.path).context("read config.toml")?;
            let mut cfg: FolioConfig = toml::from_str(&s).context("parse config.toml")?;
            cfg.assign_chain_names()
                .with_context(|| format!("invalid config {}", self.path.display()))?;
            cfg
        } else {
            // Persist defaults before env overrides so secrets and test endpoints stay out of
            // the file.
            let cfg = FolioConfig::default();
            self.save(&cfg)?;
            cfg
        };
        apply_env_overrides(&mut cfg, lookup);
        cfg.validate()
            .with_context(|| format!("invalid config {}", self.path.display()))?;
        Ok(cfg)
    }

    pub fn save(&self, cfg: &FolioConfig) -> eyre::Result<()> {
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        write_string_atomic(&self.path, &s).context("write config.toml")?;
        Ok(())
    }
}
