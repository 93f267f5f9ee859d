use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const DEFAULT_OWNER: i64 = 1;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// Base URL of a remote recipe service. `None` means recipes come from
    /// the local catalog.
    pub backend_url: Option<String>,
    pub owner_id: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "larder").context("Could not determine home directory")?;

        Self::in_dir(proj_dirs.data_dir())?.with_overrides(|key| std::env::var(key).ok())
    }

    /// Config rooted at `data_dir`, which is created if missing.
    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            db_path: data_dir.join("larder.db"),
            data_dir: data_dir.to_path_buf(),
            backend_url: None,
            owner_id: DEFAULT_OWNER,
        })
    }

    /// Apply `LARDER_DB`, `LARDER_BACKEND_URL` and `LARDER_OWNER` as looked
    /// up through `var`.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(db) = var("LARDER_DB").filter(|v| !v.trim().is_empty()) {
            self.db_path = PathBuf::from(db);
        }
        if let Some(url) = var("LARDER_BACKEND_URL") {
            let url = url.trim().trim_end_matches('/');
            if !url.is_empty() {
                self.backend_url = Some(url.to_string());
            }
        }
        if let Some(owner) = var("LARDER_OWNER") {
            self.owner_id = owner
                .trim()
                .parse()
                .with_context(|| format!("LARDER_OWNER must be an integer, got '{owner}'"))?;
        }
        Ok(self)
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}
