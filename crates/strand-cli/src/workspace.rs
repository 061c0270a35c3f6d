//! On-disk layout of a repository directory.
//!
//! ```text
//! <dir>/strand.key    hex-encoded signing key
//! <dir>/repo.star     full-history archive of the head
//! <dir>/strand.toml   optional config
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use strand_crypto::{Signer, SigningKey};
use strand_repo::{Identity, Repo, RepoConfig};
use strand_store::Blockstore;
use tracing::debug;

const KEY_FILE: &str = "strand.key";
const ARCHIVE_FILE: &str = "repo.star";
const CONFIG_FILE: &str = "strand.toml";

pub struct Workspace {
    dir: PathBuf,
    config: RepoConfig,
}

impl Workspace {
    /// Resolve config from `config_path`, else `<dir>/strand.toml`, else defaults.
    pub fn new(dir: &Path, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let default_path = dir.join(CONFIG_FILE);
        let config = match config_path {
            Some(path) => RepoConfig::load(path)?,
            None if default_path.exists() => RepoConfig::load(&default_path)?,
            None => RepoConfig::default(),
        };
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    fn archive_path(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    pub fn exists(&self) -> bool {
        self.archive_path().exists()
    }

    /// Create the directory, a signing key and a genesis commit.
    pub async fn init(&self, did: Option<Identity>) -> anyhow::Result<Repo> {
        if self.exists() {
            bail!("repository already exists in {}", self.dir.display());
        }
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let key = SigningKey::generate();
        let did = did.unwrap_or_else(|| key.identity());
        write_atomic(&self.key_path(), key.to_hex().as_bytes())?;

        let store = Blockstore::memory();
        let repo = Repo::create(&store, did, Arc::new(key), self.config.clone()).await?;
        self.save(&repo).await?;
        Ok(repo)
    }

    /// Load the repository with its signing key.
    pub async fn open(&self) -> anyhow::Result<Repo> {
        if !self.exists() {
            bail!(
                "no repository in {} (run `strand init` first)",
                self.dir.display()
            );
        }
        let key_hex = std::fs::read_to_string(self.key_path())
            .with_context(|| format!("reading {}", self.key_path().display()))?;
        let key = SigningKey::from_hex(key_hex.trim()).context("parsing signing key")?;
        let bytes = std::fs::read(self.archive_path())
            .with_context(|| format!("reading {}", self.archive_path().display()))?;

        let store = Blockstore::memory();
        let signer: Arc<dyn Signer> = Arc::new(key);
        let repo = Repo::from_archive(&store, &bytes, Some(signer), self.config.clone()).await?;
        debug!(dir = %self.dir.display(), commit = %repo.cid().short_hex(), "opened workspace");
        Ok(repo)
    }

    /// Persist the full history of `repo`.
    pub async fn save(&self, repo: &Repo) -> anyhow::Result<()> {
        let bytes = repo.export_full_history().await?;
        write_atomic(&self.archive_path(), &bytes)?;
        debug!(bytes = bytes.len(), commit = %repo.cid().short_hex(), "saved workspace");
        Ok(())
    }
}

/// Replace `path` with `data` via a temp file in the same directory.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.write_all(data)?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
