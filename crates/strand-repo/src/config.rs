use std::path::Path;

use serde::{Deserialize, Serialize};
use strand_collection::ShardConfig;

use crate::error::{RepoError, RepoResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub shard: ShardConfig,
    pub archive: ArchiveConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Largest block accepted when importing an archive.
    pub max_block_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_block_size: strand_archive::MAX_BLOCK_SIZE,
        }
    }
}

impl RepoConfig {
    pub fn from_toml_str(s: &str) -> RepoResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| RepoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string(self).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn validate(&self) -> RepoResult<()> {
        self.shard.validate().map_err(RepoError::Config)?;
        if self.archive.max_block_size == 0 {
            return Err(RepoError::Config("max_block_size must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = RepoConfig::default();
        assert_eq!(c.shard.capacities, [100, 400, 1600, 6400]);
        assert_eq!(c.archive.max_block_size, 4 * 1024 * 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_full_toml() {
        let c = RepoConfig::from_toml_str(
            r#"
            [shard]
            capacities = [2, 8, 32, 128]

            [archive]
            max_block_size = 1024
            "#,
        )
        .unwrap();
        assert_eq!(c.shard.capacities, [2, 8, 32, 128]);
        assert_eq!(c.archive.max_block_size, 1024);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let c = RepoConfig::from_toml_str("[archive]\nmax_block_size = 77\n").unwrap();
        assert_eq!(c.shard, ShardConfig::default());
        assert_eq!(c.archive.max_block_size, 77);
    }

    #[test]
    fn rejects_invalid_capacities() {
        let err = RepoConfig::from_toml_str("[shard]\ncapacities = [10, 20, 30, 40]\n").unwrap_err();
        assert!(matches!(err, RepoError::Config(_)));
    }

    #[test]
    fn toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.toml");
        let config = RepoConfig::default();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(RepoConfig::load(&path).unwrap(), config);
    }
}
