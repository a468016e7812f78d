use rip_remote::{Rip, RipBuilderError};
use serde::Deserialize;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::orchestrator::ArtifactPaths;

// Every field has a default, an empty `RipwebConfig()` is a valid file.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(rename = "RipwebConfig", default)]
pub struct Config {
    pub listen: SocketAddr,
    pub rip_program: PathBuf,
    pub rip_leading_args: Vec<String>,
    pub provider: String,
    /// Where the results files and the download log live.
    pub storage_dir: PathBuf,
    pub track_results_file: String,
    pub album_results_file: String,
    pub download_log_file: String,
    pub tool_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: SocketAddr::from(([127, 0, 0, 1], 5000)),
            rip_program: PathBuf::from("rip"),
            rip_leading_args: Vec::new(),
            provider: "qobuz".to_string(),
            storage_dir: PathBuf::from("."),
            track_results_file: "search_track.json".to_string(),
            album_results_file: "search_album.json".to_string(),
            download_log_file: "download_log.txt".to_string(),
            tool_timeout_secs: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading: {source}")]
    IO {
        #[from]
        source: io::Error,
    },
    #[error("error parsing: {source}")]
    Parse {
        #[from]
        source: ron::Error,
    },
}

impl Config {
    pub fn load(filename: &Path) -> Result<Config, ConfigError> {
        let file = File::open(filename)?;
        let config: Config = ron::de::from_reader(file)?;
        Ok(config)
    }

    pub fn rip(&self) -> Result<Rip, RipBuilderError> {
        Rip::builder()
            .program(self.rip_program.clone())
            .leading_args(self.rip_leading_args.clone())
            .provider(self.provider.clone())
            .timeout(self.tool_timeout_secs.map(Duration::from_secs))
            .build()
    }

    pub fn artifact_paths(&self, storage_dir: &Path) -> ArtifactPaths {
        ArtifactPaths {
            track_results: storage_dir.join(&self.track_results_file),
            album_results: storage_dir.join(&self.album_results_file),
            download_log: storage_dir.join(&self.download_log_file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_default() {
        let config: Config = ron::de::from_str("RipwebConfig()").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial() {
        let config: Config = ron::de::from_str(
            r#"RipwebConfig(
                listen: "0.0.0.0:8080",
                storage_dir: "/var/lib/ripweb",
                tool_timeout_secs: Some(600),
            )"#,
        )
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/ripweb"));
        assert_eq!(config.tool_timeout_secs, Some(600));
        assert_eq!(config.provider, "qobuz");

        let rip = config.rip().unwrap();
        assert_eq!(rip.timeout(), Some(Duration::from_secs(600)));

        let paths = config.artifact_paths(&config.storage_dir);
        assert_eq!(
            paths.album_results,
            PathBuf::from("/var/lib/ripweb/search_album.json")
        );
        assert_eq!(
            paths.download_log,
            PathBuf::from("/var/lib/ripweb/download_log.txt")
        );
    }

    #[test]
    fn example_file_is_the_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../ripweb.example.ron");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ron");
        assert!(matches!(Config::load(&missing), Err(ConfigError::IO { .. })));

        let broken = dir.path().join("broken.ron");
        std::fs::write(&broken, "RipwebConfig(listen: 5000)").unwrap();
        assert!(matches!(
            Config::load(&broken),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn bad_rip_settings() {
        let config = Config {
            provider: String::new(),
            ..Config::default()
        };
        assert!(config.rip().is_err());
    }
}
