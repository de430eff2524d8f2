//! Process configuration
//!
//! The `commonParameters` bag every deployment mode shares, parsed from
//! flags (with `.env` already loaded by `main`). Folder defaults derive from
//! the platform data-local directory.

use std::path::PathBuf;

use clap::Args;

use crate::runtime::IoConfig;

const DEFAULT_MAX_UPLOAD: u64 = 1 << 30; // 1 GiB

/// Shared configuration flags.
#[derive(Args, Debug, Clone)]
pub struct CommonParameters {
    /// Folder completed inspection artifacts are written to
    #[arg(long)]
    pub data_destination_folder: Option<PathBuf>,

    /// Folder for temporary files
    #[arg(long)]
    pub temporary_folder: Option<PathBuf>,

    /// Listen host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Listen port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Folder uploaded files are stored in
    #[arg(long)]
    pub upload_file_folder: Option<PathBuf>,

    /// Verbose logging (info -> debug)
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Debug logging (everything, including dependencies)
    #[arg(long)]
    pub debug: bool,

    /// Maximum accepted upload size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD)]
    pub max_upload_file_size_bytes: u64,

    /// OAuth client id for log-backend access
    #[arg(long)]
    pub oauth_client_id: Option<String>,

    /// OAuth client secret for log-backend access
    #[arg(long)]
    pub oauth_client_secret: Option<String>,

    /// Pin every inspection to this project id
    #[arg(long)]
    pub fixed_project_id: Option<String>,

    /// Quota project for log-backend requests
    #[arg(long)]
    pub quota_project_id: Option<String>,

    /// Deprecated: raw access token instead of the OAuth flow
    #[arg(long, hide = true)]
    pub access_token: Option<String>,

    /// Serve the frontend without allowing new inspections
    #[arg(long)]
    pub viewer_mode: bool,

    /// Headless mode: run this inspection type once and exit
    #[arg(long)]
    pub job_inspection_type: Option<String>,

    /// Headless mode: comma-separated feature ids to enable
    #[arg(long)]
    pub job_feature_ids: Option<String>,
}

impl CommonParameters {
    fn default_dir(suffix: &str) -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("khronicle")
            .join(suffix)
    }

    pub fn io_config(&self) -> IoConfig {
        IoConfig {
            data_dir: self
                .data_destination_folder
                .clone()
                .unwrap_or_else(|| Self::default_dir("data")),
            temp_dir: self
                .temporary_folder
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            upload_dir: self
                .upload_file_folder
                .clone()
                .unwrap_or_else(|| Self::default_dir("upload")),
            app_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Default `RUST_LOG`-style filter when the env var is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "khronicle=debug,info"
        } else {
            "khronicle=info,warn"
        }
    }

    /// Feature ids for headless job mode.
    pub fn job_features(&self) -> Vec<String> {
        self.job_feature_ids
            .as_deref()
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Probe {
        #[command(flatten)]
        common: CommonParameters,
    }

    #[test]
    fn defaults_parse() {
        let probe = Probe::parse_from(["probe"]);
        assert_eq!(probe.common.host, "127.0.0.1");
        assert_eq!(probe.common.port, 8080);
        assert_eq!(probe.common.max_upload_file_size_bytes, DEFAULT_MAX_UPLOAD);
        assert!(!probe.common.viewer_mode);
    }

    #[test]
    fn job_features_split_and_trim() {
        let probe = Probe::parse_from(["probe", "--job-feature-ids", "a, b ,,c"]);
        assert_eq!(probe.common.job_features(), vec!["a", "b", "c"]);
    }

    #[test]
    fn log_filter_tracks_flags() {
        assert_eq!(Probe::parse_from(["p"]).common.log_filter(), "khronicle=info,warn");
        assert_eq!(
            Probe::parse_from(["p", "-v"]).common.log_filter(),
            "khronicle=debug,info"
        );
        assert_eq!(Probe::parse_from(["p", "--debug"]).common.log_filter(), "debug");
    }
}
