use std::path::PathBuf;
use thiserror::Error;

/// Name of the per-user directory under `~/Library/Application Support`.
pub const APP_NAME: &str = "ZeroNet";

#[derive(Debug)]
pub struct BootConfig {
    pub home_dir: PathBuf,              // $HOME
    pub support_dir: PathBuf,           // ~/Library/Application Support/ZeroNet
    pub work_dir_override: Option<PathBuf>, // ZERONET_WORK_DIR
    pub python: Option<PathBuf>,        // ZERONET_PYTHON
    pub force_single_role: bool,        // ZERONET_NO_GUI=1
    pub log_filter: String,             // ZERONET_LOG (tracing directive)
    /// Set by the login session; absent when started by auto-run.
    pub interactive_session: bool,      // SECURITYSESSIONID
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHomeDir,
}

pub fn boot_config() -> Result<BootConfig, ConfigError> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    let support_dir = home_dir
        .join("Library")
        .join("Application Support")
        .join(APP_NAME);

    let work_dir_override = std::env::var_os("ZERONET_WORK_DIR")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let python = std::env::var_os("ZERONET_PYTHON")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);

    let force_single_role = std::env::var("ZERONET_NO_GUI")
        .map(|v| v == "1")
        .unwrap_or(false);

    let log_filter = std::env::var("ZERONET_LOG").unwrap_or_else(|_| "info".to_string());

    let interactive_session = std::env::var_os("SECURITYSESSIONID").is_some_and(|v| !v.is_empty());

    Ok(BootConfig {
        home_dir,
        support_dir,
        work_dir_override,
        python,
        force_single_role,
        log_filter,
        interactive_session,
    })
}
