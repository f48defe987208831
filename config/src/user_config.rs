use directories::ProjectDirs;
use std::{
    env,
    path::{
        Path,
        PathBuf,
    },
};

/// Replaces the platform config directory when set.
pub const CONFIG_DIR_ENV: &str = "NETBENCH_CONFIG";
pub const USER_CONFIG_FILE: &str = "config.yaml";

lazy_static::lazy_static! {
    static ref CONFIG_DIR: PathBuf = env::var_os(CONFIG_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            ProjectDirs::from("net", "netbench", "netbench").map(|dirs| dirs.config_local_dir().to_path_buf())
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
}

/// Directory of the user's defaults, resolved once per process.
pub fn config_dir() -> &'static Path {
    &CONFIG_DIR
}

/// User-wide defaults layered between the built-in ones and the run file.
/// The file is optional.
pub fn user_config_file() -> PathBuf {
    config_dir().join(USER_CONFIG_FILE)
}
