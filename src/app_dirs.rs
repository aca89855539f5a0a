use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "flashread";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|pd| pd.config_dir().join("config.json"))
    }

    /// Where the TUI writes its log, since stdout belongs to the terminal UI.
    pub fn log_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME);
            Some(state_dir.join("flashread.log"))
        } else {
            ProjectDirs::from("", "", APP_NAME)
                .map(|proj_dirs| proj_dirs.data_local_dir().join("flashread.log"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_named_after_the_app() {
        if let Some(path) = AppDirs::log_path() {
            assert!(path.ends_with("flashread.log"));
        }
        if let Some(path) = AppDirs::config_path() {
            assert!(path.ends_with("config.json"));
        }
    }
}
