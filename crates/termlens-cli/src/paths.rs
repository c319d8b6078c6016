//! Settings file location.
//!
//! Priority:
//! 1. `--config PATH` on the command line
//! 2. `TERMLENS_CONFIG` (explicit override)
//! 3. `XDG_CONFIG_HOME/termlens/config.json`
//! 4. `<platform config dir>/termlens/config.json`
//! 5. `~/.termlens/config.json`
//!
//! Empty environment values are ignored. A missing file just means
//! defaults, so none of these paths has to exist.

use std::env;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "termlens";
const CONFIG_FILE: &str = "config.json";

/// Resolve the settings file path.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(path) = non_empty_var("TERMLENS_CONFIG") {
        return PathBuf::from(path);
    }

    if let Some(dir) = non_empty_var("XDG_CONFIG_HOME") {
        return PathBuf::from(dir).join(APP_DIR).join(CONFIG_FILE);
    }

    if let Some(dir) = dirs::config_dir() {
        return dir.join(APP_DIR).join(CONFIG_FILE);
    }

    dirs::home_dir()
        .unwrap_or_else(env::temp_dir)
        .join(format!(".{}", APP_DIR))
        .join(CONFIG_FILE)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::config_path;

    // Env var manipulation is process-wide, so these tests run serially.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
        _lock: std::sync::MutexGuard<'static, ()>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), std::env::var(name).ok()))
                .collect();
            Self { vars, _lock: lock }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                // SAFETY: We hold ENV_MUTEX, so no other test thread is modifying env vars
                unsafe {
                    match value {
                        Some(v) => std::env::set_var(name, v),
                        None => std::env::remove_var(name),
                    }
                }
            }
        }
    }

    #[test]
    fn test_explicit_path_wins() {
        let _guard = EnvGuard::new(&["TERMLENS_CONFIG"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe { std::env::set_var("TERMLENS_CONFIG", "/env/config.json") };

        assert_eq!(
            config_path(Some(Path::new("/cli/config.json"))),
            PathBuf::from("/cli/config.json")
        );
    }

    #[test]
    fn test_env_override() {
        let _guard = EnvGuard::new(&["TERMLENS_CONFIG", "XDG_CONFIG_HOME"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe {
            std::env::set_var("TERMLENS_CONFIG", "/custom/termlens.json");
            std::env::set_var("XDG_CONFIG_HOME", "/xdg");
        }

        assert_eq!(config_path(None), PathBuf::from("/custom/termlens.json"));
    }

    #[test]
    fn test_xdg_config_home() {
        let _guard = EnvGuard::new(&["TERMLENS_CONFIG", "XDG_CONFIG_HOME"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe {
            std::env::remove_var("TERMLENS_CONFIG");
            std::env::set_var("XDG_CONFIG_HOME", "/home/u/.config");
        }

        assert_eq!(
            config_path(None),
            PathBuf::from("/home/u/.config/termlens/config.json")
        );
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let _guard = EnvGuard::new(&["TERMLENS_CONFIG", "XDG_CONFIG_HOME"]);
        // SAFETY: We hold ENV_MUTEX via _guard
        unsafe {
            std::env::set_var("TERMLENS_CONFIG", "");
            std::env::set_var("XDG_CONFIG_HOME", "");
        }

        let path = config_path(None);
        assert!(path.ends_with("termlens/config.json") || path.ends_with(".termlens/config.json"));
        assert_ne!(path, PathBuf::from(""));
    }
}
