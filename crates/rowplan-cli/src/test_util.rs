//! Helpers shared by unit tests that touch process environment.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialize tests that read or write environment variables.
pub fn lock_env() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Restores `XDG_CONFIG_HOME` on drop, so a failed assertion cannot leak it.
struct RestoreXdg(Option<String>);

impl Drop for RestoreXdg {
    fn drop(&mut self) {
        match self.0.take() {
            Some(value) => unsafe { std::env::set_var("XDG_CONFIG_HOME", value) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
    }
}

/// Run `f` with `XDG_CONFIG_HOME` pointing at `dir`. Hold [`lock_env`].
pub fn with_config_home<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
    let _restore = RestoreXdg(std::env::var("XDG_CONFIG_HOME").ok());
    unsafe { std::env::set_var("XDG_CONFIG_HOME", dir) };
    f()
}
