use std::sync::Mutex;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Serialized process-environment mutation. `std::env::set_var` is unsound
/// when another thread reads the environment concurrently, so every write
/// goes through one lock.
pub struct EnvAdapter;

impl EnvAdapter {
    pub fn set_var(key: &str, value: &str) {
        let _guard = ENV_LOCK.lock().expect("env adapter mutex poisoned");
        unsafe {
            std::env::set_var(key, value);
        }
    }

    pub fn remove_var(key: &str) {
        let _guard = ENV_LOCK.lock().expect("env adapter mutex poisoned");
        unsafe {
            std::env::remove_var(key);
        }
    }
}

/// Restores the previous value of an environment variable on drop. Used by
/// tests that point WERKBANK_* overrides at temporary directories.
pub struct ScopedEnv {
    key: String,
    previous: Option<String>,
}

impl ScopedEnv {
    pub fn set(key: &str, value: &str) -> Self {
        let previous = std::env::var(key).ok();
        EnvAdapter::set_var(key, value);
        Self {
            key: key.to_string(),
            previous,
        }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => EnvAdapter::set_var(&self.key, &value),
            None => EnvAdapter::remove_var(&self.key),
        }
    }
}
