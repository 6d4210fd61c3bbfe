//! Environment variable abstraction and native implementation.
//!
//! Provides a platform-agnostic [`Environment`] trait for reading and writing
//! environment variables. The native implementation delegates to [`std::env`].
//! A WASM implementation could use a config map or browser-based storage.

/// Platform-agnostic environment variable access.
///
/// Implementations provide read/write access to environment-style key-value
/// configuration. The native implementation maps directly to OS environment
/// variables; alternative implementations can use in-memory maps for testing
/// or WASM compatibility.
pub trait Environment: Send + Sync {
    /// Get the value of an environment variable, or `None` if it is not set.
    fn get_var(&self, name: &str) -> Option<String>;

    /// Set an environment variable.
    fn set_var(&self, name: &str, value: &str);

    /// Remove (unset) an environment variable.
    fn remove_var(&self, name: &str);
}

/// Native environment implementation using [`std::env`].
pub struct NativeEnvironment;

impl Environment for NativeEnvironment {
    fn get_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn set_var(&self, name: &str, value: &str) {
        // SAFETY: This is the standard library function. We accept the caveats
        // around concurrent mutation of the environment in multi-threaded programs.
        // In practice, env var mutation is done during initialization only.
        unsafe {
            std::env::set_var(name, value);
        }
    }

    fn remove_var(&self, name: &str) {
        // SAFETY: Same caveat as set_var above.
        unsafe {
            std::env::remove_var(name);
        }
    }
}
