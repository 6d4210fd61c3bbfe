//! Platform abstraction layer for threadline.
//!
//! Provides traits for all platform-dependent operations (HTTP, filesystem,
//! environment, process spawning) plus the resilient HTTP substrate and
//! environment-variable configuration loading.
//!
//! # Architecture
//!
//! The [`Platform`] trait bundles all platform capabilities via accessor
//! methods. Each sub-capability has its own trait ([`http::HttpClient`],
//! [`fs::FileSystem`], [`env::Environment`], [`process::ProcessSpawner`])
//! with a native implementation backed by [`reqwest`], [`tokio::fs`],
//! [`std::env`], and [`tokio::process`] respectively.
//!
//! # Example
//!
//! ```rust,no_run
//! use threadline_platform::{Platform, NativePlatform};
//! use threadline_platform::http::HttpClient;
//! use std::collections::HashMap;
//!
//! # async fn example() {
//! let platform = NativePlatform::new(Default::default());
//! let response = platform.http()
//!     .get("https://example.com", &HashMap::new())
//!     .await
//!     .unwrap();
//! assert!(response.is_success());
//! # }
//! ```

pub mod config_loader;
pub mod env;
pub mod fs;
pub mod http;
pub mod process;

use async_trait::async_trait;
use threadline_types::config::HttpConfig;

/// Bundle of all platform capabilities.
#[async_trait]
pub trait Platform: Send + Sync {
    /// HTTP client for making API requests -- always the resilient,
    /// retry/circuit-breaker/metrics-instrumented substrate.
    fn http(&self) -> &dyn http::HttpClient;

    /// Filesystem operations.
    fn fs(&self) -> &dyn fs::FileSystem;

    /// Environment variable access.
    fn env(&self) -> &dyn env::Environment;

    /// Process spawning capability.
    fn process(&self) -> Option<&dyn process::ProcessSpawner>;
}

/// Native platform implementation using std, tokio, and reqwest.
pub struct NativePlatform {
    http: http::ResilientHttpClient,
    fs: fs::NativeFileSystem,
    env: env::NativeEnvironment,
    process: process::NativeProcessSpawner,
}

impl NativePlatform {
    /// Create a new native platform with the given HTTP substrate
    /// configuration (retry count, backoff factor, timeouts).
    pub fn new(http_config: HttpConfig) -> Self {
        Self {
            http: http::ResilientHttpClient::native(http_config),
            fs: fs::NativeFileSystem,
            env: env::NativeEnvironment,
            process: process::NativeProcessSpawner,
        }
    }

    /// Create a native platform whose configuration is loaded from the
    /// process environment.
    pub fn from_env() -> Self {
        let env = env::NativeEnvironment;
        let config = config_loader::load_config(&env);
        Self::new(config.http)
    }
}

#[async_trait]
impl Platform for NativePlatform {
    fn http(&self) -> &dyn http::HttpClient {
        &self.http
    }

    fn fs(&self) -> &dyn fs::FileSystem {
        &self.fs
    }

    fn env(&self) -> &dyn env::Environment {
        &self.env
    }

    fn process(&self) -> Option<&dyn process::ProcessSpawner> {
        Some(&self.process)
    }
}
