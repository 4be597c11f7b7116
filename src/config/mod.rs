// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for waits.
//!
//! A wait needs two numbers, a total budget and a pause between attempts.
//! The rest of [`Settings`] tunes the container and HTTP probes.
//!
//! # Environment Variables
//!
//! - `WAITKIT_TIMEOUT` - Default wait budget in seconds (default: `20`)
//! - `WAITKIT_CONFIG` - Path to a YAML settings file
//! - `WAITKIT_KEEP_CONTAINERS` - Leave containers running after a test
//! - `WAITKIT_DOCKER` - Docker executable (default: `docker`)
//!
//! # Example
//!
//! ```no_run
//! use waitkit::config::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::from_env()?;
//! println!("waiting up to {:?}", settings.timeout);
//! # Ok(())
//! # }
//! ```

mod settings;

pub use settings::{
    Settings, SettingsFile, DEFAULT_HTTP_TIMEOUT, DEFAULT_LOG_TAIL, DEFAULT_STEP, DEFAULT_TIMEOUT,
    ENV_CONFIG, ENV_DOCKER, ENV_KEEP_CONTAINERS, ENV_TIMEOUT,
};
