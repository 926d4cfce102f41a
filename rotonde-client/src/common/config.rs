/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Configuration for the Rotonde client, loaded from XDG-compliant TOML.
//!
//! # Example Configuration File
//!
//! `$XDG_CONFIG_HOME/rotonde/client.toml`:
//!
//! ```toml
//! [connection]
//! url = "127.0.0.1:4224"
//!
//! [timeouts]
//! bootstrap_timeout_ms = 10000
//! definition_wait_ms = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Default hub endpoint.
pub const DEFAULT_URL: &str = "127.0.0.1:4224";

/// Configuration for the Rotonde client.
///
/// All sections fall back to defaults when absent, so a partial file (or no
/// file at all) is always valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RotondeConfig {
    /// Connection configuration.
    pub connection: ConnectionConfig,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

/// Connection-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// The hub endpoint the transport opens against.
    pub url: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
        }
    }
}

/// Timeout configuration.
///
/// All values are in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default bound for the whole bootstrap handshake.
    pub bootstrap_timeout_ms: u64,
    /// Default bound for an individual definition-arrival wait.
    pub definition_wait_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout_ms: 10_000,
            definition_wait_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    /// The bootstrap bound as a [`Duration`].
    #[must_use]
    pub const fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }

    /// The definition-wait bound as a [`Duration`].
    #[must_use]
    pub const fn definition_wait(&self) -> Duration {
        Duration::from_millis(self.definition_wait_ms)
    }
}

impl RotondeConfig {
    /// Loads configuration from the XDG config directory.
    ///
    /// Attempts to load from `$XDG_CONFIG_HOME/rotonde/client.toml`; any
    /// failure (missing file, unreadable file, parse error) falls back to
    /// defaults with a diagnostic rather than failing the caller.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("rotonde") {
            Ok(dirs) => dirs,
            Err(e) => {
                warn!("Failed to initialize XDG directories for client config: {}", e);
                return Self::default();
            }
        };

        xdg_dirs.find_config_file("client.toml").map_or_else(
            || {
                info!("No client configuration file found, using defaults");
                Self::default()
            },
            |path| {
                info!("Loading client configuration from: {}", path.display());
                match std::fs::read_to_string(&path) {
                    Ok(config_str) => match toml::from_str::<Self>(&config_str) {
                        Ok(config) => config,
                        Err(e) => {
                            warn!(
                                "Failed to parse client configuration file {}: {}",
                                path.display(),
                                e
                            );
                            Self::default()
                        }
                    },
                    Err(e) => {
                        warn!(
                            "Failed to read client configuration file {}: {}",
                            path.display(),
                            e
                        );
                        Self::default()
                    }
                }
            },
        )
    }

    /// A config pointing at the given endpoint, defaults elsewhere.
    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig { url: url.into() },
            ..Self::default()
        }
    }
}
