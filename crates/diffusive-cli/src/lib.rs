// Copyright 2025 Diffusive Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Diffusive CLI
//!
//! Command-line interface for running and inspecting diffusive peers.
//!
//! ## Key Commands
//!
//! - `diffusive serve`: Start a peer from a TOML configuration
//! - `diffusive diffusers`: List the diffusers a peer hosts (raw JSON)
//! - `diffusive fetch-class`: Download code bytes from a classpath
//!
//! The command bodies live here so they can be driven from tests without
//! spawning the binary.

pub mod fetch;
pub mod serve;

use anyhow::Result;

/// Validates that a URL string starts with http:// or https://
///
/// # Arguments
///
/// * `url` - The URL string to validate
/// * `description` - Human-readable description of what the URL is for (e.g., "peer address")
pub fn validate_http_url(url: &str, description: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Invalid {}: '{}' must start with http:// or https://",
            description,
            url
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("http://127.0.0.1:8182", "peer address").is_ok());
        assert!(validate_http_url("https://peer.example", "peer address").is_ok());

        let err = validate_http_url("127.0.0.1:8182", "peer address").unwrap_err();
        assert!(err.to_string().contains("peer address"));
    }
}
