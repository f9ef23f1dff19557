//! `diffusive fetch-class` and `diffusive diffusers`
//!
//! Both print machine-friendly output: raw code bytes or compact JSON, so
//! they compose with other tools.

use anyhow::Result;
use std::io::Write;
use std::path::Path;

use diffusive_client::DiffuserClient;

use crate::validate_http_url;

/// Downloads the code bytes for `class_name` from a classpath resource.
///
/// # Arguments
///
/// * `class_path` - Full classpath URI (e.g., "http://10.0.0.5:8182/classpath")
/// * `class_name` - Fully-qualified name, e.g. `demo.Greeter`
/// * `hops` - How many more peers the request may be forwarded through
pub async fn fetch_class(class_path: &str, class_name: &str, hops: u32) -> Result<Vec<u8>> {
    validate_http_url(class_path, "classpath")?;
    DiffuserClient::new()
        .fetch_class(class_path, class_name, hops)
        .await?
        .ok_or_else(|| anyhow::anyhow!("{} not found under {}", class_name, class_path))
}

/// Writes `bytes` to `output`, or to stdout when no file is given.
pub fn write_output(bytes: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Lists the diffusers hosted by `peer` as a compact JSON array.
pub async fn list_diffusers(peer: &str) -> Result<String> {
    validate_http_url(peer, "peer address")?;
    let diffusers = DiffuserClient::new().list_diffusers(peer).await?;
    Ok(serde_json::to_string(&diffusers)?)
}
