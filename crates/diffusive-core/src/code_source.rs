//! On-demand code resolution
//!
//! A [`RemoteCodeSource`] turns a fully-qualified type name into the bytes of
//! its code module. Resolution order is fixed: local code directories, then
//! auxiliary directories, then the classpath endpoints of remote peers. A
//! peer answers a classpath request by running the same resolution on its
//! side, so every remote fetch carries a hop budget that shrinks by one per
//! peer and stops recursion once it reaches zero.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use diffusive_common::protocol::error::{DiffusiveError, Result};
use diffusive_common::transport::ClassTransport;

/// Hop budget for a fetch that starts on this peer.
pub const DEFAULT_HOPS: u32 = 3;

/// Extension of code module files inside code directories.
pub const CODE_EXTENSION: &str = "class";

/// Memo of code bytes found in auxiliary directories or on remote peers.
///
/// Entries are immutable and never invalidated.
#[derive(Debug, Default)]
pub struct ClassByteCache {
    entries: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl ClassByteCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Stores `bytes` unless `name` is already present, returning the cached value.
    pub fn insert(&self, name: &str, bytes: Vec<u8>) -> Arc<[u8]> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::from(bytes))
            .clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Checks that `name` is a dotted identifier and cannot escape a code directory.
pub fn validate_name(name: &str) -> Result<()> {
    let valid_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-');
    let valid = !name.is_empty()
        && name
            .split('.')
            .all(|segment| !segment.is_empty() && segment.chars().all(valid_char));

    if valid {
        Ok(())
    } else {
        Err(DiffusiveError::InvalidRequest(format!("Invalid code name '{}'", name)))
    }
}

/// Relative path of the file holding `name`: `a.b.C` becomes `a/b/C.class`.
pub fn relative_path(name: &str) -> PathBuf {
    let mut path: PathBuf = name.split('.').collect();
    path.set_extension(CODE_EXTENSION);
    path
}

/// Layered resolver of code bytes.
#[derive(Clone)]
pub struct RemoteCodeSource {
    local_paths: Vec<PathBuf>,
    aux_paths: Vec<PathBuf>,
    class_paths: Vec<String>,
    transport: Option<Arc<dyn ClassTransport>>,
    hops: u32,
    cache: Arc<ClassByteCache>,
}

impl Default for RemoteCodeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteCodeSource {
    pub fn new() -> Self {
        Self {
            local_paths: Vec::new(),
            aux_paths: Vec::new(),
            class_paths: Vec::new(),
            transport: None,
            hops: DEFAULT_HOPS,
            cache: Arc::new(ClassByteCache::new()),
        }
    }

    pub fn with_local_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.local_paths.extend(paths);
        self
    }

    pub fn with_aux_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.aux_paths.extend(paths);
        self
    }

    pub fn with_class_paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.class_paths.extend(paths);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn ClassTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_hops(mut self, hops: u32) -> Self {
        self.hops = hops;
        self
    }

    /// A source sharing this one's memo cache, searching `paths` after the
    /// configured classpath endpoints.
    ///
    /// Used for diffusers that bring their own classpath list.
    pub fn with_extra_class_paths(&self, paths: &[String]) -> Self {
        let mut source = self.clone();
        for path in paths {
            if !source.class_paths.contains(path) {
                source.class_paths.push(path.clone());
            }
        }
        source
    }

    pub fn class_paths(&self) -> &[String] {
        &self.class_paths
    }

    pub fn hops(&self) -> u32 {
        self.hops
    }

    /// `true` if `name` has been memoized from an auxiliary or remote source.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains(name)
    }

    /// Every location a lookup searches, in order.
    pub fn search_locations(&self) -> Vec<String> {
        self.local_paths
            .iter()
            .chain(&self.aux_paths)
            .map(|p| p.display().to_string())
            .chain(self.class_paths.iter().cloned())
            .collect()
    }

    /// Resolves `name` with this source's own hop budget.
    pub async fn get_bytes(&self, name: &str) -> Result<Arc<[u8]>> {
        self.get_bytes_with_hops(name, self.hops).await
    }

    /// Resolves `name`, allowing remote peers to recurse at most `hops` times.
    ///
    /// # Arguments
    ///
    /// * `name` - Fully-qualified dotted type name
    /// * `hops` - Remaining remote hops; 0 means no classpath endpoint is asked
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a malformed name, `CodeNotFound` listing every
    /// searched location when no source has it.
    pub async fn get_bytes_with_hops(&self, name: &str, hops: u32) -> Result<Arc<[u8]>> {
        validate_name(name)?;
        let relative = relative_path(name);

        if let Some(bytes) = read_first(&self.local_paths, &relative).await {
            debug!("Code for {} found in local code directories", name);
            return Ok(Arc::from(bytes));
        }

        if let Some(bytes) = self.cache.get(name) {
            debug!("Code for {} served from the memo cache", name);
            return Ok(bytes);
        }

        if let Some(bytes) = read_first(&self.aux_paths, &relative).await {
            debug!("Code for {} found in auxiliary code directories", name);
            return Ok(self.cache.insert(name, bytes));
        }

        if hops > 0 {
            if let Some(bytes) = self.fetch_remote(name, hops - 1).await {
                return Ok(self.cache.insert(name, bytes));
            }
        } else if !self.class_paths.is_empty() {
            debug!("Hop budget exhausted, not asking peers for {}", name);
        }

        Err(DiffusiveError::CodeNotFound(format!(
            "{} not found; searched: [{}]",
            name,
            self.search_locations().join(", ")
        )))
    }

    async fn fetch_remote(&self, name: &str, hops: u32) -> Option<Vec<u8>> {
        let transport = self.transport.as_ref()?;

        for class_path in &self.class_paths {
            match transport.fetch_class(class_path, name, hops).await {
                Ok(Some(bytes)) => {
                    info!("Fetched code for {} from {} ({} bytes)", name, class_path, bytes.len());
                    return Some(bytes);
                }
                Ok(None) => debug!("{} does not have {}", class_path, name),
                Err(e) => warn!("Fetching {} from {} failed: {}", name, class_path, e),
            }
        }
        None
    }
}

async fn read_first(dirs: &[PathBuf], relative: &Path) -> Option<Vec<u8>> {
    for dir in dirs {
        let path = dir.join(relative);
        match tokio::fs::read(&path).await {
            Ok(bytes) => return Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot read {}: {}", path.display(), e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Peer serving a fixed set of names and counting every call.
    #[derive(Default)]
    struct CountingPeer {
        served: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
        hops_seen: Mutex<Vec<u32>>,
    }

    impl CountingPeer {
        fn serving(name: &str, bytes: &[u8]) -> Arc<Self> {
            let mut served = HashMap::new();
            served.insert(name.to_string(), bytes.to_vec());
            Arc::new(Self {
                served,
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClassTransport for CountingPeer {
        async fn fetch_class(&self, _class_path: &str, class_name: &str, hops: u32) -> Result<Option<Vec<u8>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hops_seen.lock().unwrap().push(hops);
            Ok(self.served.get(class_name).cloned())
        }
    }

    fn write_code(dir: &Path, name: &str, bytes: &[u8]) {
        let path = dir.join(relative_path(name));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("demo.Point").is_ok());
        assert!(validate_name("demo.Outer$Inner").is_ok());
        assert!(validate_name("plain").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("demo..Point").is_err());
        assert!(validate_name("demo/Point").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(relative_path("a.b.C"), PathBuf::from("a/b/C.class"));
        assert_eq!(relative_path("Top"), PathBuf::from("Top.class"));
    }

    #[tokio::test]
    async fn test_local_code_never_fetched_remotely() {
        let dir = tempfile::tempdir().unwrap();
        write_code(dir.path(), "demo.Local", b"local-bytes");
        let peer = CountingPeer::serving("demo.Local", b"remote-bytes");

        let source = RemoteCodeSource::new()
            .with_local_paths([dir.path().to_path_buf()])
            .with_class_paths(["http://peer:8182/classpath".to_string()])
            .with_transport(peer.clone());

        for _ in 0..3 {
            let bytes = source.get_bytes("demo.Local").await.unwrap();
            assert_eq!(&*bytes, b"local-bytes");
        }
        assert_eq!(peer.calls(), 0);
        assert!(!source.is_cached("demo.Local"));
    }

    #[tokio::test]
    async fn test_remote_code_fetched_once_then_memoized() {
        let peer = CountingPeer::serving("demo.Remote", b"remote-bytes");
        let source = RemoteCodeSource::new()
            .with_class_paths(["http://peer:8182/classpath".to_string()])
            .with_transport(peer.clone());

        for _ in 0..5 {
            let bytes = source.get_bytes("demo.Remote").await.unwrap();
            assert_eq!(&*bytes, b"remote-bytes");
        }
        assert_eq!(peer.calls(), 1);
        assert!(source.is_cached("demo.Remote"));
        assert_eq!(peer.hops_seen.lock().unwrap().as_slice(), &[DEFAULT_HOPS - 1]);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let peer = Arc::new(CountingPeer::default());
        let source = RemoteCodeSource::new()
            .with_class_paths(["http://peer:8182/classpath".to_string()])
            .with_transport(peer.clone());

        for _ in 0..2 {
            let err = source.get_bytes("demo.Missing").await.unwrap_err();
            assert!(matches!(err, DiffusiveError::CodeNotFound(_)));
        }
        assert_eq!(peer.calls(), 2);
    }

    #[tokio::test]
    async fn test_aux_directory_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        write_code(dir.path(), "demo.Aux", b"aux-bytes");
        let source = RemoteCodeSource::new().with_aux_paths([dir.path().to_path_buf()]);

        assert_eq!(&*source.get_bytes("demo.Aux").await.unwrap(), b"aux-bytes");
        assert!(source.is_cached("demo.Aux"));

        // served from the memo even after the file disappears
        std::fs::remove_file(dir.path().join(relative_path("demo.Aux"))).unwrap();
        assert_eq!(&*source.get_bytes("demo.Aux").await.unwrap(), b"aux-bytes");
    }

    #[tokio::test]
    async fn test_zero_hops_skips_peers() {
        let peer = CountingPeer::serving("demo.Remote", b"remote-bytes");
        let source = RemoteCodeSource::new()
            .with_class_paths(["http://peer:8182/classpath".to_string()])
            .with_transport(peer.clone());

        let err = source.get_bytes_with_hops("demo.Remote", 0).await.unwrap_err();
        assert!(matches!(err, DiffusiveError::CodeNotFound(_)));
        assert_eq!(peer.calls(), 0);
    }

    #[tokio::test]
    async fn test_not_found_lists_locations() {
        let dir = tempfile::tempdir().unwrap();
        let source = RemoteCodeSource::new()
            .with_local_paths([dir.path().to_path_buf()])
            .with_class_paths(["http://peer:8182/classpath".to_string()]);

        let err = source.get_bytes("demo.Nowhere").await.unwrap_err().to_string();
        assert!(err.contains("demo.Nowhere"));
        assert!(err.contains(&dir.path().display().to_string()));
        assert!(err.contains("http://peer:8182/classpath"));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected_before_lookup() {
        let peer = Arc::new(CountingPeer::default());
        let source = RemoteCodeSource::new()
            .with_class_paths(["http://peer:8182/classpath".to_string()])
            .with_transport(peer.clone());

        let err = source.get_bytes("../secret").await.unwrap_err();
        assert!(matches!(err, DiffusiveError::InvalidRequest(_)));
        assert_eq!(peer.calls(), 0);
    }

    #[tokio::test]
    async fn test_extra_class_paths_share_memo() {
        let peer = CountingPeer::serving("demo.Shared", b"shared");
        let base = RemoteCodeSource::new().with_transport(peer.clone());
        let extended = base.with_extra_class_paths(&["http://other:8182/classpath".to_string()]);

        assert!(base.get_bytes("demo.Shared").await.is_err());
        assert_eq!(&*extended.get_bytes("demo.Shared").await.unwrap(), b"shared");
        assert!(base.is_cached("demo.Shared"));
        assert_eq!(&*base.get_bytes("demo.Shared").await.unwrap(), b"shared");
        assert_eq!(peer.calls(), 1);
    }
}
