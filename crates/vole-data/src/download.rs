// DataDownloader: fetch a remote file once, reuse it afterwards
//
// Files live under `<root>/<namespace>/<file_name>`. The root is, in order:
// an explicit `root(..)`, the VOLE_DATA_DIR environment variable, or a
// `vole-data` directory in the system temp dir.
//
// Downloads are streamed into a uniquely named `.part` file next to the
// target and renamed into place, so several workers racing on the same file
// never see a partial archive.

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

use vole_core::{Error, Result};

/// Environment variable overriding the default cache root.
pub const DATA_DIR_ENV: &str = "VOLE_DATA_DIR";

static PART_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Cache root used when no explicit root is given.
pub fn default_data_root() -> PathBuf {
    env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| env::temp_dir().join("vole-data"))
}

/// A single remote file and where it is cached.
#[derive(Debug, Clone)]
pub struct DataDownloader {
    url: String,
    namespace: String,
    file_name: String,
    root: Option<PathBuf>,
}

impl DataDownloader {
    pub fn new(
        url: impl Into<String>,
        namespace: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            namespace: namespace.into(),
            file_name: file_name.into(),
            root: None,
        }
    }

    /// Cache under `root` instead of the default location.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Where the file lives once downloaded.
    pub fn path(&self) -> PathBuf {
        let root = self.root.clone().unwrap_or_else(default_data_root);
        root.join(&self.namespace).join(&self.file_name)
    }

    /// Return the cached path, downloading the file first if it is missing.
    pub fn ensure_downloaded(&self) -> Result<PathBuf> {
        let path = self.path();
        if path.is_file() {
            log::debug!("using cached {}", path.display());
            return Ok(path);
        }

        let dir = path
            .parent()
            .ok_or_else(|| Error::download(&self.url, "cache path has no parent directory"))?;
        fs::create_dir_all(dir).map_err(|e| {
            Error::download(&self.url, format!("cannot create {}: {e}", dir.display()))
        })?;

        log::info!("downloading {} to {}", self.url, path.display());
        let part = dir.join(format!(
            "{}.part-{}-{}",
            self.file_name,
            process::id(),
            PART_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        match self.fetch_into(&part) {
            Ok(bytes) => {
                fs::rename(&part, &path).map_err(|e| {
                    let _ = fs::remove_file(&part);
                    Error::download(&self.url, format!("cannot move into place: {e}"))
                })?;
                log::info!("downloaded {} ({bytes} bytes)", self.file_name);
                Ok(path)
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                Err(e)
            }
        }
    }

    fn fetch_into(&self, dest: &Path) -> Result<u64> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("vole/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::download(&self.url, e))?;

        let mut response = client
            .get(&self.url)
            .send()
            .map_err(|e| Error::download(&self.url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::download(&self.url, format!("HTTP {status}")));
        }

        let mut file = File::create(dest).map_err(|e| {
            Error::download(&self.url, format!("cannot create {}: {e}", dest.display()))
        })?;
        let bytes = response
            .copy_to(&mut file)
            .map_err(|e| Error::download(&self.url, e))?;
        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::download(&self.url, e))?;
        Ok(bytes)
    }
}
