//! Fetch-if-missing download of pretrained weights.
//!
//! One blocking HTTP request per missing file. No checksum, no retry and no
//! resume: any failure is returned to the caller as is.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    catalog::{ModelName, DEFAULT_REPO_OWNER},
    error::{WeightError, WeightResult},
};

/// Default HuggingFace endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

const USER_AGENT: &str = concat!("birefnet-nodes/", env!("CARGO_PKG_VERSION"));

/// Moves the bytes behind a URL into a local file.
pub trait Transport {
    /// Downloads `url` into `destination`, returning the number of bytes written.
    ///
    /// # Errors
    /// Any network or file system failure.
    fn download(&self, url: &str, destination: &Path) -> WeightResult<u64>;
}

/// Blocking HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// # Errors
    /// Returns `WeightError::Download` if the HTTP client cannot be built.
    pub fn new() -> WeightResult<Self> {
        // Checkpoints are close to 1 GB, so only the connect phase is bounded.
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|source| WeightError::Download {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str, destination: &Path) -> WeightResult<u64> {
        let download_error = |source| WeightError::Download {
            url: url.to_owned(),
            source,
        };
        let io_error = |source| WeightError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(download_error)?;

        tracing::info!(
            url,
            bytes = response.content_length(),
            "downloading weights"
        );

        let mut writer = BufWriter::new(File::create(destination).map_err(io_error)?);
        let written = response.copy_to(&mut writer).map_err(download_error)?;
        writer.flush().map_err(io_error)?;

        Ok(written)
    }
}

/// Downloads catalog checkpoints into a weight folder when they are missing.
#[derive(Debug, Clone)]
pub struct WeightFetcher<T> {
    transport: T,
    root: PathBuf,
    endpoint: String,
    owner: String,
}

impl<T: Transport> WeightFetcher<T> {
    /// Creates a fetcher writing into `root` from the default HuggingFace endpoint.
    pub fn new(transport: T, root: impl Into<PathBuf>) -> Self {
        Self {
            transport,
            root: root.into(),
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            owner: DEFAULT_REPO_OWNER.to_owned(),
        }
    }

    /// Uses another HuggingFace-compatible endpoint (e.g. a mirror).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Uses another repository owner.
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Download URL for a catalog entry.
    pub fn url_for(&self, name: ModelName) -> String {
        name.weights_url(&self.endpoint, &self.owner)
    }

    /// Makes sure `<root>/<model_name>.safetensors` exists, downloading it if needed.
    ///
    /// The name is checked against the catalog before anything touches the
    /// network or the file system. The body is streamed into a `.part` file next
    /// to the target and renamed once complete; a failed transfer leaves the
    /// `.part` file behind.
    ///
    /// # Errors
    /// `UnknownModel` for names outside the catalog, `CreateDir`/`Io` for file
    /// system failures and whatever the transport reports.
    pub fn ensure_downloaded(&self, model_name: &str) -> WeightResult<PathBuf> {
        let name: ModelName = model_name.parse()?;
        let target = self.root.join(name.weights_file_name());

        if target.exists() {
            tracing::debug!(path = %target.display(), "weights already present");
            return Ok(target);
        }

        fs::create_dir_all(&self.root).map_err(|source| WeightError::CreateDir {
            path: self.root.clone(),
            source,
        })?;

        let url = self.url_for(name);
        let partial = partial_path(&target);
        tracing::info!(model = %name, url, path = %target.display(), "fetching weights");

        let bytes = self.transport.download(&url, &partial)?;
        fs::rename(&partial, &target).map_err(|source| WeightError::Io {
            path: target.clone(),
            source,
        })?;

        tracing::info!(model = %name, bytes, "weights downloaded");
        Ok(target)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Records requests and writes a fixed payload instead of touching the network.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Cell<usize>,
        urls: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn download(&self, url: &str, destination: &Path) -> WeightResult<u64> {
            self.calls.set(self.calls.get() + 1);
            self.urls.borrow_mut().push(url.to_owned());
            fs::write(destination, b"weights").map_err(|source| WeightError::Io {
                path: destination.to_path_buf(),
                source,
            })?;
            if self.fail {
                return Err(WeightError::Io {
                    path: destination.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"),
                });
            }
            Ok(7)
        }
    }

    #[test]
    fn ensure_downloaded_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = WeightFetcher::new(RecordingTransport::default(), dir.path());

        let first = fetcher.ensure_downloaded("General").unwrap();
        let second = fetcher.ensure_downloaded("General").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, dir.path().join("General.safetensors"));
        assert_eq!(fs::read(&first).unwrap(), b"weights");
        assert_eq!(fetcher.transport().calls.get(), 1);
    }

    #[test]
    fn ensure_downloaded_requests_mapped_repository() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = WeightFetcher::new(RecordingTransport::default(), dir.path())
            .with_endpoint("https://hf-mirror.example/");

        fetcher.ensure_downloaded("General-Lite").unwrap();

        assert_eq!(
            fetcher.transport().urls.borrow().as_slice(),
            ["https://hf-mirror.example/ZhengPeng7/BiRefNet_T/resolve/main/model.safetensors"]
        );
    }

    #[test]
    fn unknown_model_fails_before_any_download() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("BiRefNet");
        let fetcher = WeightFetcher::new(RecordingTransport::default(), &root);

        let result = fetcher.ensure_downloaded("Everything");

        assert!(matches!(result, Err(WeightError::UnknownModel { .. })));
        assert_eq!(fetcher.transport().calls.get(), 0);
        assert!(!root.exists());
    }

    #[test]
    fn existing_file_skips_transport() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("COD.safetensors"), b"local").unwrap();
        let fetcher = WeightFetcher::new(RecordingTransport::default(), dir.path());

        let path = fetcher.ensure_downloaded("COD").unwrap();

        assert_eq!(fs::read(path).unwrap(), b"local");
        assert_eq!(fetcher.transport().calls.get(), 0);
    }

    #[test]
    fn failed_download_never_leaves_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = RecordingTransport {
            fail: true,
            ..Default::default()
        };
        let fetcher = WeightFetcher::new(transport, dir.path());

        assert!(fetcher.ensure_downloaded("DIS").is_err());
        assert!(!dir.path().join("DIS.safetensors").exists());
        assert!(dir.path().join("DIS.safetensors.part").exists());
    }
}
