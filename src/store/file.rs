use crate::{
    cancel::Cancel,
    config,
    digest::{Digest, DigestBuf},
    error::*,
    image::ImageDescriptor,
    remotes::{self, Resolver},
    store::{Provider, Retrieve, Store},
};
use oci_spec::image::Descriptor;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

/// Content-addressed blob store on the local filesystem
///
/// ```text
/// <root>/
/// ├── blobs/
/// │   └── sha256/
/// │       └── <hex digest>
/// └── ingest/
///     └── <reference key>-<uuid>   # in-flight writes
/// ```
///
/// A blob only appears under `blobs/` after its size and digest have been
/// checked, by renaming the ingest file into place.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    temporary: bool,
}

impl FileStore {
    /// Open or create a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in ["blobs", "ingest"] {
            let path = root.join(dir);
            fs::create_dir_all(&path).with_path(&path)?;
        }
        Ok(FileStore {
            root,
            temporary: false,
        })
    }

    /// Store in a fresh directory under the system temporary directory,
    /// removed when the store is dropped
    pub fn temporary() -> Result<Self> {
        let root = std::env::temp_dir().join(format!(
            "{}-{}",
            config::PROJECT_NAME,
            uuid::Uuid::new_v4()
        ));
        let mut store = Self::open(root)?;
        store.temporary = true;
        Ok(store)
    }

    /// Store in the per-user data directory
    pub fn persistent() -> Result<Self> {
        Self::open(config::default_store_dir()?)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.as_path())
    }

    fn ingest_path(&self, reference: &str) -> PathBuf {
        let key = Digest::from_buf_sha256(reference.as_bytes());
        self.root
            .join("ingest")
            .join(format!("{}-{}", key.short(), uuid::Uuid::new_v4()))
    }

    /// Move a checked in-flight file into place
    fn commit(&self, tmp: &Path, digest: &Digest) -> Result<()> {
        let dest = self.blob_path(digest);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        fs::rename(tmp, &dest).map_err(|e| Error::StoreWrite {
            digest: digest.clone(),
            reason: e.to_string(),
        })
    }

    fn check(desc: &Descriptor, size: u64, actual: Digest) -> Result<Digest> {
        let expected = Digest::from_descriptor(desc)?;
        let size = size as i64;
        if size != desc.size() {
            return Err(Error::SizeMismatch {
                expected: desc.size(),
                actual: size,
            });
        }
        if actual != expected {
            return Err(Error::DigestMismatch { expected, actual });
        }
        Ok(expected)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if self.temporary {
            if let Err(e) = fs::remove_dir_all(&self.root) {
                log::warn!(
                    "Failed to remove temporary store {}: {}",
                    self.root.display(),
                    e
                );
            }
        }
    }
}

impl Provider for FileStore {
    fn reader(&self, desc: &Descriptor) -> Result<Box<dyn Read + '_>> {
        let digest = Digest::from_descriptor(desc)?;
        let path = self.blob_path(&digest);
        match fs::File::open(&path) {
            Ok(f) => Ok(Box::new(io::BufReader::new(f))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::BlobNotFound(digest)),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    fn contains(&self, desc: &Descriptor) -> bool {
        match Digest::from_descriptor(desc) {
            Ok(digest) => self.blob_path(&digest).is_file(),
            Err(_) => false,
        }
    }
}

impl Store for FileStore {
    fn write(&mut self, reference: &str, desc: &Descriptor, blob: &[u8]) -> Result<()> {
        self.ingest(reference, desc, &mut &*blob)
    }

    fn ingest(&mut self, reference: &str, desc: &Descriptor, reader: &mut dyn Read) -> Result<()> {
        if self.contains(desc) {
            log::debug!("{} already in store", desc.digest());
            return Ok(());
        }
        let tmp = self.ingest_path(reference);
        let file = fs::File::create(&tmp).with_path(&tmp)?;
        let mut buf = DigestBuf::new(io::BufWriter::new(file));
        let written = io::copy(reader, &mut buf).with_path(&tmp);
        let (writer, actual) = buf.finish();
        let checked = written.and_then(|size| {
            drop(writer.into_inner().map_err(|e| e.into_error()).with_path(&tmp)?);
            Self::check(desc, size, actual)
        });
        match checked {
            Ok(digest) => self.commit(&tmp, &digest),
            Err(e) => {
                fs::remove_file(&tmp).ok();
                Err(e)
            }
        }
    }
}

impl Retrieve for FileStore {
    fn pull(
        &mut self,
        resolver: &dyn Resolver,
        reference: &str,
        cancel: &Cancel,
    ) -> Result<Option<ImageDescriptor>> {
        let root = resolver.resolve(reference)?;
        log::info!("Resolved {} to {}", reference, root.digest());
        let mut fetcher = resolver.fetcher(reference)?;
        let visited = remotes::fetch(fetcher.as_mut(), &root, self, reference, cancel)?;
        Ok(ImageDescriptor::classify(visited))
    }
}
