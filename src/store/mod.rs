//! Content stores holding blobs during assembly and retrieval
//!
//! All stores are addressed by descriptor, and the digest in the descriptor is
//! the only identity: two writes with the same digest must carry the same bytes,
//! which every store checks before accepting content.

mod file;
mod hybrid;
mod memory;

pub use file::FileStore;
pub use hybrid::HybridStore;
pub use memory::MemoryStore;

use crate::{
    cancel::Cancel,
    digest::Digest,
    error::*,
    image::{self, ImageDescriptor},
    media_types,
    remotes::{self, Resolver},
};
use oci_spec::image::Descriptor;
use std::{io::Read, path::Path};

/// Read access to content by descriptor
pub trait Provider {
    /// Open the content described by `desc`, or [Error::BlobNotFound]
    fn reader(&self, desc: &Descriptor) -> Result<Box<dyn Read + '_>>;

    /// Whether the content described by `desc` is available
    fn contains(&self, desc: &Descriptor) -> bool;

    fn read_all(&self, desc: &Descriptor) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader(desc)?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// Writable store which can publish its content through a [Resolver]
pub trait Store: Provider {
    /// Store `blob` under `desc`
    ///
    /// `reference` names the image being assembled, and is only used to keep
    /// concurrent in-flight writes of different images apart.
    fn write(&mut self, reference: &str, desc: &Descriptor, blob: &[u8]) -> Result<()>;

    /// Store the content read from `reader` under `desc`
    fn ingest(&mut self, reference: &str, desc: &Descriptor, reader: &mut dyn Read) -> Result<()> {
        let mut blob = Vec::new();
        reader.read_to_end(&mut blob)?;
        self.write(reference, desc, &blob)
    }

    /// Push the image rooted at `image.manifest` to `reference`
    ///
    /// Every child of the manifest must already be in the store. Returns the manifest digest.
    fn push(
        &self,
        resolver: &dyn Resolver,
        reference: &str,
        image: &ImageDescriptor,
        cancel: &Cancel,
    ) -> Result<Digest> {
        let manifest = image.manifest.as_ref().ok_or(Error::MissingManifest)?;
        let mut pusher = resolver.pusher(reference)?;
        log::info!("Pushing {} to {}", manifest.digest(), reference);
        remotes::push_content(pusher.as_mut(), manifest, self, cancel)?;
        Digest::from_descriptor(manifest)
    }
}

/// Stores which can also fetch images from a registry and expand them on disk
pub trait Retrieve: Store {
    /// Fetch the image at `reference` and everything it refers to into the store
    ///
    /// Returns `None` if nothing was visited.
    fn pull(
        &mut self,
        resolver: &dyn Resolver,
        reference: &str,
        cancel: &Cancel,
    ) -> Result<Option<ImageDescriptor>>;

    /// Write the contents of every layer of `image`, in order, into `dir`
    fn unpack(&self, image: &ImageDescriptor, dir: &Path, cancel: &Cancel) -> Result<()> {
        unpack_layers(self, image, dir, cancel)
    }
}

/// Unpack the layers of `image` read from `provider` into `dir`
pub fn unpack_layers<P: Provider + ?Sized>(
    provider: &P,
    image: &ImageDescriptor,
    dir: &Path,
    cancel: &Cancel,
) -> Result<()> {
    std::fs::create_dir_all(dir).with_path(dir)?;
    for layer in &image.layers {
        cancel.check()?;
        let media_type = layer.media_type().to_string();
        let compression = media_types::layer_compression(&media_type)
            .ok_or_else(|| Error::UnsupportedMediaType(media_type.clone()))?;
        log::info!("Unpack layer {} into {}", layer.digest(), dir.display());
        let reader = provider.reader(layer)?;
        image::unpack_from(reader, compression, dir)?;
    }
    Ok(())
}

/// Check that `blob` is the content described by `desc`
pub(crate) fn verify(desc: &Descriptor, blob: &[u8]) -> Result<Digest> {
    let expected = Digest::from_descriptor(desc)?;
    let size = blob.len() as i64;
    if size != desc.size() {
        return Err(Error::SizeMismatch {
            expected: desc.size(),
            actual: size,
        });
    }
    let actual = Digest::from_buf_sha256(blob);
    if actual != expected {
        return Err(Error::DigestMismatch { expected, actual });
    }
    Ok(expected)
}
