//! Whole publish and retrieve operations
//!
//! ```no_run
//! use layerpush::{cancel::Cancel, distribution::RegistryResolver, image::ImageOptions, publish, store::MemoryStore};
//! use std::path::Path;
//!
//! let resolver = RegistryResolver::from_stored_auth()?;
//! let digest = publish::build_and_push_directory(
//!     Path::new("./public"),
//!     "localhost:5000/site:latest",
//!     &mut MemoryStore::new(),
//!     &resolver,
//!     &ImageOptions::new(),
//!     &Cancel::new(),
//! )?;
//! println!("{}", digest);
//! # Ok::<(), layerpush::error::Error>(())
//! ```

use crate::{
    cancel::Cancel,
    error::*,
    image::{ImageDescriptor, ImageOptions},
    remotes::Resolver,
    store::{Retrieve, Store},
    Digest,
};
use std::path::Path;

/// Build `dir` into a single-layer image in `store`, and push it to `reference`
///
/// Returns the digest of the pushed manifest.
pub fn build_and_push_directory<S: Store + ?Sized>(
    dir: &Path,
    reference: &str,
    store: &mut S,
    resolver: &dyn Resolver,
    options: &ImageOptions,
    cancel: &Cancel,
) -> Result<Digest> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string());
    let layer = options.layer_builder().name(&name).build(dir, cancel)?;
    let image = options.build_image(reference, store, &[layer])?;
    cancel.check()?;
    store.push(resolver, reference, &image, cancel)
}

/// Fetch the image at `reference` into `store` and unpack its layers into `dir`
pub fn pull_to_directory<S: Retrieve + ?Sized>(
    reference: &str,
    dir: &Path,
    store: &mut S,
    resolver: &dyn Resolver,
    cancel: &Cancel,
) -> Result<ImageDescriptor> {
    let image = store
        .pull(resolver, reference, cancel)?
        .ok_or(Error::MissingManifest)?;
    if image.manifest.is_none() {
        return Err(match &image.index {
            Some(index) => Error::UnsupportedMediaType(index.media_type().to_string()),
            None => Error::MissingManifest,
        });
    }
    store.unpack(&image, dir, cancel)?;
    Ok(image)
}
