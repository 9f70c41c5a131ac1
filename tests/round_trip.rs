//! Publish a directory and retrieve it again through an in-process registry

use layerpush::{
    digest::Digest,
    error::*,
    image::{ImageOptions, Manifest},
    media_types::{self, Kind},
    publish,
    remotes::{Fetcher, Pusher, Resolver},
    store::{FileStore, HybridStore, MemoryStore, Provider, Store},
    Cancel,
};
use oci_spec::image::Descriptor;
use std::{
    cell::RefCell,
    collections::HashMap,
    fs,
    io::{Cursor, Read},
    path::Path,
    rc::Rc,
};

#[derive(Default)]
struct Registry {
    blobs: HashMap<String, Vec<u8>>,
    tags: HashMap<String, Descriptor>,
    pushes: Vec<Descriptor>,
}

/// Resolver over a registry kept in memory
#[derive(Clone, Default)]
struct FakeResolver(Rc<RefCell<Registry>>);

struct FakePusher {
    registry: Rc<RefCell<Registry>>,
    reference: String,
}

struct FakeFetcher(Rc<RefCell<Registry>>);

impl Resolver for FakeResolver {
    fn resolve(&self, reference: &str) -> Result<Descriptor> {
        self.0
            .borrow()
            .tags
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::ManifestNotFound(reference.to_string()))
    }

    fn pusher(&self, reference: &str) -> Result<Box<dyn Pusher>> {
        Ok(Box::new(FakePusher {
            registry: self.0.clone(),
            reference: reference.to_string(),
        }))
    }

    fn fetcher(&self, _reference: &str) -> Result<Box<dyn Fetcher>> {
        Ok(Box::new(FakeFetcher(self.0.clone())))
    }
}

impl Pusher for FakePusher {
    fn push(&mut self, desc: &Descriptor, content: &mut dyn Read) -> Result<()> {
        let mut buf = Vec::new();
        content.read_to_end(&mut buf)?;
        assert_eq!(
            Digest::from_buf_sha256(&buf),
            Digest::from_descriptor(desc)?
        );
        let mut registry = self.registry.borrow_mut();
        // Children must already be there
        if media_types::kind(&desc.media_type().to_string()) == Kind::Manifest {
            let manifest = Manifest::from_slice(&buf)?;
            assert!(registry.blobs.contains_key(manifest.config.digest()));
            for layer in &manifest.layers {
                assert!(registry.blobs.contains_key(layer.digest()));
            }
            registry.tags.insert(self.reference.clone(), desc.clone());
        }
        registry.blobs.insert(desc.digest().clone(), buf);
        registry.pushes.push(desc.clone());
        Ok(())
    }
}

impl Fetcher for FakeFetcher {
    fn fetch(&mut self, desc: &Descriptor) -> Result<Box<dyn Read>> {
        let registry = self.0.borrow();
        let buf = registry
            .blobs
            .get(desc.digest())
            .cloned()
            .ok_or(Error::BlobNotFound(Digest::from_descriptor(desc)?))?;
        Ok(Box::new(Cursor::new(buf)))
    }
}

const REFERENCE: &str = "example.com/repo:tag";

fn example_directory(root: &Path) -> Result<()> {
    fs::write(root.join("a.txt"), "hello")?;
    fs::create_dir(root.join("sub"))?;
    fs::write(root.join("sub/b.txt"), "world")?;
    Ok(())
}

#[test]
fn publish_pull_unpack() -> Result<()> {
    let src = tempfile::tempdir()?;
    example_directory(src.path())?;

    let resolver = FakeResolver::default();
    let digest = publish::build_and_push_directory(
        src.path(),
        REFERENCE,
        &mut MemoryStore::new(),
        &resolver,
        &ImageOptions::new(),
        &Cancel::new(),
    )?;
    assert_eq!(resolver.resolve(REFERENCE)?.digest(), &digest.to_string());
    assert_eq!(resolver.0.borrow().pushes.len(), 3);

    let store_dir = tempfile::tempdir()?;
    let mut store = FileStore::open(store_dir.path())?;
    let dest = tempfile::tempdir()?;
    let image = publish::pull_to_directory(
        REFERENCE,
        dest.path(),
        &mut store,
        &resolver,
        &Cancel::new(),
    )?;

    assert_eq!(fs::read_to_string(dest.path().join("a.txt"))?, "hello");
    assert_eq!(fs::read_to_string(dest.path().join("sub/b.txt"))?, "world");
    assert_eq!(fs::read_dir(dest.path())?.count(), 2);

    // Config lists the DiffID of the single layer
    let config = store.read_all(image.config.as_ref().unwrap())?;
    let config: serde_json::Value = serde_json::from_slice(&config)?;
    let diff_ids = config["rootfs"]["diff_ids"].as_array().unwrap();
    assert_eq!(diff_ids.len(), image.layers.len());
    assert_eq!(image.layers.len(), 1);
    Ok(())
}

#[test]
fn same_directory_same_digest() -> Result<()> {
    let src = tempfile::tempdir()?;
    example_directory(src.path())?;
    let resolver = FakeResolver::default();
    let push = |reference: &str| {
        publish::build_and_push_directory(
            src.path(),
            reference,
            &mut MemoryStore::new(),
            &resolver,
            &ImageOptions::new(),
            &Cancel::new(),
        )
    };
    assert_eq!(push("example.com/a:1")?, push("example.com/b:2")?);
    Ok(())
}

#[test]
fn oci_schema_round_trip() -> Result<()> {
    let src = tempfile::tempdir()?;
    example_directory(src.path())?;
    let resolver = FakeResolver::default();
    let mut tmp = FileStore::temporary()?;
    publish::build_and_push_directory(
        src.path(),
        REFERENCE,
        &mut tmp,
        &resolver,
        &ImageOptions::new().oci(),
        &Cancel::new(),
    )?;

    let dest = tempfile::tempdir()?;
    let mut store = FileStore::temporary()?;
    let image = publish::pull_to_directory(
        REFERENCE,
        dest.path(),
        &mut store,
        &resolver,
        &Cancel::new(),
    )?;
    assert_eq!(
        image.manifest.unwrap().media_type().to_string(),
        media_types::OCI_MANIFEST
    );
    assert_eq!(fs::read_to_string(dest.path().join("sub/b.txt"))?, "world");
    Ok(())
}

#[test]
fn push_reads_through_hybrid_store() -> Result<()> {
    let src = tempfile::tempdir()?;
    example_directory(src.path())?;
    let options = ImageOptions::new();
    let layer = options.layer_builder().build(src.path(), &Cancel::new())?;

    // Image persisted earlier, nothing cached
    let upstream_dir = tempfile::tempdir()?;
    let mut upstream = FileStore::open(upstream_dir.path())?;
    let image = options.build_image(REFERENCE, &mut upstream, &[layer])?;

    let hybrid = HybridStore::new(Some(upstream));
    let resolver = FakeResolver::default();
    let digest = hybrid.push(&resolver, REFERENCE, &image, &Cancel::new())?;
    assert!(hybrid.cache().is_empty());
    assert_eq!(
        Some(digest.to_string()),
        image.manifest.map(|m| m.digest().clone())
    );
    assert_eq!(resolver.0.borrow().pushes.len(), 3);
    Ok(())
}

#[test]
fn missing_directory_pushes_nothing() {
    let resolver = FakeResolver::default();
    let mut store = MemoryStore::new();
    let err = publish::build_and_push_directory(
        Path::new("/nonexistent/layerpush/input"),
        REFERENCE,
        &mut store,
        &resolver,
        &ImageOptions::new(),
        &Cancel::new(),
    )
    .unwrap_err();
    assert!(err.is_not_found());
    assert!(store.is_empty());
    assert!(resolver.0.borrow().pushes.is_empty());
}

#[test]
fn pull_unknown_reference() -> Result<()> {
    let resolver = FakeResolver::default();
    let mut store = FileStore::temporary()?;
    let dest = tempfile::tempdir()?;
    let err = publish::pull_to_directory(
        "example.com/none:tag",
        dest.path(),
        &mut store,
        &resolver,
        &Cancel::new(),
    )
    .unwrap_err();
    assert!(err.is_not_found());
    assert!(fs::read_dir(dest.path())?.next().is_none());
    Ok(())
}

#[cfg(unix)]
#[test]
fn executable_bit_round_trip() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir()?;
    let script = src.path().join("run.sh");
    fs::write(&script, "#!/bin/sh\n")?;
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

    let resolver = FakeResolver::default();
    publish::build_and_push_directory(
        src.path(),
        REFERENCE,
        &mut MemoryStore::new(),
        &resolver,
        &ImageOptions::new(),
        &Cancel::new(),
    )?;
    let dest = tempfile::tempdir()?;
    publish::pull_to_directory(
        REFERENCE,
        dest.path(),
        &mut FileStore::temporary()?,
        &resolver,
        &Cancel::new(),
    )?;
    let mode = fs::metadata(dest.path().join("run.sh"))?.permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
    Ok(())
}
