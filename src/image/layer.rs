//! Build a single tar+gzip layer from a directory, and unpack it again

use crate::{
    cancel::Cancel,
    digest::{Digest, DigestBuf},
    error::*,
    media_types::{self, Compression},
};
use flate2::{read::GzDecoder, write::GzEncoder};
use oci_spec::image::MediaType;
use std::{
    fs,
    io::{self, Read},
    path::{Component, Path, PathBuf},
};
use walkdir::WalkDir;

/// A compressed layer blob together with the digest of its uncompressed form
///
/// `digest` is the DiffID recorded in the image config, while the blob is
/// addressed in stores and manifests by the digest of `blob` itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub blob: Vec<u8>,
    pub digest: Digest,
    pub media_type: MediaType,
    pub name: String,
}

/// DiffIDs of layers, in order
pub fn diff_ids(layers: &[Layer]) -> Vec<Digest> {
    layers.iter().map(|l| l.digest.clone()).collect()
}

/// Build a gzip-compressed tar layer from `directory`
///
/// Returns the compressed blob and the digest of the uncompressed tar stream.
pub fn build_layer(directory: &Path) -> Result<(Vec<u8>, Digest)> {
    let layer = LayerBuilder::new().build(directory, &Cancel::default())?;
    Ok((layer.blob, layer.digest))
}

/// Configurable [Layer] construction
///
/// By default headers are written in [tar::HeaderMode::Deterministic], and
/// entries are visited in lexicographic order, so the same directory contents
/// always produce the same DiffID and the same blob.
#[derive(Debug, Clone)]
pub struct LayerBuilder {
    media_type: MediaType,
    name: Option<String>,
    mode: tar::HeaderMode,
    level: flate2::Compression,
}

impl Default for LayerBuilder {
    fn default() -> Self {
        LayerBuilder {
            media_type: media_types::docker_layer_gzip(),
            name: None,
            mode: tar::HeaderMode::Deterministic,
            level: flate2::Compression::default(),
        }
    }
}

impl LayerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media type declared for the layer. It must denote a gzip-compressed tar.
    pub fn media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Keep owner, mtime and full permission bits of each file in the archive.
    ///
    /// Layers built this way are no longer reproducible across checkouts.
    pub fn preserve_metadata(mut self) -> Self {
        self.mode = tar::HeaderMode::Complete;
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.level = flate2::Compression::new(level);
        self
    }

    /// Walk `directory` once, streaming tar bytes into both the SHA-256 state and the gzip encoder
    pub fn build(&self, directory: &Path, cancel: &Cancel) -> Result<Layer> {
        let meta = fs::metadata(directory).map_err(|_| Error::NotFound(directory.to_owned()))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(directory.to_owned()));
        }

        let mut ar = tar::Builder::new(DigestBuf::new(GzEncoder::new(Vec::new(), self.level)));
        ar.mode(self.mode);
        ar.follow_symlinks(false);

        for entry in WalkDir::new(directory).min_depth(1).sort_by_file_name() {
            cancel.check()?;
            let entry = entry?;
            let path = entry.path();
            let name = path
                .strip_prefix(directory)
                .map_err(|_| Error::UnsafePath(path.to_owned()))?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                log::debug!("Add directory: {}", name.display());
                ar.append_dir(name, path).with_path(path)?;
            } else if file_type.is_file() {
                log::debug!("Add file: {}", name.display());
                let mut f = fs::File::open(path).with_path(path)?;
                ar.append_file(name, &mut f).with_path(path)?;
            } else {
                log::warn!("Skip non-regular file: {}", path.display());
            }
        }

        // Trailer blocks must reach the hash before it is read
        let buf = ar.into_inner().with_path(directory)?;
        let (gz, hasher) = buf.into_parts();
        let blob = gz.finish().with_path(directory)?;
        let digest = Digest::from_sha256(hasher);

        let name = match &self.name {
            Some(name) => name.clone(),
            None => directory
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        log::info!(
            "Built layer from {} ({} bytes compressed, diff_id {})",
            directory.display(),
            blob.len(),
            digest
        );
        Ok(Layer {
            blob,
            digest,
            media_type: self.media_type.clone(),
            name,
        })
    }
}

/// Unpack a gzip-compressed tar layer into `dest`
pub fn unpack_layer(blob: &[u8], dest: &Path) -> Result<()> {
    unpack_from(blob, Compression::Gzip, dest)
}

/// Unpack a layer read from `reader` into `dest`
///
/// Entries are applied in archive order and a later entry for the same path
/// overwrites the earlier one. Entries naming a path outside `dest` are rejected
/// with [Error::UnsafePath]. Only directories and regular files are materialized.
pub fn unpack_from(reader: impl Read, compression: Compression, dest: &Path) -> Result<()> {
    match compression {
        Compression::Gzip => unpack_tar(GzDecoder::new(reader), dest),
        Compression::None => unpack_tar(reader, dest),
    }
}

fn unpack_tar(reader: impl Read, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_path(dest)?;
    let mut ar = tar::Archive::new(reader);
    // Applied after all entries so that read-only directories can still be filled
    let mut dir_modes = Vec::new();
    for entry in ar.entries().with_path(dest)? {
        let mut entry = entry.with_path(dest)?;
        let path = entry.path().with_path(dest)?.into_owned();
        let relative = sanitize(&path)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);
        let mode = entry.header().mode().ok();
        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            clear(&target, true)?;
            fs::create_dir_all(&target).with_path(&target)?;
            if let Some(mode) = mode {
                dir_modes.push((target, mode));
            }
        } else if entry_type.is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).with_path(parent)?;
            }
            clear(&target, false)?;
            let mut f = fs::File::create(&target).with_path(&target)?;
            io::copy(&mut entry, &mut f).with_path(&target)?;
            if let Some(mode) = mode {
                set_mode(&target, mode)?;
            }
        } else {
            log::debug!("Skip {:?} entry: {}", entry_type, path.display());
        }
    }
    for (dir, mode) in dir_modes.into_iter().rev() {
        // A later entry may have replaced the directory
        if fs::symlink_metadata(&dir).map_or(false, |meta| meta.is_dir()) {
            set_mode(&dir, mode)?;
        }
    }
    Ok(())
}

/// Remove what an earlier entry left at `target`, keeping a directory if `keep_dir`
fn clear(target: &Path, keep_dir: bool) -> Result<()> {
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => {
            if !keep_dir {
                fs::remove_dir_all(target).with_path(target)?;
            }
        }
        Ok(_) => fs::remove_file(target).with_path(target)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(Error::Io {
                path: target.to_owned(),
                source,
            })
        }
    }
    Ok(())
}

/// Relative form of an archive path, or [Error::UnsafePath] if it could escape the target
fn sanitize(path: &Path) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(c) => out.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::UnsafePath(path.to_owned()))
            }
        }
    }
    Ok(out)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)).with_path(path)
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dir() -> Result<tempfile::TempDir> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.txt"), "hello")?;
        fs::create_dir(dir.path().join("sub"))?;
        fs::write(dir.path().join("sub/b.txt"), "world")?;
        Ok(dir)
    }

    fn entry_names(blob: &[u8]) -> Result<Vec<String>> {
        let mut ar = tar::Archive::new(GzDecoder::new(blob));
        let mut names = Vec::new();
        for entry in ar.entries()? {
            let entry = entry?;
            names.push(entry.path()?.to_string_lossy().trim_end_matches('/').to_string());
        }
        Ok(names)
    }

    #[test]
    fn digest_is_over_uncompressed_tar() -> Result<()> {
        let dir = sample_dir()?;
        let (blob, digest) = build_layer(dir.path())?;
        let mut tar = Vec::new();
        GzDecoder::new(blob.as_slice()).read_to_end(&mut tar)?;
        assert_eq!(digest, Digest::from_buf_sha256(&tar));
        assert_ne!(digest, Digest::from_buf_sha256(&blob));
        Ok(())
    }

    #[test]
    fn entries_are_sorted() -> Result<()> {
        let dir = sample_dir()?;
        fs::write(dir.path().join("0.txt"), "zero")?;
        let (blob, _) = build_layer(dir.path())?;
        assert_eq!(entry_names(&blob)?, ["0.txt", "a.txt", "sub", "sub/b.txt"]);
        Ok(())
    }

    #[test]
    fn reproducible() -> Result<()> {
        let dir = sample_dir()?;
        let first = LayerBuilder::new().build(dir.path(), &Cancel::default())?;
        // Touch a file without changing content
        fs::write(dir.path().join("a.txt"), "hello")?;
        let second = LayerBuilder::new().build(dir.path(), &Cancel::default())?;
        assert_eq!(first.digest, second.digest);
        assert_eq!(first.blob, second.blob);

        let other = sample_dir()?;
        let third = LayerBuilder::new().build(other.path(), &Cancel::default())?;
        assert_eq!(first.digest, third.digest);
        Ok(())
    }

    #[test]
    fn layer_fields() -> Result<()> {
        let dir = sample_dir()?;
        let layer = LayerBuilder::new()
            .name("payload")
            .media_type(MediaType::ImageLayerGzip)
            .build(dir.path(), &Cancel::default())?;
        assert_eq!(layer.name, "payload");
        assert_eq!(layer.media_type, MediaType::ImageLayerGzip);
        assert_eq!(diff_ids(&[layer.clone()]), vec![layer.digest]);
        Ok(())
    }

    #[test]
    fn missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = build_layer(&missing).unwrap_err();
        assert!(matches!(err, Error::NotFound(ref p) if p == &missing));
        assert!(err.is_not_found());
    }

    #[test]
    fn file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(build_layer(&file), Err(Error::NotADirectory(_))));
    }

    #[test]
    fn cancelled_before_first_entry() -> Result<()> {
        let dir = sample_dir()?;
        let cancel = Cancel::new();
        cancel.cancel();
        assert!(matches!(
            LayerBuilder::new().build(dir.path(), &cancel),
            Err(Error::Cancelled)
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() -> Result<()> {
        let dir = sample_dir()?;
        std::os::unix::fs::symlink("a.txt", dir.path().join("link"))?;
        let (blob, _) = build_layer(dir.path())?;
        assert_eq!(entry_names(&blob)?, ["a.txt", "sub", "sub/b.txt"]);
        Ok(())
    }

    #[test]
    fn round_trip() -> Result<()> {
        let dir = sample_dir()?;
        let (blob, _) = build_layer(dir.path())?;
        let out = tempfile::tempdir()?;
        unpack_layer(&blob, out.path())?;
        assert_eq!(fs::read_to_string(out.path().join("a.txt"))?, "hello");
        assert_eq!(fs::read_to_string(out.path().join("sub/b.txt"))?, "world");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_survives() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let dir = sample_dir()?;
        let script = dir.path().join("run.sh");
        fs::write(&script, "#!/bin/sh\n")?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        let (blob, _) = build_layer(dir.path())?;

        let out = tempfile::tempdir()?;
        unpack_layer(&blob, out.path())?;
        let mode = fs::metadata(out.path().join("run.sh"))?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        let mode = fs::metadata(out.path().join("a.txt"))?.permissions().mode();
        assert_eq!(mode & 0o111, 0);
        Ok(())
    }

    type RawEntry<'a> = (&'a [u8], tar::EntryType, u32, &'a [u8]);

    fn raw_tar(entries: &[RawEntry]) -> Result<Vec<u8>> {
        let mut ar = tar::Builder::new(Vec::new());
        for (name, entry_type, mode, data) in entries {
            let mut header = tar::Header::new_old();
            header.as_old_mut().name[..name.len()].copy_from_slice(name);
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(*entry_type);
            header.set_cksum();
            ar.append(&header, *data)?;
        }
        Ok(ar.into_inner()?)
    }

    fn file<'a>(name: &'a [u8], data: &'a [u8]) -> RawEntry<'a> {
        (name, tar::EntryType::Regular, 0o644, data)
    }

    #[test]
    fn parent_dir_entry_is_rejected() -> Result<()> {
        let tar = raw_tar(&[file(b"../evil.txt", b"boom")])?;
        let root = tempfile::tempdir()?;
        let dest = root.path().join("dest");
        let err = unpack_from(tar.as_slice(), Compression::None, &dest).unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
        assert!(!root.path().join("evil.txt").exists());
        Ok(())
    }

    #[test]
    fn later_entry_wins() -> Result<()> {
        let tar = raw_tar(&[file(b"same.txt", b"first"), file(b"same.txt", b"second")])?;
        let dest = tempfile::tempdir()?;
        unpack_from(tar.as_slice(), Compression::None, dest.path())?;
        assert_eq!(fs::read_to_string(dest.path().join("same.txt"))?, "second");
        Ok(())
    }

    #[test]
    fn absolute_entry_is_rejected() -> Result<()> {
        let tar = raw_tar(&[file(b"/etc/layerpush-test", b"boom")])?;
        let dest = tempfile::tempdir()?;
        let err = unpack_from(tar.as_slice(), Compression::None, dest.path()).unwrap_err();
        assert!(matches!(err, Error::UnsafePath(_)));
        assert!(fs::read_dir(dest.path())?.next().is_none());
        Ok(())
    }

    #[test]
    fn later_entry_replaces_read_only_file() -> Result<()> {
        let tar = raw_tar(&[
            (b"same.txt", tar::EntryType::Regular, 0o444, b"first"),
            (b"same.txt", tar::EntryType::Regular, 0o644, b"second"),
        ])?;
        let dest = tempfile::tempdir()?;
        unpack_from(tar.as_slice(), Compression::None, dest.path())?;
        assert_eq!(fs::read_to_string(dest.path().join("same.txt"))?, "second");
        Ok(())
    }

    #[test]
    fn later_file_replaces_directory() -> Result<()> {
        let tar = raw_tar(&[
            (b"x", tar::EntryType::Directory, 0o755, b""),
            file(b"x/inner.txt", b"inner"),
            file(b"x", b"file now"),
        ])?;
        let dest = tempfile::tempdir()?;
        unpack_from(tar.as_slice(), Compression::None, dest.path())?;
        assert_eq!(fs::read_to_string(dest.path().join("x"))?, "file now");
        Ok(())
    }

    #[test]
    fn later_directory_replaces_file() -> Result<()> {
        let tar = raw_tar(&[
            file(b"y", b"file"),
            (b"y", tar::EntryType::Directory, 0o755, b""),
            file(b"y/inner.txt", b"inner"),
        ])?;
        let dest = tempfile::tempdir()?;
        unpack_from(tar.as_slice(), Compression::None, dest.path())?;
        assert!(dest.path().join("y").is_dir());
        assert_eq!(fs::read_to_string(dest.path().join("y/inner.txt"))?, "inner");
        Ok(())
    }

    #[test]
    fn unpack_twice_over_read_only_files() -> Result<()> {
        let tar = raw_tar(&[(b"ro.txt", tar::EntryType::Regular, 0o444, b"read only")])?;
        let dest = tempfile::tempdir()?;
        unpack_from(tar.as_slice(), Compression::None, dest.path())?;
        unpack_from(tar.as_slice(), Compression::None, dest.path())?;
        assert_eq!(fs::read_to_string(dest.path().join("ro.txt"))?, "read only");
        Ok(())
    }
}
