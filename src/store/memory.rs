use crate::{
    digest::Digest,
    error::*,
    store::{verify, Provider, Store},
};
use oci_spec::image::Descriptor;
use std::{collections::HashMap, io::Read};

/// Store keeping every blob in process memory
///
/// Nothing survives the process. Used as the scratch store of a one-shot
/// publish and as the cache tier of [crate::store::HybridStore].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    blobs: HashMap<Digest, (Descriptor, Vec<u8>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert content without a reference
    pub fn set(&mut self, desc: &Descriptor, blob: &[u8]) -> Result<()> {
        let digest = verify(desc, blob)?;
        self.blobs
            .entry(digest)
            .or_insert_with(|| (desc.clone(), blob.to_vec()));
        Ok(())
    }

    pub fn get(&self, desc: &Descriptor) -> Option<&[u8]> {
        let digest = Digest::from_descriptor(desc).ok()?;
        self.blobs.get(&digest).map(|(_, blob)| blob.as_slice())
    }

    /// Descriptors of everything stored, as first written
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.blobs.values().map(|(desc, _)| desc)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl Provider for MemoryStore {
    fn reader(&self, desc: &Descriptor) -> Result<Box<dyn Read + '_>> {
        match self.get(desc) {
            Some(blob) => Ok(Box::new(blob)),
            None => Err(Error::BlobNotFound(Digest::from_descriptor(desc)?)),
        }
    }

    fn contains(&self, desc: &Descriptor) -> bool {
        self.get(desc).is_some()
    }
}

impl Store for MemoryStore {
    fn write(&mut self, _reference: &str, desc: &Descriptor, blob: &[u8]) -> Result<()> {
        self.set(desc, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::manifest::describe;
    use oci_spec::image::MediaType;

    #[test]
    fn write_and_read() -> Result<()> {
        let mut store = MemoryStore::new();
        let desc = describe(MediaType::ImageLayerGzip, b"blob")?;
        assert!(!store.contains(&desc));
        assert!(matches!(store.read_all(&desc), Err(Error::BlobNotFound(_))));

        store.write("example.com/repo:tag", &desc, b"blob")?;
        assert!(store.contains(&desc));
        assert_eq!(store.read_all(&desc)?, b"blob");

        // Same content again is a no-op
        store.write("example.com/repo:tag", &desc, b"blob")?;
        assert_eq!(store.len(), 1);
        assert_eq!(store.descriptors().next(), Some(&desc));
        Ok(())
    }

    #[test]
    fn rejects_wrong_content() -> Result<()> {
        let mut store = MemoryStore::new();
        let desc = describe(MediaType::ImageLayerGzip, b"blob")?;
        assert!(store.write("ref", &desc, b"blub").is_err());
        assert!(store.is_empty());
        Ok(())
    }
}
