use crate::{
    error::*,
    store::{MemoryStore, Provider, Store},
};
use oci_spec::image::Descriptor;
use std::io::Read;

/// Two-tier store: a writable cache in front of an optional read-only upstream
///
/// Reads are served from the cache first and fall back to the upstream.
/// Writes always land in the cache, the upstream is never modified.
#[derive(Debug)]
pub struct HybridStore<U: Provider, C: Store = MemoryStore> {
    cache: C,
    upstream: Option<U>,
}

impl<U: Provider> HybridStore<U, MemoryStore> {
    /// In-memory cache over `upstream`
    pub fn new(upstream: Option<U>) -> Self {
        Self::with_cache(MemoryStore::new(), upstream)
    }
}

impl<U: Provider, C: Store> HybridStore<U, C> {
    pub fn with_cache(cache: C, upstream: Option<U>) -> Self {
        HybridStore { cache, upstream }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn upstream(&self) -> Option<&U> {
        self.upstream.as_ref()
    }

    pub fn into_parts(self) -> (C, Option<U>) {
        (self.cache, self.upstream)
    }
}

impl<U: Provider, C: Store> Provider for HybridStore<U, C> {
    fn reader(&self, desc: &Descriptor) -> Result<Box<dyn Read + '_>> {
        match self.cache.reader(desc) {
            Err(Error::BlobNotFound(digest)) => match &self.upstream {
                Some(upstream) => {
                    log::debug!("{} not cached, reading upstream", digest);
                    upstream.reader(desc)
                }
                None => Err(Error::BlobNotFound(digest)),
            },
            res => res,
        }
    }

    fn contains(&self, desc: &Descriptor) -> bool {
        self.cache.contains(desc)
            || self
                .upstream
                .as_ref()
                .map_or(false, |upstream| upstream.contains(desc))
    }
}

impl<U: Provider, C: Store> Store for HybridStore<U, C> {
    fn write(&mut self, reference: &str, desc: &Descriptor, blob: &[u8]) -> Result<()> {
        self.cache.write(reference, desc, blob)
    }

    fn ingest(&mut self, reference: &str, desc: &Descriptor, reader: &mut dyn Read) -> Result<()> {
        self.cache.ingest(reference, desc, reader)
    }
}
