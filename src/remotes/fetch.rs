use crate::{
    cancel::Cancel,
    digest::Digest,
    error::*,
    image::Manifest,
    media_types::{self, Kind},
    remotes::{Fetcher, StatusTracker},
    store::{Provider, Store},
};
use oci_spec::image::Descriptor;
use std::{cell::RefCell, collections::VecDeque, io::Read};

/// Descriptors `desc` refers to, read from `provider`
///
/// A manifest refers to its config and then its layers in order. Indexes are
/// not expanded, and every other kind of content is a leaf.
pub fn children<P: Provider + ?Sized>(provider: &P, desc: &Descriptor) -> Result<Vec<Descriptor>> {
    match media_types::kind(&desc.media_type().to_string()) {
        Kind::Manifest => {
            let manifest = Manifest::from_slice(&provider.read_all(desc)?)?;
            let mut children = Vec::with_capacity(manifest.layers.len() + 1);
            children.push(manifest.config);
            children.extend(manifest.layers);
            Ok(children)
        }
        Kind::Index => {
            log::warn!("Image index {} is recorded but not expanded", desc.digest());
            Ok(Vec::new())
        }
        _ => Ok(Vec::new()),
    }
}

/// Breadth-first walk from `root`, fetching every node missing in `store`
///
/// Returns every visited descriptor in visit order. Content referred to twice
/// is fetched once but reported at each visit, so that layer order matches
/// the manifest.
pub fn fetch<S: Store + ?Sized>(
    fetcher: &mut dyn Fetcher,
    root: &Descriptor,
    store: &mut S,
    reference: &str,
    cancel: &Cancel,
) -> Result<Vec<Descriptor>> {
    let tracker = StatusTracker::new("Fetched");
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(desc) = queue.pop_front() {
        cancel.check()?;
        if store.contains(&desc) {
            log::debug!("{} already present", desc.digest());
        } else {
            let mut content = fetcher.fetch(&desc)?;
            store.ingest(reference, &desc, content.as_mut())?;
        }
        tracker.visit(&desc);
        queue.extend(children(&*store, &desc)?);
    }
    Ok(tracker.into_visited())
}

/// Read-only [Provider] reading through a [Fetcher]
///
/// Used as the upstream of a [crate::store::HybridStore], so that content not
/// yet cached locally is read from the registry on demand.
pub struct FetcherProvider {
    fetcher: RefCell<Box<dyn Fetcher>>,
}

impl FetcherProvider {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        FetcherProvider {
            fetcher: RefCell::new(fetcher),
        }
    }
}

impl Provider for FetcherProvider {
    fn reader(&self, desc: &Descriptor) -> Result<Box<dyn Read + '_>> {
        let reader = self.fetcher.borrow_mut().fetch(desc)?;
        Ok(reader)
    }

    /// Assumed for any valid digest, absence only shows when the read fails
    fn contains(&self, desc: &Descriptor) -> bool {
        Digest::from_descriptor(desc).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::{ImageDescriptor, ImageOptions, LayerBuilder},
        media_types::OCI_INDEX,
        store::{HybridStore, MemoryStore},
    };
    use oci_spec::image::MediaType;
    use std::{fs, io::Cursor, rc::Rc};

    /// Serves content out of a memory store and counts requests
    struct MemoryFetcher {
        source: Rc<MemoryStore>,
        requests: Rc<RefCell<Vec<Descriptor>>>,
    }

    impl Fetcher for MemoryFetcher {
        fn fetch(&mut self, desc: &Descriptor) -> Result<Box<dyn Read>> {
            self.requests.borrow_mut().push(desc.clone());
            let buf = self.source.read_all(desc)?;
            Ok(Box::new(Cursor::new(buf)))
        }
    }

    fn published(contents: &[&str]) -> Result<(MemoryStore, ImageDescriptor)> {
        let mut layers = Vec::new();
        for content in contents {
            let dir = tempfile::tempdir()?;
            fs::write(dir.path().join("file"), content)?;
            layers.push(LayerBuilder::new().build(dir.path(), &Cancel::new())?);
        }
        let mut store = MemoryStore::new();
        let image = ImageOptions::new().build_image("ref", &mut store, &layers)?;
        Ok((store, image))
    }

    fn memory_fetcher(source: MemoryStore) -> (MemoryFetcher, Rc<RefCell<Vec<Descriptor>>>) {
        let requests = Rc::new(RefCell::new(Vec::new()));
        let fetcher = MemoryFetcher {
            source: Rc::new(source),
            requests: requests.clone(),
        };
        (fetcher, requests)
    }

    #[test]
    fn breadth_first() -> Result<()> {
        let (source, image) = published(&["a", "b", "a"])?;
        let (mut fetcher, requests) = memory_fetcher(source);
        let mut store = MemoryStore::new();
        let manifest = image.manifest.clone().unwrap();

        let visited = fetch(&mut fetcher, &manifest, &mut store, "ref", &Cancel::new())?;
        let mut expected = vec![manifest, image.config.clone().unwrap()];
        expected.extend(image.layers.iter().cloned());
        assert_eq!(visited, expected);

        // The repeated layer is requested only once
        assert_eq!(requests.borrow().len(), 4);
        assert_eq!(store.len(), 4);

        let classified = ImageDescriptor::classify(visited).unwrap();
        assert_eq!(classified, image);
        Ok(())
    }

    #[test]
    fn present_content_is_not_fetched() -> Result<()> {
        let (source, image) = published(&["a"])?;
        let mut store = source.clone();
        let (mut fetcher, requests) = memory_fetcher(source);
        let visited = fetch(
            &mut fetcher,
            image.manifest.as_ref().unwrap(),
            &mut store,
            "ref",
            &Cancel::new(),
        )?;
        assert_eq!(visited.len(), 3);
        assert!(requests.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn index_is_a_leaf() -> Result<()> {
        let index = crate::image::manifest::describe(MediaType::from(OCI_INDEX), b"{}")?;
        let mut source = MemoryStore::new();
        source.write("ref", &index, b"{}")?;
        let (mut fetcher, _) = memory_fetcher(source);
        let mut store = MemoryStore::new();
        let visited = fetch(&mut fetcher, &index, &mut store, "ref", &Cancel::new())?;
        assert_eq!(visited, vec![index]);
        Ok(())
    }

    #[test]
    fn cancelled_before_first_node() -> Result<()> {
        let (source, image) = published(&["a"])?;
        let (mut fetcher, requests) = memory_fetcher(source);
        let cancel = Cancel::new();
        cancel.cancel();
        let err = fetch(
            &mut fetcher,
            image.manifest.as_ref().unwrap(),
            &mut MemoryStore::new(),
            "ref",
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(requests.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn hybrid_over_fetcher() -> Result<()> {
        let (source, image) = published(&["remote"])?;
        let (fetcher, requests) = memory_fetcher(source);
        let mut store = HybridStore::new(Some(FetcherProvider::new(Box::new(fetcher))));

        let layer = &image.layers[0];
        let remote = store.read_all(layer)?;
        assert_eq!(requests.borrow().len(), 1);

        store.write("ref", layer, &remote)?;
        assert_eq!(store.read_all(layer)?, remote);
        assert_eq!(requests.borrow().len(), 1);
        Ok(())
    }
}
