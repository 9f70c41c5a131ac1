use crate::{
    cancel::Cancel,
    digest::Digest,
    error::*,
    remotes::{children, Pusher, StatusTracker},
    store::Provider,
};
use oci_spec::image::Descriptor;
use std::collections::HashSet;

/// Push `root` and everything it refers to, reading content from `provider`
///
/// Children are pushed before their parent, so a manifest only reaches the
/// registry once its config and layers are there. Layers keep manifest order.
/// Content appearing twice in the graph is pushed once.
pub fn push_content<P: Provider + ?Sized>(
    pusher: &mut dyn Pusher,
    root: &Descriptor,
    provider: &P,
    cancel: &Cancel,
) -> Result<()> {
    let tracker = StatusTracker::new("Pushed");
    let mut done = HashSet::new();
    push_tree(pusher, root, provider, cancel, &tracker, &mut done)?;
    log::info!("Pushed {} blobs", tracker.count());
    Ok(())
}

fn push_tree<P: Provider + ?Sized>(
    pusher: &mut dyn Pusher,
    desc: &Descriptor,
    provider: &P,
    cancel: &Cancel,
    tracker: &StatusTracker,
    done: &mut HashSet<Digest>,
) -> Result<()> {
    cancel.check()?;
    let digest = Digest::from_descriptor(desc)?;
    if done.contains(&digest) {
        return Ok(());
    }
    for child in children(provider, desc)? {
        push_tree(pusher, &child, provider, cancel, tracker, done)?;
    }
    let mut content = provider.reader(desc)?;
    pusher.push(desc, content.as_mut())?;
    tracker.visit(desc);
    done.insert(digest);
    Ok(())
}
