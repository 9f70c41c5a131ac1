//! Capabilities through which stores talk to a registry
//!
//! A [Resolver] turns a reference string into a root descriptor and into
//! [Pusher] / [Fetcher] handles bound to that reference. The walks over the
//! content graph, [push_content] and [fetch], are written against these traits
//! only and never see HTTP. [crate::distribution::RegistryResolver] is the
//! implementation talking to an OCI distribution endpoint.

mod fetch;
mod push;
mod status;

pub use fetch::{children, fetch, FetcherProvider};
pub use push::push_content;
pub use status::StatusTracker;

use crate::error::*;
use oci_spec::image::Descriptor;
use std::io::Read;

/// Turns a reference into transport handles
pub trait Resolver {
    /// Descriptor of the manifest `reference` points to
    fn resolve(&self, reference: &str) -> Result<Descriptor>;

    fn pusher(&self, reference: &str) -> Result<Box<dyn Pusher>>;

    fn fetcher(&self, reference: &str) -> Result<Box<dyn Fetcher>>;
}

/// Uploads content for one reference
pub trait Pusher {
    /// Upload the content of `desc` read from `content`
    ///
    /// Manifests are tagged with the reference the pusher was created for.
    fn push(&mut self, desc: &Descriptor, content: &mut dyn Read) -> Result<()>;
}

/// Downloads content by descriptor
pub trait Fetcher {
    fn fetch(&mut self, desc: &Descriptor) -> Result<Box<dyn Read>>;
}
