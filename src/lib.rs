//! layerpush
//! =========
//!
//! Publish a directory as a single-layer container image and retrieve it again.
//!
//! - [image] builds a gzip-compressed tar layer from a directory, and the
//!   config and manifest describing it, in Docker v2 schema 2 or OCI flavour.
//! - [store] holds blobs by descriptor, in memory, on disk, or in a cache in
//!   front of another provider.
//! - [remotes] walks the content graph to push or fetch it through a
//!   [remotes::Resolver], and [distribution] implements one for OCI registries.
//! - [publish] ties these together.

pub mod cancel;
pub mod config;
pub mod digest;
pub mod distribution;
pub mod error;
pub mod image;
pub mod media_types;
pub mod publish;
pub mod remotes;
pub mod store;

mod image_name;

pub use cancel::Cancel;
pub use digest::Digest;
pub use image_name::ImageName;
