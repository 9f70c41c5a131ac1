//! Build images from directories, following the [OCI image specification](https://github.com/opencontainers/image-spec)
//! or Docker image manifest v2 schema 2

pub mod annotations;
pub mod builder;
pub mod descriptor;
pub mod layer;
pub mod manifest;

pub use builder::ImageOptions;
pub use descriptor::ImageDescriptor;
pub use layer::{build_layer, diff_ids, unpack_from, unpack_layer, Layer, LayerBuilder};
pub use manifest::{ConfigOptions, Manifest, Schema};
