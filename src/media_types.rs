//! Media types understood by layerpush
//!
//! OCI media types are covered by [oci_spec::image::MediaType] variants.
//! Docker image manifest v2 schema 2 types are not, and are kept here as
//! string constants and wrapped in [MediaType::Other].

use oci_spec::image::MediaType;

pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const DOCKER_CONFIG: &str = "application/vnd.docker.container.image.v1+json";
pub const DOCKER_LAYER: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_LAYER_FOREIGN: &str = "application/vnd.docker.image.rootfs.foreign.diff.tar";
pub const DOCKER_LAYER_FOREIGN_GZIP: &str =
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";

pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";
pub const OCI_LAYER: &str = "application/vnd.oci.image.layer.v1.tar";
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";

/// Docker v2 schema 2 manifest
pub fn docker_manifest() -> MediaType {
    MediaType::Other(DOCKER_MANIFEST.to_string())
}

/// Docker v2 schema 2 image config
pub fn docker_config() -> MediaType {
    MediaType::Other(DOCKER_CONFIG.to_string())
}

/// Docker v2 schema 2 gzip-compressed layer
pub fn docker_layer_gzip() -> MediaType {
    MediaType::Other(DOCKER_LAYER_GZIP.to_string())
}

/// OCI gzip-compressed layer
pub fn oci_layer_gzip() -> MediaType {
    MediaType::ImageLayerGzip
}

/// Category of content a media type denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Manifest,
    Index,
    Config,
    Layer,
    Unknown,
}

/// Classify a media type string
pub fn kind(media_type: &str) -> Kind {
    match media_type {
        OCI_MANIFEST | DOCKER_MANIFEST => Kind::Manifest,
        OCI_INDEX | DOCKER_MANIFEST_LIST => Kind::Index,
        OCI_CONFIG | DOCKER_CONFIG => Kind::Config,
        OCI_LAYER | OCI_LAYER_GZIP | DOCKER_LAYER | DOCKER_LAYER_GZIP | DOCKER_LAYER_FOREIGN
        | DOCKER_LAYER_FOREIGN_GZIP => Kind::Layer,
        _ => Kind::Unknown,
    }
}

/// Compression applied to a layer blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

/// Compression of a layer media type, `None` if it is not a tar layer we can read
pub fn layer_compression(media_type: &str) -> Option<Compression> {
    match media_type {
        OCI_LAYER | DOCKER_LAYER | DOCKER_LAYER_FOREIGN => Some(Compression::None),
        OCI_LAYER_GZIP | DOCKER_LAYER_GZIP | DOCKER_LAYER_FOREIGN_GZIP => Some(Compression::Gzip),
        _ => None,
    }
}
