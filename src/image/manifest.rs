//! Descriptors, image config and manifest construction
//!
//! Every function here is pure: the same inputs produce byte-identical JSON
//! and therefore the same digest. A [Schema] bundles one choice of each
//! function, so that Docker v2 schema 2 and OCI flavoured images share the
//! assembly logic in [crate::image::ImageOptions].

use crate::{digest::Digest, error::*, image::Layer, media_types};
use chrono::{DateTime, SecondsFormat, Utc};
use oci_spec::image::{
    Arch, Descriptor, DescriptorBuilder, HistoryBuilder, ImageConfigurationBuilder, MediaType, Os,
    RootFsBuilder,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image manifest
///
/// [oci_spec::image::ImageManifest] keeps annotations in a `HashMap`, whose
/// serialization order is not stable. This keeps them sorted so that the
/// manifest digest is a function of its content only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Manifest {
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(buf)?)
    }
}

/// Build the descriptor of a layer, over its compressed blob
pub type MakeLayerDescriptor = fn(&Layer) -> Result<Descriptor>;
/// Serialize an image config listing `diff_ids` in order, and describe it
pub type MakeConfig = fn(&[Digest], &ConfigOptions) -> Result<(Vec<u8>, Descriptor)>;
/// Serialize a manifest referring to the config and layers, and describe it
pub type MakeManifest =
    fn(&Descriptor, &[Descriptor], Option<&BTreeMap<String, String>>) -> Result<(Vec<u8>, Descriptor)>;

/// A set of descriptor makers defining the flavour of the produced image
#[derive(Clone, Copy)]
pub struct Schema {
    /// Media type given to layers built for this schema
    pub layer_media_type: fn() -> MediaType,
    pub layer_descriptor: MakeLayerDescriptor,
    pub config: MakeConfig,
    pub manifest: MakeManifest,
}

impl Schema {
    /// Docker image manifest v2 schema 2, accepted by every major registry
    pub fn docker_v2s2() -> Self {
        Schema {
            layer_media_type: media_types::docker_layer_gzip,
            layer_descriptor,
            config: docker_v2s2_config,
            manifest: docker_v2s2_manifest,
        }
    }

    /// OCI image manifest
    pub fn oci() -> Self {
        Schema {
            layer_media_type: media_types::oci_layer_gzip,
            layer_descriptor,
            config: oci_config,
            manifest: oci_manifest,
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::docker_v2s2()
    }
}

/// Optional fields of the image config
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOptions {
    pub os: Os,
    pub architecture: Arch,
    /// Recorded as `created_by` of the single history entry
    pub created_by: String,
    /// Creation time. Left unset by default to keep the config reproducible.
    pub created: Option<DateTime<Utc>>,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        ConfigOptions {
            os: Os::Linux,
            architecture: Arch::Amd64,
            created_by: crate::config::PROJECT_NAME.to_string(),
            created: None,
        }
    }
}

/// Hash `buf` and describe it with `media_type`
pub fn describe(media_type: MediaType, buf: &[u8]) -> Result<Descriptor> {
    let digest = Digest::from_buf_sha256(buf);
    let size = i64::try_from(buf.len()).map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(DescriptorBuilder::default()
        .media_type(media_type)
        .digest(digest.to_string())
        .size(size)
        .build()?)
}

pub fn layer_descriptor(layer: &Layer) -> Result<Descriptor> {
    describe(layer.media_type.clone(), &layer.blob)
}

fn make_config(
    media_type: MediaType,
    diff_ids: &[Digest],
    options: &ConfigOptions,
) -> Result<(Vec<u8>, Descriptor)> {
    let rootfs = RootFsBuilder::default()
        .typ("layers")
        .diff_ids(diff_ids.iter().map(|d| d.to_string()).collect::<Vec<_>>())
        .build()?;
    let mut history = HistoryBuilder::default().created_by(options.created_by.clone());
    let mut builder = ImageConfigurationBuilder::default()
        .os(options.os.clone())
        .architecture(options.architecture.clone())
        .rootfs(rootfs);
    if let Some(created) = options.created {
        let created = created.to_rfc3339_opts(SecondsFormat::Secs, true);
        history = history.created(created.clone());
        builder = builder.created(created);
    }
    let config = builder.history(vec![history.build()?]).build()?;
    let buf = serde_json::to_vec(&config)?;
    let desc = describe(media_type, &buf)?;
    Ok((buf, desc))
}

pub fn docker_v2s2_config(diff_ids: &[Digest], options: &ConfigOptions) -> Result<(Vec<u8>, Descriptor)> {
    make_config(media_types::docker_config(), diff_ids, options)
}

pub fn oci_config(diff_ids: &[Digest], options: &ConfigOptions) -> Result<(Vec<u8>, Descriptor)> {
    make_config(MediaType::ImageConfig, diff_ids, options)
}

fn make_manifest(
    media_type: MediaType,
    config: &Descriptor,
    layers: &[Descriptor],
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<(Vec<u8>, Descriptor)> {
    let manifest = Manifest {
        schema_version: 2,
        media_type: Some(media_type.clone()),
        config: config.clone(),
        layers: layers.to_vec(),
        annotations: annotations.filter(|a| !a.is_empty()).cloned(),
    };
    let buf = serde_json::to_vec(&manifest)?;
    let desc = describe(media_type, &buf)?;
    Ok((buf, desc))
}

pub fn docker_v2s2_manifest(
    config: &Descriptor,
    layers: &[Descriptor],
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<(Vec<u8>, Descriptor)> {
    make_manifest(media_types::docker_manifest(), config, layers, annotations)
}

pub fn oci_manifest(
    config: &Descriptor,
    layers: &[Descriptor],
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<(Vec<u8>, Descriptor)> {
    make_manifest(MediaType::ImageManifest, config, layers, annotations)
}
