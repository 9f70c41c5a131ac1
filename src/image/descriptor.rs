use crate::media_types::{self, Kind};
use oci_spec::image::Descriptor;

/// Descriptors making up one image
///
/// Built by [crate::image::ImageOptions::build_image] after assembly, or by [ImageDescriptor::classify]
/// from the descriptors visited while fetching. `layers` keeps manifest order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageDescriptor {
    pub manifest: Option<Descriptor>,
    pub index: Option<Descriptor>,
    pub config: Option<Descriptor>,
    pub layers: Vec<Descriptor>,
    pub unknown: Vec<Descriptor>,
}

impl ImageDescriptor {
    /// Descriptors of a freshly assembled image
    pub fn new(manifest: Descriptor, config: Descriptor, layers: Vec<Descriptor>) -> Self {
        ImageDescriptor {
            manifest: Some(manifest),
            config: Some(config),
            layers,
            ..Default::default()
        }
    }

    /// Bucket descriptors by media type
    ///
    /// Returns `None` for an empty input. Each descriptor lands in exactly one
    /// bucket. Manifest, index and config hold a single descriptor; a second one
    /// of the same kind is kept in `unknown` rather than dropped.
    pub fn classify(descs: impl IntoIterator<Item = Descriptor>) -> Option<Self> {
        let mut descs = descs.into_iter().peekable();
        descs.peek()?;
        let mut image = ImageDescriptor::default();
        for desc in descs {
            let slot = match media_types::kind(&desc.media_type().to_string()) {
                Kind::Manifest => &mut image.manifest,
                Kind::Index => &mut image.index,
                Kind::Config => &mut image.config,
                Kind::Layer => {
                    image.layers.push(desc);
                    continue;
                }
                Kind::Unknown => {
                    image.unknown.push(desc);
                    continue;
                }
            };
            if slot.is_none() {
                *slot = Some(desc);
            } else {
                image.unknown.push(desc);
            }
        }
        Some(image)
    }

    /// Total number of descriptors held
    pub fn len(&self) -> usize {
        self.manifest.iter().count()
            + self.index.iter().count()
            + self.config.iter().count()
            + self.layers.len()
            + self.unknown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
