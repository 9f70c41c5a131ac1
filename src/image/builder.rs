use crate::{
    error::*,
    image::{
        annotations::{self, Annotations},
        layer::{diff_ids, Layer, LayerBuilder},
        manifest::{ConfigOptions, Schema},
        ImageDescriptor,
    },
    store::Store,
};

/// Options of the image built from layers
#[derive(Clone, Default)]
pub struct ImageOptions {
    pub schema: Schema,
    pub config: ConfigOptions,
    pub annotations: Annotations,
}

impl ImageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// OCI media types instead of Docker v2 schema 2
    pub fn oci(mut self) -> Self {
        self.schema = Schema::oci();
        self
    }

    pub fn config(mut self, config: ConfigOptions) -> Self {
        self.config = config;
        self
    }

    pub fn annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn annotate(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Layer builder producing the layer media type of this schema
    pub fn layer_builder(&self) -> LayerBuilder {
        LayerBuilder::new().media_type((self.schema.layer_media_type)())
    }

    /// Write `layers`, their config and a manifest into `store`
    ///
    /// Layers are written in the order given, then the config, then the
    /// manifest, so that everything a descriptor refers to is in the store
    /// before the descriptor itself. Stops at the first failed write.
    pub fn build_image<S: Store + ?Sized>(
        &self,
        reference: &str,
        store: &mut S,
        layers: &[Layer],
    ) -> Result<ImageDescriptor> {
        let mut layer_descs = Vec::with_capacity(layers.len());
        for layer in layers {
            let desc = (self.schema.layer_descriptor)(layer)?;
            log::info!(
                "Layer {} {} ({} bytes)",
                layer.name,
                desc.digest(),
                desc.size()
            );
            store.write(reference, &desc, &layer.blob)?;
            layer_descs.push(desc);
        }

        let (config_buf, config) = (self.schema.config)(&diff_ids(layers), &self.config)?;
        store.write(reference, &config, &config_buf)?;

        let mut annotations = self.annotations.clone();
        if let Some(created) = self.config.created {
            annotations::set_created(&mut annotations, created);
        }
        let (manifest_buf, manifest) =
            (self.schema.manifest)(&config, &layer_descs, Some(&annotations))?;
        store.write(reference, &manifest, &manifest_buf)?;
        log::info!("Manifest {}", manifest.digest());

        Ok(ImageDescriptor::new(manifest, config, layer_descs))
    }
}
