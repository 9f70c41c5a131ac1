use crate::{
    distribution::{Client, StoredAuth},
    error::*,
    image::manifest::describe,
    media_types::{self, Kind},
    remotes::{Fetcher, Pusher, Resolver},
    Digest, ImageName,
};
use oci_spec::image::{Descriptor, MediaType};
use std::{
    io::{Cursor, Read},
    path::Path,
};

/// [Resolver] speaking the OCI distribution API
///
/// Credentials are given at construction and shared by every client created
/// for a reference.
#[derive(Debug, Clone, Default)]
pub struct RegistryResolver {
    auth: StoredAuth,
}

impl RegistryResolver {
    pub fn new(auth: StoredAuth) -> Self {
        RegistryResolver { auth }
    }

    /// Resolver with credentials stored by docker, podman and layerpush
    pub fn from_stored_auth() -> Result<Self> {
        Ok(Self::new(StoredAuth::load_all()?))
    }

    pub fn add_basic_auth(&mut self, domain: &str, username: &str, password: &str) {
        self.auth.add(domain, username, password);
    }

    /// Merge credentials of a docker style `config.json`, overriding earlier ones
    pub fn add_auth_file(&mut self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(Error::NotFound(path.to_owned()));
        }
        self.auth.append(StoredAuth::from_path(path)?);
        Ok(())
    }

    fn client(&self, reference: &str) -> Result<(Client, ImageName)> {
        let name = ImageName::parse(reference)?;
        let client = Client::from_image_name(&name, self.auth.clone())?;
        Ok((client, name))
    }
}

impl Resolver for RegistryResolver {
    fn resolve(&self, reference: &str) -> Result<Descriptor> {
        let (mut client, name) = self.client(reference)?;
        let (buf, media_type) = client.get_manifest(name.reference.as_str())?;
        let media_type = manifest_media_type(&media_type, &buf)?;
        describe(media_type, &buf)
    }

    fn pusher(&self, reference: &str) -> Result<Box<dyn Pusher>> {
        let (client, name) = self.client(reference)?;
        Ok(Box::new(RegistryPusher {
            client,
            tag: name.reference.to_string(),
        }))
    }

    fn fetcher(&self, reference: &str) -> Result<Box<dyn Fetcher>> {
        let (client, _) = self.client(reference)?;
        Ok(Box::new(RegistryFetcher { client }))
    }
}

/// Media type of a manifest, from the response header or the `mediaType` field
fn manifest_media_type(content_type: &str, buf: &[u8]) -> Result<MediaType> {
    let content_type = content_type.split(';').next().unwrap_or_default().trim();
    if matches!(media_types::kind(content_type), Kind::Manifest | Kind::Index) {
        return Ok(MediaType::from(content_type));
    }
    #[derive(serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Header {
        media_type: Option<String>,
    }
    let header: Header = serde_json::from_slice(buf)?;
    match header.media_type {
        Some(media_type) => Ok(MediaType::from(media_type.as_str())),
        // OCI manifests may omit `mediaType`
        None => Ok(MediaType::ImageManifest),
    }
}

struct RegistryPusher {
    client: Client,
    tag: String,
}

impl Pusher for RegistryPusher {
    fn push(&mut self, desc: &Descriptor, content: &mut dyn Read) -> Result<()> {
        let media_type = desc.media_type().to_string();
        match media_types::kind(&media_type) {
            Kind::Manifest | Kind::Index => {
                let mut buf = Vec::new();
                content.read_to_end(&mut buf)?;
                self.client.push_manifest(&self.tag, &media_type, &buf)?;
            }
            _ => {
                let digest = Digest::from_descriptor(desc)?;
                if self.client.has_blob(&digest)? {
                    log::info!("Blob {} already exists", digest);
                } else {
                    self.client.push_blob(desc, content)?;
                }
            }
        }
        Ok(())
    }
}

struct RegistryFetcher {
    client: Client,
}

impl Fetcher for RegistryFetcher {
    fn fetch(&mut self, desc: &Descriptor) -> Result<Box<dyn Read>> {
        let digest = Digest::from_descriptor(desc)?;
        match media_types::kind(&desc.media_type().to_string()) {
            Kind::Manifest | Kind::Index => {
                let (buf, _) = self.client.get_manifest(&digest.to_string())?;
                Ok(Box::new(Cursor::new(buf)))
            }
            _ => {
                let reader: Box<dyn Read> = self.client.get_blob(&digest)?;
                Ok(reader)
            }
        }
    }
}
