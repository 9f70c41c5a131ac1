use crate::{
    distribution::{AuthChallenge, Name, StoredAuth},
    error::*,
    media_types, Digest, ImageName,
};
use oci_spec::{distribution::ErrorCode, image::Descriptor};
use std::io::Read;
use url::Url;

/// A client for `/v2/<name>/` API endpoint
pub struct Client {
    agent: ureq::Agent,
    /// URL to registry server
    url: Url,
    /// Name of repository
    name: Name,
    /// Authentication info used to answer challenges
    auth: StoredAuth,
    /// Cached `Authorization` header value
    authorization: Option<String>,
}

/// Media types accepted when fetching manifests
const MANIFEST_ACCEPT: [&str; 4] = [
    media_types::DOCKER_MANIFEST,
    media_types::OCI_MANIFEST,
    media_types::DOCKER_MANIFEST_LIST,
    media_types::OCI_INDEX,
];

impl Client {
    pub fn new(url: Url, name: Name, auth: StoredAuth) -> Self {
        Client {
            agent: ureq::Agent::new(),
            url,
            name,
            auth,
            authorization: None,
        }
    }

    pub fn from_image_name(image: &ImageName, auth: StoredAuth) -> Result<Self> {
        Ok(Self::new(image.registry_url()?, image.name.clone(), auth))
    }

    fn domain(&self) -> String {
        match self.url.port() {
            Some(port) => format!("{}:{}", self.url.host_str().unwrap_or_default(), port),
            None => self.url.host_str().unwrap_or_default().to_string(),
        }
    }

    fn authorized(&self, req: ureq::Request) -> ureq::Request {
        match &self.authorization {
            Some(value) => req.set("Authorization", value),
            None => req,
        }
    }

    /// Answer a `401 Unauthorized` and cache the resulting header value
    fn authorize(&mut self, res: ureq::Response) -> Result<()> {
        let url = Url::parse(res.get_url())?;
        let header = res
            .header("www-authenticate")
            .ok_or(Error::AuthorizationFailed(url.clone()))?
            .to_string();
        let domain = self.domain();
        if header.starts_with("Basic") {
            let octet = self.auth.get(&domain).ok_or(Error::AuthorizationFailed(url))?;
            self.authorization = Some(format!("Basic {}", octet));
        } else {
            let challenge = AuthChallenge::from_header(&header)?;
            let token = self.auth.challenge(&domain, &challenge)?;
            self.authorization = Some(format!("Bearer {}", token));
        }
        Ok(())
    }

    /// Send a request without body, answering one authentication challenge
    fn call(&mut self, req: ureq::Request) -> Result<ureq::Response> {
        match self.authorized(req.clone()).call() {
            Err(ureq::Error::Status(401, res)) => {
                self.authorize(res)?;
                Ok(self.authorized(req).call()?)
            }
            res => Ok(res?),
        }
    }

    fn send_bytes(&mut self, req: ureq::Request, body: &[u8]) -> Result<ureq::Response> {
        match self.authorized(req.clone()).send_bytes(body) {
            Err(ureq::Error::Status(401, res)) => {
                self.authorize(res)?;
                Ok(self.authorized(req).send_bytes(body)?)
            }
            res => Ok(res?),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.url.join(&format!("/v2/{}/{}", self.name, path))?)
    }

    fn location(&self, res: &ureq::Response) -> Result<Url> {
        let loc = res
            .header("Location")
            .ok_or_else(|| Error::MissingLocation(res.get_url().to_string()))?;
        Ok(Url::parse(loc).or_else(|_| self.url.join(loc))?)
    }

    /// Get manifest for given tag or digest
    ///
    /// ```text
    /// GET /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// Returns the raw bytes together with the media type the registry declared.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-manifests) for detail.
    pub fn get_manifest(&mut self, reference: &str) -> Result<(Vec<u8>, String)> {
        let url = self.endpoint(&format!("manifests/{}", reference))?;
        log::info!("GET {}", url);
        let req = self
            .agent
            .get(url.as_str())
            .set("Accept", &MANIFEST_ACCEPT.join(", "));
        let res = self.call(req).map_err(|e| {
            if is_unknown_manifest(&e) {
                Error::ManifestNotFound(format!("{}:{}", self.name, reference))
            } else {
                e
            }
        })?;
        let media_type = res.content_type().to_string();
        let mut buf = Vec::new();
        res.into_reader().read_to_end(&mut buf)?;
        Ok((buf, media_type))
    }

    /// Push manifest to registry
    ///
    /// ```text
    /// PUT /v2/<name>/manifests/<reference>
    /// ```
    ///
    /// Manifest must be pushed after blobs are updated.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pushing-manifests) for detail.
    pub fn push_manifest(&mut self, reference: &str, media_type: &str, buf: &[u8]) -> Result<Url> {
        let url = self.endpoint(&format!("manifests/{}", reference))?;
        log::info!("PUT {}", url);
        let req = self.agent.put(url.as_str()).set("Content-Type", media_type);
        let res = self.send_bytes(req, buf)?;
        self.location(&res).or_else(|_| Ok(url))
    }

    /// Get blob for given digest
    ///
    /// ```text
    /// GET /v2/<name>/blobs/<digest>
    /// ```
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pulling-blobs) for detail.
    pub fn get_blob(&mut self, digest: &Digest) -> Result<Box<dyn Read + Send + Sync>> {
        let url = self.endpoint(&format!("blobs/{}", digest))?;
        log::info!("GET {}", url);
        let req = self.agent.get(url.as_str());
        Ok(self.call(req)?.into_reader())
    }

    /// Whether the registry already has the blob
    ///
    /// ```text
    /// HEAD /v2/<name>/blobs/<digest>
    /// ```
    pub fn has_blob(&mut self, digest: &Digest) -> Result<bool> {
        let url = self.endpoint(&format!("blobs/{}", digest))?;
        let req = self.agent.head(url.as_str());
        match self.call(req) {
            Ok(_) => Ok(true),
            Err(Error::UnexpectedStatus { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Push blob to registry in a single request
    ///
    /// ```text
    /// POST /v2/<name>/blobs/uploads/
    /// ```
    ///
    /// and following `PUT` to URL obtained by `POST`.
    ///
    /// See [corresponding OCI distribution spec document](https://github.com/opencontainers/distribution-spec/blob/main/spec.md#pushing-blobs) for detail.
    pub fn push_blob(&mut self, desc: &Descriptor, blob: &mut dyn Read) -> Result<Url> {
        let url = self.endpoint("blobs/uploads/")?;
        log::info!("POST {}", url);
        let req = self.agent.post(url.as_str());
        let res = self.send_bytes(req, &[])?;
        let url = self.location(&res)?;

        log::info!("PUT {}", url);
        // Authorization must be done while the first POST
        let req = self
            .authorized(self.agent.put(url.as_str()))
            .query("digest", desc.digest())
            .set("Content-Length", &desc.size().to_string())
            .set("Content-Type", "application/octet-stream");
        let res = req.send(blob)?;
        self.location(&res)
    }
}

/// 404, or an error body saying the repository or manifest is unknown
fn is_unknown_manifest(e: &Error) -> bool {
    match e {
        Error::UnexpectedStatus { status, .. } => *status == 404,
        Error::RegistryError(res) => res.errors().iter().any(|info| {
            matches!(
                info.code(),
                ErrorCode::ManifestUnknown | ErrorCode::NameUnknown
            )
        }),
        _ => false,
    }
}
