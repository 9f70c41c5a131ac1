use crate::error::*;
use regex::Regex;
use std::{fmt, ops::Deref};
use url::Url;

const DOCKER_HUB: &str = "registry-1.docker.io";

lazy_static::lazy_static! {
    // `<name>` and tag-form `<reference>` grammars of the OCI distribution spec
    static ref NAME_RE: Regex = Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$").unwrap();
    static ref TAG_RE: Regex = Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap();
}

/// Repository path inside a registry, e.g. `library/ubuntu`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(String);

/// Tag of an image, at most 128 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference(String);

macro_rules! checked_str {
    ($ty:ident, $re:ident, $err:ident) => {
        impl $ty {
            pub fn new(s: &str) -> Result<Self> {
                if $re.is_match(s) {
                    Ok($ty(s.to_string()))
                } else {
                    Err(Error::$err(s.to_string()))
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $ty {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

checked_str!(Name, NAME_RE, InvalidName);
checked_str!(Reference, TAG_RE, InvalidReference);

/// Reference string of an image, e.g. `example.com:5000/repo/name:tag`
///
/// The domain defaults to `registry-1.docker.io` and the tag to `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    pub hostname: String,
    pub port: Option<u16>,
    pub name: Name,
    pub reference: Reference,
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(port) = self.port {
            write!(
                f,
                "{}:{}/{}:{}",
                self.hostname, port, self.name, self.reference
            )
        } else {
            write!(f, "{}/{}:{}", self.hostname, self.name, self.reference)
        }
    }
}

impl ImageName {
    pub fn parse(name: &str) -> Result<Self> {
        let (hostname, name) = match name.split_once('/') {
            // `user/repo` on Docker Hub has no dot or port in the first component
            Some((head, rest)) if head.contains('.') || head.contains(':') || head == "localhost" => {
                (head, rest)
            }
            _ => (DOCKER_HUB, name),
        };
        let (hostname, port) = if let Some((hostname, port)) = hostname.split_once(':') {
            (hostname, Some(str::parse(port)?))
        } else {
            (hostname, None)
        };
        let (name, reference) = name.split_once(':').unwrap_or((name, "latest"));
        // Official images on Docker Hub live under `library/`
        let name = if hostname == DOCKER_HUB && !name.contains('/') {
            format!("library/{}", name)
        } else {
            name.to_string()
        };
        Ok(ImageName {
            hostname: hostname.to_string(),
            port,
            name: Name::new(&name)?,
            reference: Reference::new(reference)?,
        })
    }

    /// URL of the registry API root
    pub fn registry_url(&self) -> Result<Url> {
        let hostname = if let Some(port) = self.port {
            format!("{}:{}", self.hostname, port)
        } else {
            self.hostname.clone()
        };
        let url = if self.hostname.starts_with("localhost") {
            format!("http://{}", hostname)
        } else {
            format!("https://{}", hostname)
        };
        Ok(Url::parse(&url)?)
    }
}
