use crate::{config, error::*};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, io, path::*};
use url::Url;

/// Authentication info stored in filesystem
///
/// Entries are keyed by registry domain and hold `base64(username:password)`,
/// the format docker and podman write to their `auths` sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredAuth {
    auths: HashMap<String, Auth>,
}

impl StoredAuth {
    /// Load authentication info stored by layerpush
    pub fn load() -> Result<Self> {
        let mut auth = StoredAuth::default();
        if let Some(path) = auth_path() {
            auth.append(Self::from_path(&path)?);
        }
        Ok(auth)
    }

    /// Load authentication info with docker and podman setting
    pub fn load_all() -> Result<Self> {
        let mut auth = StoredAuth::default();
        if let Some(path) = docker_auth_path() {
            if let Ok(new) = Self::from_path(&path) {
                auth.append(new);
            }
        }
        if let Some(path) = podman_auth_path() {
            if let Ok(new) = Self::from_path(&path) {
                auth.append(new);
            }
        }
        if let Some(path) = auth_path() {
            auth.append(Self::from_path(&path)?);
        }
        Ok(auth)
    }

    pub fn insert(&mut self, domain: &str, octet: String) {
        self.auths.insert(domain.to_string(), Auth { auth: octet });
    }

    /// Register a username and password for `domain`
    pub fn add(&mut self, domain: &str, username: &str, password: &str) {
        let octet = base64::encode(format!("{}:{}", username, password));
        self.insert(domain, octet);
    }

    /// Encoded credentials for `domain`, as sent in a Basic authorization header
    pub fn get(&self, domain: &str) -> Option<&str> {
        self.auths.get(domain).map(|a| a.auth.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty()
    }

    /// Save to the layerpush auth file
    pub fn save(&self) -> Result<()> {
        let path = auth_path().ok_or(Error::NoValidRuntimeDirectory)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let f = fs::File::create(path).with_path(path)?;
        serde_json::to_writer_pretty(f, self)?;
        Ok(())
    }

    /// Get token based on WWW-Authenticate header
    ///
    /// Credentials registered for `registry` are used first, then those of
    /// the token server's own domain.
    pub fn challenge(&self, registry: &str, challenge: &AuthChallenge) -> Result<String> {
        let token_url = Url::parse(&challenge.url)?;
        let octet = self
            .get(registry)
            .or_else(|| token_url.domain().and_then(|domain| self.get(domain)));

        let mut req = ureq::get(token_url.as_str()).set("Accept", "application/json");
        if let Some(octet) = octet {
            req = req.set("Authorization", &format!("Basic {}", octet))
        }
        req = req
            .query("scope", &challenge.scope)
            .query("service", &challenge.service);
        match req.call() {
            Ok(res) => {
                let token = res.into_json::<Token>()?;
                Ok(token.token)
            }
            Err(ureq::Error::Status(..)) => Err(Error::AuthorizationFailed(token_url.clone())),
            Err(ureq::Error::Transport(e)) => Err(Error::NetworkError(e.into())),
        }
    }

    pub fn append(&mut self, other: Self) {
        for (key, value) in other.auths.into_iter() {
            self.auths.insert(key, value);
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        if path.is_file() {
            let f = fs::File::open(path).with_path(path)?;
            Ok(serde_json::from_reader(io::BufReader::new(f))?)
        } else {
            Ok(Self::default())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Auth {
    auth: String,
}

fn auth_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", config::PROJECT_NAME)
        .and_then(|dirs| Some(dirs.runtime_dir()?.join("auth.json")))
        .or_else(|| {
            // Most of container does not set XDG_RUNTIME_DIR,
            // and then this fallback to `~/.layerpush/config.json` like docker.
            let dirs = directories::BaseDirs::new()?;
            Some(
                dirs.home_dir()
                    .join(format!(".{}", config::PROJECT_NAME))
                    .join("config.json"),
            )
        })
}

fn docker_auth_path() -> Option<PathBuf> {
    let dirs = directories::BaseDirs::new()?;
    Some(dirs.home_dir().join(".docker/config.json"))
}

fn podman_auth_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "containers")?;
    Some(dirs.runtime_dir()?.join("auth.json"))
}

/// WWW-Authenticate challenge
///
/// ```
/// use layerpush::distribution::AuthChallenge;
///
/// let auth = AuthChallenge::from_header(
///   r#"Bearer realm="https://ghcr.io/token",service="ghcr.io",scope="repository:someone/project:pull""#,
/// ).unwrap();
///
/// assert_eq!(auth, AuthChallenge {
///   url: "https://ghcr.io/token".to_string(),
///   service: "ghcr.io".to_string(),
///   scope: "repository:someone/project:pull".to_string(),
/// });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub url: String,
    pub service: String,
    pub scope: String,
}

impl AuthChallenge {
    pub fn from_header(header: &str) -> Result<Self> {
        let err = || Error::UnSupportedAuthHeader(header.to_string());
        let (ty, realm) = header.split_once(' ').ok_or_else(err)?;
        if ty != "Bearer" {
            return Err(err());
        }

        let mut url = None;
        let mut service = None;
        let mut scope = None;
        for param in split_params(realm) {
            let (key, value) = param.split_once('=').ok_or_else(err)?;
            let value = value.trim_matches('"').to_string();
            match key.trim() {
                "realm" => url = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => continue,
            }
        }
        Ok(Self {
            url: url.ok_or_else(err)?,
            service: service.ok_or_else(err)?,
            scope: scope.ok_or_else(err)?,
        })
    }
}

/// Split `key="a,b",key2=c` at commas outside of quotes
///
/// Push scopes look like `repository:name:pull,push`.
fn split_params(input: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                params.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&input[start..]);
    params
}

#[derive(Deserialize)]
struct Token {
    #[serde(alias = "access_token")]
    token: String,
}
