//! Pull and Push images to OCI registry based on [OCI distribution specification](https://github.com/opencontainers/distribution-spec)

mod auth;
mod client;
mod resolver;

pub use auth::*;
pub use client::Client;
pub use crate::image_name::{Name, Reference};
pub use resolver::RegistryResolver;
