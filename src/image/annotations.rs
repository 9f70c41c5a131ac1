//! Manifest annotations read from TOML
//!
//! Nested tables are flattened into dotted keys, so that the pre-defined
//! annotations of the OCI image spec can be written as
//!
//! ```
//! use layerpush::image::annotations;
//!
//! let a = annotations::from_toml(
//!     r#"
//!     [org.opencontainers.image]
//!     url = "https://github.com/example/project"
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(
//!     a["org.opencontainers.image.url"],
//!     "https://github.com/example/project"
//! );
//! ```

use crate::error::*;
use chrono::{DateTime, SecondsFormat, Utc};
use oci_spec::image::ANNOTATION_CREATED;
use std::{collections::BTreeMap, fs, path::Path};
use toml::Value;

pub type Annotations = BTreeMap<String, String>;

pub fn from_toml(input: &str) -> Result<Annotations> {
    let root: toml::value::Table = toml::from_str(input)?;
    let mut out = Annotations::new();
    for (key, value) in root {
        flatten(key, value, &mut out);
    }
    Ok(out)
}

/// Read annotations from a TOML file
pub fn load(path: &Path) -> Result<Annotations> {
    let input = fs::read_to_string(path).with_path(path)?;
    from_toml(&input)
}

fn flatten(key: String, value: Value, out: &mut Annotations) {
    match value {
        Value::Table(table) => {
            for (k, v) in table {
                flatten(format!("{}.{}", key, k), v, out);
            }
        }
        Value::String(s) => {
            out.insert(key, s);
        }
        Value::Integer(i) => {
            out.insert(key, i.to_string());
        }
        Value::Float(f) => {
            out.insert(key, f.to_string());
        }
        Value::Boolean(b) => {
            out.insert(key, b.to_string());
        }
        Value::Datetime(d) => {
            out.insert(key, d.to_string());
        }
        Value::Array(a) => {
            // Annotation values are plain strings, keep arrays as JSON
            let json = serde_json::to_string(&a).unwrap_or_default();
            out.insert(key, json);
        }
    }
}

/// Set `org.opencontainers.image.created` unless already given
pub fn set_created(annotations: &mut Annotations, created: DateTime<Utc>) {
    annotations
        .entry(ANNOTATION_CREATED.to_string())
        .or_insert_with(|| created.to_rfc3339_opts(SecondsFormat::Secs, true));
}
