use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::types::{Dependencies, Environment, Link};

pub const API_VERSION: &str = "catalog.portal/v1";
pub const KIND: &str = "Project";

/// Unknown keys kept verbatim so newer manifests survive a round trip.
pub type Extra = BTreeMap<String, Value>;

const DOCUMENT_KEYS: &[&str] = &["apiVersion", "kind", "metadata", "spec"];
const METADATA_KEYS: &[&str] = &["name", "title", "description", "tags", "owner", "links"];
const SPEC_KEYS: &[&str] = &["services"];
const SERVICE_KEYS: &[&str] = &[
    "name",
    "title",
    "description",
    "language",
    "environment",
    "repository",
    "owner",
    "tags",
    "links",
    "dependencies",
];

/// One manifest file as parsed, before any validation.
///
/// Every member is optional so that a structurally valid but incomplete
/// manifest reaches the validator, which reports all missing fields at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: ProjectMetadata,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spec: CatalogSpec,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSpec {
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<ServiceEntry>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Environment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Overrides the project owner for this service only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Dependencies::is_empty")]
    pub dependencies: Dependencies,
    #[serde(flatten)]
    pub extra: Extra,
}

impl CatalogDocument {
    /// Builds a document from a parsed YAML tree.
    ///
    /// Unknown keys are lifted out of each mapping before the typed fields
    /// are read, so values serde cannot buffer (such as `!Tag` scalars) are
    /// kept in `extra` instead of failing the parse.
    pub fn from_value(mut value: Value) -> Result<Self, serde_yaml::Error> {
        let extra = take_unknown(&mut value, DOCUMENT_KEYS);
        let metadata_extra = value
            .get_mut("metadata")
            .map(|metadata| take_unknown(metadata, METADATA_KEYS))
            .unwrap_or_default();

        let mut spec_extra = Extra::new();
        let mut service_extras = Vec::new();
        if let Some(spec) = value.get_mut("spec") {
            spec_extra = take_unknown(spec, SPEC_KEYS);
            if let Some(Value::Sequence(entries)) = spec.get_mut("services") {
                service_extras = entries
                    .iter_mut()
                    .map(|entry| take_unknown(entry, SERVICE_KEYS))
                    .collect();
            }
        }

        let mut document: CatalogDocument = serde_yaml::from_value(value)?;
        document.extra = extra;
        document.metadata.extra = metadata_extra;
        document.spec.extra = spec_extra;
        for (service, extra) in document.spec.services.iter_mut().zip(service_extras) {
            service.extra = extra;
        }
        Ok(document)
    }

    pub fn project_name(&self) -> Option<&str> {
        non_empty(self.metadata.name.as_deref())
    }

    /// Names of all declared services, in document order, skipping blanks.
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.spec
            .services
            .iter()
            .filter_map(|s| non_empty(s.name.as_deref()))
    }
}

impl ServiceEntry {
    /// YAML rendering of this entry, stored as the service's audit snapshot.
    pub fn snapshot(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Returns the trimmed value if it is present and not blank.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Removes the entries of a mapping whose key is not in `known`.
fn take_unknown(value: &mut Value, known: &[&str]) -> Extra {
    let Value::Mapping(mapping) = value else {
        return Extra::new();
    };

    let unknown: Vec<Value> = mapping
        .keys()
        .filter(|key| !key.as_str().is_some_and(|key| known.contains(&key)))
        .cloned()
        .collect();

    let mut extra = Extra::new();
    for key in unknown {
        if let Some(entry) = mapping.remove(&key) {
            extra.insert(key_text(&key), entry);
        }
    }
    extra
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Treats an explicit YAML `null` (e.g. `metadata:` with nothing under it) as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
