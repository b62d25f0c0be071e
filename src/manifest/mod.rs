//! Manifest documents: the YAML shape, parsing and validation.

mod document;
mod parser;
mod validate;

pub(crate) use document::non_empty;
pub use document::{
    API_VERSION, CatalogDocument, CatalogSpec, Extra, KIND, ProjectMetadata, ServiceEntry,
};
pub use parser::{ParseError, parse_manifest, parse_manifest_str};
pub use validate::validate;
