use thiserror::Error;

use super::document::CatalogDocument;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("manifest is not valid UTF-8")]
    NotUtf8,

    #[error("manifest is empty")]
    Empty,

    #[error("malformed manifest: {0}")]
    Syntax(String),
}

/// Parses raw manifest bytes. Structural only: required fields are checked by the validator.
pub fn parse_manifest(bytes: &[u8]) -> Result<CatalogDocument, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;
    parse_manifest_str(text)
}

pub fn parse_manifest_str(text: &str) -> Result<CatalogDocument, ParseError> {
    let has_content = text
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#') && line != "---");
    if !has_content {
        return Err(ParseError::Empty);
    }

    let value: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
    CatalogDocument::from_value(value).map_err(|e| ParseError::Syntax(e.to_string()))
}
