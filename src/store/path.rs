use crate::error::{Error, Result};

/// Normalizes a repository-relative manifest path so it can serve as a natural key.
///
/// `/catalog//payments.yaml/` and `catalog/payments.yaml` map to the same key.
pub fn normalize_manifest_path(path: &str) -> Result<String> {
    let path = path.trim();

    let segments: Vec<&str> = path
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments.is_empty() {
        return Err(Error::BadRequest("Manifest path cannot be empty".to_string()));
    }

    for segment in &segments {
        validate_segment(segment)?;
    }

    Ok(segments.join("/"))
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment == "." || segment == ".." {
        return Err(Error::BadRequest(
            "Manifest path cannot contain relative segments".to_string(),
        ));
    }

    if segment.len() > 255 {
        return Err(Error::BadRequest(
            "Path segment cannot exceed 255 characters".to_string(),
        ));
    }

    const INVALID_CHARS: &[char] = &['\0', '\n', '\r', '\\'];
    if segment.chars().any(|c| INVALID_CHARS.contains(&c)) {
        return Err(Error::BadRequest(
            "Path segment contains invalid characters".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_manifest_path_basic() {
        assert_eq!(
            normalize_manifest_path("catalog/payments.yaml").unwrap(),
            "catalog/payments.yaml"
        );
        assert_eq!(
            normalize_manifest_path("/catalog/payments.yaml").unwrap(),
            "catalog/payments.yaml"
        );
        assert_eq!(
            normalize_manifest_path("  catalog/payments.yaml/ ").unwrap(),
            "catalog/payments.yaml"
        );
    }

    #[test]
    fn test_normalize_manifest_path_collapses_slashes() {
        assert_eq!(
            normalize_manifest_path("//catalog//teams//search.yaml").unwrap(),
            "catalog/teams/search.yaml"
        );
    }

    #[test]
    fn test_normalize_manifest_path_rejects_bad_input() {
        assert!(normalize_manifest_path("").is_err());
        assert!(normalize_manifest_path("/").is_err());
        assert!(normalize_manifest_path("catalog/../secrets.yaml").is_err());
        assert!(normalize_manifest_path("./catalog.yaml").is_err());
        assert!(normalize_manifest_path("catalog\\x.yaml").is_err());
    }
}
