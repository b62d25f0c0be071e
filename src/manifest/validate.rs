use std::collections::HashMap;

use super::document::{API_VERSION, CatalogDocument, KIND, non_empty};
use crate::types::ValidationError;

/// Checks a parsed manifest and returns every problem found, in rule order.
///
/// Rules never short-circuit each other; an empty result means the document
/// may be handed to reconciliation.
pub fn validate(doc: &CatalogDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_markers(doc, &mut errors);
    check_project(doc, &mut errors);

    if doc.spec.services.is_empty() {
        errors.push(ValidationError::new(
            "spec.services",
            "at least one service is required",
        ));
    }

    for (i, service) in doc.spec.services.iter().enumerate() {
        if non_empty(service.name.as_deref()).is_none() {
            errors.push(ValidationError::new(
                format!("spec.services[{i}].name"),
                "is required",
            ));
        }
        if non_empty(service.title.as_deref()).is_none() {
            errors.push(ValidationError::new(
                format!("spec.services[{i}].title"),
                "is required",
            ));
        }
    }

    check_duplicate_services(doc, &mut errors);

    errors
}

fn check_markers(doc: &CatalogDocument, errors: &mut Vec<ValidationError>) {
    for (field, actual, expected) in [
        ("apiVersion", doc.api_version.as_deref(), API_VERSION),
        ("kind", doc.kind.as_deref(), KIND),
    ] {
        match actual {
            Some(value) if value == expected => {}
            Some(value) => errors.push(ValidationError::new(
                field,
                format!("expected \"{expected}\", found \"{value}\""),
            )),
            None => errors.push(ValidationError::new(
                field,
                format!("is required and must be \"{expected}\""),
            )),
        }
    }
}

fn check_project(doc: &CatalogDocument, errors: &mut Vec<ValidationError>) {
    let metadata = &doc.metadata;

    match non_empty(metadata.name.as_deref()) {
        None => errors.push(ValidationError::new("metadata.name", "is required")),
        Some(name) if !is_kebab_case(name) => errors.push(ValidationError::new(
            "metadata.name",
            format!("\"{name}\" must be kebab-case (lowercase letters, digits and single hyphens)"),
        )),
        Some(_) => {}
    }
    if non_empty(metadata.title.as_deref()).is_none() {
        errors.push(ValidationError::new("metadata.title", "is required"));
    }
    if non_empty(metadata.owner.as_deref()).is_none() {
        errors.push(ValidationError::new("metadata.owner", "is required"));
    }
}

/// Reports the second and later occurrences of a name against their own index.
fn check_duplicate_services(doc: &CatalogDocument, errors: &mut Vec<ValidationError>) {
    let mut first_seen: HashMap<&str, usize> = HashMap::new();

    for (i, service) in doc.spec.services.iter().enumerate() {
        let Some(name) = non_empty(service.name.as_deref()) else {
            continue;
        };
        match first_seen.get(name) {
            Some(first) => errors.push(ValidationError::new(
                format!("spec.services[{i}].name"),
                format!("duplicate service name \"{name}\" (first declared at spec.services[{first}])"),
            )),
            None => {
                first_seen.insert(name, i);
            }
        }
    }
}

fn is_kebab_case(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parse_manifest_str;

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_valid_manifest_has_no_errors() {
        let doc = parse_manifest_str(
            r#"
apiVersion: catalog.portal/v1
kind: Project
metadata: { name: search, title: Search, owner: Discovery }
spec:
  services:
    - { name: search-api, title: Search API }
"#,
        )
        .unwrap();
        assert!(validate(&doc).is_empty());
    }

    #[test]
    fn test_collects_owner_and_duplicate_errors_together() {
        let doc = parse_manifest_str(
            r#"
apiVersion: catalog.portal/v1
kind: Project
metadata: { name: payments-platform, title: Payments }
spec:
  services:
    - { name: payments-api, title: API }
    - { name: payments-api, title: API again }
"#,
        )
        .unwrap();

        let errors = validate(&doc);
        assert_eq!(fields(&errors), vec!["metadata.owner", "spec.services[1].name"]);
        assert!(errors[1].message.contains("spec.services[0]"));
    }

    #[test]
    fn test_every_later_duplicate_is_reported() {
        let doc = parse_manifest_str(
            r#"
apiVersion: catalog.portal/v1
kind: Project
metadata: { name: p, title: P, owner: T }
spec:
  services:
    - { name: a, title: A }
    - { name: b, title: B }
    - { name: a, title: A2 }
    - { name: a, title: A3 }
"#,
        )
        .unwrap();

        assert_eq!(
            fields(&validate(&doc)),
            vec!["spec.services[2].name", "spec.services[3].name"]
        );
    }

    #[test]
    fn test_empty_document_reports_everything_in_rule_order() {
        let doc = parse_manifest_str("unrelated: true\n").unwrap();
        assert_eq!(
            fields(&validate(&doc)),
            vec![
                "apiVersion",
                "kind",
                "metadata.name",
                "metadata.title",
                "metadata.owner",
                "spec.services",
            ]
        );
    }

    #[test]
    fn test_marker_mismatch_and_blank_service_fields() {
        let doc = parse_manifest_str(
            r#"
apiVersion: catalog.portal/v2
kind: Component
metadata: { name: Bad_Name, title: "  ", owner: T }
spec:
  services:
    - { name: "", title: X }
    - { title: Y }
    - { name: z }
"#,
        )
        .unwrap();

        assert_eq!(
            fields(&validate(&doc)),
            vec![
                "apiVersion",
                "kind",
                "metadata.name",
                "metadata.title",
                "spec.services[0].name",
                "spec.services[1].name",
                "spec.services[2].title",
            ]
        );
    }

    #[test]
    fn test_kebab_case() {
        assert!(is_kebab_case("payments-platform"));
        assert!(is_kebab_case("v2"));
        assert!(!is_kebab_case("Payments"));
        assert!(!is_kebab_case("a--b"));
        assert!(!is_kebab_case("-a"));
        assert!(!is_kebab_case("a_b"));
    }
}
