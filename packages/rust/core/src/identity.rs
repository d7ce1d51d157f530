//! Content identifier derivation.

use ramlpreparer_shared::{EnvelopeConfig, PreparerError, Result};

/// Derive the content identifier for `docname`.
///
/// The identifier is `content_id_base` (trailing `/` trimmed) joined to the
/// normalized docname with a single `/`. Docnames are relative names and
/// are normalized before they are compared: backslashes become `/`, and
/// leading `/` or `./` is dropped, so `a`, `./a` and `/a` name the same
/// document. Nothing else is rewritten; whitespace is part of the name.
/// Distinct normalized docnames always yield distinct identifiers.
pub fn derive_content_id(docname: &str, config: &(impl EnvelopeConfig + ?Sized)) -> Result<String> {
    let base = config
        .content_id_base()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or_else(|| PreparerError::configuration("content_id_base is not set"))?;

    let name = normalize_docname(docname);
    if name.trim().is_empty() {
        return Err(PreparerError::configuration(format!(
            "docname {docname:?} is empty after normalization"
        )));
    }

    Ok(format!("{}/{name}", base.trim_end_matches('/')))
}

fn normalize_docname(docname: &str) -> String {
    let mut name = docname.replace('\\', "/");
    loop {
        if let Some(rest) = name.strip_prefix("./") {
            name = rest.to_string();
        } else if let Some(rest) = name.strip_prefix('/') {
            name = rest.to_string();
        } else {
            break;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestConfig;

    #[test]
    fn deterministic() {
        let config = TestConfig::new("https://github.com/org/api/");
        let first = derive_content_id("widgets.raml", &config).unwrap();
        let second = derive_content_id("widgets.raml", &config).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "https://github.com/org/api/widgets.raml");
    }

    #[test]
    fn distinct_docnames_do_not_collide() {
        let config = TestConfig::new("https://github.com/org/api");
        let names = ["a.raml", "b.raml", "a.yaml", "v1/a.raml", "a.raml.bak"];
        let ids: std::collections::HashSet<String> = names
            .iter()
            .map(|n| derive_content_id(n, &config).unwrap())
            .collect();
        assert_eq!(ids.len(), names.len());
    }

    #[test]
    fn normalizes_separators() {
        let config = TestConfig::new("base//");
        assert_eq!(derive_content_id("./v1\\api.raml", &config).unwrap(), "base/v1/api.raml");
        assert_eq!(derive_content_id("/api.raml", &config).unwrap(), "base/api.raml");
    }

    #[test]
    fn missing_base_is_configuration_error() {
        let mut config = TestConfig::new("x");
        config.content_id_base = None;
        let err = derive_content_id("api.raml", &config).unwrap_err();
        assert!(matches!(err, PreparerError::Configuration { .. }));
    }

    #[test]
    fn empty_docname_is_rejected() {
        let config = TestConfig::new("base");
        assert!(derive_content_id("./", &config).is_err());
        assert!(derive_content_id("  ", &config).is_err());
    }

    #[test]
    fn whitespace_is_part_of_the_name() {
        let config = TestConfig::new("base");
        let plain = derive_content_id("a.raml", &config).unwrap();
        let padded = derive_content_id(" a.raml", &config).unwrap();
        assert_ne!(plain, padded);
        assert_eq!(padded, "base/ a.raml");
        assert_eq!(derive_content_id("./a.raml", &config).unwrap(), plain);
    }
}
