//! Ordered URL classifier.

use sw_core::{ResourceDescriptor, ResourceType};
use url::Url;

use crate::rules::{self, Rule};

/// Errors building a [`Classifier`].
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("build version must not be empty")]
    EmptyBuildVersion,

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("invalid classification pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Classifies request URLs into module, language pack and app resources.
pub struct Classifier {
    rules: Vec<Rule>,
    base: Option<Url>,
    build_version: String,
}

impl Classifier {
    /// Compile the classification rules for a running build.
    pub fn new(build_version: &str) -> Result<Self, ClassifyError> {
        if build_version.trim().is_empty() {
            return Err(ClassifyError::EmptyBuildVersion);
        }

        let rules = vec![
            rules::module_rule()?,
            rules::lang_pack_rule()?,
            rules::app_rule(build_version)?,
        ];

        Ok(Self {
            rules,
            base: None,
            build_version: build_version.to_string(),
        })
    }

    /// Resolve relative URLs against `base` before classifying.
    pub fn with_base(mut self, base: &str) -> Result<Self, ClassifyError> {
        self.base = Some(Url::parse(base)?);
        Ok(self)
    }

    /// Build version the app rule is bound to.
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    /// Classify a URL string. Unparseable URLs are not classified.
    pub fn classify(&self, url: &str) -> Option<ResourceDescriptor> {
        let parsed = match &self.base {
            Some(base) => base.join(url),
            None => Url::parse(url),
        };

        match parsed {
            Ok(parsed) => self.classify_url(&parsed),
            Err(err) => {
                tracing::debug!(url, error = %err, "unparseable url, not classified");
                None
            }
        }
    }

    /// Classify a parsed URL.
    ///
    /// The first rule whose pattern matches decides the outcome, even when
    /// its captures turn out not to describe a resource.
    pub fn classify_url(&self, url: &Url) -> Option<ResourceDescriptor> {
        for rule in &self.rules {
            if let Some(outcome) = rule.apply(url) {
                if outcome.is_none() {
                    tracing::debug!(
                        url = %url,
                        rule = %rule.resource_type,
                        "pattern matched without a usable name"
                    );
                }
                return outcome;
            }
        }
        None
    }

    /// Resource type of the first rule whose pattern matches, without
    /// running its extractor.
    pub fn matching_type(&self, url: &Url) -> Option<ResourceType> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(url.path()))
            .map(|rule| rule.resource_type)
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("build_version", &self.build_version)
            .field("base", &self.base.as_ref().map(Url::as_str))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::Bundle;

    const CDN: &str = "https://cdn.example.com/cdn";

    fn classifier() -> Classifier {
        Classifier::new("5.0.0").unwrap()
    }

    // === Modules ===

    #[test]
    fn test_module_bundle() {
        let desc = classifier()
            .classify(&format!("{CDN}/test-root/2.2.2/test-root.browser.js"))
            .unwrap();

        assert_eq!(desc.resource_type, ResourceType::Module);
        assert_eq!(desc.name, "test-root");
        assert_eq!(desc.version, "2.2.2");
        assert_eq!(desc.bundle, Some(Bundle::Browser));
        assert_eq!(desc.revision, None);
        assert!(!desc.is_chunk());
    }

    #[test]
    fn test_module_legacy_bundle() {
        let desc = classifier()
            .classify(&format!("{CDN}/test-root/2.2.2/test-root.legacy.browser.js"))
            .unwrap();

        assert_eq!(desc.resource_type, ResourceType::Module);
        assert_eq!(desc.name, "test-root");
        assert_eq!(desc.bundle, Some(Bundle::LegacyBrowser));
    }

    #[test]
    fn test_module_chunk_shares_identity_with_parent() {
        let c = classifier();
        let parent = c
            .classify(&format!("{CDN}/test-root/2.2.2/test-root.browser.js"))
            .unwrap();
        let chunk = c
            .classify(&format!(
                "{CDN}/test-root/2.2.2/vendors~main.test-root.chunk.browser.js"
            ))
            .unwrap();

        assert_eq!(chunk.resource_type, ResourceType::Module);
        assert_eq!(chunk.name, parent.name);
        assert_eq!(chunk.version, parent.version);
        assert_eq!(chunk.bundle, parent.bundle);
        assert_eq!(chunk.chunk.as_deref(), Some("vendors~main"));
        assert_eq!(chunk.identifier(), parent.identifier());
    }

    #[test]
    fn test_module_legacy_chunk() {
        let desc = classifier()
            .classify(&format!(
                "{CDN}/test-root/2.2.2/Header.test-root.chunk.legacy.browser.js"
            ))
            .unwrap();

        assert_eq!(desc.name, "test-root");
        assert_eq!(desc.chunk.as_deref(), Some("Header"));
        assert_eq!(desc.bundle, Some(Bundle::LegacyBrowser));
    }

    #[test]
    fn test_module_chunk_without_prefix() {
        let desc = classifier()
            .classify(&format!("{CDN}/test-root/2.2.2/test-root.chunk.browser.js"))
            .unwrap();
        assert!(desc.is_chunk());
        assert_eq!(desc.name, "test-root");
    }

    #[test]
    fn test_module_file_of_another_module_is_rejected() {
        let desc = classifier().classify(&format!("{CDN}/test-root/2.2.2/other.browser.js"));
        assert!(desc.is_none());
    }

    #[test]
    fn test_module_requires_semver_directory() {
        let desc = classifier().classify(&format!("{CDN}/test-root/latest/test-root.browser.js"));
        assert!(desc.is_none());
    }

    #[test]
    fn test_module_prerelease_version() {
        let desc = classifier()
            .classify(&format!("{CDN}/test-root/3.0.0-beta.1/test-root.browser.js"))
            .unwrap();
        assert_eq!(desc.version, "3.0.0-beta.1");
    }

    // === Revisions ===

    #[test]
    fn test_revision_query_param() {
        let desc = classifier()
            .classify(&format!(
                "{CDN}/test-root/2.2.2/test-root.browser.js?clientCacheRevision=abc"
            ))
            .unwrap();
        assert_eq!(desc.revision.as_deref(), Some("abc"));
    }

    #[test]
    fn test_empty_revision_is_distinct_from_absent() {
        let c = classifier();
        let empty = c
            .classify(&format!(
                "{CDN}/test-root/2.2.2/test-root.browser.js?clientCacheRevision="
            ))
            .unwrap();
        let absent = c
            .classify(&format!("{CDN}/test-root/2.2.2/test-root.browser.js?other=1"))
            .unwrap();

        assert_eq!(empty.revision.as_deref(), Some(""));
        assert_eq!(absent.revision, None);
    }

    // === Language packs ===

    #[test]
    fn test_lang_pack_with_country() {
        let desc = classifier()
            .classify(&format!("{CDN}/test-root/2.2.2/locale/en-US/integration.json"))
            .unwrap();

        assert_eq!(desc.resource_type, ResourceType::LangPack);
        assert_eq!(desc.name, "test-root");
        assert_eq!(desc.version, "2.2.2");
        assert_eq!(desc.resource.as_deref(), Some("integration"));
        let locale = desc.locale.unwrap();
        assert_eq!(locale.tag, "en-US");
        assert_eq!(locale.language, "en");
        assert_eq!(locale.country.as_deref(), Some("US"));
        assert_eq!(desc.bundle, None);
    }

    #[test]
    fn test_lang_pack_without_country() {
        let desc = classifier()
            .classify(&format!("{CDN}/test-root/2.2.2/locale/fil/integration.json"))
            .unwrap();

        let locale = desc.locale.unwrap();
        assert_eq!(locale.language, "fil");
        assert_eq!(locale.country, None);
    }

    #[test]
    fn test_lang_pack_rejects_malformed_locale() {
        let c = classifier();
        assert!(c
            .classify(&format!("{CDN}/test-root/2.2.2/locale/EN-us/integration.json"))
            .is_none());
        assert!(c
            .classify(&format!("{CDN}/test-root/2.2.2/locale/english/integration.json"))
            .is_none());
    }

    // === Root app ===

    #[test]
    fn test_app_bundle() {
        let desc = classifier()
            .classify("https://example.com/_/static/app/5.0.0/app.js")
            .unwrap();

        assert_eq!(desc.resource_type, ResourceType::App);
        assert_eq!(desc.name, "app");
        assert_eq!(desc.resource.as_deref(), Some("app"));
        assert_eq!(desc.version, "5.0.0");
        assert_eq!(desc.bundle, Some(Bundle::Browser));
        assert_eq!(desc.identifier(), "app");
    }

    #[test]
    fn test_app_legacy_and_i18n_bundles() {
        let c = classifier();
        let legacy = c
            .classify("https://example.com/static/app/5.0.0/legacy/vendors.js")
            .unwrap();
        assert_eq!(legacy.bundle, Some(Bundle::LegacyBrowser));
        assert_eq!(legacy.identifier(), "vendors");

        let i18n = c
            .classify("https://example.com/static/app/5.0.0/legacy/i18n/en-US.js")
            .unwrap();
        assert_eq!(i18n.bundle, Some(Bundle::LegacyBrowser));
        assert_eq!(i18n.identifier(), "i18n/en-US");
    }

    #[test]
    fn test_app_bundle_of_other_build_is_not_classified() {
        let desc = classifier().classify("https://example.com/static/app/4.9.9/app.js");
        assert!(desc.is_none());
    }

    #[test]
    fn test_app_build_version_is_matched_literally() {
        // A '.' in the build version must not act as a wildcard.
        let desc = classifier().classify("https://example.com/static/app/5x0x0/app.js");
        assert!(desc.is_none());
    }

    // === General ===

    #[test]
    fn test_unrelated_urls_are_not_classified() {
        let c = classifier();
        assert!(c.classify("https://example.com/").is_none());
        assert!(c.classify("https://example.com/api/users.json").is_none());
        assert!(c.classify("https://example.com/images/logo.png").is_none());
        assert!(c.classify("not a url").is_none());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let c = classifier();
        let url = format!("{CDN}/test-root/2.2.2/test-root.browser.js?clientCacheRevision=abc");
        assert_eq!(c.classify(&url), c.classify(&url));

        let url = format!("{CDN}/test-root/2.2.2/locale/es-MX/integration.json");
        assert_eq!(c.classify(&url), c.classify(&url));
    }

    #[test]
    fn test_relative_urls_with_base() {
        let c = classifier().with_base("https://example.com").unwrap();
        let desc = c.classify("/static/app/5.0.0/app.js").unwrap();
        assert_eq!(desc.resource_type, ResourceType::App);

        assert!(classifier().classify("/static/app/5.0.0/app.js").is_none());
    }

    #[test]
    fn test_matching_type() {
        let c = classifier();
        let url = Url::parse(&format!("{CDN}/test-root/2.2.2/other.browser.js")).unwrap();
        assert_eq!(c.matching_type(&url), Some(ResourceType::Module));
    }

    #[test]
    fn test_empty_build_version() {
        assert!(matches!(
            Classifier::new(""),
            Err(ClassifyError::EmptyBuildVersion)
        ));
    }
}
