//! Logical metadata keys.

use serde::{Deserialize, Serialize};
use sw_core::{ResourceDescriptor, ResourceType};

/// Prefix of the per-cache expiration ledger keys.
const EXPIRATION_PREFIX: &str = "/__expiration";

/// Synthetic same-origin path under which a metadata record is stored.
///
/// Resources use `/{type}/{id}`, where `id` is the app bundle resource for
/// root app assets and the resource name otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataKey {
    key: String,
}

impl MetadataKey {
    /// Create a key from a raw path.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Key for a resource type and identifier.
    pub fn resource(resource_type: ResourceType, id: &str) -> Self {
        Self::new(format!("/{}/{}", resource_type, id))
    }

    /// Key for the resource a descriptor identifies.
    pub fn for_descriptor(descriptor: &ResourceDescriptor) -> Self {
        Self::resource(descriptor.resource_type, descriptor.identifier())
    }

    /// Key of the expiration ledger for `cache_name`.
    pub fn expiration(cache_name: &str) -> Self {
        Self::new(format!("{}/{}", EXPIRATION_PREFIX, cache_name))
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Whether this key addresses an expiration ledger.
    pub fn is_expiration(&self) -> bool {
        self.key
            .strip_prefix(EXPIRATION_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl std::fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

impl AsRef<str> for MetadataKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sw_core::{Bundle, Locale};

    fn descriptor(resource_type: ResourceType, name: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_type,
            name: name.to_string(),
            resource: None,
            version: "1.0.0".to_string(),
            bundle: None,
            locale: None,
            revision: None,
            chunk: None,
        }
    }

    #[test]
    fn test_module_key_uses_name() {
        let mut d = descriptor(ResourceType::Module, "checkout");
        d.bundle = Some(Bundle::Browser);

        assert_eq!(MetadataKey::for_descriptor(&d).as_str(), "/module/checkout");
    }

    #[test]
    fn test_lang_pack_key_ignores_locale() {
        let mut en = descriptor(ResourceType::LangPack, "checkout");
        en.resource = Some("integration".to_string());
        en.locale = Some(Locale::new("en", Some("US".to_string())));

        let mut fr = en.clone();
        fr.locale = Some(Locale::new("fr", None));

        assert_eq!(
            MetadataKey::for_descriptor(&en),
            MetadataKey::for_descriptor(&fr)
        );
        assert_eq!(
            MetadataKey::for_descriptor(&en).as_str(),
            "/lang-pack/checkout"
        );
    }

    #[test]
    fn test_app_key_uses_resource() {
        let mut d = descriptor(ResourceType::App, "app");
        d.resource = Some("vendors".to_string());
        assert_eq!(MetadataKey::for_descriptor(&d).as_str(), "/app/vendors");

        d.resource = Some("i18n/en-US".to_string());
        assert_eq!(MetadataKey::for_descriptor(&d).to_string(), "/app/i18n/en-US");
    }

    #[test]
    fn test_expiration_key() {
        let key = MetadataKey::expiration("module-cache");

        assert_eq!(key.as_str(), "/__expiration/module-cache");
        assert!(key.is_expiration());
        assert!(!MetadataKey::new("/module/x").is_expiration());
        assert!(!MetadataKey::new("/__expirationx/y").is_expiration());
    }
}
