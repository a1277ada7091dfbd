//! Logical resources and the metadata records kept for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of logical resource a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    /// Root application bundle of the running build.
    #[serde(rename = "app")]
    App,
    /// Versioned module bundle or one of its chunks.
    #[serde(rename = "module")]
    Module,
    /// Per-locale language pack of a module.
    #[serde(rename = "lang-pack")]
    LangPack,
}

impl ResourceType {
    /// The string used in metadata keys and serialized records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Module => "module",
            Self::LangPack => "lang-pack",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build output variant of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bundle {
    /// Modern browser build (`*.browser.js`).
    #[serde(rename = "browser")]
    Browser,
    /// Legacy browser build (`*.legacy.browser.js`).
    #[serde(rename = "legacy.browser")]
    LegacyBrowser,
}

impl Bundle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::LegacyBrowser => "legacy.browser",
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacyBrowser)
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `language[-COUNTRY]` locale taken from a language pack path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    /// Full tag as it appeared in the URL (e.g. `en-US`).
    pub tag: String,
    /// Lowercase language subtag (2-3 letters).
    pub language: String,
    /// Uppercase country subtag, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Locale {
    /// Create a locale from its already-split parts.
    pub fn new(language: impl Into<String>, country: Option<String>) -> Self {
        let language = language.into();
        let tag = match &country {
            Some(country) => format!("{}-{}", language, country),
            None => language.clone(),
        };
        Self {
            tag,
            language,
            country,
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

/// Structured description of a classified URL.
///
/// Derived per request and never persisted directly; the persisted form is
/// [`ResourceMetadataRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Kind of resource.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Module name, or `app` for root application bundles.
    pub name: String,
    /// File-level identifier: bundle stem for app bundles, JSON stem for
    /// language packs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Version taken from the URL path.
    pub version: String,
    /// Bundle variant (modules and app bundles only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<Bundle>,
    /// Locale (language packs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<Locale>,
    /// Value of the `clientCacheRevision` query parameter. An empty value is
    /// kept as `Some("")`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Chunk name prefix for module chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
}

impl ResourceDescriptor {
    /// Identifier used in the logical metadata key.
    ///
    /// Modules and language packs are keyed by name so every version, bundle,
    /// chunk and locale shares one slot. App bundles are keyed by their file
    /// stem so sibling bundles of one build keep separate slots.
    pub fn identifier(&self) -> &str {
        match self.resource_type {
            ResourceType::App => self.resource.as_deref().unwrap_or(&self.name),
            ResourceType::Module | ResourceType::LangPack => &self.name,
        }
    }

    /// Whether this descriptor is a module chunk rather than the main bundle.
    pub fn is_chunk(&self) -> bool {
        self.chunk.is_some()
    }

    /// Build the metadata record describing `url` as the cached occupant of
    /// this resource's slot.
    pub fn to_record(&self, url: impl Into<String>) -> ResourceMetadataRecord {
        ResourceMetadataRecord {
            resource_type: self.resource_type,
            name: self.name.clone(),
            version: self.version.clone(),
            bundle: self.bundle,
            locale: self.locale.as_ref().map(|l| l.tag.clone()),
            revision: self.revision.clone(),
            url: url.into(),
        }
    }
}

/// Persisted record of which physical URL currently occupies a logical slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadataRecord {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<Bundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Physical request URL whose response is cached under this slot.
    pub url: String,
}
