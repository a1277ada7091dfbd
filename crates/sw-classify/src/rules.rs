//! Path patterns and the extractors that turn their captures into descriptors.

use regex::{Captures, Regex};
use sw_core::{Bundle, Locale, ResourceDescriptor, ResourceType};
use url::Url;

/// Query parameter carrying the cache-busting revision key.
pub const REVISION_PARAM: &str = "clientCacheRevision";

/// Semantic version as it appears in CDN paths (`1.2.3`, `1.2.3-rc.1`).
const VERSION: &str = r"\d+\.\d+\.\d+(?:[-+][0-9A-Za-z.+-]+)?";

/// Fixed name reported for root application bundles.
pub(crate) const APP_NAME: &str = "app";

type Extractor = fn(&Captures<'_>, &Url) -> Option<ResourceDescriptor>;

/// A path pattern paired with the extractor for its captures.
pub(crate) struct Rule {
    pub(crate) resource_type: ResourceType,
    pub(crate) pattern: Regex,
    extract: Extractor,
}

impl Rule {
    /// Apply the rule to a URL.
    ///
    /// `None` means the pattern did not match; `Some(None)` means it matched
    /// but the captures did not describe a usable resource.
    pub(crate) fn apply(&self, url: &Url) -> Option<Option<ResourceDescriptor>> {
        let captures = self.pattern.captures(url.path())?;
        Some((self.extract)(&captures, url))
    }
}

/// Module bundles and chunks.
pub(crate) fn module_rule() -> Result<Rule, regex::Error> {
    let pattern = format!(
        r"^(?:.*/)?(?P<name>[^/]+)/(?P<version>{VERSION})/(?P<file>[^/]+?)(?P<chunk>\.chunk)?(?P<bundle>\.legacy\.browser|\.browser)\.js$"
    );
    Ok(Rule {
        resource_type: ResourceType::Module,
        pattern: Regex::new(&pattern)?,
        extract: extract_module,
    })
}

/// Per-locale language packs.
pub(crate) fn lang_pack_rule() -> Result<Rule, regex::Error> {
    let pattern = format!(
        r"^(?:.*/)?(?P<name>[^/]+)/(?P<version>{VERSION})/locale/(?P<language>[a-z]{{2,3}})(?:-(?P<country>[A-Z]+))?/(?P<resource>[^/]+)\.json$"
    );
    Ok(Rule {
        resource_type: ResourceType::LangPack,
        pattern: Regex::new(&pattern)?,
        extract: extract_lang_pack,
    })
}

/// Root application bundles of exactly `build_version`.
pub(crate) fn app_rule(build_version: &str) -> Result<Rule, regex::Error> {
    let pattern = format!(
        r"^(?:.*/)?(?:static/)?app/(?P<version>{})/(?P<legacy>legacy/)?(?P<i18n>i18n/)?(?P<stem>[^/]+)\.js$",
        regex::escape(build_version)
    );
    Ok(Rule {
        resource_type: ResourceType::App,
        pattern: Regex::new(&pattern)?,
        extract: extract_app,
    })
}

fn revision(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == REVISION_PARAM)
        .map(|(_, value)| value.into_owned())
}

fn non_empty<'a>(captures: &Captures<'a>, group: &str) -> Option<&'a str> {
    captures
        .name(group)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
}

fn extract_module(captures: &Captures<'_>, url: &Url) -> Option<ResourceDescriptor> {
    let name = non_empty(captures, "name")?;
    let version = non_empty(captures, "version")?;
    let file = non_empty(captures, "file")?;

    // The file stem is either the module name or `{Chunk}.{name}`.
    let prefix = if file == name {
        None
    } else {
        let chunk = file.strip_suffix(name)?.strip_suffix('.')?;
        if chunk.is_empty() {
            return None;
        }
        Some(chunk)
    };

    let chunk = match (prefix, captures.name("chunk").is_some()) {
        (Some(prefix), _) => Some(prefix.to_string()),
        (None, true) => Some(name.to_string()),
        (None, false) => None,
    };

    let bundle = match captures.name("bundle").map(|m| m.as_str()) {
        Some(".legacy.browser") => Bundle::LegacyBrowser,
        _ => Bundle::Browser,
    };

    Some(ResourceDescriptor {
        resource_type: ResourceType::Module,
        name: name.to_string(),
        resource: None,
        version: version.to_string(),
        bundle: Some(bundle),
        locale: None,
        revision: revision(url),
        chunk,
    })
}

fn extract_lang_pack(captures: &Captures<'_>, url: &Url) -> Option<ResourceDescriptor> {
    let name = non_empty(captures, "name")?;
    let version = non_empty(captures, "version")?;
    let language = non_empty(captures, "language")?;
    let resource = non_empty(captures, "resource")?;
    let country = non_empty(captures, "country").map(str::to_string);

    Some(ResourceDescriptor {
        resource_type: ResourceType::LangPack,
        name: name.to_string(),
        resource: Some(resource.to_string()),
        version: version.to_string(),
        bundle: None,
        locale: Some(Locale::new(language, country)),
        revision: revision(url),
        chunk: None,
    })
}

fn extract_app(captures: &Captures<'_>, url: &Url) -> Option<ResourceDescriptor> {
    let version = non_empty(captures, "version")?;
    let stem = non_empty(captures, "stem")?;

    let resource = if captures.name("i18n").is_some() {
        format!("i18n/{}", stem)
    } else {
        stem.to_string()
    };
    let bundle = if captures.name("legacy").is_some() {
        Bundle::LegacyBrowser
    } else {
        Bundle::Browser
    };

    Some(ResourceDescriptor {
        resource_type: ResourceType::App,
        name: APP_NAME.to_string(),
        resource: Some(resource),
        version: version.to_string(),
        bundle: Some(bundle),
        locale: None,
        revision: revision(url),
        chunk: None,
    })
}
