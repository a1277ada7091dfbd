//! URL classification for module, language pack and root app assets.
//!
//! Every URL intercepted by the worker is matched, in order, against:
//! 1. the module pattern (`{name}/{version}/[{Chunk}.]{name}[.chunk](.legacy)?.browser.js`),
//! 2. the language pack pattern (`{name}/{version}/locale/{lang}[-{COUNTRY}]/{resource}.json`),
//! 3. the root app pattern (`[static/]app/{buildVersion}/[legacy/][i18n/]{stem}.js`).
//!
//! The first match yields a [`sw_core::ResourceDescriptor`]; a URL matching
//! none of them is not cached by this subsystem.
//!
//! # Example
//!
//! ```ignore
//! use sw_classify::Classifier;
//!
//! let classifier = Classifier::new("5.0.0")?;
//! let desc = classifier
//!     .classify("https://cdn.example.com/test-root/2.2.2/test-root.browser.js?clientCacheRevision=abc")
//!     .unwrap();
//! assert_eq!(desc.name, "test-root");
//! assert_eq!(desc.revision.as_deref(), Some("abc"));
//! ```

mod classifier;
mod rules;

pub use classifier::*;
pub use rules::REVISION_PARAM;
