//! Item documents as stored locally and returned by the remote service.

use serde_json::{Map, Value};

/// A JSON object keyed by property name.
pub type Document = Map<String, Value>;

/// Removes server-managed properties from a document, keeping the version.
///
/// Every key starting with `prefix` is dropped except `version_property`,
/// which carries the concurrency token needed for the next update.
pub fn strip_system_properties(
    mut document: Document,
    prefix: &str,
    version_property: &str,
) -> Document {
    document.retain(|key, _| !key.starts_with(prefix) || key == version_property);
    document
}
