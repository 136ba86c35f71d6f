use std::collections::HashMap;

use serde_json::Value as Json;
use url::Url;

/// Supplies schema documents referenced by `$ref` that are not part of the schema
/// being compiled.
///
/// Documents are requested lazily, once per document URI (fragment removed), and only
/// when a reference into them is resolved.
pub trait SchemaResolver {
    fn resolve(&self, uri: &Url) -> Option<Json>;
}

/// Resolves nothing; every external reference is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl SchemaResolver for NoResolver {
    fn resolve(&self, _uri: &Url) -> Option<Json> {
        None
    }
}

/// Documents keyed by absolute URI.
impl SchemaResolver for HashMap<String, Json> {
    fn resolve(&self, uri: &Url) -> Option<Json> {
        self.get(uri.as_str()).cloned()
    }
}
