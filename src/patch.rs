//! RFC 7386 JSON merge patch.

use serde_json::{Map, Value as Json};

/// Applies `patch` to `target` in place.
///
/// An object patch merges member by member: `null` members remove the key, others
/// are merged recursively. Any other patch value replaces the target outright.
///
/// ```
/// use quarry::patch::merge_patch;
/// use serde_json::json;
///
/// let mut doc = json!({"title": "Goodbye!", "author": {"givenName": "John", "familyName": "Doe"}});
/// merge_patch(&mut doc, &json!({"title": "Hello!", "author": {"familyName": null}}));
/// assert_eq!(doc, json!({"title": "Hello!", "author": {"givenName": "John"}}));
/// ```
pub fn merge_patch(target: &mut Json, patch: &Json) {
    let Json::Object(members) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Json::Object(Map::new());
    }
    let Json::Object(map) = target else {
        return;
    };

    for (name, value) in members {
        if value.is_null() {
            map.remove(name);
        } else {
            merge_patch(map.entry(name.clone()).or_insert(Json::Null), value);
        }
    }
}

/// Returns a patched copy of `target`.
pub fn merged(target: &Json, patch: &Json) -> Json {
    let mut result = target.clone();
    merge_patch(&mut result, patch);
    result
}
