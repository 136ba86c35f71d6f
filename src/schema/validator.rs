use std::{collections::HashSet, fmt};

use log::warn;
use serde_json::Value as Json;

use crate::{
    path::{self, PathElement},
    schema::compiler::{Dependency, JsonType, Keyword, SchemaNode},
    value::{Number, Value},
};

/// One failed keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// JSON pointer to the offending part of the instance; empty for the root.
    pub instance_location: String,
    pub keyword: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = if self.instance_location.is_empty() {
            "/"
        } else {
            &self.instance_location
        };
        write!(f, "{location}: {} ({})", self.message, self.keyword)
    }
}

/// Walks an instance against the compiled arena, collecting every error.
pub struct Validator<'s> {
    nodes: &'s [SchemaNode],
    max_depth: usize,
}

impl<'s> Validator<'s> {
    pub fn new(nodes: &'s [SchemaNode], max_depth: usize) -> Self {
        Validator { nodes, max_depth }
    }

    pub fn validate(&self, slot: usize, instance: &Json) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.node(slot, instance, &mut Vec::new(), &mut errors, 0);
        errors
    }

    fn is_valid(&self, slot: usize, instance: &Json, location: &mut Vec<PathElement>, depth: usize) -> bool {
        let mut errors = Vec::new();
        self.node(slot, instance, location, &mut errors, depth);
        errors.is_empty()
    }

    fn node(
        &self,
        slot: usize,
        instance: &Json,
        location: &mut Vec<PathElement>,
        errors: &mut Vec<ValidationError>,
        depth: usize,
    ) {
        if depth > self.max_depth {
            warn!("schema validation exceeded depth {}", self.max_depth);
            errors.push(error(location, "$ref", format!("validation exceeded depth {}", self.max_depth)));
            return;
        }

        let keywords = match self.nodes.get(slot) {
            Some(SchemaNode::Bool(true)) | None => return,
            Some(SchemaNode::Bool(false)) => {
                errors.push(error(location, "false", "no value is allowed here"));
                return;
            }
            Some(SchemaNode::Keywords(keywords)) => keywords,
        };

        for keyword in keywords {
            self.keyword(keyword, instance, location, errors, depth + 1);
        }
    }

    fn child(
        &self,
        slot: usize,
        instance: &Json,
        element: PathElement,
        location: &mut Vec<PathElement>,
        errors: &mut Vec<ValidationError>,
        depth: usize,
    ) {
        location.push(element);
        self.node(slot, instance, location, errors, depth);
        location.pop();
    }

    fn keyword(
        &self,
        keyword: &Keyword,
        instance: &Json,
        location: &mut Vec<PathElement>,
        errors: &mut Vec<ValidationError>,
        depth: usize,
    ) {
        match keyword {
            Keyword::Type(types) => {
                if !types.iter().any(|ty| has_type(instance, *ty)) {
                    let expected: Vec<&str> = types.iter().map(|ty| ty.name()).collect();
                    errors.push(error(
                        location,
                        "type",
                        format!("{instance} is not of type {}", expected.join(" or ")),
                    ));
                }
            }

            Keyword::Enum(values) => {
                let candidate = Value::from_json(instance);
                if !values.iter().any(|value| Value::from_json(value) == candidate) {
                    errors.push(error(location, "enum", format!("{instance} is not one of the allowed values")));
                }
            }

            Keyword::Const(value) => {
                if Value::from_json(value) != Value::from_json(instance) {
                    errors.push(error(location, "const", format!("{instance} is not {value}")));
                }
            }

            Keyword::Required(names) => {
                if let Json::Object(map) = instance {
                    for name in names {
                        if !map.contains_key(name) {
                            errors.push(error(location, "required", format!("'{name}' is a required property")));
                        }
                    }
                }
            }

            Keyword::Properties(properties) => {
                if let Json::Object(map) = instance {
                    for (name, slot) in properties {
                        if let Some(value) = map.get(name) {
                            self.child(*slot, value, PathElement::Name(name.clone()), location, errors, depth);
                        }
                    }
                }
            }

            Keyword::PatternProperties(patterns) => {
                if let Json::Object(map) = instance {
                    for (regex, slot) in patterns {
                        for (name, value) in map.iter().filter(|(name, _)| regex.is_match(name)) {
                            self.child(*slot, value, PathElement::Name(name.clone()), location, errors, depth);
                        }
                    }
                }
            }

            Keyword::AdditionalProperties { schema, known, patterns } => {
                if let Json::Object(map) = instance {
                    let additional = map.iter().filter(|(name, _)| {
                        !known.iter().any(|k| k == *name) && !patterns.iter().any(|regex| regex.is_match(name))
                    });
                    for (name, value) in additional {
                        self.child(*schema, value, PathElement::Name(name.clone()), location, errors, depth);
                    }
                }
            }

            Keyword::Items(slot) => {
                if let Json::Array(items) = instance {
                    for (i, item) in items.iter().enumerate() {
                        self.child(*slot, item, PathElement::Index(i), location, errors, depth);
                    }
                }
            }

            Keyword::TupleItems { items, additional } => {
                if let Json::Array(elements) = instance {
                    for (i, element) in elements.iter().enumerate() {
                        let slot = match items.get(i) {
                            Some(slot) => *slot,
                            None => match additional {
                                Some(slot) => *slot,
                                None => break,
                            },
                        };
                        self.child(slot, element, PathElement::Index(i), location, errors, depth);
                    }
                }
            }

            Keyword::Contains(slot) => {
                if let Json::Array(items) = instance {
                    let found = items.iter().enumerate().any(|(i, item)| {
                        location.push(PathElement::Index(i));
                        let valid = self.is_valid(*slot, item, location, depth);
                        location.pop();
                        valid
                    });
                    if !found {
                        errors.push(error(location, "contains", "no element matches the 'contains' schema"));
                    }
                }
            }

            Keyword::UniqueItems => {
                if let Json::Array(items) = instance {
                    let mut seen = HashSet::with_capacity(items.len());
                    if !items.iter().all(|item| seen.insert(Value::from_json(item))) {
                        errors.push(error(location, "uniqueItems", "array items are not unique"));
                    }
                }
            }

            Keyword::PropertyNames(slot) => {
                if let Json::Object(map) = instance {
                    for name in map.keys() {
                        let key = Json::String(name.clone());
                        if !self.is_valid(*slot, &key, location, depth) {
                            errors.push(error(location, "propertyNames", format!("property name '{name}' is invalid")));
                        }
                    }
                }
            }

            Keyword::Dependencies(dependencies) => {
                if let Json::Object(map) = instance {
                    for (name, dependency) in dependencies.iter().filter(|(name, _)| map.contains_key(name)) {
                        match dependency {
                            Dependency::Required(required) => {
                                for missing in required.iter().filter(|r| !map.contains_key(*r)) {
                                    errors.push(error(
                                        location,
                                        "dependencies",
                                        format!("'{missing}' is required when '{name}' is present"),
                                    ));
                                }
                            }
                            Dependency::Schema(slot) => self.node(*slot, instance, location, errors, depth),
                        }
                    }
                }
            }

            Keyword::AllOf(slots) => {
                for slot in slots {
                    self.node(*slot, instance, location, errors, depth);
                }
            }

            Keyword::AnyOf(slots) => {
                if !slots.iter().any(|slot| self.is_valid(*slot, instance, location, depth)) {
                    errors.push(error(location, "anyOf", "value does not match any of the schemas"));
                }
            }

            Keyword::OneOf(slots) => {
                let matched = slots
                    .iter()
                    .filter(|slot| self.is_valid(**slot, instance, location, depth))
                    .count();
                if matched != 1 {
                    errors.push(error(
                        location,
                        "oneOf",
                        format!("value matches {matched} schemas, expected exactly one"),
                    ));
                }
            }

            Keyword::Not(slot) => {
                if self.is_valid(*slot, instance, location, depth) {
                    errors.push(error(location, "not", "value must not match the schema"));
                }
            }

            Keyword::Conditional { condition, then, otherwise } => {
                let branch = if self.is_valid(*condition, instance, location, depth) {
                    then
                } else {
                    otherwise
                };
                if let Some(slot) = branch {
                    self.node(*slot, instance, location, errors, depth);
                }
            }

            Keyword::Ref(slot) => self.node(*slot, instance, location, errors, depth),
        }
    }
}

fn has_type(instance: &Json, ty: JsonType) -> bool {
    match (ty, instance) {
        (JsonType::Null, Json::Null)
        | (JsonType::Boolean, Json::Bool(_))
        | (JsonType::Number, Json::Number(_))
        | (JsonType::String, Json::String(_))
        | (JsonType::Array, Json::Array(_))
        | (JsonType::Object, Json::Object(_)) => true,
        (JsonType::Integer, Json::Number(n)) => Number::from_json(n).is_integer(),
        _ => false,
    }
}

fn error(location: &[PathElement], keyword: &'static str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        instance_location: path::pointer(location),
        keyword,
        message: message.into(),
    }
}
