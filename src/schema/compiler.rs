use std::collections::HashMap;

use log::debug;
use regex::Regex;
use serde_json::{Map, Value as Json};
use url::Url;

use crate::schema::{resolver::SchemaResolver, SchemaError};

/// Base URI for schemas without an `$id`.
pub const DEFAULT_BASE: &str = "json-schema:///";

/// A compiled schema: an arena slot is either a boolean schema or a keyword list.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Bool(bool),
    Keywords(Vec<Keyword>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "null" => JsonType::Null,
            "boolean" => JsonType::Boolean,
            "integer" => JsonType::Integer,
            "number" => JsonType::Number,
            "string" => JsonType::String,
            "array" => JsonType::Array,
            "object" => JsonType::Object,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            JsonType::Null => "null",
            JsonType::Boolean => "boolean",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Dependency {
    Required(Vec<String>),
    Schema(usize),
}

/// One validating keyword; `usize` fields are arena slots.
#[derive(Debug, Clone)]
pub enum Keyword {
    Type(Vec<JsonType>),
    Enum(Vec<Json>),
    Const(Json),
    Required(Vec<String>),
    Properties(Vec<(String, usize)>),
    PatternProperties(Vec<(Regex, usize)>),
    AdditionalProperties {
        schema: usize,
        known: Vec<String>,
        patterns: Vec<Regex>,
    },
    Items(usize),
    TupleItems {
        items: Vec<usize>,
        additional: Option<usize>,
    },
    Contains(usize),
    UniqueItems,
    PropertyNames(usize),
    Dependencies(Vec<(String, Dependency)>),
    AllOf(Vec<usize>),
    AnyOf(Vec<usize>),
    OneOf(Vec<usize>),
    Not(usize),
    Conditional {
        condition: usize,
        then: Option<usize>,
        otherwise: Option<usize>,
    },
    Ref(usize),
}

/// A resource base URI and the pointer of the schema being compiled within it.
#[derive(Debug, Clone)]
struct Scope {
    base: Url,
    pointer: String,
}

fn descend(scopes: &[Scope], segments: &[&str]) -> Vec<Scope> {
    scopes
        .iter()
        .map(|scope| {
            let mut pointer = scope.pointer.clone();
            for segment in segments {
                pointer.push('/');
                pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
            }
            Scope {
                base: scope.base.clone(),
                pointer,
            }
        })
        .collect()
}

fn document_key(url: &Url) -> String {
    let mut document = url.clone();
    document.set_fragment(None);
    document.to_string()
}

/// Index key of a reference target: document URI plus the decoded fragment.
fn reference_key(url: &Url) -> String {
    let fragment = url
        .fragment()
        .map(|fragment| {
            urlencoding::decode(fragment)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| fragment.to_string())
        })
        .unwrap_or_default();
    format!("{}#{}", document_key(url), fragment)
}

fn invalid(pointer: &str, message: impl Into<String>) -> SchemaError {
    SchemaError::InvalidSchema {
        pointer: pointer.to_string(),
        message: message.into(),
    }
}

/// Compiles schema documents into a node arena.
///
/// `$ref` targets are collected as unresolved references while compiling and patched
/// once the whole document is indexed, so forward and recursive references work.
/// References into unknown documents are loaded through the resolver on demand.
pub struct Compiler<'r> {
    resolver: &'r dyn SchemaResolver,
    nodes: Vec<SchemaNode>,
    index: HashMap<String, usize>,
    documents: HashMap<String, Json>,
    unresolved: Vec<(usize, Url)>,
}

impl<'r> Compiler<'r> {
    pub fn new(resolver: &'r dyn SchemaResolver) -> Self {
        Compiler {
            resolver,
            nodes: Vec::new(),
            index: HashMap::new(),
            documents: HashMap::new(),
            unresolved: Vec::new(),
        }
    }

    /// Compiles `schema` and every reference reachable from it. Returns the arena and
    /// the root slot.
    pub fn compile(mut self, schema: &Json) -> Result<(Vec<SchemaNode>, usize), SchemaError> {
        let base = Url::parse(DEFAULT_BASE).map_err(|source| SchemaError::InvalidUri {
            uri: DEFAULT_BASE.to_string(),
            source,
        })?;
        self.documents.insert(document_key(&base), schema.clone());
        let root = self.compile_node(
            schema,
            &[Scope {
                base,
                pointer: String::new(),
            }],
        )?;

        while let Some((slot, target)) = self.unresolved.pop() {
            let resolved = self.resolve_reference(&target)?;
            self.nodes[slot] = SchemaNode::Keywords(vec![Keyword::Ref(resolved)]);
        }
        Ok((self.nodes, root))
    }

    fn resolve_reference(&mut self, target: &Url) -> Result<usize, SchemaError> {
        let key = reference_key(target);
        if let Some(&slot) = self.index.get(&key) {
            return Ok(slot);
        }

        let document = document_key(target);
        if !self.documents.contains_key(&document) {
            let mut base = target.clone();
            base.set_fragment(None);
            let Some(loaded) = self.resolver.resolve(&base) else {
                return Err(SchemaError::UnresolvedReference(target.to_string()));
            };
            debug!("loaded schema document {document}");
            self.documents.insert(document.clone(), loaded.clone());
            self.compile_node(
                &loaded,
                &[Scope {
                    base,
                    pointer: String::new(),
                }],
            )?;
            if let Some(&slot) = self.index.get(&key) {
                return Ok(slot);
            }
        }

        // A pointer into a part of the document that was not compiled as a schema.
        let pointer = key
            .split_once('#')
            .map(|(_, pointer)| pointer.to_string())
            .unwrap_or_default();
        let Some(subschema) = self
            .documents
            .get(&document)
            .and_then(|json| json.pointer(&pointer))
            .cloned()
        else {
            return Err(SchemaError::UnresolvedReference(target.to_string()));
        };
        let mut base = target.clone();
        base.set_fragment(None);
        self.compile_node(&subschema, &[Scope { base, pointer }])
    }

    fn compile_node(&mut self, schema: &Json, scopes: &[Scope]) -> Result<usize, SchemaError> {
        let slot = self.nodes.len();
        self.nodes.push(SchemaNode::Bool(true));

        let mut scopes = scopes.to_vec();
        if let Some(Json::String(id)) = schema.get("$id") {
            let Some(current) = scopes.last() else {
                return Err(invalid("", "missing base URI"));
            };
            let joined = current.base.join(id).map_err(|source| SchemaError::InvalidUri {
                uri: id.clone(),
                source,
            })?;
            if id.starts_with('#') {
                self.index.insert(reference_key(&joined), slot);
            } else {
                let mut base = joined;
                base.set_fragment(None);
                self.documents
                    .entry(document_key(&base))
                    .or_insert_with(|| schema.clone());
                scopes.push(Scope {
                    base,
                    pointer: String::new(),
                });
            }
        }
        for scope in &scopes {
            self.index
                .insert(format!("{}#{}", document_key(&scope.base), scope.pointer), slot);
        }

        let pointer = scopes
            .first()
            .map(|scope| scope.pointer.clone())
            .unwrap_or_default();
        let map = match schema {
            Json::Bool(b) => {
                self.nodes[slot] = SchemaNode::Bool(*b);
                return Ok(slot);
            }
            Json::Object(map) => map,
            _ => return Err(invalid(&pointer, "expected an object or a boolean")),
        };

        if let Some(definitions) = map.get("definitions") {
            let Json::Object(definitions) = definitions else {
                return Err(invalid(&pointer, "'definitions' must be an object"));
            };
            for (name, definition) in definitions {
                self.compile_node(definition, &descend(&scopes, &["definitions", name.as_str()]))?;
            }
        }

        // Keywords next to $ref are ignored.
        if let Some(reference) = map.get("$ref") {
            let Json::String(reference) = reference else {
                return Err(invalid(&pointer, "'$ref' must be a string"));
            };
            let Some(current) = scopes.last() else {
                return Err(invalid(&pointer, "missing base URI"));
            };
            let target = current.base.join(reference).map_err(|source| SchemaError::InvalidUri {
                uri: reference.clone(),
                source,
            })?;
            self.unresolved.push((slot, target));
            return Ok(slot);
        }

        let keywords = self.keywords(map, &scopes, &pointer)?;
        self.nodes[slot] = SchemaNode::Keywords(keywords);
        Ok(slot)
    }

    fn keywords(&mut self, map: &Map<String, Json>, scopes: &[Scope], pointer: &str) -> Result<Vec<Keyword>, SchemaError> {
        let mut keywords = Vec::new();

        if let Some(types) = map.get("type") {
            let names: Vec<&Json> = match types {
                Json::Array(names) => names.iter().collect(),
                name => vec![name],
            };
            let mut parsed = Vec::with_capacity(names.len());
            for name in names {
                let ty = name
                    .as_str()
                    .and_then(JsonType::parse)
                    .ok_or_else(|| invalid(pointer, format!("unknown type {name}")))?;
                parsed.push(ty);
            }
            keywords.push(Keyword::Type(parsed));
        }

        if let Some(values) = map.get("enum") {
            let Json::Array(values) = values else {
                return Err(invalid(pointer, "'enum' must be an array"));
            };
            keywords.push(Keyword::Enum(values.clone()));
        }

        if let Some(value) = map.get("const") {
            keywords.push(Keyword::Const(value.clone()));
        }

        if let Some(required) = map.get("required") {
            keywords.push(Keyword::Required(string_list(required, pointer, "required")?));
        }

        let mut known = Vec::new();
        if let Some(properties) = map.get("properties") {
            let Json::Object(properties) = properties else {
                return Err(invalid(pointer, "'properties' must be an object"));
            };
            let mut compiled = Vec::with_capacity(properties.len());
            for (name, schema) in properties {
                let child = self.compile_node(schema, &descend(scopes, &["properties", name.as_str()]))?;
                compiled.push((name.clone(), child));
                known.push(name.clone());
            }
            keywords.push(Keyword::Properties(compiled));
        }

        let mut patterns = Vec::new();
        if let Some(pattern_properties) = map.get("patternProperties") {
            let Json::Object(pattern_properties) = pattern_properties else {
                return Err(invalid(pointer, "'patternProperties' must be an object"));
            };
            let mut compiled = Vec::with_capacity(pattern_properties.len());
            for (pattern, schema) in pattern_properties {
                let regex = Regex::new(pattern)
                    .map_err(|e| invalid(pointer, format!("invalid pattern '{pattern}': {e}")))?;
                let child = self.compile_node(schema, &descend(scopes, &["patternProperties", pattern.as_str()]))?;
                patterns.push(regex.clone());
                compiled.push((regex, child));
            }
            keywords.push(Keyword::PatternProperties(compiled));
        }

        if let Some(additional) = map.get("additionalProperties") {
            let schema = self.compile_node(additional, &descend(scopes, &["additionalProperties"]))?;
            keywords.push(Keyword::AdditionalProperties {
                schema,
                known,
                patterns,
            });
        }

        match map.get("items") {
            Some(Json::Array(items)) => {
                let mut compiled = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let index = i.to_string();
                    compiled.push(self.compile_node(item, &descend(scopes, &["items", index.as_str()]))?);
                }
                let additional = match map.get("additionalItems") {
                    Some(schema) => Some(self.compile_node(schema, &descend(scopes, &["additionalItems"]))?),
                    None => None,
                };
                keywords.push(Keyword::TupleItems {
                    items: compiled,
                    additional,
                });
            }
            Some(items) => {
                let child = self.compile_node(items, &descend(scopes, &["items"]))?;
                keywords.push(Keyword::Items(child));
            }
            None => {}
        }

        if let Some(contains) = map.get("contains") {
            let child = self.compile_node(contains, &descend(scopes, &["contains"]))?;
            keywords.push(Keyword::Contains(child));
        }

        if map.get("uniqueItems") == Some(&Json::Bool(true)) {
            keywords.push(Keyword::UniqueItems);
        }

        if let Some(names) = map.get("propertyNames") {
            let child = self.compile_node(names, &descend(scopes, &["propertyNames"]))?;
            keywords.push(Keyword::PropertyNames(child));
        }

        if let Some(dependencies) = map.get("dependencies") {
            let Json::Object(dependencies) = dependencies else {
                return Err(invalid(pointer, "'dependencies' must be an object"));
            };
            let mut compiled = Vec::with_capacity(dependencies.len());
            for (name, dependency) in dependencies {
                let dependency = match dependency {
                    Json::Array(_) => Dependency::Required(string_list(dependency, pointer, "dependencies")?),
                    schema => Dependency::Schema(self.compile_node(schema, &descend(scopes, &["dependencies", name.as_str()]))?),
                };
                compiled.push((name.clone(), dependency));
            }
            keywords.push(Keyword::Dependencies(compiled));
        }

        let combinators: [(&str, fn(Vec<usize>) -> Keyword); 3] = [
            ("allOf", Keyword::AllOf),
            ("anyOf", Keyword::AnyOf),
            ("oneOf", Keyword::OneOf),
        ];
        for (name, make) in combinators {
            let Some(schemas) = map.get(name) else {
                continue;
            };
            let Json::Array(schemas) = schemas else {
                return Err(invalid(pointer, format!("'{name}' must be an array")));
            };
            let mut compiled = Vec::with_capacity(schemas.len());
            for (i, schema) in schemas.iter().enumerate() {
                let index = i.to_string();
                compiled.push(self.compile_node(schema, &descend(scopes, &[name, index.as_str()]))?);
            }
            keywords.push(make(compiled));
        }

        if let Some(not) = map.get("not") {
            let child = self.compile_node(not, &descend(scopes, &["not"]))?;
            keywords.push(Keyword::Not(child));
        }

        if let Some(condition) = map.get("if") {
            let condition = self.compile_node(condition, &descend(scopes, &["if"]))?;
            let then = match map.get("then") {
                Some(schema) => Some(self.compile_node(schema, &descend(scopes, &["then"]))?),
                None => None,
            };
            let otherwise = match map.get("else") {
                Some(schema) => Some(self.compile_node(schema, &descend(scopes, &["else"]))?),
                None => None,
            };
            keywords.push(Keyword::Conditional {
                condition,
                then,
                otherwise,
            });
        }

        Ok(keywords)
    }
}

fn string_list(value: &Json, pointer: &str, keyword: &str) -> Result<Vec<String>, SchemaError> {
    let Json::Array(items) = value else {
        return Err(invalid(pointer, format!("'{keyword}' must be an array of strings")));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(pointer, format!("'{keyword}' must be an array of strings")))
        })
        .collect()
}
