use std::fmt::Write;

/// An array element index or object member name in a node's location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Index(usize),
    Name(String),
}

/// Renders a location as a normalized path, e.g. `$['a'][0]`.
pub fn normalized(location: &[PathElement]) -> String {
    let mut path = String::from("$");
    for element in location {
        match element {
            PathElement::Index(i) => {
                let _ = write!(path, "[{i}]");
            }
            PathElement::Name(name) => {
                path.push_str("['");
                for ch in name.chars() {
                    match ch {
                        '\'' => path.push_str("\\'"),
                        '\\' => path.push_str("\\\\"),
                        '\u{8}' => path.push_str("\\b"),
                        '\u{c}' => path.push_str("\\f"),
                        '\n' => path.push_str("\\n"),
                        '\r' => path.push_str("\\r"),
                        '\t' => path.push_str("\\t"),
                        ch if ch < ' ' => {
                            let _ = write!(path, "\\u{:04x}", ch as u32);
                        }
                        ch => path.push(ch),
                    }
                }
                path.push_str("']");
            }
        }
    }
    path
}

/// Renders a location as an RFC 6901 JSON pointer, e.g. `/a/0`.
pub fn pointer(location: &[PathElement]) -> String {
    let mut pointer = String::new();
    for element in location {
        pointer.push('/');
        match element {
            PathElement::Index(i) => {
                let _ = write!(pointer, "{i}");
            }
            PathElement::Name(name) => pointer.push_str(&name.replace('~', "~0").replace('/', "~1")),
        }
    }
    pointer
}
