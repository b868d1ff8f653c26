//! Path navigation over JSON documents.
//!
//! Datum locations and data patches address values with one of two path
//! notations:
//!
//! - dotted paths, optionally rooted with `$`: `payment.total.payable`,
//!   `$.drivers[0].name`
//! - JSON pointers: `/drivers/0/name`
//!
//! An empty path (or a bare `$`) addresses the document root.

use serde_json::{Map, Value};

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object member.
    Key(String),
    /// Array element.
    Index(usize),
}

/// Parses a path into segments.
///
/// Dotted paths treat `name[3]` as a key followed by an index. JSON pointer
/// tokens that are all digits become indexes; `~1` and `~0` are unescaped.
#[must_use]
pub fn parse(path: &str) -> Vec<PathSegment> {
    let path = path.trim();
    if let Some(pointer) = path.strip_prefix('/') {
        return pointer
            .split('/')
            .map(|token| {
                let token = token.replace("~1", "/").replace("~0", "~");
                match token.parse::<usize>() {
                    Ok(index) if !token.is_empty() => PathSegment::Index(index),
                    _ => PathSegment::Key(token),
                }
            })
            .collect();
    }

    let path = path.strip_prefix('$').unwrap_or(path);
    let mut segments = Vec::new();
    for part in path.split('.').filter(|p| !p.is_empty()) {
        let mut rest = part;
        if let Some(open) = rest.find('[') {
            let key = &rest[..open];
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_owned()));
            }
            rest = &rest[open..];
            while let Some(inner) = rest.strip_prefix('[') {
                let Some(close) = inner.find(']') else {
                    segments.push(PathSegment::Key(rest.to_owned()));
                    break;
                };
                let index = &inner[..close];
                match index.parse::<usize>() {
                    Ok(i) => segments.push(PathSegment::Index(i)),
                    Err(_) => segments.push(PathSegment::Key(
                        index.trim_matches(|c| c == '\'' || c == '"').to_owned(),
                    )),
                }
                rest = &inner[close + 1..];
            }
        } else {
            segments.push(PathSegment::Key(rest.to_owned()));
        }
    }
    segments
}

/// Returns the value at `path`, or `None` if any step is missing.
#[must_use]
pub fn get<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    parse(path)
        .iter()
        .try_fold(document, |current, segment| match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(*index),
        })
}

/// Writes `value` at `path`, creating intermediate objects as needed.
///
/// Returns `false` without modifying anything when the path runs through a
/// scalar or past the end of an array.
pub fn set(document: &mut Value, path: &str, value: Value) -> bool {
    let segments = parse(path);
    let Some((last, parents)) = segments.split_last() else {
        *document = value;
        return true;
    };

    let mut current = document;
    for segment in parents {
        current = match segment {
            PathSegment::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                let Some(map) = current.as_object_mut() else {
                    return false;
                };
                map.entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()))
            }
            PathSegment::Index(index) => match current.get_mut(*index) {
                Some(next) => next,
                None => return false,
            },
        };
    }

    match last {
        PathSegment::Key(key) => {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            match current.as_object_mut() {
                Some(map) => {
                    map.insert(key.clone(), value);
                    true
                }
                None => false,
            }
        }
        PathSegment::Index(index) => match current.get_mut(*index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
    }
}

/// Removes the value at `path` and returns it.
pub fn remove(document: &mut Value, path: &str) -> Option<Value> {
    let segments = parse(path);
    let (last, parents) = segments.split_last()?;
    let parent = parents
        .iter()
        .try_fold(document, |current, segment| match segment {
            PathSegment::Key(key) => current.get_mut(key.as_str()),
            PathSegment::Index(index) => current.get_mut(*index),
        })?;
    match (last, parent) {
        (PathSegment::Key(key), Value::Object(map)) => map.remove(key),
        (PathSegment::Index(index), Value::Array(items)) if *index < items.len() => {
            Some(items.remove(*index))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_dotted_path_with_indexes() {
        assert_eq!(
            parse("$.drivers[1].name"),
            vec![
                PathSegment::Key("drivers".into()),
                PathSegment::Index(1),
                PathSegment::Key("name".into()),
            ]
        );
    }

    #[test]
    fn test_parse_json_pointer_unescapes_tokens() {
        assert_eq!(
            parse("/a~1b/0"),
            vec![PathSegment::Key("a/b".into()), PathSegment::Index(0)]
        );
    }

    #[test]
    fn test_get_supports_both_notations() {
        let doc = json!({ "payment": { "total": { "payable": "99.50" } }, "items": [1, 2] });

        assert_eq!(get(&doc, "payment.total.payable"), Some(&json!("99.50")));
        assert_eq!(get(&doc, "/payment/total/payable"), Some(&json!("99.50")));
        assert_eq!(get(&doc, "items[1]"), Some(&json!(2)));
        assert_eq!(get(&doc, "payment.missing"), None);
        assert_eq!(get(&doc, ""), Some(&doc));
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({});

        assert!(set(&mut doc, "property.address.postcode", json!("3000")));

        assert_eq!(doc, json!({ "property": { "address": { "postcode": "3000" } } }));
    }

    #[test]
    fn test_set_refuses_to_walk_through_scalar() {
        let mut doc = json!({ "name": "Ada" });

        assert!(!set(&mut doc, "name.first", json!("x")));
        assert_eq!(doc, json!({ "name": "Ada" }));
    }

    #[test]
    fn test_set_out_of_range_index_is_refused() {
        let mut doc = json!({ "items": [1] });

        assert!(!set(&mut doc, "items[3]", json!(9)));
    }

    #[test]
    fn test_remove_returns_removed_value() {
        let mut doc = json!({ "a": { "b": 1, "c": 2 } });

        assert_eq!(remove(&mut doc, "a.b"), Some(json!(1)));
        assert_eq!(doc, json!({ "a": { "c": 2 } }));
        assert_eq!(remove(&mut doc, "a.zzz"), None);
    }
}
