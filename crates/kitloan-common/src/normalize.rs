//! Tolerant normalization of backend payloads
//!
//! The backend wraps responses inconsistently: some endpoints return a bare
//! array or object, others wrap the same content in a `data` envelope. Each
//! resource goes through a single normalization function that tries the known
//! shapes in a fixed order and fails loudly with a typed error when none
//! match, never silently defaulting to empty.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Error;

fn unexpected(resource: &'static str, detail: impl Into<String>) -> Error {
    Error::UnexpectedPayload {
        resource,
        detail: detail.into(),
    }
}

fn decode<T: DeserializeOwned>(resource: &'static str, value: Value) -> Result<T, Error> {
    serde_json::from_value(value).map_err(|err| unexpected(resource, err.to_string()))
}

/// Normalize a list payload
///
/// Accepted shapes, in order: a bare array, a `data`-wrapped array, a
/// `data`-wrapped single object, a bare single object.
pub fn list<T: DeserializeOwned>(resource: &'static str, value: Value) -> Result<Vec<T>, Error> {
    match value {
        Value::Array(_) => decode(resource, value),
        Value::Object(mut map) => match map.remove("data") {
            Some(inner @ Value::Array(_)) => decode(resource, inner),
            Some(inner @ Value::Object(_)) => Ok(vec![decode(resource, inner)?]),
            Some(other) => Err(unexpected(
                resource,
                format!("`data` holds neither array nor object: {other}"),
            )),
            None => Ok(vec![decode(resource, Value::Object(map))?]),
        },
        other => Err(unexpected(
            resource,
            format!("neither array nor object: {other}"),
        )),
    }
}

/// Normalize a single-object payload
///
/// Accepted shapes, in order: a `data`-wrapped object, a bare object.
pub fn item<T: DeserializeOwned>(resource: &'static str, value: Value) -> Result<T, Error> {
    match value {
        Value::Object(mut map) => match map.remove("data") {
            Some(inner @ Value::Object(_)) => decode(resource, inner),
            Some(other) => Err(unexpected(
                resource,
                format!("`data` holds no object: {other}"),
            )),
            None => decode(resource, Value::Object(map)),
        },
        other => Err(unexpected(resource, format!("no object: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    struct Row {
        id: String,
    }

    #[test]
    fn test_list_accepts_known_shapes() {
        let bare = json!([{ "id": "a" }, { "id": "b" }]);
        let wrapped = json!({ "data": [{ "id": "a" }, { "id": "b" }] });
        let single = json!({ "data": { "id": "a" } });

        assert_eq!(list::<Row>("rows", bare).unwrap().len(), 2);
        assert_eq!(list::<Row>("rows", wrapped).unwrap().len(), 2);
        assert_eq!(list::<Row>("rows", single).unwrap().len(), 1);
    }

    #[test]
    fn test_list_fails_loudly() {
        let err = list::<Row>("rows", json!("nope")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedPayload { resource: "rows", .. }
        ));

        let err = list::<Row>("rows", json!({ "data": 42 })).unwrap_err();
        assert!(matches!(err, Error::UnexpectedPayload { .. }));
    }

    #[test]
    fn test_item_unwraps_data() {
        let wrapped = json!({ "data": { "id": "a" } });
        let bare = json!({ "id": "a" });

        assert_eq!(item::<Row>("row", wrapped).unwrap().id, "a");
        assert_eq!(item::<Row>("row", bare).unwrap().id, "a");
        assert!(item::<Row>("row", json!(3)).is_err());
    }
}
