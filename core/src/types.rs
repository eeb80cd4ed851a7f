//! Dynamic request/response shapes.
//!
//! # Design
//! The provisioning API has no published schema and entities grow fields
//! over time, so bodies travel as JSON maps rather than typed structs.
//! Callers index a `Resource` by the key names they know; fields the server
//! omits are simply absent.

use serde_json::{Map, Value};

use crate::error::{ProvisioningError, Result};

/// Request body: top-level keys are camel-cased before sending.
pub type Params = Map<String, Value>;

/// One decoded JSON object from a response.
pub type Resource = Map<String, Value>;

/// A decoded success response.
///
/// List endpoints answer with a bare JSON array and singular ones with a
/// bare object; `Empty` covers bodiless answers such as a `204` when the
/// caller has configured it as a success status.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Object(Resource),
    List(Vec<Resource>),
    Empty,
}

impl Decoded {
    /// Decode a response body.
    ///
    /// Every array element must itself be an object. Scalars at the top
    /// level are rejected.
    pub fn from_body(body: &str) -> Result<Self> {
        if body.trim().is_empty() {
            return Ok(Decoded::Empty);
        }
        let value: Value =
            serde_json::from_str(body).map_err(|e| ProvisioningError::Decode(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(Decoded::Object(map)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(ProvisioningError::Decode(format!(
                        "array element {i} is not an object: {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Decoded::List),
            other => Err(ProvisioningError::Decode(format!(
                "expected a JSON object or array, got {other}"
            ))),
        }
    }

    /// The single object of a singular endpoint. `Empty` yields an empty map.
    pub fn into_object(self) -> Result<Resource> {
        match self {
            Decoded::Object(map) => Ok(map),
            Decoded::Empty => Ok(Resource::new()),
            Decoded::List(items) => Err(ProvisioningError::Decode(format!(
                "expected a JSON object, got an array of {} elements",
                items.len()
            ))),
        }
    }

    /// Like `into_object`, but a list answer yields its first element.
    pub fn into_first_object(self) -> Result<Resource> {
        match self {
            Decoded::List(items) => items.into_iter().next().ok_or_else(|| {
                ProvisioningError::Decode("expected a JSON object, got an empty array".to_string())
            }),
            other => other.into_object(),
        }
    }

    /// The elements of a list endpoint. `Empty` yields no elements.
    pub fn into_list(self) -> Result<Vec<Resource>> {
        match self {
            Decoded::List(items) => Ok(items),
            Decoded::Empty => Ok(Vec::new()),
            Decoded::Object(_) => Err(ProvisioningError::Decode(
                "expected a JSON array, got an object".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_body_keeps_its_keys() {
        let decoded =
            Decoded::from_body(r#"{"href":"http://host/v1/applications/108000","name":"API Test"}"#)
                .unwrap();
        let Decoded::Object(map) = decoded else {
            panic!("expected an object");
        };
        assert_eq!(map.len(), 2);
        assert_eq!(map["name"], "API Test");
    }

    #[test]
    fn array_body_becomes_ordered_list() {
        let decoded = Decoded::from_body(r#"[{"name":"a"},{"name":"b","extra":1}]"#).unwrap();
        let items = decoded.into_list().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "a");
        assert_eq!(items[1].len(), 2);
    }

    #[test]
    fn blank_body_is_empty() {
        assert_eq!(Decoded::from_body("").unwrap(), Decoded::Empty);
        assert_eq!(Decoded::from_body("  \n").unwrap(), Decoded::Empty);
    }

    #[test]
    fn scalar_body_is_rejected() {
        assert!(matches!(
            Decoded::from_body("42"),
            Err(ProvisioningError::Decode(_))
        ));
        assert!(matches!(
            Decoded::from_body(r#"[{"a":1}, "b"]"#),
            Err(ProvisioningError::Decode(_))
        ));
    }

    #[test]
    fn malformed_body_is_rejected() {
        assert!(matches!(
            Decoded::from_body("not json"),
            Err(ProvisioningError::Decode(_))
        ));
    }

    #[test]
    fn shape_accessors() {
        let list = Decoded::from_body(r#"[{"id":"1"}]"#).unwrap();
        assert!(list.clone().into_object().is_err());
        assert_eq!(list.into_first_object().unwrap()["id"], "1");

        let object = Decoded::from_body(r#"{"id":"1"}"#).unwrap();
        assert!(object.clone().into_list().is_err());
        assert_eq!(object.into_first_object().unwrap()["id"], "1");

        assert!(Decoded::List(Vec::new()).into_first_object().is_err());
        assert!(Decoded::Empty.into_list().unwrap().is_empty());
    }
}
