//! Record types for table data.

use crate::{error::Result, Error, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row of a table: a string `id` plus arbitrary JSON fields.
///
/// Serialized flat, exactly as the remote table API returns it:
/// `{"id": "m1", "name": "Ali", "plan": "monthly"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier within the table
    pub id: RecordId,
    /// Every other column
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record from an id and a field map. An `id` key inside
    /// `fields` is dropped; the explicit id always wins.
    pub fn new(id: impl Into<RecordId>, mut fields: Map<String, Value>) -> Self {
        fields.remove("id");
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a record from a JSON value.
    ///
    /// The value must be an object carrying a non-empty string `id`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::InvalidRecord("record must be a JSON object".into()));
        };

        let id = match fields.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            Some(Value::String(_)) => {
                return Err(Error::InvalidRecord("record id must not be empty".into()))
            }
            Some(other) => {
                return Err(Error::InvalidRecord(format!(
                    "record id must be a string, got {other}"
                )))
            }
            None => return Err(Error::InvalidRecord("record is missing an id".into())),
        };

        Ok(Self { id, fields })
    }

    /// Convert back into a flat JSON object.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 1);
        object.insert("id".into(), Value::String(self.id.clone()));
        for (key, value) in &self.fields {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// Get a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Shallow-merge a patch into this record. `id` in the patch is ignored.
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Extract the field map from a patch value.
pub fn patch_fields(patch: &Value) -> Result<&Map<String, Value>> {
    patch
        .as_object()
        .ok_or_else(|| Error::InvalidRecord("patch must be a JSON object".into()))
}
