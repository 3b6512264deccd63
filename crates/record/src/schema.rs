//! Record schema and field values.
//!
//! A [`Schema`] serialises to the same JSON shape it is declared in:
//! `{"input_ids": {"type": "int32", "shape": [-1]}}`. A shape entry of `-1`
//! marks a variable-length dimension.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use shardprep_common::{PrepError, PrepResult};

/// One record: field name → value. Field order on disk is name order.
pub type Record = BTreeMap<String, FieldValue>;

// ── Field types ─────────────────────────────────────────────────────────────

/// Element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bytes,
}

impl FieldType {
    /// Tag byte written before every field payload.
    pub fn code(&self) -> u8 {
        match self {
            FieldType::Int32 => 1,
            FieldType::Int64 => 2,
            FieldType::Float32 => 3,
            FieldType::Float64 => 4,
            FieldType::Bytes => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(FieldType::Int32),
            2 => Some(FieldType::Int64),
            3 => Some(FieldType::Float32),
            4 => Some(FieldType::Float64),
            5 => Some(FieldType::Bytes),
            _ => None,
        }
    }

    /// Bytes per element.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int32 | FieldType::Float32 => 4,
            FieldType::Int64 | FieldType::Float64 => 8,
            FieldType::Bytes => 1,
        }
    }
}

/// Declared type and shape of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "variable_shape")]
    pub shape: Vec<i64>,
}

fn variable_shape() -> Vec<i64> {
    vec![-1]
}

impl FieldSpec {
    pub fn new(field_type: FieldType, shape: Vec<i64>) -> Self {
        Self { field_type, shape }
    }

    /// Element count every value must have, or `None` if any dimension is `-1`.
    pub fn fixed_len(&self) -> Option<usize> {
        if self.shape.iter().any(|&d| d < 0) {
            return None;
        }
        Some(self.shape.iter().map(|&d| d as usize).product())
    }
}

// ── Values ──────────────────────────────────────────────────────────────────

/// Array value of one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int32(_) => FieldType::Int32,
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::Float32(_) => FieldType::Float32,
            FieldValue::Float64(_) => FieldType::Float64,
            FieldValue::Bytes(_) => FieldType::Bytes,
        }
    }

    /// Element count.
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Int32(v) => v.len(),
            FieldValue::Int64(v) => v.len(),
            FieldValue::Float32(v) => v.len(),
            FieldValue::Float64(v) => v.len(),
            FieldValue::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            FieldValue::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Append the little-endian payload to `out`.
    pub fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            FieldValue::Int32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            FieldValue::Int64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            FieldValue::Float32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            FieldValue::Float64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            FieldValue::Bytes(v) => out.extend_from_slice(v),
        }
    }

    /// Decode a payload written by [`write_payload`](Self::write_payload).
    ///
    /// `bytes.len()` must be a multiple of the element width.
    pub fn read_payload(field_type: FieldType, bytes: &[u8]) -> Self {
        match field_type {
            FieldType::Int32 => FieldValue::Int32(
                bytes.chunks_exact(4).map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
            ),
            FieldType::Int64 => FieldValue::Int64(
                bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            FieldType::Float32 => FieldValue::Float32(
                bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect(),
            ),
            FieldType::Float64 => FieldValue::Float64(
                bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            FieldType::Bytes => FieldValue::Bytes(bytes.to_vec()),
        }
    }
}

// ── Schema ──────────────────────────────────────────────────────────────────

/// Field name → declared type and shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// The token-window schema: one variable-length int32 field.
    pub fn token_ids(field: &str) -> Self {
        Self::new().with_field(field, FieldSpec::new(FieldType::Int32, vec![-1]))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Reject schemas a writer cannot be bound to.
    pub fn check(&self) -> PrepResult<()> {
        if self.fields.is_empty() {
            return Err(PrepError::Schema("schema declares no fields".into()));
        }
        for (name, spec) in &self.fields {
            if name.is_empty() {
                return Err(PrepError::Schema("field names must not be empty".into()));
            }
            if spec.shape.iter().any(|&d| d == 0 || d < -1) {
                return Err(PrepError::Schema(format!(
                    "field '{name}' has invalid shape {:?}",
                    spec.shape
                )));
            }
        }
        Ok(())
    }

    /// Check that `record` has exactly the declared fields with matching types and shapes.
    pub fn validate(&self, record: &Record) -> PrepResult<()> {
        for (name, spec) in &self.fields {
            let value = record
                .get(name)
                .ok_or_else(|| PrepError::Schema(format!("record is missing field '{name}'")))?;
            if value.field_type() != spec.field_type {
                return Err(PrepError::Schema(format!(
                    "field '{name}' expects {:?}, got {:?}",
                    spec.field_type,
                    value.field_type()
                )));
            }
            if let Some(expected) = spec.fixed_len() {
                if value.len() != expected {
                    return Err(PrepError::Schema(format!(
                        "field '{name}' expects {expected} elements, got {}",
                        value.len()
                    )));
                }
            }
        }
        if let Some(extra) = record.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(PrepError::Schema(format!("field '{extra}' is not in the schema")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids_record(field: &str, ids: Vec<i32>) -> Record {
        let mut record = Record::new();
        record.insert(field.to_string(), FieldValue::Int32(ids));
        record
    }

    #[test]
    fn schema_json_shape() {
        let schema = Schema::token_ids("input_ids");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "input_ids": { "type": "int32", "shape": [-1] } })
        );
        let back: Schema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn validate_accepts_matching_record() {
        let schema = Schema::token_ids("input_ids");
        schema.validate(&ids_record("input_ids", vec![1, 2, 3])).unwrap();
    }

    #[test]
    fn validate_rejects_missing_extra_and_mistyped_fields() {
        let schema = Schema::token_ids("input_ids");
        assert!(schema.validate(&ids_record("tokens", vec![1])).is_err());

        let mut extra = ids_record("input_ids", vec![1]);
        extra.insert("labels".into(), FieldValue::Int32(vec![2]));
        assert!(schema.validate(&extra).is_err());

        let mut wrong = Record::new();
        wrong.insert("input_ids".into(), FieldValue::Int64(vec![1]));
        assert!(matches!(schema.validate(&wrong), Err(PrepError::Schema(_))));
    }

    #[test]
    fn fixed_shapes_are_enforced() {
        let schema = Schema::new().with_field("x", FieldSpec::new(FieldType::Int32, vec![2, 2]));
        schema.validate(&ids_record("x", vec![1, 2, 3, 4])).unwrap();
        assert!(schema.validate(&ids_record("x", vec![1, 2, 3])).is_err());
    }

    #[test]
    fn check_rejects_degenerate_schemas() {
        assert!(Schema::new().check().is_err());
        let zero = Schema::new().with_field("x", FieldSpec::new(FieldType::Int32, vec![0]));
        assert!(zero.check().is_err());
        Schema::token_ids("input_ids").check().unwrap();
    }

    #[test]
    fn payload_codec_preserves_values() {
        let values = [
            FieldValue::Int32(vec![-1, 0, i32::MAX]),
            FieldValue::Int64(vec![i64::MIN, 7]),
            FieldValue::Float32(vec![0.5, -2.25]),
            FieldValue::Float64(vec![1e-9]),
            FieldValue::Bytes(b"abc".to_vec()),
        ];
        for value in values {
            let mut buf = Vec::new();
            value.write_payload(&mut buf);
            assert_eq!(buf.len(), value.len() * value.field_type().width());
            assert_eq!(FieldValue::read_payload(value.field_type(), &buf), value);
        }
    }
}
