//! Stage request bodies.
//!
//! Bodies are parsed leniently: anything that is not a JSON object yields an all-defaults
//! request, fields of the wrong type are ignored, and flags follow JSON truthiness.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::transforms::TransformOptions;

fn empty_recipe() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    pub denoise: bool,
    pub normalize: bool,
    pub resample: bool,
    pub export_png: bool,
    pub export_zip: bool,
    pub recipe: Value,
}

impl Default for PreprocessRequest {
    fn default() -> Self {
        Self {
            run_id: None,
            source_key: None,
            denoise: false,
            normalize: false,
            resample: false,
            export_png: false,
            export_zip: false,
            recipe: empty_recipe(),
        }
    }
}

impl PreprocessRequest {
    pub fn from_body(body: &str) -> Self {
        parse_body(body, "preprocess")
            .map(|fields| Self::from_fields(&fields))
            .unwrap_or_default()
    }

    pub fn from_value(value: &Value) -> Self {
        value
            .as_object()
            .map(Self::from_fields)
            .unwrap_or_default()
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            run_id: string_field(fields, "run_id"),
            source_key: string_field(fields, "source_key"),
            denoise: flag(fields, "denoise"),
            normalize: flag(fields, "normalize"),
            resample: flag(fields, "resample"),
            export_png: flag(fields, "export_png"),
            export_zip: flag(fields, "export_zip"),
            recipe: recipe_field(fields),
        }
    }

    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions {
            denoise: self.denoise,
            normalize: self.normalize,
            resample: self.resample,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,
    pub export_png: bool,
    pub recipe: Value,
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            run_id: None,
            source_key: None,
            input_key: None,
            export_png: false,
            recipe: empty_recipe(),
        }
    }
}

impl SynthesisRequest {
    pub fn from_body(body: &str) -> Self {
        parse_body(body, "synthesis")
            .map(|fields| Self::from_fields(&fields))
            .unwrap_or_default()
    }

    pub fn from_value(value: &Value) -> Self {
        value
            .as_object()
            .map(Self::from_fields)
            .unwrap_or_default()
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            run_id: string_field(fields, "run_id"),
            source_key: string_field(fields, "source_key"),
            input_key: string_field(fields, "input_key"),
            export_png: flag(fields, "export_png"),
            recipe: recipe_field(fields),
        }
    }

    /// The explicit key, if any: `source_key` first, then `input_key`.
    pub fn explicit_key(&self) -> Option<&str> {
        self.source_key.as_deref().or(self.input_key.as_deref())
    }
}

fn parse_body(body: &str, stage: &'static str) -> Option<Map<String, Value>> {
    if body.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => Some(fields),
        Ok(other) => {
            tracing::warn!(
                target: "stages.request",
                stage,
                body_type = json_type_name(&other),
                "request_body_not_an_object"
            );
            None
        }
        Err(err) => {
            tracing::warn!(
                target: "stages.request",
                stage,
                error = %err,
                "request_body_unparseable"
            );
            None
        }
    }
}

/// Strings only; blank strings count as absent.
fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

fn flag(fields: &Map<String, Value>, name: &str) -> bool {
    fields.get(name).is_some_and(truthy)
}

fn recipe_field(fields: &Map<String, Value>) -> Value {
    fields.get("recipe").cloned().unwrap_or_else(empty_recipe)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
