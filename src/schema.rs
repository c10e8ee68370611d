//! Validation of provider output against a task's field schema.
//!
//! Providers are untrusted: they wrap JSON in markdown fences, prepend chatty
//! sentences, return numbers where strings were asked for, or stop mid-object
//! when they run out of tokens. [`validate`] turns a [`Payload`] into a
//! [`ValidatedPayload`] holding only the fields the schema names, or rejects
//! it with a classified [`ProviderError`].
//!
//! Image payloads are checked separately by [`validate_image`].

use crate::error::ProviderError;
use crate::models::{FieldKind, FieldSpec, GeneratedImage, Payload};
use crate::utils::{looks_truncated, truncate_for_log};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*(.*?)\s*```$").expect("static regex"));

/// A field value that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

/// Provider output reduced to the fields a schema names.
///
/// Text values are trimmed. Optional fields that were absent, null or blank
/// are simply missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedPayload {
    fields: BTreeMap<String, FieldValue>,
}

impl ValidatedPayload {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.fields.get(name) {
            Some(FieldValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }
}

/// Validate a structured or textual payload against `schema`.
///
/// # Arguments
///
/// * `payload` - Provider output; raw text is parsed once, fences stripped
/// * `schema` - Fields to extract, in any order
///
/// # Returns
///
/// The schema's fields, trimmed, or the first violation:
///
/// - missing required field: `InvalidSchema`
/// - required field present but blank: `EmptyContent`
/// - enum value outside the allowed set: `InvalidSchema`. The match is
///   exact: no trimming, no case folding
/// - fields the schema doesn't mention are ignored
pub fn validate(payload: Payload, schema: &[FieldSpec]) -> Result<ValidatedPayload, ProviderError> {
    let object = match payload {
        Payload::Structured(map) => map,
        Payload::RawText(text) => parse_object(&text)?,
        other => {
            return Err(ProviderError::invalid_schema(format!(
                "expected a JSON object, got {}",
                other.describe()
            )));
        }
    };

    let mut fields = BTreeMap::new();
    for spec in schema {
        let raw = object.get(&spec.name).filter(|v| !v.is_null());
        let Some(raw) = raw else {
            if spec.required {
                return Err(ProviderError::invalid_schema(format!(
                    "missing required field `{}`",
                    spec.name
                )));
            }
            continue;
        };

        match coerce(spec, raw)? {
            Some(value) => {
                fields.insert(spec.name.clone(), value);
            }
            None if spec.required => {
                return Err(ProviderError::empty_content(format!(
                    "required field `{}` is blank",
                    spec.name
                )));
            }
            None => {}
        }
    }

    Ok(ValidatedPayload { fields })
}

/// Check an image payload and turn it into a [`GeneratedImage`].
pub fn validate_image(payload: Payload) -> Result<GeneratedImage, ProviderError> {
    match payload {
        Payload::ImageBytes { bytes, mime } => {
            if bytes.is_empty() {
                return Err(ProviderError::empty_content("image payload has no bytes"));
            }
            let sniffed = sniff_image_mime(&bytes).ok_or_else(|| {
                ProviderError::invalid_schema(format!(
                    "payload declared as {mime} is not a PNG, JPEG, WEBP or GIF image"
                ))
            })?;
            Ok(GeneratedImage::Bytes {
                bytes,
                mime: sniffed.to_string(),
            })
        }
        Payload::ImageUrl(url) => match url.scheme() {
            "http" | "https" => Ok(GeneratedImage::Url(url)),
            scheme => Err(ProviderError::invalid_schema(format!(
                "image url has unsupported scheme `{scheme}`"
            ))),
        },
        other => Err(ProviderError::invalid_schema(format!(
            "expected an image, got {}",
            other.describe()
        ))),
    }
}

/// Identify an image container from its magic bytes.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else {
        None
    }
}

/// Parse model text into a JSON object, tolerating fences and preambles.
fn parse_object(text: &str) -> Result<Map<String, Value>, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::empty_content("response text is empty"));
    }

    let unfenced = CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str());

    // Keep the outermost object if the model wrapped it in prose.
    let candidate = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        (Some(start), _) => &unfenced[start..],
        _ => unfenced,
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProviderError::invalid_schema(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
        Err(e) if looks_truncated(&e) => Err(ProviderError::invalid_schema(format!(
            "truncated JSON ({e}): {}",
            truncate_for_log(candidate, 120)
        ))),
        Err(e) => Err(ProviderError::invalid_schema(format!(
            "unparsable JSON ({e}): {}",
            truncate_for_log(candidate, 120)
        ))),
    }
}

/// Coerce one raw value. `Ok(None)` means present but blank.
fn coerce(spec: &FieldSpec, raw: &Value) -> Result<Option<FieldValue>, ProviderError> {
    match spec.kind {
        FieldKind::Text => {
            let text = match raw {
                Value::String(s) => s.trim().to_string(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(items) => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            Value::String(s) if !s.trim().is_empty() => parts.push(s.trim()),
                            Value::String(_) => {}
                            other => return Err(wrong_type(spec, other)),
                        }
                    }
                    parts.join(", ")
                }
                other => return Err(wrong_type(spec, other)),
            };
            Ok((!text.is_empty()).then_some(FieldValue::Text(text)))
        }
        FieldKind::Enum => {
            let Value::String(s) = raw else {
                return Err(wrong_type(spec, raw));
            };
            if s.trim().is_empty() {
                return Ok(None);
            }
            let value = s.as_str();
            if !spec.allowed_values.contains(value) {
                return Err(ProviderError::invalid_schema(format!(
                    "field `{}` has value `{}` outside the allowed set",
                    spec.name,
                    truncate_for_log(value, 60)
                )));
            }
            Ok(Some(FieldValue::Text(value.to_string())))
        }
        FieldKind::Flag => match raw {
            Value::Bool(b) => Ok(Some(FieldValue::Flag(*b))),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(FieldValue::Flag(true))),
                "false" => Ok(Some(FieldValue::Flag(false))),
                "" => Ok(None),
                _ => Err(wrong_type(spec, raw)),
            },
            other => Err(wrong_type(spec, other)),
        },
    }
}

fn wrong_type(spec: &FieldSpec, value: &Value) -> ProviderError {
    ProviderError::invalid_schema(format!(
        "field `{}` should be {:?}, got {}",
        spec.name,
        spec.kind,
        json_type(value)
    ))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
