//! Resume metadata — the fixed extraction schema plus an opaque bag for unknown keys.
//!
//! Model output is never trusted as-is: `from_model_output` is the validation boundary
//! between the extraction prompt's JSON and the typed record stored on a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::llm_client::strip_json_fences;

/// Keys the extraction prompt asks for, in prompt order.
pub const METADATA_KEYS: [&str; 5] = ["name", "email", "phone", "address", "skills"];

/// Placeholder strings models emit instead of leaving a field out.
const EMPTY_MARKERS: &[&str] = &["", "null", "none", "n/a", "na", "unknown", "not provided"];

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("metadata must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeMetadata {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub skills: Vec<String>,
    /// Unrecognized keys, kept verbatim for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ResumeMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
            && self.skills.is_empty()
            && self.extra.is_empty()
    }

    /// Schema keys the record has no value for.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        METADATA_KEYS
            .into_iter()
            .filter(|key| match *key {
                "name" => self.name.is_none(),
                "email" => self.email.is_none(),
                "phone" => self.phone.is_none(),
                "address" => self.address.is_none(),
                "skills" => self.skills.is_empty(),
                _ => false,
            })
            .collect()
    }

    /// Parses and validates the raw text returned for an extraction prompt.
    pub fn from_model_output(text: &str) -> Result<Self, MetadataError> {
        let value: Value = serde_json::from_str(strip_json_fences(text))?;
        Self::from_value(value)
    }

    /// Validates an arbitrary JSON value against the metadata schema.
    pub fn from_value(value: Value) -> Result<Self, MetadataError> {
        let mut object = match value {
            Value::Object(map) => map,
            other => return Err(MetadataError::NotAnObject(json_kind(&other))),
        };

        let email = take_scalar(&mut object, "email").and_then(|email| {
            if is_plausible_email(&email) {
                Some(email)
            } else {
                warn!("Dropping implausible email from extracted metadata: {email:?}");
                None
            }
        });

        Ok(Self {
            name: take_scalar(&mut object, "name"),
            email,
            phone: take_scalar(&mut object, "phone"),
            address: take_scalar(&mut object, "address"),
            skills: take_skills(&mut object),
            extra: object.into_iter().collect(),
        })
    }

    /// Renders the metadata as a bullet list for the chat system prompt.
    pub fn format_for_prompt(&self) -> String {
        if self.is_empty() {
            return "No metadata has been extracted yet.".to_string();
        }

        let mut lines = Vec::new();
        let fields = [
            ("Name", &self.name),
            ("Email", &self.email),
            ("Phone", &self.phone),
            ("Address", &self.address),
        ];
        for (label, value) in fields {
            if let Some(value) = value {
                lines.push(format!("- {label}: {value}"));
            }
        }
        if !self.skills.is_empty() {
            lines.push(format!("- Skills: {}", self.skills.join(", ")));
        }
        for (key, value) in &self.extra {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("- {key}: {rendered}"));
        }
        lines.join("\n")
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if EMPTY_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn take_scalar(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => normalize(&s),
        // Phone numbers in particular come back as bare numbers.
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => {
            warn!("Ignoring non-scalar metadata field {key}: {other}");
            None
        }
    }
}

fn take_skills(object: &mut Map<String, Value>) -> Vec<String> {
    let raw: Vec<String> = match object.remove("skills") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .filter_map(|s| normalize(s))
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
