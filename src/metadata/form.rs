//! Form field descriptors
//!
//! Form tasks publish one descriptor each; the frontend renders the set in
//! publication order and echoes values back keyed by the task reference.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

/// Rendered widget kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldType {
    Text,
    Set,
    File,
}

/// How a field hint should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HintType {
    #[default]
    None,
    Info,
    Warning,
    Error,
}

/// One selectable option of a set-form field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormOption {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FormOption {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }
}

/// Published descriptor of one form field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    /// Task reference string; doubles as the request key.
    pub id: String,
    #[serde(rename = "type")]
    pub field_type: FormFieldType,
    pub label: String,
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hint: String,
    pub hint_type: HintType,
    pub default: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FormOption>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    pub allow_custom_value: bool,
    pub allow_add_all: bool,
    pub allow_remove_all: bool,
    /// Set-form/file pairing: token the frontend uploads against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_token: Option<String>,
}

impl FormField {
    pub fn new(id: impl Into<String>, field_type: FormFieldType) -> Self {
        Self {
            id: id.into(),
            field_type,
            label: String::new(),
            description: String::new(),
            hint: String::new(),
            hint_type: HintType::None,
            default: Value::Null,
            options: Vec::new(),
            suggestions: Vec::new(),
            allow_custom_value: false,
            allow_add_all: false,
            allow_remove_all: false,
            upload_token: None,
        }
    }
}

/// Ordered, internally locked set of published fields, keyed by field id.
#[derive(Debug, Default)]
pub struct FormFieldSet {
    fields: Mutex<Vec<FormField>>,
}

impl FormFieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a field; republishing under the same id replaces in place so
    /// repeated dry-runs keep a stable field order.
    pub fn publish(&self, field: FormField) {
        let mut fields = self.fields.lock();
        match fields.iter_mut().find(|f| f.id == field.id) {
            Some(existing) => *existing = field,
            None => fields.push(field),
        }
    }

    pub fn get(&self, id: &str) -> Option<FormField> {
        self.fields.lock().iter().find(|f| f.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.fields.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.lock().is_empty()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(&*self.fields.lock()).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_keeps_order_and_replaces_by_id() {
        let set = FormFieldSet::new();
        set.publish(FormField::new("a", FormFieldType::Text));
        set.publish(FormField::new("b", FormFieldType::Set));
        let mut updated = FormField::new("a", FormFieldType::Text);
        updated.hint = "fixed".into();
        updated.hint_type = HintType::Error;
        set.publish(updated);

        let value = set.to_value();
        let fields = value.as_array().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0]["id"], "a");
        assert_eq!(fields[0]["hint"], "fixed");
        assert_eq!(fields[1]["id"], "b");
    }

    #[test]
    fn empty_collections_are_omitted() {
        let set = FormFieldSet::new();
        set.publish(FormField::new("t", FormFieldType::Text));
        let value = set.to_value();
        assert!(value[0].get("options").is_none());
        assert!(value[0].get("suggestions").is_none());
    }
}
