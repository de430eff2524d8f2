//! Task labels
//!
//! Labels ride on a [`TypedMap`] so embedders can attach their own keys, but
//! the runtime only interprets the well-known set below: inspection-type
//! scoping, feature toggling and presentation, progress reportability and the
//! required flag.

use std::sync::Arc;

use crate::typedmap::{TypedKey, TypedMap};

/// Feature tasks without an explicit order sort last.
const UNORDERED: i64 = i64::MAX;

fn inspection_types_key() -> TypedKey<Vec<String>> {
    TypedKey::new("khronicle.label.inspection-types")
}
fn is_feature_key() -> TypedKey<bool> {
    TypedKey::new("khronicle.label.is-feature")
}
fn is_default_feature_key() -> TypedKey<bool> {
    TypedKey::new("khronicle.label.is-default-feature")
}
fn feature_title_key() -> TypedKey<String> {
    TypedKey::new("khronicle.label.feature-title")
}
fn feature_description_key() -> TypedKey<String> {
    TypedKey::new("khronicle.label.feature-description")
}
fn feature_order_key() -> TypedKey<i64> {
    TypedKey::new("khronicle.label.feature-order")
}
fn progress_reportable_key() -> TypedKey<bool> {
    TypedKey::new("khronicle.label.progress-reportable")
}
fn is_required_key() -> TypedKey<bool> {
    TypedKey::new("khronicle.label.is-required")
}
fn form_field_key() -> TypedKey<FormLabel> {
    TypedKey::new("khronicle.label.form-field")
}

/// Presentation info for form tasks, published alongside the field descriptor.
#[derive(Clone, Debug)]
pub struct FormLabel {
    pub label: String,
    pub description: String,
}

/// Immutable label set attached to each task.
#[derive(Clone, Default, Debug)]
pub struct LabelSet {
    map: TypedMap,
}

impl LabelSet {
    pub fn builder() -> LabelSetBuilder {
        LabelSetBuilder {
            map: TypedMap::new(),
        }
    }

    /// Inspection types this task is scoped to; `None` means universal.
    pub fn inspection_types(&self) -> Option<Arc<Vec<String>>> {
        self.map.get(&inspection_types_key())
    }

    /// True when the task may be used by the given inspection type.
    pub fn usable_for(&self, type_id: &str) -> bool {
        match self.inspection_types() {
            Some(types) => types.iter().any(|t| t == type_id),
            None => true,
        }
    }

    pub fn is_feature(&self) -> bool {
        self.map.get_cloned(&is_feature_key()).unwrap_or(false)
    }

    pub fn is_default_feature(&self) -> bool {
        self.map
            .get_cloned(&is_default_feature_key())
            .unwrap_or(false)
    }

    pub fn feature_title(&self) -> Option<Arc<String>> {
        self.map.get(&feature_title_key())
    }

    pub fn feature_description(&self) -> Option<Arc<String>> {
        self.map.get(&feature_description_key())
    }

    pub fn feature_order(&self) -> i64 {
        self.map.get_cloned(&feature_order_key()).unwrap_or(UNORDERED)
    }

    pub fn progress_reportable(&self) -> bool {
        self.map
            .get_cloned(&progress_reportable_key())
            .unwrap_or(false)
    }

    pub fn is_required(&self) -> bool {
        self.map.get_cloned(&is_required_key()).unwrap_or(false)
    }

    pub fn form(&self) -> Option<Arc<FormLabel>> {
        self.map.get(&form_field_key())
    }
}

/// Fluent label construction; mirrors the shape of the task builders.
pub struct LabelSetBuilder {
    map: TypedMap,
}

impl LabelSetBuilder {
    pub fn inspection_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map.set(
            &inspection_types_key(),
            types.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Mark as user-toggleable feature with its presentation strings.
    pub fn feature(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.map.set(&is_feature_key(), true);
        self.map.set(&feature_title_key(), title.into());
        self.map.set(&feature_description_key(), description.into());
        self
    }

    pub fn default_feature(mut self) -> Self {
        self.map.set(&is_default_feature_key(), true);
        self
    }

    pub fn feature_order(mut self, order: i64) -> Self {
        self.map.set(&feature_order_key(), order);
        self
    }

    pub fn progress_reportable(mut self) -> Self {
        self.map.set(&progress_reportable_key(), true);
        self
    }

    pub fn required(mut self) -> Self {
        self.map.set(&is_required_key(), true);
        self
    }

    pub fn form(mut self, label: impl Into<String>, description: impl Into<String>) -> Self {
        self.map.set(
            &form_field_key(),
            FormLabel {
                label: label.into(),
                description: description.into(),
            },
        );
        self
    }

    pub fn build(self) -> LabelSet {
        LabelSet { map: self.map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_labels_are_universal_non_feature() {
        let labels = LabelSet::default();
        assert!(labels.usable_for("gke"));
        assert!(!labels.is_feature());
        assert_eq!(labels.feature_order(), i64::MAX);
    }

    #[test]
    fn scoped_labels_reject_other_types() {
        let labels = LabelSet::builder().inspection_types(["gke"]).build();
        assert!(labels.usable_for("gke"));
        assert!(!labels.usable_for("oss-kubernetes"));
    }

    #[test]
    fn feature_labels_carry_presentation() {
        let labels = LabelSet::builder()
            .feature("Audit timeline", "Reconstructs resource revisions")
            .default_feature()
            .feature_order(10)
            .build();
        assert!(labels.is_feature());
        assert!(labels.is_default_feature());
        assert_eq!(labels.feature_order(), 10);
        assert_eq!(labels.feature_title().unwrap().as_str(), "Audit timeline");
    }
}
