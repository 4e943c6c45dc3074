use chrono::SecondsFormat;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::store::Record;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Record {external_id} has no payload")]
    MissingPayload { external_id: String },

    #[error("Document for record {external_id} has no string id")]
    MissingId { external_id: String },

    #[error("Cannot transform record {external_id}: {message}")]
    Invalid { external_id: String, message: String },
}

/// Maps a stored record to zero or more search documents
pub trait Transform: Send + Sync {
    fn transform(&self, record: &Record) -> Result<Vec<Value>, TransformError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// Optional labelling service consulted by [`EnvelopeTransform`]
pub trait Classifier: Send + Sync {
    fn classify(&self, record: &Record) -> Option<Classification>;
}

/// Wraps the raw payload in a provider-independent envelope.
#[derive(Clone, Default)]
pub struct EnvelopeTransform {
    classifier: Option<Arc<dyn Classifier>>,
}

impl EnvelopeTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }
}

impl Transform for EnvelopeTransform {
    fn transform(&self, record: &Record) -> Result<Vec<Value>, TransformError> {
        let payload = record
            .payload
            .clone()
            .ok_or_else(|| TransformError::MissingPayload {
                external_id: record.external_id.clone(),
            })?;

        let mut doc = Map::new();
        doc.insert("id".to_string(), json!(record.external_id));
        doc.insert("source".to_string(), json!(record.authority));
        doc.insert(
            "sourceUpdatedTime".to_string(),
            json!(record.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        if let Some(created) = record.created_at {
            doc.insert(
                "producedBy_resultTime".to_string(),
                json!(created.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        doc.insert("sourceRecord".to_string(), payload);

        if let Some(classification) = self.classifier.as_ref().and_then(|c| c.classify(record)) {
            doc.insert("classification".to_string(), json!(classification.label));
            doc.insert(
                "classificationConfidence".to_string(),
                json!(classification.confidence),
            );
        }

        Ok(vec![Value::Object(doc)])
    }
}
