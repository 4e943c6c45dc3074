use async_trait::async_trait;
use isb_harvest::export::{
    EnvelopeTransform, ExportError, ExportOptions, ExportPipeline, IndexError, SearchIndex,
    SolrIndex, Transform, TransformError,
};
use isb_harvest::store::{NewRecord, Record, RecordStore};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Keeps pushed batches in memory
#[derive(Default)]
struct MemoryIndex {
    batches: Mutex<Vec<Vec<Value>>>,
    fail_after: Option<usize>,
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn add_documents(&self, documents: &[Value]) -> Result<(), IndexError> {
        let mut batches = self.batches.lock().unwrap();
        if self.fail_after.is_some_and(|n| batches.len() >= n) {
            return Err(IndexError::Rejected {
                url: "memory".to_string(),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        batches.push(documents.to_vec());
        Ok(())
    }

    async fn commit(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Fails for one external id, emits an id-less document for another
struct Picky;

impl Transform for Picky {
    fn transform(&self, record: &Record) -> Result<Vec<Value>, TransformError> {
        match record.external_id.as_str() {
            "broken" => Err(TransformError::Invalid {
                external_id: record.external_id.clone(),
                message: "cannot map".to_string(),
            }),
            "anonymous" => Ok(vec![json!({"title": "no id"})]),
            id => Ok(vec![json!({"id": id}), json!({"id": format!("{}#child", id)})]),
        }
    }
}

async fn seeded_store(ids: &[&str]) -> RecordStore {
    let store = RecordStore::in_memory().await.unwrap();
    for id in ids {
        store
            .upsert(&NewRecord::new(*id, "GEOME").with_payload(json!({"name": id})))
            .await
            .unwrap();
    }
    store.mark_not_found("missing", "GEOME", None).await.unwrap();
    store
        .upsert(&NewRecord::new("other", "SESAR").with_payload(json!({})))
        .await
        .unwrap();
    store
}

fn options(batch_size: usize) -> ExportOptions {
    ExportOptions {
        authority: Some("GEOME".to_string()),
        batch_size,
        page_size: 2,
        ..ExportOptions::default()
    }
}

#[tokio::test]
async fn test_failing_transform_skips_only_its_record() {
    let store = seeded_store(&["a", "broken", "anonymous", "b"]).await;
    let pipeline = ExportPipeline::new(store, Picky, MemoryIndex::default(), options(3));

    let report = pipeline.run().await.unwrap();

    assert_eq!(report.records, 4);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.documents, 4);
    let ids: Vec<&str> = report.pushed_ids.iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["a", "a#child", "b", "b#child"]);
}

#[tokio::test]
async fn test_batches_are_committed() {
    let store = seeded_store(&["a", "b", "c"]).await;
    let index = MemoryIndex::default();
    let pipeline = ExportPipeline::new(store, EnvelopeTransform::new(), index, options(2));

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.documents, 3);
    assert_eq!(report.batches, 2);
}

#[tokio::test]
async fn test_index_failure_halts_run() {
    let store = seeded_store(&["a", "b", "c", "d", "e"]).await;
    let index = MemoryIndex {
        fail_after: Some(1),
        ..MemoryIndex::default()
    };
    let pipeline = ExportPipeline::new(store, EnvelopeTransform::new(), index, options(2));

    let result = pipeline.run().await;
    assert!(matches!(result, Err(ExportError::Index(IndexError::Rejected { status: 503, .. }))));
}

#[tokio::test]
async fn test_export_to_solr() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/solr/records/update"))
        .and(query_param("overwrite", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/solr/records/update"))
        .and(query_param("commit", "true"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = seeded_store(&["a", "b"]).await;
    let index = SolrIndex::new(Client::new(), format!("{}/solr/records/", server.uri()));
    let pipeline = ExportPipeline::new(store, EnvelopeTransform::new(), index, options(100));

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.documents, 2);
    assert!(report.pushed_ids.contains("a"));
}

#[tokio::test]
async fn test_any_success_status_is_exported() {
    let store = RecordStore::in_memory().await.unwrap();
    store
        .upsert(&NewRecord::new("r203", "TEST").with_status(203).with_payload(json!({})))
        .await
        .unwrap();
    let index = MemoryIndex::default();
    let pipeline =
        ExportPipeline::new(store, EnvelopeTransform::new(), index, ExportOptions::default());

    let report = pipeline.run().await.unwrap();
    assert_eq!(report.records, 1);
    assert_eq!(report.documents, 1);
    assert!(report.pushed_ids.contains("r203"));
}
