//! Test doubles shared by the service and API tests.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use super::KnowledgeService;
use crate::config::AppConfig;
use crate::db::{Database, Document, DocumentStatus};
use crate::error::{ModelError, ServiceResult, StorageError};
use crate::llm::{LanguageModel, ModelCompletion, ModelPrompt, ModelSettings};
use crate::storage::{BlobStore, LocalBlobStore};

pub(crate) const STUB_TOKENS_USED: u32 = 42;

/// What the stub model does on one call
#[derive(Debug, Clone)]
pub(crate) enum StubReply {
    Answer(String),
    Timeout,
    Generation(String),
}

/// Word groups the stub embedding treats as one meaning, one dimension each
const STUB_CONCEPTS: [&[&str]; 4] = [
    &["reactor", "core", "fission"],
    &["stop", "halt", "scram", "shutdown"],
    &["cooking", "pasta", "garlic"],
    &["weather", "rain", "valley"],
];

/// Embedding that places synonyms together, so ranking by it differs from
/// ranking by shared words
pub(crate) fn stub_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; STUB_CONCEPTS.len()];
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        for (dim, group) in STUB_CONCEPTS.iter().enumerate() {
            if group.contains(&word.as_str()) {
                vector[dim] += 1.0;
            }
        }
    }
    vector
}

/// Scripted model. Falls back to a fixed answer once the script runs out.
pub(crate) struct StubModel {
    script: Mutex<VecDeque<StubReply>>,
    delay: Option<Duration>,
    embeddings: bool,
    calls: AtomicUsize,
    embed_calls: AtomicUsize,
    prompts: Mutex<Vec<ModelPrompt>>,
}

impl StubModel {
    pub(crate) fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            delay: None,
            embeddings: true,
            calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn scripted(replies: impl IntoIterator<Item = StubReply>) -> Self {
        let stub = Self::new();
        stub.script.lock().unwrap().extend(replies);
        stub
    }

    /// Sleep before answering, for exercising the service-side deadline
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every embedding call, as a backend without the model would
    pub(crate) fn without_embeddings(mut self) -> Self {
        self.embeddings = false;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<ModelPrompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete(
        &self,
        prompt: &ModelPrompt,
        settings: &ModelSettings,
    ) -> Result<ModelCompletion, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StubReply::Answer("stub answer".to_string()));

        match reply {
            StubReply::Answer(text) => Ok(ModelCompletion {
                text,
                tokens_used: STUB_TOKENS_USED,
                model_id: settings.model.clone(),
            }),
            StubReply::Timeout => Err(ModelError::Timeout {
                model: settings.model.clone(),
                timeout_ms: settings.timeout.as_millis() as u64,
            }),
            StubReply::Generation(message) => Err(ModelError::Generation {
                status: 500,
                message,
            }),
        }
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if !self.embeddings {
            return Err(ModelError::ModelNotFound {
                model: model.to_string(),
            });
        }
        Ok(stub_embedding(text))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Local blob store that counts reads and can be made to fail them
pub(crate) struct CountingBlobStore {
    inner: LocalBlobStore,
    reads: AtomicUsize,
    fail_reads: AtomicBool,
    failing: Mutex<HashSet<String>>,
}

impl CountingBlobStore {
    pub(crate) fn new(inner: LocalBlobStore) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail reads of one blob only
    pub(crate) fn fail_reads_of(&self, reference: &str, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(reference.to_string());
        } else {
            failing.remove(reference);
        }
    }

    pub(crate) fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for CountingBlobStore {
    async fn put(&self, document_id: &str, filename: &str, data: &[u8]) -> ServiceResult<String> {
        self.inner.put(document_id, filename, data).await
    }

    async fn read(&self, reference: &str) -> ServiceResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst)
            || self.failing.lock().unwrap().contains(reference)
        {
            return Err(StorageError::Io {
                reference: reference.to_string(),
                source: std::io::Error::other("injected read failure"),
            }
            .into());
        }
        self.inner.read(reference).await
    }

    async fn delete(&self, reference: &str) -> ServiceResult<()> {
        self.inner.delete(reference).await
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// A service over an in-memory database, a temp-dir blob store and a stub model
pub(crate) struct TestHarness {
    pub service: Arc<KnowledgeService>,
    pub model: Arc<StubModel>,
    pub blobs: Arc<CountingBlobStore>,
    _dir: TempDir,
}

impl TestHarness {
    pub(crate) fn new() -> Self {
        Self::build(AppConfig::default(), StubModel::new())
    }

    pub(crate) fn with_config(config: AppConfig) -> Self {
        Self::build(config, StubModel::new())
    }

    pub(crate) fn with_model(model: StubModel) -> Self {
        Self::build(AppConfig::default(), model)
    }

    pub(crate) fn build(config: AppConfig, model: StubModel) -> Self {
        let dir = TempDir::new().unwrap();
        let blobs = Arc::new(CountingBlobStore::new(
            LocalBlobStore::new(dir.path().join("blobs")).unwrap(),
        ));
        let db = Arc::new(Database::open_in_memory().unwrap());
        let model = Arc::new(model);

        let service = Arc::new(KnowledgeService::new(
            config,
            db,
            blobs.clone(),
            model.clone(),
        ));

        Self {
            service,
            model,
            blobs,
            _dir: dir,
        }
    }

    /// Upload a file as a pending document
    pub(crate) async fn upload(&self, filename: &str, content: &[u8]) -> Document {
        self.service
            .create_document(None, filename, content, Some("9"))
            .await
            .unwrap()
    }

    /// Upload and ingest, asserting the run succeeds
    pub(crate) async fn processed(&self, filename: &str, content: &[u8]) -> Document {
        let doc = self.upload(filename, content).await;
        let done = self.service.ingest(&doc.id).await.unwrap();
        assert_eq!(done.status, DocumentStatus::Processed);
        done
    }
}
