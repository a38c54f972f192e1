use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use tokio::sync::Mutex;

use super::Variables;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// External persistence for per-document variables.
pub trait VariableStore: Send + Sync {
    /// `None` when the document has never stored variables.
    fn load<'a>(&'a self, document_id: &'a str) -> StoreFuture<'a, Option<Variables>>;

    fn save<'a>(&'a self, document_id: &'a str, variables: &'a Variables) -> StoreFuture<'a, ()>;
}

/// In-process store, handy for tests and hosts that persist elsewhere.
#[derive(Default)]
pub struct MemoryVariableStore {
    documents: Mutex<HashMap<String, Variables>>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document_id: &str, variables: Variables) -> Self {
        let mut documents = HashMap::new();
        documents.insert(document_id.to_string(), variables);
        Self {
            documents: Mutex::new(documents),
        }
    }
}

impl VariableStore for MemoryVariableStore {
    fn load<'a>(&'a self, document_id: &'a str) -> StoreFuture<'a, Option<Variables>> {
        Box::pin(async move { Ok(self.documents.lock().await.get(document_id).cloned()) })
    }

    fn save<'a>(&'a self, document_id: &'a str, variables: &'a Variables) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.documents
                .lock()
                .await
                .insert(document_id.to_string(), variables.clone());
            Ok(())
        })
    }
}
