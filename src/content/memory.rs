//! In-process content store
//!
//! Holds records behind a mutex and stages scope writes until `complete`.
//! Every publish call is recorded, and publish outcomes or hard faults can be
//! injected, which makes it the store the receiver tests run against.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use uuid::Uuid;

use super::{
    CultureSelection, Content, ContentScope, ContentStore, Publication, PublishResult,
    PublishStatus, check_publishable,
};
use crate::error::{StoreError, StoreResult};

/// Arguments of one publish call as the store received them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishCall {
    pub content_key: Uuid,
    pub cultures: CultureSelection,
    pub user_id: i32,
}

#[derive(Default)]
struct MemoryState {
    contents: HashMap<Uuid, Content>,
    publications: HashMap<(Uuid, String), Publication>,
    publish_calls: Vec<PublishCall>,
    save_count: usize,
    commit_count: usize,
    forced_publish_status: Option<PublishStatus>,
    publish_fault: Option<String>,
}

#[derive(Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a record outside of any scope.
    pub fn insert(&self, content: Content) {
        self.state().contents.insert(content.key, content);
    }

    /// Make every following publish report `status` instead of applying the rules.
    pub fn force_publish_status(&self, status: PublishStatus) {
        self.state().forced_publish_status = Some(status);
    }

    /// Make every following publish fail with a hard fault.
    pub fn fail_publish_with(&self, message: impl Into<String>) {
        self.state().publish_fault = Some(message.into());
    }

    pub fn publication(&self, key: Uuid, culture: &str) -> Option<Publication> {
        self.state()
            .publications
            .get(&(key, culture.to_string()))
            .cloned()
    }

    pub fn publication_count(&self) -> usize {
        self.state().publications.len()
    }

    pub fn publish_calls(&self) -> Vec<PublishCall> {
        self.state().publish_calls.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state().save_count
    }

    pub fn commit_count(&self) -> usize {
        self.state().commit_count
    }
}

impl ContentStore for MemoryContentStore {
    type Scope = MemoryScope;

    async fn get_by_id(&self, key: Uuid) -> StoreResult<Option<Content>> {
        Ok(self.state().contents.get(&key).cloned())
    }

    async fn create_scope(&self) -> StoreResult<MemoryScope> {
        Ok(MemoryScope {
            store: self.clone(),
            saved: HashMap::new(),
            publications: Vec::new(),
            saves: 0,
        })
    }
}

/// Writes staged by one unit of work
pub struct MemoryScope {
    store: MemoryContentStore,
    saved: HashMap<Uuid, Content>,
    publications: Vec<Publication>,
    saves: usize,
}

impl ContentScope for MemoryScope {
    async fn save(&mut self, content: &Content) -> StoreResult<()> {
        if !self.store.state().contents.contains_key(&content.key) {
            return Err(StoreError::MissingContent(content.key));
        }
        self.saved.insert(content.key, content.clone());
        self.saves += 1;
        Ok(())
    }

    async fn publish(
        &mut self,
        content: &Content,
        cultures: &CultureSelection,
        user_id: i32,
    ) -> StoreResult<PublishResult> {
        let (fault, forced) = {
            let mut state = self.store.state();
            state.publish_calls.push(PublishCall {
                content_key: content.key,
                cultures: cultures.clone(),
                user_id,
            });
            (
                state.publish_fault.clone(),
                state.forced_publish_status.clone(),
            )
        };

        if let Some(message) = fault {
            return Err(StoreError::Injected(message));
        }

        // Publish what this scope saved, falling back to the committed record.
        let current = match self.saved.get(&content.key) {
            Some(saved) => saved.clone(),
            None => self
                .store
                .state()
                .contents
                .get(&content.key)
                .cloned()
                .ok_or(StoreError::MissingContent(content.key))?,
        };

        let refusal = forced
            .filter(|status| *status != PublishStatus::Success)
            .or_else(|| check_publishable(&current, cultures));
        if let Some(status) = refusal {
            return Ok(PublishResult::failed(status));
        }

        let now = Utc::now();
        let targets = cultures.targets();
        for culture in &targets {
            self.publications.push(Publication {
                content_key: current.key,
                culture: culture.clone(),
                values: current.properties().clone(),
                published_by: user_id,
                published_at: now,
            });
        }

        Ok(PublishResult::succeeded(targets))
    }

    async fn complete(self) -> StoreResult<()> {
        let mut state = self.store.state();
        for (key, content) in self.saved {
            state.contents.insert(key, content);
        }
        for publication in self.publications {
            state.publications.insert(
                (publication.content_key, publication.culture.clone()),
                publication,
            );
        }
        state.save_count += self.saves;
        state.commit_count += 1;
        Ok(())
    }
}
