use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::SyncOrchestrator;
use crate::platform::{AuthProvider, PlatformClient, ProgressCallback, Translator};
use crate::store::{EntityMappingStore, MappingStore, TaskStore};
use crate::sync::errors::{Result, SyncEngineError};
use crate::sync::resolver::{ConflictResolver, StatusRanking};
use crate::sync::types::SyncOptions;

/// Builder for [`SyncOrchestrator`].
///
/// Source, target, translator and both stores are required.
#[derive(Default)]
pub struct SyncOrchestratorBuilder {
    source: Option<Arc<dyn PlatformClient>>,
    target: Option<Arc<dyn PlatformClient>>,
    source_auth: Option<Arc<dyn AuthProvider>>,
    target_auth: Option<Arc<dyn AuthProvider>>,
    translator: Option<Arc<dyn Translator>>,
    mapping_store: Option<Arc<dyn MappingStore>>,
    task_store: Option<Arc<dyn TaskStore>>,
    ranking: Option<StatusRanking>,
    on_progress: Option<ProgressCallback>,
    webhook_options: Option<SyncOptions>,
}

impl SyncOrchestratorBuilder {
    pub fn source(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.source = Some(client);
        self
    }

    pub fn target(mut self, client: Arc<dyn PlatformClient>) -> Self {
        self.target = Some(client);
        self
    }

    /// Credentials refreshed once when Source answers 401.
    pub fn source_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.source_auth = Some(auth);
        self
    }

    /// Credentials refreshed once when Target answers 401.
    pub fn target_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.target_auth = Some(auth);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn mapping_store(mut self, store: Arc<dyn MappingStore>) -> Self {
        self.mapping_store = Some(store);
        self
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    /// Use one backend for both mappings and tasks.
    pub fn store<S>(self, store: Arc<S>) -> Self
    where
        S: MappingStore + TaskStore + 'static,
    {
        let tasks: Arc<dyn TaskStore> = store.clone();
        self.mapping_store(store).task_store(tasks)
    }

    /// Status rankings used for conflict resolution. Defaults to
    /// [`StatusRanking::default`].
    pub fn status_ranking(mut self, ranking: StatusRanking) -> Self {
        self.ranking = Some(ranking);
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Options for webhook-triggered tasks: conflict strategy and retry
    /// settings. Entity type and direction come from the event.
    pub fn webhook_options(mut self, options: SyncOptions) -> Self {
        self.webhook_options = Some(options);
        self
    }

    pub fn build(self) -> Result<Arc<SyncOrchestrator>> {
        let mapping_store = self
            .mapping_store
            .ok_or(SyncEngineError::MissingField {
                field: "mapping_store",
            })?;

        Ok(Arc::new(SyncOrchestrator {
            source: self
                .source
                .ok_or(SyncEngineError::MissingField { field: "source" })?,
            target: self
                .target
                .ok_or(SyncEngineError::MissingField { field: "target" })?,
            source_auth: self.source_auth,
            target_auth: self.target_auth,
            translator: self
                .translator
                .ok_or(SyncEngineError::MissingField { field: "translator" })?,
            mappings: EntityMappingStore::new(mapping_store),
            tasks: self
                .task_store
                .ok_or(SyncEngineError::MissingField { field: "task_store" })?,
            resolver: ConflictResolver::new(self.ranking.unwrap_or_default()),
            on_progress: self.on_progress.map(Arc::new),
            webhook_options: self.webhook_options.unwrap_or_default(),
            running: Mutex::new(HashMap::new()),
        }))
    }
}
