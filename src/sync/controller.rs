//! Load, edit, validate and save one editable document.
//!
//! The controller is owned by a single task. Requests to the source run on
//! spawned tasks that report back through a queue; the owner applies them with
//! [`ConfigSyncController::settle`] or [`ConfigSyncController::try_settle`], so
//! the document and both validation results are only ever touched by the owner.
//!
//! Two results are kept: `local`, recomputed on every edit and save attempt,
//! and `displayed`, which is `local` plus any server-reported errors that have
//! not been addressed yet. A server error is addressed by editing its path,
//! an ancestor or a descendant, including edits made while the rejected save
//! was still in flight.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::ApiConfig;
use crate::document::{ConfigDocument, DocumentError, FieldPath, FieldValue};
use crate::observability::metrics;
use crate::sync::rejection::SaveFailure;
use crate::sync::source::{ConfigSource, HttpConfigSource, SyncError};
use crate::validation::{validate, RuleSet, ValidationResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

/// What happened to a save request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The document was sent; the result arrives through `settle`.
    Submitted,
    /// A previous save has not completed; nothing was sent.
    InFlight,
    /// Errors block the save; nothing was sent.
    Blocked { invalid_paths: Vec<String> },
    /// No document loaded, or the controller was disposed.
    Unavailable,
}

/// The message shown next to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Saved,
    LocalErrors,
    ServerRejected,
    SaveFailed(String),
    LoadFailed(String),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Saved => f.write_str("Saved successfully"),
            Notice::LocalErrors => f.write_str("Fix validation errors before saving"),
            Notice::ServerRejected => f.write_str("Server-side validation errors; fix before saving"),
            Notice::SaveFailed(reason) => write!(f, "Save failed: {}", reason),
            Notice::LoadFailed(reason) => write!(f, "Failed to load: {}", reason),
        }
    }
}

enum Completion {
    Loaded(Result<ConfigDocument, SyncError>),
    Saved(Result<(), SyncError>),
}

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct ConfigSyncController<S: ConfigSource> {
    source: Arc<S>,
    rules: RuleSet,
    document: Option<ConfigDocument>,
    load_state: LoadState,
    local: ValidationResult,
    displayed: ValidationResult,
    server_errors: IndexMap<String, String>,
    awaiting_edit: bool,
    notice: Option<Notice>,
    revision: u64,
    clean_revision: u64,
    submitted_revision: u64,
    edited_in_flight: Vec<FieldPath>,
    generation: u64,
    loading: Option<Pending>,
    saving: Option<Pending>,
    completions_tx: mpsc::UnboundedSender<(u64, Completion)>,
    completions_rx: mpsc::UnboundedReceiver<(u64, Completion)>,
    disposed: bool,
}

impl<S: ConfigSource> ConfigSyncController<S> {
    pub fn new(source: S, rules: RuleSet) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            source: Arc::new(source),
            rules,
            document: None,
            load_state: LoadState::Idle,
            local: ValidationResult::new(),
            displayed: ValidationResult::new(),
            server_errors: IndexMap::new(),
            awaiting_edit: false,
            notice: None,
            revision: 0,
            clean_revision: 0,
            submitted_revision: 0,
            edited_in_flight: Vec::new(),
            generation: 0,
            loading: None,
            saving: None,
            completions_tx,
            completions_rx,
            disposed: false,
        }
    }

    /// Fetch the document, discarding any local state and outstanding request.
    pub fn load(&mut self) {
        if self.disposed {
            return;
        }
        self.abort_pending();
        self.document = None;
        self.local = ValidationResult::new();
        self.displayed = ValidationResult::new();
        self.server_errors.clear();
        self.awaiting_edit = false;
        self.notice = None;
        self.load_state = LoadState::Loading;

        let request = self.source.fetch();
        self.loading = Some(self.spawn(async move { Completion::Loaded(request.await) }));
    }

    /// Replace the value at `path` and re-validate.
    pub fn edit(&mut self, path: &FieldPath, value: impl Into<FieldValue>) -> Result<(), DocumentError> {
        self.document_mut()?.set(path, value.into())?;
        self.after_edit(path);
        Ok(())
    }

    /// Add a table entry or list element and re-validate.
    pub fn insert(&mut self, path: &FieldPath, value: impl Into<FieldValue>) -> Result<(), DocumentError> {
        self.document_mut()?.insert(path, value.into())?;
        self.after_edit(&path.parent().unwrap_or_else(|| path.clone()));
        Ok(())
    }

    /// Remove a table entry or list element and re-validate.
    pub fn remove(&mut self, path: &FieldPath) -> Result<FieldValue, DocumentError> {
        let removed = self.document_mut()?.remove(path)?;
        self.after_edit(&path.parent().unwrap_or_else(|| path.clone()));
        Ok(removed)
    }

    /// Submit the full document if nothing blocks it.
    pub fn save(&mut self) -> SaveOutcome {
        if self.disposed || self.loading.is_some() {
            return SaveOutcome::Unavailable;
        }
        let Some(document) = self.document.clone() else {
            return SaveOutcome::Unavailable;
        };
        if self.saving.is_some() {
            return SaveOutcome::InFlight;
        }
        if self.awaiting_edit {
            return SaveOutcome::Blocked {
                invalid_paths: self.server_errors.keys().cloned().collect(),
            };
        }

        self.revalidate();
        self.server_errors.clear();
        self.displayed = self.local.clone();

        if self.local.has_errors() {
            let invalid_paths = self.local.invalid_paths();
            tracing::debug!(
                document = self.rules.name(),
                invalid = invalid_paths.len(),
                "Save blocked by local validation"
            );
            metrics::record_save(self.rules.name(), "blocked");
            self.notice = Some(Notice::LocalErrors);
            return SaveOutcome::Blocked { invalid_paths };
        }

        self.notice = None;
        self.submitted_revision = self.revision;
        self.edited_in_flight.clear();
        let request = self.source.store(document);
        self.saving = Some(self.spawn(async move { Completion::Saved(request.await) }));
        SaveOutcome::Submitted
    }

    /// Wait for the next outstanding request to complete and apply it.
    ///
    /// Returns `false` without waiting when nothing is outstanding.
    pub async fn settle(&mut self) -> bool {
        while self.loading.is_some() || self.saving.is_some() {
            let Some((generation, completion)) = self.completions_rx.recv().await else {
                return false;
            };
            if self.apply(generation, completion) {
                return true;
            }
        }
        false
    }

    /// Apply every completion that has already arrived. Returns how many.
    pub fn try_settle(&mut self) -> usize {
        let mut applied = 0;
        while let Ok((generation, completion)) = self.completions_rx.try_recv() {
            if self.apply(generation, completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Abort outstanding requests. Results that still arrive are ignored and
    /// every later operation is a no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.abort_pending();
        tracing::debug!(document = self.rules.name(), "Controller disposed");
    }

    pub fn can_save(&self) -> bool {
        !self.disposed
            && self.document.is_some()
            && self.loading.is_none()
            && self.saving.is_none()
            && !self.awaiting_edit
            && self.local.is_savable()
    }

    pub fn document(&self) -> Option<&ConfigDocument> {
        self.document.as_ref()
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    /// Result of the most recent local validation pass.
    pub fn local_result(&self) -> &ValidationResult {
        &self.local
    }

    /// What the editor shows: local outcomes plus unaddressed server errors.
    pub fn displayed_result(&self) -> &ValidationResult {
        &self.displayed
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_some()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.is_some()
    }

    /// Whether the document changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.document.is_some() && self.revision != self.clean_revision
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn document_mut(&mut self) -> Result<&mut ConfigDocument, DocumentError> {
        if self.disposed {
            return Err(DocumentError::NotLoaded);
        }
        self.document.as_mut().ok_or(DocumentError::NotLoaded)
    }

    fn after_edit(&mut self, edited: &FieldPath) {
        self.revision += 1;
        self.awaiting_edit = false;
        if self.saving.is_some() {
            self.edited_in_flight.push(edited.clone());
        }
        self.server_errors.retain(|path, _| !touches(edited, path));
        self.revalidate();
        self.displayed = self.local.clone();
        self.displayed.overlay(&self.server_errors);
    }

    fn revalidate(&mut self) {
        if let Some(document) = &self.document {
            self.local = validate(document, &self.rules);
            metrics::record_validation(self.rules.name(), self.local.error_count());
        }
    }

    fn spawn<F>(&mut self, work: F) -> Pending
    where
        F: std::future::Future<Output = Completion> + Send + 'static,
    {
        self.generation += 1;
        let generation = self.generation;
        let tx = self.completions_tx.clone();
        let handle = tokio::spawn(async move {
            let _ = tx.send((generation, work.await));
        });
        Pending { generation, handle }
    }

    fn abort_pending(&mut self) {
        for pending in [self.loading.take(), self.saving.take()].into_iter().flatten() {
            pending.handle.abort();
        }
    }

    fn apply(&mut self, generation: u64, completion: Completion) -> bool {
        match completion {
            Completion::Loaded(result) => {
                if !matches!(&self.loading, Some(p) if p.generation == generation) {
                    return false;
                }
                self.loading = None;
                self.finish_load(result);
            }
            Completion::Saved(result) => {
                if !matches!(&self.saving, Some(p) if p.generation == generation) {
                    return false;
                }
                self.saving = None;
                self.finish_save(result);
            }
        }
        true
    }

    fn finish_load(&mut self, result: Result<ConfigDocument, SyncError>) {
        match result {
            Ok(document) => {
                tracing::info!(document = self.rules.name(), sections = document.keys().count(), "Document loaded");
                self.document = Some(document);
                self.load_state = LoadState::Loaded;
                self.clean_revision = self.revision;
                self.revalidate();
                self.displayed = self.local.clone();
            }
            Err(e) => {
                tracing::warn!(document = self.rules.name(), error = %e, "Failed to load document");
                self.load_state = LoadState::Failed(e.to_string());
                self.notice = Some(Notice::LoadFailed(e.to_string()));
            }
        }
    }

    fn finish_save(&mut self, result: Result<(), SyncError>) {
        let name = self.rules.name().to_string();
        match result {
            Ok(()) => {
                tracing::info!(document = %name, "Document saved");
                metrics::record_save(&name, "ok");
                self.clean_revision = self.submitted_revision;
                self.server_errors.clear();
                self.displayed = self.local.clone();
                self.notice = Some(Notice::Saved);
            }
            Err(SyncError::Rejected(SaveFailure::Validation(mut errors))) => {
                tracing::warn!(document = %name, fields = errors.len(), "Save rejected by server validation");
                metrics::record_save(&name, "rejected");
                let edited = std::mem::take(&mut self.edited_in_flight);
                errors.retain(|path, _| !edited.iter().any(|e| touches(e, path)));
                self.displayed = self.local.clone();
                self.displayed.overlay(&errors);
                self.server_errors = errors;
                self.awaiting_edit = self.revision == self.submitted_revision;
                self.notice = Some(Notice::ServerRejected);
            }
            Err(e) => {
                tracing::warn!(document = %name, error = %e, "Save failed");
                metrics::record_save(&name, "error");
                let reason = match e {
                    SyncError::Rejected(SaveFailure::Generic(message)) => message,
                    other => other.to_string(),
                };
                self.notice = Some(Notice::SaveFailed(reason));
            }
        }
    }
}

/// Whether editing `edited` addresses a server error reported at `path`.
fn touches(edited: &FieldPath, path: &str) -> bool {
    match FieldPath::parse(path) {
        Ok(path) => path.starts_with(edited) || edited.starts_with(&path),
        Err(_) => false,
    }
}

impl<S: ConfigSource> Drop for ConfigSyncController<S> {
    fn drop(&mut self) {
        self.abort_pending();
    }
}

impl ConfigSyncController<HttpConfigSource> {
    /// Controller for the fuser settings document.
    pub fn fuser_settings(client: reqwest::Client, api: &ApiConfig) -> Result<Self, url::ParseError> {
        Self::over_http(client, api, &api.settings_path, RuleSet::fuser_settings())
    }

    /// Controller for the event patterns document.
    pub fn event_patterns(client: reqwest::Client, api: &ApiConfig) -> Result<Self, url::ParseError> {
        Self::over_http(client, api, &api.event_patterns_path, RuleSet::event_patterns())
    }

    fn over_http(
        client: reqwest::Client,
        api: &ApiConfig,
        path: &str,
        rules: RuleSet,
    ) -> Result<Self, url::ParseError> {
        let source = HttpConfigSource::new(
            client,
            api.endpoint(path)?,
            Duration::from_secs(api.request_timeout_secs),
        );
        Ok(Self::new(source, rules))
    }
}
