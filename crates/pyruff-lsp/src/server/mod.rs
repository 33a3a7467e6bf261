//! The main Language Server implementation.
//!
//! # LSP Lifecycle
//!
//! 1. Editor starts our binary and sends `initialize` request
//! 2. We respond with our capabilities (what features we support)
//! 3. Editor sends `initialized` notification (handshake complete)
//! 4. Normal operation: file events, requests flow both directions
//! 5. Editor sends `shutdown` request, we respond, then `exit` notification
//!
//! Settings are resolved again for every lint, format and code-action
//! request, so changes to `pyproject.toml` or `ruff.toml` apply immediately.

mod state;
mod utils;

pub use state::Document;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use lsp_types::*;
use pyruff_analyzer::settings::{self, HostConfig, PluginSettings};
use pyruff_analyzer::{
    CodeActionEngine, DiagnosticEngine, DocumentSnapshot, FormatterEngine, RuffInvoker,
};
use tower_lsp::jsonrpc::Result;
use tower_lsp::{Client, LanguageServer};

/// Quiet period after the last keystroke before ruff runs.
const LINT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Debounced lint tasks per document URI, tagged with a task id.
type PendingLints = DashMap<String, (u64, tokio::task::JoinHandle<()>)>;

/// Drop the pending entry for `uri` only if it still belongs to `task_id`.
fn finish_pending(pending: &PendingLints, uri: &str, task_id: u64) {
    pending.remove_if(uri, |_, (id, _)| *id == task_id);
}

/// Editor configuration and workspace root, shared with background tasks.
#[derive(Clone, Default)]
struct SettingsSource {
    host_config: Arc<RwLock<HostConfig>>,
    workspace_root: Arc<RwLock<Option<PathBuf>>>,
}

impl SettingsSource {
    fn resolve(&self, document_path: &str) -> PluginSettings {
        let host = self
            .host_config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let root = self
            .workspace_root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        settings::resolve(&host, root.as_deref(), document_path)
    }

    fn set_host_config(&self, value: serde_json::Value) {
        *self.host_config.write().unwrap_or_else(|e| e.into_inner()) = HostConfig::new(value);
    }

    fn set_workspace_root(&self, root: Option<PathBuf>) {
        *self.workspace_root.write().unwrap_or_else(|e| e.into_inner()) = root;
    }
}

/// The PyRuff Language Server.
///
/// This struct holds all the state needed by the server:
/// - `client`: Used to send notifications TO the editor (e.g., diagnostics)
/// - `documents`: Map of open files (Uri -> Document)
/// - the three engines, sharing one ruff invoker
pub struct PyRuffLanguageServer {
    /// The LSP client - used to send messages TO the editor.
    client: Client,

    /// Open documents, keyed by their URI.
    documents: Arc<DashMap<String, Document>>,

    /// Lints documents with `ruff check`.
    diagnostic_engine: Arc<DiagnosticEngine>,

    /// Formats documents with `ruff format` plus the import-sorting fix pass.
    formatter_engine: Arc<FormatterEngine>,

    /// Builds quick fixes, noqa and fix-all actions.
    code_action_engine: Arc<CodeActionEngine>,

    /// Where per-request settings come from.
    settings: SettingsSource,

    /// Pending debounced lint tasks.
    pending_diagnostics: Arc<PendingLints>,

    /// Source of ids for debounced lint tasks.
    next_task_id: AtomicU64,
}

impl PyRuffLanguageServer {
    /// Create a new language server instance.
    pub fn new(client: Client) -> Self {
        let invoker = Arc::new(RuffInvoker::new());

        Self {
            client,
            documents: Arc::new(DashMap::new()),
            diagnostic_engine: Arc::new(DiagnosticEngine::new(invoker.clone())),
            formatter_engine: Arc::new(FormatterEngine::new(invoker.clone())),
            code_action_engine: Arc::new(CodeActionEngine::new(invoker)),
            settings: SettingsSource::default(),
            pending_diagnostics: Arc::new(DashMap::new()),
            next_task_id: AtomicU64::new(0),
        }
    }

    /// Copy out what the engines need from an open document.
    fn snapshot(&self, uri: &Uri) -> Option<(DocumentSnapshot, i32)> {
        let doc = self.documents.get(&uri.to_string())?;
        Some((
            DocumentSnapshot {
                uri: uri.clone(),
                path: doc.path.clone(),
                text: doc.content.to_string(),
            },
            doc.version,
        ))
    }

    /// Lint a document now and publish the result.
    async fn publish_diagnostics(&self, uri: Uri) {
        if let Some((_, (_, handle))) = self.pending_diagnostics.remove(&uri.to_string()) {
            handle.abort();
        }

        let Some((doc, version)) = self.snapshot(&uri) else {
            return;
        };

        let settings = self.settings.resolve(&doc.path);
        let diagnostics = self
            .diagnostic_engine
            .lint(&doc.path, &doc.text, &settings)
            .await;

        self.client
            .publish_diagnostics(uri, diagnostics, Some(version))
            .await;
    }

    /// Schedule a lint after the editor has been quiet for a moment.
    ///
    /// A newer change replaces the pending task. The ruff process of an
    /// aborted task is not killed; it runs to completion and is dropped.
    fn schedule_diagnostics(&self, uri: Uri) {
        let uri_string = uri.to_string();

        if let Some((_, (_, handle))) = self.pending_diagnostics.remove(&uri_string) {
            handle.abort();
        }

        let client = self.client.clone();
        let documents = self.documents.clone();
        let diagnostic_engine = self.diagnostic_engine.clone();
        let settings_source = self.settings.clone();
        let pending = self.pending_diagnostics.clone();
        let uri_clone = uri_string.clone();
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(LINT_DEBOUNCE).await;

            let (path, content, version) = match documents.get(&uri_clone) {
                Some(doc) => (doc.path.clone(), doc.content.to_string(), doc.version),
                None => return,
            };

            let settings = settings_source.resolve(&path);
            let diagnostics = diagnostic_engine.lint(&path, &content, &settings).await;

            client
                .publish_diagnostics(uri, diagnostics, Some(version))
                .await;
            finish_pending(&pending, &uri_clone, task_id);
        });

        self.pending_diagnostics.insert(uri_string, (task_id, handle));
    }

    /// Re-lint every open document (after a configuration change).
    async fn refresh_all_diagnostics(&self) {
        let uris: Vec<Uri> = self
            .documents
            .iter()
            .filter_map(|entry| entry.key().parse::<Uri>().ok())
            .collect();

        for uri in uris {
            self.publish_diagnostics(uri).await;
        }
    }
}

/// Implementation of the Language Server Protocol.
impl LanguageServer for PyRuffLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        tracing::info!("Received initialize request");

        let workspace_root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .and_then(|f| utils::uri_to_path(&f.uri))
            .or_else(|| {
                #[allow(deprecated)]
                let root_uri = params.root_uri.as_ref();
                root_uri.and_then(utils::uri_to_path)
            });

        match &workspace_root {
            Some(root) => tracing::info!("Workspace root: {}", root.display()),
            None => tracing::warn!("No workspace root provided by client"),
        }
        self.settings.set_workspace_root(workspace_root);

        if let Some(options) = params.initialization_options {
            self.settings.set_host_config(options);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                            include_text: Some(false),
                        })),
                        ..Default::default()
                    },
                )),
                document_formatting_provider: Some(OneOf::Left(true)),
                code_action_provider: Some(CodeActionProviderCapability::Options(
                    CodeActionOptions {
                        code_action_kinds: Some(vec![
                            CodeActionKind::QUICKFIX,
                            CodeActionKind::SOURCE_ORGANIZE_IMPORTS,
                            CodeActionKind::SOURCE_FIX_ALL,
                        ]),
                        resolve_provider: Some(false),
                        work_done_progress_options: Default::default(),
                    },
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "pyruff-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        tracing::info!("Server initialized - handshake complete");
        self.client
            .log_message(MessageType::INFO, "PyRuff LSP server ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutdown requested");
        for entry in self.pending_diagnostics.iter() {
            entry.value().1.abort();
        }
        Ok(())
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        tracing::debug!("Configuration changed");
        self.settings.set_host_config(params.settings);
        self.refresh_all_diagnostics().await;
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::debug!("Document opened: {}", uri.as_str());

        self.documents.insert(
            uri.to_string(),
            Document::new(
                &params.text_document.text,
                params.text_document.version,
                utils::document_path(&uri),
            ),
        );

        self.publish_diagnostics(uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;

        match self.documents.get_mut(&uri.to_string()) {
            Some(mut doc) => {
                for change in &params.content_changes {
                    doc.apply_change(change);
                }
                doc.version = params.text_document.version;
            }
            None => {
                tracing::warn!("Change for unknown document: {}", uri.as_str());
                return;
            }
        }

        self.schedule_diagnostics(uri);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.publish_diagnostics(params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri.to_string();

        if let Some((_, (_, handle))) = self.pending_diagnostics.remove(&uri) {
            handle.abort();
        }

        self.documents.remove(&uri);

        self.client
            .publish_diagnostics(params.text_document.uri, vec![], None)
            .await;
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let Some((doc, _)) = self.snapshot(&params.text_document.uri) else {
            return Ok(None);
        };

        let settings = self.settings.resolve(&doc.path);
        let edit = self
            .formatter_engine
            .format(&doc.path, &doc.text, &settings)
            .await;

        Ok(Some(edit.into_iter().collect()))
    }

    async fn code_action(&self, params: CodeActionParams) -> Result<Option<CodeActionResponse>> {
        let Some((doc, _)) = self.snapshot(&params.text_document.uri) else {
            return Ok(None);
        };

        let settings = self.settings.resolve(&doc.path);
        let actions = self
            .code_action_engine
            .code_actions(&doc, &params.context.diagnostics, &settings)
            .await;

        let only = params.context.only.as_deref();
        let response: CodeActionResponse = actions
            .into_iter()
            .filter(|action| kind_requested(action.kind.as_ref(), only))
            .map(CodeActionOrCommand::CodeAction)
            .collect();

        Ok(Some(response))
    }
}

/// Whether an action's kind falls under the client's `only` filter.
///
/// Kinds are hierarchical: asking for `source` includes `source.fixAll`.
fn kind_requested(kind: Option<&CodeActionKind>, only: Option<&[CodeActionKind]>) -> bool {
    let Some(only) = only else {
        return true;
    };
    let Some(kind) = kind else {
        return false;
    };

    only.iter().any(|requested| {
        let requested = requested.as_str();
        kind.as_str() == requested
            || kind
                .as_str()
                .strip_prefix(requested)
                .is_some_and(|rest| rest.starts_with('.'))
    })
}
