//! texref-lsp: LaTeX completion server
//!
//! This server provides:
//! - Citation, label and environment completion
//! - Go-to-definition for cited keys, referenced labels and environments
//! - In-memory document tracking for unsaved changes
//!
//! The index is built lazily: every request re-scans only the files whose
//! modification time changed since the previous scan.

mod completion;
mod document_store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use document_store::DocumentStore;
use serde::Serialize;
use texref::{identifier_at, CompletionCoordinator, CompletionRequest, Config, ExtractorStats};
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use tracing::{debug, error, info};

const DEBUG_INFO_COMMAND: &str = "texref.debugInfo";
const REFRESH_COMMAND: &str = "texref.refreshIndex";

/// Payload of the debug info command.
#[derive(Debug, Serialize)]
struct DebugReport {
    requester: PathBuf,
    info: String,
    stats: Vec<(String, ExtractorStats)>,
}

/// The language server backend
struct Backend {
    /// LSP client for sending notifications
    client: Client,
    /// Rebuilt when the workspace config is loaded
    coordinator: Arc<RwLock<Arc<CompletionCoordinator>>>,
    /// Workspace root directory
    workspace_root: Arc<RwLock<Option<PathBuf>>>,
    /// In-memory document store for open files
    documents: DocumentStore,
}

impl Backend {
    async fn coordinator(&self) -> Arc<CompletionCoordinator> {
        self.coordinator.read().await.clone()
    }

    /// Documents opened with a language the config does not list are ignored.
    async fn is_served(&self, file: &Path) -> bool {
        match self.documents.language_id(file).await {
            Some(language_id) => {
                let coordinator = self.coordinator().await;
                completion::serves(coordinator.supported_filetypes(), &language_id)
            }
            None => true,
        }
    }

    async fn request_at(&self, file: &Path, pos: Position) -> CompletionRequest {
        let line = self
            .documents
            .get_line(file, pos.line)
            .await
            .unwrap_or_default();
        let column = completion::byte_offset(&line, pos.character);
        CompletionRequest::new(file, line, column)
    }

    /// Resolve `identifier`, scanning the project once if it is not indexed yet.
    async fn resolve(&self, file: &Path, identifier: &str) -> Result<texref::Location> {
        let coordinator = self.coordinator().await;
        if let Ok(location) = coordinator.resolve_definition(identifier) {
            return Ok(location);
        }

        let requester = file.to_path_buf();
        let identifier = identifier.to_string();
        let location = tokio::task::spawn_blocking(move || {
            let found = coordinator.refresh_index(&requester);
            debug!("Refreshed index: {} identifiers", found);
            coordinator.resolve_definition(&identifier)
        })
        .await
        .context("index refresh task failed")??;
        Ok(location)
    }

    async fn debug_report(&self, requester: PathBuf) -> Result<DebugReport> {
        let coordinator = self.coordinator().await;
        tokio::task::spawn_blocking(move || DebugReport {
            info: coordinator.debug_info(&requester),
            stats: coordinator
                .stats()
                .into_iter()
                .map(|(kind, stats)| (kind.to_string(), stats))
                .collect(),
            requester,
        })
        .await
        .context("debug info task failed")
    }

    /// File named by the first command argument, else the workspace root.
    async fn command_target(&self, arguments: &[serde_json::Value]) -> Option<PathBuf> {
        let from_argument = arguments
            .first()
            .and_then(|arg| arg.as_str())
            .and_then(|uri| Url::parse(uri).ok())
            .and_then(|uri| uri.to_file_path().ok());
        match from_argument {
            Some(path) => Some(path),
            None => self.workspace_root.read().await.clone(),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> LspResult<InitializeResult> {
        // Store workspace root
        if let Some(root_uri) = params.root_uri {
            if let Ok(path) = root_uri.to_file_path() {
                *self.workspace_root.write().await = Some(path);
            }
        } else if let Some(folders) = params.workspace_folders {
            if let Some(folder) = folders.first() {
                if let Ok(path) = folder.uri.to_file_path() {
                    *self.workspace_root.write().await = Some(path);
                }
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                definition_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec!["{".to_string(), ",".to_string()]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![DEBUG_INFO_COMMAND.to_string(), REFRESH_COMMAND.to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "texref-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("LaTeX completion server initialized");

        // Load config from workspace root
        if let Some(root) = self.workspace_root.read().await.as_ref() {
            let config = Config::load(root);
            info!(
                "Loaded config: marker=*.{} sources=*.{} filetypes={:?}",
                config.marker_extension, config.source_extension, config.filetypes
            );
            *self.coordinator.write().await = Arc::new(CompletionCoordinator::new(config));
        }
    }

    async fn shutdown(&self) -> LspResult<()> {
        info!("LaTeX completion server shutting down");
        Ok(())
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> LspResult<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let pos = params.text_document_position_params.position;

        let file = match uri.to_file_path() {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };

        if !self.is_served(&file).await {
            return Ok(None);
        }

        let request = self.request_at(&file, pos).await;
        let identifier = match identifier_at(&request.line, request.column) {
            Some(identifier) => identifier.to_string(),
            None => return Ok(None),
        };

        info!("Looking up definition for: {}", identifier);

        let location = match self.resolve(&file, &identifier).await {
            Ok(location) => location,
            Err(e) => {
                debug!("{}", e);
                return Ok(None);
            }
        };

        let line_text = self
            .documents
            .get_line(&location.file, location.line.saturating_sub(1))
            .await;
        Ok(completion::to_lsp_location(&location, line_text.as_deref())
            .map(GotoDefinitionResponse::Scalar))
    }

    async fn completion(&self, params: CompletionParams) -> LspResult<Option<CompletionResponse>> {
        let uri = &params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;

        let file = match uri.to_file_path() {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };

        if !self.is_served(&file).await {
            return Ok(None);
        }

        let request = self.request_at(&file, pos).await;
        let coordinator = self.coordinator().await;

        // Walks and scans hit the filesystem
        let candidates =
            match tokio::task::spawn_blocking(move || coordinator.compute_candidates(&request))
                .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    error!("Completion task failed: {}", e);
                    return Ok(None);
                }
            };

        if candidates.is_empty() {
            return Ok(None);
        }

        let items = candidates
            .into_iter()
            .map(completion::to_completion_item)
            .collect();
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn execute_command(
        &self,
        params: ExecuteCommandParams,
    ) -> LspResult<Option<serde_json::Value>> {
        let target = match self.command_target(&params.arguments).await {
            Some(target) => target,
            None => return Ok(None),
        };

        match params.command.as_str() {
            DEBUG_INFO_COMMAND => match self.debug_report(target).await {
                Ok(report) => {
                    self.client.log_message(MessageType::INFO, &report.info).await;
                    Ok(serde_json::to_value(report).ok())
                }
                Err(e) => {
                    error!("Debug info failed: {:#}", e);
                    Ok(None)
                }
            },
            REFRESH_COMMAND => {
                let coordinator = self.coordinator().await;
                coordinator.reset_roots();
                match tokio::task::spawn_blocking(move || coordinator.refresh_index(&target)).await
                {
                    Ok(found) => {
                        self.client
                            .log_message(MessageType::INFO, format!("Indexed {} identifiers", found))
                            .await;
                        Ok(Some(serde_json::json!({ "identifiers": found })))
                    }
                    Err(e) => {
                        error!("Index refresh failed: {}", e);
                        Ok(None)
                    }
                }
            }
            other => {
                debug!("Ignoring unknown command {}", other);
                Ok(None)
            }
        }
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = &params.text_document.uri;
        info!("File opened: {}", uri);

        self.documents
            .open(
                uri,
                params.text_document.text,
                params.text_document.version,
                params.text_document.language_id,
            )
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.documents
            .change(
                &params.text_document.uri,
                params.content_changes,
                params.text_document.version,
            )
            .await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = &params.text_document.uri;
        info!("File closed: {}", uri);
        self.documents.close(uri).await;
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting LaTeX completion server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| Backend {
        client,
        // Defaults until the workspace config is loaded
        coordinator: Arc::new(RwLock::new(Arc::new(CompletionCoordinator::new(
            Config::default(),
        )))),
        workspace_root: Arc::new(RwLock::new(None)),
        documents: DocumentStore::new(),
    });

    Server::new(stdin, stdout, socket).serve(service).await;
}
