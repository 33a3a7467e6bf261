//! PyRuff LSP - Language Server bridging editors to the ruff Python linter
//!
//! # How this works
//!
//! 1. This binary is started by the editor (e.g., Neovim)
//! 2. Communication happens over stdin/stdout using JSON-RPC
//! 3. The editor sends requests (initialize, textDocument/*, etc.)
//! 4. We run ruff over the document and answer with diagnostics, edits
//!    and code actions
//!
//! # Why we use stderr for logging
//!
//! Since stdin/stdout are used for the LSP protocol, we CANNOT use
//! println!() for debugging. Instead, we use the `tracing` crate
//! which writes to stderr.

mod server;

use tower_lsp::{LspService, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug to see the ruff command lines
    // Example: RUST_LOG=pyruff_lsp=debug,pyruff_analyzer=debug pyruff-lsp
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr) // IMPORTANT: write to stderr, not stdout
        .with_ansi(false)
        .init();

    tracing::info!("Starting pyruff-lsp server");

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    // The Client handed to the closure is how we notify the editor
    let (service, socket) =
        LspService::build(server::PyRuffLanguageServer::new).finish();

    // Runs until the editor disconnects
    Server::new(stdin, stdout, socket).serve(service).await;

    tracing::info!("pyruff-lsp server stopped");
}
