//! Playground CLI
//!
//! Loads the interpreter artifact configured for this host and runs code
//! against it, either once or as an interactive session.

use playground_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
