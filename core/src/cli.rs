use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::playground::{Playground, View};
use crate::session::Outcome;
use crate::snippets;
use crate::wasm::WasmFactory;

#[derive(Parser)]
#[command(name = "playground")]
#[command(about = "Playground - load an interpreter artifact and run code against it", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Host root the artifact path is resolved against
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Artifact path relative to the root
    #[arg(long, global = true)]
    pub artifact: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the built-in examples
    Examples,

    /// Run source once and print the output
    Run {
        /// Built-in example number (1-based, as listed by `examples`)
        #[arg(short = 'e', long = "example", conflicts_with_all = ["file", "code"])]
        example: Option<usize>,

        /// Read source from a file
        #[arg(short = 'f', long = "file", conflicts_with = "code")]
        file: Option<PathBuf>,

        /// Source text given inline
        #[arg(short = 'c', long = "code")]
        code: Option<String>,

        /// Print the full view as JSON instead of the output
        #[arg(long)]
        json: bool,
    },

    /// Interactive session
    Repl,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let config = Config::builder()
        .config_path(cli.config)
        .root(cli.root)
        .artifact(cli.artifact)
        .build()?;

    init_tracing(&config.log.level);

    let factory = Arc::new(WasmFactory::new(
        config.artifact.location(),
        config.artifact.entry_point.clone(),
    ));

    match cli.command {
        Commands::Examples => {
            for (index, source) in snippets::EXAMPLES.iter().enumerate() {
                println!("{}:", snippets::label(index));
                for line in source.lines() {
                    println!("  {}", line);
                }
                println!();
            }
        }

        Commands::Run {
            example,
            file,
            code,
            json,
        } => {
            let mut page = Playground::new(factory);
            let state = page.mount().await;
            if let Some(err) = state.error() {
                bail!("Interpreter runtime is not available: {}", err);
            }

            match (example, file, code) {
                (Some(number), _, _) => {
                    page.load_example(example_index(number)?)?;
                }
                (None, Some(path), _) => {
                    let source = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    page.edit(source);
                }
                (None, None, Some(code)) => {
                    page.edit(code);
                }
                (None, None, None) => {
                    let mut source = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut source)
                        .await
                        .context("Failed to read source from stdin")?;
                    page.edit(source);
                }
            }

            page.run();
            let view = page.view();

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("{}", view.output);
            }

            if view.output_is_error {
                std::process::exit(1);
            }
        }

        Commands::Repl => {
            run_repl(Playground::new(factory)).await?;
        }
    }

    Ok(())
}

fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Example numbers on the command line are 1-based
fn example_index(number: usize) -> Result<usize> {
    number
        .checked_sub(1)
        .filter(|index| *index < snippets::EXAMPLES.len())
        .ok_or_else(|| {
            anyhow!(
                "Unknown example {}. Choose 1 to {}",
                number,
                snippets::EXAMPLES.len()
            )
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Examples,
    Example(String),
    Run,
    Reset,
    Show,
    Clear,
    Status,
    Help,
    Quit,
    Unknown(String),
    /// Plain text appended to the source buffer
    Source(String),
}

fn parse_repl_line(line: &str) -> ReplCommand {
    let Some(command) = line.trim_end().strip_prefix(':') else {
        return ReplCommand::Source(line.to_string());
    };

    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().unwrap_or_default().trim();

    match name {
        "examples" => ReplCommand::Examples,
        "example" | "e" => ReplCommand::Example(arg.to_string()),
        "run" | "r" => ReplCommand::Run,
        "reset" => ReplCommand::Reset,
        "show" => ReplCommand::Show,
        "clear" => ReplCommand::Clear,
        "status" => ReplCommand::Status,
        "help" | "h" => ReplCommand::Help,
        "quit" | "q" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    }
}

const REPL_HELP: &str = "\
Lines you type are appended to the source buffer.
  :examples      list built-in examples
  :example N     replace the buffer with example N
  :run           run the buffer
  :reset         reset interpreter state and clear output
  :show          print the buffer and last output
  :clear         empty the buffer
  :status        show runtime status
  :quit          exit";

async fn run_repl(mut page: Playground) -> Result<()> {
    // Loading happens in the background; the buffer is editable meanwhile
    let mount = page.spawn_mount();

    println!("Playground REPL. Type :help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_repl_line(&line) {
            ReplCommand::Source(text) => {
                let mut source = page.session().source.clone();
                source.push_str(&text);
                source.push('\n');
                page.edit(source);
            }
            ReplCommand::Examples => {
                for (index, label) in snippets::labels().iter().enumerate() {
                    let first_line = snippets::EXAMPLES[index].lines().next().unwrap_or("");
                    println!("{}: {}", label, first_line);
                }
            }
            ReplCommand::Example(arg) => {
                let loaded = arg
                    .parse::<usize>()
                    .map_err(|_| anyhow!("Expected an example number, got '{}'", arg))
                    .and_then(example_index)
                    .and_then(|index| page.load_example(index).map_err(Into::into));
                match loaded {
                    Ok(_) => print_source(&page.view()),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            ReplCommand::Run => match page.run() {
                Outcome::Applied => println!("{}", page.view().output),
                Outcome::Ignored => println!("Runtime is {}; run unavailable", page.view().status),
                Outcome::Busy => println!("Runtime is busy"),
            },
            ReplCommand::Reset => match page.reset() {
                Outcome::Applied => println!("Interpreter state reset"),
                Outcome::Ignored => println!("Runtime is {}; reset unavailable", page.view().status),
                Outcome::Busy => println!("Runtime is busy"),
            },
            ReplCommand::Show => {
                let view = page.view();
                print_source(&view);
                println!("--- output ---");
                println!("{}", view.output);
            }
            ReplCommand::Clear => {
                page.edit("");
            }
            ReplCommand::Status => {
                let view = page.view();
                match view.load_error {
                    Some(err) => println!("Runtime {}: {}", view.status, err),
                    None => println!("Runtime {}", view.status),
                }
            }
            ReplCommand::Help => println!("{}", REPL_HELP),
            ReplCommand::Quit => break,
            ReplCommand::Unknown(name) => {
                eprintln!("Unknown command :{}. Type :help for commands.", name);
            }
        }
    }

    mount.abort();
    Ok(())
}

fn print_source(view: &View) {
    println!("--- source ---");
    print!("{}", view.source);
    if !view.source.ends_with('\n') {
        println!();
    }
}
