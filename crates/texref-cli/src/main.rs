//! texref: LaTeX citation, label and environment lookup from the command line.
//!
//! This CLI exposes the completion engine for scripts and editor plugins:
//! - Completion candidates at a cursor position
//! - Definition lookup by identifier or by cursor position
//! - Project root resolution
//! - Supported filetypes

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use texref::{
    identifier_at, Candidate, ClassificationState, CompletionCoordinator, CompletionRequest,
    Config, Location, TexrefError,
};

/// Exit codes for the CLI
///
/// - 0: Success
/// - 1: Not found (valid query, no results)
/// - 2: Error (invalid input, missing file, etc.)
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const NOT_FOUND: u8 = 1;
    pub const ERROR: u8 = 2;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Text,
}

/// Citation, label and environment lookup for LaTeX projects
#[derive(Parser)]
#[command(name = "texref")]
#[command(author, version = env!("TEXREF_VERSION"), about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Directory holding .texref.toml (defaults to current directory)
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List completion candidates at a cursor position
    Complete {
        /// File being edited
        file: PathBuf,

        /// Line number (1-indexed)
        #[arg(short, long)]
        line: u32,

        /// Cursor byte column (0-indexed, defaults to end of line)
        #[arg(short, long)]
        column: Option<usize>,

        /// Use this text instead of the line on disk (unsaved buffers)
        #[arg(long)]
        text: Option<String>,

        /// Byte column where the typed token starts (derived when omitted)
        #[arg(long)]
        start_column: Option<usize>,
    },

    /// Find where a citation key, label or environment is defined
    Def {
        /// Identifier to look up (e.g. "knuth1984" or "sec:intro")
        identifier: String,

        /// Any file inside the project
        #[arg(short, long)]
        file: PathBuf,

        /// Show the source line containing the definition
        #[arg(long)]
        context: bool,
    },

    /// Jump to the definition of the identifier under the cursor
    Goto {
        /// File being edited
        file: PathBuf,

        /// Line number (1-indexed)
        #[arg(short, long)]
        line: u32,

        /// Cursor byte column (0-indexed)
        #[arg(short, long)]
        column: usize,

        /// Host command name (GoToDefinition, GoToDeclaration, GoTo)
        #[arg(long, default_value = "GoToDefinition")]
        command: String,
    },

    /// Show which project root and files serve a document
    Root {
        /// File being edited
        file: PathBuf,
    },

    /// List the filetypes completion is offered for
    Filetypes,
}

fn main() -> ExitCode {
    // Initialize logging; stdout is reserved for results
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;

    match run(cli.command, &cli.root, format) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if format == OutputFormat::Text {
                eprintln!("Error: {:#}", e);
            } else {
                let error_json = serde_json::json!({
                    "error": "CommandFailed",
                    "message": format!("{:#}", e),
                });
                eprintln!("{}", error_json);
            }
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

fn run(command: Commands, root: &Path, format: OutputFormat) -> Result<u8> {
    let config = Config::load(root);
    let coordinator = CompletionCoordinator::new(config);

    match command {
        Commands::Complete {
            file,
            line,
            column,
            text,
            start_column,
        } => cmd_complete(&coordinator, &file, line, column, text, start_column, format),
        Commands::Def {
            identifier,
            file,
            context,
        } => cmd_def(&coordinator, &identifier, &file, context, format),
        Commands::Goto {
            file,
            line,
            column,
            command,
        } => cmd_goto(&coordinator, &file, line, column, &command, format),
        Commands::Root { file } => cmd_root(&coordinator, &file, format),
        Commands::Filetypes => cmd_filetypes(&coordinator, format),
    }
}

fn print_json(format: OutputFormat, value: &serde_json::Value) -> Result<()> {
    let rendered = if format == OutputFormat::Pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", rendered);
    Ok(())
}

/// Absolute path of an existing file.
fn existing_file(file: &Path) -> Result<PathBuf> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    file.canonicalize()
        .with_context(|| format!("Failed to resolve {}", file.display()))
}

/// Text of a 1-indexed line.
fn read_line(file: &Path, line: u32) -> Result<String> {
    if line == 0 {
        anyhow::bail!("Line numbers start at 1");
    }
    let content =
        fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    // A cursor on the empty line after a trailing newline is valid
    let text = content.split('\n').nth(line as usize - 1).with_context(|| {
        format!("{} has no line {}", file.display(), line)
    })?;
    Ok(text.trim_end_matches('\r').to_string())
}

fn not_found(format: OutputFormat, message: &str, value: serde_json::Value) -> Result<u8> {
    if format == OutputFormat::Text {
        eprintln!("{}", message);
    } else {
        print_json(format, &value)?;
    }
    Ok(exit_codes::NOT_FOUND)
}

/// Print completion candidates at a cursor position
fn cmd_complete(
    coordinator: &CompletionCoordinator,
    file: &Path,
    line: u32,
    column: Option<usize>,
    text: Option<String>,
    start_column: Option<usize>,
    format: OutputFormat,
) -> Result<u8> {
    let file = existing_file(file)?;
    let text = match text {
        Some(text) => text,
        None => read_line(&file, line)?,
    };
    let column = column.unwrap_or(text.len());

    let mut request = CompletionRequest::new(&file, text, column);
    if let Some(start) = start_column {
        request = request.with_start_column(start);
    }

    let state = coordinator.classify(&request).state();
    let candidates = coordinator.compute_candidates(&request);

    if candidates.is_empty() {
        return not_found(
            format,
            &format!("No candidates ({})", state_name(state)),
            serde_json::json!({
                "state": state,
                "query": request.query(),
                "candidates": [],
            }),
        );
    }

    if format == OutputFormat::Text {
        for candidate in &candidates {
            println!("{}", candidate_line(candidate));
        }
    } else {
        print_json(
            format,
            &serde_json::json!({
                "state": state,
                "query": request.query(),
                "candidates": candidates,
            }),
        )?;
    }

    Ok(exit_codes::SUCCESS)
}

fn state_name(state: ClassificationState) -> &'static str {
    match state {
        ClassificationState::None => "no trigger",
        ClassificationState::Cite => "citation",
        ClassificationState::Label => "label",
        ClassificationState::Environment => "environment",
        ClassificationState::All => "label or citation",
    }
}

fn candidate_line(candidate: &Candidate) -> String {
    let mut line = candidate.identifier.clone();
    if let Some(kind) = &candidate.kind {
        line.push_str(&format!("\t[{}]", kind));
    }
    if let Some(annotation) = &candidate.annotation {
        line.push_str(&format!("\t{}", annotation));
    }
    line
}

/// Find the definition of an identifier
fn cmd_def(
    coordinator: &CompletionCoordinator,
    identifier: &str,
    file: &Path,
    context: bool,
    format: OutputFormat,
) -> Result<u8> {
    let file = existing_file(file)?;
    coordinator.refresh_index(&file);

    match coordinator.resolve_definition(identifier) {
        Ok(location) => print_location(identifier, &location, context, format),
        Err(e @ TexrefError::DefinitionNotFound(_)) => not_found(
            format,
            &e.to_string(),
            serde_json::json!({
                "error": "NotFound",
                "identifier": identifier,
                "message": e.to_string(),
            }),
        ),
        Err(e) => Err(e.into()),
    }
}

/// Run a host goto command at a cursor position
fn cmd_goto(
    coordinator: &CompletionCoordinator,
    file: &Path,
    line: u32,
    column: usize,
    command: &str,
    format: OutputFormat,
) -> Result<u8> {
    let file = existing_file(file)?;
    let text = read_line(&file, line)?;
    let request = CompletionRequest::new(&file, text, column);
    let identifier = identifier_at(&request.line, request.column)
        .unwrap_or_default()
        .to_string();

    coordinator.refresh_index(&file);

    match coordinator.run_subcommand(command, &request) {
        Ok(location) => print_location(&identifier, &location, false, format),
        Err(e @ TexrefError::DefinitionNotFound(_)) => not_found(
            format,
            &e.to_string(),
            serde_json::json!({
                "error": "NotFound",
                "identifier": identifier,
                "message": e.to_string(),
            }),
        ),
        Err(e) => Err(e.into()),
    }
}

fn print_location(
    identifier: &str,
    location: &Location,
    context: bool,
    format: OutputFormat,
) -> Result<u8> {
    let source = if context {
        read_line(&location.file, location.line).ok()
    } else {
        None
    };

    if format == OutputFormat::Text {
        println!("{}", location);
        if let Some(source) = &source {
            println!("  {}", source.trim());
        }
    } else {
        let mut value = serde_json::json!({
            "identifier": identifier,
            "location": location,
        });
        if let Some(source) = source {
            value["context"] = serde_json::Value::String(source);
        }
        print_json(format, &value)?;
    }

    Ok(exit_codes::SUCCESS)
}

/// Show root resolution and per-kind index state
fn cmd_root(coordinator: &CompletionCoordinator, file: &Path, format: OutputFormat) -> Result<u8> {
    let file = existing_file(file)?;
    let info = coordinator.debug_info(&file);

    if format == OutputFormat::Text {
        println!("{}", info);
    } else {
        let lines: Vec<&str> = info.lines().collect();
        print_json(
            format,
            &serde_json::json!({
                "file": file,
                "info": lines,
            }),
        )?;
    }

    Ok(exit_codes::SUCCESS)
}

fn cmd_filetypes(coordinator: &CompletionCoordinator, format: OutputFormat) -> Result<u8> {
    let filetypes = coordinator.supported_filetypes();

    if format == OutputFormat::Text {
        for filetype in filetypes {
            println!("{}", filetype);
        }
    } else {
        print_json(format, &serde_json::json!({ "filetypes": filetypes }))?;
    }

    Ok(exit_codes::SUCCESS)
}
