use clap::{Parser, Subcommand};
use scratchpad::{
    config::SandboxConfig,
    sandbox::{ExecuteResponse, Sandbox},
    Error,
};
use std::{
    io::{self, Write},
    path::PathBuf,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for saved sessions
    #[arg(long, global = true)]
    session_dir: Option<PathBuf>,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session (default)
    Repl,

    /// Execute a script file as one submission
    Run(RunArgs),

    /// Execute the fenced code blocks of a markdown prompt
    Prompt(PromptArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Path to the script
    file: PathBuf,
}

#[derive(Parser)]
struct PromptArgs {
    /// Prompt text containing ``` fenced blocks
    text: String,
}

fn load_config(cli: &Cli) -> Result<SandboxConfig, Error> {
    let config = match &cli.config {
        Some(path) => SandboxConfig::from_file(path)?,
        None => SandboxConfig::default(),
    };
    let mut config = config.load_from_env();
    if let Some(dir) = &cli.session_dir {
        config.session.session_dir = dir.clone();
    }
    info!("config loaded.");
    debug!("config: {:?}", config);
    Ok(config)
}

async fn run(cli: &Cli) -> Result<bool, Error> {
    let sandbox = Sandbox::new(load_config(cli)?)?;

    match &cli.command {
        None | Some(Commands::Repl) => {
            repl(&sandbox).await?;
            Ok(true)
        }
        Some(Commands::Run(args)) => {
            let response = sandbox.execute_file(&args.file).await?;
            print_response(&response);
            Ok(response.success)
        }
        Some(Commands::Prompt(args)) => {
            let response = sandbox.execute_prompt(&args.text).await?;
            if !response.output.is_empty() {
                println!("{}", response.output);
            }
            println!("{}", to_pretty(&response.variables)?);
            Ok(response.blocks.iter().all(|block| block.success))
        }
    }
}

fn print_response(response: &ExecuteResponse) {
    if !response.output.is_empty() {
        println!("{}", response.output);
    }
    if let Some(error) = &response.error {
        if !response.output.contains(error.as_str()) {
            eprintln!("{}", error);
        }
    }
}

fn to_pretty<T: serde::Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string_pretty(value).map_err(|e| Error::internal(e.to_string()))
}

fn prompt(text: &str) -> Result<(), Error> {
    print!("{}", text);
    io::stdout()
        .flush()
        .map_err(|e| Error::internal(e.to_string()))
}

/// Lines after a block header (or a trailing backslash) are collected until
/// a blank line, then submitted together.
fn continues(line: &str) -> bool {
    let line = line.trim_end();
    line.ends_with(':') || line.ends_with('\\')
}

async fn repl(sandbox: &Sandbox) -> Result<(), Error> {
    let info = sandbox.session_info().await?;
    println!("Scratchpad session {}. Type :help for commands.", info.session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut buffer: Vec<String> = Vec::new();
    loop {
        prompt(if buffer.is_empty() { ">>> " } else { "... " })?;
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| Error::internal(format!("Failed to read input: {}", e)))?
        else {
            println!();
            break;
        };

        if buffer.is_empty() {
            if let Some(command) = line.trim().strip_prefix(':') {
                match run_command(sandbox, command).await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        continue;
                    }
                }
            }
            if line.trim().is_empty() {
                continue;
            }
        }

        let more = continues(&line) || (!buffer.is_empty() && !line.trim().is_empty());
        buffer.push(line);
        if more {
            continue;
        }

        let source = buffer.join("\n");
        buffer.clear();
        let response = sandbox.execute(source).await?;
        print_response(&response);
    }
    Ok(())
}

/// Handles a `:command`. Returns `false` when the session should end.
async fn run_command(sandbox: &Sandbox, command: &str) -> Result<bool, Error> {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let argument = parts.next();

    match (name, argument) {
        ("quit" | "exit" | "q", _) => return Ok(false),
        ("save", path) => {
            let response = sandbox.save_session(path.map(PathBuf::from)).await?;
            println!("Saved to {}", response.path.display());
        }
        ("load", Some(path)) => {
            let response = sandbox.load_session(path).await?;
            println!("Loaded session {}", response.session_id);
        }
        ("reset", _) => {
            let response = sandbox.reset().await?;
            println!("New session {}", response.session_id);
        }
        ("vars", _) => {
            let response = sandbox.scope().await?;
            println!("{}", to_pretty(&response.scope_snapshot)?);
        }
        ("var", Some(name)) => {
            let detail = sandbox.variable_detail(name).await?;
            println!("{}", to_pretty(&detail)?);
        }
        ("history", limit) => {
            let limit = limit.and_then(|n| n.parse().ok());
            let response = sandbox.history(limit).await?;
            for record in &response.records {
                let status = if record.success { "ok" } else { "failed" };
                println!("[{}] {} {}", record.timestamp, status, record.code);
            }
            println!("({} of {} records)", response.records.len(), response.total);
        }
        ("info", _) => {
            let info = sandbox.session_info().await?;
            println!("{}", to_pretty(&info)?);
        }
        _ => {
            println!(":save [path]  :load <path>  :reset  :vars  :var <name>");
            println!(":history [n]  :info  :quit");
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
