use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

mod cli;

use cli::Cli;
use cli::commands::Commands;
use locallm::config::Config;
use locallm::tools::{ToolCatalog, extract_tool_calls};
use locallm::{schema, transcript};

fn setup_logging(config: &Config) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("locallm")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("locallm.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let default_level = config.log_level.as_deref().unwrap_or("info");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).context(format!("Failed to read {}", path.display()))
}

fn run_application(cli: &Cli) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Compile { schema, compact } => handle_compile_command(schema, *compact),
        Commands::Extract { file, tools } => handle_extract_command(file, tools.as_deref()),
        Commands::Transcript { messages } => handle_transcript_command(messages),
    }
}

fn handle_compile_command(path: &Path, compact: bool) -> Result<()> {
    info!("Compiling schema: {}", path.display());
    let compiled = schema::compile_str(&read_file(path)?)?;

    let unresolved = compiled.unresolved_references();
    if !unresolved.is_empty() {
        eprintln!("{} unresolved references: {}", "Warning:".yellow(), unresolved.join(", "));
    }

    let output = if compact {
        serde_json::to_string(&compiled)?
    } else {
        serde_json::to_string_pretty(&compiled)?
    };
    println!("{}", output);
    Ok(())
}

fn handle_extract_command(path: &Path, tools: Option<&Path>) -> Result<()> {
    let catalog = match tools {
        Some(tools) => ToolCatalog::from_file(tools)?,
        None => ToolCatalog::new(),
    };
    info!("Extracting tool calls from {} with {} tools", path.display(), catalog.len());

    let response = extract_tool_calls(&read_file(path)?, &catalog);

    match &response.text {
        Some(text) => println!("{}\n{}", "Text:".green(), text),
        None => println!("{} {}", "Text:".green(), "(none)".dimmed()),
    }

    if response.tool_calls.is_empty() {
        println!("{} {}", "Tool calls:".green(), "(none)".dimmed());
    } else {
        println!("{}", "Tool calls:".green());
        for call in &response.tool_calls {
            let known = if catalog.contains(&call.name) { "" } else { " (unknown tool)" };
            println!(
                "  {} {}{} {}",
                call.id.dimmed(),
                call.name.cyan(),
                known.red(),
                call.raw_arguments
            );
        }
    }
    Ok(())
}

fn handle_transcript_command(path: &Path) -> Result<()> {
    let messages = transcript::parse_messages(&read_file(path)?)?;
    let conversation = transcript::convert(&messages)?;
    info!("Converted {} messages", messages.len());

    println!("{}", "History:".green());
    for entry in &conversation.history {
        println!("{}", serde_json::to_string(entry)?);
    }
    println!("{} {}", "Prompt:".green(), conversation.prompt);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli).context("Application failed")?;

    Ok(())
}
