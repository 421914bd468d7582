use clap::{Parser, Subcommand};
use kumitate::config::CompilerConfig;
use kumitate::prelude::*;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Compiles node editor workflows into execution-ready prompts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a workflow into an instruction map
    Compile {
        /// Path to the workflow JSON file
        workflow: PathBuf,
        /// Path to the engine's object_info JSON
        #[arg(short, long)]
        registry: PathBuf,
        /// Write the prompt request here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the compact snapshot here (overrides the config)
        #[arg(short, long)]
        snapshot: Option<PathBuf>,
    },
    /// Bring a workflow into runtime form, adding sequencing links if needed
    Migrate {
        workflow: PathBuf,
        #[arg(short, long)]
        registry: PathBuf,
    },
    /// Convert a runtime workflow into its stored form
    Compact { workflow: PathBuf },
    /// List the group nodes embedded in a workflow
    Groups {
        workflow: PathBuf,
        #[arg(short, long)]
        registry: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CompilerConfig::load(path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to load config: {}", e))),
        None => CompilerConfig::default(),
    };
    init_logging(&config);

    match cli.command {
        Command::Compile {
            workflow,
            registry,
            output,
            snapshot,
        } => run_compile(config, workflow, registry, output, snapshot).await,
        Command::Migrate { workflow, registry } => run_migrate(config, workflow, registry).await,
        Command::Compact { workflow } => run_compact(workflow),
        Command::Groups { workflow, registry } => run_groups(config, workflow, registry).await,
    }
}

fn init_logging(config: &CompilerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_compiler(config: CompilerConfig, registry_path: &PathBuf) -> Compiler {
    let registry = OperationRegistry::from_file(registry_path)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to load registry: {}", e)));
    Compiler::builder(registry)
        .with_config(config)
        .build()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to build compiler: {}", e)))
}

fn load_document(path: &PathBuf) -> Document {
    Document::from_file(path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to load workflow '{}': {}",
            path.display(),
            e
        ))
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to serialize output: {}", e)));
    println!("{}", json);
}

async fn run_compile(
    config: CompilerConfig,
    workflow_path: PathBuf,
    registry_path: PathBuf,
    output: Option<PathBuf>,
    snapshot: Option<PathBuf>,
) {
    let total_start = Instant::now();

    // --- 1. Loading ---
    let load_start = Instant::now();
    let snapshot = snapshot.or_else(|| config.snapshot.path.clone());
    let compiler = build_compiler(config, &registry_path);
    let workflow = load_document(&workflow_path);
    let load_duration = load_start.elapsed();

    // --- 2. Compilation ---
    eprintln!("Compiling workflow ({} nodes)...", workflow.nodes.len());
    let compile_start = Instant::now();
    let compiled = compiler
        .compile(&workflow)
        .await
        .unwrap_or_else(|e| exit_with_error(&format!("Compilation failed: {}", e)));
    let compile_duration = compile_start.elapsed();

    // --- 3. Output ---
    let request = compiled.to_request(0);
    match output {
        Some(path) => {
            let json = serde_json::to_string_pretty(&request)
                .unwrap_or_else(|e| exit_with_error(&format!("Failed to serialize prompt: {}", e)));
            fs::write(&path, json).unwrap_or_else(|e| {
                exit_with_error(&format!("Failed to write '{}': {}", path.display(), e))
            });
        }
        None => print_json(&request),
    }
    if let Some(path) = snapshot {
        compiled
            .save_snapshot(&path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to write snapshot: {}", e)));
    }

    eprintln!("\n--- Compilation Summary ---");
    eprintln!("Instructions:         {}", compiled.output.len());
    eprintln!("Flow Entries:         {}", compiled.flows.len());
    if compiled.missing_types.is_empty() {
        eprintln!("Missing Node Types:   none");
    } else {
        eprintln!("Missing Node Types:   {}", compiled.missing_types.join(", "));
    }
    eprintln!("\n--- Performance Summary ---");
    eprintln!("Loading:              {:?}", load_duration);
    eprintln!("Compilation:          {:?}", compile_duration);
    eprintln!("-----------------------------");
    eprintln!("Total Execution:      {:?}", total_start.elapsed());
}

async fn run_migrate(config: CompilerConfig, workflow_path: PathBuf, registry_path: PathBuf) {
    let compiler = build_compiler(config, &registry_path);
    let workflow = load_document(&workflow_path);
    let loaded = compiler
        .load(&workflow)
        .await
        .unwrap_or_else(|e| exit_with_error(&format!("Migration failed: {}", e)));
    if !loaded.missing_types.is_empty() {
        eprintln!("Missing node types: {}", loaded.missing_types.join(", "));
    }
    print_json(&loaded.document);
}

fn run_compact(workflow_path: PathBuf) {
    let workflow = load_document(&workflow_path);
    let compact = migrate::compact(workflow)
        .unwrap_or_else(|e| exit_with_error(&format!("Compaction failed: {}", e)));
    print_json(&compact);
}

async fn run_groups(config: CompilerConfig, workflow_path: PathBuf, registry_path: PathBuf) {
    let compiler = build_compiler(config, &registry_path);
    let workflow = load_document(&workflow_path);
    let loaded = compiler
        .load(&workflow)
        .await
        .unwrap_or_else(|e| exit_with_error(&format!("Loading failed: {}", e)));

    if loaded.group_defs.is_empty() {
        println!("No group nodes defined.");
        return;
    }
    for group in &loaded.group_defs {
        println!("{} ({} members)", group.node_type, group.config.nodes.len());
        for name in group.def.input.required.keys() {
            println!("  in:  {}", name);
        }
        for name in &group.def.output_name {
            println!("  out: {}", name);
        }
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
