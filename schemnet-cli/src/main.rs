//! Schemnet CLI - flatten hierarchical schematics into netlists from the command line.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use schemnet::library::builtin::PRIMITIVE_LEAF_TYPES;
use schemnet::{Circuit, ExtractOptions, LeafRecord, LibrarySet, SchemnetCore};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schemnet")]
#[command(about = "Hierarchical schematic netlist extraction tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Log progress to stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    log_level: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten a module into leaf device records
    Extract {
        #[command(flatten)]
        target: ExtractArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// List the electrical nodes of a flattened module
    Nodes {
        #[command(flatten)]
        target: ExtractArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// List the modules of a library
    Modules {
        /// Library JSON file, or a directory of them
        #[arg(value_name = "LIBRARY")]
        library: PathBuf,

        /// Only list modules whose qualified name starts with this
        #[arg(long, default_value = "")]
        prefix: String,

        /// Show each module's aspects and properties
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct ExtractArgs {
    /// Library JSON file (its file name is the library name) or a directory
    #[arg(value_name = "LIBRARY")]
    library: PathBuf,

    /// Module to flatten, qualified (/user/adder) or bare (adder)
    #[arg(value_name = "MODULE")]
    module: String,

    /// Treat this type as a leaf (repeatable)
    #[arg(long = "leaf", value_name = "TYPE")]
    leaves: Vec<String>,

    /// Treat every type starting with this prefix as a leaf (repeatable)
    #[arg(long = "leaf-prefix", value_name = "PREFIX")]
    leaf_prefixes: Vec<String>,

    /// Global signal name shared across the hierarchy (repeatable)
    #[arg(long = "global", value_name = "SIGNAL")]
    globals: Vec<String>,

    /// Stop at the built-in /gates/ library
    #[arg(long)]
    gates: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for simulators and scripts
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    let result = match cli.command {
        Commands::Extract { target, format } => handle_extract(&target, &format),
        Commands::Nodes { target, format } => handle_nodes(&target, &format),
        Commands::Modules {
            library,
            prefix,
            verbose,
        } => handle_modules(&library, &prefix, verbose),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> anyhow::Result<LibrarySet> {
    SchemnetCore::load_libraries(path)
        .with_context(|| format!("Failed to load library {}", path.display()))
}

fn build_options(args: &ExtractArgs, libraries: &LibrarySet) -> ExtractOptions {
    let mut options = if args.gates {
        ExtractOptions::gate_level()
    } else {
        ExtractOptions::default()
    };
    for leaf in &args.leaves {
        options = options.with_leaf(qualify_leaf(leaf, libraries));
    }
    for prefix in &args.leaf_prefixes {
        options = options.with_leaf_prefix(prefix.clone());
    }
    for global in &args.globals {
        options = options.with_global(global.clone());
    }
    options
}

/// Bare module names resolve through the libraries; primitives stay as is.
fn qualify_leaf(leaf: &str, libraries: &LibrarySet) -> String {
    if leaf.starts_with('/') || PRIMITIVE_LEAF_TYPES.contains(&leaf) {
        return leaf.to_string();
    }
    match SchemnetCore::resolve_module(libraries, leaf) {
        Ok(module) => module.name().to_string(),
        Err(_) => {
            tracing::warn!("Leaf type {} matches no module", leaf);
            leaf.to_string()
        }
    }
}

fn run_extraction(args: &ExtractArgs) -> anyhow::Result<(String, Vec<LeafRecord>)> {
    let libraries = load(&args.library)?;
    let module = SchemnetCore::resolve_module(&libraries, &args.module)?;
    let options = build_options(args, &libraries);
    let netlist = SchemnetCore::extract(module, &libraries, &options)
        .with_context(|| format!("Failed to extract {}", module.name()))?;
    Ok((module.name().to_string(), netlist))
}

fn handle_extract(args: &ExtractArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let (module, netlist) = run_extraction(args)?;
    match format {
        OutputFormat::Human => output_human(&module, &netlist),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&netlist)?),
    }
    Ok(())
}

fn output_human(module: &str, netlist: &[LeafRecord]) {
    println!("\nModule: {}", module);
    println!("{}", "─".repeat(60));

    if netlist.is_empty() {
        println!("  No devices");
        return;
    }

    for record in netlist {
        let connections: Vec<String> = record
            .connections
            .iter()
            .map(|(terminal, node)| format!("{}={}", terminal, node))
            .collect();
        println!(
            "  {:<16} {:<16} {}",
            record.name().unwrap_or("-"),
            record.type_name,
            connections.join(" ")
        );
    }

    let stats = Circuit::from_netlist(netlist).stats();
    println!("\n  Summary:");
    println!("    Devices:     {}", stats.device_count);
    println!("    Nodes:       {}", stats.node_count);
    println!("    Connections: {}", stats.connection_count);
}

fn handle_nodes(args: &ExtractArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let (_, netlist) = run_extraction(args)?;
    let circuit = Circuit::from_netlist(&netlist);
    let nodes = circuit.nodes();
    match format {
        OutputFormat::Human => {
            for node in nodes {
                println!("{}", node);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&nodes)?),
    }
    Ok(())
}

fn handle_modules(path: &Path, prefix: &str, verbose: bool) -> anyhow::Result<()> {
    let libraries = load(path)?;
    // The first library is the built-in gates; list only the loaded ones.
    for library in libraries.libraries().iter().skip(1) {
        println!("Modules in {}:\n", library.name());
        for name in library.module_names_with_prefix(prefix) {
            println!("  {}", name);
            let Some(module) = library.module(name).filter(|_| verbose) else {
                continue;
            };
            let aspects: Vec<&str> = module
                .aspect_names()
                .filter(|a| module.has_aspect(a))
                .collect();
            let properties: Vec<&str> = module.properties().keys().map(String::as_str).collect();
            println!("    aspects:    {}", aspects.join(", "));
            println!("    properties: {}", properties.join(", "));
        }
    }
    Ok(())
}
