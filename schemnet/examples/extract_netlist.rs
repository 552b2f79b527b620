//! Extract a gate-level netlist from a library file and print it.

use schemnet::prelude::*;
use schemnet::Circuit;
use std::path::Path;

fn main() -> Result<(), SchemnetError> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .unwrap_or_else(|| concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/user.json").to_string());
    let module = args.next().unwrap_or_else(|| "full_adder".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example extract_netlist [library.json] [module]");
        std::process::exit(1);
    }

    let libraries = SchemnetCore::load_libraries(path)?;
    let module = SchemnetCore::resolve_module(&libraries, &module)?;
    let netlist = SchemnetCore::extract(module, &libraries, &ExtractOptions::gate_level())?;

    println!("Netlist for {}: {} devices", module.name(), netlist.len());
    for record in &netlist {
        let connections: Vec<String> = record
            .connections
            .iter()
            .map(|(terminal, node)| format!("{}={}", terminal, node))
            .collect();
        println!(
            "  {:<12} {:<16} {}",
            record.name().unwrap_or("-"),
            record.type_name,
            connections.join(" ")
        );
    }

    let stats = Circuit::from_netlist(&netlist).stats();
    println!();
    println!(
        "{} nodes, {} connections, {} connected groups",
        stats.node_count, stats.connection_count, stats.connected_groups
    );
    Ok(())
}
