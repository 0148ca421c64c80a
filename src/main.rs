//! vfs-adapter command line entry point

use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vfs_adapter::config::Config;
use vfs_adapter::registry::ConnectionRegistry;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: vfs-adapter <config.yaml> <command> [args]");
    eprintln!();
    eprintln!("vfs-adapter - Inspect the named connections of a configuration file");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  connections                          Resolve every connection");
    eprintln!("  ls <connection> [dir] [--recursive]  List a directory");
    eprintln!("  cat <connection> <path>              Print a file");
    eprintln!("  stat <connection> <path>             Print metadata as JSON");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  vfs-adapter /etc/vfs-adapter/config.yaml ls uploads reports --recursive");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        print_usage();
        std::process::exit(1);
    }

    let config_path = PathBuf::from(&args[1]);

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Loaded configuration from {:?}", config_path);

    let registry = ConnectionRegistry::from_config(config)?;

    if let Err(e) = run(&registry, &args[2..]).await {
        error!("{}", e);
        std::process::exit(1);
    }

    if let Some(store) = registry.cache_store() {
        store.flush()?;
    }

    Ok(())
}

async fn run(registry: &ConnectionRegistry, command: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        [cmd] if cmd == "connections" => {
            let connections = registry.connections().await?;
            info!("{} connection(s) resolved", connections.len());
            for (name, fs) in &connections {
                println!("{}\t{}", name, fs.adapter().name());
            }
        }
        [cmd, connection, rest @ ..] if cmd == "ls" => {
            let recursive = rest.iter().any(|a| a == "--recursive" || a == "-r");
            let dir = rest
                .iter()
                .find(|a| !a.starts_with('-'))
                .map(String::as_str)
                .unwrap_or("");

            let fs = registry.make_connection(Some(connection.as_str())).await?;
            for entry in fs.list_contents(dir, recursive).await? {
                let marker = if entry.is_dir() { "/" } else { "" };
                let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
                println!("{:>10}  {}{}", size, entry.path, marker);
            }
        }
        [cmd, connection, path] if cmd == "cat" => {
            let fs = registry.make_connection(Some(connection.as_str())).await?;
            let contents = fs.read(path).await?;
            print!("{}", String::from_utf8_lossy(&contents));
        }
        [cmd, connection, path] if cmd == "stat" => {
            let fs = registry.make_connection(Some(connection.as_str())).await?;
            let metadata = fs.get_metadata(path).await?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        _ => {
            print_usage();
            std::process::exit(1);
        }
    }
    Ok(())
}
