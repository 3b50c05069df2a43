use std::{env, process, sync::Arc};

use entgraph::{
    Client, EntGraphError,
    client::CommandLineConfig,
    demo::{demo_registry, run_demo},
    safety::check_integrity,
};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    if config.command == "list" && config.entity_type.is_none() {
        eprintln!("error: list requires --type");
        eprintln!("{}", CommandLineConfig::help());
        process::exit(2);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("entgraph=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = match open_client(&config) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("{err}");
            process::exit(2);
        }
    };

    if let Err(err) = run_command(&client, &config) {
        eprintln!("command failed: {err}");
        process::exit(1);
    }
}

fn open_client(config: &CommandLineConfig) -> Result<Client, EntGraphError> {
    let registry = Arc::new(demo_registry()?);
    Client::open(&config.store_config(), registry)
}

fn run_command(client: &Client, config: &CommandLineConfig) -> Result<(), EntGraphError> {
    match config.command.as_str() {
        "demo" => {
            let report = run_demo(client)?;
            if let Some(user) = &report.round1_user {
                println!("round1 user: {user}");
            }
            println!("round2 cars: {}", report.round2_cars.len());
            if let Some(ford) = &report.round2_ford {
                println!("round2 ford: {ford}");
            }
            println!("round3 github cars: {}", models(&report.round3_github_cars));
            println!("round3 ariel cars: {}", models(&report.round3_ariel_cars));
            println!("round3 groups: {}", report.round3_groups.len());
            Ok(())
        }
        "status" => print_status(client),
        "list" => {
            if let Some(entity_type) = config.entity_type.as_deref() {
                for entity in client.query(entity_type)?.all()? {
                    println!("{entity}");
                }
            }
            Ok(())
        }
        other => {
            println!("unknown command {other}, defaulting to status");
            print_status(client)
        }
    }
}

fn print_status(client: &Client) -> Result<(), EntGraphError> {
    for ty in client.registry().entity_types() {
        println!("{}={}", ty.name, client.count(&ty.name)?);
    }
    let report = check_integrity(client.store())?;
    println!(
        "edges={} orphan_edges={} cardinality_violations={} missing_required_edges={}",
        report.total_edges,
        report.orphan_edges,
        report.cardinality_violations,
        report.missing_required_edges
    );
    Ok(())
}

fn models(cars: &[entgraph::Entity]) -> String {
    let models: Vec<&str> = cars.iter().filter_map(|car| car.text("model")).collect();
    models.join(",")
}
