use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use zonekeeper::checker::NamedCheckzone;
use zonekeeper::config::PublisherConfig;
use zonekeeper::metrics::ZoneMetrics;
use zonekeeper::model::ZoneId;
use zonekeeper::publish::Publisher;
use zonekeeper::validation::{ValidateOutcome, ValidationQueue, ZoneValidator};
use zonekeeper::zone::{
    CatalogSnapshot, EmitMode, IncludeGraph, MemoryCatalog, ZoneSources, ZoneSynthesizer,
};

fn cli() -> Command {
    let zone_arg = |name: &'static str, help: &'static str| {
        Arg::new(name)
            .required(true)
            .value_name("ZONE_ID")
            .help(help)
            .value_parser(value_parser!(ZoneId))
    };

    Command::new("zonekeeper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate, validate and publish BIND zone files")
        .subcommand_required(true)
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .short('c')
                .value_name("FILE")
                .help("Zone catalog snapshot (TOML)")
                .default_value("zones.toml")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("Publisher configuration (TOML); environment variables are used when absent")
                .global(true),
        )
        .arg(
            Arg::new("user")
                .long("user")
                .value_name("NAME")
                .help("Caller identity recorded with validation results")
                .global(true),
        )
        .subcommand(
            Command::new("preview")
                .about("Print generated zone content")
                .arg(zone_arg("zone", "Zone to generate"))
                .arg(
                    Arg::new("directives")
                        .long("directives")
                        .help("Keep $INCLUDE directives instead of inlining includes")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("serial")
                        .long("serial")
                        .value_name("SERIAL")
                        .help("SOA serial to use instead of a generated one")
                        .value_parser(value_parser!(u32)),
                ),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a zone with the external checker")
                .arg(zone_arg("zone", "Zone to validate"))
                .arg(
                    Arg::new("queue")
                        .long("queue")
                        .help("Validate in the background and report the last known result")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("publish")
                .about("Write every active master zone and its includes")
                .arg(
                    Arg::new("metrics")
                        .long("metrics")
                        .help("Print Prometheus metrics after the run")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("attach")
                .about("Attach an include under a parent zone")
                .arg(zone_arg("parent", "Parent zone"))
                .arg(zone_arg("include", "Include zone"))
                .arg(
                    Arg::new("position")
                        .long("position")
                        .value_name("N")
                        .default_value("0")
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(i32)),
                ),
        )
        .subcommand(
            Command::new("detach")
                .about("Remove an include from a parent zone")
                .arg(zone_arg("parent", "Parent zone"))
                .arg(zone_arg("include", "Include zone")),
        )
}

fn load_config(matches: &ArgMatches) -> Result<PublisherConfig, Box<dyn std::error::Error>> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => PublisherConfig::load(path)?,
        None => PublisherConfig::from_env()?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();

    if let Err(e) = run(&matches).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(matches)?;
    let catalog_path = matches
        .get_one::<String>("catalog")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("zones.toml"));
    let user = matches.get_one::<String>("user").map(String::as_str);

    let (catalog, graph) = CatalogSnapshot::load(&catalog_path)?.into_parts();
    let catalog = Arc::new(catalog);
    let graph = Arc::new(graph);

    let sources = ZoneSources::from_catalog(catalog.clone(), graph.clone());
    let synthesizer = ZoneSynthesizer::new(sources).with_nameservers(config.nameservers.clone());
    let metrics = Arc::new(ZoneMetrics::new()?);
    let validator = ZoneValidator::new(
        synthesizer.clone(),
        Arc::new(NamedCheckzone::from_config(&config)),
        catalog.clone(),
        &config,
    )
    .with_metrics(metrics.clone());

    match matches.subcommand() {
        Some(("preview", sub)) => {
            let zone_id = *sub.get_one::<ZoneId>("zone").ok_or("missing zone id")?;
            let mode = if sub.get_flag("directives") {
                EmitMode::Directive
            } else {
                EmitMode::Flatten
            };
            let serial = sub.get_one::<u32>("serial").copied();
            let artifact = synthesizer.generate_with_serial(zone_id, mode, serial)?;
            print!("{}", artifact.content);
        }
        Some(("validate", sub)) => {
            let zone_id = *sub.get_one::<ZoneId>("zone").ok_or("missing zone id")?;
            let synchronous = config.validate_sync || !sub.get_flag("queue");

            let (validator, worker) = if synchronous {
                (validator, None)
            } else {
                let (queue, worker) = ValidationQueue::start(validator.clone());
                (validator.with_queue(queue), Some(worker))
            };

            match validator.validate(zone_id, synchronous, user).await? {
                ValidateOutcome::Completed(result) => {
                    println!("{}: {}", result.status, result.output);
                }
                ValidateOutcome::Queued { last_known } => {
                    match last_known {
                        Some(result) => println!("queued; last result {}", result.status),
                        None => println!("queued; no previous result"),
                    }
                    // A one-shot process has to let the worker drain before exiting
                    drop(validator);
                    if let Some(worker) = worker {
                        worker.await?;
                    }
                    if let Some(result) = catalog.validation_history(zone_id).last() {
                        println!("{}: {}", result.status, result.output);
                    }
                }
            }
        }
        Some(("publish", sub)) => {
            let publisher = Publisher::new(validator, config).with_metrics(metrics.clone());
            let report = publisher.publish(user).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if sub.get_flag("metrics") {
                print!("{}", metrics.export()?);
            }
            if !report.success {
                process::exit(2);
            }
        }
        Some(("attach", sub)) => {
            let parent = *sub.get_one::<ZoneId>("parent").ok_or("missing parent id")?;
            let include = *sub.get_one::<ZoneId>("include").ok_or("missing include id")?;
            let position = sub.get_one::<i32>("position").copied().unwrap_or(0);
            graph.attach(catalog.as_ref(), parent, include, position)?;
            save_catalog(&catalog, &graph, &catalog_path)?;
        }
        Some(("detach", sub)) => {
            let parent = *sub.get_one::<ZoneId>("parent").ok_or("missing parent id")?;
            let include = *sub.get_one::<ZoneId>("include").ok_or("missing include id")?;
            if graph.detach(parent, include) {
                save_catalog(&catalog, &graph, &catalog_path)?;
            } else {
                println!("include {} is not attached to {}", include, parent);
                process::exit(1);
            }
        }
        _ => unreachable!("subcommand_required is set"),
    }

    Ok(())
}

fn save_catalog(
    catalog: &MemoryCatalog,
    graph: &IncludeGraph,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = CatalogSnapshot::capture(catalog, graph).to_toml_string()?;
    let temp_path = format!("{}.tmp", path.display());
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    info!("Saved zone catalog: {}", path.display());
    Ok(())
}
