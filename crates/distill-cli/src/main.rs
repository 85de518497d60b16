use anyhow::Result;
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;
use std::str::FromStr;

use distill_cli::experiment::{
    load_experiment_config, run_experiment, write_report, ExperimentConfig,
};
use distill_defences::zoo::Backend;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(
            env_logger::Env::default()
                .filter_or("DISTILL_LOG", "error,distill_defences=info,distill_cli=info"),
        )
        .init();

    let matches = Command::new("distill")
        .version(clap::crate_version!())
        .about("Defensive distillation experiments on seeded classifiers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("run")
                .about("Pretrain a classifier, distill it and compare the two")
                .arg(
                    Arg::new("config")
                        .help("Path to experiment JSON configuration file")
                        .required(false)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("backend")
                        .short('b')
                        .long("backend")
                        .help("Classifier backend. Overrides the backend in the configuration file.")
                        .value_parser(["linear", "mlp", "candle"]),
                )
                .arg(
                    Arg::new("seed")
                        .short('s')
                        .long("seed")
                        .help("Seed for data generation, initialisation and shuffling.")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("epochs")
                        .short('e')
                        .long("epochs")
                        .help("Number of distillation epochs.")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output")
                        .help("Path to write the JSON report to.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("template").about("Print the default experiment configuration"),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", run_matches)) => handle_run(run_matches),
        Some(("template", _)) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&ExperimentConfig::default())?
            );
            Ok(())
        }
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_run(matches: &ArgMatches) -> Result<()> {
    let mut config = if let Some(config_path) = matches.get_one::<PathBuf>("config") {
        eprintln!("[distill] Using config: {:?}", config_path);
        load_experiment_config(config_path)?
    } else {
        eprintln!("[distill] No config provided; using defaults.");
        ExperimentConfig::default()
    };

    if let Some(backend) = matches.get_one::<String>("backend") {
        config.set_backend(Backend::from_str(backend).map_err(anyhow::Error::msg)?);
    }
    if let Some(seed) = matches.get_one::<u64>("seed") {
        config.seed = *seed;
    }
    if let Some(epochs) = matches.get_one::<usize>("epochs") {
        config.distillation.nb_epochs = *epochs;
    }

    let report = match run_experiment(&config) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Experiment failed: {:#}", e);
            std::process::exit(1)
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(output_path) = matches.get_one::<PathBuf>("output_file") {
        write_report(&report, output_path)?;
        eprintln!("[distill] Report written to {:?}", output_path);
    }
    Ok(())
}
