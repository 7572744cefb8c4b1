use rtsim::prelude::*;

use rand::SeedableRng as _;

#[derive(clap::Parser)]
pub struct Args {
    /// Number of tasks to generate
    #[arg(short='n', value_name="# TASKS", default_value="8")]
    pub nb_tasks: usize,

    /// Total utilization of the task set
    #[arg(short='u', value_name="UTILIZATION", default_value="2.0")]
    pub total_utilization: f64,

    /// Candidate periods in seconds, comma separated
    #[arg(short='p', value_name="PERIODS", default_value="0.01,0.02,0.05,0.1,0.2,0.5,1.0",
          value_delimiter=',')]
    pub periods: Vec<f64>,

    /// Release jobs until this horizon (seconds)
    #[arg(short='t', value_name="HORIZON", default_value="2.0")]
    pub horizon: f64,

    /// PRNG seed
    #[arg(short='s', long="seed", value_name="SEED", default_value="42")]
    pub seed: u64,

    /// Output file; stdout when omitted
    #[arg(short='o', value_name="OUTPUT FILE")]
    pub output: Option<String>,
}

fn main() {
    let args = <Args as clap::Parser>::parse();

    let config = GeneratorConfig {
        nb_tasks: args.nb_tasks,
        total_utilization: args.total_utilization,
        periods: args.periods,
        horizon: args.horizon,
    };

    let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);
    let scenario = match generate_scenario(&config, &mut rng) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        },
    };

    let json = serde_json::to_string_pretty(&scenario).unwrap();
    match args.output {
        Some(path) => {
            if let Err(err) = std::fs::write(&path, json) {
                eprintln!("Failed to write \"{path}\": {err}");
                std::process::exit(1);
            }
        },
        None => println!("{json}"),
    }
}
