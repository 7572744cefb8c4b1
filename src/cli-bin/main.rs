use crate::args::Args;
use rtsim::prelude::*;

pub mod args;

enum CliError {
    /// Exit code 1: input data could not be loaded.
    Loader(anyhow::Error),
    /// Exit code 2: the requested configuration is invalid.
    Config(anyhow::Error),
}

fn main() {
    let args = match <Args as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(err) => {
            use clap::error::ErrorKind::*;

            let exit_code = match err.kind() {
                DisplayHelp |
                DisplayHelpOnMissingArgumentOrSubcommand |
                DisplayVersion => 0,
                _ => 2,
            };

            err.print().unwrap();
            std::process::exit(exit_code);
        },
    };

    // Violated engine invariants panic; report them as exit code 3.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(args)));
    match outcome {
        Ok(Ok(())) => {},
        Ok(Err(CliError::Loader(err))) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        },
        Ok(Err(CliError::Config(err))) => {
            eprintln!("{err:#}");
            std::process::exit(2);
        },
        Err(_) => {
            eprintln!("simulation aborted on a runtime assertion");
            std::process::exit(3);
        },
    }
}

fn run(args: Args) -> Result<(), CliError> {
    use anyhow::Context as _;

    let platform_spec = load_platform_spec(&args.inputs.platform)
        .with_context(|| format!("loading platform \"{}\"", args.inputs.platform))
        .map_err(CliError::Loader)?;
    let scenario = load_scenario_spec(&args.inputs.scenario)
        .with_context(|| format!("loading scenario \"{}\"", args.inputs.scenario))
        .map_err(CliError::Loader)?;

    let BuiltPlatform { mut platform, clusters } = build_platform(&platform_spec)
        .context("building platform")
        .map_err(CliError::Loader)?;

    let mut task_ids = Vec::with_capacity(scenario.tasks.len());
    for task in &scenario.tasks {
        let period = Duration::secs(task.period);
        let wcet = Duration::secs(task.utilization * task.period);
        let id = platform
            .add_task(period, period, wcet)
            .context("adding scenario tasks")
            .map_err(CliError::Loader)?;
        task_ids.push(id);
    }
    platform.finalize();

    let mut sim = Simulation::new(platform);
    for cluster in &clusters {
        let id = sim.add_cluster(
            cluster.domain,
            args.config.admission,
            args.config.deadline_miss,
            args.config.scheduler.reclamation(),
            cluster.perf_score,
        );
        if let Some(u_target) = cluster.u_target {
            sim.cluster_mut(id).set_u_target(u_target);
        }
    }

    let allocator = parse_allocator(&args.config.allocator, args.config.seed)
        .with_context(|| format!("allocator \"{}\"", args.config.allocator))
        .map_err(CliError::Config)?;
    sim.set_allocator(allocator)
        .context("installing allocator")
        .map_err(CliError::Config)?;

    if let Some(power) = args.config.policy.instantiate(args.config.cooldown) {
        sim.set_power_policy(power);
    }

    // Post-run outputs need the records in memory; a bare --trace streams
    // JSON lines directly to the file instead.
    let need_records = args.output.summary || args.output.gantt.is_some();
    let records_handle = if need_records {
        let (writer, records) = MemoryTraceWriter::new();
        sim.set_trace_writer(Box::new(writer));
        Some(records)
    } else {
        if let Some(path) = &args.output.trace {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating trace file \"{path}\""))
                .map_err(CliError::Loader)?;
            sim.set_trace_writer(Box::new(JsonLinesWriter::new(std::io::BufWriter::new(file))));
        }
        None
    };

    for (task, &id) in scenario.tasks.iter().zip(&task_ids) {
        for job in &task.jobs {
            sim.schedule_job_arrival(id, TimePoint::secs(job.arrival), Duration::secs(job.duration));
        }
    }

    match args.config.until {
        Some(until) => {
            sim.run_until(TimePoint::secs(until));
            sim.finish();
        },
        None => sim.run(),
    }

    let Some(records) = records_handle else { return Ok(()) };
    let records = records.borrow();

    if let Some(path) = &args.output.trace {
        write_trace(path, &records).map_err(CliError::Loader)?;
    }
    if let Some(path) = &args.output.gantt {
        let rendered = render_rtsched(&build_gantt(&records));
        std::fs::write(path, rendered)
            .with_context(|| format!("writing gantt file \"{path}\""))
            .map_err(CliError::Loader)?;
    }
    if args.output.summary {
        print_summary(&records, &sim, &clusters);
    }

    Ok(())
}

fn write_trace(path: &str, records: &[TraceRecord]) -> anyhow::Result<()> {
    use anyhow::Context as _;

    let file = std::fs::File::create(path)
        .with_context(|| format!("creating trace file \"{path}\""))?;
    let mut writer = JsonLinesWriter::new(std::io::BufWriter::new(file));

    for record in records {
        writer.begin(TimePoint::secs(record.time));
        writer.event_type(&record.kind);
        for (key, value) in &record.fields {
            writer.field(key, value.clone());
        }
        writer.end();
    }

    Ok(())
}

fn print_summary(records: &[TraceRecord], sim: &Simulation, clusters: &[BuiltCluster]) {
    let stats = SimStats::from_records(records);

    println!("duration: {:.6} s", stats.duration);
    println!("jobs completed: {}", stats.total_completions());
    println!("deadline misses: {}", stats.total_deadline_misses());
    println!("preemptions: {}", stats.preemptions);
    println!("context switches: {}", stats.context_switches);
    println!("rejected tasks: {}", stats.rejected_tasks);
    println!("frequency changes: {}", stats.frequency_changes);

    for (tid, task) in &stats.tasks {
        println!(
            "task {tid}: {} arrivals, {} completed, {} missed, \
             avg response {:.6} s, worst {:.6} s",
            task.arrivals,
            task.completions,
            task.deadline_misses,
            task.average_response_time(),
            task.worst_response_time(),
        );
    }

    for (idx, cluster) in clusters.iter().enumerate() {
        let Some(model) = cluster.power_model else { continue };
        let domain = sim.platform().clock_domain(cluster.domain);
        let energy = compute_energy(
            records,
            cluster.domain,
            domain.processors(),
            domain.freq_max(),
            &model,
        );
        println!("cluster {idx} energy: {:.3} mJ", energy.mj);
    }
}
