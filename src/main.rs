use clap::{Args, Parser, Subcommand, ValueEnum};
use feed_rank::metrics::{average_rank, rank_integral, time_in_top_k, utility_integral};
use feed_rank::{
    compute_rank_trajectory_with, format_float, format_rank, oracle_ranking, Calibrator, EventLog,
    OracleFilter, OracleResult, OracleScheduler, RankIndex, RankOptions, ReplayFactory,
    RunConfig, SimOpts, SimOptsUpdate, Statistic,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feed-rank", about = "Feed rank analysis and optimal posting oracle")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank of the source at each follower over time.
    Rank(RankArgs),
    /// Integrated rank metrics for the source.
    Metrics(MetricsArgs),
    /// Optimal posting schedule against the other sources.
    Oracle(CommonArgs),
    /// Tune `s` so the oracle schedule meets a target statistic.
    Calibrate(CalibrateArgs),
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// JSON event log: `[{"event_id", "t", "src_id", "sink_id"}, ...]`.
    #[arg(long)]
    log: PathBuf,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    src: Option<u64>,
    #[arg(long)]
    end_time: Option<f64>,
    #[arg(long)]
    s: Option<f64>,
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug, Clone)]
struct RankArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Leave gaps between observations unfilled.
    #[arg(long)]
    sparse: bool,
    /// One row per event id instead of per timestamp.
    #[arg(long)]
    by_event: bool,
}

#[derive(Args, Debug, Clone)]
struct MetricsArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value_t = 1)]
    top_k: usize,
}

#[derive(Args, Debug, Clone)]
struct CalibrateArgs {
    #[command(flatten)]
    common: CommonArgs,
    /// Value the chosen statistic should reach.
    #[arg(long)]
    target: f64,
    #[arg(long, value_enum, default_value_t = CalibrationTarget::Posts)]
    statistic: CalibrationTarget,
    #[arg(long)]
    tolerance: Option<f64>,
    /// K for `--statistic top-k-time`, and for the reported time in the top K.
    #[arg(long, default_value_t = 1)]
    top_k: usize,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum CalibrationTarget {
    /// Number of posts in the oracle schedule.
    Posts,
    /// Time the oracle spends in the top K.
    TopKTime,
}

impl CalibrationTarget {
    fn statistic(self, k: usize) -> Statistic {
        match self {
            CalibrationTarget::Posts => Statistic::OracleEventCount,
            CalibrationTarget::TopKTime => Statistic::OracleTimeInTopK { k },
        }
    }
}

#[derive(Serialize)]
struct MetricsReport {
    src_id: u64,
    end_time: f64,
    utility_integral: f64,
    time_in_top_k: f64,
    top_k: usize,
    rank_integral: f64,
    average_rank: f64,
}

#[tokio::main]
async fn main() {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,feed_rank=info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Rank(args) => run_rank(args).await,
        Command::Metrics(args) => run_metrics(args).await,
        Command::Oracle(args) => run_oracle(args).await,
        Command::Calibrate(args) => run_calibrate(args).await,
    }
}

async fn run_rank(args: RankArgs) -> Result<(), String> {
    let (log, config) = load_inputs(&args.common).await?;
    let src_id = resolve_src(&args.common, &config)?;
    let options = RankOptions {
        index: if args.by_event {
            RankIndex::Event
        } else {
            RankIndex::Time
        },
        fill: !args.sparse,
    };
    let trajectory =
        compute_rank_trajectory_with(&log, src_id, options).map_err(|err| err.to_string())?;

    if args.common.json {
        return print_json(&trajectory);
    }

    let header: Vec<String> = trajectory
        .sink_ids()
        .iter()
        .map(|sink| format!("sink {}", sink))
        .collect();
    println!("t\t{}", header.join("\t"));
    for (time, cells) in trajectory.times().iter().zip(trajectory.rows()) {
        let ranks: Vec<String> = cells.iter().map(|cell| format_rank(*cell)).collect();
        println!("{}\t{}", format_float(*time, 3), ranks.join("\t"));
    }
    Ok(())
}

async fn run_metrics(args: MetricsArgs) -> Result<(), String> {
    let (log, config) = load_inputs(&args.common).await?;
    let src_id = resolve_src(&args.common, &config)?;
    let followers = log.followers_of(src_id);
    let opts = resolve_opts(&args.common, &config, &log, src_id, followers)?;

    let report = metrics_report(&log, &opts, args.top_k).map_err(|err| err.to_string())?;

    if args.common.json {
        return print_json(&report);
    }
    println!("Source {} until t = {}", report.src_id, format_float(report.end_time, 3));
    println!("Utility integral: {}", format_float(report.utility_integral, 4));
    println!(
        "Time in top {}: {}",
        report.top_k,
        format_float(report.time_in_top_k, 4)
    );
    println!("Rank integral: {}", format_float(report.rank_integral, 4));
    println!("Average rank: {}", format_float(report.average_rank, 4));
    Ok(())
}

fn metrics_report(
    log: &EventLog,
    opts: &SimOpts,
    top_k: usize,
) -> feed_rank::Result<MetricsReport> {
    let trajectory = compute_rank_trajectory_with(log, opts.src_id(), RankOptions::default())?;
    let end_time = opts.end_time();
    Ok(MetricsReport {
        src_id: opts.src_id(),
        end_time,
        utility_integral: utility_integral(
            &trajectory,
            opts.sink_ids(),
            opts.q_vec(),
            opts.s(),
            end_time,
        )?,
        time_in_top_k: time_in_top_k(&trajectory, top_k, end_time)?,
        top_k,
        rank_integral: rank_integral(&trajectory, end_time)?,
        average_rank: average_rank(&trajectory, end_time)?,
    })
}

async fn run_oracle(args: CommonArgs) -> Result<(), String> {
    let (log, config) = load_inputs(&args).await?;
    let src_id = resolve_src(&args, &config)?;
    let wall = log.without_sources(&[src_id]);
    let opts = resolve_opts(&args, &config, &wall, src_id, wall.sink_ids())?;
    let scheduler = OracleScheduler::new(config.oracle.clone());

    let result = tokio::task::spawn_blocking(move || {
        oracle_ranking(&wall, &opts, &OracleFilter::default(), &scheduler)
    })
    .await
    .map_err(|err| format!("oracle task failed: {}", err))?
    .map_err(|err| err.to_string())?;

    if args.json {
        return print_json(&result);
    }
    print_schedule(&result);
    Ok(())
}

async fn run_calibrate(args: CalibrateArgs) -> Result<(), String> {
    let (log, config) = load_inputs(&args.common).await?;
    let src_id = resolve_src(&args.common, &config)?;
    let wall = log.without_sources(&[src_id]);
    let opts = resolve_opts(&args.common, &config, &wall, src_id, wall.sink_ids())?;
    let tolerance = args.tolerance.unwrap_or(config.calibration.tolerance);
    let target = args.target;
    let top_k = args.top_k;
    let statistic = args.statistic.statistic(top_k);

    let result = tokio::task::spawn_blocking(move || {
        let factory = ReplayFactory::new(log);
        let calibrator =
            Calibrator::new(&factory, config.calibration.clone(), config.oracle.clone())?;
        calibrator.calibrate(|| opts.clone(), target, tolerance, statistic)
    })
    .await
    .map_err(|err| format!("calibration task failed: {}", err))?
    .map_err(|err| err.to_string())?;

    if args.common.json {
        return print_json(&result);
    }
    println!("Calibrated s: {}", format_float(result.s, 6));
    println!(
        "Achieved {:?}: {} (target {})",
        statistic,
        format_float(result.achieved, 4),
        format_float(target, 4)
    );
    if let Some(oracle) = result.oracle() {
        println!("Oracle posts: {}", oracle.num_events());
        println!("Oracle cost: {}", format_float(oracle.cost, 4));
        println!(
            "Time in top {}: {}",
            top_k,
            format_float(oracle.time_in_top_k(top_k), 4)
        );
    }
    Ok(())
}

fn print_schedule(result: &OracleResult) {
    println!(
        "Oracle cost: {} with {} posts over {} stages",
        format_float(result.cost, 4),
        result.num_events(),
        result.len()
    );
    for (stage, time) in result.timestamps.iter().enumerate() {
        if result.events[stage] {
            println!(
                "  post before stage {} (t = {}, rank {})",
                stage,
                format_float(*time, 3),
                result.ranks[stage]
            );
        }
    }
}

async fn load_inputs(args: &CommonArgs) -> Result<(EventLog, RunConfig), String> {
    let payload = tokio::fs::read_to_string(&args.log)
        .await
        .map_err(|err| format!("failed to read event log: {}", err))?;
    let log = EventLog::from_json(&payload).map_err(|err| err.to_string())?;
    let (config, _) = RunConfig::load(args.config.clone()).map_err(|err| err.to_string())?;
    Ok((log, config))
}

fn resolve_src(args: &CommonArgs, config: &RunConfig) -> Result<u64, String> {
    args.src
        .or_else(|| config.sim.as_ref().map(|sim| sim.src_id()))
        .ok_or_else(|| "missing source: pass --src or set [sim] in the config".to_string())
}

fn resolve_opts(
    args: &CommonArgs,
    config: &RunConfig,
    log: &EventLog,
    src_id: u64,
    followers: Vec<u64>,
) -> Result<SimOpts, String> {
    let base = match config.sim.as_ref() {
        Some(sim) => sim.update(SimOptsUpdate::default().src_id(src_id)),
        None => {
            let end_time = log.last_time().unwrap_or(0.0);
            SimOpts::new(src_id, followers, end_time)
        }
    }
    .map_err(|err| err.to_string())?;

    let mut update = SimOptsUpdate::default();
    if let Some(end_time) = args.end_time {
        update = update.end_time(end_time);
    }
    if let Some(s) = args.s {
        update = update.s(s);
    }
    base.update(update).map_err(|err| err.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let payload = serde_json::to_string_pretty(value)
        .map_err(|err| format!("failed to serialize output: {}", err))?;
    println!("{}", payload);
    Ok(())
}

fn load_dotenv() {
    let _ = dotenvy::dotenv();
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let manifest_path = Path::new(manifest_dir).join(".env");
    let _ = dotenvy::from_path(manifest_path);
}
