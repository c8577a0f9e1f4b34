//! Covprobe CLI: live method coverage from the command line
//!
//! ## Usage
//!
//! ```bash
//! covprobe stream --total 62491 -n 0           # Poll the live log forever
//! covprobe snapshot --classes app/classes \
//!     --jacoco-cli jacococli.jar --growth      # Pull snapshots, track stagnation
//! covprobe run --config covprobe.yaml -f json  # Poll using a YAML config
//! covprobe analyze report.csv                  # Summarize a JaCoCo CSV report
//! covprobe config --template snapshot          # Print a config template
//! ```

use clap::Parser;
use covprobe::config::DEFAULT_OUTPUT_DIR;
use covprobe::{
    parse_jacoco_csv, CoverageService, CoverageServiceConfig, ServiceMode, SnapshotConfig,
    StreamConfig,
};
use covprobe_cli::{
    poll, AnalyzeArgs, AnalyzeReport, Cli, CliConfig, CliError, CliResult, Commands, ConfigArgs,
    OutputFormat, PollArgs, RunArgs, SnapshotArgs, StreamArgs, TemplateMode, Verbosity,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = build_config(&cli);
    config.init_logging();

    match cli.command {
        Commands::Stream(args) => run_stream(&args),
        Commands::Snapshot(args) => run_snapshot(&args),
        Commands::Run(args) => run_config_file(&args),
        Commands::Analyze(args) => run_analyze(&args),
        Commands::Config(args) => run_config(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_log_format(cli.log_format)
}

fn run_stream(args: &StreamArgs) -> CliResult<()> {
    let config = CoverageServiceConfig::new(ServiceMode::Stream(args.stream_config()))
        .with_output_dir(args.output.clone())
        .with_device(args.device.device_config());
    run_service(config, &args.poll)
}

fn run_snapshot(args: &SnapshotArgs) -> CliResult<()> {
    let config = CoverageServiceConfig::new(ServiceMode::Snapshot(args.snapshot_config()))
        .with_output_dir(args.output.clone())
        .with_device(args.device.device_config());
    run_service(config, &args.poll)
}

fn run_config_file(args: &RunArgs) -> CliResult<()> {
    let config = CoverageServiceConfig::from_yaml_file(&args.config)
        .map_err(|e| CliError::config(format!("{}: {e}", args.config.display())))?;
    run_service(config, &args.poll)
}

fn run_service(config: CoverageServiceConfig, poll_args: &PollArgs) -> CliResult<()> {
    poll_args.validate()?;
    config
        .validate()
        .map_err(|e| CliError::config(e.to_string()))?;
    tracing::info!(mode = config.mode.name(), "starting coverage service");

    let service = CoverageService::new(config)?;
    let mut stdout = std::io::stdout().lock();
    let taken = poll(&service, poll_args, &mut stdout);
    if !service.shutdown(poll_args.shutdown_timeout()) {
        tracing::warn!("log listener did not stop in time");
    }
    let taken = taken?;
    tracing::info!(readings = taken, "coverage polling finished");
    Ok(())
}

fn run_analyze(args: &AnalyzeArgs) -> CliResult<()> {
    let csv = std::fs::read_to_string(&args.report)?;
    let units = parse_jacoco_csv(&csv)?;
    let report = AnalyzeReport::from_units(&units);
    match args.format {
        OutputFormat::Text => println!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn run_config(args: &ConfigArgs) -> CliResult<()> {
    let config = match &args.file {
        Some(path) => CoverageServiceConfig::from_yaml_file(path)
            .map_err(|e| CliError::config(format!("{}: {e}", path.display())))?,
        None => template(args.template),
    };
    print!("{}", config.to_yaml()?);
    Ok(())
}

fn template(mode: TemplateMode) -> CoverageServiceConfig {
    let mode = match mode {
        TemplateMode::Stream => ServiceMode::Stream(StreamConfig::new(1000)),
        TemplateMode::Snapshot => ServiceMode::Snapshot(SnapshotConfig::new(
            DEFAULT_OUTPUT_DIR,
            "coverage.ec",
            "/sdcard",
            "app/build/intermediates/javac/debug/classes",
            "jacococli.jar",
        )),
        TemplateMode::Disabled => ServiceMode::Disabled,
    };
    CoverageServiceConfig::new(mode)
}
