use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use xml_mapping::cli::{Cli, Command, VerbosityLevel};
use xml_mapping::config::{Config, ConfigError, ConfigManager};
use xml_mapping::driver::XmlDriver;
use xml_mapping::error::MappingError;
use xml_mapping::error_reporter::ErrorReporter;
use xml_mapping::expectations::ExpectationSet;
use xml_mapping::factory::ClassMetadataFactory;
use xml_mapping::file_discovery::FileDiscovery;
use xml_mapping::locator::FileLocator;
use xml_mapping::output::Output;
use xml_mapping::schema::MappingSchema;
use xml_mapping::validator::{
    PerformanceMetrics, ProgressCallback, ValidationConfig, ValidationEngine, ValidationPhase,
    ValidationResults,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbosity());

    if let Err(message) = cli.validate() {
        eprintln!("Error: {}", message);
        return ExitCode::from(2);
    }

    let config = match ConfigManager::load_config(&cli).await {
        Ok(config) => config,
        Err(e) => {
            ErrorReporter::new(cli.verbosity()).report_config_error(&e);
            return ExitCode::from(2);
        }
    };

    let verbosity = verbosity_of(&config);
    let reporter = ErrorReporter::new(verbosity);

    match run(&cli.command, &config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            if let Some(error) = e.downcast_ref::<MappingError>() {
                reporter.report_error(error);
            } else if let Some(error) = e.downcast_ref::<ConfigError>() {
                reporter.report_config_error(error);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(2)
        }
    }
}

/// Log to stderr; `RUST_LOG` overrides the level implied by -v/-q
fn init_tracing(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "xml_mapping=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn verbosity_of(config: &Config) -> VerbosityLevel {
    if config.output.quiet {
        VerbosityLevel::Quiet
    } else if config.output.verbose {
        VerbosityLevel::Verbose
    } else {
        VerbosityLevel::Normal
    }
}

/// Run a subcommand; `Ok(false)` means the mappings failed the check
async fn run(command: &Command, config: &Config) -> anyhow::Result<bool> {
    let verbosity = verbosity_of(config);
    let output = Output::new(verbosity, config.output.format);

    match command {
        Command::Validate { path, expect } => {
            run_validate(config, &output, path.as_ref(), expect.as_ref()).await
        }
        Command::Inspect { class } => {
            let factory = build_factory(config)?;
            match factory.metadata_for(class).await {
                Ok(metadata) => {
                    print!("{}", ensure_newline(output.format_metadata(&metadata)));
                    Ok(true)
                }
                Err(e) => {
                    ErrorReporter::new(verbosity).report_error(&e);
                    Ok(false)
                }
            }
        }
        Command::Check => {
            let factory = build_factory(config)?;
            let class_names = factory.class_names().await?;
            let issues = factory.validate_mapping().await?;
            print!(
                "{}",
                ensure_newline(output.format_issues(&issues, class_names.len()))
            );
            Ok(issues.is_empty())
        }
        Command::Classes => {
            let factory = build_factory(config)?;
            let class_names = factory.class_names().await?;
            print!("{}", ensure_newline(output.format_class_names(&class_names)));
            Ok(true)
        }
    }
}

fn build_factory(config: &Config) -> anyhow::Result<ClassMetadataFactory> {
    let locator = FileLocator::new(config.mapping.paths.clone())
        .with_extension(config.mapping.file_extension.clone());
    let mut driver = XmlDriver::new(Arc::new(locator));

    if config.mapping.validate_schema {
        driver = driver.with_schema_validation(MappingSchema::load(config.schema.xsd.as_deref())?);
    }

    Ok(ClassMetadataFactory::new(
        driver,
        config.cache.max_metadata_entries,
    ))
}

async fn run_validate(
    config: &Config,
    output: &Output,
    path: Option<&PathBuf>,
    expect: Option<&PathBuf>,
) -> anyhow::Result<bool> {
    let schema = MappingSchema::load(config.schema.xsd.as_deref())?;

    let discovery = FileDiscovery::new()
        .with_suffixes(vec![config.mapping.file_extension.clone()])
        .with_include_patterns(config.files.include_patterns.clone())?
        .with_exclude_patterns(config.files.exclude_patterns.clone())?
        .with_max_depth(config.files.max_depth)
        .with_follow_symlinks(config.files.follow_symlinks);

    let engine_config = ValidationConfig {
        max_concurrent_validations: ConfigManager::get_thread_count(config),
        validation_timeout: ConfigManager::get_timeout_duration(config),
        fail_fast: config.validation.fail_fast,
    };
    let mut engine = ValidationEngine::new(schema, engine_config);

    if let Some(expect) = expect {
        let expectations = ExpectationSet::from_path(expect)
            .with_context(|| format!("Failed to load expectations from {}", expect.display()))?;
        debug!(files = expectations.len(), "loaded violation expectations");
        engine = engine.with_expectations(expectations);
    }

    let roots = match path {
        Some(path) => vec![path.clone()],
        None => config.mapping.paths.clone(),
    };

    let progress = progress_callback(verbosity_of(config));
    let mut runs = Vec::with_capacity(roots.len());
    for root in &roots {
        runs.push(
            engine
                .validate_path_with_progress(root, &discovery, progress.clone())
                .await?,
        );
    }

    let results = combine(runs);
    print!("{}", ensure_newline(output.format_results(&results)));

    Ok(!results.has_failures())
}

fn combine(mut runs: Vec<ValidationResults>) -> ValidationResults {
    if runs.len() == 1 {
        if let Some(results) = runs.pop() {
            return results;
        }
    }

    let mut metrics = PerformanceMetrics::default();
    let mut file_results = Vec::new();
    for run in runs {
        metrics.total_duration += run.performance_metrics.total_duration;
        metrics.discovery_duration += run.performance_metrics.discovery_duration;
        metrics.validation_duration += run.performance_metrics.validation_duration;
        metrics.concurrent_validations = run.performance_metrics.concurrent_validations;
        file_results.extend(run.file_results);
    }
    if !file_results.is_empty() {
        metrics.average_time_per_file = metrics.validation_duration / file_results.len() as u32;
    }
    if metrics.total_duration.as_secs_f64() > 0.0 {
        metrics.throughput_files_per_second =
            file_results.len() as f64 / metrics.total_duration.as_secs_f64();
    }

    ValidationResults::with_metrics(file_results, metrics)
}

fn progress_callback(verbosity: VerbosityLevel) -> Option<ProgressCallback> {
    if verbosity == VerbosityLevel::Quiet || !atty::is(atty::Stream::Stderr) {
        return None;
    }

    let reporter = Arc::new(ErrorReporter::new(verbosity));
    Some(Arc::new(move |progress| {
        if progress.phase == ValidationPhase::Validation {
            reporter.report_progress(
                progress.completed,
                progress.total,
                progress.current_file.as_deref(),
            );
        }
    }))
}

fn ensure_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
