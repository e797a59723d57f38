//! Command-line driver: turns local files into whole-file records and runs
//! them through the rot13 stage.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use tracing::info;
use wholefile_config::{
    ENV_DIRECTORY, ENV_ON_RECORD_ERROR, ENV_OVERWRITE, OnRecordError, OverwritePolicy,
    StageConfig,
};
use wholefile_events::EventBus;
use wholefile_stage::{LocalFileRef, MetadataProjector, Record, StageError, StageRunner};
use wholefile_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, Metrics, init_logging};

use crate::output::{render_failure, render_record};

const BUILD_SHA: &str = match option_env!("WHOLEFILE_BUILD_SHA") {
    Some(sha) => sha,
    None => "dev",
};

/// Parses CLI arguments, runs the stage over the given files and prints the
/// emitted records. Returns the process exit code.
#[must_use]
pub fn run() -> i32 {
    let cli = Cli::parse();
    let format = cli
        .log_format
        .as_deref()
        .map_or_else(LogFormat::infer, LogFormat::from_name);
    if let Err(err) = init_logging(&LoggingConfig {
        level: &cli.log_level,
        format,
        build_sha: BUILD_SHA,
    }) {
        eprintln!("error: failed to initialise logging: {err}");
        return 3;
    }

    let stdout = io::stdout();
    let stderr = io::stderr();
    match execute(&cli, &mut stdout.lock(), &mut stderr.lock()) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "wholefile",
    version,
    about = "Rewrite whole files through rot13 into an output directory"
)]
pub(crate) struct Cli {
    #[arg(long, env = ENV_DIRECTORY, help = "Directory receiving the rewritten files")]
    directory: Option<PathBuf>,
    #[arg(long, help = "JSON stage configuration document")]
    config: Option<PathBuf>,
    #[arg(long, env = ENV_OVERWRITE, help = "replace or fail when an output file exists")]
    overwrite: Option<OverwritePolicy>,
    #[arg(
        long,
        env = ENV_ON_RECORD_ERROR,
        help = "to-error, discard or stop-pipeline"
    )]
    on_record_error: Option<OnRecordError>,
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
    #[arg(long, help = "json or pretty")]
    log_format: Option<String>,
    #[arg(long, help = "Print Prometheus metrics to stderr after the run")]
    metrics: bool,
    #[arg(required = true, help = "Input files")]
    files: Vec<PathBuf>,
}

#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
    RecordsFailed(usize),
}

pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
            Self::RecordsFailed(_) => 4,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
            Self::RecordsFailed(count) => format!("{count} record(s) failed"),
        }
    }
}

fn execute(cli: &Cli, out: &mut impl Write, err_out: &mut impl Write) -> CliResult<()> {
    let config = resolve_config(cli)?;
    let records = cli
        .files
        .iter()
        .map(|path| load_record(path))
        .collect::<CliResult<Vec<_>>>()?;

    let metrics = Metrics::new()
        .map_err(|err| CliError::failure(anyhow!("failed to build metrics registry: {err}")))?;
    let mut runner = StageRunner::new(config, EventBus::new(), metrics);
    runner.init().map_err(|err| match err {
        StageError::InvalidConfiguration { issues } => CliError::validation(
            issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => CliError::failure(anyhow::Error::new(other)),
    })?;

    let result = runner.process_batch(records);
    runner.destroy();
    let batch = result
        .map_err(|err| CliError::failure(anyhow::Error::new(err).context("stage run aborted")))?;

    for record in &batch.output {
        writeln!(out, "{}", render_record(record)?).map_err(write_failure)?;
    }
    for failure in &batch.errors {
        writeln!(err_out, "{}", render_failure(failure)).map_err(write_failure)?;
    }
    if cli.metrics {
        let rendered = runner
            .metrics()
            .render()
            .map_err(|err| CliError::failure(anyhow!("failed to render metrics: {err}")))?;
        write!(err_out, "{rendered}").map_err(write_failure)?;
    }

    info!(
        emitted = batch.output.len(),
        failed = batch.errors.len(),
        "run complete"
    );
    if batch.errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::RecordsFailed(batch.errors.len()))
    }
}

fn resolve_config(cli: &Cli) -> CliResult<StageConfig> {
    let from_file = cli
        .config
        .as_deref()
        .map(|path| {
            StageConfig::from_path(path).map_err(|err| {
                CliError::validation(format!(
                    "invalid configuration {}: {:#}",
                    path.display(),
                    anyhow::Error::new(err)
                ))
            })
        })
        .transpose()?;
    let directory = |path: &Path| {
        StageConfig::new(path).map_err(|err| {
            CliError::validation(format!("invalid directory: {:#}", anyhow::Error::new(err)))
        })
    };

    let mut config = match (from_file, cli.directory.as_deref()) {
        (Some(base), Some(path)) => directory(path)?
            .with_overwrite(base.overwrite)
            .with_on_record_error(base.on_record_error),
        (Some(base), None) => base,
        (None, Some(path)) => directory(path)?,
        (None, None) => {
            return Err(CliError::validation(format!(
                "an output directory is required: pass --directory, set {ENV_DIRECTORY}, or use --config"
            )));
        }
    };
    if let Some(policy) = cli.overwrite {
        config = config.with_overwrite(policy);
    }
    if let Some(policy) = cli.on_record_error {
        config = config.with_on_record_error(policy);
    }
    Ok(config)
}

fn load_record(path: &Path) -> CliResult<Record> {
    if !path.is_file() {
        return Err(CliError::validation(format!(
            "input {} is not a readable file",
            path.display()
        )));
    }
    let invalid = |err: StageError| {
        CliError::validation(format!(
            "cannot read input {}: {:#}",
            path.display(),
            anyhow::Error::new(err)
        ))
    };
    let file_ref = LocalFileRef::from_path(path).map_err(invalid)?;
    let file_info = MetadataProjector::default().project(path).map_err(invalid)?;
    Ok(Record::whole_file(Arc::new(file_ref), file_info))
}

fn write_failure(err: io::Error) -> CliError {
    CliError::failure(anyhow::Error::new(err).context("failed to write output"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;
    use wholefile_test_support::fixtures::{
        SAMPLE_FILENAME, SAMPLE_ROT13, SAMPLE_TEXT, temp_dir, write_input,
    };

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("wholefile").chain(args.iter().copied()))
    }

    #[test]
    fn parses_policy_names_with_dashes() -> anyhow::Result<()> {
        let cli = parse(&[
            "--directory",
            "/srv/out",
            "--overwrite",
            "fail",
            "--on-record-error",
            "stop-pipeline",
            "--metrics",
            "a.txt",
            "b.txt",
        ])?;
        assert_eq!(cli.directory, Some(PathBuf::from("/srv/out")));
        assert_eq!(cli.overwrite, Some(OverwritePolicy::Fail));
        assert_eq!(cli.on_record_error, Some(OnRecordError::StopPipeline));
        assert!(cli.metrics);
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.log_level, DEFAULT_LOG_LEVEL);
        Ok(())
    }

    #[test]
    fn input_files_are_required() {
        assert!(parse(&["--directory", "/srv/out"]).is_err());
        assert!(parse(&["--overwrite", "sometimes", "a.txt"]).is_err());
    }

    #[test]
    fn flags_override_the_configuration_document() -> anyhow::Result<()> {
        let temp = temp_dir("cli-config")?;
        let doc = temp.path().join("stage.json");
        fs::write(
            &doc,
            serde_json::to_vec(&serde_json::json!({
                "directory": temp.path().join("from-file"),
                "overwrite": "fail",
                "on_record_error": "discard"
            }))?,
        )?;
        let doc_arg = doc.to_string_lossy().into_owned();

        let from_file = resolve_config(&parse(&["--config", &doc_arg, "x"])?)
            .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(from_file.directory, temp.path().join("from-file"));
        assert_eq!(from_file.overwrite, OverwritePolicy::Fail);

        let overridden = resolve_config(&parse(&[
            "--config",
            &doc_arg,
            "--directory",
            "/srv/elsewhere",
            "--overwrite",
            "replace",
            "x",
        ])?)
        .map_err(|err| anyhow!(err.display_message()))?;
        assert_eq!(overridden.directory, PathBuf::from("/srv/elsewhere"));
        assert_eq!(overridden.overwrite, OverwritePolicy::Replace);
        assert_eq!(overridden.on_record_error, OnRecordError::Discard);
        Ok(())
    }

    #[test]
    fn rewrites_inputs_and_prints_json_lines() -> anyhow::Result<()> {
        let input_dir = temp_dir("cli-in")?;
        let output_dir = temp_dir("cli-out")?;
        let input = write_input(input_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;
        let cli = parse(&[
            "--directory",
            &output_dir.path().to_string_lossy(),
            "--metrics",
            &input.to_string_lossy(),
        ])?;

        let mut out: Vec<u8> = Vec::new();
        let mut err_out: Vec<u8> = Vec::new();
        execute(&cli, &mut out, &mut err_out).map_err(|err| anyhow!(err.display_message()))?;

        let stdout = String::from_utf8(out)?;
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 1);
        let record: Value = serde_json::from_str(lines[0])?;
        assert_eq!(record["fields"]["fileInfo"]["filename"], SAMPLE_FILENAME);
        assert_eq!(
            fs::read_to_string(output_dir.path().join(SAMPLE_FILENAME))?,
            SAMPLE_ROT13
        );
        assert!(String::from_utf8(err_out)?.contains("stage_records_total"));
        Ok(())
    }

    #[test]
    fn failed_records_exit_with_dedicated_code() -> anyhow::Result<()> {
        let input_dir = temp_dir("cli-in")?;
        let output_dir = temp_dir("cli-out")?;
        let input = write_input(input_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;
        write_input(output_dir.path(), SAMPLE_FILENAME, b"already here")?;
        let cli = parse(&[
            "--directory",
            &output_dir.path().to_string_lossy(),
            "--overwrite",
            "fail",
            &input.to_string_lossy(),
        ])?;

        let mut out: Vec<u8> = Vec::new();
        let mut err_out: Vec<u8> = Vec::new();
        let Err(err) = execute(&cli, &mut out, &mut err_out) else {
            panic!("expected record failure");
        };
        assert_eq!(err.exit_code(), 4);
        assert!(out.is_empty());
        assert!(String::from_utf8(err_out)?.contains(SAMPLE_FILENAME));
        Ok(())
    }

    #[test]
    fn inputs_inside_the_output_directory_are_not_truncated() -> anyhow::Result<()> {
        let output_dir = temp_dir("cli-out")?;
        let input = write_input(output_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;
        let cli = parse(&[
            "--directory",
            &output_dir.path().to_string_lossy(),
            &input.to_string_lossy(),
        ])?;

        let mut out: Vec<u8> = Vec::new();
        let mut err_out: Vec<u8> = Vec::new();
        let Err(err) = execute(&cli, &mut out, &mut err_out) else {
            panic!("expected the in-place record to fail");
        };
        assert_eq!(err.exit_code(), 4);
        assert!(out.is_empty());
        assert!(String::from_utf8(err_out)?.contains("destination is the source file"));
        assert_eq!(fs::read_to_string(&input)?, SAMPLE_TEXT);
        Ok(())
    }

    #[test]
    fn unusable_inputs_and_directories_are_validation_errors() -> anyhow::Result<()> {
        let temp = temp_dir("cli-validate")?;
        let input = write_input(temp.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;
        let blocker = write_input(temp.path(), "blocker", b"file")?;

        let missing_input = parse(&[
            "--directory",
            &temp.path().join("out").to_string_lossy(),
            &temp.path().join("absent").to_string_lossy(),
        ])?;
        let Err(err) = execute(&missing_input, &mut Vec::<u8>::new(), &mut Vec::<u8>::new()) else {
            panic!("expected missing input to fail");
        };
        assert_eq!(err.exit_code(), 2);

        let bad_directory = parse(&[
            "--directory",
            &blocker.join("out").to_string_lossy(),
            &input.to_string_lossy(),
        ])?;
        let Err(err) = execute(&bad_directory, &mut Vec::<u8>::new(), &mut Vec::<u8>::new()) else {
            panic!("expected directory validation to fail");
        };
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("ROT13_"));
        Ok(())
    }
}
