use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use wholefile_config::StageConfig;
use wholefile_events::EventBus;
use wholefile_stage::{
    FileRefExt, GenericValue, InputStream, LocalFileRef, MetadataProjector, ProcessState, Record,
    StageError, StageRunner,
};
use wholefile_telemetry::Metrics;
use wholefile_test_support::fixtures::{
    SAMPLE_FILENAME, SAMPLE_ROT13, SAMPLE_TEXT, temp_dir, write_input,
};

fn local_record(path: &std::path::Path) -> anyhow::Result<Record> {
    let file_ref = LocalFileRef::from_path(path)?;
    let file_info = MetadataProjector::default().project(path)?;
    Ok(Record::whole_file(Arc::new(file_ref), file_info))
}

fn read_all(record: &Record) -> anyhow::Result<String> {
    let mut contents = String::new();
    record
        .file_ref()?
        .open::<InputStream>()?
        .read_to_string(&mut contents)?;
    Ok(contents)
}

#[test]
fn single_record_is_rewritten_under_the_output_directory() -> anyhow::Result<()> {
    let input_dir = temp_dir("e2e-in")?;
    let output_dir = temp_dir("e2e-out")?;
    let input_path = write_input(input_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;

    let events = EventBus::new();
    let mut runner = StageRunner::new(
        StageConfig::new(output_dir.path())?,
        events.clone(),
        Metrics::new()?,
    );
    runner.init()?;

    let batch = runner.process_batch(vec![local_record(&input_path)?])?;
    assert!(batch.errors.is_empty());
    assert_eq!(batch.output.len(), 1);
    let record = &batch.output[0];

    let contents = read_all(record)?;
    assert_eq!(contents, SAMPLE_ROT13);
    assert_eq!(contents.len(), SAMPLE_TEXT.len());
    assert_eq!(record.filename()?, SAMPLE_FILENAME);

    let file = record
        .value_at("/fileInfo/file")
        .and_then(GenericValue::as_str)
        .map(PathBuf::from)
        .unwrap_or_default();
    assert_eq!(file.parent(), Some(output_dir.path()));
    assert_eq!(
        record.value_at("/fileInfo/size"),
        Some(&GenericValue::Long(i64::try_from(SAMPLE_TEXT.len())?))
    );
    assert_eq!(fs::read_to_string(&input_path)?, SAMPLE_TEXT);

    runner.destroy();
    let kinds: Vec<_> = events
        .backlog()
        .iter()
        .map(|envelope| envelope.event.kind())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "stage_initialised",
            "record_started",
            "record_emitted",
            "stage_destroyed"
        ]
    );
    Ok(())
}

#[test]
fn running_the_output_through_again_restores_the_input() -> anyhow::Result<()> {
    let input_dir = temp_dir("e2e-in")?;
    let first_dir = temp_dir("e2e-first")?;
    let second_dir = temp_dir("e2e-second")?;
    let input_path = write_input(input_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;

    let mut first = StageRunner::new(
        StageConfig::new(first_dir.path())?,
        EventBus::new(),
        Metrics::new()?,
    );
    let mut second = StageRunner::new(
        StageConfig::new(second_dir.path())?,
        EventBus::new(),
        Metrics::new()?,
    );
    first.init()?;
    second.init()?;

    let once = first.process_batch(vec![local_record(&input_path)?])?.output;
    let twice = second.process_batch(once)?.output;
    assert_eq!(twice.len(), 1);
    assert_eq!(read_all(&twice[0])?, SAMPLE_TEXT);
    assert_eq!(second.metrics().snapshot().records_emitted, 1);
    Ok(())
}

#[test]
fn reprocessing_replaces_the_previous_output() -> anyhow::Result<()> {
    let input_dir = temp_dir("e2e-in")?;
    let output_dir = temp_dir("e2e-out")?;
    let mut runner = StageRunner::new(
        StageConfig::new(output_dir.path())?,
        EventBus::new(),
        Metrics::new()?,
    );
    runner.init()?;

    let long = write_input(input_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;
    runner.process_batch(vec![local_record(&long)?])?;
    let short = write_input(input_dir.path(), SAMPLE_FILENAME, b"abc")?;
    let batch = runner.process_batch(vec![local_record(&short)?])?;

    assert_eq!(read_all(&batch.output[0])?, "nop");
    assert_eq!(
        fs::read(output_dir.path().join(SAMPLE_FILENAME))?,
        b"nop".to_vec()
    );
    Ok(())
}

#[test]
fn inputs_inside_the_output_directory_are_left_untouched() -> anyhow::Result<()> {
    let output_dir = temp_dir("e2e-out")?;
    let input_path = write_input(output_dir.path(), SAMPLE_FILENAME, SAMPLE_TEXT.as_bytes())?;

    let events = EventBus::new();
    let mut runner = StageRunner::new(
        StageConfig::new(output_dir.path())?,
        events.clone(),
        Metrics::new()?,
    );
    runner.init()?;

    let batch = runner.process_batch(vec![local_record(&input_path)?])?;
    assert!(batch.output.is_empty());
    assert_eq!(batch.errors.len(), 1);
    let failure = &batch.errors[0];
    assert_eq!(failure.state, ProcessState::Extracted);
    assert!(matches!(
        failure.source,
        StageError::DestinationIsSource { ref path } if *path == input_path
    ));
    assert_eq!(read_all(&failure.record)?, SAMPLE_TEXT);
    assert_eq!(fs::read_to_string(&input_path)?, SAMPLE_TEXT);
    assert_eq!(runner.metrics().snapshot().bytes_transformed, 0);
    assert!(
        events
            .backlog()
            .iter()
            .any(|envelope| envelope.event.kind() == "record_failed")
    );
    Ok(())
}
