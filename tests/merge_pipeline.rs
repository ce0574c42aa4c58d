// End-to-end: batch files on disk → merge → export → query.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use opportunity_explorer::data::export::{export_dataset, export_view};
use opportunity_explorer::data::model::NumericField;
use opportunity_explorer::data::report::{render_summary, BatchOutcome};
use opportunity_explorer::data::stats::{choices, summarize};
use opportunity_explorer::{
    merge, query, BatchSource, Dimension, DuplicatePolicy, ExplorerError, FilterSpec,
    MergeOptions, QueryContext, Range, RecordId,
};

const HEADER: &str = "opportunity_id,program_name,country,opportunity_type,funding_amount_avg\n";

fn write(dir: &Path, name: &str, body: &str) -> BatchSource {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    BatchSource::File(path)
}

fn ctx() -> QueryContext {
    QueryContext::at(
        NaiveDate::from_ymd_opt(2026, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    )
}

fn three_batches(dir: &Path) -> Vec<BatchSource> {
    vec![
        write(
            dir,
            "batch1.csv",
            &format!("{HEADER}1,Alpha,Germany,Fellowship,5000\n2,Beta,France,Grant,\n"),
        ),
        write(
            dir,
            "batch2.csv",
            &format!("{HEADER}3,Gamma,Japan,Grant,25000\n4,Delta,Germany,Fellowship,10000\n"),
        ),
        write(
            dir,
            "batch3.csv",
            &format!("{HEADER}2,Beta again,France,Grant,12000\n5,Epsilon,,Scholarship,\n"),
        ),
    ]
}

#[test]
fn three_batches_with_a_repeated_id() {
    let dir = tempfile::tempdir().unwrap();
    let (ds, report) = merge(&three_batches(dir.path()), &MergeOptions::default()).unwrap();

    let ids: Vec<RecordId> = ds.records().iter().filter_map(|r| r.id.clone()).collect();
    let expected: Vec<RecordId> = [1, 2, 2, 3, 4, 5].into_iter().map(RecordId::Integer).collect();
    assert_eq!(ids, expected);
    assert_eq!(report.total_rows, 6);

    assert!(report.has_duplicates());
    assert_eq!(report.duplicate_ids.len(), 1);
    assert_eq!(report.duplicate_ids[0].id, RecordId::Integer(2));
    assert_eq!(report.duplicate_ids[0].positions, vec![1, 2]);
    // First occurrence (batch 1) comes first among the tied rows.
    assert_eq!(ds.records()[1].get("program_name"), Some("Beta"));

    let spec = FilterSpec::new().with_funding(Range::new(0.0, 10_000.0));
    assert!(!spec.is_empty());
    let view = query(&ds, &spec, &ctx());
    let names: Vec<_> = view.records().filter_map(|r| r.get("program_name")).collect();
    assert_eq!(names, vec!["Alpha", "Beta", "Delta", "Epsilon"]);
    assert_eq!(view.len(), 4);
    assert_eq!(view.active_filters(), 1);
}

#[test]
fn first_occurrence_policy_keeps_earliest_batch_row() {
    let dir = tempfile::tempdir().unwrap();
    let options = MergeOptions {
        duplicate_policy: DuplicatePolicy::FirstOccurrence,
        ..MergeOptions::default()
    };
    let (ds, report) = merge(&three_batches(dir.path()), &options).unwrap();
    assert_eq!(ds.len(), 5);
    assert_eq!(report.dropped_duplicates, 1);
    assert_eq!(report.duplicate_ids.len(), 1);
    assert_eq!(ds.records()[1].get("program_name"), Some("Beta"));
}

#[test]
fn missing_and_broken_batches_do_not_abort_merge() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![
        write(dir.path(), "good.csv", &format!("{HEADER}1,Alpha,Germany,Fellowship,5000\n")),
        BatchSource::File(dir.path().join("absent.csv")),
        write(dir.path(), "empty.csv", ""),
        write(
            dir.path(),
            "ragged.csv",
            &format!("{HEADER}2,Beta,France\n3,Gamma,Japan,Grant,1,overflow\n"),
        ),
    ];
    let (ds, report) = merge(&sources, &MergeOptions::default()).unwrap();

    assert_eq!(ds.len(), 2);
    assert_eq!(report.loaded_batches(), 2);
    assert_eq!(report.batches[1].outcome, BatchOutcome::Missing);
    assert!(matches!(report.batches[2].outcome, BatchOutcome::Failed { .. }));
    match &report.batches[3].outcome {
        BatchOutcome::Loaded { rows, skipped_rows, .. } => {
            assert_eq!(*rows, 1);
            assert_eq!(*skipped_rows, 1);
        }
        other => panic!("ragged batch should load leniently, got {other:?}"),
    }

    let summary = render_summary(&ds, &report);
    assert!(summary.contains("absent.csv not found"));
    assert!(summary.contains("DATASET SUMMARY"));
}

#[test]
fn broken_quote_in_one_batch_keeps_its_neighbours() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![write(
        dir.path(),
        "quotes.csv",
        &format!("{HEADER}1,\"Alpha,Germany,Fellowship,5000\n2,Beta,France,Grant,\n3,Gamma,Japan,Grant,25000\n"),
    )];
    let (ds, report) = merge(&sources, &MergeOptions::default()).unwrap();

    assert_eq!(ds.len(), 3);
    let names: Vec<_> = ds.records().iter().filter_map(|r| r.get("program_name")).collect();
    assert_eq!(names, vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(ds.records()[0].get("country"), Some("Germany"));
    assert!(matches!(
        report.batches[0].outcome,
        BatchOutcome::Loaded { rows: 3, skipped_rows: 0, .. }
    ));
}

#[test]
fn nothing_loadable_means_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let sources = vec![
        BatchSource::File(dir.path().join("a.csv")),
        BatchSource::File(dir.path().join("b.csv")),
    ];
    let err = merge(&sources, &MergeOptions::default()).unwrap_err();
    assert!(matches!(err, ExplorerError::NoData { attempted: 2 }));
}

#[test]
fn exported_file_merges_back_to_the_same_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (ds, _) = merge(&three_batches(dir.path()), &MergeOptions::default()).unwrap();

    let out = dir.path().join("complete.csv");
    export_dataset(&out, &ds).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("\"opportunity_id\",\"program_name\""));

    let (again, report) = merge(&[BatchSource::File(out)], &MergeOptions::default()).unwrap();
    assert_eq!(again.len(), ds.len());
    assert_eq!(again.schema().columns(), ds.schema().columns());
    for (a, b) in again.records().iter().zip(ds.records()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.derived(), b.derived());
        for col in ds.schema().columns() {
            assert_eq!(a.get(col), b.get(col));
        }
    }
    assert_eq!(report.duplicate_ids.len(), 1);
}

#[test]
fn filtered_view_exports_only_matching_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (ds, _) = merge(&three_batches(dir.path()), &MergeOptions::default()).unwrap();

    let spec = FilterSpec::new().with_category(Dimension::Country, "Germany");
    let view = query(&ds, &spec, &ctx());
    let out = dir.path().join("filtered.csv");
    export_view(&out, &view).unwrap();

    let (filtered, _) = merge(&[BatchSource::File(out)], &MergeOptions::default()).unwrap();
    let names: Vec<_> = filtered.records().iter().filter_map(|r| r.get("program_name")).collect();
    assert_eq!(names, vec!["Alpha", "Delta"]);
}

#[test]
fn choices_stay_stable_while_summary_follows_filters() {
    let dir = tempfile::tempdir().unwrap();
    let (ds, _) = merge(&three_batches(dir.path()), &MergeOptions::default()).unwrap();

    let before = choices(&ds);
    let spec = FilterSpec::new().with_category(Dimension::OpportunityType, "Grant");
    let view = query(&ds, &spec, &ctx());
    assert_eq!(choices(&ds), before);

    let summary = summarize(&view, NumericField::FundingAvg);
    assert_eq!(summary.count, 3);
    assert_eq!(summary.countries, 2);
    assert_eq!(summary.opportunity_types, 1);
    assert_eq!(summary.median, Some(18_500.0));
}
