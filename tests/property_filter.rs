// Property-based tests for merge ordering and filter composition.
// CI: 128 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashSet;

use chrono::NaiveDate;
use proptest::prelude::*;

use opportunity_explorer::data::filter::Constraint;
use opportunity_explorer::{
    merge, query, BatchSource, Dataset, DeadlineWindow, Dimension, FilterSpec, FilteredView,
    MergeOptions, QueryContext, Range, RecordId,
};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(128),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

fn ctx() -> QueryContext {
    QueryContext::at(
        NaiveDate::from_ymd_opt(2026, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    )
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const COUNTRIES: &[&str] = &["Germany", "France", "Japan"];
const TYPES: &[&str] = &["Fellowship", "Grant"];

#[derive(Debug, Clone)]
struct Row {
    country: Option<&'static str>,
    kind: Option<&'static str>,
    funding: Option<u32>,
    months: Option<u16>,
    deadline: Option<(i32, u32, u32)>,
}

fn arb_row() -> impl Strategy<Value = Row> {
    (
        prop::option::of(prop::sample::select(COUNTRIES)),
        prop::option::of(prop::sample::select(TYPES)),
        prop::option::of(0u32..50_000),
        prop::option::of(0u16..60),
        prop::option::of((2025i32..=2027, 1u32..=12, 1u32..=28)),
    )
        .prop_map(|(country, kind, funding, months, deadline)| Row {
            country,
            kind,
            funding,
            months,
            deadline,
        })
}

fn arb_range(max: u32) -> impl Strategy<Value = Range> {
    (0..max, 0..max).prop_map(|(a, b)| Range::new(a.min(b) as f64, a.max(b) as f64))
}

fn arb_spec() -> impl Strategy<Value = FilterSpec> {
    (
        prop::option::of(prop::sample::select(COUNTRIES)),
        prop::option::of(prop::sample::select(TYPES)),
        prop::option::of(arb_range(50_000)),
        prop::option::of(arb_range(60)),
        prop::sample::select(vec![
            DeadlineWindow::All,
            DeadlineWindow::Upcoming,
            DeadlineWindow::Past,
            DeadlineWindow::Unknown,
        ]),
    )
        .prop_map(|(country, kind, funding, duration, deadline)| {
            let mut spec = FilterSpec::new().with_deadline(deadline);
            if let Some(c) = country {
                spec = spec.with_category(Dimension::Country, c);
            }
            if let Some(k) = kind {
                spec = spec.with_category(Dimension::OpportunityType, k);
            }
            spec.funding = funding;
            spec.duration = duration;
            spec
        })
}

fn csv_text(rows: &[Row]) -> String {
    let mut out = String::from(
        "opportunity_id,country,opportunity_type,funding_amount_avg,duration,deadline_primary\n",
    );
    for (i, r) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            i + 1,
            r.country.unwrap_or(""),
            r.kind.unwrap_or(""),
            r.funding.map(|f| f.to_string()).unwrap_or_default(),
            r.months.map(|m| format!("{m} months")).unwrap_or_default(),
            r.deadline
                .map(|(y, m, d)| format!("{y:04}-{m:02}-{d:02}"))
                .unwrap_or_default(),
        ));
    }
    out
}

fn dataset(rows: &[Row]) -> Dataset {
    merge(&[BatchSource::inline("generated", csv_text(rows))], &MergeOptions::default())
        .unwrap()
        .0
}

/// Disjoint ids split into 1..=4 batches.
fn arb_batches() -> impl Strategy<Value = Vec<Vec<u32>>> {
    (prop::collection::hash_set(1u32..10_000, 1..60), 1usize..=4).prop_flat_map(|(ids, k)| {
        let ids: Vec<u32> = ids.into_iter().collect();
        Just(ids).prop_shuffle().prop_map(move |ids| {
            let size = ids.len().div_ceil(k);
            ids.chunks(size).map(<[u32]>::to_vec).collect()
        })
    })
}

fn batch_sources(batches: &[Vec<u32>]) -> Vec<BatchSource> {
    batches
        .iter()
        .enumerate()
        .map(|(i, ids)| {
            let mut text = String::from("opportunity_id,program_name\n");
            for id in ids {
                text.push_str(&format!("{id},Program {id}\n"));
            }
            BatchSource::inline(format!("batch{}", i + 1), text)
        })
        .collect()
}

fn rows_of(ds: &Dataset) -> Vec<(Option<RecordId>, Option<String>)> {
    ds.records()
        .iter()
        .map(|r| (r.id.clone(), r.get("program_name").map(str::to_string)))
        .collect()
}

// ---------------------------------------------------------------------------
// Merge properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn merge_order_does_not_change_canonical_rows(batches in arb_batches()) {
        let forward = batch_sources(&batches);
        let mut reversed = forward.clone();
        reversed.reverse();

        let (a, _) = merge(&forward, &MergeOptions::default()).unwrap();
        let (b, _) = merge(&reversed, &MergeOptions::default()).unwrap();
        prop_assert_eq!(rows_of(&a), rows_of(&b));

        let ids: Vec<_> = a.records().iter().filter_map(|r| r.id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        prop_assert_eq!(ids, sorted);
    }

    #[test]
    fn merge_of_disjoint_batches_is_lossless(batches in arb_batches()) {
        let total: usize = batches.iter().map(Vec::len).sum();
        let (ds, report) = merge(&batch_sources(&batches), &MergeOptions::default()).unwrap();
        prop_assert_eq!(ds.len(), total);
        prop_assert_eq!(report.total_rows, total);
        prop_assert!(report.duplicate_ids.is_empty());
    }
}

// ---------------------------------------------------------------------------
// Filter properties
// ---------------------------------------------------------------------------

fn arb_case() -> impl Strategy<Value = (Vec<Row>, FilterSpec, Vec<usize>)> {
    (prop::collection::vec(arb_row(), 0..40), arb_spec()).prop_flat_map(|(rows, spec)| {
        let n = spec.constraints().len();
        (
            Just(rows),
            Just(spec),
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #![proptest_config(config())]

    #[test]
    fn constraint_order_does_not_matter((rows, spec, order) in arb_case()) {
        let ds = dataset(&rows);
        let constraints: Vec<Constraint> = spec.constraints();

        let mut view = FilteredView::all(&ds);
        for i in order {
            let single = FilterSpec::from_constraints([constraints[i].clone()]);
            view = view.refine(&single, &ctx());
        }
        let direct = query(&ds, &spec, &ctx());
        prop_assert_eq!(view.indices(), direct.indices());
        prop_assert_eq!(view.active_filters(), direct.active_filters());
    }

    #[test]
    fn applying_a_spec_twice_equals_once((rows, spec, _order) in arb_case()) {
        let ds = dataset(&rows);
        let once = query(&ds, &spec, &ctx());
        let twice = once.refine(&spec, &ctx());
        prop_assert_eq!(once.indices(), twice.indices());
    }

    #[test]
    fn funding_range_never_drops_unknown_amounts(
        rows in prop::collection::vec(arb_row(), 0..40),
        range in arb_range(50_000),
    ) {
        let ds = dataset(&rows);
        let view = query(&ds, &FilterSpec::new().with_funding(range), &ctx());
        let kept: HashSet<usize> = view.indices().iter().copied().collect();
        for (i, row) in rows.iter().enumerate() {
            match row.funding {
                None => prop_assert!(kept.contains(&i)),
                Some(f) => prop_assert_eq!(kept.contains(&i), range.contains(f as f64)),
            }
        }
    }

    #[test]
    fn empty_spec_returns_full_dataset(rows in prop::collection::vec(arb_row(), 0..40)) {
        let ds = dataset(&rows);
        let view = query(&ds, &FilterSpec::new(), &ctx());
        prop_assert_eq!(view.indices(), &(0..rows.len()).collect::<Vec<_>>()[..]);
        prop_assert_eq!(view.active_filters(), 0);
    }
}
