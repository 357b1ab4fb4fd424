use basalt::testing::{
    FIXTURE_COLUMN12_CARDINALITY, FIXTURE_TOTAL_DOCS, FIXTURE_U_MATCHES, SegmentBuilder,
    fixture_segment, fixture_segments, fixture_top_groups,
};
use basalt::{
    AggregationSpec, BrokerResponse, ColumnSource, DataTable, FilterPredicate, GroupBySpec,
    InstancePlan, QueryRequest, Segment, SegmentPlan, ServerInstance, Value, reduce,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn six_aggregations() -> Vec<AggregationSpec> {
    vec![
        AggregationSpec::new("count", "*"),
        AggregationSpec::new("sum", "met_impressionCount"),
        AggregationSpec::new("max", "met_impressionCount"),
        AggregationSpec::new("min", "met_impressionCount"),
        AggregationSpec::new("avg", "met_impressionCount"),
        AggregationSpec::new("distinctCount", "column12"),
    ]
}

fn group_by() -> GroupBySpec {
    GroupBySpec::new(vec!["column11".into(), "column10".into()], 15)
}

fn reduce_single_server(table: DataTable, request: &QueryRequest) -> anyhow::Result<BrokerResponse> {
    let mut responses = HashMap::new();
    responses.insert(ServerInstance::new("localhost", 8097), table);
    Ok(reduce::reduce(request, &responses)?)
}

#[test]
fn filtered_segment_scan_matches_582_of_10001() -> anyhow::Result<()> {
    let request = QueryRequest::new(six_aggregations())
        .with_filter(FilterPredicate::Eq { column: "column11".into(), value: Value::str("U") })
        .with_group_by(group_by());
    let segment: Arc<dyn Segment> = fixture_segment("s0");
    let block = SegmentPlan::new(segment, Arc::new(request)).run()?;

    assert_eq!(block.docs_scanned, FIXTURE_U_MATCHES);
    assert_eq!(block.total_docs, u64::from(FIXTURE_TOTAL_DOCS));
    assert_eq!(block.results.len(), 6);
    Ok(())
}

#[test]
fn inter_segment_group_by_over_20_identical_segments() -> anyhow::Result<()> {
    let segment_count = 20;
    let request = QueryRequest::new(six_aggregations()).with_group_by(group_by());
    let table = InstancePlan::new(fixture_segments(segment_count), request.clone()).execute()?;
    let response = reduce_single_server(table, &request)?;

    assert_eq!(response.num_docs_scanned, u64::from(FIXTURE_TOTAL_DOCS) * segment_count as u64);
    assert_eq!(response.aggregation_results.len(), 6);
    assert!(!response.timed_out);

    let names: Vec<&str> =
        response.aggregation_results.iter().map(|r| r.function.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "count_star",
            "sum_met_impressionCount",
            "max_met_impressionCount",
            "min_met_impressionCount",
            "avg_met_impressionCount",
            "distinctCount_column12",
        ]
    );
    for result in &response.aggregation_results {
        assert_eq!(result.group_by_columns, vec!["column11".to_string(), "column10".to_string()]);
        assert_eq!(result.groups.len(), 15);
        assert_eq!(result.value, None);
    }

    // Count values are strictly ordered in the fixture, so both the group
    // order and the values are fully determined: each count scales with the
    // segment fan-out.
    let counts = &response.aggregation_results[0];
    for (entry, (c11, c10, count)) in counts.groups.iter().zip(fixture_top_groups()) {
        assert_eq!(entry.group, vec![c11.to_string(), c10.to_string()]);
        assert_eq!(entry.value, (count * segment_count as u64) as f64);
    }
    Ok(())
}

#[test]
fn grouped_sums_match_a_brute_force_scan() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![AggregationSpec::new("sum", "met_impressionCount")])
        .with_filter(FilterPredicate::Eq { column: "column11".into(), value: Value::str("U") })
        .with_group_by(group_by());
    let table = InstancePlan::new(fixture_segments(1), request.clone()).execute()?;
    let response = reduce_single_server(table, &request)?;

    // Recompute the expectation straight off the column sources.
    let segment = fixture_segment("truth");
    let c11 = segment.column_source("column11")?;
    let c10 = segment.column_source("column10")?;
    let met = segment.column_source("met_impressionCount")?;
    let mut expected: HashMap<(String, String), f64> = HashMap::new();
    for doc_id in 0..FIXTURE_TOTAL_DOCS {
        if c11.value_at(doc_id) != Value::str("U") {
            continue;
        }
        let key = (c11.value_at(doc_id).to_string(), c10.value_at(doc_id).to_string());
        let v = match met.value_at(doc_id) {
            Value::Long(v) => v as f64,
            other => panic!("unexpected metric value {other:?}"),
        };
        *expected.entry(key).or_insert(0.0) += v;
    }

    let sums = &response.aggregation_results[0];
    assert_eq!(sums.groups.len(), expected.len());
    for entry in &sums.groups {
        let key = (entry.group[0].clone(), entry.group[1].clone());
        assert_eq!(entry.value, expected[&key], "group {key:?}");
    }
    Ok(())
}

#[test]
fn empty_filter_over_20_segments_yields_empty_grouped_results() -> anyhow::Result<()> {
    let request = QueryRequest::new(six_aggregations())
        .with_filter(FilterPredicate::Eq { column: "column11".into(), value: Value::str("uuuu") })
        .with_group_by(group_by());
    let table = InstancePlan::new(fixture_segments(20), request.clone()).execute()?;
    let response = reduce_single_server(table, &request)?;

    assert_eq!(response.num_docs_scanned, 0);
    assert_eq!(response.total_docs, u64::from(FIXTURE_TOTAL_DOCS) * 20);
    assert_eq!(response.aggregation_results.len(), 6);
    assert_eq!(response.aggregation_results[0].function, "count_star");
    assert_eq!(response.aggregation_results[5].function, "distinctCount_column12");
    for result in &response.aggregation_results {
        assert_eq!(result.group_by_columns, vec!["column11".to_string(), "column10".to_string()]);
        assert!(result.groups.is_empty());
    }
    Ok(())
}

#[test]
fn distinct_count_over_identical_segments_is_idempotent() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![AggregationSpec::new("distinctCount", "column12")]);
    let table = InstancePlan::new(fixture_segments(5), request.clone()).execute()?;
    let response = reduce_single_server(table, &request)?;
    // Five identical segments contribute the same value set five times.
    assert_eq!(
        response.aggregation_results[0].value,
        Some(FIXTURE_COLUMN12_CARDINALITY as f64)
    );
    Ok(())
}

/// A segment whose metadata call stalls, standing in for a slow scan.
struct SlowSegment {
    inner: Arc<basalt::testing::MemSegment>,
    delay: Duration,
}

impl Segment for SlowSegment {
    fn name(&self) -> &str {
        "slow"
    }

    fn total_docs(&self) -> u32 {
        std::thread::sleep(self.delay);
        self.inner.total_docs()
    }

    fn column_source(&self, column: &str) -> basalt::Result<Arc<dyn ColumnSource>> {
        self.inner.column_source(column)
    }
}

fn tiny_segment(name: &str) -> Arc<basalt::testing::MemSegment> {
    SegmentBuilder::new(name)
        .column("k", vec![Value::str("x"), Value::str("y"), Value::str("x")])
        .column("v", vec![Value::Long(1), Value::Long(2), Value::Long(3)])
        .build()
}

#[test]
fn timeout_returns_partial_result_instead_of_losing_work() -> anyhow::Result<()> {
    let slow: Arc<dyn Segment> =
        Arc::new(SlowSegment { inner: tiny_segment("slow_inner"), delay: Duration::from_millis(2000) });
    let segments: Vec<Arc<dyn Segment>> =
        vec![tiny_segment("fast_0"), tiny_segment("fast_1"), slow];
    let request = QueryRequest::new(vec![AggregationSpec::new("count", "*")])
        .with_timeout_ms(250);

    let table = InstancePlan::new(segments, request.clone()).execute()?;
    assert!(table.timed_out);
    // Whatever completed before the deadline is still a syntactically
    // complete response: one slot, scan metadata exposing incompleteness.
    assert_eq!(table.slots.len(), 1);
    assert!(table.total_docs <= 6);

    let response = reduce_single_server(table, &request)?;
    assert!(response.timed_out);
    assert_eq!(response.aggregation_results.len(), 1);
    Ok(())
}

#[test]
fn failing_segment_is_excluded_without_failing_the_plan() -> anyhow::Result<()> {
    // The third segment lacks the aggregation target, so its task fails with
    // NotFound while its siblings contribute normally.
    let bad: Arc<dyn Segment> = SegmentBuilder::new("bad")
        .column("k", vec![Value::str("x")])
        .build();
    let segments: Vec<Arc<dyn Segment>> = vec![tiny_segment("good_0"), tiny_segment("good_1"), bad];
    let request = QueryRequest::new(vec![AggregationSpec::new("sum", "v")]);

    let table = InstancePlan::new(segments, request.clone()).execute()?;
    assert!(!table.timed_out);
    assert_eq!(table.docs_scanned, 6);
    assert_eq!(table.total_docs, 6);

    let response = reduce_single_server(table, &request)?;
    assert_eq!(response.aggregation_results[0].value, Some(12.0));
    Ok(())
}

#[test]
fn explain_renders_the_operator_tree() -> anyhow::Result<()> {
    let request = QueryRequest::new(six_aggregations())
        .with_filter(FilterPredicate::Eq { column: "column11".into(), value: Value::str("U") })
        .with_group_by(group_by());
    let plan = InstancePlan::new(fixture_segments(2), request);
    let rendered = plan.explain()?;
    assert!(rendered.contains("InstancePlan (segments: 2"));
    assert!(rendered.contains("AggregationGroupByOperator"));
    assert!(rendered.contains("ProjectionOperator"));
    assert!(rendered.contains("DocIdSetOperator"));
    assert!(rendered.contains("ScanFilterOperator"));
    Ok(())
}
