use basalt::{
    AggResult, AggState, AggregationSpec, FilterPredicate, GroupBySpec, GroupKey, QueryRequest,
    Segment, SegmentPlan, Value,
};
use basalt::testing::SegmentBuilder;
use std::collections::HashMap;
use std::sync::Arc;

fn sales_segment() -> Arc<dyn Segment> {
    // (region, product, amount)
    let rows = [
        ("eu", "a", 10),
        ("eu", "a", 20),
        ("eu", "b", 5),
        ("us", "a", 7),
        ("us", "b", 30),
        ("us", "b", 1),
        ("eu", "a", 2),
    ];
    SegmentBuilder::new("sales")
        .column("region", rows.iter().map(|(r, _, _)| Value::str(*r)).collect())
        .column("product", rows.iter().map(|(_, p, _)| Value::str(*p)).collect())
        .column("amount", rows.iter().map(|(_, _, a)| Value::Long(*a)).collect())
        .build()
}

fn key(parts: &[&str]) -> GroupKey {
    GroupKey(parts.iter().map(|p| Value::str(*p)).collect())
}

fn grouped(result: &AggResult) -> &HashMap<GroupKey, AggState> {
    match result {
        AggResult::Grouped(groups) => groups,
        AggResult::Scalar(_) => panic!("expected a grouped result"),
    }
}

#[test]
fn grouped_count_and_sum_per_key_tuple() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![
        AggregationSpec::new("count", "*"),
        AggregationSpec::new("sum", "amount"),
    ])
    .with_group_by(GroupBySpec::new(vec!["region".into(), "product".into()], 10));
    let block = SegmentPlan::new(sales_segment(), Arc::new(request)).run()?;

    assert_eq!(block.results.len(), 2);
    let counts = grouped(&block.results[0]);
    assert_eq!(counts.len(), 4);
    assert_eq!(counts[&key(&["eu", "a"])].finalize(), 3.0);
    assert_eq!(counts[&key(&["eu", "b"])].finalize(), 1.0);
    assert_eq!(counts[&key(&["us", "a"])].finalize(), 1.0);
    assert_eq!(counts[&key(&["us", "b"])].finalize(), 2.0);

    let sums = grouped(&block.results[1]);
    assert_eq!(sums[&key(&["eu", "a"])].finalize(), 32.0);
    assert_eq!(sums[&key(&["us", "b"])].finalize(), 31.0);
    Ok(())
}

#[test]
fn group_key_order_follows_group_by_columns() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![AggregationSpec::new("count", "*")])
        .with_group_by(GroupBySpec::new(vec!["product".into(), "region".into()], 10));
    let block = SegmentPlan::new(sales_segment(), Arc::new(request)).run()?;
    let counts = grouped(&block.results[0]);
    // Same buckets, reversed tuple order.
    assert_eq!(counts[&key(&["a", "eu"])].finalize(), 3.0);
    assert_eq!(counts[&key(&["b", "us"])].finalize(), 2.0);
    Ok(())
}

#[test]
fn grouped_avg_and_extrema() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![
        AggregationSpec::new("avg", "amount"),
        AggregationSpec::new("min", "amount"),
        AggregationSpec::new("max", "amount"),
    ])
    .with_group_by(GroupBySpec::new(vec!["region".into()], 10));
    let block = SegmentPlan::new(sales_segment(), Arc::new(request)).run()?;

    let avgs = grouped(&block.results[0]);
    // eu amounts: 10, 20, 5, 2 → avg 9.25
    assert_eq!(avgs[&key(&["eu"])].finalize(), 9.25);
    let mins = grouped(&block.results[1]);
    assert_eq!(mins[&key(&["us"])].finalize(), 1.0);
    let maxs = grouped(&block.results[2]);
    assert_eq!(maxs[&key(&["us"])].finalize(), 30.0);
    Ok(())
}

#[test]
fn grouped_distinct_count_is_per_group() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![AggregationSpec::new("distinctCount", "product")])
        .with_group_by(GroupBySpec::new(vec!["region".into()], 10));
    let block = SegmentPlan::new(sales_segment(), Arc::new(request)).run()?;
    let distinct = grouped(&block.results[0]);
    assert_eq!(distinct[&key(&["eu"])].finalize(), 2.0);
    assert_eq!(distinct[&key(&["us"])].finalize(), 2.0);
    Ok(())
}

#[test]
fn zero_matches_yield_present_but_empty_mappings() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![
        AggregationSpec::new("count", "*"),
        AggregationSpec::new("sum", "amount"),
    ])
    .with_filter(FilterPredicate::Eq { column: "region".into(), value: Value::str("mars") })
    .with_group_by(GroupBySpec::new(vec!["region".into(), "product".into()], 10));
    let block = SegmentPlan::new(sales_segment(), Arc::new(request)).run()?;

    assert_eq!(block.results.len(), 2);
    for result in &block.results {
        assert!(grouped(result).is_empty());
    }
    assert_eq!(block.docs_scanned, 0);
    assert_eq!(block.total_docs, 7);
    Ok(())
}

#[test]
fn no_truncation_happens_at_segment_level() -> anyhow::Result<()> {
    // top_n = 1 must not trim the per-segment mapping; truncation belongs to
    // the merge stage so late-winning groups survive partial scans.
    let request = QueryRequest::new(vec![AggregationSpec::new("count", "*")])
        .with_group_by(GroupBySpec::new(vec!["region".into(), "product".into()], 1));
    let block = SegmentPlan::new(sales_segment(), Arc::new(request)).run()?;
    assert_eq!(grouped(&block.results[0]).len(), 4);
    Ok(())
}
