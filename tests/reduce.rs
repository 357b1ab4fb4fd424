use basalt::testing::{FIXTURE_COLUMN12_CARDINALITY, FIXTURE_U_MATCHES, fixture_segments};
use basalt::{
    AggregationSpec, BrokerResponse, DataTable, FilterPredicate, GroupBySpec, InstancePlan,
    QueryRequest, ServerInstance, Value, reduce,
};
use std::collections::HashMap;

fn grouped_request() -> QueryRequest {
    QueryRequest::new(vec![
        AggregationSpec::new("count", "*"),
        AggregationSpec::new("sum", "met_impressionCount"),
        AggregationSpec::new("max", "met_impressionCount"),
        AggregationSpec::new("min", "met_impressionCount"),
        AggregationSpec::new("avg", "met_impressionCount"),
        AggregationSpec::new("distinctCount", "column12"),
    ])
    .with_filter(FilterPredicate::Eq { column: "column11".into(), value: Value::str("U") })
    .with_group_by(GroupBySpec::new(vec!["column11".into(), "column10".into()], 15))
}

fn server(i: u16) -> ServerInstance {
    ServerInstance::new("localhost", 8000 + i)
}

fn fan_out(table: &DataTable, servers: u16) -> HashMap<ServerInstance, DataTable> {
    (0..servers).map(|i| (server(i), table.clone())).collect()
}

/// Look one group up in a rendered slot.
fn group_value(response: &BrokerResponse, slot: usize, key: &[&str]) -> f64 {
    let key: Vec<String> = key.iter().map(ToString::to_string).collect();
    response.aggregation_results[slot]
        .groups
        .iter()
        .find(|entry| entry.group == key)
        .unwrap_or_else(|| panic!("group {key:?} missing from slot {slot}"))
        .value
}

#[test]
fn ten_identical_servers_scale_sums_but_not_extrema() -> anyhow::Result<()> {
    let request = grouped_request();
    let table = InstancePlan::new(fixture_segments(1), request.clone()).execute()?;

    let one = reduce::reduce(&request, &fan_out(&table, 1))?;
    let ten = reduce::reduce(&request, &fan_out(&table, 10))?;

    assert_eq!(ten.num_docs_scanned, 10 * FIXTURE_U_MATCHES);
    assert_eq!(ten.aggregation_results.len(), 6);

    for key in [["U", "u1"], ["U", "u2"], ["U", "u3"]] {
        // Sum-type aggregations scale with the duplicate fan-out…
        assert_eq!(group_value(&ten, 0, &key), 10.0 * group_value(&one, 0, &key));
        assert_eq!(group_value(&ten, 1, &key), 10.0 * group_value(&one, 1, &key));
        // …extrema and averages are unchanged…
        assert_eq!(group_value(&ten, 2, &key), group_value(&one, 2, &key));
        assert_eq!(group_value(&ten, 3, &key), group_value(&one, 3, &key));
        assert_eq!(group_value(&ten, 4, &key), group_value(&one, 4, &key));
        // …and identical distinct sets merge idempotently.
        assert_eq!(group_value(&ten, 5, &key), group_value(&one, 5, &key));
    }
    Ok(())
}

#[test]
fn scalar_reduction_without_group_by() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![
        AggregationSpec::new("count", "*"),
        AggregationSpec::new("avg", "met_impressionCount"),
        AggregationSpec::new("distinctCount", "column12"),
    ]);
    let table = InstancePlan::new(fixture_segments(1), request.clone()).execute()?;

    let one = reduce::reduce(&request, &fan_out(&table, 1))?;
    let ten = reduce::reduce(&request, &fan_out(&table, 10))?;

    let value = |r: &BrokerResponse, slot: usize| r.aggregation_results[slot].value.unwrap();
    assert_eq!(value(&ten, 0), 10.0 * value(&one, 0)); // count scales
    assert_eq!(value(&ten, 1), value(&one, 1)); // avg does not
    assert_eq!(value(&ten, 2), FIXTURE_COLUMN12_CARDINALITY as f64); // distinct dedups
    for result in &ten.aggregation_results {
        assert!(result.groups.is_empty());
        assert!(result.group_by_columns.is_empty());
    }
    Ok(())
}

#[test]
fn no_server_responses_still_render_every_slot() -> anyhow::Result<()> {
    let request = grouped_request();
    let response = reduce::reduce(&request, &HashMap::new())?;

    assert_eq!(response.num_docs_scanned, 0);
    assert_eq!(response.aggregation_results.len(), 6);
    assert_eq!(response.aggregation_results[0].function, "count_star");
    for result in &response.aggregation_results {
        assert!(result.groups.is_empty());
    }
    Ok(())
}

#[test]
fn malformed_server_response_is_dropped_not_fatal() -> anyhow::Result<()> {
    let request = grouped_request();
    let good = InstancePlan::new(fixture_segments(1), request.clone()).execute()?;

    // A table answering a different query: wrong slot count.
    let foreign_request = QueryRequest::new(vec![AggregationSpec::new("count", "*")])
        .with_group_by(GroupBySpec::new(vec!["column11".into()], 5));
    let foreign = InstancePlan::new(fixture_segments(1), foreign_request).execute()?;

    let mut responses = HashMap::new();
    responses.insert(server(0), good.clone());
    responses.insert(server(1), foreign);
    responses.insert(server(2), good.clone());

    let response = reduce::reduce(&request, &responses)?;
    // Only the two well-formed servers contribute.
    assert_eq!(response.num_docs_scanned, 2 * FIXTURE_U_MATCHES);
    assert_eq!(response.aggregation_results.len(), 6);
    Ok(())
}

#[test]
fn grouped_results_are_sorted_descending_and_truncated() -> anyhow::Result<()> {
    let request = QueryRequest::new(vec![AggregationSpec::new("count", "*")])
        .with_group_by(GroupBySpec::new(vec!["column11".into(), "column10".into()], 15));
    let table = InstancePlan::new(fixture_segments(3), request.clone()).execute()?;
    let response = reduce::reduce(&request, &fan_out(&table, 2))?;

    let groups = &response.aggregation_results[0].groups;
    assert_eq!(groups.len(), 15);
    for pair in groups.windows(2) {
        assert!(pair[0].value >= pair[1].value);
    }
    // 3 segments × 2 servers on top of the fixture's 1450-count top group.
    assert_eq!(groups[0].group, vec!["i".to_string(), String::new()]);
    assert_eq!(groups[0].value, 1450.0 * 6.0);
    Ok(())
}

#[test]
fn json_rendering_is_request_ordered() -> anyhow::Result<()> {
    let request = grouped_request();
    let table = InstancePlan::new(fixture_segments(1), request.clone()).execute()?;
    let response = reduce::reduce(&request, &fan_out(&table, 1))?;

    let json = response.to_json();
    let results = json["aggregation_results"].as_array().unwrap();
    assert_eq!(results.len(), 6);
    assert_eq!(results[0]["function"], "count_star");
    assert_eq!(results[1]["function"], "sum_met_impressionCount");
    assert_eq!(results[5]["function"], "distinctCount_column12");
    assert_eq!(json["num_docs_scanned"], 582);
    Ok(())
}
