//! End-to-end tests through `QueryService`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tessera_core::{ObjectType, ObjectValue, Value};
use tessera_query::{
    ClassDescriptor, ContainerKind, FunctionContext, MethodAuthorizer, MethodDescriptor,
    QueryConfig, QueryError, QueryService, TypeRegistry,
};
use tessera_storage::RegionCache;

fn record(id: i32, status: &str) -> ObjectValue {
    ObjectValue::new("Portfolio").with("ID", id).with("status", status)
}

/// Region `R` with `count` records, IDs `0..count`, alternating status.
fn service_with_records(count: i32) -> QueryService {
    let cache = Arc::new(RegionCache::new());
    let region = cache.create_region("R").unwrap();
    for id in 0..count {
        let status = if id % 2 == 0 { "active" } else { "inactive" };
        region.put(id, record(id, status)).unwrap();
    }
    QueryService::new(cache)
}

fn ids(rows: &[Value]) -> Vec<i64> {
    let mut ids: Vec<i64> = rows
        .iter()
        .map(|row| row.field("ID").and_then(Value::as_i64).unwrap())
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_range_conjunction() {
    let service = service_with_records(20);
    let query = service
        .new_query("SELECT * FROM R WHERE ID > 4 AND ID < 9")
        .unwrap();
    let results = query.execute(&[]).unwrap();
    assert_eq!(ids(results.as_list()), vec![5, 6, 7, 8]);

    service.create_index("idIdx", "r.ID", "/R r").unwrap();
    let indexed = query.execute(&[]).unwrap();
    assert_eq!(ids(indexed.as_list()), vec![5, 6, 7, 8]);
}

#[test]
fn test_distinct_status() {
    let service = service_with_records(100);
    let results = service
        .new_query("SELECT DISTINCT status FROM R")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results.kind(), ContainerKind::UnorderedSet);
    let statuses = results.as_set();
    assert!(statuses.contains(&Value::from("active")));
    assert!(statuses.contains(&Value::from("inactive")));
}

#[test]
fn test_order_by_with_limit() {
    let service = service_with_records(10);
    let results = service
        .new_query("SELECT ID, status FROM R ORDER BY status, ID DESC LIMIT 3")
        .unwrap()
        .execute(&[])
        .unwrap();
    let rows: Vec<(i64, String)> = results
        .iter()
        .map(|row| {
            (
                row.field("ID").and_then(Value::as_i64).unwrap(),
                row.field("status").and_then(Value::as_str).unwrap().to_owned(),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            (8, "active".to_owned()),
            (6, "active".to_owned()),
            (4, "active".to_owned()),
        ]
    );
}

#[test]
fn test_count_with_and_without_index() {
    let service = service_with_records(30);
    let query = service
        .new_query("SELECT COUNT(*) FROM R WHERE ID > 0")
        .unwrap();
    let brute = query.execute(&[]).unwrap();
    assert_eq!(brute.count_value(), Some(29));

    service.create_index("idIdx", "r.ID", "/R r").unwrap();
    let indexed = query.execute(&[]).unwrap();
    assert_eq!(indexed.count_value(), Some(29));

    let all = service
        .new_query("SELECT COUNT(*) FROM /R")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(all.count_value(), Some(30));
}

#[test]
fn test_invalid_query_text() {
    let service = service_with_records(5);
    let err = service.new_query("INVALID QUERY").unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery { .. }));
    assert!(!err.is_retryable());
}

#[derive(Debug, Default)]
struct CountingAuthorizer {
    calls: AtomicUsize,
    allow: bool,
}

impl MethodAuthorizer for CountingAuthorizer {
    fn authorize(&self, _receiver_class: &str, _method: &MethodDescriptor) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.allow
    }
}

fn registry_with_risk() -> TypeRegistry {
    TypeRegistry::new().with_class(ClassDescriptor::new("Portfolio").method(
        "riskScore",
        Vec::<ObjectType>::new(),
        |receiver, _args| {
            let id = receiver.field("ID").and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::Long(id * 10))
        },
    ))
}

#[test]
fn test_denied_method_fails_on_first_row() {
    let authorizer = Arc::new(CountingAuthorizer::default());
    let service = service_with_records(50)
        .with_registry(registry_with_risk())
        .with_authorizer(authorizer.clone());
    let query = service
        .new_query("SELECT * FROM /R p WHERE p.riskScore() > 100")
        .unwrap();
    let err = query.execute(&[]).unwrap_err();
    assert!(matches!(err, QueryError::NotAuthorized(_)));
    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_authorization_is_cached_per_run() {
    let authorizer = Arc::new(CountingAuthorizer {
        calls: AtomicUsize::new(0),
        allow: true,
    });
    let service = service_with_records(50)
        .with_registry(registry_with_risk())
        .with_authorizer(authorizer.clone());
    let query = service
        .new_query("SELECT * FROM /R p WHERE p.riskScore() > 100")
        .unwrap();
    let results = query.execute(&[]).unwrap();
    assert_eq!(results.len(), 39);
    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 1);

    query.execute(&[]).unwrap();
    assert_eq!(authorizer.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_bind_arguments_and_struct_rows() {
    let service = service_with_records(10);
    let results = service
        .new_query("SELECT p.ID AS id, p.status FROM /R p WHERE p.ID IN SET($1, $2)")
        .unwrap()
        .execute(&[Value::Int(3), Value::Long(4)])
        .unwrap();
    assert_eq!(results.len(), 2);
    for row in results.iter() {
        let row = row.as_struct().unwrap();
        assert_eq!(row.struct_type().field_names(), ["id", "status"]);
    }
}

#[test]
fn test_entry_set_bulk_fetch() {
    let service = service_with_records(10);
    let query = service
        .new_query("SELECT e.value.ID FROM /R.entrySet e WHERE e.key IN SET(1, 3, 3, 42)")
        .unwrap();
    let results = query.execute(&[]).unwrap();
    let mut values: Vec<i64> = results.iter().filter_map(Value::as_i64).collect();
    values.sort_unstable();
    assert_eq!(values, vec![1, 3]);

    let scanned = QueryService::new(service.cache().clone())
        .with_config(QueryConfig::default().with_bulk_fetch(false))
        .new_query(query.text())
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(scanned.as_set(), results.as_set());
}

#[test]
fn test_destroyed_region_is_retryable() {
    let service = service_with_records(10);
    let query = service.new_query("SELECT * FROM /R").unwrap();
    service.cache().destroy_region("R").unwrap();
    let err = query.execute(&[]).unwrap_err();
    assert!(err.is_retryable() || matches!(err, QueryError::NameResolution(_)));
}

#[test]
fn test_element_and_non_select_queries() {
    let service = service_with_records(10);
    let single = service
        .new_query("ELEMENT(SELECT p.status FROM /R p WHERE p.ID = 3)")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(single.as_list(), vec![Value::from("inactive")]);

    let err = service
        .new_query("ELEMENT(SELECT p FROM /R p)")
        .unwrap()
        .execute(&[])
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery { .. }));
}

#[test]
fn test_result_capabilities() {
    use tessera_query::results::{Distinctness, RowOrdering, TupleShape};

    let service = service_with_records(10);
    let bag = service
        .new_query("SELECT p.status FROM /R p")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert!(!bag.is_distinct());
    assert!(!bag.is_ordered());
    assert_eq!(bag.occurrences(&Value::from("active")), 5);
    assert_eq!(bag.element_type(), ObjectType::String);

    let sorted = service
        .new_query("SELECT DISTINCT p.ID, p.status FROM /R p ORDER BY p.ID DESC")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert!(sorted.is_distinct());
    assert!(sorted.is_ordered());
    assert!(sorted.comparator().is_some());
    assert_eq!(sorted.element_type(), ObjectType::Struct);
    assert_eq!(sorted.occurrences(&sorted.as_list()[0]), 1);
}

#[test]
fn test_group_by_becomes_distinct_sorted() {
    let service = service_with_records(20);
    let results = service
        .new_query("SELECT status FROM /R p GROUP BY status")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(
        results.as_list(),
        vec![Value::from("active"), Value::from("inactive")]
    );
}

fn partitioned_service(buckets: usize, count: i32) -> QueryService {
    let cache = Arc::new(RegionCache::new());
    let region = cache.create_partitioned_region("PR", buckets, None).unwrap();
    for id in 0..count {
        let status = if id % 3 == 0 { "active" } else { "inactive" };
        region.put(id, record(id, status)).unwrap();
    }
    QueryService::new(cache)
}

#[test]
fn test_partitioned_order_and_limit() {
    let service = partitioned_service(4, 40);
    let results = service
        .new_query("SELECT p.ID FROM /PR p WHERE p.status = 'active' ORDER BY p.ID DESC LIMIT 4")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(
        results.as_list(),
        vec![Value::Int(39), Value::Int(36), Value::Int(33), Value::Int(30)]
    );

    let count = service
        .new_query("SELECT COUNT(*) FROM /PR p WHERE p.status = 'active'")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(count.count_value(), Some(14));

    let distinct = service
        .new_query("SELECT DISTINCT COUNT(*) FROM /PR p WHERE p.ID < 10")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert_eq!(distinct.count_value(), Some(10));
}

#[test]
fn test_partitioned_shape_rules() {
    let service = partitioned_service(4, 8);
    service.cache().create_region("L").unwrap();
    let unsupported = [
        "SELECT * FROM /L l, /PR p",
        "SELECT * FROM /PR p WHERE p.ID IN (SELECT q.ID FROM /PR q)",
        "SELECT * FROM /PR p, /PR q",
    ];
    for text in unsupported {
        let err = service.new_query(text).unwrap().execute(&[]).unwrap_err();
        assert!(matches!(err, QueryError::Unsupported(_)), "{}: {:?}", text, err);
    }
    let local_join = service
        .new_query("SELECT * FROM /PR p, /L l")
        .unwrap()
        .execute(&[])
        .unwrap();
    assert!(local_join.is_empty());
}

#[test]
fn test_colocated_join_in_function() {
    let cache = Arc::new(RegionCache::new());
    let orders = cache.create_partitioned_region("orders", 4, None).unwrap();
    let lines = cache
        .create_partitioned_region("lines", 4, Some("orders"))
        .unwrap();
    cache.create_partitioned_region("other", 4, None).unwrap();
    for id in 0..12 {
        orders.put(id, record(id, "open")).unwrap();
        lines.put(id, ObjectValue::new("Line").with("orderId", id)).unwrap();
    }
    let service = QueryService::new(cache);
    let query = service
        .new_query("SELECT o.ID FROM /orders o, /lines l WHERE l.orderId = o.ID")
        .unwrap();
    assert!(matches!(query.execute(&[]), Err(QueryError::Unsupported(_))));

    let everywhere = FunctionContext::new(0..4);
    let joined = query.execute_in_function(&everywhere, &[]).unwrap();
    assert_eq!(joined.len(), 12);

    let one_bucket = FunctionContext::new([1]);
    let partial = query.execute_in_function(&one_bucket, &[]).unwrap();
    assert!(partial.len() < 12);

    let not_colocated = service
        .new_query("SELECT * FROM /orders o, /other x")
        .unwrap()
        .execute_in_function(&everywhere, &[]);
    assert!(matches!(not_colocated, Err(QueryError::Unsupported(_))));
}

#[test]
fn test_traced_query() {
    let service = service_with_records(10);
    service.create_index("idIdx", "p.ID", "/R p").unwrap();
    let query = service
        .new_query("<trace> SELECT * FROM /R p WHERE p.ID < 3")
        .unwrap();
    assert!(query.compiled().is_traced());
    assert_eq!(query.text(), "SELECT * FROM /R p WHERE p.ID < 3");
    assert_eq!(ids(query.execute(&[]).unwrap().as_list()), vec![0, 1, 2]);
}
