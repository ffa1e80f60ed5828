//! Property-based tests for query evaluation.
//!
//! These check that the execution strategies the engine may pick (index lookups
//! or brute-force iteration, one region or many buckets) agree with each other.

use proptest::prelude::*;
use std::sync::Arc;
use tessera_core::{ObjectValue, Value};
use tessera_query::{QueryConfig, QueryService};
use tessera_storage::RegionCache;

const STATUSES: [&str; 3] = ["active", "inactive", "pending"];

#[derive(Clone, Debug)]
struct Record {
    score: i32,
    status: usize,
}

fn records_strategy(max: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((-20i32..20, 0usize..STATUSES.len()), 0..max).prop_map(|items| {
        items
            .into_iter()
            .map(|(score, status)| Record { score, status })
            .collect()
    })
}

fn object(id: usize, record: &Record) -> ObjectValue {
    ObjectValue::new("Trade")
        .with("ID", id as i32)
        .with("score", record.score)
        .with("status", STATUSES[record.status])
}

fn local_cache(records: &[Record]) -> Arc<RegionCache> {
    let cache = Arc::new(RegionCache::new());
    let region = cache.create_region("trades").unwrap();
    for (id, record) in records.iter().enumerate() {
        region.put(id as i32, object(id, record)).unwrap();
    }
    cache
}

fn partitioned_cache(records: &[Record], buckets: usize) -> Arc<RegionCache> {
    let cache = Arc::new(RegionCache::new());
    let region = cache.create_partitioned_region("trades", buckets, None).unwrap();
    for (id, record) in records.iter().enumerate() {
        region.put(id as i32, object(id, record)).unwrap();
    }
    cache
}

/// A score stored with any numeric representation, or with a type numbers
/// cannot be ordered against.
#[derive(Clone, Debug)]
enum Score {
    Int(i32),
    Long(i64),
    Double(f64),
    Text,
    Null,
}

impl From<&Score> for Value {
    fn from(score: &Score) -> Self {
        match score {
            Score::Int(i) => Value::Int(*i),
            Score::Long(l) => Value::Long(*l),
            Score::Double(d) => Value::Double(*d),
            Score::Text => Value::from("three"),
            Score::Null => Value::Null,
        }
    }
}

fn mixed_scores_strategy(max: usize) -> impl Strategy<Value = Vec<Score>> {
    let score = prop_oneof![
        4 => (-10i32..10).prop_map(Score::Int),
        2 => (-10i64..10).prop_map(Score::Long),
        2 => (-20i32..20).prop_map(|half| Score::Double(f64::from(half) / 2.0)),
        1 => Just(Score::Text),
        1 => Just(Score::Null),
    ];
    prop::collection::vec(score, 0..max)
}

fn op_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["<", "<=", "=", ">", ">=", "<>"])
}

/// A predicate over `t`: one or two comparisons joined by AND / OR.
fn predicate_strategy() -> impl Strategy<Value = String> {
    let comparison = (
        prop::sample::select(vec!["t.score", "t.ID", "score"]),
        op_strategy(),
        -20i32..40,
    )
        .prop_map(|(path, op, constant)| format!("{} {} {}", path, op, constant));
    let status = prop::sample::select(STATUSES.to_vec())
        .prop_map(|s| format!("t.status = '{}'", s));
    let atom = prop_oneof![comparison, status];
    (
        atom.clone(),
        prop::option::of((prop::sample::select(vec!["AND", "OR"]), atom)),
    )
        .prop_map(|(first, rest)| match rest {
            Some((junction, second)) => format!("{} {} {}", first, junction, second),
            None => first,
        })
}

fn ids(results: &tessera_query::QueryResults) -> Vec<i64> {
    let mut ids: Vec<i64> = results.iter().filter_map(Value::as_i64).collect();
    ids.sort_unstable();
    ids
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: index lookups and brute-force iteration select the same rows.
    #[test]
    fn index_and_brute_force_agree(
        records in records_strategy(60),
        predicate in predicate_strategy(),
        index_score in any::<bool>(),
        index_id in any::<bool>(),
        index_status in any::<bool>(),
    ) {
        let cache = local_cache(&records);
        let indexed = QueryService::new(Arc::clone(&cache));
        if index_score {
            indexed.create_index("scoreIdx", "t.score", "/trades t").unwrap();
        }
        if index_id {
            indexed.create_index("idIdx", "t.ID", "/trades t").unwrap();
        }
        if index_status {
            indexed.create_index("statusIdx", "t.status", "/trades t").unwrap();
        }
        let brute = QueryService::new(cache)
            .with_config(QueryConfig::default().with_index_usage(false));

        let text = format!("SELECT t.ID FROM /trades t WHERE {}", predicate);
        let with_index = indexed.new_query(&text).unwrap().execute(&[]).unwrap();
        let without = brute.new_query(&text).unwrap().execute(&[]).unwrap();
        prop_assert_eq!(ids(&with_index), ids(&without));

        let count = format!("SELECT COUNT(*) FROM /trades t WHERE {}", predicate);
        let counted = indexed.new_query(&count).unwrap().execute(&[]).unwrap();
        prop_assert_eq!(counted.count_value(), Some(without.len()));
    }

    /// Property: with scores of mixed types, a comparison through the index
    /// returns the same rows, or fails with the same error, as a scan.
    #[test]
    fn mixed_type_comparisons_agree(
        scores in mixed_scores_strategy(40),
        op in op_strategy(),
        constant in -10i32..10,
        fractional in any::<bool>(),
    ) {
        let cache = Arc::new(RegionCache::new());
        let region = cache.create_region("trades").unwrap();
        for (id, score) in scores.iter().enumerate() {
            let trade = ObjectValue::new("Trade").with("ID", id as i32).with("score", Value::from(score));
            region.put(id as i32, trade).unwrap();
        }
        let indexed = QueryService::new(Arc::clone(&cache));
        indexed.create_index("scoreIdx", "t.score", "/trades t").unwrap();
        let brute = QueryService::new(cache)
            .with_config(QueryConfig::default().with_index_usage(false));

        let constant = if fractional { format!("{}.5", constant) } else { constant.to_string() };
        let text = format!("SELECT t.ID FROM /trades t WHERE t.score {} {}", op, constant);
        let with_index = indexed.new_query(&text).unwrap().execute(&[]);
        let without = brute.new_query(&text).unwrap().execute(&[]);
        match (with_index, without) {
            (Ok(a), Ok(b)) => prop_assert_eq!(ids(&a), ids(&b)),
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            (a, b) => prop_assert!(false, "{}: index {:?}, scan {:?}", text, a, b),
        }
    }

    /// Property: an ordered, limited query over N buckets matches the same query
    /// over one region holding the union of the buckets.
    #[test]
    fn bucket_merge_matches_single_region(
        records in records_strategy(60),
        buckets in 1usize..6,
        limit in 0usize..20,
        descending in any::<bool>(),
        parallel in any::<bool>(),
    ) {
        let direction = if descending { "DESC" } else { "ASC" };
        let text = format!(
            "SELECT t.score, t.ID FROM /trades t WHERE t.score > -10 ORDER BY t.score {}, t.ID LIMIT {}",
            direction, limit
        );
        let single = QueryService::new(local_cache(&records))
            .new_query(&text).unwrap().execute(&[]).unwrap();
        let merged = QueryService::new(partitioned_cache(&records, buckets))
            .with_config(QueryConfig::default().with_parallel_buckets(parallel))
            .new_query(&text).unwrap().execute(&[]).unwrap();
        prop_assert_eq!(single.as_list(), merged.as_list());

        let distinct = "SELECT DISTINCT t.status FROM /trades t";
        let single = QueryService::new(local_cache(&records))
            .new_query(distinct).unwrap().execute(&[]).unwrap();
        let merged = QueryService::new(partitioned_cache(&records, buckets))
            .new_query(distinct).unwrap().execute(&[]).unwrap();
        prop_assert_eq!(single.as_set(), merged.as_set());
    }

    /// Property: DISTINCT results never hold structurally equal rows, and
    /// projecting them again through DISTINCT changes nothing.
    #[test]
    fn distinct_is_idempotent(records in records_strategy(80)) {
        let service = QueryService::new(local_cache(&records));
        let results = service
            .new_query("SELECT DISTINCT t.status, t.score FROM /trades t")
            .unwrap()
            .execute(&[])
            .unwrap();
        prop_assert_eq!(results.as_set().len(), results.len());

        let again = service
            .new_query(
                "SELECT DISTINCT s FROM (SELECT DISTINCT t.status, t.score FROM /trades t) s",
            )
            .unwrap()
            .execute(&[])
            .unwrap();
        prop_assert_eq!(again.as_set(), results.as_set());
    }

    /// Property: LIMIT bounds the result size.
    #[test]
    fn limit_bounds_result_size(
        records in records_strategy(60),
        limit in 0usize..30,
        ordered in any::<bool>(),
        indexed in any::<bool>(),
    ) {
        let service = QueryService::new(local_cache(&records));
        if indexed {
            service.create_index("scoreIdx", "t.score", "/trades t").unwrap();
        }
        let order = if ordered { " ORDER BY t.score" } else { "" };
        let text = format!(
            "SELECT t.ID FROM /trades t WHERE t.score >= 0{} LIMIT {}",
            order, limit
        );
        let results = service.new_query(&text).unwrap().execute(&[]).unwrap();
        prop_assert!(results.len() <= limit);
        let expected = records.iter().filter(|r| r.score >= 0).count().min(limit);
        prop_assert_eq!(results.len(), expected);
    }
}
