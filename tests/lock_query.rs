use std::error::Error as _;
use std::sync::Arc;
use storebridge::{
    BackendError, DataAccessError, ExecutorConfig, Filter, LOCK_MODE, LOCK_TIMEOUT, LockMode,
    LockQuery, LockQueryAdapter, MemoryStore, Param, Projection, QueryAdapter, QueryConfig, Row,
    RowDecodeError, RowStream, Scheduler, StoreError, TryFromRow, Value, WriteAdapter,
    WriteOperation,
};

#[derive(Debug, thiserror::Error)]
#[error("backend connection lost")]
struct ConnectionLost;

#[derive(Clone, Copy)]
enum Behavior {
    Grant,
    Busy,
    Broken,
    Rejecting,
}

struct StubAdapter {
    behavior: Behavior,
}

impl QueryAdapter for StubAdapter {
    fn stream(&self, _query: &QueryConfig) -> Result<RowStream, BackendError> {
        match self.behavior {
            Behavior::Broken => Err(ConnectionLost.into()),
            Behavior::Rejecting => Err(DataAccessError::new("query timeout").into()),
            Behavior::Grant | Behavior::Busy => Ok(Box::new(
                vec![
                    Ok(Row::from_values(vec![Value::Integer(1)])),
                    Err(ConnectionLost.into()),
                ]
                .into_iter(),
            )),
        }
    }
}

impl LockQueryAdapter for StubAdapter {
    fn try_lock(&self, query: &QueryConfig) -> Result<bool, BackendError> {
        assert_eq!(query.lock_mode(), Some(&LockMode::PessimisticWrite));
        assert_eq!(query.parameter(LOCK_TIMEOUT), Some(&Param::Millis(1000)));
        match self.behavior {
            Behavior::Grant => Ok(true),
            Behavior::Busy => Ok(false),
            Behavior::Broken => Err(ConnectionLost.into()),
            Behavior::Rejecting => Err(DataAccessError::new("deadlock victim").into()),
        }
    }
}

fn query(behavior: Behavior) -> LockQuery<StubAdapter> {
    LockQuery::new(
        Arc::new(StubAdapter { behavior }),
        QueryConfig::new("orders"),
    )
}

#[test]
fn lock_timeout_parameter_follows_the_requested_timeout() {
    let base = query(Behavior::Grant);

    let unbounded = base.lock(LockMode::PessimisticWrite, -1).expect("lock");
    assert_eq!(
        unbounded.config().parameter(LOCK_MODE),
        Some(&Param::LockMode(LockMode::PessimisticWrite))
    );
    assert!(unbounded.config().parameter(LOCK_TIMEOUT).is_none());

    let bounded = base.lock(LockMode::PessimisticWrite, 500).expect("lock");
    assert_eq!(
        bounded.config().parameter(LOCK_TIMEOUT),
        Some(&Param::Millis(500))
    );

    let zero = base.lock(LockMode::PessimisticRead, 0).expect("lock");
    assert_eq!(zero.config().parameter(LOCK_TIMEOUT), Some(&Param::Millis(0)));

    assert!(base.config().parameter(LOCK_MODE).is_none());
}

#[test]
fn repeated_lock_calls_keep_the_last_mode() {
    let relocked = query(Behavior::Grant)
        .lock(LockMode::PessimisticRead, 100)
        .expect("lock")
        .lock(LockMode::PessimisticWrite, 200)
        .expect("lock");
    assert_eq!(
        relocked.lock_request(),
        Some((LockMode::PessimisticWrite, Some(200)))
    );
}

#[test]
fn blank_custom_mode_is_an_argument_failure() {
    let err = query(Behavior::Grant)
        .lock(LockMode::Custom(String::new()), 10)
        .err()
        .expect("rejected");
    assert!(matches!(err, StoreError::InvalidArgument(_)));

    let err = query(Behavior::Grant)
        .try_lock(LockMode::Custom(" ".into()), 10)
        .expect_err("rejected");
    assert!(matches!(err, StoreError::InvalidArgument(_)));
}

#[test]
fn try_lock_reports_acquired() {
    let acquired = query(Behavior::Grant)
        .try_lock(LockMode::PessimisticWrite, 1000)
        .expect("no failure");
    assert!(acquired);
}

#[test]
fn try_lock_reports_unavailable_as_false() {
    let acquired = query(Behavior::Busy)
        .try_lock(LockMode::PessimisticWrite, 1000)
        .expect("no failure");
    assert!(!acquired);
}

#[test]
fn try_lock_wraps_generic_backend_errors() {
    let err = query(Behavior::Broken)
        .try_lock(LockMode::PessimisticWrite, 1000)
        .expect_err("failure");
    let StoreError::DataAccess(data_access) = err else {
        panic!("expected data access failure");
    };
    assert_eq!(data_access.message(), "backend connection lost");
    let original = data_access.source().expect("original kept");
    assert!(original.downcast_ref::<ConnectionLost>().is_some());
}

#[test]
fn try_lock_resignals_data_access_errors_unchanged() {
    let err = query(Behavior::Rejecting)
        .try_lock(LockMode::PessimisticWrite, 1000)
        .expect_err("failure");
    let StoreError::DataAccess(data_access) = err else {
        panic!("expected data access failure");
    };
    assert_eq!(data_access.message(), "deadlock victim");
    assert!(data_access.cause().is_none());
}

#[test]
fn stream_normalizes_setup_and_element_failures() {
    let err = query(Behavior::Broken)
        .stream(Projection::all())
        .err()
        .expect("failure");
    assert!(matches!(err, StoreError::DataAccess(_)));

    let err = query(Behavior::Rejecting)
        .stream(Projection::all())
        .err()
        .expect("failure");
    match err {
        StoreError::DataAccess(e) => assert_eq!(e.message(), "query timeout"),
        other => panic!("unexpected error: {other:?}"),
    }

    let mut rows = query(Behavior::Grant)
        .stream(Projection::all())
        .expect("stream");
    assert_eq!(
        rows.next().expect("first").expect("row"),
        Row::from_values(vec![Value::Integer(1)])
    );
    assert!(matches!(rows.next(), Some(Err(StoreError::DataAccess(_)))));
    assert!(rows.next().is_none());
}

#[derive(Debug, PartialEq)]
struct Seat {
    id: i64,
    holder: String,
}

impl TryFromRow for Seat {
    fn try_from_row(row: Row) -> Result<Self, RowDecodeError> {
        Ok(Self {
            id: storebridge::types::i64_at(&row, 0, "id")?,
            holder: storebridge::types::text_at(&row, 1, "holder")?.to_string(),
        })
    }
}

fn seats() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .create_table("seats", &["id", "holder", "row"], Some("id"))
        .expect("table");
    store
        .execute_write(&WriteOperation::insert(
            "seats",
            vec![
                Row::from_values(vec![Value::Null, Value::from("ada"), Value::from("A")]),
                Row::from_values(vec![Value::Null, Value::from("bob"), Value::from("A")]),
                Row::from_values(vec![Value::Null, Value::from("cy"), Value::from("B")]),
            ],
        ))
        .expect("seed");
    store
}

#[test]
fn memory_backend_locks_are_exclusive_between_queries() {
    let store = seats();
    let first = LockQuery::new(Arc::clone(&store), QueryConfig::new("seats"));
    let second = first.clone();

    assert!(first.try_lock(LockMode::PessimisticWrite, -1).expect("lock"));
    assert!(!second.try_lock(LockMode::PessimisticWrite, 0).expect("lock"));
    assert!(!second.try_lock(LockMode::PessimisticRead, 20).expect("lock"));
    assert!(store.unlock("seats", &LockMode::PessimisticWrite));
    assert!(second.try_lock(LockMode::PessimisticRead, 0).expect("lock"));
}

#[test]
fn stream_after_lock_does_not_acquire() {
    let store = seats();
    let locked = LockQuery::new(Arc::clone(&store), QueryConfig::new("seats"))
        .lock(LockMode::PessimisticWrite, 1000)
        .expect("lock");
    let rows = locked.fetch(Projection::all()).expect("rows");
    assert_eq!(rows.len(), 3);
    assert!(!store.is_locked("seats"));
}

#[test]
fn typed_stream_decodes_projected_rows() {
    let store = seats();
    let query = LockQuery::new(
        store,
        QueryConfig::new("seats").with_filter(Filter::eq("row", "A")),
    );
    let seats: Vec<Seat> = query
        .stream_as::<Seat>(Projection::columns(["id", "holder"]))
        .expect("stream")
        .collect::<Result<_, _>>()
        .expect("decode");
    assert_eq!(
        seats,
        vec![
            Seat {
                id: 1,
                holder: "ada".into()
            },
            Seat {
                id: 2,
                holder: "bob".into()
            }
        ]
    );

    let mismatched = query
        .stream_as::<Seat>(Projection::columns(["holder", "id"]))
        .expect("stream")
        .next()
        .expect("row");
    assert!(matches!(mismatched, Err(StoreError::Decode(_))));
}

#[test]
fn async_stream_runs_on_the_scheduler() {
    let scheduler = Scheduler::new(&ExecutorConfig::development()).expect("scheduler");
    let query = LockQuery::new(seats(), QueryConfig::new("seats").with_limit(2));
    let rows = scheduler
        .to_blocking(query.stream_async(&scheduler, Projection::columns(["holder"])))
        .expect("blocking")
        .get()
        .expect("rows");
    assert_eq!(
        rows,
        vec![
            Row::from_values(vec![Value::from("ada")]),
            Row::from_values(vec![Value::from("bob")])
        ]
    );

    let missing = LockQuery::new(seats(), QueryConfig::new("tickets"));
    let err = scheduler
        .to_blocking(missing.stream_async(&scheduler, Projection::all()))
        .expect("blocking")
        .get()
        .expect_err("unknown target");
    assert!(err.execution_cause().is_some());
}
