use std::cell::RefCell;
use std::rc::Rc;
use writebehind::connection::Fault;
use writebehind::{
    Action, ActionQueue, CollectionAction, EngineError, EngineSettings, EntityAction, EntityInsert,
    Expectation, InstanceKey, LazyConnectionManager, PropertyType, PropertyValue, RecordingDatabase,
    SqlWork, StatementManager, Value,
};

type Log = Rc<RefCell<Vec<String>>>;

fn statements(db: &RecordingDatabase) -> StatementManager {
    StatementManager::new(LazyConnectionManager::new(db.clone()), EngineSettings::default())
}

/// Work that only records that it ran
fn noting(
    log: &Log,
    label: impl Into<String>,
) -> impl FnMut(&mut StatementManager) -> writebehind::Result<()> + 'static {
    let log = Rc::clone(log);
    let label = label.into();
    move |_statements: &mut StatementManager| {
        log.borrow_mut().push(label.clone());
        Ok(())
    }
}

fn employee(id: i64, log: &Log, label: &str) -> EntityAction {
    EntityAction::new("Employee", id, InstanceKey::new(), noting(log, label))
}

fn employees(log: &Log, label: &str) -> CollectionAction {
    CollectionAction::new("D.e", None, noting(log, label))
}

fn single_id_insert(sql: &str, id: i64) -> SqlWork {
    SqlWork::new().batched(sql, vec![Value::Integer(id)], Expectation::None)
}

fn reference(target: InstanceKey) -> (PropertyType, PropertyValue) {
    (
        PropertyType::Entity {
            entity_name: "Department".to_string(),
        },
        PropertyValue::Entity(target),
    )
}

#[test]
fn test_buffers_execute_in_flush_order_and_empty() {
    let db = RecordingDatabase::new();
    let mut statements = statements(&db);
    let log: Log = Rc::default();
    let mut queue = ActionQueue::new(EngineSettings::default(), None).unwrap();

    queue.enqueue(Action::Delete(employee(1, &log, "delete")));
    queue.enqueue(Action::CollectionRecreate(employees(&log, "recreate")));
    queue.enqueue(Action::CollectionUpdate(employees(&log, "collection update")));
    queue.enqueue(Action::CollectionRemove(employees(&log, "remove")));
    queue.enqueue(Action::Update(employee(2, &log, "update")));
    let insert = EntityInsert::new("Employee", InstanceKey::new(), noting(&log, "insert"));
    queue.enqueue(Action::Insert(insert));

    queue.execute_actions(&mut statements).unwrap();

    assert_eq!(
        *log.borrow(),
        vec!["insert", "update", "remove", "collection update", "recreate", "delete"]
    );
    assert!(!queue.has_pending_work());
    assert_eq!(queue.number_of_insertions(), 0);
    assert_eq!(queue.number_of_deletions(), 0);
}

#[test]
fn test_child_inserted_after_parent_of_same_type() {
    let log: Log = Rc::default();
    let e1 = InstanceKey::new();
    let e2 = InstanceKey::new();
    let (ty, value) = reference(e1);

    let mut queue = ActionQueue::new(EngineSettings::new().order_inserts(true), None).unwrap();
    queue.enqueue(Action::Insert(EntityInsert::new("Node", e1, noting(&log, "E1"))));
    let child = EntityInsert::new("Node", e2, noting(&log, "E2")).with_property(ty, value);
    queue.enqueue(Action::Insert(child));
    queue.sort_inserts();

    let order: Vec<InstanceKey> = queue.insertions().iter().map(EntityInsert::instance).collect();
    assert_eq!(order, vec![e1, e2]);

    let db = RecordingDatabase::new();
    queue.execute_inserts(&mut statements(&db)).unwrap();
    assert_eq!(*log.borrow(), vec!["E1", "E2"]);
}

#[test]
fn test_sorted_inserts_batch_by_type() {
    let db = RecordingDatabase::new();
    let mut statements = statements(&db);
    let mut queue = ActionQueue::new(EngineSettings::new().order_inserts(true), None).unwrap();

    for dept_id in 1..=3 {
        let dept = InstanceKey::new();
        queue.enqueue(Action::Insert(EntityInsert::new(
            "Department",
            dept,
            SqlWork::new().batched(
                "insert into department (id) values (?)",
                vec![Value::Integer(dept_id)],
                Expectation::RowCount(1),
            ),
        )));
        let (ty, value) = reference(dept);
        queue.enqueue(Action::Insert(
            EntityInsert::new(
                "Employee",
                InstanceKey::new(),
                SqlWork::new().batched(
                    "insert into employee (id, dept) values (?, ?)",
                    vec![Value::Integer(dept_id * 10), Value::Integer(dept_id)],
                    Expectation::RowCount(1),
                ),
            )
            .with_property(ty, value),
        ));
    }

    queue.sort_inserts();
    queue.execute_actions(&mut statements).unwrap();

    assert_eq!(
        db.executed_batches(),
        vec![
            ("insert into department (id) values (?)".to_string(), 3),
            ("insert into employee (id, dept) values (?, ?)".to_string(), 3),
        ]
    );
    assert!(db.unclosed_statements().is_empty());
}

#[test]
fn test_unsorted_inserts_keep_enqueue_order() {
    let db = RecordingDatabase::new();
    let mut statements = statements(&db);
    let mut queue = ActionQueue::new(EngineSettings::default(), None).unwrap();

    for id in 1..=2 {
        queue.enqueue(Action::Insert(EntityInsert::new(
            "Department",
            InstanceKey::new(),
            single_id_insert("insert into department (id) values (?)", id),
        )));
        queue.enqueue(Action::Insert(EntityInsert::new(
            "Employee",
            InstanceKey::new(),
            single_id_insert("insert into employee (id) values (?)", id),
        )));
    }

    queue.sort_inserts();
    queue.execute_inserts(&mut statements).unwrap();

    let sizes: Vec<usize> = db.executed_batches().into_iter().map(|(_, n)| n).collect();
    assert_eq!(sizes, vec![1, 1, 1, 1]);
}

#[test]
fn test_failure_keeps_unexecuted_actions_and_discards_batch() {
    let db = RecordingDatabase::new();
    let mut statements = statements(&db);
    let log: Log = Rc::default();
    let mut queue = ActionQueue::new(EngineSettings::default(), None).unwrap();

    queue.enqueue(Action::Update(EntityAction::new(
        "Employee",
        1,
        InstanceKey::new(),
        SqlWork::new().batched(
            "update employee set x = ? where id = ?",
            vec![Value::Integer(1), Value::Integer(1)],
            Expectation::None,
        ),
    )));
    queue.enqueue(Action::Update(EntityAction::new(
        "Employee",
        2,
        InstanceKey::new(),
        |_statements: &mut StatementManager| -> writebehind::Result<()> {
            Err(EngineError::InvalidState("dirty check failed".into()))
        },
    )));
    queue.enqueue(Action::Update(employee(3, &log, "third")));
    queue.enqueue(Action::Delete(employee(4, &log, "delete")));

    let err = queue.execute_actions(&mut statements).unwrap_err();

    assert!(matches!(err, EngineError::InvalidState(_)));
    assert!(log.borrow().is_empty());
    assert_eq!(queue.number_of_updates(), 1);
    assert_eq!(queue.number_of_deletions(), 1);
    assert!(statements.batch_sql().is_none());
    assert!(db.executed_batches().is_empty());
    assert!(db.unclosed_statements().is_empty());
}

#[test]
fn test_batch_failure_surfaces_sql() {
    let db = RecordingDatabase::new();
    db.inject(Fault::ExecuteBatch {
        sql: "delete from employee where id = ?".into(),
    });
    let mut statements = statements(&db);
    let mut queue = ActionQueue::new(EngineSettings::default(), None).unwrap();
    for id in 1..=2 {
        queue.enqueue(Action::Delete(EntityAction::new(
            "Employee",
            id,
            InstanceKey::new(),
            SqlWork::new().batched(
                "delete from employee where id = ?",
                vec![Value::Integer(id)],
                Expectation::RowCount(1),
            ),
        )));
    }

    let err = queue.execute_actions(&mut statements).unwrap_err();
    assert_eq!(err.sql(), Some("delete from employee where id = ?"));
    assert!(db.unclosed_statements().is_empty());
}

#[test]
fn test_unbatched_step_runs_immediately() {
    let db = RecordingDatabase::new().with_row_count("update counter set n = n + 1", 0);
    let mut statements = statements(&db);
    let mut queue = ActionQueue::new(EngineSettings::default(), None).unwrap();
    queue.enqueue(Action::Update(EntityAction::new(
        "Counter",
        1,
        InstanceKey::new(),
        SqlWork::new().single("update counter set n = n + 1", Vec::new(), Expectation::RowCount(1)),
    )));

    let err = queue.execute_actions(&mut statements).unwrap_err();
    assert!(matches!(err, EngineError::StaleState { expected: 1, actual: 0, .. }));
    assert!(db.unclosed_statements().is_empty());
}
