use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use writebehind::connection::JournalEvent;
use writebehind::{
    Action, ActionQueue, ConnectionManager, EngineSettings, EntityAction, EntityInsert, Expectation,
    InMemoryTimestamps, InstanceKey, LazyConnectionManager, PropertyType, PropertyValue,
    RecordingDatabase, SqlWork, StatementManager, UpdateTimestampsCache, Value,
};

#[derive(Parser)]
#[command(name = "flush-demo")]
#[command(about = "Flush a department/employee unit of work against a recording database")]
struct Cli {
    /// Engine settings as a JSON document; flags below override it
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    order_inserts: bool,

    #[arg(long)]
    order_updates: bool,

    #[arg(long)]
    query_cache: bool,

    /// Send a batch after this many entries (0 = only at the end of each buffer)
    #[arg(long, default_value_t = 0)]
    batch_size: usize,

    #[arg(long, default_value_t = 2)]
    departments: i64,

    #[arg(long, default_value_t = 2)]
    employees_per_department: i64,

    /// Print the statement journal as JSON
    #[arg(long)]
    json: bool,
}

const INSERT_DEPARTMENT: &str = "insert into department (name, id) values (?, ?)";
const INSERT_EMPLOYEE: &str = "insert into employee (name, department_id, id) values (?, ?, ?)";
const UPDATE_DEPARTMENT: &str = "update department set name = ? where id = ?";
const DELETE_EMPLOYEE: &str = "delete from employee where id = ?";

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    let db = RecordingDatabase::new();
    let mut statements =
        StatementManager::new(LazyConnectionManager::new(db.clone()), settings.clone());
    let timestamps: Option<Arc<dyn UpdateTimestampsCache>> = if settings.query_cache_enabled {
        Some(Arc::new(InMemoryTimestamps::new()))
    } else {
        None
    };
    let mut queue = ActionQueue::new(settings, timestamps).context("Invalid engine settings")?;

    enqueue_unit_of_work(&mut queue, cli.departments, cli.employees_per_department);
    println!("{}", queue);

    queue.sort_inserts();
    queue.sort_updates_and_collections();
    queue.prepare_collection_actions()?;
    queue
        .execute_actions(&mut statements)
        .context("Flush failed")?;
    let report = queue.after_transaction_completion(true)?;
    statements.connection_manager().release()?;

    let journal = db.journal();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&journal)?);
    } else {
        for event in &journal {
            if let Some(line) = render(event) {
                println!("{}", line);
            }
        }
        println!(
            "{} round-trips, {} actions notified after completion{}",
            db.executed_batches().len(),
            report.notified,
            statements.open_resource_stats()
        );
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<EngineSettings> {
    let mut settings = match &cli.settings {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings '{}'", path.display()))?;
            EngineSettings::from_json(&json)?
        }
        None => EngineSettings::default(),
    };

    settings.order_inserts |= cli.order_inserts;
    settings.order_updates |= cli.order_updates;
    settings.query_cache_enabled |= cli.query_cache;
    if cli.batch_size > 0 {
        settings.jdbc_batch_size = cli.batch_size;
    }
    Ok(settings)
}

/// Departments and their employees are enqueued interleaved, the way a
/// session discovers them while cascading.
fn enqueue_unit_of_work(queue: &mut ActionQueue, departments: i64, employees_per_department: i64) {
    let mut next_employee_id = 100;

    for dept_id in 1..=departments {
        let department = InstanceKey::new();
        let name = format!("Department {}", dept_id);
        queue.enqueue(Action::Insert(
            EntityInsert::new(
                "Department",
                department,
                SqlWork::new().batched(
                    INSERT_DEPARTMENT,
                    vec![Value::from(name.as_str()), Value::Integer(dept_id)],
                    Expectation::RowCount(1),
                ),
            )
            .with_id(dept_id)
            .with_property(PropertyType::Scalar, PropertyValue::Scalar(Value::from(name.as_str())))
            .with_table_space("department"),
        ));

        for n in 0..employees_per_department {
            let id = next_employee_id;
            next_employee_id += 1;
            let name = format!("Employee {}-{}", dept_id, n);
            let params = vec![
                Value::from(name.as_str()),
                Value::Integer(dept_id),
                Value::Integer(id),
            ];
            queue.enqueue(Action::Insert(
                EntityInsert::new(
                    "Employee",
                    InstanceKey::new(),
                    SqlWork::new().batched(INSERT_EMPLOYEE, params, Expectation::RowCount(1)),
                )
                .with_id(id)
                .with_property(
                    PropertyType::Scalar,
                    PropertyValue::Scalar(Value::from(name.as_str())),
                )
                .with_property(
                    PropertyType::Entity {
                        entity_name: "Department".to_string(),
                    },
                    PropertyValue::Entity(department),
                )
                .with_table_space("employee"),
            ));
        }
    }

    queue.enqueue(Action::Update(
        EntityAction::new(
            "Department",
            1,
            InstanceKey::new(),
            SqlWork::new().batched(
                UPDATE_DEPARTMENT,
                vec![Value::from("Research"), Value::Integer(1)],
                Expectation::RowCount(1),
            ),
        )
        .with_table_space("department"),
    ));
    queue.enqueue(Action::Delete(
        EntityAction::new(
            "Employee",
            42,
            InstanceKey::new(),
            SqlWork::new().batched(
                DELETE_EMPLOYEE,
                vec![Value::Integer(42)],
                Expectation::RowCount(1),
            ),
        )
        .with_table_space("employee"),
    ));
}

fn render(event: &JournalEvent) -> Option<String> {
    match event {
        JournalEvent::Prepare { handle, sql, .. } => Some(format!("prepare  #{} {}", handle, sql)),
        JournalEvent::ExecuteBatch { handle, size, .. } => {
            Some(format!("batch    #{} x{}", handle, size))
        }
        JournalEvent::ExecuteUpdate { handle, sql } => {
            Some(format!("update   #{} {}", handle, sql))
        }
        JournalEvent::CloseStatement { handle, .. } => Some(format!("close    #{}", handle)),
        JournalEvent::OpenConnection => Some("connection opened".to_string()),
        JournalEvent::CloseConnection => Some("connection closed".to_string()),
        _ => None,
    }
}
