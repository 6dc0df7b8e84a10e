//! Scripted driver double for unit tests.

use super::driver::{ColumnInfo, Driver, DriverError, DriverHandle, ExecOutcome};
use super::sync::acquire_lock;
use crate::config::ConnectionConfig;
use crate::models::{Row, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Script {
    tables: HashMap<String, Vec<ColumnInfo>>,
    responses: VecDeque<Vec<Row>>,
    failures: VecDeque<DriverError>,
    log: Vec<(String, Vec<Value>)>,
    describes: usize,
    next_insert_id: i64,
}

/// Records every statement and answers queries from a FIFO of canned rows.
#[derive(Default)]
pub(crate) struct ScriptedDriver {
    script: Arc<Mutex<Script>>,
    connects: AtomicUsize,
    fail_connects: AtomicBool,
}

impl ScriptedDriver {
    pub(crate) fn with_table(self, table: &str, columns: &[(&str, &str, &str)]) -> Self {
        let columns = columns
            .iter()
            .map(|(field, key, extra)| ColumnInfo {
                field: (*field).to_string(),
                column_type: "varchar(255)".to_string(),
                null: true,
                key: (*key).to_string(),
                default: None,
                extra: (*extra).to_string(),
            })
            .collect();
        acquire_lock(&self.script)
            .tables
            .insert(table.to_string(), columns);
        self
    }

    pub(crate) fn push_rows(&self, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns: Vec<String> = columns.iter().map(ToString::to_string).collect();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(columns.clone(), values))
            .collect();
        acquire_lock(&self.script).responses.push_back(rows);
    }

    pub(crate) fn fail_next(&self, error: DriverError) {
        acquire_lock(&self.script).failures.push_back(error);
    }

    pub(crate) fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn describes(&self) -> usize {
        acquire_lock(&self.script).describes
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<Value>)> {
        acquire_lock(&self.script).log.clone()
    }

    pub(crate) fn sql_log(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }
}

impl Driver for ScriptedDriver {
    fn name(&self) -> &str {
        "scripted"
    }

    fn connect(
        &self,
        _config: &ConnectionConfig,
        _options: &BTreeMap<String, String>,
    ) -> Result<Box<dyn DriverHandle>, DriverError> {
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(DriverError::new(Some(2002), "Connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedHandle {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedHandle {
    script: Arc<Mutex<Script>>,
}

impl ScriptedHandle {
    fn record(&self, sql: &str, params: &[Value]) -> Result<(), DriverError> {
        let mut script = acquire_lock(&self.script);
        script.log.push((sql.to_string(), params.to_vec()));
        script.failures.pop_front().map_or(Ok(()), Err)
    }
}

impl DriverHandle for ScriptedHandle {
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        self.record(sql, params)?;
        Ok(acquire_lock(&self.script)
            .responses
            .pop_front()
            .unwrap_or_default())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.record(sql, params)?;
        let mut script = acquire_lock(&self.script);
        script.next_insert_id += 1;
        Ok(ExecOutcome {
            affected: 1,
            last_insert_id: Some(script.next_insert_id),
        })
    }

    fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnInfo>, DriverError> {
        let mut script = acquire_lock(&self.script);
        script.describes += 1;
        script
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| DriverError::new(Some(1146), format!("Table '{table}' doesn't exist")))
    }

    fn list_tables(&mut self) -> Result<Vec<String>, DriverError> {
        let mut tables: Vec<String> = acquire_lock(&self.script).tables.keys().cloned().collect();
        tables.sort();
        Ok(tables)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.record("BEGIN", &[])
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.record("COMMIT", &[])
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.record("ROLLBACK", &[])
    }

    fn ping(&mut self) -> bool {
        true
    }
}
