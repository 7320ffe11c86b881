//! Shared engine state and per-client sessions.
//!
//! An [`Engine`] owns the active database behind a reader-writer lock and is
//! shared by every client. Each client drives it through its own
//! [`Session`], which holds that client's handles and any queued batch.
//! Mutations take the write lock; reads share the read lock and only upgrade
//! when a stale index has to be rebuilt first.

use crate::batch::BatchScheduler;
use crate::context::{ClientContext, HandleValue};
use crate::eval::{Output, evaluate};
use crate::ops::Operator;
use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tessera_common::{EngineConfig, Result, TesseraError};
use tessera_storage::{Database, IndexState, persist, select, select_refreshed};
use tracing::{debug, info};

/// Outcome of one client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Success, with text for print operators.
    Ok(Option<String>),
    Error(String),
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok(_))
    }
}

impl From<Result<Option<String>>> for Response {
    fn from(result: Result<Option<String>>) -> Self {
        match result {
            Ok(text) => Response::Ok(text),
            Err(e) => {
                debug!(error = %e, "request failed");
                Response::Error(e.to_string())
            }
        }
    }
}

/// Process-wide engine state.
pub struct Engine {
    config: EngineConfig,
    database: RwLock<Option<Database>>,
    scheduler: BatchScheduler,
}

impl Engine {
    /// Creates an engine with no active database.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = BatchScheduler::new(config.exec.clone());
        Ok(Self {
            config,
            database: RwLock::new(None),
            scheduler,
        })
    }

    /// Creates an engine and restores the database recorded by the last
    /// shutdown, if any.
    pub fn startup(config: EngineConfig) -> Result<Self> {
        let engine = Self::new(config)?;
        let restored = persist::startup(&engine.config.storage)?;
        if let Some(db) = &restored {
            info!(database = db.name(), tables = db.tables().len(), "engine started");
        }
        *engine.database.write() = restored;
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Name of the active database.
    pub fn database_name(&self) -> Option<String> {
        self.database.read().as_ref().map(|db| db.name().to_string())
    }

    /// Runs `f` with shared access to the active database.
    pub fn with_database<R>(&self, f: impl FnOnce(Option<&Database>) -> R) -> R {
        f(self.database.read().as_ref())
    }
}

fn require_mut(db: &mut Option<Database>) -> Result<&mut Database> {
    db.as_mut().ok_or(TesseraError::NoActiveDatabase)
}

/// A client's view of the engine.
pub struct Session {
    engine: Arc<Engine>,
    context: ClientContext,
    batch: Option<Vec<Operator>>,
}

impl Session {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            context: ClientContext::new(),
            batch: None,
        }
    }

    pub fn context(&self) -> &ClientContext {
        &self.context
    }

    pub fn is_batching(&self) -> bool {
        self.batch.is_some()
    }

    /// Runs one operator, or queues it while a batch is open.
    pub fn execute(&mut self, op: Operator) -> Response {
        if let Some(queue) = &mut self.batch {
            if !op.is_read_only() {
                return Response::Error(format!("{} cannot be batched", op.name()));
            }
            queue.push(op);
            return Response::Ok(None);
        }
        self.dispatch(&op).into()
    }

    /// Starts queueing operators for a batch.
    pub fn begin_batch(&mut self) -> Response {
        if self.batch.is_some() {
            return Response::Error("batch already in progress".to_string());
        }
        self.batch = Some(Vec::new());
        Response::Ok(None)
    }

    /// Runs every queued operator. Printed output is joined by newlines.
    pub fn execute_batch(&mut self) -> Response {
        let Some(ops) = self.batch.take() else {
            return Response::Error("no batch in progress".to_string());
        };
        self.run_batch(&ops).into()
    }

    fn run_batch(&mut self, ops: &[Operator]) -> Result<Option<String>> {
        BatchScheduler::validate(ops)?;
        let guard = self.engine.database.upgradable_read();
        let stale = guard
            .as_ref()
            .is_some_and(|db| BatchScheduler::needs_refresh(db, ops));
        let guard = if stale {
            let mut write = RwLockUpgradableReadGuard::upgrade(guard);
            if let Some(db) = write.as_mut() {
                BatchScheduler::refresh(db, ops)?;
            }
            RwLockWriteGuard::downgrade(write)
        } else {
            RwLockUpgradableReadGuard::downgrade(guard)
        };

        let printed = self
            .engine
            .scheduler
            .run(guard.as_ref(), &mut self.context, ops)?;
        Ok(if printed.is_empty() {
            None
        } else {
            Some(printed.join("\n"))
        })
    }

    fn dispatch(&mut self, op: &Operator) -> Result<Option<String>> {
        let storage = &self.engine.config.storage;
        match op {
            Operator::CreateDb { name } => {
                let db = Database::new(name, storage.max_tables)?
                    .with_column_capacity(storage.column_base_capacity);
                let previous = self.engine.database.write().replace(db);
                if let Some(previous) = previous {
                    info!(database = previous.name(), "replaced active database");
                }
                Ok(None)
            }
            Operator::CreateTable { name, columns } => {
                let mut guard = self.engine.database.write();
                let db = require_mut(&mut guard)?;
                let (db_name, table) = name
                    .rsplit_once('.')
                    .ok_or_else(|| TesseraError::TableNotFound(name.clone()))?;
                if db_name != db.name() {
                    return Err(TesseraError::DatabaseNotFound(db_name.to_string()));
                }
                db.create_table(table, *columns)?;
                Ok(None)
            }
            Operator::CreateColumn { name } => {
                let mut guard = self.engine.database.write();
                let db = require_mut(&mut guard)?;
                let (table, column) = name
                    .rsplit_once('.')
                    .ok_or_else(|| TesseraError::TableNotFound(name.clone()))?;
                let table = db.resolve_table(table)?;
                db.create_column(table, column)?;
                Ok(None)
            }
            Operator::CreateIndex {
                column,
                kind,
                clustered,
            } => {
                require_mut(&mut self.engine.database.write())?
                    .create_index(*column, *kind, *clustered)?;
                Ok(None)
            }
            Operator::Insert { table, values } => {
                require_mut(&mut self.engine.database.write())?.insert(*table, values)?;
                Ok(None)
            }
            Operator::Load { table, values } => {
                require_mut(&mut self.engine.database.write())?.load_rows(*table, values)?;
                Ok(None)
            }
            Operator::Update {
                column,
                positions,
                value,
            } => {
                let positions = self.context.positions(positions)?;
                require_mut(&mut self.engine.database.write())?.update(*column, positions, *value)?;
                Ok(None)
            }
            Operator::Delete { table, positions } => {
                let positions = self.context.positions(positions)?;
                require_mut(&mut self.engine.database.write())?.delete(*table, positions)?;
                Ok(None)
            }
            Operator::Select { column, range, out } => {
                let guard = self.engine.database.upgradable_read();
                let db = guard.as_ref().ok_or(TesseraError::NoActiveDatabase)?;
                let positions = if db.column(*column)?.index_state() == IndexState::Stale {
                    let mut write = RwLockUpgradableReadGuard::upgrade(guard);
                    select_refreshed(require_mut(&mut write)?, *column, range)?
                } else {
                    select(db.column(*column)?, range)
                };
                self.context.insert(out.clone(), HandleValue::Positions(positions));
                Ok(None)
            }
            Operator::Shutdown => {
                let mut guard = self.engine.database.write();
                if let Some(db) = guard.as_mut() {
                    persist::shutdown(db, storage)?;
                    info!(database = db.name(), "shut down");
                }
                *guard = None;
                Ok(None)
            }
            _ => {
                let output: Output = {
                    let guard = self.engine.database.read();
                    evaluate(guard.as_ref(), &self.context, op, &self.engine.config.exec)?
                };
                Ok(output.commit(&mut self.context))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{AggregateOp, Operand};
    use tempfile::tempdir;
    use tessera_common::{Scalar, ValueRange};
    use tessera_storage::{ColumnRef, IndexKind, TableId};

    fn engine_in(dir: &std::path::Path) -> Arc<Engine> {
        let mut config = EngineConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config.storage.fsync_enabled = false;
        Arc::new(Engine::new(config).unwrap())
    }

    fn setup(session: &mut Session) {
        for op in [
            Operator::CreateDb {
                name: "db1".to_string(),
            },
            Operator::CreateTable {
                name: "db1.tbl1".to_string(),
                columns: 2,
            },
            Operator::CreateColumn {
                name: "db1.tbl1.a".to_string(),
            },
            Operator::CreateColumn {
                name: "db1.tbl1.b".to_string(),
            },
        ] {
            assert_eq!(session.execute(op), Response::Ok(None));
        }
    }

    #[test]
    fn test_create_and_query() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(engine_in(dir.path()));
        setup(&mut session);
        let a = ColumnRef::new(TableId(0), 0);
        let b = ColumnRef::new(TableId(0), 1);
        for row in [[1, 10], [3, 30], [2, 20]] {
            assert!(
                session
                    .execute(Operator::Insert {
                        table: TableId(0),
                        values: row.to_vec(),
                    })
                    .is_ok()
            );
        }

        session.execute(Operator::Select {
            column: a,
            range: ValueRange::bounded(2, 4),
            out: "s1".to_string(),
        });
        session.execute(Operator::Fetch {
            column: b,
            positions: "s1".to_string(),
            out: "f1".to_string(),
        });
        let printed = session.execute(Operator::Print {
            handles: vec!["f1".to_string()],
        });
        assert_eq!(printed, Response::Ok(Some("30\n20".to_string())));
    }

    #[test]
    fn test_errors_become_responses() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(engine_in(dir.path()));
        let response = session.execute(Operator::CreateTable {
            name: "db1.tbl1".to_string(),
            columns: 1,
        });
        assert_eq!(response, Response::Error("No active database".to_string()));

        setup(&mut session);
        let response = session.execute(Operator::CreateTable {
            name: "other.tbl2".to_string(),
            columns: 1,
        });
        assert_eq!(
            response,
            Response::Error("Database not found: other".to_string())
        );
    }

    #[test]
    fn test_select_rebuilds_stale_index() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let mut session = Session::new(engine.clone());
        setup(&mut session);
        let a = ColumnRef::new(TableId(0), 0);
        session.execute(Operator::Load {
            table: TableId(0),
            values: vec![5, 0, 6, 1, 7, 2],
        });
        session.execute(Operator::CreateIndex {
            column: a,
            kind: IndexKind::BTree,
            clustered: false,
        });
        session.execute(Operator::Select {
            column: a,
            range: ValueRange::bounded(6, 7),
            out: "s".to_string(),
        });
        session.execute(Operator::Update {
            column: a,
            positions: "s".to_string(),
            value: 9,
        });
        engine.with_database(|db| {
            assert_eq!(db.unwrap().column(a).unwrap().index_state(), IndexState::Stale);
        });

        session.execute(Operator::Select {
            column: a,
            range: ValueRange::new(Some(8), None),
            out: "t".to_string(),
        });
        assert_eq!(session.context().positions("t").unwrap(), &[1]);
        engine.with_database(|db| {
            assert_eq!(db.unwrap().column(a).unwrap().index_state(), IndexState::Fresh);
        });
    }

    #[test]
    fn test_batch_queues_reads_only() {
        let dir = tempdir().unwrap();
        let mut session = Session::new(engine_in(dir.path()));
        setup(&mut session);
        session.execute(Operator::Load {
            table: TableId(0),
            values: vec![1, 10, 2, 20, 3, 30],
        });

        assert!(session.begin_batch().is_ok());
        assert!(!session.begin_batch().is_ok());
        assert!(
            !session
                .execute(Operator::Insert {
                    table: TableId(0),
                    values: vec![4, 40],
                })
                .is_ok()
        );
        session.execute(Operator::Select {
            column: ColumnRef::new(TableId(0), 0),
            range: ValueRange::new(Some(2), None),
            out: "s".to_string(),
        });
        session.execute(Operator::Aggregate {
            op: AggregateOp::Sum,
            inputs: vec![Operand::Column(ColumnRef::new(TableId(0), 1))],
            out: "total".to_string(),
        });
        session.execute(Operator::Print {
            handles: vec!["total".to_string()],
        });
        assert!(!session.context().contains("s"));

        let response = session.execute_batch();
        assert_eq!(response, Response::Ok(Some("60".to_string())));
        assert_eq!(session.context().positions("s").unwrap(), &[1, 2]);
        assert_eq!(session.context().scalar("total").unwrap(), Scalar::Long(60));
        assert!(!session.is_batching());
        assert!(!session.execute_batch().is_ok());
    }

    #[test]
    fn test_shutdown_and_startup() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        let mut session = Session::new(engine.clone());
        setup(&mut session);
        session.execute(Operator::Load {
            table: TableId(0),
            values: vec![3, 1, 1, 2, 2, 3],
        });
        session.execute(Operator::CreateIndex {
            column: ColumnRef::new(TableId(0), 0),
            kind: IndexKind::Sorted,
            clustered: true,
        });
        assert_eq!(session.execute(Operator::Shutdown), Response::Ok(None));
        assert_eq!(engine.database_name(), None);

        let restored = Engine::startup(engine.config().clone()).unwrap();
        assert_eq!(restored.database_name(), Some("db1".to_string()));
        restored.with_database(|db| {
            let db = db.unwrap();
            assert_eq!(db.column(ColumnRef::new(TableId(0), 0)).unwrap().values(), &[1, 2, 3]);
            assert_eq!(db.column(ColumnRef::new(TableId(0), 1)).unwrap().values(), &[2, 3, 1]);
        });
    }
}
