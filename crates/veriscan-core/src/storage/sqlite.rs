use rusqlite::{Connection, Result};
use std::sync::{Condvar, Mutex};
use tracing::debug;

/// Number of reusable connections kept per database. Small on purpose:
/// enough that workers are not serialized on one handle, bounded so a large
/// worker pool cannot exhaust descriptors.
const POOL_SIZE: usize = 4;

/// SQLite-backed results store. All access goes through the bounded
/// connection pool; callers only see the atomic operations in queries.rs.
pub struct Database {
    pool: Pool,
}

struct Pool {
    connections: Mutex<Vec<Connection>>,
    available: Condvar,
}

impl Pool {
    fn acquire(&self) -> Connection {
        let mut guard = self.connections.lock().unwrap();
        loop {
            if let Some(conn) = guard.pop() {
                return conn;
            }
            guard = self.available.wait(guard).unwrap();
        }
    }

    fn release(&self, conn: Connection) {
        self.connections.lock().unwrap().push(conn);
        self.available.notify_one();
    }
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let mut connections = Vec::with_capacity(POOL_SIZE);
        for i in 0..POOL_SIZE {
            let conn = Connection::open(path)?;
            configure_pragmas(&conn)?;
            if i == 0 {
                migrate_schema(&conn)?;
            }
            connections.push(conn);
        }
        debug!("Opened database {} with {} pooled connections", path, POOL_SIZE);
        Ok(Self {
            pool: Pool {
                connections: Mutex::new(connections),
                available: Condvar::new(),
            },
        })
    }

    /// In-memory database for tests. A private in-memory database is scoped
    /// to its connection, so the pool holds exactly one handle.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        migrate_schema(&conn)?;
        Ok(Self {
            pool: Pool {
                connections: Mutex::new(vec![conn]),
                available: Condvar::new(),
            },
        })
    }

    /// Run a closure against a pooled connection, blocking while the pool is
    /// drained. The connection is returned to the pool afterwards.
    ///
    /// Public for diagnostics and tests; all mutation should go through the
    /// atomic operations in queries.rs.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.pool.acquire();
        let result = f(&conn);
        self.pool.release(conn);
        result
    }
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

fn migrate_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("schema.sql"))?;
    debug!("SQLite schema initialized");
    Ok(())
}
