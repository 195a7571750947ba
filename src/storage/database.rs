use parking_lot::Mutex;
use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;
use std::time::Duration;

/// SQLite connection shared between relay components and subscription tasks.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        // `watch` and `send` may run as separate processes on one file.
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` while holding the connection lock.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> SqlResult<T>) -> SqlResult<T> {
        let conn = self.conn.lock();
        f(&conn)
    }
}
