//! Connection locking and pragma configuration for the `SQLite` store.

use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires the store's connection mutex, recovering from poison rather than
/// propagating the panic of whatever held it. A panic inside one operation
/// should not take down every later operation on the same connection.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("sqlite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        }
    }
}

/// Applies the pragmas the schema and migrator require: WAL journaling, a
/// 5s busy timeout, NORMAL synchronous, and foreign-key enforcement.
///
/// # Errors
///
/// Returns [`crate::Error::Storage`] if a pragma cannot be applied.
pub fn configure_connection(conn: &Connection) -> crate::Result<()> {
    // pragma_update's return value is ignored for journal_mode: it returns a
    // row ("wal") which would make execute_batch choke if used there instead.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_lock_success() {
        let mutex = Mutex::new(42);
        let guard = acquire_lock(&mutex);
        assert_eq!(*guard, 42);
    }

    #[test]
    fn test_acquire_lock_concurrent() {
        let mutex = Arc::new(Mutex::new(0));
        let mut handles = vec![];
        for _ in 0..10 {
            let mutex_clone = Arc::clone(&mutex);
            handles.push(thread::spawn(move || {
                let mut guard = acquire_lock(&mutex_clone);
                *guard += 1;
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*acquire_lock(&mutex), 10);
    }

    #[test]
    fn test_configure_connection() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();

        let foreign_keys: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let synchronous: i32 = conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .unwrap();
        assert_eq!(synchronous, 1);

        let busy_timeout: i32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);
    }
}
