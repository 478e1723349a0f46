use libmdbx::{Database, DatabaseOptions, WriteMap, WriteFlags, TableFlags};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Table holding the monotonically increasing id counters.
pub const SEQUENCES: &str = "sequences";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("mdbx error: {0}")]
    Mdbx(#[from] libmdbx::Error),
    #[error("database mutex poisoned")]
    Poisoned,
    #[error("invalid UTF-8 in key of table {0}")]
    Utf8(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct InnerDatabase {
    db: Arc<Mutex<Database<WriteMap>>>,
}

pub trait SafeDatabase: Clone + Send + Sync + 'static {

    fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> where Self: Sized;

    fn write(&self, key: &str, value: &str, table: &str) -> Result<(), DbError>;

    fn read(&self, key: &str, table: &str) -> Result<Option<Vec<u8>>, DbError>;

    fn read_all(&self, table: &str) -> Result<HashMap<Vec<u8>, Vec<u8>>, DbError>;

    fn delete(&self, key: &str, table: &str) -> Result<bool, DbError>;

    fn batch_write<K, V>(&self, items: &[(K, V)], table: &str) -> Result<(), DbError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>;

    /// Runs `f` inside a single read-write transaction. Reads made through the
    /// batch see the batch's own pending writes. Nothing is committed unless
    /// `f` returns `Ok`.
    fn transact<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<R, E>,
        E: From<DbError>;

    fn read_json<T: DeserializeOwned>(&self, key: &str, table: &str) -> Result<Option<T>, DbError> {
        match self.read(key, table)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T, table: &str) -> Result<(), DbError> {
        let json = serde_json::to_string(value)?;
        self.write(key, &json, table)
    }

    /// Every value of `table` whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, prefix: &str, table: &str) -> Result<Vec<(String, T)>, DbError> {
        let mut ordered = BTreeMap::new();
        for (key_bytes, value_bytes) in self.read_all(table)? {
            let key = String::from_utf8(key_bytes).map_err(|_| DbError::Utf8(table.to_string()))?;
            if key.starts_with(prefix) {
                ordered.insert(key, serde_json::from_slice::<T>(&value_bytes)?);
            }
        }
        Ok(ordered.into_iter().collect())
    }

    fn next_sequence(&self, name: &str) -> Result<u64, DbError> {
        self.transact(|batch| batch.next_sequence(name))
    }
}

enum Op {
    Put { table: String, key: String, value: Vec<u8> },
    Delete { table: String, key: String },
}

type Reader<'a> = dyn Fn(&str, &str) -> Result<Option<Vec<u8>>, libmdbx::Error> + 'a;

/// Pending writes of one `transact` call.
pub struct Batch<'a> {
    reader: &'a Reader<'a>,
    ops: Vec<Op>,
}

impl<'a> Batch<'a> {
    fn new(reader: &'a Reader<'a>) -> Self {
        Self { reader, ops: Vec::new() }
    }

    pub fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, DbError> {
        for op in self.ops.iter().rev() {
            match op {
                Op::Put { table: t, key: k, value } if t == table && k == key => {
                    return Ok(Some(value.clone()));
                }
                Op::Delete { table: t, key: k } if t == table && k == key => return Ok(None),
                _ => {}
            }
        }
        Ok((self.reader)(table, key)?)
    }

    pub fn get_json<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<Option<T>, DbError> {
        match self.get(table, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, table: &str, key: &str) -> Result<bool, DbError> {
        Ok(self.get(table, key)?.is_some())
    }

    pub fn put(&mut self, table: &str, key: &str, value: impl AsRef<[u8]>) {
        self.ops.push(Op::Put {
            table: table.to_string(),
            key: key.to_string(),
            value: value.as_ref().to_vec(),
        });
    }

    pub fn put_json<T: Serialize>(&mut self, table: &str, key: &str, value: &T) -> Result<(), DbError> {
        let json = serde_json::to_vec(value)?;
        self.put(table, key, json);
        Ok(())
    }

    pub fn delete(&mut self, table: &str, key: &str) {
        self.ops.push(Op::Delete { table: table.to_string(), key: key.to_string() });
    }

    pub fn next_sequence(&mut self, name: &str) -> Result<u64, DbError> {
        let next = self.get_json::<u64>(SEQUENCES, name)?.unwrap_or(0) + 1;
        self.put_json(SEQUENCES, name, &next)?;
        Ok(next)
    }
}

impl InnerDatabase {
    fn lock(&self) -> Result<MutexGuard<'_, Database<WriteMap>>, DbError> {
        self.db.lock().map_err(|_| DbError::Poisoned)
    }
}

impl SafeDatabase for InnerDatabase{

    fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let mut options = DatabaseOptions::default();
        options.max_tables = Some(100);
        let db = Database::<WriteMap>::open_with_options(path, options)?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn write(&self, key: &str, value: &str, table: &str) -> Result<(), DbError> {
        let db = self.lock()?;
        let transaction = db.begin_rw_txn()?;
        let table = transaction.create_table(Some(table), TableFlags::default())?;

        transaction.put(&table, key, value, WriteFlags::default())?;
        transaction.commit()?;
        Ok(())
    }


    fn read(&self, key: &str, table: &str) -> Result<Option<Vec<u8>>, DbError> {
        let db = self.lock()?;
        let transaction = db.begin_ro_txn()?;

        if let Ok(table) = transaction.open_table(Some(table)) {
            let result = transaction.get(&table, key.as_bytes())?;
            return Ok(result);
        }

        Ok(None)
    }

    fn read_all(&self, table: &str) -> Result<HashMap<Vec<u8>, Vec<u8>>, DbError> {
        let mut map = HashMap::new();
        let db = self.lock()?;
        let transaction = db.begin_ro_txn()?;

        if let Ok(table) = transaction.open_table(Some(table)) {
            let cursor = transaction.cursor(&table)?;

            for item in cursor {
                let (key, value) = item?;
                map.insert(key.to_vec(), value.to_vec());
            }
        }

        Ok(map)
    }

    fn delete(&self, key: &str, table: &str) -> Result<bool, DbError> {
        let db = self.lock()?;
        let transaction = db.begin_rw_txn()?;
        let table = transaction.create_table(Some(table), TableFlags::default())?;

        let removed = transaction.del(&table, key, None)?;
        transaction.commit()?;
        Ok(removed)
    }

    fn batch_write<K, V>(&self, items: &[(K, V)], table: &str) -> Result<(), DbError>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let db = self.lock()?;
        let transaction = db.begin_rw_txn()?;
        let table = transaction.create_table(Some(table), TableFlags::default())?;

        for (key, value) in items {
            transaction.put(&table, key, value, WriteFlags::default())?;
        }

        transaction.commit()?;
        Ok(())
    }

    fn transact<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Batch<'_>) -> Result<R, E>,
        E: From<DbError>,
    {
        let db = self.lock()?;
        let transaction = db.begin_rw_txn().map_err(DbError::from)?;

        let reader = |table: &str, key: &str| -> Result<Option<Vec<u8>>, libmdbx::Error> {
            if let Ok(table) = transaction.open_table(Some(table)) {
                return transaction.get(&table, key.as_bytes());
            }
            Ok(None)
        };

        let mut batch = Batch::new(&reader);
        // an early return here drops the transaction uncommitted
        let output = f(&mut batch)?;
        let ops = batch.ops;

        let applied = ops.len();
        let commit = || -> Result<(), DbError> {
            for op in ops {
                match op {
                    Op::Put { table, key, value } => {
                        let table = transaction.create_table(Some(&table), TableFlags::default())?;
                        transaction.put(&table, key, value, WriteFlags::default())?;
                    }
                    Op::Delete { table, key } => {
                        let table = transaction.create_table(Some(&table), TableFlags::default())?;
                        transaction.del(&table, key, None)?;
                    }
                }
            }
            Ok(())
        };
        commit()?;
        transaction.commit().map_err(DbError::from)?;
        debug!(ops = applied, "transaction committed");

        Ok(output)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        db.write("alice", "{\"n\":1}", "users")?;
        assert_eq!(db.read("alice", "users")?, Some(b"{\"n\":1}".to_vec()));
        assert_eq!(db.read("bob", "users")?, None);
        assert_eq!(db.read("alice", "missing_table")?, None);
        Ok(())
    }

    #[test]
    fn test_delete() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        db.write("k", "v", "t")?;
        assert!(db.delete("k", "t")?);
        assert!(!db.delete("k", "t")?);
        assert!(db.read("k", "t")?.is_none());
        Ok(())
    }

    #[test]
    fn test_transact_sees_own_writes() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        let seen = db.transact(|batch| -> Result<Option<u64>, DbError> {
            batch.put_json("counters", "a", &41u64)?;
            let current = batch.get_json::<u64>("counters", "a")?.unwrap_or(0);
            batch.put_json("counters", "a", &(current + 1))?;
            batch.get_json::<u64>("counters", "a")
        })?;

        assert_eq!(seen, Some(42));
        assert_eq!(db.read_json::<u64>("a", "counters")?, Some(42));
        Ok(())
    }

    #[test]
    fn test_transact_error_discards_writes() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;
        db.write("keep", "1", "t")?;

        let result: Result<(), DbError> = db.transact(|batch| {
            batch.put("t", "new", "2");
            batch.delete("t", "keep");
            Err(DbError::Poisoned)
        });

        assert!(result.is_err());
        assert!(db.read("new", "t")?.is_none());
        assert!(db.read("keep", "t")?.is_some());
        Ok(())
    }

    #[test]
    fn test_sequences_increment() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        assert_eq!(db.next_sequence("proposal")?, 1);
        assert_eq!(db.next_sequence("proposal")?, 2);
        assert_eq!(db.next_sequence("other")?, 1);
        Ok(())
    }

    #[test]
    fn test_scan_prefix_in_key_order() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        db.batch_write(&[("7:b", "2"), ("7:a", "1"), ("8:a", "3")], "votes")?;
        let rows: Vec<(String, u64)> = db.scan_prefix("7:", "votes")?;

        assert_eq!(rows, vec![("7:a".to_string(), 1), ("7:b".to_string(), 2)]);
        Ok(())
    }
}
