//! Execution context
//!
//! Auxiliary per-instance state: locale and timezone, the plugin registry,
//! context items, and the transactional handle to a backing store. A
//! context is forked (never shared) when its instance is cloned; the fork
//! reopens the same store without the parent's in-flight transaction.

use crate::vm::value::Value;
use crate::vm::{VmError, VmResult};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// A backing data store
pub trait Store: Send + Sync + fmt::Debug {
    /// Store name (for diagnostics)
    fn name(&self) -> &str;

    /// Open a new transaction
    fn begin(&self) -> VmResult<Box<dyn Transaction>>;
}

/// An in-flight transaction against a `Store`
pub trait Transaction: Send + fmt::Debug {
    /// Transaction identifier
    fn id(&self) -> u64;

    /// Commit the transaction
    fn commit(self: Box<Self>) -> VmResult<()>;

    /// Roll back the transaction
    fn rollback(self: Box<Self>) -> VmResult<()>;
}

/// Transactional handle: a store plus at most one open transaction
#[derive(Debug)]
pub struct Database {
    store: Arc<dyn Store>,
    tx: Option<Box<dyn Transaction>>,
}

impl Database {
    /// Create a handle with no open transaction
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, tx: None }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Open a transaction
    pub fn begin(&mut self) -> VmResult<()> {
        if self.tx.is_some() {
            return Err(VmError::Store("transaction already open".to_string()));
        }
        self.tx = Some(self.store.begin()?);
        Ok(())
    }

    /// Commit the open transaction
    pub fn commit(&mut self) -> VmResult<()> {
        match self.tx.take() {
            Some(tx) => tx.commit(),
            None => Err(VmError::Store("no open transaction".to_string())),
        }
    }

    /// Roll back the open transaction
    pub fn rollback(&mut self) -> VmResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Err(VmError::Store("no open transaction".to_string())),
        }
    }

    /// The open transaction, if any
    pub fn transaction(&self) -> Option<&dyn Transaction> {
        self.tx.as_deref()
    }

    /// Check for an open transaction
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// A new handle against the same store, without the open transaction
    pub fn reopen(&self) -> Database {
        Database::new(Arc::clone(&self.store))
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let id = tx.id();
            if let Err(e) = tx.rollback() {
                tracing::warn!(target: "skein::store", tx = id, "rollback on drop failed: {}", e);
            }
        }
    }
}

/// Per-instance execution context
#[derive(Debug)]
pub struct ExecContext {
    locale: String,
    timezone: String,
    plugins: Vec<String>,
    items: FxHashMap<String, Value>,
    db: Option<Database>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new("en-US", "UTC")
    }
}

impl ExecContext {
    /// Create a context with the given locale and timezone
    pub fn new(locale: &str, timezone: &str) -> Self {
        Self {
            locale: locale.to_string(),
            timezone: timezone.to_string(),
            plugins: Vec::new(),
            items: FxHashMap::default(),
            db: None,
        }
    }

    /// Locale (e.g. "en-US")
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Set the locale
    pub fn set_locale(&mut self, locale: &str) {
        self.locale = locale.to_string();
    }

    /// Timezone (e.g. "UTC")
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Set the timezone
    pub fn set_timezone(&mut self, timezone: &str) {
        self.timezone = timezone.to_string();
    }

    /// Loaded plugins
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    /// Register a plugin by name
    pub fn register_plugin(&mut self, name: &str) {
        if !self.plugins.iter().any(|p| p == name) {
            self.plugins.push(name.to_string());
        }
    }

    /// Get a context item
    pub fn item(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    /// Set a context item
    pub fn set_item(&mut self, key: &str, value: Value) {
        self.items.insert(key.to_string(), value);
    }

    /// Transactional handle
    pub fn db(&self) -> Option<&Database> {
        self.db.as_ref()
    }

    /// Mutable transactional handle
    pub fn db_mut(&mut self) -> Option<&mut Database> {
        self.db.as_mut()
    }

    /// Attach a transactional handle
    pub fn set_db(&mut self, db: Database) {
        self.db = Some(db);
    }

    /// Fork the context for a cloned instance
    pub(crate) fn fork(&self) -> ExecContext {
        ExecContext {
            locale: self.locale.clone(),
            timezone: self.timezone.clone(),
            plugins: self.plugins.clone(),
            items: self.items.clone(),
            db: self.db.as_ref().map(Database::reopen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Default)]
    struct LedgerStore {
        next: AtomicU64,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[derive(Debug)]
    struct LedgerTx {
        id: u64,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Store for LedgerStore {
        fn name(&self) -> &str {
            "ledger"
        }

        fn begin(&self) -> VmResult<Box<dyn Transaction>> {
            let id = self.next.fetch_add(1, Ordering::Relaxed) + 1;
            self.log.lock().push(format!("begin {}", id));
            Ok(Box::new(LedgerTx {
                id,
                log: Arc::clone(&self.log),
            }))
        }
    }

    impl Transaction for LedgerTx {
        fn id(&self) -> u64 {
            self.id
        }

        fn commit(self: Box<Self>) -> VmResult<()> {
            self.log.lock().push(format!("commit {}", self.id));
            Ok(())
        }

        fn rollback(self: Box<Self>) -> VmResult<()> {
            self.log.lock().push(format!("rollback {}", self.id));
            Ok(())
        }
    }

    #[test]
    fn test_database_transaction_lifecycle() {
        let store = Arc::new(LedgerStore::default());
        let log = Arc::clone(&store.log);
        let mut db = Database::new(store);

        assert!(!db.in_transaction());
        assert!(db.commit().is_err());

        db.begin().unwrap();
        assert!(db.in_transaction());
        assert_eq!(db.transaction().map(|t| t.id()), Some(1));
        assert!(db.begin().is_err());

        db.commit().unwrap();
        assert!(!db.in_transaction());

        db.begin().unwrap();
        drop(db);

        assert_eq!(
            *log.lock(),
            vec!["begin 1", "commit 1", "begin 2", "rollback 2"]
        );
    }

    #[test]
    fn test_fork_reopens_store_without_transaction() {
        let store: Arc<dyn Store> = Arc::new(LedgerStore::default());
        let mut ctx = ExecContext::new("es-ES", "Europe/Madrid");
        ctx.register_plugin("billing");
        ctx.set_item("tenant", Value::str("acme"));
        ctx.set_db(Database::new(Arc::clone(&store)));
        ctx.db_mut().unwrap().begin().unwrap();

        let fork = ctx.fork();
        assert_eq!(fork.locale(), "es-ES");
        assert_eq!(fork.timezone(), "Europe/Madrid");
        assert_eq!(fork.plugins(), ["billing".to_string()]);
        assert_eq!(fork.item("tenant"), Some(&Value::str("acme")));

        let db = fork.db().unwrap();
        assert!(Arc::ptr_eq(db.store(), &store));
        assert!(!db.in_transaction());
        assert!(ctx.db().unwrap().in_transaction());
    }
}
