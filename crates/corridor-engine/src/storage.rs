use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use corridor_core::PaymentMessage;
use corridor_routing::{CandidatePath, RouteEntry};
use corridor_settlement::HtlcCascade;

use crate::error::EngineError;

const CF_PAYMENTS: &str = "payments";
const CF_CASCADES: &str = "cascades";
const CF_ROUTES: &str = "routes";

/// Key under which the route-table checkpoint lives in [`CF_ROUTES`].
const ROUTES_KEY: &[u8] = b"snapshot";

/// Everything the engine must remember about one payment to survive a
/// restart: the message itself plus the ranked candidates and which of them
/// the current attempt is running on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment: PaymentMessage,
    /// Ranked paths from the original selection; retries walk down this
    /// list and never re-discover.
    pub candidates: Vec<CandidatePath>,
    /// Index into `candidates` of the attempt in flight (or next up).
    pub attempt: usize,
    /// Most recent failure, if any.
    pub failure: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(payment: PaymentMessage) -> Self {
        Self {
            payment,
            candidates: Vec::new(),
            attempt: 0,
            failure: None,
            updated_at: Utc::now(),
        }
    }

    pub fn current_path(&self) -> Option<&CandidatePath> {
        self.candidates.get(self.attempt)
    }

    pub fn has_alternate(&self) -> bool {
        self.attempt + 1 < self.candidates.len()
    }
}

/// Durable state behind the engine: payments, their cascades, and a
/// checkpoint of the route table.
pub trait Storage: Send + Sync {
    fn put_payment(&self, record: &PaymentRecord) -> Result<(), EngineError>;
    fn get_payment(&self, id: &Uuid) -> Result<Option<PaymentRecord>, EngineError>;
    fn payments(&self) -> Result<Vec<PaymentRecord>, EngineError>;

    fn put_cascade(&self, cascade: &HtlcCascade) -> Result<(), EngineError>;
    fn get_cascade(&self, payment_id: &Uuid) -> Result<Option<HtlcCascade>, EngineError>;

    /// Replace the stored route checkpoint wholesale.
    fn put_routes(&self, entries: &[RouteEntry]) -> Result<(), EngineError>;
    fn routes(&self) -> Result<Vec<RouteEntry>, EngineError>;
}

/// RocksDB-backed [`Storage`] with one column family per record kind and
/// JSON values.
pub struct RocksDbStorage {
    db: DB,
}

impl RocksDbStorage {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        std::fs::create_dir_all(path)
            .map_err(|e| EngineError::Storage(format!("create {}: {}", path.display(), e)))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_CASCADES, Options::default()),
            ColumnFamilyDescriptor::new(CF_ROUTES, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| EngineError::Storage(e.to_string()))?;
        tracing::info!(path = %path.display(), "storage opened");
        Ok(Self { db })
    }

    fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| EngineError::Storage(format!("column family '{}' missing", cf_name)))?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| EngineError::Storage(e.to_string()))
    }

    fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| EngineError::Storage(format!("column family '{}' missing", cf_name)))?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| EngineError::Storage(e.to_string()))
    }
}

impl Storage for RocksDbStorage {
    fn put_payment(&self, record: &PaymentRecord) -> Result<(), EngineError> {
        let value = serde_json::to_vec(record)?;
        self.put(CF_PAYMENTS, record.payment.id.as_bytes(), &value)
    }

    fn get_payment(&self, id: &Uuid) -> Result<Option<PaymentRecord>, EngineError> {
        match self.get(CF_PAYMENTS, id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn payments(&self) -> Result<Vec<PaymentRecord>, EngineError> {
        let cf = self
            .db
            .cf_handle(CF_PAYMENTS)
            .ok_or_else(|| EngineError::Storage("column family 'payments' missing".into()))?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| EngineError::Storage(e.to_string()))?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    fn put_cascade(&self, cascade: &HtlcCascade) -> Result<(), EngineError> {
        let value = serde_json::to_vec(cascade)?;
        self.put(CF_CASCADES, cascade.payment_id.as_bytes(), &value)
    }

    fn get_cascade(&self, payment_id: &Uuid) -> Result<Option<HtlcCascade>, EngineError> {
        match self.get(CF_CASCADES, payment_id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_routes(&self, entries: &[RouteEntry]) -> Result<(), EngineError> {
        let value = serde_json::to_vec(entries)?;
        self.put(CF_ROUTES, ROUTES_KEY, &value)
    }

    fn routes(&self) -> Result<Vec<RouteEntry>, EngineError> {
        match self.get(CF_ROUTES, ROUTES_KEY)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

/// Heap-only [`Storage`] for tests and embedders that opt out of
/// persistence.
#[derive(Default)]
pub struct MemoryStorage {
    payments: DashMap<Uuid, PaymentRecord>,
    cascades: DashMap<Uuid, HtlcCascade>,
    routes: Mutex<Vec<RouteEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn put_payment(&self, record: &PaymentRecord) -> Result<(), EngineError> {
        self.payments.insert(record.payment.id, record.clone());
        Ok(())
    }

    fn get_payment(&self, id: &Uuid) -> Result<Option<PaymentRecord>, EngineError> {
        Ok(self.payments.get(id).map(|r| r.clone()))
    }

    fn payments(&self) -> Result<Vec<PaymentRecord>, EngineError> {
        Ok(self.payments.iter().map(|r| r.clone()).collect())
    }

    fn put_cascade(&self, cascade: &HtlcCascade) -> Result<(), EngineError> {
        self.cascades.insert(cascade.payment_id, cascade.clone());
        Ok(())
    }

    fn get_cascade(&self, payment_id: &Uuid) -> Result<Option<HtlcCascade>, EngineError> {
        Ok(self.cascades.get(payment_id).map(|c| c.clone()))
    }

    fn put_routes(&self, entries: &[RouteEntry]) -> Result<(), EngineError> {
        let mut routes = self
            .routes
            .lock()
            .map_err(|_| EngineError::Storage("route checkpoint lock poisoned".into()))?;
        *routes = entries.to_vec();
        Ok(())
    }

    fn routes(&self) -> Result<Vec<RouteEntry>, EngineError> {
        let routes = self
            .routes
            .lock()
            .map_err(|_| EngineError::Storage("route checkpoint lock poisoned".into()))?;
        Ok(routes.clone())
    }
}
