use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, Table, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{config::MeterConfig, error::MeterError};

/// `(identity, field)` -> decimal integer string.
const METER_TABLE: TableDefinition<(&str, &str), &str> = TableDefinition::new("meter");

const REMAINING: &str = "MillisecondsRemaining";
const USED: &str = "MillisecondsUsed";

/// What [`Ledger::new_meter`] does when the identity already has an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitPolicy {
    /// Fail with [`MeterError::AlreadyExists`].
    #[default]
    Reject,
    /// Reset remaining to the given budget and used to zero.
    Overwrite,
    /// Leave the existing entry untouched.
    Keep,
}

/// Point-in-time view of one identity's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub milliseconds_remaining: i64,
    pub milliseconds_used: i64,
}

/// Handle to the ledger store; clones share one database.
#[derive(Clone)]
pub struct Ledger {
    db: Arc<Database>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger").finish_non_exhaustive()
    }
}

impl Ledger {
    /// Open or create the ledger file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MeterError> {
        let db = Database::create(path.as_ref())?;
        Self::init(db)
    }

    pub fn from_config(cfg: &MeterConfig) -> Result<Self, MeterError> {
        Self::open(&cfg.path)
    }

    /// Ledger that lives only as long as its last clone.
    pub fn in_memory() -> Result<Self, MeterError> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, MeterError> {
        let txn = db.begin_write()?;
        {
            let _table = txn.open_table(METER_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    /// Create the entry for `identity` with `remaining_ms` of budget.
    #[instrument(level = "debug", skip(self))]
    pub fn new_meter(
        &self,
        identity: &str,
        remaining_ms: i64,
        policy: InitPolicy,
    ) -> Result<Meter, MeterError> {
        let txn = self.db.begin_write()?;
        let created = {
            let mut table = txn.open_table(METER_TABLE)?;
            let exists = table.get((identity, REMAINING))?.is_some();
            match (exists, policy) {
                (true, InitPolicy::Reject) => None,
                (true, InitPolicy::Keep) => Some(false),
                _ => {
                    write(&mut table, identity, REMAINING, remaining_ms)?;
                    write(&mut table, identity, USED, 0)?;
                    Some(true)
                }
            }
        };

        let Some(created) = created else {
            txn.abort()?;
            return Err(MeterError::AlreadyExists(identity.to_string()));
        };
        txn.commit()?;

        if created {
            info!(target: "berth.meter", %identity, remaining_ms, "meter initialised");
        } else {
            debug!(target: "berth.meter", %identity, "meter kept");
        }
        Ok(self.meter(identity))
    }

    /// Handle for an identity without touching the store.
    pub fn meter(&self, identity: &str) -> Meter {
        Meter {
            identity: identity.to_string(),
            ledger: self.clone(),
        }
    }

    pub fn milliseconds_remaining(&self, identity: &str) -> Result<i64, MeterError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METER_TABLE)?;
        read(&table, identity, REMAINING)?.ok_or_else(|| MeterError::NotFound(identity.to_string()))
    }

    /// Debit `ms` from `identity` and return the new balance.
    ///
    /// Fails with [`MeterError::Exhausted`] if the balance is already zero or
    /// below; a debit larger than the balance is accepted and drives it
    /// negative. Remaining and used are updated in one transaction.
    #[instrument(level = "debug", skip(self))]
    pub fn record_milliseconds(&self, identity: &str, ms: i64) -> Result<Status, MeterError> {
        if ms < 0 {
            return Err(MeterError::InvalidAmount(ms));
        }

        let txn = self.db.begin_write()?;
        let debited = {
            let mut table = txn.open_table(METER_TABLE)?;
            debit(&mut table, identity, ms)
        };

        match debited {
            Ok(status) => {
                txn.commit()?;
                info!(
                    target: "berth.meter",
                    %identity,
                    remaining = status.milliseconds_remaining,
                    "recorded some time"
                );
                Ok(status)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }

    pub fn inspect(&self, identity: &str) -> Result<Status, MeterError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(METER_TABLE)?;
        let remaining = read(&table, identity, REMAINING)?
            .ok_or_else(|| MeterError::NotFound(identity.to_string()))?;
        let used = read(&table, identity, USED)?.unwrap_or(0);
        Ok(Status {
            milliseconds_remaining: remaining,
            milliseconds_used: used,
        })
    }
}

fn debit(
    table: &mut Table<(&'static str, &'static str), &'static str>,
    identity: &str,
    ms: i64,
) -> Result<Status, MeterError> {
    let remaining = read(&*table, identity, REMAINING)?
        .ok_or_else(|| MeterError::NotFound(identity.to_string()))?;
    if remaining <= 0 {
        return Err(MeterError::Exhausted {
            identity: identity.to_string(),
            remaining,
        });
    }
    let used = read(&*table, identity, USED)?.unwrap_or(0);

    let (Some(left), Some(total)) = (remaining.checked_sub(ms), used.checked_add(ms)) else {
        return Err(MeterError::InvalidAmount(ms));
    };
    let status = Status {
        milliseconds_remaining: left,
        milliseconds_used: total,
    };
    write(table, identity, REMAINING, status.milliseconds_remaining)?;
    write(table, identity, USED, status.milliseconds_used)?;
    Ok(status)
}

fn read<T>(table: &T, identity: &str, field: &'static str) -> Result<Option<i64>, MeterError>
where
    T: ReadableTable<(&'static str, &'static str), &'static str>,
{
    let Some(raw) = table.get((identity, field))? else {
        return Ok(None);
    };
    let raw = raw.value();
    raw.parse().map(Some).map_err(|_| MeterError::Corrupt {
        identity: identity.to_string(),
        field,
        value: raw.to_string(),
    })
}

fn write(
    table: &mut Table<(&'static str, &'static str), &'static str>,
    identity: &str,
    field: &str,
    value: i64,
) -> Result<(), MeterError> {
    table.insert((identity, field), value.to_string().as_str())?;
    Ok(())
}

/// One identity's view of the ledger.
#[derive(Debug, Clone)]
pub struct Meter {
    identity: String,
    ledger: Ledger,
}

impl Meter {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn milliseconds_remaining(&self) -> Result<i64, MeterError> {
        self.ledger.milliseconds_remaining(&self.identity)
    }

    pub fn record_milliseconds(&self, ms: i64) -> Result<Status, MeterError> {
        self.ledger.record_milliseconds(&self.identity, ms)
    }

    pub fn inspect(&self) -> Result<Status, MeterError> {
        self.ledger.inspect(&self.identity)
    }
}
