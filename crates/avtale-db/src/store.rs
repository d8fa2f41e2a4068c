use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

use avtale_core::storage::sort_newest_first;
use avtale_core::{
    Account, Appointment, AppointmentFilter, AppointmentId, Approval, NewAppointment, NewProvider,
    NewRequester, Provider, ProviderId, Requester, RequesterId, Snapshot, StorageError, Store,
    UnitOfWork,
};

use crate::tables::{
    encode_slot_key, ACCOUNTS_TABLE, APPOINTMENTS_TABLE, APPOINTMENT_COUNTER, COUNTERS_TABLE,
    LIVE_SLOTS_TABLE, PROVIDERS_TABLE, PROVIDER_COUNTER, REQUESTERS_TABLE, REQUESTER_COUNTER,
};

fn db_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Database(e.to_string())
}

/// redb implementation of Store.
///
/// Each atomic unit is one write transaction; redb runs write
/// transactions one at a time, so a unit's reads and writes cannot
/// interleave with another unit's.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Initialize the database tables.
    pub fn init_tables(db: &Database) -> Result<(), StorageError> {
        let write_txn = db.begin_write().map_err(db_err)?;
        {
            // Create tables if they don't exist
            let _ = write_txn.open_table(PROVIDERS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(REQUESTERS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(APPOINTMENTS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(ACCOUNTS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(LIVE_SLOTS_TABLE).map_err(db_err)?;
            let _ = write_txn.open_table(COUNTERS_TABLE).map_err(db_err)?;
        }
        write_txn.commit().map_err(db_err)?;
        Ok(())
    }
}

impl Store for RedbStore {
    fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn Snapshot) -> Result<T, E>,
        E: From<StorageError>,
    {
        let read_txn = self.db.begin_read().map_err(db_err)?;
        f(&ReadView { txn: &read_txn })
    }

    fn run_atomic<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StorageError>,
    {
        let write_txn = self.db.begin_write().map_err(db_err)?;
        let out = f(&mut WriteView { txn: &write_txn });

        match out {
            Ok(value) => {
                write_txn.commit().map_err(db_err)?;
                Ok(value)
            }
            Err(e) => {
                // A failed abort still leaves nothing committed
                let _ = write_txn.abort();
                Err(e)
            }
        }
    }
}

fn decode<D: DeserializeOwned>(bytes: &[u8]) -> Result<D, StorageError> {
    serde_json::from_slice(bytes).map_err(db_err)
}

fn encode<D: Serialize>(record: &D) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(record).map_err(db_err)
}

fn get_record<D, T>(table: &T, id: u64) -> Result<Option<D>, StorageError>
where
    D: DeserializeOwned,
    T: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id).map_err(db_err)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

fn all_records<D, T>(table: &T) -> Result<Vec<D>, StorageError>
where
    D: DeserializeOwned,
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut records = Vec::new();
    for entry in table.iter().map_err(db_err)? {
        let (_, value) = entry.map_err(db_err)?;
        records.push(decode(value.value())?);
    }
    Ok(records)
}

fn get_account<T>(table: &T, username: &str) -> Result<Option<Account>, StorageError>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(username).map_err(db_err)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

fn matching_appointments<T>(
    table: &T,
    filter: &AppointmentFilter,
) -> Result<Vec<Appointment>, StorageError>
where
    T: ReadableTable<u64, &'static [u8]>,
{
    let mut found: Vec<Appointment> = all_records(table)?
        .into_iter()
        .filter(|a| filter.matches(a))
        .collect();
    sort_newest_first(&mut found);
    Ok(found)
}

/// Read-only view over one redb read transaction.
struct ReadView<'a> {
    txn: &'a ReadTransaction,
}

impl Snapshot for ReadView<'_> {
    fn provider(&self, id: ProviderId) -> Result<Option<Provider>, StorageError> {
        let table = self.txn.open_table(PROVIDERS_TABLE).map_err(db_err)?;
        get_record(&table, id.0)
    }

    fn providers(&self) -> Result<Vec<Provider>, StorageError> {
        let table = self.txn.open_table(PROVIDERS_TABLE).map_err(db_err)?;
        all_records(&table)
    }

    fn requester(&self, id: RequesterId) -> Result<Option<Requester>, StorageError> {
        let table = self.txn.open_table(REQUESTERS_TABLE).map_err(db_err)?;
        get_record(&table, id.0)
    }

    fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        let table = self.txn.open_table(APPOINTMENTS_TABLE).map_err(db_err)?;
        get_record(&table, id.0)
    }

    fn account(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let table = self.txn.open_table(ACCOUNTS_TABLE).map_err(db_err)?;
        get_account(&table, username)
    }

    fn find_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, StorageError> {
        let table = self.txn.open_table(APPOINTMENTS_TABLE).map_err(db_err)?;
        matching_appointments(&table, filter)
    }
}

/// Read-write view over one redb write transaction.
///
/// Tables are opened per call; redb refuses to open one table twice
/// inside a single write transaction.
struct WriteView<'a> {
    txn: &'a WriteTransaction,
}

impl WriteView<'_> {
    fn next_id(&self, counter: &str) -> Result<u64, StorageError> {
        let mut table = self.txn.open_table(COUNTERS_TABLE).map_err(db_err)?;
        let last = table
            .get(counter)
            .map_err(db_err)?
            .map(|v| v.value())
            .unwrap_or(0);
        let next = last + 1;
        table.insert(counter, next).map_err(db_err)?;
        Ok(next)
    }

    fn put_record<D: Serialize>(
        &self,
        definition: TableDefinition<u64, &'static [u8]>,
        id: u64,
        record: &D,
    ) -> Result<(), StorageError> {
        let value = encode(record)?;
        let mut table = self.txn.open_table(definition).map_err(db_err)?;
        table.insert(id, value.as_slice()).map_err(db_err)?;
        Ok(())
    }

    fn contains(
        &self,
        definition: TableDefinition<u64, &'static [u8]>,
        id: u64,
    ) -> Result<bool, StorageError> {
        let table = self.txn.open_table(definition).map_err(db_err)?;
        let found = table.get(id).map_err(db_err)?.is_some();
        Ok(found)
    }

    /// Point the slot of `appointment` at it, unless another appointment holds it.
    fn claim_slot(&self, appointment: &Appointment) -> Result<(), StorageError> {
        let (provider, at) = appointment.slot();
        let key = encode_slot_key(provider, at);

        let mut table = self.txn.open_table(LIVE_SLOTS_TABLE).map_err(db_err)?;
        let holder = table
            .get(key.as_slice())
            .map_err(db_err)?
            .map(|v| v.value());
        if let Some(holder) = holder {
            if holder != appointment.id.0 {
                return Err(StorageError::SlotTaken { provider, at });
            }
        }
        table
            .insert(key.as_slice(), appointment.id.0)
            .map_err(db_err)?;
        Ok(())
    }

    fn release_slot(&self, appointment: &Appointment) -> Result<(), StorageError> {
        let (provider, at) = appointment.slot();
        let key = encode_slot_key(provider, at);

        let mut table = self.txn.open_table(LIVE_SLOTS_TABLE).map_err(db_err)?;
        table.remove(key.as_slice()).map_err(db_err)?;
        Ok(())
    }
}

impl Snapshot for WriteView<'_> {
    fn provider(&self, id: ProviderId) -> Result<Option<Provider>, StorageError> {
        let table = self.txn.open_table(PROVIDERS_TABLE).map_err(db_err)?;
        get_record(&table, id.0)
    }

    fn providers(&self) -> Result<Vec<Provider>, StorageError> {
        let table = self.txn.open_table(PROVIDERS_TABLE).map_err(db_err)?;
        all_records(&table)
    }

    fn requester(&self, id: RequesterId) -> Result<Option<Requester>, StorageError> {
        let table = self.txn.open_table(REQUESTERS_TABLE).map_err(db_err)?;
        get_record(&table, id.0)
    }

    fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
        let table = self.txn.open_table(APPOINTMENTS_TABLE).map_err(db_err)?;
        get_record(&table, id.0)
    }

    fn account(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let table = self.txn.open_table(ACCOUNTS_TABLE).map_err(db_err)?;
        get_account(&table, username)
    }

    fn find_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, StorageError> {
        let table = self.txn.open_table(APPOINTMENTS_TABLE).map_err(db_err)?;
        matching_appointments(&table, filter)
    }
}

impl UnitOfWork for WriteView<'_> {
    fn insert_provider(&mut self, new: NewProvider) -> Result<Provider, StorageError> {
        let provider = Provider {
            id: ProviderId(self.next_id(PROVIDER_COUNTER)?),
            display_name: new.display_name,
            specialization: new.specialization,
            approval: Approval::Pending,
        };
        self.put_record(PROVIDERS_TABLE, provider.id.0, &provider)?;
        Ok(provider)
    }

    fn update_provider(&mut self, provider: &Provider) -> Result<(), StorageError> {
        if !self.contains(PROVIDERS_TABLE, provider.id.0)? {
            return Err(StorageError::NotFound(provider.id.to_string()));
        }
        self.put_record(PROVIDERS_TABLE, provider.id.0, provider)
    }

    fn insert_requester(&mut self, new: NewRequester) -> Result<Requester, StorageError> {
        let requester = Requester {
            id: RequesterId(self.next_id(REQUESTER_COUNTER)?),
            display_name: new.display_name,
            contact: new.contact,
        };
        self.put_record(REQUESTERS_TABLE, requester.id.0, &requester)?;
        Ok(requester)
    }

    fn insert_account(&mut self, account: &Account) -> Result<(), StorageError> {
        let value = encode(account)?;
        let mut table = self.txn.open_table(ACCOUNTS_TABLE).map_err(db_err)?;
        let exists = table
            .get(account.username.as_str())
            .map_err(db_err)?
            .is_some();
        if exists {
            return Err(StorageError::Duplicate(account.username.clone()));
        }
        table
            .insert(account.username.as_str(), value.as_slice())
            .map_err(db_err)?;
        Ok(())
    }

    fn update_account(&mut self, account: &Account) -> Result<(), StorageError> {
        let value = encode(account)?;
        let mut table = self.txn.open_table(ACCOUNTS_TABLE).map_err(db_err)?;
        let exists = table
            .get(account.username.as_str())
            .map_err(db_err)?
            .is_some();
        if !exists {
            return Err(StorageError::NotFound(account.username.clone()));
        }
        table
            .insert(account.username.as_str(), value.as_slice())
            .map_err(db_err)?;
        Ok(())
    }

    fn insert_appointment(&mut self, new: NewAppointment) -> Result<Appointment, StorageError> {
        let id = AppointmentId(self.next_id(APPOINTMENT_COUNTER)?);
        let appointment = new.into_appointment(id);
        self.claim_slot(&appointment)?;
        self.put_record(APPOINTMENTS_TABLE, id.0, &appointment)?;
        Ok(appointment)
    }

    fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StorageError> {
        let previous: Appointment = self
            .appointment(appointment.id)?
            .ok_or_else(|| StorageError::NotFound(appointment.id.to_string()))?;

        if previous.is_live() {
            self.release_slot(&previous)?;
        }
        if appointment.is_live() {
            self.claim_slot(appointment)?;
        }
        self.put_record(APPOINTMENTS_TABLE, appointment.id.0, appointment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avtale_core::{AppointmentStatus, Role};
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::{tempdir, TempDir};

    fn create_test_store() -> (TempDir, RedbStore) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("test.redb")).unwrap();
        RedbStore::init_tables(&db).unwrap();
        (dir, RedbStore::new(Arc::new(db)))
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn new_appointment(provider: u64, hour: u32) -> NewAppointment {
        NewAppointment {
            provider: ProviderId(provider),
            requester: RequesterId(3),
            scheduled_at: at(hour),
            note: "checkup".to_string(),
            booked_at: at(8),
        }
    }

    #[test]
    fn test_insert_and_get_appointment() {
        let (_dir, store) = create_test_store();

        let inserted = store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap();
        assert_eq!(inserted.id, AppointmentId(1));
        assert_eq!(inserted.status, AppointmentStatus::Booked);

        let fetched = store
            .snapshot(|s| s.appointment(inserted.id))
            .unwrap()
            .unwrap();
        assert_eq!(fetched, inserted);
    }

    #[test]
    fn test_live_slot_constraint() {
        let (_dir, store) = create_test_store();
        store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap();

        let err = store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap_err();
        assert!(matches!(err, StorageError::SlotTaken { .. }));

        assert!(store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(8, 10)))
            .is_ok());
    }

    #[test]
    fn test_subsecond_instants_are_distinct_slots() {
        let (_dir, store) = create_test_store();
        let mut first = new_appointment(7, 10);
        first.scheduled_at += chrono::Duration::microseconds(100);
        let mut second = new_appointment(7, 10);
        second.scheduled_at += chrono::Duration::microseconds(200);

        store
            .run_atomic(|tx| tx.insert_appointment(first.clone()))
            .unwrap();
        let booked = store
            .run_atomic(|tx| tx.insert_appointment(second.clone()))
            .unwrap();
        assert_eq!(booked.scheduled_at, second.scheduled_at);

        // The exact instant is still exclusive
        let err = store
            .run_atomic(|tx| tx.insert_appointment(first))
            .unwrap_err();
        assert!(matches!(err, StorageError::SlotTaken { .. }));
    }

    #[test]
    fn test_failed_unit_is_rolled_back() {
        let (_dir, store) = create_test_store();

        let result: Result<(), StorageError> = store.run_atomic(|tx| {
            tx.insert_appointment(new_appointment(7, 10))?;
            Err(StorageError::Database("boom".to_string()))
        });
        assert!(result.is_err());

        let all = store
            .snapshot(|s| s.find_appointments(&AppointmentFilter::default()))
            .unwrap();
        assert!(all.is_empty());

        // Counter and slot were rolled back with the row
        let first = store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap();
        assert_eq!(first.id, AppointmentId(1));
    }

    #[test]
    fn test_cancel_and_restore_slot() {
        let (_dir, store) = create_test_store();
        let mut first = store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap();

        first.status = AppointmentStatus::Cancelled;
        store.run_atomic(|tx| tx.update_appointment(&first)).unwrap();

        store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap();

        first.status = AppointmentStatus::Booked;
        let err = store
            .run_atomic(|tx| tx.update_appointment(&first))
            .unwrap_err();
        assert!(matches!(err, StorageError::SlotTaken { .. }));
    }

    #[test]
    fn test_move_appointment_releases_old_slot() {
        let (_dir, store) = create_test_store();
        let mut moved = store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .unwrap();

        moved.scheduled_at = at(11);
        store.run_atomic(|tx| tx.update_appointment(&moved)).unwrap();

        assert!(store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .is_ok());
        assert!(store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 11)))
            .is_err());
    }

    #[test]
    fn test_find_appointments_filtered_and_ordered() {
        let (_dir, store) = create_test_store();
        store
            .run_atomic(|tx| {
                tx.insert_appointment(new_appointment(7, 9))?;
                tx.insert_appointment(new_appointment(7, 14))?;
                tx.insert_appointment(new_appointment(8, 11))
            })
            .unwrap();

        let found = store
            .snapshot(|s| s.find_appointments(&AppointmentFilter::for_provider(ProviderId(7))))
            .unwrap();
        let times: Vec<NaiveDateTime> = found.iter().map(|a| a.scheduled_at).collect();
        assert_eq!(times, vec![at(14), at(9)]);
    }

    #[test]
    fn test_providers_and_requesters() {
        let (_dir, store) = create_test_store();

        let (provider, requester) = store
            .run_atomic(|tx| {
                let mut p = tx.insert_provider(NewProvider {
                    display_name: "Dr. Berg".to_string(),
                    specialization: "cardiology".to_string(),
                })?;
                p.approve(at(8));
                tx.update_provider(&p)?;
                let r = tx.insert_requester(NewRequester {
                    display_name: "Kari".to_string(),
                    contact: None,
                })?;
                Ok::<_, StorageError>((p, r))
            })
            .unwrap();

        assert_eq!(provider.id, ProviderId(1));
        assert_eq!(requester.id, RequesterId(1));

        let stored = store.snapshot(|s| s.provider(provider.id)).unwrap().unwrap();
        assert!(stored.is_approved());
        assert_eq!(store.snapshot(|s| s.providers()).unwrap().len(), 1);
        assert!(store
            .snapshot(|s| s.requester(RequesterId(2)))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_accounts() {
        let (_dir, store) = create_test_store();
        let mut account = Account::new("kari", "hash", Role::Requester);

        store.run_atomic(|tx| tx.insert_account(&account)).unwrap();
        let err = store
            .run_atomic(|tx| tx.insert_account(&account))
            .unwrap_err();
        assert!(matches!(err, StorageError::Duplicate(_)));

        account.verified = true;
        store.run_atomic(|tx| tx.update_account(&account)).unwrap();
        let stored = store.snapshot(|s| s.account("kari")).unwrap().unwrap();
        assert!(stored.verified);

        let missing = Account::new("ola", "hash", Role::Requester);
        let err = store
            .run_atomic(|tx| tx.update_account(&missing))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");

        {
            let db = crate::init_database(&path).unwrap();
            let store = RedbStore::new(db);
            store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
                .unwrap();
        }

        let store = RedbStore::new(crate::init_database(&path).unwrap());
        let all = store
            .snapshot(|s| s.find_appointments(&AppointmentFilter::default()))
            .unwrap();
        assert_eq!(all.len(), 1);

        // The slot index was persisted too
        assert!(store
            .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
            .is_err());
    }
}
