use chrono::NaiveDateTime;

use crate::appointment::{Appointment, AppointmentStatus, NewAppointment};
use crate::error::StorageError;
use crate::ids::{AppointmentId, ProviderId, RequesterId};
use crate::party::{Account, NewProvider, NewRequester, Provider, Requester};

/// Structured predicate for appointment lookups.
///
/// Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub provider: Option<ProviderId>,
    pub requester: Option<RequesterId>,
    pub scheduled_at: Option<NaiveDateTime>,
    pub status: Option<AppointmentStatus>,
    pub exclude: Option<AppointmentId>,
}

impl AppointmentFilter {
    pub fn for_provider(provider: ProviderId) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }

    pub fn for_requester(requester: RequesterId) -> Self {
        Self {
            requester: Some(requester),
            ..Self::default()
        }
    }

    /// Live bookings occupying `provider` at exactly `at`.
    pub fn live_slot(provider: ProviderId, at: NaiveDateTime) -> Self {
        Self {
            provider: Some(provider),
            scheduled_at: Some(at),
            status: Some(AppointmentStatus::Booked),
            ..Self::default()
        }
    }

    pub fn excluding(mut self, id: AppointmentId) -> Self {
        self.exclude = Some(id);
        self
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.provider.map_or(true, |p| appointment.provider == p)
            && self.requester.map_or(true, |r| appointment.requester == r)
            && self.scheduled_at.map_or(true, |t| appointment.scheduled_at == t)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.exclude.map_or(true, |id| appointment.id != id)
    }
}

/// Order appointments newest scheduled instant first, ties by id descending.
pub fn sort_newest_first(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        b.scheduled_at
            .cmp(&a.scheduled_at)
            .then(b.id.cmp(&a.id))
    });
}

/// Read access to committed records.
pub trait Snapshot {
    fn provider(&self, id: ProviderId) -> Result<Option<Provider>, StorageError>;

    fn providers(&self) -> Result<Vec<Provider>, StorageError>;

    fn requester(&self, id: RequesterId) -> Result<Option<Requester>, StorageError>;

    fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError>;

    fn account(&self, username: &str) -> Result<Option<Account>, StorageError>;

    /// Appointments matching `filter`, newest scheduled instant first.
    fn find_appointments(&self, filter: &AppointmentFilter)
        -> Result<Vec<Appointment>, StorageError>;
}

/// Reads and writes inside one atomic unit.
///
/// Appointment writes enforce the live-slot constraint: no two `Booked`
/// appointments may share a provider and instant. A violation fails with
/// `StorageError::SlotTaken`.
pub trait UnitOfWork: Snapshot {
    fn insert_provider(&mut self, new: NewProvider) -> Result<Provider, StorageError>;

    fn update_provider(&mut self, provider: &Provider) -> Result<(), StorageError>;

    fn insert_requester(&mut self, new: NewRequester) -> Result<Requester, StorageError>;

    /// Insert a new account. Fails with `Duplicate` if the username is taken.
    fn insert_account(&mut self, account: &Account) -> Result<(), StorageError>;

    fn update_account(&mut self, account: &Account) -> Result<(), StorageError>;

    /// Assign an id, derive the booking code and store the appointment as `Booked`.
    fn insert_appointment(&mut self, new: NewAppointment) -> Result<Appointment, StorageError>;

    /// Overwrite an existing appointment in place.
    fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StorageError>;
}

/// Durable record storage.
pub trait Store: Send + Sync {
    /// Run `f` against a consistent read-only view.
    fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&dyn Snapshot) -> Result<T, E>,
        E: From<StorageError>;

    /// Run `f` as one commit-or-abort unit. Any `Err` from `f` discards
    /// every write it made.
    fn run_atomic<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StorageError>;
}

// In-memory implementation for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use crate::party::Approval;

    #[derive(Debug, Clone, Default)]
    struct Tables {
        providers: BTreeMap<u64, Provider>,
        requesters: BTreeMap<u64, Requester>,
        accounts: HashMap<String, Account>,
        appointments: BTreeMap<u64, Appointment>,
        live_slots: HashMap<(ProviderId, NaiveDateTime), AppointmentId>,
        last_provider: u64,
        last_requester: u64,
        last_appointment: u64,
    }

    /// In-memory store for testing.
    ///
    /// Units run one at a time on a copy of the tables; the copy replaces
    /// the committed tables only when the unit succeeds.
    #[derive(Default)]
    pub struct InMemoryStore {
        tables: Mutex<Tables>,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Store for InMemoryStore {
        fn snapshot<T, E, F>(&self, f: F) -> Result<T, E>
        where
            F: FnOnce(&dyn Snapshot) -> Result<T, E>,
            E: From<StorageError>,
        {
            let tables = self.tables.lock().unwrap();
            f(&*tables)
        }

        fn run_atomic<T, E, F>(&self, f: F) -> Result<T, E>
        where
            F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
            E: From<StorageError>,
        {
            let mut committed = self.tables.lock().unwrap();
            let mut work = committed.clone();
            let out = f(&mut work)?;
            *committed = work;
            Ok(out)
        }
    }

    impl Tables {
        fn claim_slot(&mut self, appointment: &Appointment) -> Result<(), StorageError> {
            let (provider, at) = appointment.slot();
            match self.live_slots.get(&(provider, at)) {
                Some(holder) if *holder != appointment.id => {
                    Err(StorageError::SlotTaken { provider, at })
                }
                _ => {
                    self.live_slots.insert((provider, at), appointment.id);
                    Ok(())
                }
            }
        }
    }

    impl Snapshot for Tables {
        fn provider(&self, id: ProviderId) -> Result<Option<Provider>, StorageError> {
            Ok(self.providers.get(&id.0).cloned())
        }

        fn providers(&self) -> Result<Vec<Provider>, StorageError> {
            Ok(self.providers.values().cloned().collect())
        }

        fn requester(&self, id: RequesterId) -> Result<Option<Requester>, StorageError> {
            Ok(self.requesters.get(&id.0).cloned())
        }

        fn appointment(&self, id: AppointmentId) -> Result<Option<Appointment>, StorageError> {
            Ok(self.appointments.get(&id.0).cloned())
        }

        fn account(&self, username: &str) -> Result<Option<Account>, StorageError> {
            Ok(self.accounts.get(username).cloned())
        }

        fn find_appointments(
            &self,
            filter: &AppointmentFilter,
        ) -> Result<Vec<Appointment>, StorageError> {
            let mut found: Vec<Appointment> = self
                .appointments
                .values()
                .filter(|a| filter.matches(a))
                .cloned()
                .collect();
            sort_newest_first(&mut found);
            Ok(found)
        }
    }

    impl UnitOfWork for Tables {
        fn insert_provider(&mut self, new: NewProvider) -> Result<Provider, StorageError> {
            self.last_provider += 1;
            let provider = Provider {
                id: ProviderId(self.last_provider),
                display_name: new.display_name,
                specialization: new.specialization,
                approval: Approval::Pending,
            };
            self.providers.insert(provider.id.0, provider.clone());
            Ok(provider)
        }

        fn update_provider(&mut self, provider: &Provider) -> Result<(), StorageError> {
            match self.providers.get_mut(&provider.id.0) {
                Some(existing) => {
                    *existing = provider.clone();
                    Ok(())
                }
                None => Err(StorageError::NotFound(provider.id.to_string())),
            }
        }

        fn insert_requester(&mut self, new: NewRequester) -> Result<Requester, StorageError> {
            self.last_requester += 1;
            let requester = Requester {
                id: RequesterId(self.last_requester),
                display_name: new.display_name,
                contact: new.contact,
            };
            self.requesters.insert(requester.id.0, requester.clone());
            Ok(requester)
        }

        fn insert_account(&mut self, account: &Account) -> Result<(), StorageError> {
            if self.accounts.contains_key(&account.username) {
                return Err(StorageError::Duplicate(account.username.clone()));
            }
            self.accounts
                .insert(account.username.clone(), account.clone());
            Ok(())
        }

        fn update_account(&mut self, account: &Account) -> Result<(), StorageError> {
            match self.accounts.get_mut(&account.username) {
                Some(existing) => {
                    *existing = account.clone();
                    Ok(())
                }
                None => Err(StorageError::NotFound(account.username.clone())),
            }
        }

        fn insert_appointment(&mut self, new: NewAppointment) -> Result<Appointment, StorageError> {
            let appointment = new.into_appointment(AppointmentId(self.last_appointment + 1));
            self.claim_slot(&appointment)?;
            self.last_appointment = appointment.id.0;
            self.appointments
                .insert(appointment.id.0, appointment.clone());
            Ok(appointment)
        }

        fn update_appointment(&mut self, appointment: &Appointment) -> Result<(), StorageError> {
            let previous = self
                .appointments
                .get(&appointment.id.0)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(appointment.id.to_string()))?;

            if previous.is_live() {
                self.live_slots.remove(&previous.slot());
            }
            if appointment.is_live() {
                self.claim_slot(appointment)?;
            }

            self.appointments
                .insert(appointment.id.0, appointment.clone());
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::NaiveDate;

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
                note: String::new(),
                booked_at: at(8),
            }
        }

        #[test]
        fn test_insert_assigns_sequential_ids() {
            let store = InMemoryStore::new();

            let ids: Vec<u64> = store
                .run_atomic(|tx| {
                    let a = tx.insert_appointment(new_appointment(7, 10))?;
                    let b = tx.insert_appointment(new_appointment(7, 11))?;
                    Ok::<_, StorageError>(vec![a.id.0, b.id.0])
                })
                .unwrap();

            assert_eq!(ids, vec![1, 2]);
        }

        #[test]
        fn test_live_slot_constraint() {
            let store = InMemoryStore::new();
            store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
                .unwrap();

            let err = store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
                .unwrap_err();
            assert!(matches!(err, StorageError::SlotTaken { .. }));

            // Other provider, same instant is fine
            assert!(store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(8, 10)))
                .is_ok());
        }

        #[test]
        fn test_failed_unit_discards_writes() {
            let store = InMemoryStore::new();

            let result: Result<(), StorageError> = store.run_atomic(|tx| {
                tx.insert_appointment(new_appointment(7, 10))?;
                Err(StorageError::Database("boom".to_string()))
            });
            assert!(result.is_err());

            let all = store
                .snapshot(|s| s.find_appointments(&AppointmentFilter::default()))
                .unwrap();
            assert!(all.is_empty());

            // The id sequence was rolled back too
            let first = store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
                .unwrap();
            assert_eq!(first.id, AppointmentId(1));
        }

        #[test]
        fn test_cancel_frees_slot() {
            let store = InMemoryStore::new();
            let mut first = store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
                .unwrap();

            first.status = AppointmentStatus::Cancelled;
            store.run_atomic(|tx| tx.update_appointment(&first)).unwrap();

            assert!(store
                .run_atomic(|tx| tx.insert_appointment(new_appointment(7, 10)))
                .is_ok());

            // Restoring the first one now collides
            first.status = AppointmentStatus::Booked;
            let err = store
                .run_atomic(|tx| tx.update_appointment(&first))
                .unwrap_err();
            assert!(matches!(err, StorageError::SlotTaken { .. }));
        }

        #[test]
        fn test_find_orders_newest_first() {
            let store = InMemoryStore::new();
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
            let hours: Vec<NaiveDateTime> = found.iter().map(|a| a.scheduled_at).collect();
            assert_eq!(hours, vec![at(14), at(9)]);
        }

        #[test]
        fn test_duplicate_account_rejected() {
            let store = InMemoryStore::new();
            let account = Account::new("alice", "hash", crate::party::Role::Requester);

            store.run_atomic(|tx| tx.insert_account(&account)).unwrap();
            let err = store
                .run_atomic(|tx| tx.insert_account(&account))
                .unwrap_err();
            assert!(matches!(err, StorageError::Duplicate(_)));
        }
    }
}
