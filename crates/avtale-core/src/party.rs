use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{Actor, ProviderId, RequesterId};

/// Admin approval state of a provider.
///
/// Only `Approved` providers can be booked or rescheduled onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Approval {
    Pending,
    Approved { at: NaiveDateTime },
    Rejected { at: NaiveDateTime },
}

/// A care provider that appointments are booked against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub display_name: String,
    pub specialization: String,
    pub approval: Approval,
}

impl Provider {
    pub fn is_approved(&self) -> bool {
        matches!(self.approval, Approval::Approved { .. })
    }

    pub fn approve(&mut self, at: NaiveDateTime) {
        self.approval = Approval::Approved { at };
    }

    pub fn reject(&mut self, at: NaiveDateTime) {
        self.approval = Approval::Rejected { at };
    }
}

/// Provider fields before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProvider {
    pub display_name: String,
    pub specialization: String,
}

/// A requester (patient) that books appointments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requester {
    pub id: RequesterId,
    pub display_name: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRequester {
    pub display_name: String,
    pub contact: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Provider,
    Admin,
}

/// Profile details captured at sign-up, turned into a Provider or
/// Requester at first verified sign-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDraft {
    pub display_name: String,
    pub contact: Option<String>,
    pub specialization: Option<String>,
}

/// Login credentials and the profile they resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// PHC-formatted password hash.
    pub credential_hash: String,
    pub role: Role,
    pub verified: bool,
    /// Provider or requester id, linked at first verified sign-in.
    #[serde(default)]
    pub profile_id: Option<u64>,
    #[serde(default)]
    pub draft: Option<ProfileDraft>,
}

impl Account {
    pub fn new(username: impl Into<String>, credential_hash: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            credential_hash: credential_hash.into(),
            role,
            verified: false,
            profile_id: None,
            draft: None,
        }
    }

    pub fn with_draft(mut self, draft: ProfileDraft) -> Self {
        self.draft = Some(draft);
        self
    }

    /// Attach the created profile and drop the sign-up draft.
    pub fn link_profile(&mut self, id: u64) {
        self.profile_id = Some(id);
        self.draft = None;
    }

    /// The actor this account operates as, once its profile is linked.
    pub fn actor(&self) -> Option<Actor> {
        match (self.role, self.profile_id) {
            (Role::Requester, Some(id)) => Some(Actor::Requester(RequesterId(id))),
            (Role::Provider, Some(id)) => Some(Actor::Provider(ProviderId(id))),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 20)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn pending_provider() -> Provider {
        Provider {
            id: ProviderId(1),
            display_name: "Dr. Berg".to_string(),
            specialization: "general".to_string(),
            approval: Approval::Pending,
        }
    }

    #[test]
    fn test_only_approved_is_approved() {
        let mut provider = pending_provider();
        assert!(!provider.is_approved());

        provider.approve(noon());
        assert!(provider.is_approved());
        assert_eq!(provider.approval, Approval::Approved { at: noon() });

        provider.reject(noon());
        assert!(!provider.is_approved());
    }

    #[test]
    fn test_account_actor_requires_profile() {
        let mut account = Account::new("alice", "$argon2id$stub", Role::Requester);
        assert_eq!(account.actor(), None);

        account.profile_id = Some(3);
        assert_eq!(account.actor(), Some(Actor::Requester(RequesterId(3))));
    }

    #[test]
    fn test_link_profile_clears_draft() {
        let mut account = Account::new("bob", "$argon2id$stub", Role::Provider).with_draft(
            ProfileDraft {
                display_name: "Dr. Berg".to_string(),
                contact: None,
                specialization: Some("cardiology".to_string()),
            },
        );
        account.link_profile(7);
        assert_eq!(account.draft, None);
        assert_eq!(account.actor(), Some(Actor::Provider(ProviderId(7))));
    }

    #[test]
    fn test_admin_has_no_actor() {
        let mut account = Account::new("root", "$argon2id$stub", Role::Admin);
        account.profile_id = Some(1);
        assert_eq!(account.actor(), None);
    }
}
