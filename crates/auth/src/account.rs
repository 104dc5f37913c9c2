use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use rostergate_core::{DomainError, FieldProblem, UserId};

use crate::{RoleSet, roles::default_roles};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    #[default]
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDetails {
    pub is_active: bool,
}

impl Default for PlayerDetails {
    fn default() -> Self {
        Self { is_active: true }
    }
}

/// Durable account record: profile, roles snapshot and approval state.
///
/// `version` is the optimistic-concurrency token maintained by the document
/// store; it is never part of the serialized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub uid: UserId,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<u8>,
    pub roles: RoleSet,
    pub approval_status: ApprovalStatus,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub player_details: PlayerDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: u64,
}

/// Outcome of the approval rule for an existing account.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    #[error("account not found")]
    AccountNotFound,

    #[error("account is pending approval")]
    AccountPending,

    #[error("account was rejected")]
    AccountRejected { rejection_reason: Option<String> },
}

impl ApprovalError {
    pub fn code(&self) -> &'static str {
        match self {
            ApprovalError::AccountNotFound => "account_not_found",
            ApprovalError::AccountPending => "account_pending",
            ApprovalError::AccountRejected { .. } => "account_rejected",
        }
    }
}

impl Account {
    /// Fresh account as created by registration: pending, default roles.
    pub fn register(uid: UserId, registration: &ValidRegistration, now: DateTime<Utc>) -> Self {
        Self {
            uid,
            email: registration.email.clone(),
            display_name: registration.display_name.clone(),
            phone_number: Some(registration.phone_number.clone()),
            date_of_birth: Some(registration.date_of_birth),
            jersey_number: Some(registration.jersey_number),
            roles: default_roles(),
            approval_status: ApprovalStatus::Pending,
            email_verified: false,
            subscription_status: SubscriptionStatus::Inactive,
            last_login: None,
            player_details: PlayerDetails::default(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Bare pending account with no profile details (operator-created accounts).
    pub fn bootstrap(uid: UserId, email: String, now: DateTime<Utc>) -> Self {
        Self {
            uid,
            email,
            display_name: String::new(),
            phone_number: None,
            date_of_birth: None,
            jersey_number: None,
            roles: default_roles(),
            approval_status: ApprovalStatus::Pending,
            email_verified: false,
            subscription_status: SubscriptionStatus::Inactive,
            last_login: None,
            player_details: PlayerDetails::default(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }

    /// Sessions may only be created or validated for approved accounts.
    pub fn ensure_approved(&self) -> Result<(), ApprovalError> {
        match self.approval_status {
            ApprovalStatus::Approved => Ok(()),
            ApprovalStatus::Pending => Err(ApprovalError::AccountPending),
            ApprovalStatus::Rejected => Err(ApprovalError::AccountRejected {
                rejection_reason: self.rejection_reason.clone(),
            }),
        }
    }

    /// Advance `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
    }

    pub fn approve(&mut self, by: &UserId, now: DateTime<Utc>) {
        self.approval_status = ApprovalStatus::Approved;
        self.approved_by = Some(by.clone());
        self.approved_at = Some(now);
        self.rejection_reason = None;
        self.touch(now);
    }

    pub fn reject(&mut self, by: &UserId, reason: Option<String>, now: DateTime<Utc>) {
        self.approval_status = ApprovalStatus::Rejected;
        self.approved_by = Some(by.clone());
        self.approved_at = Some(now);
        self.rejection_reason = reason;
        self.touch(now);
    }

    pub fn record_login(&mut self, now: DateTime<Utc>) {
        self.last_login = Some(now);
        self.touch(now);
    }

    /// Apply the profile part of a patch. Authorization-sensitive fields are
    /// handled by the caller.
    pub fn apply_profile(&mut self, patch: &AccountPatch) {
        if let Some(name) = &patch.display_name {
            self.display_name = name.trim().to_string();
        }
        if let Some(phone) = &patch.phone_number {
            self.phone_number = Some(phone.clone());
        }
        if let Some(jersey) = patch.jersey_number {
            // shape-validated to 1..=99 before this point
            self.jersey_number = u8::try_from(jersey).ok();
        }
        if let Some(details) = &patch.player_details {
            self.player_details = details.clone();
        }
    }
}

/// Raw registration payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, alias = "phoneNumber")]
    pub phone: String,
    #[serde(default)]
    pub jersey_number: Option<i64>,
    #[serde(default)]
    pub date_of_birth: String,
}

/// Registration that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub phone_number: String,
    pub date_of_birth: NaiveDate,
    pub jersey_number: u8,
}

pub const MIN_PASSWORD_LEN: usize = 6;

impl Registration {
    pub fn validate(&self) -> Result<ValidRegistration, DomainError> {
        let mut problems = Vec::new();

        let email = self.email.trim().to_ascii_lowercase();
        if !is_email(&email) {
            problems.push(FieldProblem::new("email", "must be a valid email address"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            problems.push(FieldProblem::new(
                "password",
                format!("must be at least {MIN_PASSWORD_LEN} characters"),
            ));
        }
        if !is_phone(&self.phone) {
            problems.push(FieldProblem::new("phone", "must be exactly 10 digits"));
        }
        let jersey = match self.jersey_number {
            Some(n) if (1..=99).contains(&n) => n as u8,
            _ => {
                problems.push(FieldProblem::new("jerseyNumber", "must be between 1 and 99"));
                0
            }
        };
        let dob = NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d").ok();
        if dob.is_none() {
            problems.push(FieldProblem::new("dateOfBirth", "must be a date in YYYY-MM-DD format"));
        }
        let display_name = self.display_name.as_deref().unwrap_or("").trim().to_string();
        if !display_name.is_empty() {
            if let Err(p) = check_display_name(&display_name) {
                problems.push(p);
            }
        }

        match dob {
            Some(date_of_birth) if problems.is_empty() => Ok(ValidRegistration {
                email,
                password: self.password.clone(),
                display_name,
                phone_number: self.phone.clone(),
                date_of_birth,
                jersey_number: jersey,
            }),
            _ => Err(DomainError::Validation(problems)),
        }
    }
}

/// Partial update of an account.
///
/// Carries the authorization-sensitive fields too so that their mere presence
/// can be detected and rejected for non-admin requesters. Those fields are
/// `Some(None)` when the key is sent with an explicit `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountPatch {
    pub display_name: Option<String>,
    pub phone_number: Option<String>,
    pub jersey_number: Option<i64>,
    pub player_details: Option<PlayerDetails>,
    #[serde(default, deserialize_with = "present")]
    pub roles: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "present")]
    pub approval_status: Option<Option<ApprovalStatus>>,
    #[serde(default, deserialize_with = "present")]
    pub email_verified: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present")]
    pub uid: Option<Option<String>>,
}

/// Key present in the body, with or without a value.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl AccountPatch {
    /// Names of the authorization-sensitive fields present in this patch.
    pub fn sensitive_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.roles.is_some() {
            fields.push("roles");
        }
        if self.approval_status.is_some() {
            fields.push("approvalStatus");
        }
        if self.email_verified.is_some() {
            fields.push("emailVerified");
        }
        if self.uid.is_some() {
            fields.push("uid");
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        *self == AccountPatch::default()
    }

    /// Field-shape validation (no authorization).
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut problems = Vec::new();
        if self.is_empty() {
            problems.push(FieldProblem::new("body", "at least one field must be provided"));
        }
        if let Some(name) = &self.display_name {
            if let Err(p) = check_display_name(name.trim()) {
                problems.push(p);
            }
        }
        if let Some(phone) = &self.phone_number {
            if !is_phone(phone) {
                problems.push(FieldProblem::new("phoneNumber", "must be exactly 10 digits"));
            }
        }
        if let Some(jersey) = self.jersey_number {
            if !(1..=99).contains(&jersey) {
                problems.push(FieldProblem::new("jerseyNumber", "must be between 1 and 99"));
            }
        }
        if let Some(roles) = &self.roles {
            if roles.as_ref().is_none_or(Vec::is_empty) {
                problems.push(FieldProblem::new("roles", "must contain at least one role"));
            }
        }
        for (field, null) in [
            ("approvalStatus", self.approval_status == Some(None)),
            ("emailVerified", self.email_verified == Some(None)),
            ("uid", self.uid == Some(None)),
        ] {
            if null {
                problems.push(FieldProblem::new(field, "must not be null"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(problems))
        }
    }
}

fn check_display_name(name: &str) -> Result<(), FieldProblem> {
    let len = name.chars().count();
    if (2..=50).contains(&len) {
        Ok(())
    } else {
        Err(FieldProblem::new("displayName", "must be between 2 and 50 characters"))
    }
}

fn is_phone(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    }
}
