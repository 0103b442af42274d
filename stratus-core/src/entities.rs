//! User aggregate and its projections.

use crate::{TenantId, Timestamp, UserId, ValidationError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Age in whole years on `on`. Zero when `on` precedes the birth date.
    pub fn age_on(&self, on: NaiveDate) -> i32 {
        let mut age = on.year() - self.date_of_birth.year();
        if (on.month(), on.day()) < (self.date_of_birth.month(), self.date_of_birth.day()) {
            age -= 1;
        }
        age.max(0)
    }

    /// Read projection as of `on`.
    pub fn view_on(&self, on: NaiveDate) -> UserView {
        UserView {
            id: self.id,
            tenant_id: self.tenant_id,
            full_name: self.full_name(),
            email: self.email.clone(),
            age: self.age_on(on),
        }
    }

    /// Projection written into outbox payloads.
    pub fn change_payload(&self) -> UserChangePayload {
        UserChangePayload {
            id: self.id,
            tenant_id: self.tenant_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Cached read projection of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub full_name: String,
    pub email: String,
    pub age: i32,
}

/// Minimal user projection carried by outbox records. The tenant travels with
/// the record because the relay scans across tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChangePayload {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl UserChangePayload {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Fields supplied when creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_empty("first_name", &self.first_name)?;
        require_non_empty("last_name", &self.last_name)?;
        validate_email(&self.email)
    }

    /// Materialize the row for `tenant_id` at `now`.
    pub fn into_user(self, tenant_id: TenantId, now: Timestamp) -> User {
        User {
            id: UserId::now_v7(),
            tenant_id,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            date_of_birth: self.date_of_birth,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a user. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(first_name) = &self.first_name {
            require_non_empty("first_name", first_name)?;
        }
        if let Some(last_name) = &self.last_name {
            require_non_empty("last_name", last_name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.date_of_birth.is_none()
    }

    /// Apply onto `user`, stamping `updated_at`.
    pub fn apply_to(&self, user: &User, now: Timestamp) -> User {
        let mut updated = user.clone();
        if let Some(first_name) = &self.first_name {
            updated.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = &self.last_name {
            updated.last_name = last_name.trim().to_string();
        }
        if let Some(email) = &self.email {
            updated.email = email.trim().to_string();
        }
        if let Some(date_of_birth) = self.date_of_birth {
            updated.date_of_birth = date_of_birth;
        }
        updated.updated_at = now;
        updated
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), ValidationError> {
    require_non_empty("email", email)?;
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidValue {
            field: "email".to_string(),
            reason: "must look like name@domain".to_string(),
        }),
    }
}
