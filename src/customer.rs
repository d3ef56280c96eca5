// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Customer accounts, credentials and profile completeness.

use crate::base::CustomerId;
use crate::error::{Entity, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

const MIN_PASSWORD_LEN: usize = 6;

fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    use argon2::password_hash::SaltString;
    use argon2::password_hash::rand_core::OsRng;
    use argon2::{Argon2, PasswordHasher};
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Sign-up input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub email: String,
    pub username: String,
    pub address: String,
    pub password: String,
}

impl NewCustomer {
    pub fn validate(&self) -> Result<(), StoreError> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(StoreError::invalid("a valid email is required"));
        }
        if self.username.trim().chars().count() < 2 {
            return Err(StoreError::invalid("username must be at least 2 characters"));
        }
        if self.address.trim().chars().count() < 4 {
            return Err(StoreError::invalid("address must be at least 4 characters"));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(StoreError::invalid("password must be at least 6 characters"));
        }
        Ok(())
    }
}

/// Editable profile fields. `None` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Profile {
    pub address: Option<String>,
    pub phone: Option<String>,
    pub sex: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Customer {
    id: CustomerId,
    email: String,
    username: String,
    profile: Profile,
    password_hash: Option<String>,
    is_admin: bool,
    date_joined: DateTime<Utc>,
}

impl Customer {
    pub fn id(&self) -> CustomerId {
        self.id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn address(&self) -> Option<&str> {
        self.profile.address.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn date_joined(&self) -> DateTime<Utc> {
        self.date_joined
    }

    /// Checkout needs sex, date of birth and a phone number on file.
    pub fn is_profile_complete(&self) -> bool {
        let present = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.profile.sex) && self.profile.date_of_birth.is_some() && present(&self.profile.phone)
    }

    /// Returns `false` when no password has ever been set.
    pub fn verify_password(&self, password: &str) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(password, hash))
    }

    fn summary(&self) -> CustomerSummary {
        CustomerSummary {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            address: self.profile.address.clone(),
            phone: self.profile.phone.clone(),
            is_admin: self.is_admin,
            profile_complete: self.is_profile_complete(),
            date_joined: self.date_joined,
        }
    }
}

/// Admin-facing view of an account. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub email: String,
    pub username: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub profile_complete: bool,
    pub date_joined: DateTime<Utc>,
}

/// Registry of customer accounts.
#[derive(Debug)]
pub struct Customers {
    accounts: DashMap<CustomerId, Customer>,
    /// Normalized email to account, for uniqueness and login.
    emails: DashMap<String, CustomerId>,
    next_id: AtomicU32,
}

impl Customers {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            emails: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Creates an account.
    ///
    /// # Errors
    ///
    /// [`StoreError::ValidationFailed`] for malformed input or an email that is
    /// already registered.
    pub fn register(&self, new: NewCustomer) -> Result<CustomerId, StoreError> {
        new.validate()?;
        let password_hash =
            hash_password(&new.password).map_err(|_| StoreError::invalid("password could not be hashed"))?;

        // Entry API makes the uniqueness check and the insert one step.
        match self.emails.entry(normalize_email(&new.email)) {
            Entry::Occupied(_) => Err(StoreError::invalid("email already registered")),
            Entry::Vacant(entry) => {
                let id = CustomerId(self.next_id.fetch_add(1, Ordering::SeqCst));
                self.accounts.insert(
                    id,
                    Customer {
                        id,
                        email: new.email.trim().to_string(),
                        username: new.username.trim().to_string(),
                        profile: Profile {
                            address: Some(new.address.trim().to_string()),
                            ..Profile::default()
                        },
                        password_hash: Some(password_hash),
                        is_admin: false,
                        date_joined: Utc::now(),
                    },
                );
                entry.insert(id);
                Ok(id)
            }
        }
    }

    /// Resolves login credentials to an account.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<CustomerId, StoreError> {
        let id = self
            .emails
            .get(&normalize_email(email))
            .map(|entry| *entry.value())
            .ok_or(StoreError::Unauthenticated)?;
        let customer = self.get(id).ok_or(StoreError::Unauthenticated)?;
        if customer.verify_password(password) {
            Ok(id)
        } else {
            Err(StoreError::Unauthenticated)
        }
    }

    pub fn change_password(&self, id: CustomerId, current: &str, new: &str) -> Result<(), StoreError> {
        if new.chars().count() < MIN_PASSWORD_LEN {
            return Err(StoreError::invalid("password must be at least 6 characters"));
        }
        // Hashing is slow; no map guard is held while it runs.
        let verified = self.require(id)?.password_hash;
        if !verified
            .as_deref()
            .is_some_and(|hash| verify_password(current, hash))
        {
            return Err(StoreError::Forbidden);
        }
        let hash = hash_password(new).map_err(|_| StoreError::invalid("password could not be hashed"))?;

        let mut customer = self
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Entity::Customer))?;
        // A concurrent change invalidated the password we checked.
        if customer.password_hash != verified {
            return Err(StoreError::Forbidden);
        }
        customer.password_hash = Some(hash);
        Ok(())
    }

    pub fn update_profile(&self, id: CustomerId, profile: Profile) -> Result<(), StoreError> {
        let mut customer = self
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Entity::Customer))?;
        customer.profile = profile;
        Ok(())
    }

    pub fn set_admin(&self, id: CustomerId, is_admin: bool) -> Result<(), StoreError> {
        let mut customer = self
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::NotFound(Entity::Customer))?;
        customer.is_admin = is_admin;
        Ok(())
    }

    /// Returns a copy of the account; the map guard is not held.
    pub fn get(&self, id: CustomerId) -> Option<Customer> {
        self.accounts.get(&id).map(|entry| entry.value().clone())
    }

    pub fn require(&self, id: CustomerId) -> Result<Customer, StoreError> {
        self.get(id).ok_or(StoreError::NotFound(Entity::Customer))
    }

    pub fn remove(&self, id: CustomerId) -> Result<Customer, StoreError> {
        let (_, customer) = self
            .accounts
            .remove(&id)
            .ok_or(StoreError::NotFound(Entity::Customer))?;
        self.emails.remove(&normalize_email(&customer.email));
        Ok(customer)
    }

    /// Every account, ordered by ID.
    pub fn list(&self) -> Vec<CustomerSummary> {
        let mut summaries: Vec<CustomerSummary> =
            self.accounts.iter().map(|entry| entry.value().summary()).collect();
        summaries.sort_by_key(|c| c.id);
        summaries
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl Default for Customers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewCustomer {
        NewCustomer {
            email: "Alice@Example.com".into(),
            username: "alice".into(),
            address: "12 Market Street".into(),
            password: "secret123".into(),
        }
    }

    #[test]
    fn register_and_authenticate() {
        let customers = Customers::new();
        let id = customers.register(alice()).unwrap();

        assert_eq!(customers.authenticate("alice@example.com", "secret123"), Ok(id));
        assert_eq!(
            customers.authenticate("alice@example.com", "wrong-password"),
            Err(StoreError::Unauthenticated)
        );
        assert_eq!(
            customers.authenticate("bob@example.com", "secret123"),
            Err(StoreError::Unauthenticated)
        );
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let customers = Customers::new();
        customers.register(alice()).unwrap();

        let mut again = alice();
        again.email = " alice@EXAMPLE.com".into();
        assert!(matches!(
            customers.register(again),
            Err(StoreError::ValidationFailed(_))
        ));
        assert_eq!(customers.len(), 1);
    }

    #[test]
    fn short_password_is_rejected() {
        let customers = Customers::new();
        let mut new = alice();
        new.password = "123".into();
        assert!(matches!(customers.register(new), Err(StoreError::ValidationFailed(_))));
    }

    #[test]
    fn profile_completeness_requires_sex_birth_date_and_phone() {
        let customers = Customers::new();
        let id = customers.register(alice()).unwrap();
        assert!(!customers.require(id).unwrap().is_profile_complete());

        let mut profile = Profile {
            address: Some("12 Market Street".into()),
            phone: Some("0712345678".into()),
            sex: Some("F".into()),
            date_of_birth: None,
            profile_picture: None,
        };
        customers.update_profile(id, profile.clone()).unwrap();
        assert!(!customers.require(id).unwrap().is_profile_complete());

        profile.date_of_birth = NaiveDate::from_ymd_opt(1990, 4, 2);
        customers.update_profile(id, profile.clone()).unwrap();
        assert!(customers.require(id).unwrap().is_profile_complete());

        profile.phone = Some("   ".into());
        customers.update_profile(id, profile).unwrap();
        assert!(!customers.require(id).unwrap().is_profile_complete());
    }

    #[test]
    fn change_password_requires_current_password() {
        let customers = Customers::new();
        let id = customers.register(alice()).unwrap();

        assert_eq!(
            customers.change_password(id, "nope", "another-secret"),
            Err(StoreError::Forbidden)
        );
        customers.change_password(id, "secret123", "another-secret").unwrap();
        assert_eq!(customers.authenticate("alice@example.com", "another-secret"), Ok(id));
    }

    #[test]
    fn racing_password_changes_from_same_password_succeed_once() {
        let customers = Customers::new();
        let id = customers.register(alice()).unwrap();

        let results: Vec<Result<(), StoreError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["first-secret", "second-secret"]
                .into_iter()
                .map(|new| {
                    let customers = &customers;
                    scope.spawn(move || customers.change_password(id, "secret123", new))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.contains(&Err(StoreError::Forbidden)));
        assert_eq!(
            customers.authenticate("alice@example.com", "secret123"),
            Err(StoreError::Unauthenticated)
        );
        let winner = if results[0].is_ok() { "first-secret" } else { "second-secret" };
        assert_eq!(customers.authenticate("alice@example.com", winner), Ok(id));
    }

    #[test]
    fn remove_frees_the_email() {
        let customers = Customers::new();
        let id = customers.register(alice()).unwrap();
        customers.remove(id).unwrap();

        assert!(customers.get(id).is_none());
        assert!(customers.register(alice()).is_ok());
    }

    #[test]
    fn summaries_hide_credentials_and_are_ordered() {
        let customers = Customers::new();
        customers.register(alice()).unwrap();
        let mut bob = alice();
        bob.email = "bob@example.com".into();
        customers.register(bob).unwrap();

        let list = customers.list();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, CustomerId(1));
        assert_eq!(list[1].email, "bob@example.com");
    }
}
