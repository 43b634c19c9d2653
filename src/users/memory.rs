//! In-process user store for `--memory` dev mode and tests.

use super::{CreateOutcome, NewUser, UpdateOutcome, UserChanges, UserRecord, UserStore};
use crate::auth::password::StoredPassword;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    rows: BTreeMap<i64, UserRecord>,
}

impl Inner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|row| row.email == email && Some(row.id) != except)
    }

    fn insert(
        &mut self,
        first_name: String,
        last_name: String,
        email: String,
        password: StoredPassword,
    ) -> UserRecord {
        self.next_id += 1;
        let record = UserRecord {
            id: self.next_id,
            email,
            first_name,
            last_name,
            password,
        };
        self.rows.insert(record.id, record.clone());
        record
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with a plaintext password, as imported from the legacy system.
    ///
    /// Returns `None` if the email is already registered.
    pub async fn insert_legacy(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        plaintext: &str,
    ) -> Option<UserRecord> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(email, None) {
            return None;
        }
        Some(inner.insert(
            first_name.to_string(),
            last_name.to_string(),
            email.to_string(),
            StoredPassword::Legacy(plaintext.to_string()),
        ))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().find(|row| row.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        Ok(self.inner.read().await.rows.values().cloned().collect())
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let mut inner = self.inner.write().await;
        if inner.email_taken(&user.email, None) {
            return Ok(CreateOutcome::EmailTaken);
        }
        Ok(CreateOutcome::Created(inner.insert(
            user.first_name,
            user.last_name,
            user.email,
            StoredPassword::Hashed(user.password_hash),
        )))
    }

    async fn update(&self, id: i64, changes: UserChanges) -> Result<UpdateOutcome> {
        let mut inner = self.inner.write().await;
        if !inner.rows.contains_key(&id) {
            return Ok(UpdateOutcome::NotFound);
        }
        if let Some(email) = changes.email.as_deref() {
            if inner.email_taken(email, Some(id)) {
                return Ok(UpdateOutcome::EmailTaken);
            }
        }
        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if let Some(first_name) = changes.first_name {
            row.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            row.last_name = last_name;
        }
        if let Some(email) = changes.email {
            row.email = email;
        }
        if let Some(hash) = changes.password_hash {
            row.password = StoredPassword::Hashed(hash);
        }
        Ok(UpdateOutcome::Updated(row.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.inner.write().await.rows.remove(&id).is_some())
    }

    async fn upgrade_password(&self, id: i64, hash: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.rows.get_mut(&id) {
            Some(row) if !row.password.is_hashed() => {
                row.password = StoredPassword::Hashed(hash.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn legacy_passwords(&self) -> Result<Vec<(i64, String)>> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .filter(|row| !row.password.is_hashed())
            .map(|row| (row.id, row.password.as_str().to_string()))
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.create(new_user("ada@example.com")).await.unwrap(),
            CreateOutcome::Created(_)
        ));
        assert!(matches!(
            store.create(new_user("ada@example.com")).await.unwrap(),
            CreateOutcome::EmailTaken
        ));
    }

    #[tokio::test]
    async fn ids_increase_and_list_is_ordered() {
        let store = MemoryUserStore::new();
        store.create(new_user("b@example.com")).await.unwrap();
        store.create(new_user("a@example.com")).await.unwrap();
        let ids: Vec<i64> = store.list().await.unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn email_lookup_is_case_sensitive() {
        let store = MemoryUserStore::new();
        store.create(new_user("ada@example.com")).await.unwrap();
        assert!(store.find_by_email("ADA@example.com").await.unwrap().is_none());
        assert!(store.find_by_email("ada@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_checks_email_conflicts_and_missing_rows() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();
        store.create(new_user("b@example.com")).await.unwrap();

        let changes = UserChanges {
            email: Some("a@example.com".to_string()),
            ..UserChanges::default()
        };
        assert!(matches!(
            store.update(2, changes.clone()).await.unwrap(),
            UpdateOutcome::EmailTaken
        ));
        assert!(matches!(
            store.update(1, changes).await.unwrap(),
            UpdateOutcome::Updated(_)
        ));
        assert!(matches!(
            store.update(99, UserChanges::default()).await.unwrap(),
            UpdateOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn update_of_missing_row_wins_over_email_conflict() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();

        let changes = UserChanges {
            email: Some("a@example.com".to_string()),
            ..UserChanges::default()
        };
        assert!(matches!(
            store.update(99, changes).await.unwrap(),
            UpdateOutcome::NotFound
        ));
    }

    #[tokio::test]
    async fn upgrade_only_touches_legacy_rows() {
        let store = MemoryUserStore::new();
        let legacy = store
            .insert_legacy("A", "B", "a@b.com", "hunter2")
            .await
            .unwrap();
        assert_eq!(store.legacy_passwords().await.unwrap().len(), 1);

        assert!(store.upgrade_password(legacy.id, "$argon2id$x").await.unwrap());
        assert!(!store.upgrade_password(legacy.id, "$argon2id$y").await.unwrap());

        let row = store.find_by_id(legacy.id).await.unwrap().unwrap();
        assert_eq!(row.password, StoredPassword::Hashed("$argon2id$x".to_string()));
        assert_eq!(row.first_name, "A");
        assert!(store.legacy_passwords().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@example.com")).await.unwrap();
        assert!(store.delete(1).await.unwrap());
        assert!(!store.delete(1).await.unwrap());
    }
}
