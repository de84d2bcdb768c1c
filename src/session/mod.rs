//! On-device session state: credentials, the signed-in profile and the last
//! good deliveries snapshot, kept in one versioned JSON document.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::AppError;
use crate::lifecycle::ActorRef;
use crate::models::delivery::Delivery;
use crate::models::user::User;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedDeliveries {
    pub owner_id: Option<String>,
    pub saved_at: DateTime<Utc>,
    pub items: Vec<Delivery>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub schema_version: u32,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub deliveries: Option<CachedDeliveries>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            token: None,
            user: None,
            deliveries: None,
        }
    }
}

pub struct SessionStore {
    path: Option<PathBuf>,
    inner: RwLock<Session>,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let session = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|err| {
                AppError::Internal(format!("failed to read {}: {err}", path.display()))
            })?;
            decode(&raw)?
        } else {
            Session::default()
        };

        let store = Self {
            path: Some(path),
            inner: RwLock::new(session),
        };
        store.persist(&store.read())?;
        Ok(store)
    }

    /// A session that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: RwLock::new(Session::default()),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn actor(&self) -> Result<ActorRef, AppError> {
        self.read()
            .user
            .as_ref()
            .map(|user| ActorRef {
                role: user.role,
                id: user.id.clone(),
            })
            .ok_or_else(|| AppError::Unauthorized("sign in required".to_string()))
    }

    pub fn sign_in(&self, token: String, user: User) -> Result<(), AppError> {
        let mut session = self.write();
        let same_owner = session
            .deliveries
            .as_ref()
            .is_some_and(|cached| cached.owner_id.as_deref() == Some(user.id.as_str()));
        if !same_owner {
            session.deliveries = None;
        }
        session.token = Some(token);
        session.user = Some(user);
        self.persist(&session)
    }

    pub fn clear_credentials(&self) -> Result<(), AppError> {
        let mut session = self.write();
        session.token = None;
        session.user = None;
        self.persist(&session)
    }

    pub fn cached_deliveries(&self) -> Option<CachedDeliveries> {
        self.read().deliveries.clone()
    }

    pub fn cache_deliveries(&self, items: &[Delivery]) -> Result<(), AppError> {
        let mut session = self.write();
        session.deliveries = Some(CachedDeliveries {
            owner_id: session.user.as_ref().map(|user| user.id.clone()),
            saved_at: Utc::now(),
            items: items.to_vec(),
        });
        self.persist(&session)
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, session: &Session) -> Result<(), AppError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let body = serde_json::to_vec_pretty(session)
            .map_err(|err| AppError::Internal(format!("failed to encode session: {err}")))?;
        write_atomically(path, &body)
    }
}

fn write_atomically(path: &Path, body: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            AppError::Internal(format!("failed to create {}: {err}", parent.display()))
        })?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)
        .map_err(|err| AppError::Internal(format!("failed to write {}: {err}", tmp.display())))?;
    fs::rename(&tmp, path)
        .map_err(|err| AppError::Internal(format!("failed to replace {}: {err}", path.display())))
}

fn decode(raw: &str) -> Result<Session, AppError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| AppError::Internal(format!("session file is not json: {err}")))?;

    match value.get("schemaVersion").and_then(Value::as_u64) {
        Some(version) if version > u64::from(SCHEMA_VERSION) => Err(AppError::Internal(format!(
            "session schema version {version} is newer than supported version {SCHEMA_VERSION}"
        ))),
        Some(_) => serde_json::from_value(value)
            .map_err(|err| AppError::Internal(format!("invalid session file: {err}"))),
        None => Ok(migrate_legacy(&value)),
    }
}

/// The unversioned layout stored each entry under a fixed key, with the
/// profile and deliveries list as JSON-encoded strings.
fn migrate_legacy(value: &Value) -> Session {
    let token = value
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string);

    let user: Option<User> = value.get("user").and_then(|raw| decode_embedded(raw, "user"));
    let items: Option<Vec<Delivery>> = value
        .get("deliveries")
        .and_then(|raw| decode_embedded(raw, "deliveries"));

    info!(
        has_token = token.is_some(),
        has_user = user.is_some(),
        cached_deliveries = items.as_ref().map_or(0, Vec::len),
        "migrated legacy session layout"
    );

    Session {
        schema_version: SCHEMA_VERSION,
        token,
        deliveries: items.map(|items| CachedDeliveries {
            owner_id: user.as_ref().map(|user| user.id.clone()),
            saved_at: Utc::now(),
            items,
        }),
        user,
    }
}

fn decode_embedded<T>(raw: &Value, key: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    let decoded = match raw {
        Value::String(text) => serde_json::from_str(text),
        Value::Null => return None,
        other => serde_json::from_value(other.clone()),
    };

    match decoded {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "dropping unreadable legacy session entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::{SessionStore, SCHEMA_VERSION};
    use crate::models::user::{Role, User};

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            name: "Ravi".to_string(),
            email: "ravi@example.com".to_string(),
            role: Role::Driver,
            phone: None,
        }
    }

    #[test]
    fn sign_in_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = SessionStore::open(&path).unwrap();
        store.sign_in("tok-1".to_string(), user("u-1")).unwrap();
        drop(store);

        let reopened = SessionStore::open(&path).unwrap();
        assert_eq!(reopened.token().as_deref(), Some("tok-1"));
        assert_eq!(reopened.actor().unwrap().role, Role::Driver);
    }

    #[test]
    fn clearing_credentials_requires_new_sign_in() {
        let store = SessionStore::in_memory();
        store.sign_in("tok-1".to_string(), user("u-1")).unwrap();
        store.clear_credentials().unwrap();

        assert!(store.token().is_none());
        assert!(store.actor().is_err());
    }

    #[test]
    fn migrates_legacy_string_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let legacy_user = json!({
            "_id": "u-7", "name": "Meera", "email": "meera@example.com", "role": "admin"
        });
        std::fs::write(
            &path,
            json!({
                "token": "legacy-token",
                "user": legacy_user.to_string(),
                "deliveries": "not json at all"
            })
            .to_string(),
        )
        .unwrap();

        let store = SessionStore::open(&path).unwrap();
        let session = store.snapshot();

        assert_eq!(session.schema_version, SCHEMA_VERSION);
        assert_eq!(session.token.as_deref(), Some("legacy-token"));
        assert_eq!(session.user.unwrap().role, Role::Admin);
        assert!(session.deliveries.is_none());

        let rewritten: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["schemaVersion"], SCHEMA_VERSION);
    }

    #[test]
    fn refuses_newer_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, json!({ "schemaVersion": 99 }).to_string()).unwrap();

        assert!(SessionStore::open(&path).is_err());
    }

    #[test]
    fn switching_user_drops_previous_cache() {
        let store = SessionStore::in_memory();
        store.sign_in("tok-1".to_string(), user("u-1")).unwrap();
        store.cache_deliveries(&[]).unwrap();
        assert!(store.cached_deliveries().is_some());

        store.sign_in("tok-2".to_string(), user("u-1")).unwrap();
        assert!(store.cached_deliveries().is_some());

        store.sign_in("tok-3".to_string(), user("u-2")).unwrap();
        assert!(store.cached_deliveries().is_none());
    }
}
