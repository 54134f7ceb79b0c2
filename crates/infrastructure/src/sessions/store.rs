use rand::rngs::OsRng;
use rand::RngCore;
use redb::{Database, ReadableTable, TableDefinition};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use warden_dns_domain::{config::User, DomainError, Session};

/// Current session bucket. Earlier formats are not migrated; a fresh store
/// starts here.
const SESSIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("sessions-2");

/// One day, the refresh cadence floor.
const REFRESH_WINDOW_SECS: u32 = 86_400;

#[derive(Debug, PartialEq, Eq)]
pub enum SessionCheck {
    Ok { username: String },
    Expired,
    NotFound,
}

/// Session store: opaque 32-byte ids mapped to wire-encoded session
/// records in an embedded key-value file.
///
/// All lookups hit an in-memory map mirroring the table (O(1) check); the
/// file is the durable side, written through on every mutation. Expired
/// records are evicted when the store opens.
pub struct SessionStore {
    db: Database,
    cache: Mutex<HashMap<String, Session>>,
    ttl_secs: u32,
}

impl SessionStore {
    pub fn open(path: &Path, ttl_hours: u64) -> Result<Self, DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DomainError::IoError(format!("creating {}: {e}", parent.display())))?;
        }
        let db = Database::create(path)
            .map_err(|e| DomainError::SessionStore(format!("opening {}: {e}", path.display())))?;

        let store = Self {
            db,
            cache: Mutex::new(HashMap::new()),
            ttl_secs: (ttl_hours * 3600).min(u32::MAX as u64) as u32,
        };
        store.load_and_evict()?;
        Ok(store)
    }

    /// Load surviving sessions into memory, dropping expired and corrupt
    /// records from the table.
    fn load_and_evict(&self) -> Result<(), DomainError> {
        let now = unix_now();
        let mut live: HashMap<String, Session> = HashMap::new();
        let mut dead: Vec<Vec<u8>> = Vec::new();

        let read = self
            .db
            .begin_read()
            .map_err(|e| DomainError::SessionStore(e.to_string()))?;
        match read.open_table(SESSIONS) {
            Ok(table) => {
                let iter = table
                    .iter()
                    .map_err(|e| DomainError::SessionStore(e.to_string()))?;
                for entry in iter {
                    let (key, value) = entry.map_err(|e| DomainError::SessionStore(e.to_string()))?;
                    let key_bytes = key.value().to_vec();
                    match Session::decode(value.value()) {
                        Some(session) if !session.is_expired(now) => {
                            live.insert(hex_encode(&key_bytes), session);
                        }
                        Some(_) => dead.push(key_bytes),
                        None => {
                            warn!("Dropping corrupt session record");
                            dead.push(key_bytes);
                        }
                    }
                }
            }
            // First run: the table does not exist yet.
            Err(redb::TableError::TableDoesNotExist(_)) => {}
            Err(e) => return Err(DomainError::SessionStore(e.to_string())),
        }

        if !dead.is_empty() {
            let write = self
                .db
                .begin_write()
                .map_err(|e| DomainError::SessionStore(e.to_string()))?;
            {
                let mut table = write
                    .open_table(SESSIONS)
                    .map_err(|e| DomainError::SessionStore(e.to_string()))?;
                for key in &dead {
                    table
                        .remove(key.as_slice())
                        .map_err(|e| DomainError::SessionStore(e.to_string()))?;
                }
            }
            write
                .commit()
                .map_err(|e| DomainError::SessionStore(e.to_string()))?;
            info!(evicted = dead.len(), "Expired sessions evicted");
        }

        debug!(sessions = live.len(), "Session store loaded");
        *self.cache.lock().unwrap() = live;
        Ok(())
    }

    /// Verify credentials and create a session. The id is the SHA-256 of a
    /// CSPRNG salt, the username, and the stored bcrypt hash — presented as
    /// lowercase hex in the cookie.
    pub fn login(
        &self,
        users: &[User],
        name: &str,
        password: &str,
    ) -> Result<(String, Session), DomainError> {
        let user = users
            .iter()
            .find(|u| u.name == name)
            .ok_or(DomainError::BadCredentials)?;

        let ok = bcrypt::verify(password, &user.password)
            .map_err(|e| DomainError::SessionStore(format!("bcrypt: {e}")))?;
        if !ok {
            return Err(DomainError::BadCredentials);
        }

        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(user.name.as_bytes());
        hasher.update(user.password.as_bytes());
        let id: [u8; 32] = hasher.finalize().into();

        let session = Session {
            username: user.name.clone(),
            expire: unix_now() + self.ttl_secs,
        };
        self.persist(&id, &session)?;

        let id_hex = hex_encode(&id);
        self.cache
            .lock()
            .unwrap()
            .insert(id_hex.clone(), session.clone());

        info!(user = %user.name, "Session created");
        Ok((id_hex, session))
    }

    /// O(1) session check. A surviving session inside the last day of its
    /// life is refreshed, at most once per day (the previous refresh time
    /// is derivable as `expire - ttl`).
    pub fn check(&self, id_hex: &str) -> SessionCheck {
        let now = unix_now();
        let mut cache = self.cache.lock().unwrap();

        let Some(session) = cache.get_mut(id_hex) else {
            return SessionCheck::NotFound;
        };

        if session.is_expired(now) {
            let id = session_key(id_hex);
            cache.remove(id_hex);
            drop(cache);
            if let Some(id) = id {
                let _ = self.remove_record(&id);
            }
            return SessionCheck::Expired;
        }

        let within_last_day = session.expire - now <= REFRESH_WINDOW_SECS;
        let last_refresh = session.expire.saturating_sub(self.ttl_secs);
        let refreshed_recently = now.saturating_sub(last_refresh) < REFRESH_WINDOW_SECS;
        if within_last_day && !refreshed_recently {
            session.expire = now + self.ttl_secs;
            let updated = session.clone();
            let username = updated.username.clone();
            drop(cache);
            if let Some(id) = session_key(id_hex) {
                if let Err(e) = self.persist(&id, &updated) {
                    warn!(error = %e, "Session refresh write failed");
                }
            }
            debug!(user = %username, "Session refreshed");
            return SessionCheck::Ok { username };
        }

        SessionCheck::Ok {
            username: session.username.clone(),
        }
    }

    pub fn logout(&self, id_hex: &str) {
        self.cache.lock().unwrap().remove(id_hex);
        if let Some(id) = session_key(id_hex) {
            let _ = self.remove_record(&id);
        }
    }

    pub fn session_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    fn persist(&self, id: &[u8; 32], session: &Session) -> Result<(), DomainError> {
        let write = self
            .db
            .begin_write()
            .map_err(|e| DomainError::SessionStore(e.to_string()))?;
        {
            let mut table = write
                .open_table(SESSIONS)
                .map_err(|e| DomainError::SessionStore(e.to_string()))?;
            table
                .insert(id.as_slice(), session.encode().as_slice())
                .map_err(|e| DomainError::SessionStore(e.to_string()))?;
        }
        write
            .commit()
            .map_err(|e| DomainError::SessionStore(e.to_string()))
    }

    fn remove_record(&self, id: &[u8; 32]) -> Result<(), DomainError> {
        let write = self
            .db
            .begin_write()
            .map_err(|e| DomainError::SessionStore(e.to_string()))?;
        {
            let mut table = write
                .open_table(SESSIONS)
                .map_err(|e| DomainError::SessionStore(e.to_string()))?;
            table
                .remove(id.as_slice())
                .map_err(|e| DomainError::SessionStore(e.to_string()))?;
        }
        write
            .commit()
            .map_err(|e| DomainError::SessionStore(e.to_string()))
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn session_key(id_hex: &str) -> Option<[u8; 32]> {
    if id_hex.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, chunk) in id_hex.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = ((hi << 4) | lo) as u8;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<User> {
        vec![User {
            name: "admin".into(),
            password: bcrypt::hash("hunter2", 4).unwrap(),
        }]
    }

    #[test]
    fn test_login_and_check_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&tmp.path().join("sessions.db"), 720).unwrap();

        let (id, _) = store.login(&users(), "admin", "hunter2").unwrap();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(
            store.check(&id),
            SessionCheck::Ok {
                username: "admin".into()
            }
        );
    }

    #[test]
    fn test_bad_credentials() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&tmp.path().join("sessions.db"), 720).unwrap();
        assert!(matches!(
            store.login(&users(), "admin", "wrong"),
            Err(DomainError::BadCredentials)
        ));
        assert!(matches!(
            store.login(&users(), "ghost", "hunter2"),
            Err(DomainError::BadCredentials)
        ));
    }

    #[test]
    fn test_session_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.db");

        let id = {
            let store = SessionStore::open(&path, 720).unwrap();
            store.login(&users(), "admin", "hunter2").unwrap().0
        };

        let store = SessionStore::open(&path, 720).unwrap();
        assert_eq!(
            store.check(&id),
            SessionCheck::Ok {
                username: "admin".into()
            }
        );
    }

    #[test]
    fn test_expired_sessions_evicted_on_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.db");

        {
            // ttl 0: sessions are born expired
            let store = SessionStore::open(&path, 0).unwrap();
            store.login(&users(), "admin", "hunter2").unwrap();
        }

        let store = SessionStore::open(&path, 720).unwrap();
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn test_expired_check_resets() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&tmp.path().join("sessions.db"), 0).unwrap();
        let (id, _) = store.login(&users(), "admin", "hunter2").unwrap();
        assert_eq!(store.check(&id), SessionCheck::Expired);
        // Gone after the expired check.
        assert_eq!(store.check(&id), SessionCheck::NotFound);
    }

    #[test]
    fn test_unknown_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&tmp.path().join("sessions.db"), 720).unwrap();
        assert_eq!(store.check(&"ab".repeat(32)), SessionCheck::NotFound);
    }
}
