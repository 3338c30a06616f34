//! Profile cache.
//!
//! Session extraction needs the current user on every request. Profiles are
//! cached per user id for a short TTL and invalidated explicitly whenever a
//! profile changes or its session ends. The cache is an ordinary value shared
//! through `web::Data`, not a global.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::models::User;

struct CachedProfile {
    user: User,
    stored_at: Instant,
}

pub struct ProfileCache {
    ttl: Duration,
    entries: RwLock<HashMap<i32, CachedProfile>>,
}

impl ProfileCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a fresh cached profile, dropping it if it has expired
    pub fn get(&self, user_id: i32) -> Option<User> {
        {
            let entries = self.read();
            match entries.get(&user_id) {
                Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                    return Some(entry.user.clone())
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.write().remove(&user_id);
        None
    }

    pub fn insert(&self, user: User) {
        self.write().insert(
            user.id,
            CachedProfile {
                user,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, user_id: i32) {
        if self.write().remove(&user_id).is_some() {
            log::debug!("Invalidated cached profile for user {}", user_id);
        }
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i32, CachedProfile>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i32, CachedProfile>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
