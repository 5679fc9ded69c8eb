use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::db::models::User;
use crate::db::repo::{page_offset, StoreError, UserStore};

#[derive(Default)]
struct Users {
    next_seq: u64,
    // seq -> id, keeps insertion order for listing
    order: BTreeMap<u64, String>,
    by_id: HashMap<String, (u64, User)>,
}

/// Process-local store. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<RwLock<Users>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.users.read().await.by_id.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: User) -> Result<User, StoreError> {
        if user.id.is_empty() {
            return Err(StoreError::InvalidId);
        }

        let mut users = self.users.write().await;
        if users.by_id.contains_key(&user.id) {
            return Err(StoreError::Conflict(user.id));
        }

        let seq = users.next_seq;
        users.next_seq += 1;
        users.order.insert(seq, user.id.clone());
        users.by_id.insert(user.id.clone(), (seq, user.clone()));
        debug!(id = %user.id, "inserted user");

        Ok(user)
    }

    async fn update(&self, id: &str, patch: User) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let (_, user) = users
            .by_id
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        user.merge(patch);
        debug!(id, "updated user");

        Ok(user.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let (seq, _) = users
            .by_id
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        users.order.remove(&seq);
        debug!(id, "deleted user");

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<User, StoreError> {
        let users = self.users.read().await;
        users
            .by_id
            .get(id)
            .map(|(_, user)| user.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self, page: u32, limit: u32) -> Result<Vec<User>, StoreError> {
        let skip = usize::try_from(page_offset(page, limit)).unwrap_or(usize::MAX);

        let users = self.users.read().await;
        let page = users
            .order
            .values()
            .skip(skip)
            .take(limit as usize)
            .filter_map(|id| users.by_id.get(id).map(|(_, user)| user.clone()))
            .collect();

        Ok(page)
    }
}
