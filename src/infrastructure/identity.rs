//! 会话身份与用户目录的内存实现

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::domain::model::{SenderIdentity, UserProfile};
use crate::domain::repository::{IdentityProvider, UserDirectory};
use crate::error::StoreError;

/// 静态身份提供方（登录 / 登出由外部驱动）
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    identity: RwLock<Option<SenderIdentity>>,
}

impl StaticIdentityProvider {
    pub fn new(identity: Option<SenderIdentity>) -> Self {
        Self {
            identity: RwLock::new(identity),
        }
    }

    pub fn sign_in(&self, identity: SenderIdentity) {
        tracing::info!(sender_id = %identity.sender_id, "Signed in");
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    pub fn sign_out(&self) {
        tracing::info!("Signed out");
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn current_identity(&self) -> Option<SenderIdentity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 内存用户目录
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, UserProfile>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增或覆盖用户资料
    pub fn upsert(&self, profile: UserProfile) {
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(profile.user_id.clone(), profile);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(user_id).cloned())
    }

    async fn contacts(&self, exclude_user_id: &str) -> Result<Vec<UserProfile>, StoreError> {
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        let mut contacts: Vec<UserProfile> = users
            .values()
            .filter(|user| user.user_id != exclude_user_id)
            .cloned()
            .collect();
        contacts.sort_by(|a, b| {
            a.user_id
                .cmp(&b.user_id)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        Ok(contacts)
    }
}
