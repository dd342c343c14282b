//! Id tag authorization port

use dashmap::DashMap;
use tracing::debug;

use crate::domain::{AuthorizationInfo, AuthorizationStatus, ClientIdentity};

/// Looks up the authorization status of an id tag / id token.
pub trait IdTagAuthorizer: Send + Sync {
    fn authorize(&self, charge_point: &ClientIdentity, id_tag: &str) -> AuthorizationInfo;
}

/// Id tag list held in memory
#[derive(Debug, Default)]
pub struct InMemoryIdTagStore {
    tags: DashMap<String, AuthorizationInfo>,
    accept_unknown: bool,
}

impl InMemoryIdTagStore {
    /// `accept_unknown` decides the status of tags that are not on the list.
    pub fn new(accept_unknown: bool) -> Self {
        Self {
            tags: DashMap::new(),
            accept_unknown,
        }
    }

    pub fn insert(&self, id_tag: impl Into<String>, info: AuthorizationInfo) {
        self.tags.insert(id_tag.into(), info);
    }

    pub fn set_status(&self, id_tag: impl Into<String>, status: AuthorizationStatus) {
        self.insert(id_tag, AuthorizationInfo::with_status(status));
    }

    pub fn remove(&self, id_tag: &str) -> Option<AuthorizationInfo> {
        self.tags.remove(id_tag).map(|(_, info)| info)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl IdTagAuthorizer for InMemoryIdTagStore {
    fn authorize(&self, charge_point: &ClientIdentity, id_tag: &str) -> AuthorizationInfo {
        let info = match self.tags.get(id_tag) {
            Some(info) => info.clone(),
            None if self.accept_unknown => AuthorizationInfo::with_status(AuthorizationStatus::Accepted),
            None => AuthorizationInfo::with_status(AuthorizationStatus::Invalid),
        };
        debug!(
            charge_point_id = charge_point.charge_point_id(),
            id_tag,
            status = %info.status,
            "Id tag authorization"
        );
        info
    }
}
