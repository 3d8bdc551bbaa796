//! Composition root value
//!
//! Every external collaborator and repository the handlers and workers
//! touch hangs off one `Services` value constructed in `main`. No module
//! holds process-global clients.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

use crate::auth::TokenVerifier;
use crate::billing::{QuotaEngine, QuotaNotifier};
use crate::bus::MessageBus;
use crate::constraints::CompiledConstraints;
use crate::db::{LogRepository, OwnerUsageMeta, ProjectRepository, UserRepository};
use crate::domain::Project;
use crate::search::SearchIndex;

/// API-key resolution cache TTL
const KEY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Owner usage metadata cache TTL
const USAGE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// A resolved `(project, api key)` pair with its constraints compiled
#[derive(Debug)]
pub struct ResolvedApiKey {
    pub project: Project,
    pub key_id: Uuid,
    pub compiled: CompiledConstraints,
}

/// TTL cache keyed by the literal API-key token
pub struct ApiKeyCache {
    entries: DashMap<String, (Arc<ResolvedApiKey>, Instant)>,
    ttl: Duration,
}

impl ApiKeyCache {
    pub fn new() -> Self {
        ApiKeyCache {
            entries: DashMap::new(),
            ttl: KEY_CACHE_TTL,
        }
    }

    pub fn get(&self, token: &str) -> Option<Arc<ResolvedApiKey>> {
        let hit = self.entries.get(token)?;
        let (resolved, inserted_at) = hit.value();
        if inserted_at.elapsed() > self.ttl {
            drop(hit);
            self.entries.remove(token);
            return None;
        }
        Some(resolved.clone())
    }

    pub fn insert(&self, token: String, resolved: Arc<ResolvedApiKey>) {
        self.entries.insert(token, (resolved, Instant::now()));
    }

    /// Drop every cached resolution into the given project; called after
    /// any mutation of its `api_keys`.
    pub fn invalidate_project(&self, project_id: &str) {
        self.entries
            .retain(|_, (resolved, _)| resolved.project.project_id != project_id);
    }
}

impl Default for ApiKeyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// TTL cache for the owner usage-metadata join
pub struct UsageMetaCache {
    entries: DashMap<String, (OwnerUsageMeta, Instant)>,
    ttl: Duration,
}

impl UsageMetaCache {
    pub fn new() -> Self {
        UsageMetaCache {
            entries: DashMap::new(),
            ttl: USAGE_CACHE_TTL,
        }
    }

    pub fn get(&self, owner_id: &str) -> Option<OwnerUsageMeta> {
        let hit = self.entries.get(owner_id)?;
        let (meta, inserted_at) = hit.value();
        if inserted_at.elapsed() > self.ttl {
            drop(hit);
            self.entries.remove(owner_id);
            return None;
        }
        Some(meta.clone())
    }

    pub fn insert(&self, owner_id: String, meta: OwnerUsageMeta) {
        self.entries.insert(owner_id, (meta, Instant::now()));
    }
}

impl Default for UsageMetaCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the handlers and workers depend on
pub struct Services {
    pub logs: LogRepository,
    pub projects: ProjectRepository,
    pub users: UserRepository,
    pub index: Arc<dyn SearchIndex>,
    pub bus: Arc<dyn MessageBus>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub quota: QuotaEngine,
    pub notifier: Arc<QuotaNotifier>,
    pub key_cache: ApiKeyCache,
    pub usage_cache: UsageMetaCache,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::project::ApiKeyConstraints;
    use chrono::Utc;

    fn resolved(project_id: &str) -> Arc<ResolvedApiKey> {
        Arc::new(ResolvedApiKey {
            project: Project {
                id: Uuid::new_v4(),
                project_id: project_id.into(),
                owner_id: "owner-1".into(),
                users: vec![],
                api_keys: vec![],
                alarms: vec![],
                version: 1,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            key_id: Uuid::new_v4(),
            compiled: CompiledConstraints::compile(&ApiKeyConstraints::default()),
        })
    }

    #[test]
    fn key_cache_round_trips_and_invalidates_by_project() {
        let cache = ApiKeyCache::new();
        cache.insert("token-a".into(), resolved("acme-api"));
        cache.insert("token-b".into(), resolved("other"));

        assert!(cache.get("token-a").is_some());
        cache.invalidate_project("acme-api");
        assert!(cache.get("token-a").is_none());
        assert!(cache.get("token-b").is_some());
    }
}
