use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use ledgerdesk_core::TenantId;

/// Tenant-isolated key/value store abstraction for disposable read models.
///
/// Every operation takes the tenant explicitly so a projection can never
/// reach across tenants by accident. Read models are rebuildable from the
/// event store, so implementations do not need durability.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    /// Remove one record; no-op when absent.
    fn remove(&self, tenant_id: TenantId, key: &K);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Clear all read-model records for a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn remove(&self, tenant_id: TenantId, key: &K) {
        (**self).remove(tenant_id, key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory tenant-isolated store.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((tenant_id, key), value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&(tenant_id, key.clone()));
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.iter()
            .filter_map(|((t, _k), v)| if *t == tenant_id { Some(v.clone()) } else { None })
            .collect()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _k), _v| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_do_not_see_each_other() {
        let store: InMemoryTenantStore<String, u64> = InMemoryTenantStore::new();
        let a = TenantId::new();
        let b = TenantId::new();

        store.upsert(a, "k".to_string(), 1);
        store.upsert(b, "k".to_string(), 2);

        assert_eq!(store.get(a, &"k".to_string()), Some(1));
        assert_eq!(store.get(b, &"k".to_string()), Some(2));
        assert_eq!(store.list(a).len(), 1);

        store.clear_tenant(a);
        assert_eq!(store.get(a, &"k".to_string()), None);
        assert_eq!(store.get(b, &"k".to_string()), Some(2));
    }

    #[test]
    fn remove_deletes_only_the_keyed_record() {
        let store: InMemoryTenantStore<String, u64> = InMemoryTenantStore::new();
        let t = TenantId::new();

        store.upsert(t, "a".to_string(), 1);
        store.upsert(t, "b".to_string(), 2);
        store.remove(t, &"a".to_string());

        assert_eq!(store.get(t, &"a".to_string()), None);
        assert_eq!(store.get(t, &"b".to_string()), Some(2));
    }
}
