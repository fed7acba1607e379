use std::collections::BTreeMap;

use tracing::debug;

use crate::error::StorageError;
use crate::traits::Backend;

/// Make a namespace safe to use as a registry key: drop everything outside
/// `[0-9a-zA-Z_]`, then strip leading characters until a letter or `_`.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .skip_while(|c| !(c.is_ascii_alphabetic() || *c == '_'))
        .collect()
}

/// Split `ns.name` on the last dot. A name without a dot has no namespace.
pub fn split_qualified(qualified: &str) -> (Option<&str>, &str) {
    match qualified.rsplit_once('.') {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, qualified),
    }
}

fn registry_key(namespace: &str, name: &str) -> Result<(String, String), StorageError> {
    let ns = safe_name(namespace);
    if ns.is_empty() {
        return Err(StorageError::InvalidName(format!(
            "a namespace name is required, got `{namespace}`"
        )));
    }
    if name.trim().is_empty() {
        return Err(StorageError::InvalidName(format!(
            "collection name can not be empty, got `{name}`"
        )));
    }
    Ok((ns, name.to_string()))
}

/// Explicit `(namespace, name) -> backend` map. Nothing is registered
/// implicitly: lookups of unknown collections fail unless the caller asks
/// for a definition with [`Registry::get_or_define`].
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<(String, String), Box<dyn Backend>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        registry_key(namespace, name).is_ok_and(|key| self.entries.contains_key(&key))
    }

    pub fn register(
        &mut self,
        namespace: &str,
        name: &str,
        backend: Box<dyn Backend>,
    ) -> Result<(), StorageError> {
        let key = registry_key(namespace, name)?;
        if self.entries.contains_key(&key) {
            return Err(StorageError::AlreadyRegistered(format!("{}.{}", key.0, key.1)));
        }
        debug!(namespace = %key.0, name = %key.1, "registered collection");
        self.entries.insert(key, backend);
        Ok(())
    }

    /// Register, replacing and returning any previous backend.
    pub fn replace(
        &mut self,
        namespace: &str,
        name: &str,
        backend: Box<dyn Backend>,
    ) -> Result<Option<Box<dyn Backend>>, StorageError> {
        let key = registry_key(namespace, name)?;
        Ok(self.entries.insert(key, backend))
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<&dyn Backend> {
        let key = registry_key(namespace, name).ok()?;
        self.entries.get(&key).map(|backend| backend.as_ref())
    }

    pub fn get_mut(&mut self, namespace: &str, name: &str) -> Option<&mut (dyn Backend + 'static)> {
        let key = registry_key(namespace, name).ok()?;
        self.entries.get_mut(&key).map(Box::as_mut)
    }

    /// Look up `ns.name`, failing when it is not registered.
    pub fn lookup(&mut self, qualified: &str) -> Result<&mut (dyn Backend + 'static), StorageError> {
        let (namespace, name) = split_qualified(qualified);
        let namespace = namespace.unwrap_or_default();
        let key = registry_key(namespace, name)?;
        self.entries
            .get_mut(&key)
            .map(Box::as_mut)
            .ok_or_else(|| StorageError::NotFound(format!("collection {namespace}.{name} doesn't exist")))
    }

    /// Return the registered backend, or build one with `define` and
    /// register it.
    pub fn get_or_define<F>(
        &mut self,
        namespace: &str,
        name: &str,
        define: F,
    ) -> Result<&mut (dyn Backend + 'static), StorageError>
    where
        F: FnOnce(&str, &str) -> Result<Box<dyn Backend>, StorageError>,
    {
        let key = registry_key(namespace, name)?;
        if !self.entries.contains_key(&key) {
            let backend = define(namespace, name)?;
            debug!(namespace = %key.0, name = %key.1, "defined collection");
            self.entries.insert(key.clone(), backend);
        }
        self.entries
            .get_mut(&key)
            .map(Box::as_mut)
            .ok_or_else(|| StorageError::NotFound(format!("{}.{}", key.0, key.1)))
    }

    /// Remove a collection from the registry, letting the backend release
    /// its resources.
    pub fn unregister(
        &mut self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Box<dyn Backend>>, StorageError> {
        let key = registry_key(namespace, name)?;
        match self.entries.remove(&key) {
            Some(mut backend) => {
                backend.unregister()?;
                Ok(Some(backend))
            }
            None => Ok(None),
        }
    }

    /// Drop the collection's data, then unregister it. Returns false when
    /// nothing was registered under that name.
    pub fn drop(&mut self, namespace: &str, name: &str) -> Result<bool, StorageError> {
        let key = registry_key(namespace, name)?;
        let Some(backend) = self.entries.get_mut(&key) else {
            return Ok(false);
        };
        backend.drop_collection()?;
        self.unregister(namespace, name)?;
        Ok(true)
    }

    pub fn namespaces(&self) -> Vec<String> {
        let mut namespaces: Vec<String> = self.entries.keys().map(|(ns, _)| ns.clone()).collect();
        namespaces.dedup();
        namespaces
    }

    /// Registered `(namespace, name)` pairs whose name contains `match_name`
    /// (case-insensitive), restricted to `match_namespace` when non-empty.
    pub fn names(&self, match_name: &str, match_namespace: &str) -> Vec<(String, String)> {
        let needle = match_name.to_lowercase();
        self.entries
            .keys()
            .filter(|(ns, _)| match_namespace.is_empty() || ns == match_namespace)
            .filter(|(_, name)| name.to_lowercase().contains(&needle) && !name.starts_with("system"))
            .cloned()
            .collect()
    }
}
