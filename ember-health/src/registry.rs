use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use log::debug;

use crate::probe::Probe;

/// Live set of named [Probe]s.
///
/// Clones share the same set, so one handle can be given to the aggregator
/// while another keeps registering. Registering a name that is already present
/// replaces the earlier probe.
#[derive(Debug, Clone, Default)]
pub struct ProbeRegistry {
    probes: Arc<RwLock<HashMap<String, Arc<dyn Probe>>>>,
}

/// Snapshot of the probes registered at the moment [ProbeRegistry::list] was called.
///
/// Later registrations are not observed. Iterate it as many times as needed.
#[derive(Debug, Clone, Default)]
pub struct ProbeList(Vec<Arc<dyn Probe>>);

impl ProbeList {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<dyn Probe>> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the probes in the snapshot, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.iter().map(|probe| probe.name()).collect();
        names.sort_unstable();
        names
    }
}

impl<'a> IntoIterator for &'a ProbeList {
    type Item = &'a Arc<dyn Probe>;
    type IntoIter = std::slice::Iter<'a, Arc<dyn Probe>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for ProbeList {
    type Item = Arc<dyn Probe>;
    type IntoIter = std::vec::IntoIter<Arc<dyn Probe>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a probe, replacing any probe of the same name.
    /// Returns true when an earlier probe was replaced.
    pub fn register<P: Probe + 'static>(&self, probe: P) -> bool {
        self.register_shared(Arc::new(probe))
    }

    /// Insert a probe that is already shared
    pub fn register_shared(&self, probe: Arc<dyn Probe>) -> bool {
        let name = probe.name().to_owned();
        let replaced = self
            .probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), probe)
            .is_some();

        debug!(
            "{} probe {}",
            if replaced { "Replaced" } else { "Registered" },
            name
        );
        replaced
    }

    /// Remove the probe with this name. Returns true when one was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self
            .probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();

        if removed {
            debug!("Unregistered probe {}", name);
        }
        removed
    }

    /// Copy of the currently registered probes
    pub fn list(&self) -> ProbeList {
        let probes = self.probes.read().unwrap_or_else(PoisonError::into_inner);
        ProbeList(probes.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
