use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::Mutex;

use super::registry_message_for;
use super::Endpoint;
use super::MessagesToEmit;
use super::ModificationTag;
use super::Routes;
use super::RoutingKey;

/// The state held at one routing key: the hostnames bound to it and the
/// endpoints serving them, keyed by instance identifier.
#[derive(Debug, Clone, Default)]
struct TableEntry {
    routes: Routes,
    endpoints: HashMap<String, Endpoint>,
}

impl TableEntry {
    fn is_empty(&self) -> bool {
        self.routes.hostnames.is_empty() && self.endpoints.is_empty()
    }
}

/// Thread-safe mapping from routing key to routes and endpoints.
///
/// Every mutator returns the registrations and unregistrations implied by the
/// mutation, atomically with the state change. Stale-tag rejections return an
/// empty diff and leave the table untouched.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: Mutex<HashMap<RoutingKey, TableEntry>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the temp table the syncer hands to [`RoutingTable::swap`].
    ///
    /// Not meant to be mutated through the event operations; it only carries
    /// the snapshot state into the swap.
    pub fn from_snapshot(
        routes: HashMap<RoutingKey, Routes>,
        endpoints: HashMap<RoutingKey, Vec<Endpoint>>,
    ) -> Self {
        let mut entries: HashMap<RoutingKey, TableEntry> = HashMap::new();

        for (key, routes) in routes {
            entries.entry(key).or_default().routes = routes;
        }
        for (key, key_endpoints) in endpoints {
            let entry = entries.entry(key).or_default();
            for endpoint in key_endpoints {
                entry.endpoints.insert(endpoint.instance_guid.clone(), endpoint);
            }
        }

        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Replaces all state with `new_table`.
    ///
    /// Registrations cover every binding in the new table (bindings surviving
    /// the swap are refreshed); unregistrations cover bindings present only
    /// in the old table.
    pub fn swap(
        &self,
        new_table: RoutingTable,
    ) -> MessagesToEmit {
        let new_entries = new_table.entries.into_inner();
        let mut entries = self.entries.lock();

        let mut messages = MessagesToEmit::default();
        for entry in new_entries.values() {
            messages.merge(registrations_for(entry));
        }
        for (key, old_entry) in entries.iter() {
            messages.merge(unregistrations_for_transition(old_entry, new_entries.get(key)));
        }

        *entries = new_entries;
        messages
    }

    /// Replaces the Routes at `key` iff the incoming tag supersedes the
    /// stored one. New hostnames register against every endpoint at the key;
    /// removed hostnames unregister. Unchanged hostnames are left to the
    /// heartbeat loop.
    pub fn set_routes(
        &self,
        key: &RoutingKey,
        routes: Routes,
    ) -> MessagesToEmit {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();

        if !entry.routes.modification_tag.succeeded_by(&routes.modification_tag) {
            return MessagesToEmit::default();
        }

        let old_routes = std::mem::replace(&mut entry.routes, routes);

        let old_set: HashSet<&str> = old_routes.hostnames.iter().map(String::as_str).collect();
        let new_set: HashSet<&str> = entry.routes.hostnames.iter().map(String::as_str).collect();
        let added: Vec<String> = entry
            .routes
            .hostnames
            .iter()
            .filter(|hostname| !old_set.contains(hostname.as_str()))
            .cloned()
            .collect();
        let removed: Vec<String> = old_routes
            .hostnames
            .iter()
            .filter(|hostname| !new_set.contains(hostname.as_str()))
            .cloned()
            .collect();

        let mut messages = MessagesToEmit::default();
        for endpoint in entry.endpoints.values() {
            if !added.is_empty() {
                let registered = Routes {
                    hostnames: added.clone(),
                    log_guid: entry.routes.log_guid.clone(),
                    modification_tag: entry.routes.modification_tag.clone(),
                };
                messages.registrations.push(registry_message_for(endpoint, &registered));
            }
            if !removed.is_empty() {
                let unregistered = Routes {
                    hostnames: removed.clone(),
                    log_guid: old_routes.log_guid.clone(),
                    modification_tag: old_routes.modification_tag.clone(),
                };
                messages.unregistrations.push(registry_message_for(endpoint, &unregistered));
            }
        }

        remove_if_empty(&mut entries, key);
        messages
    }

    /// Clears the Routes at `key` iff `tag` is not older than the stored tag.
    /// Unregisters every (stored hostname, endpoint) pair.
    pub fn remove_routes(
        &self,
        key: &RoutingKey,
        tag: &ModificationTag,
    ) -> MessagesToEmit {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return MessagesToEmit::default();
        };

        let stored = &entry.routes.modification_tag;
        if !(stored == tag || stored.succeeded_by(tag)) {
            return MessagesToEmit::default();
        }

        let old_routes = std::mem::take(&mut entry.routes);

        let mut messages = MessagesToEmit::default();
        if !old_routes.hostnames.is_empty() {
            for endpoint in entry.endpoints.values() {
                messages.unregistrations.push(registry_message_for(endpoint, &old_routes));
            }
        }

        remove_if_empty(&mut entries, key);
        messages
    }

    /// Inserts or replaces the endpoint, matched by instance identifier, iff
    /// its tag supersedes the stored one. The new endpoint registers against
    /// every hostname at the key; a superseded endpoint whose address moved
    /// unregisters.
    pub fn add_endpoint(
        &self,
        key: &RoutingKey,
        endpoint: Endpoint,
    ) -> MessagesToEmit {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();

        if let Some(existing) = entry.endpoints.get(&endpoint.instance_guid) {
            if !existing.modification_tag.succeeded_by(&endpoint.modification_tag) {
                return MessagesToEmit::default();
            }
        }

        let superseded = entry.endpoints.insert(endpoint.instance_guid.clone(), endpoint.clone());

        let mut messages = MessagesToEmit::default();
        if !entry.routes.hostnames.is_empty() {
            messages.registrations.push(registry_message_for(&endpoint, &entry.routes));

            if let Some(old) = superseded {
                if old.host != endpoint.host || old.port != endpoint.port {
                    messages.unregistrations.push(registry_message_for(&old, &entry.routes));
                }
            }
        }

        messages
    }

    /// Removes the endpoint iff its tag is not older than the stored one.
    /// Unregisters every current hostname. Routes stay intact so a returning
    /// endpoint re-registers against them.
    pub fn remove_endpoint(
        &self,
        key: &RoutingKey,
        endpoint: &Endpoint,
    ) -> MessagesToEmit {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return MessagesToEmit::default();
        };

        let accepted = match entry.endpoints.get(&endpoint.instance_guid) {
            Some(existing) => {
                let stored = &existing.modification_tag;
                stored == &endpoint.modification_tag || stored.succeeded_by(&endpoint.modification_tag)
            }
            None => false,
        };
        if !accepted {
            return MessagesToEmit::default();
        }

        let mut messages = MessagesToEmit::default();
        if let Some(removed) = entry.endpoints.remove(&endpoint.instance_guid) {
            if !entry.routes.hostnames.is_empty() {
                messages.unregistrations.push(registry_message_for(&removed, &entry.routes));
            }
        }

        remove_if_empty(&mut entries, key);
        messages
    }

    /// Snapshot of every current (hostname, endpoint) binding as
    /// registrations. Drives the heartbeat loop.
    pub fn messages_to_emit(&self) -> MessagesToEmit {
        let entries = self.entries.lock();

        let mut messages = MessagesToEmit::default();
        for entry in entries.values() {
            messages.merge(registrations_for(entry));
        }
        messages
    }

    /// Sum over keys of `|hostnames| x |endpoints|`.
    pub fn route_count(&self) -> usize {
        let entries = self.entries.lock();
        entries
            .values()
            .map(|entry| entry.routes.hostnames.len() * entry.endpoints.len())
            .sum()
    }
}

fn remove_if_empty(
    entries: &mut HashMap<RoutingKey, TableEntry>,
    key: &RoutingKey,
) {
    if entries.get(key).is_some_and(TableEntry::is_empty) {
        entries.remove(key);
    }
}

fn registrations_for(entry: &TableEntry) -> MessagesToEmit {
    let mut messages = MessagesToEmit::default();
    if entry.routes.hostnames.is_empty() {
        return messages;
    }

    for endpoint in entry.endpoints.values() {
        messages.registrations.push(registry_message_for(endpoint, &entry.routes));
    }
    messages
}

fn unregistrations_for_transition(
    old_entry: &TableEntry,
    new_entry: Option<&TableEntry>,
) -> MessagesToEmit {
    let mut messages = MessagesToEmit::default();
    if old_entry.routes.hostnames.is_empty() {
        return messages;
    }

    for (instance_guid, endpoint) in &old_entry.endpoints {
        match new_entry.and_then(|entry| entry.endpoints.get(instance_guid)) {
            None => {
                // The endpoint did not survive the swap; retract every
                // hostname it was announced under.
                messages.unregistrations.push(registry_message_for(endpoint, &old_entry.routes));
            }
            Some(_) => {
                let new_routes = new_entry.map(|entry| &entry.routes);
                let kept: HashSet<&str> = new_routes
                    .map(|routes| routes.hostnames.iter().map(String::as_str).collect())
                    .unwrap_or_default();
                let dropped: Vec<String> = old_entry
                    .routes
                    .hostnames
                    .iter()
                    .filter(|hostname| !kept.contains(hostname.as_str()))
                    .cloned()
                    .collect();
                if !dropped.is_empty() {
                    let retracted = Routes {
                        hostnames: dropped,
                        log_guid: old_entry.routes.log_guid.clone(),
                        modification_tag: old_entry.routes.modification_tag.clone(),
                    };
                    messages.unregistrations.push(registry_message_for(endpoint, &retracted));
                }
            }
        }
    }
    messages
}
