// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Process-wide registry of ProxyClients, keyed by client key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::proxy_client::ProxyClient;
use crate::submessage::{AgentInfo, CreateClientPayload, StatusValue};
use crate::wire::ClientKey;

/// `ClientKey -> ProxyClient`, guarded for concurrent access: a single
/// exclusive mutation lock over the map, while readers may hold a shared
/// reference to a `ProxyClient` after the map itself is unlocked.
pub struct Root {
    clients: Mutex<HashMap<ClientKey, Arc<ProxyClient>>>,
    max_clients: usize,
    retention_window: usize,
}

impl Root {
    pub fn new(max_clients: usize, retention_window: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            max_clients,
            retention_window,
        }
    }

    /// Validate the cookie/version and create or re-confirm a ProxyClient.
    pub fn create_client(&self, payload: &CreateClientPayload) -> (StatusValue, AgentInfo) {
        let info = AgentInfo::this_agent();
        if !payload.cookie_valid() {
            return (StatusValue::InvalidDataError, info);
        }
        if !payload.version_compatible() {
            return (StatusValue::Incompatible, info);
        }

        let mut clients = self.clients.lock().unwrap();
        if let Some(existing) = clients.get(&payload.client_key) {
            if existing.session_id == payload.requested_session_id {
                existing.touch();
                return (StatusValue::Ok, info);
            }
            clients.remove(&payload.client_key);
        }

        if clients.len() >= self.max_clients {
            return (StatusValue::ResourcesError, info);
        }

        let pc = Arc::new(ProxyClient::new(
            payload.client_key,
            payload.requested_session_id,
            payload.properties.clone(),
            self.retention_window,
        ));
        clients.insert(payload.client_key, pc);
        (StatusValue::Ok, info)
    }

    pub fn delete_client(&self, key: ClientKey) -> bool {
        self.clients.lock().unwrap().remove(&key).is_some()
    }

    pub fn get_client(&self, key: ClientKey) -> Option<Arc<ProxyClient>> {
        self.clients.lock().unwrap().get(&key).cloned()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live ProxyClient, for the periodic liveliness scan.
    pub fn snapshot(&self) -> Vec<Arc<ProxyClient>> {
        self.clients.lock().unwrap().values().cloned().collect()
    }
}
