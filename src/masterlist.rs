// Client/store registry loaded from the masterlist CSV.
use crate::error::{KpiError, Result};
use crate::loader::{load_table, ParsedTable};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub const MASTERLIST_COLUMNS: [&str; 4] = ["client_id", "client_name", "store_id", "store_name"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Store {
    pub store_id: String,
    pub store_name: String,
    pub district: String,
    pub region: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub stores: Vec<Store>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Client>,
}

impl ClientRegistry {
    /// Build the registry from a parsed masterlist. Rows missing any of the
    /// four id/name values are skipped.
    pub fn from_table(name: &str, table: &ParsedTable) -> Result<Self> {
        let missing = table.missing_columns(&MASTERLIST_COLUMNS);
        if !missing.is_empty() {
            return Err(KpiError::MissingColumns {
                file: name.to_string(),
                missing,
            });
        }

        let mut clients: BTreeMap<String, Client> = BTreeMap::new();
        let mut skipped = 0usize;
        for row in &table.rows {
            let cell = |c: &str| row.get(c).unwrap_or_default().trim().to_string();
            let (client_id, client_name) = (cell("client_id"), cell("client_name"));
            let (store_id, store_name) = (cell("store_id"), cell("store_name"));
            if [&client_id, &client_name, &store_id, &store_name]
                .iter()
                .any(|v| v.is_empty())
            {
                skipped += 1;
                continue;
            }

            let client = clients.entry(client_id.clone()).or_insert_with(|| Client {
                id: client_id,
                name: client_name.clone(),
                stores: Vec::new(),
            });
            client.name = client_name;
            client.stores.push(Store {
                store_id,
                store_name,
                district: cell("district"),
                region: cell("region"),
                city: cell("city"),
                state: cell("state"),
            });
        }
        if skipped > 0 {
            warn!(file = name, skipped, "masterlist rows without client/store ids");
        }
        Ok(ClientRegistry { clients })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let table = load_table(path)?;
        let registry = Self::from_table(&path.display().to_string(), &table)?;
        info!(clients = registry.clients.len(), "loaded masterlist");
        Ok(registry)
    }

    pub fn client(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Clients ordered by display name, case-insensitively.
    pub fn clients_by_name(&self) -> Vec<&Client> {
        let mut list: Vec<&Client> = self.clients.values().collect();
        list.sort_by_key(|c| c.name.to_lowercase());
        list
    }

    pub fn stores(&self, client_id: &str) -> &[Store] {
        self.clients
            .get(client_id)
            .map(|c| c.stores.as_slice())
            .unwrap_or_default()
    }

    /// Distinct districts for a client, sorted.
    pub fn districts(&self, client_id: &str) -> Vec<&str> {
        let mut d: Vec<&str> = self
            .stores(client_id)
            .iter()
            .map(|s| s.district.as_str())
            .filter(|d| !d.is_empty())
            .collect();
        d.sort_unstable();
        d.dedup();
        d
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
