//! Process-wide set of named clients.
//!
//! Shared read-only by every request; the DAO layer only ever looks clients
//! up, it never adds or removes them while serving requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::client::Client;
use super::mysql::MySqlClient;
use crate::config::Config;
use crate::error::{DaoError, DaoResult};

/// The primary client plus any number of named clients.
#[derive(Debug)]
pub struct Clients<C> {
    primary: Option<Arc<C>>,
    named: HashMap<String, Arc<C>>,
}

impl<C> Default for Clients<C> {
    fn default() -> Self {
        Self {
            primary: None,
            named: HashMap::new(),
        }
    }
}

impl<C: Client> Clients<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client. `None` registers the primary client.
    pub fn insert(&mut self, name: Option<&str>, client: C) {
        let client = Arc::new(client);
        match name {
            Some(name) => {
                self.named.insert(name.to_string(), client);
            }
            None => self.primary = Some(client),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: Option<&str>, client: C) -> Self {
        self.insert(name, client);
        self
    }

    /// Look up a client. `None` is the primary client.
    pub fn get(&self, name: Option<&str>) -> DaoResult<Arc<C>> {
        let client = match name {
            Some(name) => self.named.get(name),
            None => self.primary.as_ref(),
        };
        client
            .cloned()
            .ok_or_else(|| DaoError::client_not_found(name))
    }

    pub fn contains(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.named.contains_key(name),
            None => self.primary.is_some(),
        }
    }

    /// Names of the registered named clients.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.named.len() + usize::from(self.primary.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Clients<MySqlClient> {
    /// Connect every client in `config`.
    pub async fn connect(config: &Config) -> DaoResult<Self> {
        let client_configs = config.parse_clients()?;
        if client_configs.is_empty() {
            return Err(DaoError::config("At least one database must be configured"));
        }

        let connect_timeout = Duration::from_secs(config.connect_timeout);
        let query_timeout = Duration::from_secs(config.query_timeout);

        let mut clients = Self::new();
        for client_config in &client_configs {
            let client =
                MySqlClient::connect(client_config, connect_timeout, query_timeout).await?;
            clients.insert(client_config.name.as_deref(), client);
        }

        info!(count = clients.len(), "Connected database clients");
        Ok(clients)
    }

    /// Close every pool.
    pub async fn close(&self) {
        for client in self.primary.iter().chain(self.named.values()) {
            client.close().await;
        }
    }
}
