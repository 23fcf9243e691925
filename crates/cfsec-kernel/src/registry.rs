//! Schema registry.
//!
//! Maps entity type to its live table so a child record can resolve a parent
//! by key without holding a reference to it. The registry is configured once
//! at startup; afterwards reads go through a `OnceLock` and take no lock.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use cfsec_types::IdentityKey;
use tracing::debug;

use crate::entity::{Entity, ParentRef};
use crate::error::{KernelError, Result};
use crate::traits::Table;

type TableMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Collects tables before the registry is configured.
#[derive(Default)]
pub struct RegistryBuilder {
    tables: TableMap,
    names: Vec<&'static str>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the table for `E`, replacing any earlier one.
    #[must_use]
    pub fn register<E: Entity>(mut self, table: Arc<dyn Table<E>>) -> Self {
        if self.tables.insert(TypeId::of::<E>(), Box::new(table)).is_none() {
            self.names.push(E::NAME);
        }
        self
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("entities", &self.names)
            .finish()
    }
}

/// Entity type to table map, configured once.
#[derive(Default)]
pub struct Registry {
    tables: OnceLock<TableMap>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the tables. Returns `false` if the registry was already
    /// configured; the first configuration stays in place.
    pub fn configure(&self, builder: RegistryBuilder) -> bool {
        let names = builder.names;
        let installed = self.tables.set(builder.tables).is_ok();
        if installed {
            debug!(entities = ?names, "schema registry configured");
        } else {
            debug!("schema registry already configured; ignoring");
        }
        installed
    }

    pub fn is_configured(&self) -> bool {
        self.tables.get().is_some()
    }

    /// Table for `E`.
    pub fn lookup<E: Entity>(&self) -> Result<Arc<dyn Table<E>>> {
        self.tables
            .get()
            .and_then(|tables| tables.get(&TypeId::of::<E>()))
            .and_then(|table| table.downcast_ref::<Arc<dyn Table<E>>>())
            .cloned()
            .ok_or(KernelError::NotConfigured { entity: E::NAME })
    }

    /// Loads the parent row a key points at. A null key resolves to `None`.
    pub fn resolve<P: Entity>(&self, key: &IdentityKey) -> Result<Option<P>> {
        if key.is_null() {
            return Ok(None);
        }
        self.lookup::<P>()?
            .find_by_key(key)
            .map_err(|source| KernelError::Storage {
                entity: P::NAME,
                operation: "resolve",
                source,
            })
    }

    /// Turns a parent reference into the key to store.
    ///
    /// Objects contribute their own key. Keys must resolve to a live row;
    /// the null key passes through unchanged.
    pub fn link<P: Entity>(
        &self,
        entity: &'static str,
        field: &'static str,
        parent: ParentRef<'_, P>,
    ) -> Result<IdentityKey> {
        match parent {
            ParentRef::Object(object) => Ok(object.pkey()),
            ParentRef::Key(key) if key.is_null() => Ok(key),
            ParentRef::Key(key) => match self.resolve::<P>(&key)? {
                Some(found) => Ok(found.pkey()),
                None => Err(KernelError::UnresolvedReference {
                    entity,
                    field,
                    parent: P::NAME,
                    key,
                }),
            },
        }
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("configured", &self.is_configured())
            .field("tables", &self.tables.get().map_or(0, HashMap::len))
            .finish()
    }
}
