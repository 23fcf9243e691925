//! The top-level `CfSec` handle.
//!
//! Owns one in-memory table and history store per entity, the schema
//! registry that resolvers and linkers read through, and one controller per
//! entity configured from [`CfSecConfig`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use cfsec_config::CfSecConfig;
use cfsec_kernel::{
    AuditContext, Clock, Controller, ControllerOptions, Entity, HistoryPolicy, HistoryTable,
    IdentityKey, MemoryHistory, MemoryTable, Registry, RegistryBuilder, SystemClock, Table,
};
use cfsec_schema::{
    Cluster, HostNode, IsoCcy, IsoCtry, IsoLang, IsoTZone, SecGroup, SecGrpInc, SecGrpMemb,
    SecSession, SecUser, Service, ServiceType, TSecGroup, TSecGrpInc, TSecGrpMemb, Tenant,
};
use tracing::info;

use crate::error::{CfSecError, Result};
use crate::session::SessionHandle;

/// Key derivation context for the bootstrap cluster row.
const CLUSTER_KEY_CONTEXT: &str = "cfsec.cluster";

type ControllerMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Maps the `[audit]` and `[keys]` sections onto controller options.
pub fn controller_options(config: &CfSecConfig) -> ControllerOptions {
    ControllerOptions {
        history: HistoryPolicy {
            record_creates: config.audit.record_creates,
            record_updates: config.audit.record_updates,
            record_deletes: config.audit.record_deletes,
        },
        generate_missing_keys: config.keys.generate_missing,
    }
}

struct CfSecInner {
    config: CfSecConfig,
    registry: Registry,
    clock: Arc<dyn Clock>,
    controllers: ControllerMap,
}

/// Handle to a wired CFSec instance.
///
/// Cloning is cheap; clones share tables, registry and controllers.
///
/// # Example
///
/// ```ignore
/// let db = CfSec::in_memory(CfSecConfig::default())?;
/// let cluster = db.bootstrap()?;
///
/// let admin = db.system(cluster.pkey());
/// let mut user = SecUser::new();
/// user.set_login_id("alice")?;
/// admin.create(&mut user)?;
///
/// let session = db.login(cluster.pkey(), &user, Some("laptop"))?;
/// ```
#[derive(Clone)]
pub struct CfSec {
    inner: Arc<CfSecInner>,
}

impl CfSec {
    /// Loads layered configuration from `project_dir` and wires in-memory storage.
    pub fn open(project_dir: impl AsRef<Path>) -> Result<Self> {
        let config = CfSecConfig::load_from_dir(project_dir)?;
        Self::in_memory(config)
    }

    /// Wires in-memory storage with the system clock.
    pub fn in_memory(config: CfSecConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Wires in-memory storage with a caller-supplied clock.
    pub fn with_clock(config: CfSecConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let options = controller_options(&config);
        let mut builder = RegistryBuilder::new();
        let mut controllers = ControllerMap::new();

        macro_rules! wire {
            ($($entity:ident),* $(,)?) => {
                $(
                    let table: Arc<dyn Table<$entity>> = Arc::new(MemoryTable::<$entity>::new());
                    let history: Arc<dyn HistoryTable<$entity>> =
                        Arc::new(MemoryHistory::<$entity>::new());
                    builder = builder.register::<$entity>(Arc::clone(&table));
                    controllers.insert(
                        TypeId::of::<$entity>(),
                        Box::new(Controller::new(table, history, Arc::clone(&clock), options)),
                    );
                )*
            };
        }
        cfsec_schema::for_each_entity!(wire);

        let registry = Registry::new();
        registry.configure(builder);

        info!(
            entities = controllers.len(),
            record_creates = options.history.record_creates,
            record_updates = options.history.record_updates,
            record_deletes = options.history.record_deletes,
            generate_missing_keys = options.generate_missing_keys,
            "cfsec wired"
        );

        Ok(Self {
            inner: Arc::new(CfSecInner {
                config,
                registry,
                clock,
                controllers,
            }),
        })
    }

    pub fn config(&self) -> &CfSecConfig {
        &self.inner.config
    }

    /// Registry for resolving and linking foreign keys.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// The controller for `E`.
    pub fn controller<E: Entity>(&self) -> Result<&Controller<E>> {
        self.inner
            .controllers
            .get(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast_ref::<Controller<E>>())
            .ok_or(CfSecError::NotWired { entity: E::NAME })
    }

    /// Seeds the configured cluster row and returns it.
    ///
    /// The key is derived from the domain name, so running this again
    /// returns the stored row instead of creating a second one.
    pub fn bootstrap(&self) -> Result<Cluster> {
        let settings = &self.inner.config.cluster;

        let mut cluster = Cluster::new();
        cluster.set_pkey(IdentityKey::derive(
            CLUSTER_KEY_CONTEXT,
            &settings.full_dom_name,
        ))?;
        cluster.set_full_dom_name(settings.full_dom_name.clone())?;
        cluster.set_description(settings.description.clone())?;

        let ctx = AuditContext::system(cluster.pkey());
        let stored = self.controller::<Cluster>()?.create(&ctx, &mut cluster)?;

        info!(cluster = %stored.pkey(), dom_name = %stored.full_dom_name(), "cluster bootstrapped");
        Ok(stored)
    }

    /// A handle acting as the system (null user and session) in `cluster_id`.
    pub fn system(&self, cluster_id: IdentityKey) -> SessionHandle {
        self.session(AuditContext::system(cluster_id))
    }

    /// A handle acting under an existing audit context.
    pub fn session(&self, ctx: AuditContext) -> SessionHandle {
        SessionHandle::new(self.clone(), ctx)
    }

    /// Opens a `SecSession` row for `user` and returns a handle acting as it.
    ///
    /// The session row's own create is audited under the new session.
    pub fn login(
        &self,
        cluster_id: IdentityKey,
        user: &SecUser,
        device: Option<&str>,
    ) -> Result<SessionHandle> {
        let mut session = SecSession::new();
        session.set_pkey(IdentityKey::generate())?;
        session.set_container_sec_user(self.registry(), user)?;
        session.set_sec_dev_name(device.map(str::to_string))?;
        session.set_start(self.inner.clock.now());

        let ctx = AuditContext::new(cluster_id, session.pkey(), user.pkey());
        let stored = self.controller::<SecSession>()?.create(&ctx, &mut session)?;

        info!(session = %stored.pkey(), user = %user.pkey(), "session opened");
        Ok(self.session(ctx))
    }
}

impl fmt::Debug for CfSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CfSec")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("controllers", &self.inner.controllers.len())
            .finish_non_exhaustive()
    }
}
