use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::HeliosConfig;
use crate::database::{migrate, DatabaseError, DatabaseManager, Model, ModelDescriptor};
use crate::middleware::{chain, Endpoint, Handler, Middleware};
use crate::session::{SessionError, SessionStore};

/// Which store the handle is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Production,
    Test,
}

/// Application handle: config, registered models, database pool and the
/// session store shared by every endpoint it builds
#[derive(Debug)]
pub struct Helios {
    config: HeliosConfig,
    models: Vec<ModelDescriptor>,
    pool: Option<SqlitePool>,
    sessions: Arc<SessionStore>,
    state: Lifecycle,
}

impl Helios {
    pub fn new(config: HeliosConfig) -> Result<Self, SessionError> {
        let sessions = Arc::new(SessionStore::new(&config.session)?);

        Ok(Self {
            config,
            models: Vec::new(),
            pool: None,
            sessions,
            state: Lifecycle::Uninitialized,
        })
    }

    /// Open the durable store named by the config
    pub async fn initialize(&mut self) -> Result<(), DatabaseError> {
        if self.pool.is_some() {
            return Err(DatabaseError::AlreadyOpen);
        }

        let pool = DatabaseManager::open(&self.config.database).await?;
        self.pool = Some(pool);
        self.state = Lifecycle::Production;
        info!("Helios initialized in {:?} mode", self.config.environment);
        Ok(())
    }

    pub fn register_model<M: Model>(&mut self) {
        self.register(M::descriptor());
    }

    /// Add a model to the registry; duplicates are kept
    pub fn register(&mut self, descriptor: ModelDescriptor) {
        debug!("Registered model for table: {}", descriptor.table());
        self.models.push(descriptor);
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Bring every registered table up to date
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let pool = self.db()?;
        for model in &self.models {
            migrate::auto_migrate(pool, model).await?;
        }
        Ok(())
    }

    /// Reset state for a test case.
    ///
    /// The first call attaches a fresh in-memory store and migrates every
    /// model; later calls delete all rows of each registered table.
    pub async fn before_test(&mut self) -> Result<(), DatabaseError> {
        if let Some(pool) = &self.pool {
            for model in &self.models {
                let deleted = migrate::truncate(pool, model).await?;
                debug!("Cleared {} rows from {}", deleted, model.table());
            }
            return Ok(());
        }

        self.pool = Some(DatabaseManager::open_in_memory().await?);
        self.state = Lifecycle::Test;
        self.migrate().await
    }

    /// Close the pool; closing an already closed handle does nothing
    pub async fn close_db(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Database pool closed");
        }
        self.state = Lifecycle::Uninitialized;
    }

    pub fn db(&self) -> Result<&SqlitePool, DatabaseError> {
        self.pool.as_ref().ok_or(DatabaseError::NotOpen)
    }

    pub async fn has_table(&self, name: &str) -> Result<bool, DatabaseError> {
        migrate::has_table(self.db()?, name).await
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn config(&self) -> &HeliosConfig {
        &self.config
    }

    pub fn sessions(&self) -> Arc<SessionStore> {
        self.sessions.clone()
    }

    /// Serve `handler` directly
    pub fn handle(&self, handler: Handler) -> Endpoint {
        Endpoint::new(handler, self.sessions(), self.config.api.max_request_size_bytes)
    }

    /// Serve `handler` wrapped by `middlewares`, first entry outermost
    pub fn with_middleware(&self, handler: Handler, middlewares: &[Middleware]) -> Endpoint {
        self.handle(chain(handler, middlewares))
    }
}
