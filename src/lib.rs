//! GenomeDB - combined queries over a relational clinical store and a
//! per-sample variant document store

pub mod engine;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use engine::api::ApiState;
use engine::config::Config;
use engine::hybrid::FederatedQueryCoordinator;
use engine::nosql::VariantStore;
use engine::relational::SqliteRelationalReader;

/// A project directory with both stores opened from its config
pub struct Project {
    pub config: Config,
    pub relational: Arc<SqliteRelationalReader>,
    pub documents: Arc<VariantStore>,
}

impl Project {
    pub fn open(project_dir: &Path) -> anyhow::Result<Self> {
        let config = Config::load(project_dir)
            .with_context(|| format!("loading config from {}", project_dir.display()))?;

        let db_path = config.relational_path(project_dir);
        let relational = SqliteRelationalReader::new(&db_path, config.relational.pool_size)
            .with_context(|| format!("opening relational store {}", db_path.display()))?;

        let docs_path = config.documents_path(project_dir);
        let documents = VariantStore::open(&docs_path, &config.documents.collection)
            .with_context(|| format!("opening document store {}", docs_path.display()))?;

        Ok(Self {
            config,
            relational: Arc::new(relational),
            documents: Arc::new(documents),
        })
    }

    /// Write a default config and create empty stores
    pub fn init(project_dir: &Path, name: &str) -> anyhow::Result<Self> {
        if project_dir.join(engine::config::CONFIG_FILE).exists() {
            anyhow::bail!("project already initialized: {}", project_dir.display());
        }
        std::fs::create_dir_all(project_dir)?;

        let config = Config::default_for_project(name);
        config.save(project_dir)?;
        VariantStore::create(&config.documents_path(project_dir), &config.documents.collection)?;

        Self::open(project_dir)
    }

    pub fn coordinator(&self) -> FederatedQueryCoordinator {
        FederatedQueryCoordinator::new(
            self.relational.clone(),
            self.documents.clone(),
            self.config.query.clone(),
        )
    }

    pub fn api_state(&self) -> ApiState {
        ApiState::new(
            self.relational.clone(),
            self.documents.clone(),
            self.config.query.clone(),
        )
    }
}
