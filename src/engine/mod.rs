// GenomeDB Engine - Core module structure
pub mod api;
pub mod cli;
pub mod config;
pub mod hybrid;
pub mod logging;
pub mod nosql;
pub mod relational;
pub mod vocab;

pub use config::Config;
pub use hybrid::FederatedQueryCoordinator;
pub use nosql::VariantStore;
pub use relational::SqliteRelationalReader;
