pub mod catalog;
pub mod model_store;

pub use catalog::{load_catalog, CatalogFormat};
pub use model_store::{fingerprint, ModelStore, SnapshotDescription};
