pub mod cli;
pub mod config;
pub mod distance;
pub mod embedding;
pub mod extract;
pub mod features;
pub mod gradient;
pub mod histogram;
pub mod mat;
pub mod retrieval;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use features::{FeatureKind, FeatureType};
pub use retrieval::{QueryTarget, Retriever};
pub use store::{FeatureRecord, FeatureStore};
