pub mod distribution;
pub mod memstore;
pub mod metrics;
pub mod models;
pub mod pgstore;
pub mod store;
