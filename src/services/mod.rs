pub mod drip;
pub mod drive;
pub mod embedding;
pub mod enrichment;
pub mod orchestration;
pub mod orders;
pub mod printful;
pub mod runs;
pub mod scanner;
pub mod scheduler;
pub mod shopify;
pub mod store;
pub mod sync_state;
