pub mod analytics_event;
pub mod asset;
pub mod asset_variant;
pub mod fulfillment_order;
pub mod pipeline_run;
