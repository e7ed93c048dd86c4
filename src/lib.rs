pub mod config;
pub mod entities;
pub mod error;
pub mod middleware;
pub mod models;
pub mod pagination;
pub mod routes;
pub mod services;
pub mod utils;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::models::pricing::PriceMap;
use crate::services::embedding::search::{Fallback, SearchStrategy, TagSearch, VectorSearch};
use crate::services::embedding::{Embedder, GeminiEmbedder, PgVectorStore};
use crate::services::orchestration::Pipeline;
use crate::services::orders::OrderIntake;
use crate::services::printful::{FulfillmentProvider, PrintfulClient};

pub use routes::create_routes;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub search: Arc<dyn SearchStrategy>,
    pub price_map: Arc<PriceMap>,
    pub orders: Arc<OrderIntake>,
    pub fulfillment: Option<Arc<dyn FulfillmentProvider>>,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: Config, pipeline: Arc<Pipeline>) -> Self {
        let price_map = match PriceMap::load(&config.price_map_path) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    "Startup | Price map {} unavailable: {}",
                    config.price_map_path.display(),
                    e
                );
                PriceMap::default()
            }
        };
        let price_map = Arc::new(price_map);

        let embedder: Option<Arc<dyn Embedder>> = config
            .embedding
            .as_ref()
            .and_then(|c| GeminiEmbedder::new(c.clone()).ok())
            .map(|e| Arc::new(e) as Arc<dyn Embedder>);
        let search: Arc<dyn SearchStrategy> = Arc::new(Fallback::new(
            VectorSearch::new(Arc::new(PgVectorStore::new(db.clone())), embedder),
            TagSearch::new(db.clone()),
        ));

        let fulfillment: Option<Arc<dyn FulfillmentProvider>> = match config.printful_api_key.as_deref() {
            Some(key) => match PrintfulClient::new(key) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    tracing::warn!("Startup | Fulfillment client disabled: {}", e);
                    None
                }
            },
            None => None,
        };

        let mut orders = OrderIntake::new(db.clone(), config.image_base_url.clone());
        if config.auto_fulfill {
            match &fulfillment {
                Some(provider) => orders = orders.with_auto_fulfill(provider.clone(), price_map.clone()),
                None => tracing::warn!("Startup | AUTO_FULFILL is set but no fulfillment key is configured"),
            }
        }

        Self {
            db,
            config: Arc::new(config),
            pipeline,
            search,
            price_map,
            orders: Arc::new(orders),
            fulfillment,
        }
    }
}
