use axum::{extract::State, response::Json};
use chrono::Utc;
use sea_orm::{EntityTrait, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::analytics_event::{self, EventType};
use crate::error::AppError;
use crate::middleware::peer::PeerAddr;
use crate::AppState;

const MAX_BATCH: usize = 500;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct EventInput {
    /// impression, click, view, add_to_cart, purchase or search.
    pub event_type: String,
    pub product_id: Option<String>,
    #[schema(value_type = Option<String>)]
    pub asset_id: Option<Uuid>,
    pub collection_id: Option<String>,
    pub search_query: Option<String>,
    /// Defaults to the caller's address.
    pub session_id: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

/// One event, a bare array, or `{"events": [...]}`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum AnalyticsPayload {
    Batch { events: Vec<EventInput> },
    Many(Vec<EventInput>),
    One(EventInput),
}

impl AnalyticsPayload {
    fn into_events(self) -> Vec<EventInput> {
        match self {
            AnalyticsPayload::Batch { events } | AnalyticsPayload::Many(events) => events,
            AnalyticsPayload::One(event) => vec![event],
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackResponse {
    pub tracked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validates every event and fills in the session; the first unknown event
/// type rejects the whole payload.
pub fn to_rows(events: Vec<EventInput>, peer: &str) -> Result<Vec<analytics_event::ActiveModel>, AppError> {
    if events.is_empty() {
        return Err(AppError::BadRequest("No events supplied".to_string()));
    }
    if events.len() > MAX_BATCH {
        return Err(AppError::BadRequest(format!("At most {MAX_BATCH} events per request")));
    }
    let now = Utc::now().naive_utc();
    events
        .into_iter()
        .map(|e| {
            let event_type = EventType::parse(e.event_type.trim())
                .ok_or_else(|| AppError::BadRequest(format!("Invalid event_type: {}", e.event_type)))?;
            let session_id = e
                .session_id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| peer.to_string());
            Ok(analytics_event::ActiveModel {
                id: Set(Uuid::new_v4()),
                event_type: Set(event_type),
                product_id: Set(e.product_id),
                asset_id: Set(e.asset_id),
                collection_id: Set(e.collection_id),
                search_query: Set(e.search_query),
                session_id: Set(session_id),
                metadata: Set(e.metadata.unwrap_or_else(|| serde_json::json!({}))),
                created_at: Set(now),
            })
        })
        .collect()
}

#[utoipa::path(
    post,
    path = "/api/analytics",
    request_body = AnalyticsPayload,
    responses(
        (status = 200, description = "Events recorded; storage failures are reported in the body", body = TrackResponse),
        (status = 400, description = "Unknown event type or empty batch")
    ),
    tag = "Analytics"
)]
pub async fn track(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    Json(payload): Json<AnalyticsPayload>,
) -> Result<Json<TrackResponse>, AppError> {
    let rows = to_rows(payload.into_events(), &peer)?;
    let count = rows.len();

    match analytics_event::Entity::insert_many(rows).exec(state.db.as_ref()).await {
        Ok(_) => Ok(Json(TrackResponse {
            tracked: count,
            error: None,
        })),
        Err(e) => {
            tracing::warn!("Analytics | Failed to record {} events: {}", count, e);
            Ok(Json(TrackResponse {
                tracked: 0,
                error: Some("Failed to record events".to_string()),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str) -> EventInput {
        EventInput {
            event_type: kind.to_string(),
            product_id: Some("123".into()),
            asset_id: None,
            collection_id: None,
            search_query: None,
            session_id: None,
            metadata: None,
        }
    }

    #[test]
    fn payload_shapes_parse() {
        let one: AnalyticsPayload = serde_json::from_str(r#"{"event_type":"view"}"#).unwrap();
        assert_eq!(one.into_events().len(), 1);
        let many: AnalyticsPayload = serde_json::from_str(r#"[{"event_type":"view"},{"event_type":"click"}]"#).unwrap();
        assert_eq!(many.into_events().len(), 2);
        let batch: AnalyticsPayload = serde_json::from_str(r#"{"events":[{"event_type":"search"}]}"#).unwrap();
        assert_eq!(batch.into_events()[0].event_type, "search");
    }

    #[test]
    fn session_defaults_to_peer() {
        let mut explicit = event("click");
        explicit.session_id = Some("abc".into());
        let rows = to_rows(vec![event("view"), explicit], "198.51.100.7").unwrap();
        assert_eq!(rows[0].session_id, Set("198.51.100.7".to_string()));
        assert_eq!(rows[1].session_id, Set("abc".to_string()));
    }

    #[test]
    fn unknown_types_and_empty_batches_are_rejected() {
        assert!(matches!(to_rows(vec![event("view"), event("hover")], "x"), Err(AppError::BadRequest(_))));
        assert!(matches!(to_rows(Vec::new(), "x"), Err(AppError::BadRequest(_))));
    }
}
