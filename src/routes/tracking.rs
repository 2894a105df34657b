use axum::{
    extract::{Query, State},
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponse, Redirect, Response},
};
use serde_json::{json, Value};

use crate::{
    repository::rent_ledger::ActivityLogEntry,
    schemas::TrackingQuery,
    services::{
        billing_calendar::month_key_or_today,
        tracking::{is_allowed_redirect, statement_period, verify, TrackingToken},
    },
    state::AppState,
};

pub const LINK_CLICK_EVENT: &str = "link_click";
pub const PIXEL_VIEW_EVENT: &str = "pixel_view";

/// 1x1 transparent GIF.
static TRANSPARENT_GIF: [u8; 43] = [
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/track/click", axum::routing::get(track_click))
        .route("/track/open.gif", axum::routing::get(track_open))
}

async fn track_click(
    State(state): State<AppState>,
    Query(query): Query<TrackingQuery>,
    headers: HeaderMap,
) -> Response {
    let app_url = &state.config.app_public_url;
    let target = query
        .to
        .as_deref()
        .filter(|to| is_allowed_redirect(to, app_url))
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| format!("{app_url}/tenant/payments"));

    record_engagement(
        &state,
        &query,
        &headers,
        LINK_CLICK_EVENT,
        json!({ "redirect_to": target }),
    )
    .await;

    Redirect::to(&target).into_response()
}

async fn track_open(
    State(state): State<AppState>,
    Query(query): Query<TrackingQuery>,
    headers: HeaderMap,
) -> Response {
    record_engagement(&state, &query, &headers, PIXEL_VIEW_EVENT, json!({})).await;

    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("image/gif")),
            (
                CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            ),
        ],
        &TRANSPARENT_GIF[..],
    )
        .into_response()
}

/// Append an engagement event when the link signature checks out. Tracking
/// never fails the tenant-facing response.
async fn record_engagement(
    state: &AppState,
    query: &TrackingQuery,
    headers: &HeaderMap,
    event_type: &str,
    mut metadata: Value,
) {
    let Some(token) = signed_token(state, query) else {
        tracing::debug!(event_type, "Ignoring unsigned tracking request");
        return;
    };

    let store = match state.ledger_store() {
        Ok(store) => store,
        Err(error) => {
            tracing::warn!(%error, event_type, "Tracking event dropped");
            return;
        }
    };

    let period = month_key_or_today(statement_period(&token.statement_id), state.config.local_today());
    if let Some(object) = metadata.as_object_mut() {
        object.insert("statement_period".to_string(), json!(period));
        if let Some(agent) = headers.get(USER_AGENT).and_then(|value| value.to_str().ok()) {
            object.insert("user_agent".to_string(), json!(agent));
        }
    }

    let entry = ActivityLogEntry {
        tenant_id: Some(token.tenant_id),
        rent_unit_id: Some(token.rent_unit_id),
        statement_id: Some(token.statement_id),
        event_type: event_type.to_string(),
        metadata,
    };
    if let Err(error) = store.append_activity(&entry).await {
        tracing::warn!(%error, event_type, "Failed to record tracking event");
    }
}

fn signed_token(state: &AppState, query: &TrackingQuery) -> Option<TrackingToken> {
    let secret = state.config.tracking_secret()?;
    let token = TrackingToken {
        tenant_id: query.tenant_id?,
        rent_unit_id: query.rent_unit_id?,
        statement_id: query.statement_id.clone()?,
    };
    verify(secret, &token, query.sig.as_deref()?).then_some(token)
}
