//! Provider menu read endpoint
//!
//! `GET /:provider/drink/` answers `{"drinks": [...]}` in menu order. Each
//! drink carries the core fields plus its attributes flattened alongside
//! them; a core field wins over an attribute of the same name.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bevly_common::Beverage;
use serde_json::{json, Map, Value};

use crate::error::ApiResult;
use crate::AppState;

/// JSON object for one drink
pub fn drink_json(beverage: &Beverage) -> Value {
    let mut object = Map::new();
    object.insert("name".to_string(), json!(beverage.display_name));
    object.insert("brewer".to_string(), json!(beverage.brewer));
    object.insert("type".to_string(), json!(beverage.bev_type));
    object.insert("abv".to_string(), json!(beverage.abv));
    object.insert("description".to_string(), json!(beverage.description));
    object.insert("externalLink".to_string(), json!(beverage.link));
    object.insert(
        "ratingScore".to_string(),
        json!(beverage.ratings.first().map(|r| r.percentage_rating)),
    );

    for (name, value) in &beverage.attributes {
        object
            .entry(name.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }
    Value::Object(object)
}

/// GET /:provider/drink/
pub async fn provider_drinks(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let beverages = state.repo.provider_beverages_by_id(&provider).await?;
    let drinks: Vec<Value> = beverages.iter().map(drink_json).collect();

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(json!({ "drinks": drinks })),
    ))
}

pub fn drink_routes() -> Router<AppState> {
    Router::new().route("/:provider/drink/", get(provider_drinks))
}
