use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_object_path, Area, ObjectStorage, OBJECTS_PREFIX};
use crate::core::session::RequestContext;
use crate::core::shared::state::AppState;
use crate::core::urls::ApiUrls;
use crate::crm::error::CrmError;
use crate::crm::extract::{ValidatedJson, ValidatedPath};

#[derive(Debug, Serialize)]
pub struct UploadSlot {
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PropertyImageRequest {
    #[serde(rename = "propertyId")]
    pub property_id: Option<Uuid>,
    #[serde(rename = "imageURL")]
    pub image_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPath {
    pub object_path: String,
}

fn object_response(key: &str, bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, ObjectStorage::content_type(key))],
        bytes,
    )
        .into_response()
}

pub async fn request_upload(_ctx: RequestContext) -> Json<UploadSlot> {
    Json(UploadSlot {
        upload_url: format!("{}{}", OBJECTS_PREFIX, ObjectStorage::new_upload_key()),
    })
}

pub async fn put_object(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(key): ValidatedPath<String>,
    body: Bytes,
) -> Result<Json<ObjectPath>, CrmError> {
    state.objects.put(Area::Private, &key, &body).await?;
    Ok(Json(ObjectPath {
        object_path: format!("{}{}", OBJECTS_PREFIX, key),
    }))
}

pub async fn get_object(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedPath(key): ValidatedPath<String>,
) -> Result<Response, CrmError> {
    let bytes = state
        .objects
        .get(Area::Private, &key)
        .await?
        .ok_or(CrmError::NotFound("Object"))?;
    Ok(object_response(&key, bytes))
}

pub async fn get_public_object(
    State(state): State<Arc<AppState>>,
    ValidatedPath(key): ValidatedPath<String>,
) -> Result<Response, CrmError> {
    let bytes = state
        .objects
        .get(Area::Public, &key)
        .await?
        .ok_or(CrmError::NotFound("Object"))?;
    Ok(object_response(&key, bytes))
}

pub async fn set_property_image(
    State(state): State<Arc<AppState>>,
    _ctx: RequestContext,
    ValidatedJson(req): ValidatedJson<PropertyImageRequest>,
) -> Result<Json<ObjectPath>, CrmError> {
    let property_id = req
        .property_id
        .ok_or_else(|| CrmError::field("propertyId", "is required"))?;
    let object_path = normalize_object_path(&req.image_url)
        .map_err(|e| CrmError::field("imageURL", e.to_string()))?;
    state
        .crm
        .attach_property_image(property_id, &object_path)
        .await?;
    Ok(Json(ObjectPath { object_path }))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route(ApiUrls::OBJECTS_UPLOAD, post(request_upload))
        .route(ApiUrls::PROPERTY_IMAGES, put(set_property_image))
        .route(ApiUrls::OBJECTS, get(get_object).put(put_object))
        .route(ApiUrls::PUBLIC_OBJECTS, get(get_public_object))
}
