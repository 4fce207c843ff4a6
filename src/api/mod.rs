pub mod envelope;
pub mod resource;

use std::{any::Any, sync::Arc};

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;

use self::{envelope::AppMessage, resource::ResourceController};
use crate::{config::Settings, error::ApiError, store::Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settings: Arc<Settings>,
}

impl AppState {
    fn error(&self, err: ApiError) -> AppMessage {
        AppMessage::new_error(err, self.settings.debug)
    }
}

pub fn new_router(s: AppState) -> Router {
    let debug = s.settings.debug;
    Router::new()
        .route("/", get(index))
        .route(
            "/:resource/",
            get(list)
                .post(create)
                .put(missing_id)
                .delete(missing_id)
                .fallback(method_not_allowed),
        )
        .route(
            "/:resource/:id/",
            get(fetch)
                .put(update)
                .delete(remove)
                .fallback(method_not_allowed),
        )
        .fallback(not_found)
        .with_state(s)
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            AppMessage::from_panic(panic, debug).into_response()
        }))
}

pub async fn start_web_server(s: AppState) -> anyhow::Result<()> {
    let addr = s.settings.bind_addr.clone();
    let app = new_router(s);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to API v1!" }))
}

/// Undecodable path segments (e.g. `%FF`) cannot name a resource or row.
fn path_param<T>(path: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    path.map(|Path(value)| value)
        .map_err(|rejection| ApiError::UnknownResource(rejection.body_text()))
}

#[axum::debug_handler]
async fn list(
    State(s): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<AppMessage, AppMessage> {
    let resource = path_param(path).map_err(|err| s.error(err))?;
    let c = ResourceController::for_route(&resource, &s).map_err(|err| s.error(err))?;
    c.list().await.map_err(|err| s.error(err))
}

#[axum::debug_handler]
async fn fetch(
    State(s): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<AppMessage, AppMessage> {
    let (resource, id) = path_param(path).map_err(|err| s.error(err))?;
    let c = ResourceController::for_route(&resource, &s).map_err(|err| s.error(err))?;
    let id = c.parse_id(&id).map_err(|err| s.error(err))?;
    c.get(id).await.map_err(|err| s.error(err))
}

#[axum::debug_handler]
async fn create(
    State(s): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<AppMessage, AppMessage> {
    let resource = path_param(path).map_err(|err| s.error(err))?;
    let c = ResourceController::for_route(&resource, &s).map_err(|err| s.error(err))?;
    let body = body.map_err(|err| s.error(err.into()))?;
    c.create(&body).await.map_err(|err| s.error(err))
}

#[axum::debug_handler]
async fn update(
    State(s): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<AppMessage, AppMessage> {
    let (resource, id) = path_param(path).map_err(|err| s.error(err))?;
    let c = ResourceController::for_route(&resource, &s).map_err(|err| s.error(err))?;
    let id = c.parse_id(&id).map_err(|err| s.error(err))?;
    let body = body.map_err(|err| s.error(err.into()))?;
    c.update(id, &body).await.map_err(|err| s.error(err))
}

#[axum::debug_handler]
async fn remove(
    State(s): State<AppState>,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<AppMessage, AppMessage> {
    let (resource, id) = path_param(path).map_err(|err| s.error(err))?;
    let c = ResourceController::for_route(&resource, &s).map_err(|err| s.error(err))?;
    let id = c.parse_id(&id).map_err(|err| s.error(err))?;
    c.delete(id).await.map_err(|err| s.error(err))
}

#[axum::debug_handler]
async fn missing_id(
    State(s): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> AppMessage {
    let err = path_param(path)
        .and_then(|resource| ResourceController::for_route(&resource, &s).map(|c| c.missing_id()))
        .unwrap_or_else(|err| err);
    s.error(err)
}

#[axum::debug_handler]
async fn method_not_allowed(State(s): State<AppState>) -> AppMessage {
    s.error(ApiError::MethodNotAllowed)
}

#[axum::debug_handler]
async fn not_found(State(s): State<AppState>) -> AppMessage {
    s.error(ApiError::UnknownResource("/".to_string()))
}
