// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-resource HTTP surface.
//!
//! URL shape for a resource named `R`:
//!
//! ```text
//! GET    /R          list, query params offset (0), limit (10), selector
//! POST   /R          create
//! GET    /R/{key}    fetch one
//! PUT    /R/{key}    replace
//! DELETE /R/{key}    delete, answers a Success Status
//! ```
//!
//! Every error is rendered as the `Status` envelope under its HTTP
//! code.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use flywheel_apis::{ListOptions, Object, ObjectList, Status, StatusError};
use flywheel_storage::Record;

use crate::core::RestApi;

/// Build the router serving one resource.
pub fn router<A, S>(api: Arc<RestApi<A, S>>) -> Router
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    let name = api.name().to_string();
    Router::new()
        .route(&format!("/{name}"), get(list::<A, S>).post(create::<A, S>))
        .route(
            &format!("/{name}/:key"),
            get(get_one::<A, S>)
                .put(update::<A, S>)
                .delete(delete_one::<A, S>),
        )
        .with_state(api)
}

/// Status-envelope rendering for handler errors.
struct ApiError(StatusError);

impl From<StatusError> for ApiError {
    fn from(error: StatusError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.0.status.code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(self.0.status)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    offset: Option<i64>,
    limit: Option<i64>,
    selector: Option<String>,
}

async fn get_one<A, S>(
    State(api): State<Arc<RestApi<A, S>>>,
    Path(key): Path<String>,
) -> Result<Json<A>, ApiError>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    Ok(Json(api.get(&key).await?))
}

async fn list<A, S>(
    State(api): State<Arc<RestApi<A, S>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ObjectList<A>>, ApiError>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    let opts = ListOptions {
        offset: params.offset.unwrap_or(0),
        limit: params.limit.unwrap_or(10),
        selector: params.selector.unwrap_or_default(),
    };
    Ok(Json(api.list(opts).await?))
}

async fn create<A, S>(
    State(api): State<Arc<RestApi<A, S>>>,
    Json(obj): Json<A>,
) -> Result<Json<A>, ApiError>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    Ok(Json(api.create(obj).await?))
}

async fn update<A, S>(
    State(api): State<Arc<RestApi<A, S>>>,
    Path(key): Path<String>,
    Json(obj): Json<A>,
) -> Result<Json<A>, ApiError>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    Ok(Json(api.update(&key, obj).await?))
}

async fn delete_one<A, S>(
    State(api): State<Arc<RestApi<A, S>>>,
    Path(key): Path<String>,
) -> Result<Json<Status>, ApiError>
where
    A: Object + Default + Serialize + DeserializeOwned + 'static,
    S: Record,
{
    api.delete(&key).await?;
    Ok(Json(Status::success()))
}
