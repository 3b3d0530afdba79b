//! Axum router and all HTTP handlers for shopd.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! Identity arrives pre-verified in the `x-user-id` / `x-user-role` headers;
//! an upstream gateway owns credential checking, this service only enforces
//! authorization. The catalog read surface is public; everything touching
//! orders requires a well-formed identity pair.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::error;
use uuid::Uuid;

use shopd_coordinator::{CoordinatorError, Identity};
use shopd_orders::money;
use shopd_schemas::{NewProduct, PaymentStatus, Role};
use shopd_store::ProductFilter;

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, NewOrderRequest, NewProductRequest, OrderResponse,
        ProductListQuery, ProductResponse, StatusResponse, UpdateOrderRequest,
    },
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status_handler))
        .route("/api/products", get(products_list).post(product_create))
        .route("/api/products/:id", get(product_get))
        .route("/api/orders", get(orders_list).post(order_create))
        .route(
            "/api/orders/:id",
            get(order_get).put(order_update).delete(order_cancel),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Route-level failure: an HTTP status plus the uniform JSON error body.
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized(message: &str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.to_string(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        let status = match &err {
            CoordinatorError::Validation { .. }
            | CoordinatorError::InsufficientStock { .. }
            | CoordinatorError::InvalidTransition { .. }
            | CoordinatorError::OrderTerminal { .. } => StatusCode::BAD_REQUEST,
            CoordinatorError::Forbidden => StatusCode::FORBIDDEN,
            CoordinatorError::ProductNotFound { .. } | CoordinatorError::OrderNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::Conflict { .. } => StatusCode::CONFLICT,
            CoordinatorError::InvariantViolation { .. } | CoordinatorError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        // 5xx detail stays in the logs; clients get a generic line.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "request failed on an internal error");
            "internal error".to_string()
        } else {
            err.to_string()
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Identity headers
// ---------------------------------------------------------------------------

pub(crate) const H_USER_ID: &str = "x-user-id";
pub(crate) const H_USER_ROLE: &str = "x-user-role";

/// Resolve the caller from the trusted identity headers. Missing or
/// malformed values are a 401; role enforcement happens in the coordinator.
fn identity(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let user_id = headers
        .get(H_USER_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ApiError::unauthorized("missing or malformed x-user-id header"))?;
    let role = headers
        .get(H_USER_ROLE)
        .and_then(|v| v.to_str().ok())
        .and_then(Role::parse)
        .ok_or_else(|| ApiError::unauthorized("missing or malformed x-user-role header"))?;
    Ok(Identity::new(user_id, role))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            uptime_secs: uptime_secs(),
            store_backend: st.store_backend.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /api/products
// ---------------------------------------------------------------------------

/// Public catalog listing with optional filters.
pub(crate) async fn products_list(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ProductListQuery>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let filter = product_filter(q)?;
    let products = st.coordinator.list_products(&filter).await?;
    Ok(Json(
        products.into_iter().map(ProductResponse::from).collect(),
    ))
}

fn product_filter(q: ProductListQuery) -> Result<ProductFilter, ApiError> {
    let min_price_cents = q
        .min_price
        .map(money::price_to_cents)
        .transpose()
        .map_err(|err| ApiError::bad_request(format!("min_price: {err}")))?;
    let max_price_cents = q
        .max_price
        .map(money::price_to_cents)
        .transpose()
        .map_err(|err| ApiError::bad_request(format!("max_price: {err}")))?;
    Ok(ProductFilter {
        category: q.category,
        brand: q.brand,
        featured: q.featured,
        min_price_cents,
        max_price_cents,
    })
}

// ---------------------------------------------------------------------------
// GET /api/products/:id
// ---------------------------------------------------------------------------

pub(crate) async fn product_get(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProductResponse>, ApiError> {
    let product = st.coordinator.get_product(id).await?;
    Ok(Json(product.into()))
}

// ---------------------------------------------------------------------------
// POST /api/products
// ---------------------------------------------------------------------------

/// Add a catalog entry. Admin-only; the coordinator enforces the role.
pub(crate) async fn product_create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let caller = identity(&headers)?;
    let price_cents = money::price_to_cents(req.price)
        .map_err(|err| ApiError::bad_request(format!("price: {err}")))?;
    let new = NewProduct {
        brand: req.brand,
        model: req.model,
        category: req.category,
        specs: req.specs,
        featured: req.featured,
        price_cents,
        stock: req.stock,
    };
    let product = st.coordinator.create_product(new, &caller).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

// ---------------------------------------------------------------------------
// POST /api/orders
// ---------------------------------------------------------------------------

pub(crate) async fn order_create(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let caller = identity(&headers)?;
    let order = st.coordinator.create_order(req.into(), &caller).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

// ---------------------------------------------------------------------------
// GET /api/orders
// ---------------------------------------------------------------------------

/// Owner-scoped listing; admins see every order.
pub(crate) async fn orders_list(
    State(st): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let caller = identity(&headers)?;
    let orders = st.coordinator.list_orders(&caller).await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

// ---------------------------------------------------------------------------
// GET /api/orders/:id
// ---------------------------------------------------------------------------

pub(crate) async fn order_get(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = identity(&headers)?;
    let order = st.coordinator.get_order(id, &caller).await?;
    Ok(Json(order.into()))
}

// ---------------------------------------------------------------------------
// PUT /api/orders/:id
// ---------------------------------------------------------------------------

/// One lifecycle event per request: `payment_status` drives the payment
/// table, `status` may only request the verified stamp, and `admin_notes`
/// may accompany either or stand alone. Both lifecycle fields at once is
/// rejected rather than guessed at.
pub(crate) async fn order_update(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = identity(&headers)?;

    if req.status.is_some() && req.payment_status.is_some() {
        return Err(ApiError::bad_request(
            "send either status or payment_status, not both",
        ));
    }

    let order = if let Some(target) = req.payment_status.as_deref() {
        let target = PaymentStatus::parse(target)
            .ok_or_else(|| ApiError::bad_request(format!("unknown payment_status: {target}")))?;
        st.coordinator
            .apply_payment(id, target, req.admin_notes, &caller)
            .await?
    } else if let Some(status) = req.status.as_deref() {
        if status != "verified" {
            return Err(ApiError::bad_request(
                "status only accepts \"verified\"; payment_status drives the lifecycle",
            ));
        }
        st.coordinator
            .mark_verified(id, req.admin_notes, &caller)
            .await?
    } else if let Some(notes) = req.admin_notes {
        st.coordinator.update_admin_notes(id, notes, &caller).await?
    } else {
        return Err(ApiError::bad_request("nothing to update"));
    };

    Ok(Json(order.into()))
}

// ---------------------------------------------------------------------------
// DELETE /api/orders/:id
// ---------------------------------------------------------------------------

/// Cancellation. The row is kept with a cancelled status, never removed;
/// owner/admin rules live in the coordinator.
pub(crate) async fn order_cancel(
    State(st): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError> {
    let caller = identity(&headers)?;
    let order = st.coordinator.cancel_order(id, &caller).await?;
    Ok(Json(order.into()))
}
