use actix_web::{web, HttpResponse};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::CoreError;
use crate::domain::state::{OrderState, Role};
use crate::errors::AppError;
use crate::identity::Identity;
use crate::inventory::CartItem;
use crate::orders::{self, AssignmentRequest, OrderWithLines};

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub items: Vec<CartItemRequest>,
    pub payment_method: Option<String>,
    pub customer_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub target_state: OrderState,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AcceptOrderRequest {
    /// Decimal fee as a string to avoid floating-point issues, e.g. "2.50"
    pub delivery_fee: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: String,
    pub line_subtotal: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub state: String,
    pub subtotal: String,
    pub delivery_fee: String,
    pub total: String,
    pub payment_method: String,
    pub paid: bool,
    pub customer_notes: Option<String>,
    pub placed_at: String,
    pub confirmed_at: Option<String>,
    pub preparing_at: Option<String>,
    pub ready_at: Option<String>,
    pub picked_up_at: Option<String>,
    pub delivered_at: Option<String>,
    pub lines: Vec<OrderLineResponse>,
}

impl From<OrderWithLines> for OrderResponse {
    fn from(value: OrderWithLines) -> Self {
        let OrderWithLines { order, lines } = value;
        OrderResponse {
            id: order.id,
            order_number: order.order_number,
            customer_id: order.customer_id,
            merchant_id: order.merchant_id,
            courier_id: order.courier_id,
            state: order.state,
            subtotal: order.subtotal.to_string(),
            delivery_fee: order.delivery_fee.to_string(),
            total: order.total.to_string(),
            payment_method: order.payment_method,
            paid: order.paid,
            customer_notes: order.customer_notes,
            placed_at: order.placed_at.to_rfc3339(),
            confirmed_at: order.confirmed_at.map(|t| t.to_rfc3339()),
            preparing_at: order.preparing_at.map(|t| t.to_rfc3339()),
            ready_at: order.ready_at.map(|t| t.to_rfc3339()),
            picked_up_at: order.picked_up_at.map(|t| t.to_rfc3339()),
            delivered_at: order.delivered_at.map(|t| t.to_rfc3339()),
            lines: lines
                .into_iter()
                .map(|l| OrderLineResponse {
                    id: l.id,
                    product_id: l.product_id,
                    quantity: l.quantity,
                    unit_price: l.unit_price.to_string(),
                    line_subtotal: l.line_subtotal.to_string(),
                })
                .collect(),
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST /orders
///
/// Places a new order for the calling customer. Stock reservation, order and
/// line persistence all land in a single database transaction.
#[utoipa::path(
    post,
    path = "/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed", body = OrderResponse),
        (status = 400, description = "Empty cart, bad quantity, or cross-merchant cart"),
        (status = 409, description = "Insufficient stock, itemized per product"),
    ),
    tag = "orders"
)]
pub async fn create_order(
    pool: web::Data<DbPool>,
    identity: Identity,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    if identity.role != Role::Customer {
        return Err(CoreError::Forbidden.into());
    }
    let body = body.into_inner();

    let result = web::block(move || {
        let mut conn = pool.get().map_err(CoreError::from)?;
        let items: Vec<CartItem> = body
            .items
            .iter()
            .map(|i| CartItem {
                product_id: i.product_id,
                quantity: i.quantity,
            })
            .collect();
        orders::create_order(
            &mut conn,
            identity.user_id,
            &items,
            body.payment_method,
            body.customer_notes,
        )
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Created().json(OrderResponse::from(result)))
}

/// GET /orders/{id}
///
/// Returns the order with its lines. Visible only to the order's customer,
/// the merchant's user, and the assigned courier.
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found", body = OrderResponse),
        (status = 403, description = "Caller is not a participant"),
        (status = 404, description = "Order not found"),
    ),
    tag = "orders"
)]
pub async fn get_order(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();

    let result = web::block(move || {
        let mut conn = pool.get().map_err(CoreError::from)?;
        let access = orders::order_access(&mut conn, order_id)?
            .ok_or(CoreError::NotFound("order"))?;
        if !access.allows(identity.user_id, identity.role) {
            return Err(CoreError::Forbidden);
        }
        orders::find_order(&mut conn, order_id)?.ok_or(CoreError::NotFound("order"))
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(OrderResponse::from(result)))
}

/// GET /orders/mine
///
/// The calling customer's orders, newest first.
#[utoipa::path(
    get,
    path = "/orders/mine",
    responses((status = 200, description = "Orders of the calling customer", body = [OrderResponse])),
    tag = "orders"
)]
pub async fn list_my_orders(
    pool: web::Data<DbPool>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    if identity.role != Role::Customer {
        return Err(CoreError::Forbidden.into());
    }

    let result = web::block(move || {
        let mut conn = pool.get().map_err(CoreError::from)?;
        orders::list_orders_for_customer(&mut conn, identity.user_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<OrderResponse> = result.into_iter().map(OrderResponse::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// GET /orders/merchant
///
/// Orders of the calling merchant user's shop, newest first.
#[utoipa::path(
    get,
    path = "/orders/merchant",
    responses(
        (status = 200, description = "Orders of the calling merchant", body = [OrderResponse]),
        (status = 404, description = "Caller has no merchant profile"),
    ),
    tag = "orders"
)]
pub async fn list_merchant_orders(
    pool: web::Data<DbPool>,
    identity: Identity,
) -> Result<HttpResponse, AppError> {
    if identity.role != Role::Merchant {
        return Err(CoreError::Forbidden.into());
    }

    let result = web::block(move || {
        let mut conn = pool.get().map_err(CoreError::from)?;
        orders::list_orders_for_merchant_user(&mut conn, identity.user_id)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    let items: Vec<OrderResponse> = result.into_iter().map(OrderResponse::from).collect();
    Ok(HttpResponse::Ok().json(items))
}

/// POST /orders/{id}/transition
///
/// Drives the order along one edge of the state graph; the edge table decides
/// legality and the required actor.
#[utoipa::path(
    post,
    path = "/orders/{id}/transition",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Order transitioned", body = OrderResponse),
        (status = 403, description = "Wrong role or wrong party"),
        (status = 409, description = "Not a legal transition from the current state"),
    ),
    tag = "orders"
)]
pub async fn transition_order(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<TransitionRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let target = body.into_inner().target_state;
    run_transition(pool, identity, order_id, target, None).await
}

/// POST /orders/{id}/accept
///
/// Courier self-assignment: binds the calling courier to the order, fixes the
/// delivery fee, recomputes the total, and moves `ready -> picked_up` — all
/// in one indivisible step.
#[utoipa::path(
    post,
    path = "/orders/{id}/accept",
    params(("id" = Uuid, Path, description = "Order UUID")),
    request_body = AcceptOrderRequest,
    responses(
        (status = 200, description = "Order accepted and picked up", body = OrderResponse),
        (status = 400, description = "Missing or negative delivery fee"),
        (status = 409, description = "Order already has a courier"),
    ),
    tag = "orders"
)]
pub async fn accept_order(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<AcceptOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    let body = body.into_inner();
    let delivery_fee = BigDecimal::from_str(&body.delivery_fee).map_err(|e| {
        CoreError::InvalidInput(format!("invalid delivery_fee '{}': {}", body.delivery_fee, e))
    })?;
    run_transition(
        pool,
        identity,
        order_id,
        OrderState::PickedUp,
        Some(AssignmentRequest { delivery_fee }),
    )
    .await
}

/// POST /orders/{id}/cancel
///
/// Customer cancellation; every order line is restocked in the same
/// transaction as the state write.
#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order cancelled and stock restored", body = OrderResponse),
        (status = 409, description = "Order is past the cancellable states"),
    ),
    tag = "orders"
)]
pub async fn cancel_order(
    pool: web::Data<DbPool>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order_id = path.into_inner();
    run_transition(pool, identity, order_id, OrderState::Cancelled, None).await
}

async fn run_transition(
    pool: web::Data<DbPool>,
    identity: Identity,
    order_id: Uuid,
    target: OrderState,
    assignment: Option<AssignmentRequest>,
) -> Result<HttpResponse, AppError> {
    let order = web::block(move || {
        let mut conn = pool.get().map_err(CoreError::from)?;
        orders::transition_order(&mut conn, order_id, identity.actor(), target, assignment)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))??;

    // Transition responses carry the order itself; clients refetch lines via
    // GET /orders/{id} when they need them.
    Ok(HttpResponse::Ok().json(OrderResponse::from(OrderWithLines {
        order,
        lines: vec![],
    })))
}
