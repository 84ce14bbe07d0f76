//! Order lifecycle: the creation transaction, the state machine transitions
//! (including courier self-assignment and cancellation restock), and the
//! read queries behind the HTTP surface.
//!
//! Every mutating entry point opens one transaction and takes a `FOR UPDATE`
//! lock on the order row, so racing transitions and assignments serialize at
//! the database.

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::errors::CoreError;
use crate::domain::state::{required_role, OrderState, Role};
use crate::inventory::{self, CartItem};
use crate::models::order::{NewOrder, Order};
use crate::models::order_line::{NewOrderLine, OrderLine};
use crate::schema::{couriers, merchants, order_lines, orders};

/// The trusted identity tuple attached to every request.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

/// Courier self-assignment parameters for the `ready -> picked_up` edge.
#[derive(Debug, Clone)]
pub struct AssignmentRequest {
    pub delivery_fee: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// Who may observe an order: its customer, the merchant's user, and the
/// assigned courier's user (if any). The single source for every ownership
/// check outside the transition path.
#[derive(Debug, Clone, Copy)]
pub struct OrderAccess {
    pub customer_user_id: Uuid,
    pub merchant_user_id: Uuid,
    pub courier_user_id: Option<Uuid>,
}

impl OrderAccess {
    pub fn allows(&self, user_id: Uuid, role: Role) -> bool {
        match role {
            Role::Customer => self.customer_user_id == user_id,
            Role::Merchant => self.merchant_user_id == user_id,
            Role::Courier => self.courier_user_id == Some(user_id),
        }
    }

    pub fn is_assigned_courier(&self, user_id: Uuid) -> bool {
        self.courier_user_id == Some(user_id)
    }
}

fn generate_order_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("VX-{date}-{suffix}")
}

/// Create an order in `placed` state: reserve stock, snapshot prices, persist
/// the order and its lines — all in one transaction. The delivery fee stays
/// at zero until a courier accepts the order.
pub fn create_order(
    conn: &mut PgConnection,
    customer_id: Uuid,
    items: &[CartItem],
    payment_method: Option<String>,
    customer_notes: Option<String>,
) -> Result<OrderWithLines, CoreError> {
    if items.is_empty() {
        return Err(CoreError::InvalidInput("order items are required".into()));
    }

    conn.transaction(|conn| {
        let reservation = inventory::reserve_and_deduct(conn, items)?;

        let order_id = Uuid::new_v4();
        let order: Order = diesel::insert_into(orders::table)
            .values(&NewOrder {
                id: order_id,
                order_number: generate_order_number(),
                customer_id,
                merchant_id: reservation.merchant_id,
                state: OrderState::Placed.to_string(),
                subtotal: reservation.subtotal.clone(),
                delivery_fee: BigDecimal::from(0),
                total: reservation.subtotal.clone(),
                payment_method: payment_method.unwrap_or_else(|| "cash".to_string()),
                paid: false,
                customer_notes,
                placed_at: Utc::now(),
            })
            .returning(Order::as_returning())
            .get_result(conn)?;

        let new_lines: Vec<NewOrderLine> = reservation
            .lines
            .iter()
            .map(|l| NewOrderLine {
                id: Uuid::new_v4(),
                order_id,
                product_id: l.product_id,
                quantity: l.quantity,
                unit_price: l.unit_price.clone(),
                line_subtotal: l.line_subtotal.clone(),
            })
            .collect();
        let lines: Vec<OrderLine> = diesel::insert_into(order_lines::table)
            .values(&new_lines)
            .returning(OrderLine::as_returning())
            .get_results(conn)?;

        Ok(OrderWithLines { order, lines })
    })
}

/// Drive an order along one edge of the state graph.
///
/// The edge table in `domain::state` decides whether the move is legal and
/// which role may take it; this function additionally pins the actor to the
/// matching party (the order's customer, the merchant's user, the assigned
/// courier). `assignment` must be supplied for courier self-assignment on
/// `ready -> picked_up` and must be absent everywhere else.
pub fn transition_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    actor: Actor,
    target: OrderState,
    assignment: Option<AssignmentRequest>,
) -> Result<Order, CoreError> {
    conn.transaction(|conn| {
        let order: Order = orders::table
            .filter(orders::id.eq(order_id))
            .for_update()
            .select(Order::as_select())
            .first(conn)
            .optional()?
            .ok_or(CoreError::NotFound("order"))?;

        let current: OrderState = order
            .state
            .parse()
            .map_err(|_| CoreError::Persistence(format!("unknown order state '{}'", order.state)))?;

        // Assignment happens exactly once. Checked ahead of the edge table so
        // the loser of an acceptance race, who finds the order already in
        // `picked_up`, learns about the standing assignment rather than a
        // missing edge.
        if target == OrderState::PickedUp && assignment.is_some() && order.courier_id.is_some() {
            return Err(CoreError::AlreadyAssigned);
        }

        let needed = required_role(current, target)
            .ok_or(CoreError::InvalidTransition { from: current, to: target })?;
        if actor.role != needed {
            return Err(CoreError::Forbidden);
        }

        match needed {
            Role::Customer => {
                if order.customer_id != actor.user_id {
                    return Err(CoreError::Forbidden);
                }
            }
            Role::Merchant => {
                let merchant_user: Uuid = merchants::table
                    .filter(merchants::id.eq(order.merchant_id))
                    .select(merchants::user_id)
                    .first(conn)?;
                if merchant_user != actor.user_id {
                    return Err(CoreError::Forbidden);
                }
            }
            // Courier identity is checked per edge below, because the
            // picked_up edge is where assignment itself happens.
            Role::Courier => {}
        }

        let now = Utc::now();
        let updated = match target {
            OrderState::Confirmed => diesel::update(&order)
                .set((
                    orders::state.eq(target.to_string()),
                    orders::confirmed_at.eq(now),
                    orders::updated_at.eq(now),
                ))
                .returning(Order::as_returning())
                .get_result(conn)?,
            OrderState::Preparing => diesel::update(&order)
                .set((
                    orders::state.eq(target.to_string()),
                    orders::preparing_at.eq(now),
                    orders::updated_at.eq(now),
                ))
                .returning(Order::as_returning())
                .get_result(conn)?,
            OrderState::Ready => diesel::update(&order)
                .set((
                    orders::state.eq(target.to_string()),
                    orders::ready_at.eq(now),
                    orders::updated_at.eq(now),
                ))
                .returning(Order::as_returning())
                .get_result(conn)?,
            OrderState::PickedUp => pick_up(conn, &order, actor, assignment)?,
            OrderState::Delivered => {
                let courier_id = resolve_courier(conn, actor.user_id)?;
                if order.courier_id != Some(courier_id) {
                    return Err(CoreError::Forbidden);
                }
                diesel::update(&order)
                    .set((
                        orders::state.eq(target.to_string()),
                        orders::delivered_at.eq(now),
                        orders::updated_at.eq(now),
                    ))
                    .returning(Order::as_returning())
                    .get_result(conn)?
            }
            OrderState::Received => diesel::update(&order)
                .set((
                    orders::state.eq(target.to_string()),
                    orders::updated_at.eq(now),
                ))
                .returning(Order::as_returning())
                .get_result(conn)?,
            OrderState::Cancelled => {
                // Restock inside the same transaction; a restock failure
                // rolls the cancellation back.
                let line_quantities: Vec<(Uuid, i32)> = order_lines::table
                    .filter(order_lines::order_id.eq(order.id))
                    .select((order_lines::product_id, order_lines::quantity))
                    .load(conn)?;
                if !line_quantities.is_empty() {
                    inventory::restock(conn, &line_quantities)?;
                }
                diesel::update(&order)
                    .set((
                        orders::state.eq(target.to_string()),
                        orders::updated_at.eq(now),
                    ))
                    .returning(Order::as_returning())
                    .get_result(conn)?
            }
            // No edge leads back into placed; required_role already rejected it.
            OrderState::Placed => unreachable!("no edge into placed"),
        };

        Ok(updated)
    })
}

/// The `ready -> picked_up` edge: courier self-assignment. Courier, fee,
/// recomputed total, pickup stamp and state all land in one write, so two
/// couriers racing to claim the order resolve at the row lock with exactly
/// one winner.
///
/// An order in `ready` never carries a courier; the caller has already
/// rejected repeat assignments before the edge check.
fn pick_up(
    conn: &mut PgConnection,
    order: &Order,
    actor: Actor,
    assignment: Option<AssignmentRequest>,
) -> Result<Order, CoreError> {
    let courier_id = resolve_courier(conn, actor.user_id)?;
    if order.courier_id.is_some() {
        return Err(CoreError::AlreadyAssigned);
    }

    let assignment = assignment.ok_or_else(|| {
        CoreError::InvalidInput("delivery fee is required to accept an order".into())
    })?;
    if assignment.delivery_fee < BigDecimal::from(0) {
        return Err(CoreError::InvalidInput("delivery fee must not be negative".into()));
    }

    let now = Utc::now();
    let total = &order.subtotal + &assignment.delivery_fee;
    Ok(diesel::update(order)
        .set((
            orders::state.eq(OrderState::PickedUp.to_string()),
            orders::courier_id.eq(courier_id),
            orders::delivery_fee.eq(assignment.delivery_fee),
            orders::total.eq(total),
            orders::picked_up_at.eq(now),
            orders::updated_at.eq(now),
        ))
        .returning(Order::as_returning())
        .get_result(conn)?)
}

fn resolve_courier(conn: &mut PgConnection, user_id: Uuid) -> Result<Uuid, CoreError> {
    couriers::table
        .filter(couriers::user_id.eq(user_id))
        .select(couriers::id)
        .first(conn)
        .optional()?
        .ok_or(CoreError::NotFound("courier"))
}

// ── Queries ──────────────────────────────────────────────────────────────────

pub fn find_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<OrderWithLines>, CoreError> {
    let order = orders::table
        .filter(orders::id.eq(id))
        .select(Order::as_select())
        .first(conn)
        .optional()?;

    let Some(order) = order else {
        return Ok(None);
    };

    let lines = order_lines::table
        .filter(order_lines::order_id.eq(order.id))
        .select(OrderLine::as_select())
        .load(conn)?;

    Ok(Some(OrderWithLines { order, lines }))
}

/// Resolve who may observe `order_id`, or `None` for an unknown order.
pub fn order_access(conn: &mut PgConnection, order_id: Uuid) -> Result<Option<OrderAccess>, CoreError> {
    let row: Option<(Uuid, Uuid, Option<Uuid>)> = orders::table
        .inner_join(merchants::table)
        .left_join(couriers::table)
        .filter(orders::id.eq(order_id))
        .select((
            orders::customer_id,
            merchants::user_id,
            couriers::user_id.nullable(),
        ))
        .first(conn)
        .optional()?;

    Ok(row.map(|(customer_user_id, merchant_user_id, courier_user_id)| OrderAccess {
        customer_user_id,
        merchant_user_id,
        courier_user_id,
    }))
}

pub fn list_orders_for_customer(
    conn: &mut PgConnection,
    customer_id: Uuid,
) -> Result<Vec<OrderWithLines>, CoreError> {
    let order_rows: Vec<Order> = orders::table
        .filter(orders::customer_id.eq(customer_id))
        .order(orders::placed_at.desc())
        .select(Order::as_select())
        .load(conn)?;
    with_lines(conn, order_rows)
}

pub fn list_orders_for_merchant_user(
    conn: &mut PgConnection,
    user_id: Uuid,
) -> Result<Vec<OrderWithLines>, CoreError> {
    let merchant_id: Uuid = merchants::table
        .filter(merchants::user_id.eq(user_id))
        .select(merchants::id)
        .first(conn)
        .optional()?
        .ok_or(CoreError::NotFound("merchant"))?;

    let order_rows: Vec<Order> = orders::table
        .filter(orders::merchant_id.eq(merchant_id))
        .order(orders::placed_at.desc())
        .select(Order::as_select())
        .load(conn)?;
    with_lines(conn, order_rows)
}

fn with_lines(
    conn: &mut PgConnection,
    order_rows: Vec<Order>,
) -> Result<Vec<OrderWithLines>, CoreError> {
    let lines: Vec<OrderLine> = OrderLine::belonging_to(&order_rows)
        .select(OrderLine::as_select())
        .load(conn)?;
    Ok(lines
        .grouped_by(&order_rows)
        .into_iter()
        .zip(order_rows)
        .map(|(lines, order)| OrderWithLines { order, lines })
        .collect())
}
