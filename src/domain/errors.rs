use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::state::OrderState;

/// One offending cart item in a failed stock reservation: how much was asked
/// for versus what the shelf actually holds.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockShortage {
    pub product_id: Uuid,
    pub available: i32,
    pub requested: i32,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Actor is not allowed to perform this operation")]
    Forbidden,
    #[error("Illegal transition {from} -> {to}")]
    InvalidTransition { from: OrderState, to: OrderState },
    #[error("Order already has an assigned courier")]
    AlreadyAssigned,
    #[error("Insufficient stock")]
    StockInsufficient(Vec<StockShortage>),
    #[error("All cart items must belong to the same merchant")]
    CrossMerchantCart,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}
