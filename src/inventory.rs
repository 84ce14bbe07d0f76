//! Inventory ledger: the lock-guarded counter of purchasable units per
//! product.
//!
//! Both entry points run inside a caller-provided transaction and take their
//! row locks with `SELECT ... FOR UPDATE`, so two orders racing for the same
//! stock unit serialize at the database. Stock is always re-read under the
//! lock; a pre-lock snapshot is never trusted.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::errors::{CoreError, StockShortage};
use crate::models::product::Product;
use crate::schema::products;

#[derive(Debug, Clone)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Price snapshot for one reserved cart item, taken under the row lock.
#[derive(Debug, Clone)]
pub struct LineSnapshot {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub line_subtotal: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub merchant_id: Uuid,
    pub lines: Vec<LineSnapshot>,
    pub subtotal: BigDecimal,
}

/// Merge duplicate product ids, summing quantities. The ledger accounts for
/// each product exactly once per reservation.
fn merge_items(items: &[CartItem]) -> Result<BTreeMap<Uuid, i32>, CoreError> {
    let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in items {
        if item.quantity < 1 {
            return Err(CoreError::InvalidInput(format!(
                "quantity must be >= 1 for product {}",
                item.product_id
            )));
        }
        *merged.entry(item.product_id).or_insert(0) += item.quantity;
    }
    Ok(merged)
}

/// Validate and deduct stock for every cart item, all-or-nothing.
///
/// Must be called inside a transaction. Fails without mutating anything when
/// a product is missing, the cart spans merchants, or any item exceeds the
/// available stock; the `StockInsufficient` failure itemizes every offending
/// product so the client can adjust and retry.
pub fn reserve_and_deduct(
    conn: &mut PgConnection,
    items: &[CartItem],
) -> Result<Reservation, CoreError> {
    if items.is_empty() {
        return Err(CoreError::InvalidInput("order items are required".into()));
    }
    let merged = merge_items(items)?;
    let ids: Vec<Uuid> = merged.keys().copied().collect();

    // Stable id order keeps concurrent reservations acquiring locks in the
    // same sequence.
    let locked: Vec<Product> = products::table
        .filter(products::id.eq_any(&ids))
        .order(products::id.asc())
        .for_update()
        .select(Product::as_select())
        .load(conn)?;

    if locked.len() != ids.len() {
        return Err(CoreError::NotFound("product"));
    }

    let mut merchant_ids: Vec<Uuid> = locked.iter().map(|p| p.merchant_id).collect();
    merchant_ids.dedup();
    if merchant_ids.len() != 1 {
        return Err(CoreError::CrossMerchantCart);
    }
    let merchant_id = merchant_ids[0];

    let mut shortages = Vec::new();
    for product in &locked {
        let requested = merged[&product.id];
        if !product.available || product.stock < requested {
            shortages.push(StockShortage {
                product_id: product.id,
                available: product.stock,
                requested,
            });
        }
    }
    if !shortages.is_empty() {
        return Err(CoreError::StockInsufficient(shortages));
    }

    let mut lines = Vec::with_capacity(locked.len());
    let mut subtotal = BigDecimal::from(0);
    for product in &locked {
        let requested = merged[&product.id];
        let line_subtotal = &product.price * BigDecimal::from(requested);
        subtotal += &line_subtotal;
        lines.push(LineSnapshot {
            product_id: product.id,
            quantity: requested,
            unit_price: product.price.clone(),
            line_subtotal,
        });

        let new_stock = product.stock - requested;
        diesel::update(products::table.filter(products::id.eq(product.id)))
            .set((
                products::stock.eq(new_stock),
                // Availability follows the shelf: empty shelf, nothing to sell.
                products::available.eq(product.available && new_stock > 0),
                products::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
    }

    Ok(Reservation {
        merchant_id,
        lines,
        subtotal,
    })
}

/// Return previously deducted quantities to stock (cancellation path).
///
/// Must be called inside the same transaction as the state write that
/// triggered it. A product whose stock becomes positive is re-enabled,
/// overriding any manual disable.
pub fn restock(conn: &mut PgConnection, items: &[(Uuid, i32)]) -> Result<(), CoreError> {
    let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
    for (product_id, quantity) in items {
        *merged.entry(*product_id).or_insert(0) += quantity;
    }
    let ids: Vec<Uuid> = merged.keys().copied().collect();

    let locked: Vec<Product> = products::table
        .filter(products::id.eq_any(&ids))
        .order(products::id.asc())
        .for_update()
        .select(Product::as_select())
        .load(conn)?;

    if locked.len() != ids.len() {
        return Err(CoreError::NotFound("product"));
    }

    for product in &locked {
        let new_stock = product.stock + merged[&product.id];
        diesel::update(products::table.filter(products::id.eq(product.id)))
            .set((
                products::stock.eq(new_stock),
                products::available.eq(new_stock > 0),
                products::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;
    }

    Ok(())
}
