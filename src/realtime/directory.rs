use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::CoreError;
use crate::orders::{self, OrderAccess};

/// Read side the channel needs from the order store: who currently owns and
/// carries an order. Kept behind a trait so the channel policy is testable
/// without a database.
pub trait OrderDirectory: Send + Sync + 'static {
    fn order_access(&self, order_id: Uuid) -> Result<Option<OrderAccess>, CoreError>;
}

pub struct DieselOrderDirectory {
    pool: DbPool,
}

impl DieselOrderDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderDirectory for DieselOrderDirectory {
    fn order_access(&self, order_id: Uuid) -> Result<Option<OrderAccess>, CoreError> {
        let mut conn = self.pool.get()?;
        orders::order_access(&mut conn, order_id)
    }
}
