use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::couriers;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = couriers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Courier {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = couriers)]
pub struct NewCourier {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}
