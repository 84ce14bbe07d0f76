use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Actor roles supplied by the identity collaborator. The core trusts the
/// `{user_id, role}` tuple unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Merchant,
    Courier,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "merchant" => Ok(Role::Merchant),
            "courier" => Ok(Role::Courier),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Customer => "customer",
            Role::Merchant => "merchant",
            Role::Courier => "courier",
        })
    }
}

/// Lifecycle states of an order. Stored as lowercase varchar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Placed,
    Confirmed,
    Preparing,
    Ready,
    PickedUp,
    Delivered,
    Received,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Placed => "placed",
            OrderState::Confirmed => "confirmed",
            OrderState::Preparing => "preparing",
            OrderState::Ready => "ready",
            OrderState::PickedUp => "picked_up",
            OrderState::Delivered => "delivered",
            OrderState::Received => "received",
            OrderState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Received | OrderState::Cancelled)
    }
}

impl FromStr for OrderState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "placed" => Ok(OrderState::Placed),
            "confirmed" => Ok(OrderState::Confirmed),
            "preparing" => Ok(OrderState::Preparing),
            "ready" => Ok(OrderState::Ready),
            "picked_up" => Ok(OrderState::PickedUp),
            "delivered" => Ok(OrderState::Delivered),
            "received" => Ok(OrderState::Received),
            "cancelled" => Ok(OrderState::Cancelled),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single authority for the order state graph: which edges exist and who
/// may drive them. Everything that gates a transition consults this table,
/// never ad hoc branches.
///
/// Returns the role required to take `(from, to)`, or `None` if the edge is
/// not in the graph.
pub fn required_role(from: OrderState, to: OrderState) -> Option<Role> {
    use OrderState::*;
    match (from, to) {
        (Placed, Confirmed) => Some(Role::Merchant),
        (Placed, Cancelled) => Some(Role::Customer),
        (Confirmed, Preparing) => Some(Role::Merchant),
        (Confirmed, Cancelled) => Some(Role::Customer),
        (Preparing, Ready) => Some(Role::Merchant),
        (Ready, PickedUp) => Some(Role::Courier),
        (PickedUp, Delivered) => Some(Role::Courier),
        (Delivered, Received) => Some(Role::Customer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderState; 8] = [
        OrderState::Placed,
        OrderState::Confirmed,
        OrderState::Preparing,
        OrderState::Ready,
        OrderState::PickedUp,
        OrderState::Delivered,
        OrderState::Received,
        OrderState::Cancelled,
    ];

    #[test]
    fn state_str_roundtrip() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<OrderState>(), Ok(s));
        }
        assert!("pending".parse::<OrderState>().is_err());
    }

    #[test]
    fn role_str_roundtrip() {
        for r in [Role::Customer, Role::Merchant, Role::Courier] {
            assert_eq!(r.to_string().parse::<Role>(), Ok(r));
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn happy_path_edges_exist_with_expected_roles() {
        use OrderState::*;
        assert_eq!(required_role(Placed, Confirmed), Some(Role::Merchant));
        assert_eq!(required_role(Confirmed, Preparing), Some(Role::Merchant));
        assert_eq!(required_role(Preparing, Ready), Some(Role::Merchant));
        assert_eq!(required_role(Ready, PickedUp), Some(Role::Courier));
        assert_eq!(required_role(PickedUp, Delivered), Some(Role::Courier));
        assert_eq!(required_role(Delivered, Received), Some(Role::Customer));
    }

    #[test]
    fn cancellation_edges_belong_to_the_customer() {
        use OrderState::*;
        assert_eq!(required_role(Placed, Cancelled), Some(Role::Customer));
        assert_eq!(required_role(Confirmed, Cancelled), Some(Role::Customer));
        assert_eq!(required_role(Preparing, Cancelled), None);
        assert_eq!(required_role(Ready, Cancelled), None);
    }

    #[test]
    fn skipping_states_is_not_an_edge() {
        use OrderState::*;
        assert_eq!(required_role(Preparing, PickedUp), None);
        assert_eq!(required_role(Placed, Ready), None);
        assert_eq!(required_role(Confirmed, Delivered), None);
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in [OrderState::Received, OrderState::Cancelled] {
            assert!(from.is_terminal());
            for to in ALL {
                assert_eq!(required_role(from, to), None);
            }
        }
    }

    #[test]
    fn no_self_loops() {
        for s in ALL {
            assert_eq!(required_role(s, s), None);
        }
    }

    #[test]
    fn graph_has_exactly_eight_edges() {
        let mut edges = 0;
        for from in ALL {
            for to in ALL {
                if required_role(from, to).is_some() {
                    edges += 1;
                }
            }
        }
        assert_eq!(edges, 8);
    }
}
