//! Acting principals and the access rules applied to orders.

use std::fmt;

use common::{CustomerId, VendorId};
use serde::{Deserialize, Serialize};

/// Who is performing an operation, as supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor_id: String,
    pub role: Role,
}

/// What a principal is allowed to act as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Role {
    Customer(CustomerId),
    Vendor(VendorId),
    Admin,
}

impl Principal {
    /// A customer acting on their own orders.
    pub fn customer(customer_id: CustomerId) -> Self {
        Self {
            actor_id: customer_id.to_string(),
            role: Role::Customer(customer_id),
        }
    }

    /// A vendor acting on its own lines.
    pub fn vendor(vendor_id: VendorId) -> Self {
        Self {
            actor_id: vendor_id.to_string(),
            role: Role::Vendor(vendor_id),
        }
    }

    /// A platform administrator.
    pub fn admin(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            role: Role::Admin,
        }
    }

    /// Used for operations driven by the platform itself, such as gateway callbacks.
    pub fn system() -> Self {
        Self::admin("system")
    }

    /// Returns true for administrators.
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    /// Returns the customer id when acting as a customer.
    pub fn customer_id(&self) -> Option<CustomerId> {
        match self.role {
            Role::Customer(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the vendor id when acting as a vendor.
    pub fn vendor_id(&self) -> Option<VendorId> {
        match self.role {
            Role::Vendor(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            Role::Customer(_) => "customer",
            Role::Vendor(_) => "vendor",
            Role::Admin => "admin",
        };
        write!(f, "{role}:{}", self.actor_id)
    }
}

/// Which parties of an order may perform an action. Admins always may.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The customer who placed the order.
    OwningCustomer,
    /// Any vendor with a line item on the order.
    OrderVendor,
    /// The owning customer or any vendor on the order.
    Participant,
    AdminOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_accessors() {
        let vendor = VendorId::new();
        let principal = Principal::vendor(vendor);
        assert_eq!(principal.vendor_id(), Some(vendor));
        assert_eq!(principal.customer_id(), None);
        assert!(!principal.is_admin());
        assert!(Principal::system().is_admin());
    }

    #[test]
    fn display_includes_role() {
        let principal = Principal::admin("ops-7");
        assert_eq!(principal.to_string(), "admin:ops-7");
    }
}
