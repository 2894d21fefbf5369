//! Actor identity from request headers.
//!
//! Authentication happens upstream; this layer only reads who the caller
//! claims to be:
//!
//! - `x-actor-role`: `customer`, `vendor` or `admin`
//! - `x-customer-id` / `x-vendor-id`: required for the matching role
//! - `x-actor-id`: optional display id (defaults to the customer/vendor id)

use axum::http::HeaderMap;
use common::{CustomerId, VendorId};
use domain::{Principal, Role};
use uuid::Uuid;

use crate::error::ApiError;

/// Header naming the caller's role.
pub const ROLE_HEADER: &str = "x-actor-role";
/// Header carrying the actor id used in audit fields.
pub const ACTOR_HEADER: &str = "x-actor-id";
/// Header carrying the customer id for the customer role.
pub const CUSTOMER_HEADER: &str = "x-customer-id";
/// Header carrying the vendor id for the vendor role.
pub const VENDOR_HEADER: &str = "x-vendor-id";

/// Builds the calling principal from request headers.
pub fn principal(headers: &HeaderMap) -> Result<Principal, ApiError> {
    let role = header(headers, ROLE_HEADER)?
        .ok_or_else(|| ApiError::BadRequest(format!("missing {ROLE_HEADER} header")))?;
    let actor_id = header(headers, ACTOR_HEADER)?;

    let mut principal = match role.to_ascii_lowercase().as_str() {
        "customer" => Principal::customer(CustomerId::from_uuid(uuid_header(
            headers,
            CUSTOMER_HEADER,
        )?)),
        "vendor" => Principal::vendor(VendorId::from_uuid(uuid_header(headers, VENDOR_HEADER)?)),
        "admin" => Principal::admin(
            actor_id.ok_or_else(|| ApiError::BadRequest(format!("admin requests need {ACTOR_HEADER}")))?,
        ),
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown actor role {other:?}"
            )));
        }
    };

    if let Some(actor_id) = actor_id
        && !matches!(principal.role, Role::Admin)
    {
        principal.actor_id = actor_id.to_string();
    }
    Ok(principal)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| ApiError::BadRequest(format!("{name} is not valid text")))
        })
        .transpose()
        .map(|value| value.filter(|v| !v.is_empty()))
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Uuid, ApiError> {
    let raw = header(headers, name)?
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name} header")))?;
    Uuid::parse_str(raw).map_err(|e| ApiError::BadRequest(format!("invalid {name}: {e}")))
}

/// Customers may only read their own history.
pub fn require_customer(actor: &Principal, customer_id: CustomerId) -> Result<(), ApiError> {
    if actor.is_admin() || actor.customer_id() == Some(customer_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{actor} may not read another customer's orders"
        )))
    }
}

/// Vendors may only read their own inbox and ledger.
pub fn require_vendor(actor: &Principal, vendor_id: VendorId) -> Result<(), ApiError> {
    if actor.is_admin() || actor.vendor_id() == Some(vendor_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{actor} may not read another vendor's records"
        )))
    }
}
