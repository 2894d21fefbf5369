//! Payment reconciliation decisions.
//!
//! The payment state machine runs independently of fulfillment:
//!
//! ```text
//! pending ──proof──▶ awaiting-confirmation ──confirm──▶ paid ──refund──▶ refunded
//!    │                        └──reject──▶ failed ──proof──┘
//!    └──gateway success / cash collected──▶ paid
//! ```

use chrono::{DateTime, Utc};
use common::Money;

use crate::auth::{Access, Principal};

use super::{
    GatewayOutcome, Order, OrderError, OrderEvent, PaymentMethod, PaymentProof, PaymentStatus,
    events::{
        GatewayPaymentFailedData, PaymentConfirmedData, PaymentProofUploadedData,
        PaymentRefundedData, PaymentRejectedData, Settlement,
    },
};

impl Order {
    fn require_method(&self) -> Result<PaymentMethod, OrderError> {
        self.payment_method.ok_or(OrderError::NotFound)
    }

    /// Attaches a manual-transfer proof so a vendor or admin can verify it.
    pub fn upload_payment_proof(
        &self,
        actor: &Principal,
        storage_ref: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OwningCustomer, "upload payment proof")?;

        if self.require_method()? != PaymentMethod::ManualTransfer {
            return Err(OrderError::Validation(
                "payment proof only applies to manual-transfer orders".to_string(),
            ));
        }
        if !matches!(
            self.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        ) {
            return Err(OrderError::payment("upload payment proof", self.payment_status));
        }
        if self.status.is_closed() {
            return Err(OrderError::status("upload payment proof", self.status));
        }

        let storage_ref = storage_ref.trim();
        if storage_ref.is_empty() {
            return Err(OrderError::Validation(
                "a proof reference is required".to_string(),
            ));
        }

        Ok(vec![OrderEvent::PaymentProofUploaded(
            PaymentProofUploadedData {
                proof: PaymentProof {
                    storage_ref: storage_ref.to_string(),
                    uploaded_at: now,
                },
                uploaded_by: actor.actor_id.clone(),
            },
        )])
    }

    /// Confirms a manual transfer after verifying its proof, or records cash
    /// collected on delivery.
    ///
    /// Once the order is paid every further confirmation reports
    /// [`OrderError::AlreadyConfirmed`] instead of producing another capture.
    pub fn confirm_payment(
        &self,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OrderVendor, "confirm payment")?;

        if self.payment_status.is_settled() {
            return Err(OrderError::AlreadyConfirmed);
        }

        let settlement = match (self.require_method()?, self.payment_status) {
            (PaymentMethod::ManualTransfer, PaymentStatus::AwaitingConfirmation) => {
                Settlement::ManualTransfer
            }
            (PaymentMethod::CashOnDelivery, PaymentStatus::Pending) => Settlement::CashOnDelivery,
            (PaymentMethod::Gateway, _) => {
                return Err(OrderError::Validation(
                    "gateway payments are confirmed by the gateway callback".to_string(),
                ));
            }
            (_, current) => return Err(OrderError::payment("confirm payment", current)),
        };

        if self.status.is_closed() {
            return Err(OrderError::status("confirm payment", self.status));
        }

        Ok(vec![OrderEvent::PaymentConfirmed(PaymentConfirmedData {
            settlement,
            amount: self.totals.total,
            reference: None,
            confirmed_by: actor.actor_id.clone(),
            confirming_vendor: actor.vendor_id(),
            confirmed_at: now,
        })])
    }

    /// Rejects an uploaded proof. The customer may upload a new one.
    pub fn reject_payment(
        &self,
        actor: &Principal,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OrderVendor, "reject payment")?;

        if self.payment_status != PaymentStatus::AwaitingConfirmation {
            return Err(OrderError::payment("reject payment", self.payment_status));
        }

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(OrderError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        Ok(vec![OrderEvent::PaymentRejected(PaymentRejectedData {
            reason: reason.to_string(),
            rejected_by: actor.actor_id.clone(),
            rejected_at: now,
        })])
    }

    /// Applies a gateway callback.
    ///
    /// A repeated success for the reference already recorded reports
    /// [`OrderError::AlreadyConfirmed`]; a repeated failure is a no-op.
    pub fn record_gateway_result(
        &self,
        reference: &str,
        outcome: GatewayOutcome,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;

        if self.require_method()? != PaymentMethod::Gateway {
            return Err(OrderError::Validation(
                "order is not paid through the gateway".to_string(),
            ));
        }

        let reference = reference.trim();
        if reference.is_empty() {
            return Err(OrderError::Validation(
                "a gateway reference is required".to_string(),
            ));
        }

        match outcome {
            GatewayOutcome::Succeeded => {
                if self.payment_status.is_settled() {
                    return if self.payment_reference.as_deref() == Some(reference) {
                        Err(OrderError::AlreadyConfirmed)
                    } else {
                        Err(OrderError::payment("capture a second payment", self.payment_status))
                    };
                }

                Ok(vec![OrderEvent::PaymentConfirmed(PaymentConfirmedData {
                    settlement: Settlement::Gateway,
                    amount: self.totals.total,
                    reference: Some(reference.to_string()),
                    confirmed_by: "gateway".to_string(),
                    confirming_vendor: None,
                    confirmed_at: now,
                })])
            }
            GatewayOutcome::Failed { reason } => match self.payment_status {
                PaymentStatus::Pending => Ok(vec![OrderEvent::GatewayPaymentFailed(
                    GatewayPaymentFailedData {
                        reference: reference.to_string(),
                        reason,
                        failed_at: now,
                    },
                )]),
                PaymentStatus::Failed => Ok(vec![]),
                current => Err(OrderError::payment("record a failed charge", current)),
            },
        }
    }

    /// Refunds part or all of a captured payment.
    pub fn refund(
        &self,
        actor: &Principal,
        amount: Money,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_placed()?;
        self.authorize(actor, Access::OrderVendor, "refund this order")?;

        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::payment("refund", self.payment_status));
        }
        if !amount.is_positive() || amount > self.totals.total {
            return Err(OrderError::Validation(format!(
                "refund amount must be between 0.01 and {}",
                self.totals.total
            )));
        }

        Ok(vec![OrderEvent::PaymentRefunded(PaymentRefundedData {
            amount,
            reason,
            refunded_by: actor.actor_id.clone(),
            refunded_at: self.tracking_time(now),
        })])
    }
}
