//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{CustomerId, Money, VendorId};
use domain::RetryPolicy;
use event_store::InMemoryEventStore;
use marketplace::InMemoryCollaborators;
use marketplace::collaborators::RecordingDispatcher;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

enum Actor {
    Anonymous,
    Customer(CustomerId),
    Vendor(VendorId),
    Admin,
}

struct TestApp {
    app: Router,
    customer: CustomerId,
    vendor_a: VendorId,
    vendor_b: VendorId,
}

impl TestApp {
    fn new() -> Self {
        let collab = InMemoryCollaborators::new(Arc::new(RecordingDispatcher::new()));
        let (vendor_a, vendor_b) = (VendorId::new(), VendorId::new());
        let mug = collab
            .catalog
            .list("mug-01", vendor_a, "Stoneware mug", Money::from_major(120));
        let tea = collab
            .catalog
            .list("tea-07", vendor_b, "Rooibos tin", Money::from_minor(4550));
        collab.inventory.set_stock(&mug, 10);
        collab.inventory.set_stock(&tea, 10);

        let state = api::create_state(
            InMemoryEventStore::new(),
            collab.collaborators(),
            RetryPolicy::default(),
        );
        Self {
            app: api::create_app(state, get_metrics_handle()),
            customer: CustomerId::new(),
            vendor_a,
            vendor_b,
        }
    }

    async fn send(&self, method: &str, uri: &str, actor: Actor, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        request = match actor {
            Actor::Anonymous => request,
            Actor::Customer(id) => request
                .header("x-actor-role", "customer")
                .header("x-customer-id", id.to_string()),
            Actor::Vendor(id) => request
                .header("x-actor-role", "vendor")
                .header("x-vendor-id", id.to_string()),
            Actor::Admin => request
                .header("x-actor-role", "admin")
                .header("x-actor-id", "ops-1"),
        };
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn checkout_body(&self, payment_method: &str, tea_quantity: u32) -> Value {
        json!({
            "customer_id": self.customer,
            "items": [
                { "product_id": "mug-01", "quantity": 1 },
                { "product_id": "tea-07", "quantity": tea_quantity }
            ],
            "shipping_address": {
                "full_name": "Sipho Dlamini",
                "phone": "+27 83 000 1111",
                "street": "12 Long St",
                "city": "Cape Town",
                "province": "Western Cape",
                "country": "ZA",
                "postal_code": "8001"
            },
            "payment_method": payment_method,
            "fulfillment_method": "delivery"
        })
    }

    async fn create_order(&self, payment_method: &str) -> String {
        let (status, order) = self
            .send(
                "POST",
                "/orders",
                Actor::Customer(self.customer),
                Some(self.checkout_body(payment_method, 2)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        order["id"].as_str().unwrap().to_string()
    }

    async fn pay_by_gateway(&self, order_id: &str, reference: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/payments/gateway-callback",
            Actor::Anonymous,
            Some(json!({ "order_id": order_id, "reference": reference, "success": true })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new();
    let (status, json) = t.send("GET", "/health", Actor::Anonymous, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["read_models"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new();
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_and_read_order() {
    let t = TestApp::new();
    let (status, order) = t
        .send(
            "POST",
            "/orders",
            Actor::Customer(t.customer),
            Some(t.checkout_body("gateway", 2)),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "pending");
    assert_eq!(order["totals"]["subtotal"], 21_100);
    assert_eq!(order["totals"]["total"], 29_265);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
    let number = order["order_number"].as_str().unwrap();
    assert!(number.starts_with("ORD"));
    assert_eq!(number.len(), 18);

    let id = order["id"].as_str().unwrap();
    let (status, fetched) = t
        .send("GET", &format!("/orders/{id}"), Actor::Customer(t.customer), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["order_number"], number);

    let (status, by_number) = t
        .send(
            "GET",
            &format!("/orders/by-number/{number}"),
            Actor::Vendor(t.vendor_b),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_number["id"], id);
}

#[tokio::test]
async fn test_error_bodies_carry_kind_and_message() {
    let t = TestApp::new();
    let id = t.create_order("gateway").await;

    let (status, err) = t
        .send(
            "GET",
            &format!("/orders/{id}"),
            Actor::Customer(CustomerId::new()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["kind"], "authorization_error");
    assert!(err["message"].as_str().is_some());

    let (status, err) = t
        .send("GET", &format!("/orders/{id}"), Actor::Anonymous, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "validation_error");

    let missing = uuid::Uuid::new_v4();
    let (status, err) = t
        .send("GET", &format!("/orders/{missing}"), Actor::Admin, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["kind"], "not_found");

    let (status, _) = t
        .send("GET", "/orders/not-a-uuid", Actor::Admin, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_insufficient_stock_is_a_conflict() {
    let t = TestApp::new();
    let (status, err) = t
        .send(
            "POST",
            "/orders",
            Actor::Customer(t.customer),
            Some(t.checkout_body("gateway", 50)),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "insufficient_stock");
}

#[tokio::test]
async fn test_manual_transfer_confirmation_flow() {
    let t = TestApp::new();
    let id = t.create_order("manual-transfer").await;

    let (status, _) = t
        .send(
            "POST",
            &format!("/orders/{id}/payment/confirm"),
            Actor::Vendor(t.vendor_a),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, order) = t
        .send(
            "POST",
            &format!("/orders/{id}/payment-proof"),
            Actor::Customer(t.customer),
            Some(json!({ "storage_ref": "proofs/eft-0042.pdf" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["payment_status"], "awaiting-confirmation");

    let (status, confirmed) = t
        .send(
            "POST",
            &format!("/orders/{id}/payment/confirm"),
            Actor::Vendor(t.vendor_a),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["order"]["payment_status"], "paid");
    assert_eq!(confirmed["transaction"]["platform_fee"], 2_927);
    assert_eq!(confirmed["transaction"]["payment_fee"], 0);

    let (status, err) = t
        .send(
            "POST",
            &format!("/orders/{id}/payment/confirm"),
            Actor::Vendor(t.vendor_b),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "already_confirmed");

    let (status, rows) = t
        .send(
            "GET",
            &format!("/orders/{id}/transactions"),
            Actor::Customer(t.customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_gateway_callback_is_idempotent() {
    let t = TestApp::new();
    let id = t.create_order("gateway").await;

    let (status, paid) = t.pay_by_gateway(&id, "ch_123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["order"]["payment_status"], "paid");
    assert_eq!(paid["transaction"]["payment_fee"], 849);

    let (status, err) = t.pay_by_gateway(&id, "ch_123").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "already_confirmed");
}

#[tokio::test]
async fn test_fulfillment_and_cancellation() {
    let t = TestApp::new();
    let id = t.create_order("cash-on-delivery").await;

    let (status, order) = t
        .send(
            "POST",
            &format!("/orders/{id}/items/tea-07/status"),
            Actor::Vendor(t.vendor_b),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "pending");

    let (status, order) = t
        .send(
            "POST",
            &format!("/orders/{id}/status"),
            Actor::Vendor(t.vendor_a),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "shipped");

    let (status, order) = t
        .send(
            "POST",
            &format!("/orders/{id}/shipment"),
            Actor::Vendor(t.vendor_a),
            Some(json!({ "tracking_number": "TRK-9", "carrier": "Courier Guy" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["tracking_number"], "TRK-9");

    let (status, order) = t
        .send(
            "POST",
            &format!("/orders/{id}/tracking"),
            Actor::Vendor(t.vendor_a),
            Some(json!({ "lat": -33.92, "lon": 18.42, "description": "Left the depot" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["whereabouts"]["kind"], "in_transit");

    let (status, err) = t
        .send(
            "POST",
            &format!("/orders/{id}/cancel"),
            Actor::Customer(t.customer),
            Some(json!({ "reason": "too slow" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "invalid_state_transition");
}

#[tokio::test]
async fn test_invoice_groups_by_vendor() {
    let t = TestApp::new();
    let id = t.create_order("gateway").await;

    let (status, invoice) = t
        .send(
            "GET",
            &format!("/orders/{id}/invoice"),
            Actor::Customer(t.customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(invoice["vendor_groups"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_payouts_and_adjustments() {
    let t = TestApp::new();
    let id = t.create_order("gateway").await;
    let (_, paid) = t.pay_by_gateway(&id, "ch_555").await;
    let original = paid["transaction"]["transaction_id"].as_str().unwrap().to_string();

    let payout = json!({ "vendor_id": t.vendor_b });
    let (status, err) = t
        .send(
            "POST",
            &format!("/orders/{id}/payouts"),
            Actor::Vendor(t.vendor_b),
            Some(payout.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["kind"], "authorization_error");

    let (status, first) = t
        .send("POST", &format!("/orders/{id}/payouts"), Actor::Admin, Some(payout.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["created"], true);
    assert_eq!(first["transaction"]["amount"], 9_100);

    let (status, again) = t
        .send("POST", &format!("/orders/{id}/payouts"), Actor::Admin, Some(payout))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["created"], false);

    let (status, adjustment) = t
        .send(
            "POST",
            &format!("/orders/{id}/adjustments"),
            Actor::Admin,
            Some(json!({
                "transaction_id": original,
                "amount_cents": -500,
                "reason": "courier damage credit"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(adjustment["references"], original);
}

#[tokio::test]
async fn test_read_models_follow_writes() {
    let t = TestApp::new();
    let id = t.create_order("gateway").await;
    t.pay_by_gateway(&id, "ch_900").await;

    let (status, history) = t
        .send(
            "GET",
            &format!("/customers/{}/orders", t.customer),
            Actor::Customer(t.customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["payment_status"], "paid");

    let (status, inbox) = t
        .send(
            "GET",
            &format!("/vendors/{}/orders", t.vendor_b),
            Actor::Vendor(t.vendor_b),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox[0]["lines"].as_array().unwrap().len(), 1);
    assert_eq!(inbox[0]["vendor_subtotal"], 9_100);

    let (status, ledger) = t
        .send(
            "GET",
            &format!("/vendors/{}/ledger", t.vendor_a),
            Actor::Vendor(t.vendor_a),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger["gross"], 29_265);
    assert_eq!(ledger["net"], 25_489);

    let (status, err) = t
        .send(
            "GET",
            &format!("/vendors/{}/ledger", t.vendor_a),
            Actor::Vendor(t.vendor_b),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["kind"], "authorization_error");
}
