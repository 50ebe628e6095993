#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use commerce_service::models::{
    Batch, BatchStatus, FieldUpdate, NewPayment, NewPlan, Payment, PaymentMode, PaymentStatus, Plan,
    SeasonUpdate, Subscription, SubscriptionStatus,
};
use commerce_service::services::razorpay::{
    CreateOrderRequest, GatewayError, PaymentGateway, RazorpayOrder, RazorpayRefund,
    RefundRequest, SignatureVerifier,
};
use commerce_service::services::repository::{
    BatchDeletion, CancellationSettlement, CaptureOutcome, CommerceRepository, PaymentCapture,
    PlanRemoval,
};
use commerce_service::services::LocalOrderThrottle;
use commerce_service::AppState;
use secrecy::Secret;
use service_core::error::AppError;
use service_core::middleware::signature::SignatureConfig;
use service_core::utils::signature::hmac_sha256_hex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_USER_ID: &str = "user_test_0001";
pub const OTHER_USER_ID: &str = "user_test_0002";
pub const TEST_ADMIN_ID: &str = "admin_test_0001";
pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";

#[derive(Default)]
struct Store {
    batches: Vec<Batch>,
    plans: Vec<Plan>,
    subscriptions: Vec<Subscription>,
    payments: Vec<Payment>,
}

/// In-memory `CommerceRepository`. One lock per call keeps every
/// multi-row operation atomic.
#[derive(Default)]
pub struct MockCommerceRepository {
    store: Mutex<Store>,
    pub fail_writes: AtomicBool,
}

fn plan_from(batch_id: Uuid, plan: &NewPlan, now: DateTime<Utc>) -> Plan {
    Plan {
        plan_id: Uuid::new_v4(),
        batch_id,
        title: plan.title.clone(),
        description: plan.description.clone(),
        price: plan.price,
        features: plan.features.clone(),
        validity_days: plan.validity_days,
        allow_installments: plan.allow_installments,
        total_installments: plan.total_installments,
        full_payment_discount: plan.full_payment_discount,
        is_active: plan.is_active,
        created_utc: now,
        updated_utc: now,
    }
}

impl MockCommerceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_writes(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!("connection reset")));
        }
        Ok(())
    }

    pub fn seed_season(&self, name: &str, close: Option<DateTime<Utc>>) -> Batch {
        let now = Utc::now();
        let batch = Batch {
            batch_id: Uuid::new_v4(),
            name: name.to_string(),
            status: BatchStatus::Active.as_str().to_string(),
            start_date: now - Duration::days(30),
            registration_close_date: close,
            end_date: None,
            created_utc: now,
            updated_utc: now,
        };
        let mut store = self.store.lock().unwrap();
        for b in store.batches.iter_mut() {
            if b.is_active() {
                b.status = BatchStatus::Archived.as_str().to_string();
            }
        }
        store.batches.push(batch.clone());
        batch
    }

    pub fn seed_plan(&self, batch_id: Uuid, price: i64, installments: i32, discount: i32) -> Plan {
        let plan = plan_from(
            batch_id,
            &NewPlan {
                title: format!("Plan {}", price),
                description: None,
                price,
                features: vec!["Live sessions".to_string()],
                validity_days: 365,
                allow_installments: installments > 1,
                total_installments: installments,
                full_payment_discount: discount,
                is_active: true,
            },
            Utc::now(),
        );
        self.store.lock().unwrap().plans.push(plan.clone());
        plan
    }

    pub fn seed_subscription(
        &self,
        user_id: &str,
        plan: &Plan,
        status: SubscriptionStatus,
        start_date: DateTime<Utc>,
        installments_paid: i32,
        amount_paid: i64,
    ) -> Subscription {
        let now = Utc::now();
        let sub = Subscription {
            subscription_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            plan_id: plan.plan_id,
            status: status.as_str().to_string(),
            start_date,
            end_date: start_date + Duration::days(i64::from(plan.validity_days)),
            total_amount: plan.price,
            amount_paid,
            installments_paid,
            created_utc: now,
            updated_utc: now,
        };
        self.store.lock().unwrap().subscriptions.push(sub.clone());
        sub
    }

    pub fn seed_payment(
        &self,
        user_id: &str,
        order_id: &str,
        razorpay_payment_id: Option<&str>,
        amount: i64,
        status: PaymentStatus,
        subscription_id: Option<Uuid>,
    ) -> Payment {
        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            subscription_id,
            plan_id: Uuid::nil(),
            razorpay_order_id: order_id.to_string(),
            razorpay_payment_id: razorpay_payment_id.map(str::to_string),
            amount,
            status: status.as_str().to_string(),
            payment_mode: PaymentMode::Full.as_str().to_string(),
            installment_index: 1,
            created_utc: now,
            updated_utc: now,
        };
        self.store.lock().unwrap().payments.push(payment.clone());
        payment
    }

    /// A created, unverified order priced for `plan_id`.
    pub fn seed_order(
        &self,
        user_id: &str,
        order_id: &str,
        plan_id: Uuid,
        amount: i64,
        mode: PaymentMode,
    ) -> Payment {
        let mut store = self.store.lock().unwrap();
        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            subscription_id: None,
            plan_id,
            razorpay_order_id: order_id.to_string(),
            razorpay_payment_id: None,
            amount,
            status: PaymentStatus::Created.as_str().to_string(),
            payment_mode: mode.as_str().to_string(),
            installment_index: 1,
            created_utc: now,
            updated_utc: now,
        };
        store.payments.push(payment.clone());
        payment
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.store.lock().unwrap().batches.clone()
    }

    pub fn plans(&self) -> Vec<Plan> {
        self.store.lock().unwrap().plans.clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.store.lock().unwrap().subscriptions.clone()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.store.lock().unwrap().payments.clone()
    }

    pub fn subscription(&self, id: Uuid) -> Subscription {
        self.subscriptions()
            .into_iter()
            .find(|s| s.subscription_id == id)
            .expect("subscription exists")
    }

    pub fn payment_by_order(&self, order_id: &str) -> Payment {
        self.payments()
            .into_iter()
            .find(|p| p.razorpay_order_id == order_id)
            .expect("payment exists")
    }
}

#[async_trait]
impl CommerceRepository for MockCommerceRepository {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn launch_season(
        &self,
        name: &str,
        registration_close_date: Option<DateTime<Utc>>,
        plans: &[NewPlan],
        now: DateTime<Utc>,
    ) -> Result<(Batch, Vec<Plan>), AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();

        for b in store.batches.iter_mut().filter(|b| b.is_active()) {
            b.status = BatchStatus::Archived.as_str().to_string();
            b.end_date = Some(now);
            b.updated_utc = now;
        }

        let batch = Batch {
            batch_id: Uuid::new_v4(),
            name: name.to_string(),
            status: BatchStatus::Active.as_str().to_string(),
            start_date: now,
            registration_close_date,
            end_date: None,
            created_utc: now,
            updated_utc: now,
        };
        let created: Vec<Plan> = plans
            .iter()
            .map(|p| plan_from(batch.batch_id, p, now))
            .collect();

        store.batches.push(batch.clone());
        store.plans.extend(created.iter().cloned());
        Ok((batch, created))
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store.batches.iter().find(|b| b.batch_id == batch_id).cloned())
    }

    async fn active_batch(&self) -> Result<Option<Batch>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store.batches.iter().find(|b| b.is_active()).cloned())
    }

    async fn update_batch(
        &self,
        batch_id: Uuid,
        update: &SeasonUpdate,
    ) -> Result<Option<Batch>, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        let Some(batch) = store.batches.iter_mut().find(|b| b.batch_id == batch_id) else {
            return Ok(None);
        };
        if let Some(name) = &update.name {
            batch.name = name.clone();
        }
        match &update.registration_close_date {
            FieldUpdate::Keep => {}
            FieldUpdate::Clear => batch.registration_close_date = None,
            FieldUpdate::Set(date) => batch.registration_close_date = Some(*date),
        }
        batch.updated_utc = Utc::now();
        Ok(Some(batch.clone()))
    }

    async fn delete_batch(&self, batch_id: Uuid) -> Result<BatchDeletion, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        if !store.batches.iter().any(|b| b.batch_id == batch_id) {
            return Ok(BatchDeletion::NotFound);
        }
        let plan_ids: Vec<Uuid> = store
            .plans
            .iter()
            .filter(|p| p.batch_id == batch_id)
            .map(|p| p.plan_id)
            .collect();
        if store
            .subscriptions
            .iter()
            .any(|s| plan_ids.contains(&s.plan_id))
        {
            return Ok(BatchDeletion::HasSubscriptions);
        }
        store.plans.retain(|p| p.batch_id != batch_id);
        store.batches.retain(|b| b.batch_id != batch_id);
        Ok(BatchDeletion::Deleted)
    }

    async fn create_plan(&self, batch_id: Uuid, plan: &NewPlan) -> Result<Plan, AppError> {
        self.check_writes()?;
        let plan = plan_from(batch_id, plan, Utc::now());
        self.store.lock().unwrap().plans.push(plan.clone());
        Ok(plan)
    }

    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store.plans.iter().find(|p| p.plan_id == plan_id).cloned())
    }

    async fn update_plan(&self, plan_id: Uuid, plan: &NewPlan) -> Result<Option<Plan>, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        let Some(existing) = store.plans.iter_mut().find(|p| p.plan_id == plan_id) else {
            return Ok(None);
        };
        let mut updated = plan_from(existing.batch_id, plan, existing.created_utc);
        updated.plan_id = existing.plan_id;
        updated.updated_utc = Utc::now();
        *existing = updated.clone();
        Ok(Some(updated))
    }

    async fn delete_or_archive_plan(&self, plan_id: Uuid) -> Result<PlanRemoval, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        if !store.plans.iter().any(|p| p.plan_id == plan_id) {
            return Ok(PlanRemoval::NotFound);
        }
        if store.subscriptions.iter().any(|s| s.plan_id == plan_id) {
            for p in store.plans.iter_mut().filter(|p| p.plan_id == plan_id) {
                p.is_active = false;
            }
            return Ok(PlanRemoval::Archived);
        }
        store.plans.retain(|p| p.plan_id != plan_id);
        Ok(PlanRemoval::Deleted)
    }

    async fn list_plans(&self, batch_id: Uuid) -> Result<Vec<Plan>, AppError> {
        let store = self.store.lock().unwrap();
        let mut plans: Vec<Plan> = store
            .plans
            .iter()
            .filter(|p| p.batch_id == batch_id)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.price);
        Ok(plans)
    }

    async fn find_active_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.is_active())
            .cloned())
    }

    async fn find_subscription(
        &self,
        user_id: &str,
        plan_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .subscriptions
            .iter()
            .find(|s| s.user_id == user_id && s.plan_id == plan_id)
            .cloned())
    }

    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        match store
            .subscriptions
            .iter_mut()
            .find(|s| s.subscription_id == subscription_id)
        {
            Some(sub) => {
                sub.status = status.as_str().to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, AppError> {
        self.check_writes()?;
        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            user_id: payment.user_id.clone(),
            subscription_id: None,
            plan_id: payment.plan_id,
            razorpay_order_id: payment.razorpay_order_id.clone(),
            razorpay_payment_id: None,
            amount: payment.amount,
            status: PaymentStatus::Created.as_str().to_string(),
            payment_mode: payment.payment_mode.as_str().to_string(),
            installment_index: payment.installment_index,
            created_utc: now,
            updated_utc: now,
        };
        let mut store = self.store.lock().unwrap();
        if store
            .payments
            .iter()
            .any(|p| p.razorpay_order_id == payment.razorpay_order_id)
        {
            return Err(AppError::Conflict(anyhow::anyhow!("Duplicate order")));
        }
        store.payments.push(payment.clone());
        Ok(payment)
    }

    async fn find_payment_by_order(
        &self,
        razorpay_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .payments
            .iter()
            .find(|p| p.razorpay_order_id == razorpay_order_id)
            .cloned())
    }

    async fn capture_payment(&self, capture: &PaymentCapture) -> Result<CaptureOutcome, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();

        let Some(index) = store
            .payments
            .iter()
            .position(|p| p.razorpay_order_id == capture.razorpay_order_id)
        else {
            return Ok(CaptureOutcome::OrderNotFound);
        };
        if let Some(subscription_id) = store.payments[index].subscription_id {
            return Ok(CaptureOutcome::AlreadyApplied { subscription_id });
        }
        let amount = store.payments[index].amount;
        let total = capture.total_installments.max(1);
        let full_payment = store.payments[index].payment_mode() == PaymentMode::Full;

        let subscription = match store
            .subscriptions
            .iter_mut()
            .find(|s| s.user_id == capture.user_id && s.plan_id == capture.plan_id)
        {
            Some(sub) => {
                sub.amount_paid += amount;
                sub.installments_paid = if full_payment {
                    total
                } else {
                    (sub.installments_paid + 1).min(total)
                };
                sub.status = SubscriptionStatus::Active.as_str().to_string();
                sub.end_date = capture.end_date();
                sub.updated_utc = capture.captured_at;
                sub.clone()
            }
            None => {
                let sub = Subscription {
                    subscription_id: Uuid::new_v4(),
                    user_id: capture.user_id.clone(),
                    plan_id: capture.plan_id,
                    status: SubscriptionStatus::Active.as_str().to_string(),
                    start_date: capture.captured_at,
                    end_date: capture.end_date(),
                    total_amount: capture.plan_price,
                    amount_paid: amount,
                    installments_paid: if full_payment { total } else { 1 },
                    created_utc: capture.captured_at,
                    updated_utc: capture.captured_at,
                };
                store.subscriptions.push(sub.clone());
                sub
            }
        };

        let payment = &mut store.payments[index];
        payment.status = PaymentStatus::Captured.as_str().to_string();
        payment.razorpay_payment_id = Some(capture.razorpay_payment_id.clone());
        payment.subscription_id = Some(subscription.subscription_id);
        payment.updated_utc = capture.captured_at;

        Ok(CaptureOutcome::Applied {
            subscription,
            payment: payment.clone(),
        })
    }

    async fn mark_order_captured(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
    ) -> Result<bool, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        match store.payments.iter_mut().find(|p| {
            p.razorpay_order_id == razorpay_order_id
                && matches!(
                    p.status(),
                    PaymentStatus::Created | PaymentStatus::Failed | PaymentStatus::Captured
                )
        }) {
            Some(payment) => {
                payment.status = PaymentStatus::Captured.as_str().to_string();
                payment.razorpay_payment_id = Some(razorpay_payment_id.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn transition_payment_status(
        &self,
        razorpay_payment_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        let mut changed = false;
        for payment in store.payments.iter_mut().filter(|p| {
            p.razorpay_payment_id.as_deref() == Some(razorpay_payment_id)
                && from.contains(&p.status())
        }) {
            payment.status = to.as_str().to_string();
            changed = true;
        }
        Ok(changed)
    }

    async fn latest_captured_payment(&self, user_id: &str) -> Result<Option<Payment>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .payments
            .iter()
            .rev()
            .find(|p| p.user_id == user_id && p.status() == PaymentStatus::Captured)
            .cloned())
    }

    async fn list_payments(&self, user_id: &str) -> Result<Vec<Payment>, AppError> {
        let store = self.store.lock().unwrap();
        Ok(store
            .payments
            .iter()
            .rev()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn settle_cancellation(
        &self,
        settlement: &CancellationSettlement,
    ) -> Result<(), AppError> {
        self.check_writes()?;
        let mut store = self.store.lock().unwrap();
        if let Some(sub) = store
            .subscriptions
            .iter_mut()
            .find(|s| s.subscription_id == settlement.subscription_id)
        {
            sub.status = settlement.subscription_status.as_str().to_string();
            sub.end_date = settlement.ended_at;
        }
        if let Some((payment_id, status)) = settlement.payment {
            if let Some(payment) = store.payments.iter_mut().find(|p| p.payment_id == payment_id) {
                payment.status = status.as_str().to_string();
            }
        }
        Ok(())
    }
}

/// Scripted Razorpay stand-in that records what it was asked to do.
pub struct FakeGateway {
    pub fail_orders: AtomicBool,
    /// `Ok(status)` or `Err(description)` for the next refunds.
    pub refund_result: Mutex<Result<String, String>>,
    pub orders: Mutex<Vec<CreateOrderRequest>>,
    pub refunds: Mutex<Vec<(String, RefundRequest)>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            fail_orders: AtomicBool::new(false),
            refund_result: Mutex::new(Ok("processed".to_string())),
            orders: Mutex::new(Vec::new()),
            refunds: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refund_with(&self, result: Result<&str, &str>) {
        *self.refund_result.lock().unwrap() = result.map(str::to_string).map_err(str::to_string);
    }

    pub fn order_requests(&self) -> Vec<CreateOrderRequest> {
        self.orders.lock().unwrap().clone()
    }

    pub fn refund_requests(&self) -> Vec<(String, RefundRequest)> {
        self.refunds.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn key_id(&self) -> &str {
        "rzp_test_key"
    }

    async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<RazorpayOrder, GatewayError> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(GatewayError::Api {
                status: 500,
                code: "SERVER_ERROR".to_string(),
                description: "upstream unavailable".to_string(),
            });
        }
        let mut orders = self.orders.lock().unwrap();
        orders.push(request.clone());
        Ok(RazorpayOrder {
            id: format!("order_{}", orders.len()),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: "created".to_string(),
        })
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<RazorpayRefund, GatewayError> {
        let result = self.refund_result.lock().unwrap().clone();
        match result {
            Ok(status) => {
                let mut refunds = self.refunds.lock().unwrap();
                refunds.push((payment_id.to_string(), request.clone()));
                Ok(RazorpayRefund {
                    id: format!("rfnd_{}", refunds.len()),
                    payment_id: Some(payment_id.to_string()),
                    amount: None,
                    status,
                })
            }
            Err(description) => Err(GatewayError::Api {
                status: 400,
                code: "BAD_REQUEST_ERROR".to_string(),
                description,
            }),
        }
    }
}

pub fn verifier() -> SignatureVerifier {
    SignatureVerifier::new(
        Secret::new(KEY_SECRET.to_string()),
        Secret::new(WEBHOOK_SECRET.to_string()),
    )
}

pub fn payment_signature(order_id: &str, payment_id: &str) -> String {
    hmac_sha256_hex(
        KEY_SECRET.as_bytes(),
        format!("{}|{}", order_id, payment_id).as_bytes(),
    )
    .unwrap()
}

pub fn webhook_signature(body: &[u8]) -> String {
    hmac_sha256_hex(WEBHOOK_SECRET.as_bytes(), body).unwrap()
}

pub fn local_throttle() -> LocalOrderThrottle {
    LocalOrderThrottle::new(std::time::Duration::from_secs(2)).unwrap()
}

/// Router state over the in-memory fakes, with BFF signing disabled.
pub fn test_state(repo: Arc<MockCommerceRepository>, gateway: Arc<FakeGateway>) -> AppState {
    AppState {
        repository: repo,
        gateway,
        throttle: Arc::new(local_throttle()),
        verifier: verifier(),
        signature_config: SignatureConfig {
            require_signatures: false,
            excluded_paths: vec!["/health".to_string(), "/payment/webhook".to_string()],
        },
        signing_client_id: "orbit-web".to_string(),
        signing_secret: Secret::new("test-signing-secret".to_string()),
        redis: None,
    }
}
