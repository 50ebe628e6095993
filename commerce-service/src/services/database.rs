//! PostgreSQL implementation of [`CommerceRepository`].

use crate::models::{
    Batch, BatchStatus, FieldUpdate, NewPayment, NewPlan, Payment, PaymentMode, PaymentStatus, Plan,
    SeasonUpdate, Subscription, SubscriptionStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::repository::{
    BatchDeletion, CancellationSettlement, CaptureOutcome, CommerceRepository, PaymentCapture,
    PlanRemoval,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Advisory lock key serialising season launches ("ORBITSEA").
const SEASON_LAUNCH_LOCK: i64 = 0x4F52_4249_5453_4541;

const BATCH_COLUMNS: &str = "batch_id, name, status, start_date, registration_close_date, \
     end_date, created_utc, updated_utc";

const PLAN_COLUMNS: &str = "plan_id, batch_id, title, description, price, features, \
     validity_days, allow_installments, total_installments, full_payment_discount, is_active, \
     created_utc, updated_utc";

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, user_id, plan_id, status, start_date, \
     end_date, total_amount, amount_paid, installments_paid, created_utc, updated_utc";

const PAYMENT_COLUMNS: &str = "payment_id, user_id, subscription_id, plan_id, \
     razorpay_order_id, razorpay_payment_id, amount, status, payment_mode, installment_index, \
     created_utc, updated_utc";

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "commerce-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| db_error("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn insert_plan<'e, E>(
        executor: E,
        batch_id: Uuid,
        plan: &NewPlan,
    ) -> Result<Plan, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query_as::<_, Plan>(&format!(
            r#"
            INSERT INTO plans (plan_id, batch_id, title, description, price, features,
                               validity_days, allow_installments, total_installments,
                               full_payment_discount, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(batch_id)
        .bind(&plan.title)
        .bind(&plan.description)
        .bind(plan.price)
        .bind(&plan.features)
        .bind(plan.validity_days)
        .bind(plan.allow_installments)
        .bind(plan.total_installments)
        .bind(plan.full_payment_discount)
        .bind(plan.is_active)
        .fetch_one(executor)
        .await
    }
}

#[async_trait]
impl CommerceRepository for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Season Operations
    // =========================================================================

    #[instrument(skip(self, plans), fields(plan_count = plans.len()))]
    async fn launch_season(
        &self,
        name: &str,
        registration_close_date: Option<DateTime<Utc>>,
        plans: &[NewPlan],
        now: DateTime<Utc>,
    ) -> Result<(Batch, Vec<Plan>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["launch_season"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SEASON_LAUNCH_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to acquire launch lock", e))?;

        let archived = sqlx::query(
            r#"
            UPDATE batches
            SET status = $1, end_date = $2, updated_utc = NOW()
            WHERE status = $3
            "#,
        )
        .bind(BatchStatus::Archived.as_str())
        .bind(now)
        .bind(BatchStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to archive active seasons", e))?
        .rows_affected();

        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            INSERT INTO batches (batch_id, name, status, start_date, registration_close_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(BatchStatus::Active.as_str())
        .bind(now)
        .bind(registration_close_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("Another season is already active"))
            }
            other => db_error("Failed to insert season", other),
        })?;

        let mut created = Vec::with_capacity(plans.len());
        for plan in plans {
            let row = Self::insert_plan(&mut *tx, batch.batch_id, plan)
                .await
                .map_err(|e| db_error("Failed to insert plan", e))?;
            created.push(row);
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        info!(
            batch_id = %batch.batch_id,
            archived = archived,
            plans = created.len(),
            "Season launched"
        );

        Ok((batch, created))
    }

    #[instrument(skip(self))]
    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<Batch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_batch"])
            .start_timer();

        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE batch_id = $1"
        ))
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get season", e))?;

        timer.observe_duration();
        Ok(batch)
    }

    #[instrument(skip(self))]
    async fn active_batch(&self) -> Result<Option<Batch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["active_batch"])
            .start_timer();

        let batch = sqlx::query_as::<_, Batch>(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE status = $1 LIMIT 1"
        ))
        .bind(BatchStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get active season", e))?;

        timer.observe_duration();
        Ok(batch)
    }

    #[instrument(skip(self, update))]
    async fn update_batch(
        &self,
        batch_id: Uuid,
        update: &SeasonUpdate,
    ) -> Result<Option<Batch>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_batch"])
            .start_timer();

        let (touch_close_date, close_date) = match &update.registration_close_date {
            FieldUpdate::Keep => (false, None),
            FieldUpdate::Clear => (true, None),
            FieldUpdate::Set(date) => (true, Some(*date)),
        };

        let batch = sqlx::query_as::<_, Batch>(&format!(
            r#"
            UPDATE batches
            SET name = COALESCE($2, name),
                registration_close_date = CASE WHEN $3 THEN $4 ELSE registration_close_date END,
                updated_utc = NOW()
            WHERE batch_id = $1
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(batch_id)
        .bind(&update.name)
        .bind(touch_close_date)
        .bind(close_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update season", e))?;

        timer.observe_duration();
        Ok(batch)
    }

    #[instrument(skip(self))]
    async fn delete_batch(&self, batch_id: Uuid) -> Result<BatchDeletion, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_batch"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT batch_id FROM batches WHERE batch_id = $1 FOR UPDATE")
                .bind(batch_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to lock season", e))?;

        if exists.is_none() {
            return Ok(BatchDeletion::NotFound);
        }

        // Lock the plans so no purchase can reference them mid-delete.
        sqlx::query("SELECT plan_id FROM plans WHERE batch_id = $1 FOR UPDATE")
            .bind(batch_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to lock plans", e))?;

        let (purchased,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM subscriptions s
                JOIN plans p ON p.plan_id = s.plan_id
                WHERE p.batch_id = $1
            )
            "#,
        )
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to check season sales", e))?;

        if purchased {
            return Ok(BatchDeletion::HasSubscriptions);
        }

        sqlx::query("DELETE FROM plans WHERE batch_id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    AppError::IntegrityViolation(anyhow::anyhow!("Season plans are referenced"))
                }
                other => db_error("Failed to delete plans", other),
            })?;

        sqlx::query("DELETE FROM batches WHERE batch_id = $1")
            .bind(batch_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to delete season", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        info!(batch_id = %batch_id, "Season deleted");
        Ok(BatchDeletion::Deleted)
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    #[instrument(skip(self, plan), fields(title = %plan.title))]
    async fn create_plan(&self, batch_id: Uuid, plan: &NewPlan) -> Result<Plan, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_plan"])
            .start_timer();

        let created = Self::insert_plan(&self.pool, batch_id, plan)
            .await
            .map_err(|e| db_error("Failed to create plan", e))?;

        timer.observe_duration();
        info!(plan_id = %created.plan_id, batch_id = %batch_id, "Plan created");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE plan_id = $1"
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get plan", e))?;

        timer.observe_duration();
        Ok(plan)
    }

    #[instrument(skip(self, plan))]
    async fn update_plan(&self, plan_id: Uuid, plan: &NewPlan) -> Result<Option<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_plan"])
            .start_timer();

        let updated = sqlx::query_as::<_, Plan>(&format!(
            r#"
            UPDATE plans
            SET title = $2, description = $3, price = $4, features = $5, validity_days = $6,
                allow_installments = $7, total_installments = $8, full_payment_discount = $9,
                is_active = $10, updated_utc = NOW()
            WHERE plan_id = $1
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(plan_id)
        .bind(&plan.title)
        .bind(&plan.description)
        .bind(plan.price)
        .bind(&plan.features)
        .bind(plan.validity_days)
        .bind(plan.allow_installments)
        .bind(plan.total_installments)
        .bind(plan.full_payment_discount)
        .bind(plan.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update plan", e))?;

        timer.observe_duration();
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete_or_archive_plan(&self, plan_id: Uuid) -> Result<PlanRemoval, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_or_archive_plan"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT plan_id FROM plans WHERE plan_id = $1 FOR UPDATE")
                .bind(plan_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to lock plan", e))?;

        if exists.is_none() {
            return Ok(PlanRemoval::NotFound);
        }

        let (sold,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM subscriptions WHERE plan_id = $1)")
                .bind(plan_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to check plan sales", e))?;

        let outcome = if sold {
            sqlx::query("UPDATE plans SET is_active = FALSE, updated_utc = NOW() WHERE plan_id = $1")
                .bind(plan_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to archive plan", e))?;
            PlanRemoval::Archived
        } else {
            sqlx::query("DELETE FROM plans WHERE plan_id = $1")
                .bind(plan_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to delete plan", e))?;
            PlanRemoval::Deleted
        };

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        info!(plan_id = %plan_id, outcome = ?outcome, "Plan removed");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn list_plans(&self, batch_id: Uuid) -> Result<Vec<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_plans"])
            .start_timer();

        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE batch_id = $1 ORDER BY price ASC, created_utc ASC"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list plans", e))?;

        timer.observe_duration();
        Ok(plans)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    #[instrument(skip(self))]
    async fn find_active_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_active_subscription"])
            .start_timer();

        let sub = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
            WHERE user_id = $1 AND status = $2
            ORDER BY updated_utc DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(SubscriptionStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get active subscription", e))?;

        timer.observe_duration();
        Ok(sub)
    }

    #[instrument(skip(self))]
    async fn find_subscription(
        &self,
        user_id: &str,
        plan_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_subscription"])
            .start_timer();

        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1 AND plan_id = $2"
        ))
        .bind(user_id)
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get subscription", e))?;

        timer.observe_duration();
        Ok(sub)
    }

    #[instrument(skip(self))]
    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_subscription_status"])
            .start_timer();

        let result = sqlx::query(
            "UPDATE subscriptions SET status = $2, updated_utc = NOW() WHERE subscription_id = $1",
        )
        .bind(subscription_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update subscription status", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    #[instrument(skip(self, payment), fields(order_id = %payment.razorpay_order_id))]
    async fn insert_payment(&self, payment: &NewPayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        let row = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (payment_id, user_id, plan_id, razorpay_order_id, amount,
                                  status, payment_mode, installment_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&payment.user_id)
        .bind(payment.plan_id)
        .bind(&payment.razorpay_order_id)
        .bind(payment.amount)
        .bind(PaymentStatus::Created.as_str())
        .bind(payment.payment_mode.as_str())
        .bind(payment.installment_index)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Order '{}' already recorded",
                    payment.razorpay_order_id
                ))
            }
            other => db_error("Failed to insert payment", other),
        })?;

        timer.observe_duration();
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn find_payment_by_order(
        &self,
        razorpay_order_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_payment_by_order"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE razorpay_order_id = $1"
        ))
        .bind(razorpay_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self, capture), fields(order_id = %capture.razorpay_order_id))]
    async fn capture_payment(&self, capture: &PaymentCapture) -> Result<CaptureOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["capture_payment"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE razorpay_order_id = $1 FOR UPDATE"
        ))
        .bind(&capture.razorpay_order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to lock payment", e))?;

        let Some(payment) = payment else {
            return Ok(CaptureOutcome::OrderNotFound);
        };

        if let Some(subscription_id) = payment.subscription_id {
            warn!(
                order_id = %capture.razorpay_order_id,
                subscription_id = %subscription_id,
                "Payment already applied; skipping ledger update"
            );
            return Ok(CaptureOutcome::AlreadyApplied { subscription_id });
        }

        // A full-mode payment settles every installment, discounted or not.
        let full_payment = payment.payment_mode() == PaymentMode::Full;
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (subscription_id, user_id, plan_id, status, start_date,
                                       end_date, total_amount, amount_paid, installments_paid)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, CASE WHEN $10 THEN $9 ELSE 1 END)
            ON CONFLICT (user_id, plan_id) DO UPDATE
            SET amount_paid = subscriptions.amount_paid + EXCLUDED.amount_paid,
                installments_paid = CASE WHEN $10 THEN $9
                                         ELSE LEAST(subscriptions.installments_paid + 1, $9) END,
                status = EXCLUDED.status,
                end_date = EXCLUDED.end_date,
                updated_utc = NOW()
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&capture.user_id)
        .bind(capture.plan_id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(capture.captured_at)
        .bind(capture.end_date())
        .bind(capture.plan_price)
        .bind(payment.amount)
        .bind(capture.total_installments.max(1))
        .bind(full_payment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to apply subscription", e))?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = $2, razorpay_payment_id = $3, subscription_id = $4, updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment.payment_id)
        .bind(PaymentStatus::Captured.as_str())
        .bind(&capture.razorpay_payment_id)
        .bind(subscription.subscription_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to link payment", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        info!(
            subscription_id = %subscription.subscription_id,
            installments_paid = subscription.installments_paid,
            amount_paid = subscription.amount_paid,
            "Payment captured"
        );

        Ok(CaptureOutcome::Applied {
            subscription,
            payment,
        })
    }

    #[instrument(skip(self))]
    async fn mark_order_captured(
        &self,
        razorpay_order_id: &str,
        razorpay_payment_id: &str,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_order_captured"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $3, razorpay_payment_id = $2, updated_utc = NOW()
            WHERE razorpay_order_id = $1 AND status = ANY($4)
            "#,
        )
        .bind(razorpay_order_id)
        .bind(razorpay_payment_id)
        .bind(PaymentStatus::Captured.as_str())
        .bind(vec![
            PaymentStatus::Created.as_str(),
            PaymentStatus::Failed.as_str(),
            PaymentStatus::Captured.as_str(),
        ])
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark order captured", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, from))]
    async fn transition_payment_status(
        &self,
        razorpay_payment_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_payment_status"])
            .start_timer();

        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, updated_utc = NOW()
            WHERE razorpay_payment_id = $1 AND status = ANY($3)
            "#,
        )
        .bind(razorpay_payment_id)
        .bind(to.as_str())
        .bind(from)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update payment status", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn latest_captured_payment(&self, user_id: &str) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["latest_captured_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE user_id = $1 AND status = $2
            ORDER BY created_utc DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .bind(PaymentStatus::Captured.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get latest payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self))]
    async fn list_payments(&self, user_id: &str) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_utc DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    #[instrument(skip(self, settlement), fields(subscription_id = %settlement.subscription_id))]
    async fn settle_cancellation(
        &self,
        settlement: &CancellationSettlement,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_cancellation"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2, end_date = $3, updated_utc = NOW()
            WHERE subscription_id = $1
            "#,
        )
        .bind(settlement.subscription_id)
        .bind(settlement.subscription_status.as_str())
        .bind(settlement.ended_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to settle subscription", e))?;

        if let Some((payment_id, status)) = settlement.payment {
            sqlx::query("UPDATE payments SET status = $2, updated_utc = NOW() WHERE payment_id = $1")
                .bind(payment_id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to settle payment", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        timer.observe_duration();
        Ok(())
    }
}
