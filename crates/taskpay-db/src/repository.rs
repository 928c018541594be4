use crate::{
    models::{EventRow, PayoutRow, ProfileRow, TaskRow},
    Error, Result,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres, Row};
use taskpay_core::{
    EventRecord, PaymentStore, PaymentSummary, Payout, Profile, ProviderKind, Task, TaskState,
};

#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    /// Create new database connection
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Initialize database schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id VARCHAR(255) PRIMARY KEY,
                display_name TEXT NOT NULL,
                email TEXT,
                stripe_account_id VARCHAR(255),
                airwallex_beneficiary_id VARCHAR(255),
                paypal_email TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id VARCHAR(255) PRIMARY KEY,
                title TEXT NOT NULL,
                tasker_id VARCHAR(255) NOT NULL,
                helper_id VARCHAR(255),
                price NUMERIC(12, 2) NOT NULL,
                currency VARCHAR(3) NOT NULL,
                status VARCHAR(50) NOT NULL,
                payment_status VARCHAR(50) NOT NULL DEFAULT 'unpaid',
                payout_status VARCHAR(50) NOT NULL DEFAULT 'none',
                payment_provider VARCHAR(50),
                payment_reference VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payouts (
                id VARCHAR(255) PRIMARY KEY,
                task_id VARCHAR(255) NOT NULL,
                helper_id VARCHAR(255) NOT NULL,
                provider VARCHAR(50) NOT NULL,
                gross_amount NUMERIC(12, 2) NOT NULL,
                platform_fee NUMERIC(12, 2) NOT NULL,
                net_amount NUMERIC(12, 2) NOT NULL,
                currency VARCHAR(3) NOT NULL,
                status VARCHAR(50) NOT NULL,
                provider_reference VARCHAR(255),
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                FOREIGN KEY (task_id) REFERENCES tasks(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payment_events (
                id SERIAL PRIMARY KEY,
                provider VARCHAR(50) NOT NULL,
                event_id VARCHAR(255) NOT NULL,
                event_type VARCHAR(100) NOT NULL,
                task_id VARCHAR(255),
                received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (provider, event_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Create indexes
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_tasks_payment_reference ON tasks(payment_reference)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_payouts_task_id ON payouts(task_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_payouts_provider_reference ON payouts(provider_reference)",
        )
        .execute(&self.pool)
        .await?;

        // At most one live payout per task
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_payouts_active_task ON payouts(task_id)
            WHERE status IN ('pending', 'processing', 'completed')
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Database schema initialized");

        Ok(())
    }

    /// Most recently processed webhook deliveries
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<EventRow>> {
        let records = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM payment_events ORDER BY received_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

#[async_trait]
impl PaymentStore for Database {
    // ========================================================================
    // Task Operations
    // ========================================================================

    async fn get_task(&self, task_id: &str) -> taskpay_core::Result<Option<Task>> {
        let record = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;

        Ok(record.map(Task::try_from).transpose()?)
    }

    async fn find_task_by_payment_reference(
        &self,
        reference: &str,
    ) -> taskpay_core::Result<Option<Task>> {
        let record =
            sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE payment_reference = $1")
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::from)?;

        Ok(record.map(Task::try_from).transpose()?)
    }

    async fn save_task(&self, task: &Task) -> taskpay_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, title, tasker_id, helper_id, price, currency, status,
                payment_status, payout_status, payment_provider,
                payment_reference, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                title = $2,
                helper_id = $4,
                price = $5,
                currency = $6,
                status = $7,
                payment_status = $8,
                payout_status = $9,
                payment_provider = $10,
                payment_reference = $11,
                updated_at = $13
            "#,
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(&task.tasker_id)
        .bind(&task.helper_id)
        .bind(task.price)
        .bind(&task.currency)
        .bind(task.status.as_str())
        .bind(task.payment_status.as_str())
        .bind(task.payout_status.as_str())
        .bind(task.payment_provider.map(|p| p.as_str()))
        .bind(&task.payment_reference)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(())
    }

    async fn update_task_state(&self, task_id: &str, state: TaskState) -> taskpay_core::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $1, payment_status = $2, payout_status = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(state.status.as_str())
        .bind(state.payment_status.as_str())
        .bind(state.payout_status.as_str())
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(taskpay_core::Error::TaskNotFound(task_id.to_string()));
        }

        Ok(())
    }

    async fn set_payment_reference(
        &self,
        task_id: &str,
        provider: ProviderKind,
        reference: &str,
    ) -> taskpay_core::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET payment_provider = $1, payment_reference = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(provider.as_str())
        .bind(reference)
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(taskpay_core::Error::TaskNotFound(task_id.to_string()));
        }

        Ok(())
    }

    // ========================================================================
    // Profile Operations
    // ========================================================================

    async fn get_profile(&self, profile_id: &str) -> taskpay_core::Result<Option<Profile>> {
        let record = sqlx::query_as::<_, ProfileRow>("SELECT * FROM profiles WHERE id = $1")
            .bind(profile_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;

        Ok(record.map(Profile::from))
    }

    async fn save_profile(&self, profile: &Profile) -> taskpay_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO profiles (
                id, display_name, email, stripe_account_id,
                airwallex_beneficiary_id, paypal_email
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                display_name = $2,
                email = $3,
                stripe_account_id = $4,
                airwallex_beneficiary_id = $5,
                paypal_email = $6
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.display_name)
        .bind(&profile.email)
        .bind(&profile.stripe_account_id)
        .bind(&profile.airwallex_beneficiary_id)
        .bind(&profile.paypal_email)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(())
    }

    // ========================================================================
    // Payout Operations
    // ========================================================================

    async fn insert_payout(&self, payout: &Payout) -> taskpay_core::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payouts (
                id, task_id, helper_id, provider, gross_amount, platform_fee,
                net_amount, currency, status, provider_reference, error,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&payout.id)
        .bind(&payout.task_id)
        .bind(&payout.helper_id)
        .bind(payout.provider.as_str())
        .bind(payout.gross_amount)
        .bind(payout.platform_fee)
        .bind(payout.net_amount)
        .bind(&payout.currency)
        .bind(payout.status.as_str())
        .bind(&payout.provider_reference)
        .bind(&payout.error)
        .bind(payout.created_at)
        .bind(payout.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                taskpay_core::Error::PayoutInProgress(payout.task_id.clone())
            }
            e => Error::from(e).into(),
        })?;

        Ok(())
    }

    async fn update_payout(&self, payout: &Payout) -> taskpay_core::Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE payouts
            SET status = $1, provider_reference = $2, error = $3, updated_at = $4
            WHERE id = $5
            "#,
        )
        .bind(payout.status.as_str())
        .bind(&payout.provider_reference)
        .bind(&payout.error)
        .bind(payout.updated_at)
        .bind(&payout.id)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        if result.rows_affected() == 0 {
            return Err(taskpay_core::Error::Storage(format!(
                "payout {} does not exist",
                payout.id
            )));
        }

        Ok(())
    }

    async fn find_payout_for_task(&self, task_id: &str) -> taskpay_core::Result<Option<Payout>> {
        let record = sqlx::query_as::<_, PayoutRow>(
            "SELECT * FROM payouts WHERE task_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(record.map(Payout::try_from).transpose()?)
    }

    async fn find_payout_by_reference(
        &self,
        reference: &str,
    ) -> taskpay_core::Result<Option<Payout>> {
        let record = sqlx::query_as::<_, PayoutRow>(
            "SELECT * FROM payouts WHERE provider_reference = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(record.map(Payout::try_from).transpose()?)
    }

    // ========================================================================
    // Webhook Event Operations
    // ========================================================================

    async fn record_event(&self, event: &EventRecord) -> taskpay_core::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (provider, event_id, event_type, task_id, received_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(event.provider.as_str())
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.task_id)
        .bind(event.received_at)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn forget_event(
        &self,
        provider: ProviderKind,
        event_id: &str,
    ) -> taskpay_core::Result<()> {
        sqlx::query("DELETE FROM payment_events WHERE provider = $1 AND event_id = $2")
            .bind(provider.as_str())
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;

        Ok(())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    async fn payment_summary(&self) -> taskpay_core::Result<PaymentSummary> {
        let tasks = sqlx::query(
            r#"
            SELECT
                COUNT(CASE WHEN payment_status = 'paid' THEN 1 END) as paid_tasks,
                COUNT(CASE WHEN payment_status = 'refunded' THEN 1 END) as refunded_tasks
            FROM tasks
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)?;

        let payouts = sqlx::query(
            r#"
            SELECT
                COUNT(CASE WHEN status = 'completed' THEN 1 END) as payouts_completed,
                COUNT(CASE WHEN status = 'failed' THEN 1 END) as payouts_failed,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN net_amount END), 0) as total_paid_out,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN platform_fee END), 0) as total_platform_fees
            FROM payouts
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(PaymentSummary {
            paid_tasks: tasks.get("paid_tasks"),
            refunded_tasks: tasks.get("refunded_tasks"),
            payouts_completed: payouts.get("payouts_completed"),
            payouts_failed: payouts.get("payouts_failed"),
            total_paid_out: payouts.get::<Decimal, _>("total_paid_out"),
            total_platform_fees: payouts.get::<Decimal, _>("total_platform_fees"),
        })
    }
}
