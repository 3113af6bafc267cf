// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the ledger collections:
//! - Streaks, daily progress and achievement progress
//! - Lifetime stats
//! - Runs and finish receipts (the receipt marks a session as applied)

use crate::db::{collections, ComputeUpdate, LedgerStore};
use crate::error::{AppError, LedgerStep, Result};
use crate::models::{
    AchievementProgress, ApplyOutcome, DailyProgress, FinishReceipt, LedgerSnapshot,
    LedgerUpdate, LifetimeStats, RunRecord, SocialConnections, StreakRecord,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures_util::{stream, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Attempts before a contended finish is reported to the caller.
const MAX_TRANSACTION_ATTEMPTS: u32 = 3;

fn db_err(step: LedgerStep) -> impl Fn(firestore::errors::FirestoreError) -> AppError {
    move |e| AppError::persistence(step, e)
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id).await.map_err(|e| {
            AppError::persistence(
                LedgerStep::LoadLedger,
                format!("Failed to connect to Firestore: {}", e),
            )
        })?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::persistence(
                LedgerStep::LoadLedger,
                format!("Failed to connect to Firestore Emulator: {}", e),
            )
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client.as_ref().ok_or_else(|| {
            AppError::persistence(
                LedgerStep::LoadLedger,
                "Database not connected (offline mode)",
            )
        })
    }
}

fn is_contention(e: &firestore::errors::FirestoreError) -> bool {
    matches!(
        e,
        firestore::errors::FirestoreError::DatabaseError(inner) if inner.retry_possible
    )
}

/// Outcome of one transaction attempt.
enum Attempt {
    Done(ApplyOutcome),
    /// Commit lost a race with another writer; safe to rerun.
    Contended(String),
}

async fn get_doc<T>(
    client: &firestore::FirestoreDb,
    collection: &str,
    doc_id: &str,
) -> Result<Option<T>>
where
    T: serde::de::DeserializeOwned + Send,
{
    client
        .fluent()
        .select()
        .by_id_in(collection)
        .obj()
        .one(doc_id)
        .await
        .map_err(db_err(LedgerStep::LoadLedger))
}

async fn query_achievements(
    client: &firestore::FirestoreDb,
    owner_id: &str,
) -> Result<Vec<AchievementProgress>> {
    let owner = owner_id.to_string();
    client
        .fluent()
        .select()
        .from(collections::ACHIEVEMENT_PROGRESS)
        .filter(move |q| q.for_all([q.field("owner_id").eq(owner.clone())]))
        .obj()
        .query()
        .await
        .map_err(db_err(LedgerStep::LoadLedger))
}

/// Read every ledger row the finish computation needs.
async fn load_snapshot(
    client: &firestore::FirestoreDb,
    owner_id: &str,
    date: NaiveDate,
) -> Result<LedgerSnapshot> {
    let streak = get_doc(client, collections::STREAKS, owner_id).await?;
    let daily = get_doc(
        client,
        collections::DAILY_PROGRESS,
        &DailyProgress::doc_id(owner_id, date),
    )
    .await?;
    let achievements = query_achievements(client, owner_id).await?;
    let lifetime: Option<LifetimeStats> =
        get_doc(client, collections::LIFETIME_STATS, owner_id).await?;
    let social: Option<SocialConnections> =
        get_doc(client, collections::SOCIAL_CONNECTIONS, owner_id).await?;

    Ok(LedgerSnapshot {
        streak,
        daily,
        achievements,
        lifetime: lifetime.unwrap_or_default(),
        social_connections: social.map_or(0, |s| s.count),
    })
}

/// Run one read-compute-commit cycle.
///
/// Every read goes through a client bound to the transaction, so the
/// commit fails if any document read here changed in the meantime.
async fn attempt_finish(
    client: &firestore::FirestoreDb,
    owner_id: &str,
    session_id: &str,
    date: NaiveDate,
    compute: &ComputeUpdate<'_>,
) -> Result<Attempt> {
    let mut transaction = client.begin_transaction().await.map_err(|e| {
        AppError::persistence(
            LedgerStep::LoadLedger,
            format!("Failed to begin transaction: {}", e),
        )
    })?;
    let reader = client.clone_with_consistency_selector(
        firestore::FirestoreConsistencySelector::Transaction(
            transaction.transaction_id().clone(),
        ),
    );

    // 1. Idempotency check against the receipt
    let existing: Option<FinishReceipt> =
        match get_doc(&reader, collections::FINISH_RECEIPTS, session_id).await {
            Ok(existing) => existing,
            Err(e) => {
                let _ = transaction.rollback().await;
                return Err(e);
            }
        };
    if let Some(receipt) = existing {
        let _ = transaction.rollback().await;
        if receipt.owner_id != owner_id {
            return Err(AppError::NotFound(format!("Session {}", session_id)));
        }
        tracing::debug!(
            owner_id,
            session_id,
            "Session already applied (idempotent skip)"
        );
        return Ok(Attempt::Done(ApplyOutcome::Duplicate(receipt)));
    }

    // 2. Read the ledger
    let snapshot = match load_snapshot(&reader, owner_id, date).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let _ = transaction.rollback().await;
            return Err(e);
        }
    };

    // 3. Compute every row in memory
    let update = compute(snapshot);

    // 4. Stage writes
    if let Err(e) = stage_update(client, &mut transaction, owner_id, session_id, &update) {
        let _ = transaction.rollback().await;
        return Err(e);
    }

    // 5. Commit atomically
    match transaction.commit().await {
        Ok(_) => {}
        Err(e) if is_contention(&e) => return Ok(Attempt::Contended(e.to_string())),
        Err(e) => {
            return Err(AppError::persistence(
                LedgerStep::Commit,
                format!("Transaction commit failed: {}", e),
            ));
        }
    }

    tracing::info!(
        owner_id,
        session_id,
        %date,
        achievements = update.achievements.len(),
        "Session applied to ledger"
    );

    Ok(Attempt::Done(ApplyOutcome::Applied(update.receipt)))
}

#[async_trait]
impl LedgerStore for FirestoreDb {
    /// Atomically apply a finished session.
    ///
    /// All ledger rows, including the receipt that marks the session as
    /// applied, are read and written in one Firestore transaction. A commit
    /// that loses a race is rerun from a fresh read.
    async fn apply_finish(
        &self,
        owner_id: &str,
        session_id: &str,
        date: NaiveDate,
        compute: &ComputeUpdate<'_>,
    ) -> Result<ApplyOutcome> {
        let client = self.get_client()?;

        let mut attempt = 1;
        loop {
            match attempt_finish(client, owner_id, session_id, date, compute).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Contended(reason) if attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::warn!(
                        owner_id,
                        session_id,
                        attempt,
                        %reason,
                        "Finish transaction contended, retrying"
                    );
                    attempt += 1;
                }
                Attempt::Contended(reason) => {
                    return Err(AppError::persistence(
                        LedgerStep::Commit,
                        format!("Transaction commit failed: {}", reason),
                    ));
                }
            }
        }
    }

    async fn get_receipt(&self, session_id: &str) -> Result<Option<FinishReceipt>> {
        get_doc(self.get_client()?, collections::FINISH_RECEIPTS, session_id).await
    }

    async fn get_streak(&self, owner_id: &str) -> Result<Option<StreakRecord>> {
        get_doc(self.get_client()?, collections::STREAKS, owner_id).await
    }

    async fn get_daily_progress(
        &self,
        owner_id: &str,
        date: NaiveDate,
    ) -> Result<Option<DailyProgress>> {
        get_doc(
            self.get_client()?,
            collections::DAILY_PROGRESS,
            &DailyProgress::doc_id(owner_id, date),
        )
        .await
    }

    async fn get_achievements(&self, owner_id: &str) -> Result<Vec<AchievementProgress>> {
        query_achievements(self.get_client()?, owner_id).await
    }

    /// Store initial rows concurrently.
    ///
    /// Uses `insert` so a row created by a concurrent finish is not
    /// overwritten; the resulting conflict is ignored.
    async fn init_achievements(&self, owner_id: &str, rows: &[AchievementProgress]) -> Result<()> {
        let client = self.get_client()?;

        stream::iter(rows.to_vec())
            .map(|row| async move {
                let doc_id = AchievementProgress::doc_id(owner_id, &row.achievement_id);
                let created: std::result::Result<AchievementProgress, _> = client
                    .fluent()
                    .insert()
                    .into(collections::ACHIEVEMENT_PROGRESS)
                    .document_id(&doc_id)
                    .object(&row)
                    .execute()
                    .await;

                match created {
                    Ok(_) => Ok(()),
                    Err(firestore::errors::FirestoreError::DataConflictError(_)) => Ok(()),
                    Err(e) => Err(AppError::persistence(LedgerStep::AchievementUpdate, e)),
                }
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<()>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;

        Ok(())
    }

    async fn get_lifetime_stats(&self, owner_id: &str) -> Result<Option<LifetimeStats>> {
        get_doc(self.get_client()?, collections::LIFETIME_STATS, owner_id).await
    }

    async fn get_run(&self, session_id: &str) -> Result<Option<RunRecord>> {
        get_doc(self.get_client()?, collections::RUNS, session_id).await
    }
}

/// Add every row of `update` to the transaction.
fn stage_update(
    client: &firestore::FirestoreDb,
    transaction: &mut firestore::FirestoreTransaction<'_>,
    owner_id: &str,
    session_id: &str,
    update: &LedgerUpdate,
) -> Result<()> {
    client
        .fluent()
        .update()
        .in_col(collections::STREAKS)
        .document_id(owner_id)
        .object(&update.streak)
        .add_to_transaction(transaction)
        .map_err(db_err(LedgerStep::StreakUpdate))?;

    client
        .fluent()
        .update()
        .in_col(collections::DAILY_PROGRESS)
        .document_id(DailyProgress::doc_id(owner_id, update.daily.date))
        .object(&update.daily)
        .add_to_transaction(transaction)
        .map_err(db_err(LedgerStep::DailyGoalUpdate))?;

    for row in &update.achievements {
        client
            .fluent()
            .update()
            .in_col(collections::ACHIEVEMENT_PROGRESS)
            .document_id(AchievementProgress::doc_id(owner_id, &row.achievement_id))
            .object(row)
            .add_to_transaction(transaction)
            .map_err(db_err(LedgerStep::AchievementUpdate))?;
    }

    client
        .fluent()
        .update()
        .in_col(collections::RUNS)
        .document_id(session_id)
        .object(&update.run)
        .add_to_transaction(transaction)
        .map_err(db_err(LedgerStep::RunRecord))?;

    client
        .fluent()
        .update()
        .in_col(collections::FINISH_RECEIPTS)
        .document_id(session_id)
        .object(&update.receipt)
        .add_to_transaction(transaction)
        .map_err(db_err(LedgerStep::RunRecord))?;

    client
        .fluent()
        .update()
        .in_col(collections::LIFETIME_STATS)
        .document_id(owner_id)
        .object(&update.lifetime)
        .add_to_transaction(transaction)
        .map_err(db_err(LedgerStep::RunRecord))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_offline_client_reports_persistence_error() {
        let db = FirestoreDb::new_mock();
        let err = db.get_streak("u1").await.unwrap_err();
        assert_eq!(err.code(), "PERSISTENCE_ERROR");
        assert!(err.is_retryable());
    }
}
