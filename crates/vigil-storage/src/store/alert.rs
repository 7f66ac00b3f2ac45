use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use vigil_common::id;
use vigil_common::types::{AlertStatus, EventRecord, Severity};

use crate::entities::{acknowledgment, alert, history_entry};
use crate::error::{Result, StoreError};
use crate::store::AlertStore;

/// One alert row (from the `alerts` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: String,
    pub event_id: String,
    pub problem_id: Option<String>,
    pub host: String,
    pub name: String,
    pub severity: i32,
    pub status: AlertStatus,
    pub triggered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub last_updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
}

/// One acknowledgment row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgmentRow {
    pub id: String,
    pub alert_id: String,
    pub operator_name: String,
    pub acknowledged_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub synced_upstream: bool,
}

/// One append-only status transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: String,
    pub alert_id: String,
    pub status_from: Option<AlertStatus>,
    pub status_to: AlertStatus,
    pub changed_at: DateTime<Utc>,
    pub changed_by: String,
    pub reason: Option<String>,
}

/// Alert list filter.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub status_eq: Option<AlertStatus>,
    pub severity_eq: Option<i32>,
    pub host_contains: Option<String>,
    pub name_contains: Option<String>,
}

/// Counters returned by one reconciliation call.
///
/// Every distinct, usable external id is counted exactly once as created
/// or updated; `duplicates` only observes batch-internal repetition and
/// never reduces the other counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub duplicates: u64,
}

/// Result of one reconciliation call: the counters plus the rows that were
/// newly created, for broadcast/notification fan-out by the caller.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub counts: ReconcileCounts,
    pub created: Vec<AlertRow>,
}

fn parse_status(raw: &str) -> Result<AlertStatus> {
    AlertStatus::from_str(raw).map_err(|_| StoreError::CorruptStatus(raw.to_string()))
}

fn to_alert_row(m: alert::Model) -> Result<AlertRow> {
    Ok(AlertRow {
        status: parse_status(&m.status)?,
        id: m.id,
        event_id: m.event_id,
        problem_id: m.problem_id,
        host: m.host,
        name: m.name,
        severity: m.severity,
        triggered_at: m.triggered_at.with_timezone(&Utc),
        created_at: m.created_at.with_timezone(&Utc),
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
        last_updated_at: m.last_updated_at.with_timezone(&Utc),
        raw_payload: m.raw_payload,
    })
}

fn to_ack_row(m: acknowledgment::Model) -> AcknowledgmentRow {
    AcknowledgmentRow {
        id: m.id,
        alert_id: m.alert_id,
        operator_name: m.operator_name,
        acknowledged_at: m.acknowledged_at.with_timezone(&Utc),
        reason: m.reason,
        synced_upstream: m.synced_upstream,
    }
}

fn to_history_row(m: history_entry::Model) -> Result<HistoryRow> {
    Ok(HistoryRow {
        status_from: m.status_from.as_deref().map(parse_status).transpose()?,
        status_to: parse_status(&m.status_to)?,
        id: m.id,
        alert_id: m.alert_id,
        changed_at: m.changed_at.with_timezone(&Utc),
        changed_by: m.changed_by,
        reason: m.reason,
    })
}

enum Reconciled {
    Created(AlertRow),
    Updated,
}

impl AlertStore {
    /// Merge a fetched batch into the store, deduplicating by external
    /// event id.
    ///
    /// The batch is first collapsed so the last record per id wins; each
    /// repeated id increments `duplicates`. Records without a usable id or
    /// with an out-of-range severity are skipped. All writes happen in one
    /// transaction; if it cannot commit, everything rolls back, the
    /// unprocessed remainder is attributed to `skipped`, and no created
    /// rows are reported to the caller.
    ///
    /// An unchanged re-delivery still counts as `updated`; callers depend
    /// on created+updated+skipped covering every distinct id. True content
    /// changes are only distinguished in logs.
    pub async fn store_alerts(&self, batch: &[EventRecord]) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        if batch.is_empty() {
            tracing::debug!("No events to reconcile");
            return outcome;
        }

        // Collapse by event id, keeping the last record per id. Id-less
        // records all land in one "" bucket that is skipped below.
        let mut slots: Vec<&EventRecord> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for record in batch {
            let key = record.event_id.trim();
            match index.get(key) {
                Some(&i) => {
                    outcome.counts.duplicates += 1;
                    tracing::warn!(
                        event_id = key,
                        "Duplicate event in batch, last occurrence wins"
                    );
                    slots[i] = record;
                }
                None => {
                    index.insert(key, slots.len());
                    slots.push(record);
                }
            }
        }

        let mut usable: Vec<&EventRecord> = Vec::with_capacity(slots.len());
        for record in slots {
            if record.event_id.trim().is_empty() {
                outcome.counts.skipped += 1;
                tracing::warn!("Event missing external id, skipping");
            } else if Severity::try_from(record.severity).is_err() {
                outcome.counts.skipped += 1;
                tracing::warn!(
                    event_id = %record.event_id,
                    severity = record.severity,
                    "Event severity out of range, skipping"
                );
            } else {
                usable.push(record);
            }
        }

        let usable_total = usable.len() as u64;
        let txn = match self.db().begin().await {
            Ok(txn) => txn,
            Err(e) => {
                tracing::error!(error = %e, batch_size = batch.len(), "Failed to open reconciliation transaction");
                outcome.counts.skipped += usable_total;
                return outcome;
            }
        };

        for record in usable {
            match self.reconcile_one(&txn, record).await {
                Ok(Reconciled::Created(row)) => {
                    outcome.counts.created += 1;
                    outcome.created.push(row);
                }
                Ok(Reconciled::Updated) => outcome.counts.updated += 1,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        event_id = %record.event_id,
                        batch_size = batch.len(),
                        "Reconciliation failed, rolling back batch"
                    );
                    if let Err(e) = txn.rollback().await {
                        tracing::error!(error = %e, "Rollback failed");
                    }
                    return Self::fail_batch(outcome, usable_total);
                }
            }
        }

        if let Err(e) = txn.commit().await {
            tracing::error!(error = %e, batch_size = batch.len(), "Reconciliation commit failed");
            return Self::fail_batch(outcome, usable_total);
        }

        tracing::info!(
            created = outcome.counts.created,
            updated = outcome.counts.updated,
            skipped = outcome.counts.skipped,
            duplicates = outcome.counts.duplicates,
            "Batch reconciled"
        );
        outcome
    }

    /// Rolled-back batches keep the created/updated tallies already counted
    /// but attribute the remainder to `skipped` and report no created rows,
    /// so nothing gets broadcast for writes that never committed.
    fn fail_batch(mut outcome: ReconcileOutcome, usable_total: u64) -> ReconcileOutcome {
        let processed = outcome.counts.created + outcome.counts.updated;
        outcome.counts.skipped += usable_total.saturating_sub(processed);
        outcome.created.clear();
        outcome
    }

    async fn reconcile_one<C: ConnectionTrait>(
        &self,
        conn: &C,
        record: &EventRecord,
    ) -> Result<Reconciled> {
        let now = Utc::now().fixed_offset();
        let existing = alert::Entity::find()
            .filter(alert::Column::EventId.eq(record.event_id.as_str()))
            .one(conn)
            .await?;

        let Some(existing) = existing else {
            let am = alert::ActiveModel {
                id: Set(id::next_id()),
                event_id: Set(record.event_id.clone()),
                problem_id: Set(record.problem_id.clone()),
                host: Set(record.host.clone()),
                name: Set(record.name.clone()),
                severity: Set(record.severity),
                status: Set(AlertStatus::New.as_str().to_string()),
                triggered_at: Set(record.triggered_at().fixed_offset()),
                created_at: Set(now),
                resolved_at: Set(None),
                last_updated_at: Set(now),
                raw_payload: Set(Some(record.raw.to_string())),
            };
            let model = am.insert(conn).await?;
            tracing::info!(
                event_id = %record.event_id,
                host = %record.host,
                severity = record.severity,
                "Alert created"
            );
            return Ok(Reconciled::Created(to_alert_row(model)?));
        };

        let changed = existing.severity != record.severity
            || existing.name != record.name
            || existing.host != record.host
            || existing.problem_id != record.problem_id;

        let mut am: alert::ActiveModel = existing.into();
        am.last_updated_at = Set(now);
        am.raw_payload = Set(Some(record.raw.to_string()));
        if changed {
            am.severity = Set(record.severity);
            am.name = Set(record.name.clone());
            am.host = Set(record.host.clone());
            am.problem_id = Set(record.problem_id.clone());
            tracing::debug!(
                event_id = %record.event_id,
                host = %record.host,
                severity = record.severity,
                "Alert content changed"
            );
        } else {
            tracing::debug!(
                event_id = %record.event_id,
                "Alert unchanged (re-delivered with same data)"
            );
        }
        am.update(conn).await?;
        Ok(Reconciled::Updated)
    }

    /// Acknowledge an alert.
    ///
    /// Fails with [`StoreError::NotFound`] for an unknown id and with
    /// [`StoreError::InvalidTransition`] when the alert has already left
    /// the `New` state; in that case no acknowledgment or history row is
    /// written. On success the acknowledgment row, the status change, and
    /// the history entry commit atomically.
    pub async fn acknowledge(
        &self,
        alert_id: &str,
        operator_name: &str,
        reason: Option<&str>,
    ) -> Result<(AlertRow, AcknowledgmentRow)> {
        let txn = self.db().begin().await?;
        let Some(existing) = alert::Entity::find_by_id(alert_id).one(&txn).await? else {
            return Err(StoreError::NotFound {
                entity: "alert",
                id: alert_id.to_string(),
            });
        };

        let status = parse_status(&existing.status)?;
        if status != AlertStatus::New {
            return Err(StoreError::InvalidTransition {
                id: alert_id.to_string(),
                from: status,
                requested: AlertStatus::Acknowledged,
            });
        }

        let now = Utc::now().fixed_offset();
        let ack = acknowledgment::ActiveModel {
            id: Set(id::next_id()),
            alert_id: Set(alert_id.to_string()),
            operator_name: Set(operator_name.to_string()),
            acknowledged_at: Set(now),
            reason: Set(reason.map(str::to_string)),
            synced_upstream: Set(false),
        }
        .insert(&txn)
        .await?;

        let mut am: alert::ActiveModel = existing.into();
        am.status = Set(AlertStatus::Acknowledged.as_str().to_string());
        am.last_updated_at = Set(now);
        let updated = am.update(&txn).await?;

        self.append_history(
            &txn,
            alert_id,
            Some(AlertStatus::New),
            AlertStatus::Acknowledged,
            operator_name,
            reason,
        )
        .await?;

        txn.commit().await?;
        tracing::info!(alert_id, operator = operator_name, "Alert acknowledged");
        Ok((to_alert_row(updated)?, to_ack_row(ack)))
    }

    /// Resolve an alert, stamping `resolved_at` and appending history.
    ///
    /// Returns `Ok(None)` when the alert is already resolved (idempotent
    /// no-op) and [`StoreError::NotFound`] for an unknown id.
    pub async fn resolve(&self, alert_id: &str, actor: &str) -> Result<Option<AlertRow>> {
        let txn = self.db().begin().await?;
        let Some(existing) = alert::Entity::find_by_id(alert_id).one(&txn).await? else {
            return Err(StoreError::NotFound {
                entity: "alert",
                id: alert_id.to_string(),
            });
        };

        let old_status = parse_status(&existing.status)?;
        if old_status == AlertStatus::Resolved {
            tracing::debug!(alert_id, "Alert already resolved");
            return Ok(None);
        }

        let now = Utc::now().fixed_offset();
        let mut am: alert::ActiveModel = existing.into();
        am.status = Set(AlertStatus::Resolved.as_str().to_string());
        am.resolved_at = Set(Some(now));
        am.last_updated_at = Set(now);
        let updated = am.update(&txn).await?;

        self.append_history(
            &txn,
            alert_id,
            Some(old_status),
            AlertStatus::Resolved,
            actor,
            None,
        )
        .await?;

        txn.commit().await?;
        tracing::info!(alert_id, actor, "Alert resolved");
        Ok(Some(to_alert_row(updated)?))
    }

    async fn append_history<C: ConnectionTrait>(
        &self,
        conn: &C,
        alert_id: &str,
        from: Option<AlertStatus>,
        to: AlertStatus,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        history_entry::ActiveModel {
            id: Set(id::next_id()),
            alert_id: Set(alert_id.to_string()),
            status_from: Set(from.map(|s| s.as_str().to_string())),
            status_to: Set(to.as_str().to_string()),
            changed_at: Set(Utc::now().fixed_offset()),
            changed_by: Set(actor.to_string()),
            reason: Set(reason.map(str::to_string)),
        }
        .insert(conn)
        .await?;
        Ok(())
    }

    /// Record whether an acknowledgment was mirrored back to the source.
    pub async fn mark_ack_synced(&self, ack_id: &str, synced: bool) -> Result<()> {
        let Some(existing) = acknowledgment::Entity::find_by_id(ack_id)
            .one(self.db())
            .await?
        else {
            return Err(StoreError::NotFound {
                entity: "acknowledgment",
                id: ack_id.to_string(),
            });
        };
        let mut am: acknowledgment::ActiveModel = existing.into();
        am.synced_upstream = Set(synced);
        am.update(self.db()).await?;
        Ok(())
    }

    pub async fn get_alert(&self, alert_id: &str) -> Result<Option<AlertRow>> {
        let model = alert::Entity::find_by_id(alert_id).one(self.db()).await?;
        model.map(to_alert_row).transpose()
    }

    pub async fn get_alert_by_event_id(&self, event_id: &str) -> Result<Option<AlertRow>> {
        let model = alert::Entity::find()
            .filter(alert::Column::EventId.eq(event_id))
            .one(self.db())
            .await?;
        model.map(to_alert_row).transpose()
    }

    /// List alerts matching the filter, newest first, with the total count
    /// for pagination.
    pub async fn list_alerts(
        &self,
        filter: &AlertFilter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<AlertRow>, u64)> {
        let mut q = alert::Entity::find();
        if let Some(status) = filter.status_eq {
            q = q.filter(alert::Column::Status.eq(status.as_str()));
        }
        if let Some(severity) = filter.severity_eq {
            q = q.filter(alert::Column::Severity.eq(severity));
        }
        if let Some(host) = &filter.host_contains {
            q = q.filter(alert::Column::Host.contains(host));
        }
        if let Some(name) = &filter.name_contains {
            q = q.filter(alert::Column::Name.contains(name));
        }

        let total = q.clone().count(self.db()).await?;
        let rows = q
            .order_by(alert::Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        let rows = rows
            .into_iter()
            .map(to_alert_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((rows, total))
    }

    /// List alerts created inside a date range (history view), newest first.
    pub async fn alerts_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<AlertRow>, u64)> {
        let q = alert::Entity::find()
            .filter(alert::Column::CreatedAt.gte(from.fixed_offset()))
            .filter(alert::Column::CreatedAt.lte(to.fixed_offset()));
        let total = q.clone().count(self.db()).await?;
        let rows = q
            .order_by(alert::Column::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        let rows = rows
            .into_iter()
            .map(to_alert_row)
            .collect::<Result<Vec<_>>>()?;
        Ok((rows, total))
    }

    /// Status-transition history for one alert, newest first. Reading the
    /// result back in order exactly reconstructs the alert's transition
    /// path.
    pub async fn alert_history(
        &self,
        alert_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryRow>> {
        let mut q = history_entry::Entity::find()
            .filter(history_entry::Column::AlertId.eq(alert_id));
        if let Some(from) = from {
            q = q.filter(history_entry::Column::ChangedAt.gte(from.fixed_offset()));
        }
        if let Some(to) = to {
            q = q.filter(history_entry::Column::ChangedAt.lte(to.fixed_offset()));
        }
        let rows = q
            .order_by(history_entry::Column::ChangedAt, Order::Desc)
            .all(self.db())
            .await?;
        rows.into_iter().map(to_history_row).collect()
    }

    pub async fn list_acknowledgments(&self, alert_id: &str) -> Result<Vec<AcknowledgmentRow>> {
        let rows = acknowledgment::Entity::find()
            .filter(acknowledgment::Column::AlertId.eq(alert_id))
            .order_by(acknowledgment::Column::AcknowledgedAt, Order::Desc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_ack_row).collect())
    }

    /// Delete alerts older than the retention window, together with their
    /// acknowledgments and history, in one transaction. The children are
    /// removed explicitly; the schema does not cascade. Returns the number
    /// of alerts removed.
    pub async fn clear_old_alerts(&self, retention_days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - Duration::days(i64::from(retention_days))).fixed_offset();
        let txn = self.db().begin().await?;

        let ids: Vec<String> = alert::Entity::find()
            .select_only()
            .column(alert::Column::Id)
            .filter(alert::Column::CreatedAt.lt(cutoff))
            .into_tuple()
            .all(&txn)
            .await?;

        if ids.is_empty() {
            txn.commit().await?;
            return Ok(0);
        }

        acknowledgment::Entity::delete_many()
            .filter(acknowledgment::Column::AlertId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        history_entry::Entity::delete_many()
            .filter(history_entry::Column::AlertId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let deleted = alert::Entity::delete_many()
            .filter(alert::Column::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        tracing::info!(
            removed = deleted.rows_affected,
            retention_days,
            "Expired alerts cleaned up"
        );
        Ok(deleted.rows_affected)
    }
}
