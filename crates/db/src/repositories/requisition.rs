use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use procurement_core::approvals::{self, Decision};
use procurement_core::domain::requisition::{
    Aac, Requisition, RequisitionDraft, RequisitionId, RequisitionItem, RequisitionItemId,
    RequisitionStatus, RequisitionType,
};
use procurement_core::domain::user::UserId;
use procurement_core::errors::ProcurementError;
use procurement_core::repository::RequisitionRepository;

use super::{
    parse_decimal, parse_optional_decimal, parse_optional_timestamp, parse_timestamp, timestamp,
    RepositoryError, IN_LIST_CHUNK,
};
use crate::DbPool;

const SELECT_REQUISITION: &str = "SELECT id, user_id, requisition_type, aac, material_group,
        exchange_rate, status, approver_one_id, approved_one_at, approver_two_id,
        approved_two_at, rejection_reason, version, created_at, updated_at
    FROM requisition";

pub struct SqlRequisitionRepository {
    pool: DbPool,
}

impl SqlRequisitionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        draft: RequisitionDraft,
        now: DateTime<Utc>,
    ) -> Result<Requisition, RepositoryError> {
        let created_at = timestamp(now);
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO requisition (user_id, requisition_type, aac, material_group, exchange_rate,
                                      status, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(draft.user_id.0)
        .bind(draft.requisition_type.as_str())
        .bind(draft.aac.map(|aac| aac.as_str()))
        .bind(&draft.material_group)
        .bind(draft.exchange_rate.map(|rate| rate.to_string()))
        .bind(RequisitionStatus::PendingApproval1.as_str())
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        let id = RequisitionId(inserted.last_insert_rowid());

        let mut items = Vec::with_capacity(draft.items.len());
        for (index, item) in draft.items.into_iter().enumerate() {
            let line = sqlx::query(
                "INSERT INTO requisition_item (requisition_id, line_no, description, quantity, unit,
                                               estimated_unit_price, freight_cost, insurance_cost,
                                               installation_cost, value)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.0)
            .bind(index as i64 + 1)
            .bind(item.description.trim())
            .bind(item.quantity.to_string())
            .bind(item.unit.trim())
            .bind(item.estimated_unit_price.map(|amount| amount.to_string()))
            .bind(item.freight_cost.map(|amount| amount.to_string()))
            .bind(item.insurance_cost.map(|amount| amount.to_string()))
            .bind(item.installation_cost.map(|amount| amount.to_string()))
            .bind(item.value.map(|amount| amount.to_string()))
            .execute(&mut *tx)
            .await?;

            items.push(RequisitionItem {
                id: RequisitionItemId(line.last_insert_rowid()),
                requisition_id: id,
                description: item.description.trim().to_owned(),
                quantity: item.quantity,
                unit: item.unit.trim().to_owned(),
                estimated_unit_price: item.estimated_unit_price,
                freight_cost: item.freight_cost,
                insurance_cost: item.insurance_cost,
                installation_cost: item.installation_cost,
                value: item.value,
            });
        }

        tx.commit().await?;

        let created_at = parse_timestamp("created_at", created_at)?;
        Ok(Requisition {
            id,
            user_id: draft.user_id,
            requisition_type: draft.requisition_type,
            aac: draft.aac,
            material_group: draft.material_group,
            exchange_rate: draft.exchange_rate,
            status: RequisitionStatus::PendingApproval1,
            approver_one_id: None,
            approved_one_at: None,
            approver_two_id: None,
            approved_two_at: None,
            rejection_reason: None,
            version: 0,
            created_at,
            updated_at: created_at,
            items,
        })
    }

    async fn list_where(&self, owner: Option<UserId>) -> Result<Vec<Requisition>, RepositoryError> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query(&format!(
                    "{SELECT_REQUISITION} WHERE user_id = ? ORDER BY created_at DESC, id DESC"
                ))
                .bind(owner.0)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!("{SELECT_REQUISITION} ORDER BY created_at DESC, id DESC"))
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut requisitions =
            rows.iter().map(requisition_from_row).collect::<Result<Vec<_>, _>>()?;
        attach_items(&self.pool, &mut requisitions).await?;
        Ok(requisitions)
    }
}

#[async_trait]
impl RequisitionRepository for SqlRequisitionRepository {
    async fn create_with_items(
        &self,
        draft: RequisitionDraft,
        now: DateTime<Utc>,
    ) -> Result<Requisition, ProcurementError> {
        Ok(self.insert(draft, now).await?)
    }

    async fn find_by_id(
        &self,
        id: RequisitionId,
    ) -> Result<Option<Requisition>, ProcurementError> {
        Ok(fetch_requisition(&self.pool, id, None).await?)
    }

    async fn find_owned(
        &self,
        id: RequisitionId,
        owner: UserId,
    ) -> Result<Option<Requisition>, ProcurementError> {
        Ok(fetch_requisition(&self.pool, id, Some(owner)).await?)
    }

    async fn list_all(&self) -> Result<Vec<Requisition>, ProcurementError> {
        Ok(self.list_where(None).await?)
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Requisition>, ProcurementError> {
        Ok(self.list_where(Some(owner)).await?)
    }

    async fn apply_decision(
        &self,
        id: RequisitionId,
        actor: UserId,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Requisition, ProcurementError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        lock_requisition(&mut tx, id).await?;

        let row = sqlx::query(&format!("{SELECT_REQUISITION} WHERE id = ?"))
            .bind(id.0)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        let mut requisition = requisition_from_row(&row)?;
        let expected_version = requisition.version;

        approvals::apply(&mut requisition, actor, decision, now)?;
        requisition.version = expected_version + 1;

        let written = sqlx::query(
            "UPDATE requisition
             SET status = ?, approver_one_id = ?, approved_one_at = ?, approver_two_id = ?,
                 approved_two_at = ?, rejection_reason = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(requisition.status.as_str())
        .bind(requisition.approver_one_id.map(|user| user.0))
        .bind(requisition.approved_one_at.map(timestamp))
        .bind(requisition.approver_two_id.map(|user| user.0))
        .bind(requisition.approved_two_at.map(timestamp))
        .bind(&requisition.rejection_reason)
        .bind(requisition.version)
        .bind(timestamp(requisition.updated_at))
        .bind(id.0)
        .bind(expected_version)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;
        if written.rows_affected() == 0 {
            return Err(ProcurementError::conflict(format!(
                "requisition {id} was changed by another request"
            )));
        }

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(requisition)
    }
}

/// Loads one requisition with its items, optionally only when `owner` created
/// it.
pub(crate) async fn fetch_requisition(
    pool: &DbPool,
    id: RequisitionId,
    owner: Option<UserId>,
) -> Result<Option<Requisition>, RepositoryError> {
    let row = match owner {
        Some(owner) => {
            sqlx::query(&format!("{SELECT_REQUISITION} WHERE id = ? AND user_id = ?"))
                .bind(id.0)
                .bind(owner.0)
                .fetch_optional(pool)
                .await?
        }
        None => {
            sqlx::query(&format!("{SELECT_REQUISITION} WHERE id = ?"))
                .bind(id.0)
                .fetch_optional(pool)
                .await?
        }
    };

    let Some(row) = row else {
        return Ok(None);
    };
    let mut requisition = requisition_from_row(&row)?;
    let mut conn = pool.acquire().await?;
    requisition.items =
        load_items(&mut conn, &[id.0]).await?.remove(&id.0).unwrap_or_default();
    Ok(Some(requisition))
}

/// Takes the database write lock with a no-op write before the row is read,
/// so concurrent writers queue here instead of reading the same snapshot and
/// failing on upgrade. A missing requisition is NotFound.
pub(crate) async fn lock_requisition(
    conn: &mut SqliteConnection,
    id: RequisitionId,
) -> Result<(), ProcurementError> {
    let locked = sqlx::query("UPDATE requisition SET version = version WHERE id = ?")
        .bind(id.0)
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from)?;
    if locked.rows_affected() == 0 {
        return Err(ProcurementError::not_found("requisition", id));
    }
    Ok(())
}

/// Mark a requisition as tendered inside the caller's transaction, which
/// must already hold the lock from [`lock_requisition`]. The requisition must
/// exist and have completed approval.
pub(crate) async fn mark_tendered(
    conn: &mut SqliteConnection,
    id: RequisitionId,
    now: DateTime<Utc>,
) -> Result<(), ProcurementError> {
    let row = sqlx::query("SELECT status FROM requisition WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(RepositoryError::from)?
        .ok_or_else(|| ProcurementError::not_found("requisition", id))?;
    let raw: String = row.try_get("status").map_err(RepositoryError::from)?;
    let status = parse_status(&raw)?;
    if !status.accepts_tender() {
        return Err(ProcurementError::invalid_state(format!(
            "requisition {id} is {status}; only approved requisitions can be tendered"
        )));
    }

    sqlx::query(
        "UPDATE requisition SET status = ?, version = version + 1, updated_at = ? WHERE id = ?",
    )
    .bind(RequisitionStatus::Tendered.as_str())
    .bind(timestamp(now))
    .bind(id.0)
    .execute(&mut *conn)
    .await
    .map_err(RepositoryError::from)?;
    Ok(())
}

async fn attach_items(
    pool: &DbPool,
    requisitions: &mut [Requisition],
) -> Result<(), RepositoryError> {
    let ids: Vec<i64> = requisitions.iter().map(|requisition| requisition.id.0).collect();
    let mut conn = pool.acquire().await?;
    let mut items = load_items(&mut conn, &ids).await?;
    for requisition in requisitions {
        requisition.items = items.remove(&requisition.id.0).unwrap_or_default();
    }
    Ok(())
}

async fn load_items(
    conn: &mut SqliteConnection,
    requisition_ids: &[i64],
) -> Result<HashMap<i64, Vec<RequisitionItem>>, RepositoryError> {
    let mut grouped: HashMap<i64, Vec<RequisitionItem>> = HashMap::new();
    if requisition_ids.is_empty() {
        return Ok(grouped);
    }

    for chunk in requisition_ids.chunks(IN_LIST_CHUNK) {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, requisition_id, description, quantity, unit, estimated_unit_price,
                    freight_cost, insurance_cost, installation_cost, value
             FROM requisition_item WHERE requisition_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY requisition_id, line_no");

        let rows = query.build().fetch_all(&mut *conn).await?;
        for row in &rows {
            let item = item_from_row(row)?;
            grouped.entry(item.requisition_id.0).or_default().push(item);
        }
    }
    Ok(grouped)
}

fn parse_status(value: &str) -> Result<RequisitionStatus, RepositoryError> {
    RequisitionStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown requisition status `{value}`")))
}

fn requisition_from_row(row: &SqliteRow) -> Result<Requisition, RepositoryError> {
    let requisition_type: String = row.try_get("requisition_type")?;
    let aac: Option<String> = row.try_get("aac")?;
    let status: String = row.try_get("status")?;

    Ok(Requisition {
        id: RequisitionId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        requisition_type: requisition_type.parse::<RequisitionType>().map_err(|_| {
            RepositoryError::Decode(format!("unknown requisition type `{requisition_type}`"))
        })?,
        aac: aac
            .map(|value| {
                value
                    .parse::<Aac>()
                    .map_err(|_| RepositoryError::Decode(format!("unknown aac `{value}`")))
            })
            .transpose()?,
        material_group: row.try_get("material_group")?,
        exchange_rate: parse_optional_decimal("exchange_rate", row.try_get("exchange_rate")?)?,
        status: parse_status(&status)?,
        approver_one_id: row.try_get::<Option<i64>, _>("approver_one_id")?.map(UserId),
        approved_one_at: parse_optional_timestamp(
            "approved_one_at",
            row.try_get("approved_one_at")?,
        )?,
        approver_two_id: row.try_get::<Option<i64>, _>("approver_two_id")?.map(UserId),
        approved_two_at: parse_optional_timestamp(
            "approved_two_at",
            row.try_get("approved_two_at")?,
        )?,
        rejection_reason: row.try_get("rejection_reason")?,
        version: row.try_get("version")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        items: Vec::new(),
    })
}

fn item_from_row(row: &SqliteRow) -> Result<RequisitionItem, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    Ok(RequisitionItem {
        id: RequisitionItemId(row.try_get("id")?),
        requisition_id: RequisitionId(row.try_get("requisition_id")?),
        description: row.try_get("description")?,
        quantity: parse_decimal("quantity", &quantity)?,
        unit: row.try_get("unit")?,
        estimated_unit_price: parse_optional_decimal(
            "estimated_unit_price",
            row.try_get("estimated_unit_price")?,
        )?,
        freight_cost: parse_optional_decimal("freight_cost", row.try_get("freight_cost")?)?,
        insurance_cost: parse_optional_decimal("insurance_cost", row.try_get("insurance_cost")?)?,
        installation_cost: parse_optional_decimal(
            "installation_cost",
            row.try_get("installation_cost")?,
        )?,
        value: parse_optional_decimal("value", row.try_get("value")?)?,
    })
}
