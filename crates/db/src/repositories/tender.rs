use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use procurement_core::domain::requisition::RequisitionId;
use procurement_core::domain::tender::{
    NewTender, Tender, TenderDetail, TenderId, TenderPatch, TenderStatus,
};
use procurement_core::domain::user::UserId;
use procurement_core::errors::ProcurementError;
use procurement_core::repository::TenderRepository;

use super::requisition::{fetch_requisition, lock_requisition, mark_tendered};
use super::{
    parse_optional_decimal, parse_optional_timestamp, parse_timestamp, timestamp, RepositoryError,
};
use crate::DbPool;

const SELECT_TENDER: &str = "SELECT id, requisition_id, title, description, category, budget,
        status, published_date, closing_date, evaluation_method, bid_opening_date,
        created_by_user_id, created_at, updated_at
    FROM tender";

pub struct SqlTenderRepository {
    pool: DbPool,
}

impl SqlTenderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: TenderId) -> Result<Option<Tender>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_TENDER} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tender_from_row).transpose()
    }
}

#[async_trait]
impl TenderRepository for SqlTenderRepository {
    async fn create(
        &self,
        tender: NewTender,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<Tender, ProcurementError> {
        let created_at = timestamp(now);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        if let Some(requisition_id) = tender.requisition_id {
            lock_requisition(&mut tx, requisition_id).await?;
            let existing = sqlx::query("SELECT id FROM tender WHERE requisition_id = ?")
                .bind(requisition_id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(RepositoryError::from)?;
            if let Some(row) = existing {
                let tender_id: i64 = row.try_get("id").map_err(RepositoryError::from)?;
                return Err(ProcurementError::invalid_state(format!(
                    "requisition {requisition_id} already has tender {tender_id}"
                )));
            }
            mark_tendered(&mut tx, requisition_id, now).await?;
        }

        let status = tender.status.unwrap_or(TenderStatus::Draft);
        let inserted = sqlx::query(
            "INSERT INTO tender (requisition_id, title, description, category, budget, status,
                                 published_date, closing_date, evaluation_method, bid_opening_date,
                                 created_by_user_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tender.requisition_id.map(|id| id.0))
        .bind(&tender.title)
        .bind(&tender.description)
        .bind(&tender.category)
        .bind(tender.budget.map(|budget| budget.to_string()))
        .bind(status.as_str())
        .bind(tender.published_date.map(timestamp))
        .bind(tender.closing_date.map(timestamp))
        .bind(&tender.evaluation_method)
        .bind(tender.bid_opening_date.map(timestamp))
        .bind(created_by.0)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;

        let created_at = parse_timestamp("created_at", created_at)?;
        Ok(Tender {
            id: TenderId(inserted.last_insert_rowid()),
            requisition_id: tender.requisition_id,
            title: tender.title,
            description: tender.description,
            category: tender.category,
            budget: tender.budget,
            status,
            published_date: tender.published_date,
            closing_date: tender.closing_date,
            evaluation_method: tender.evaluation_method,
            bid_opening_date: tender.bid_opening_date,
            created_by_user_id: Some(created_by),
            created_at,
            updated_at: created_at,
        })
    }

    async fn find_by_id(&self, id: TenderId) -> Result<Option<Tender>, ProcurementError> {
        Ok(self.fetch(id).await?)
    }

    async fn find_detail(&self, id: TenderId) -> Result<Option<TenderDetail>, ProcurementError> {
        let Some(tender) = self.fetch(id).await? else {
            return Ok(None);
        };
        let requisition = match tender.requisition_id {
            Some(requisition_id) => fetch_requisition(&self.pool, requisition_id, None).await?,
            None => None,
        };
        Ok(Some(TenderDetail { tender, requisition }))
    }

    async fn list_all(&self) -> Result<Vec<Tender>, ProcurementError> {
        let rows = sqlx::query(&format!("{SELECT_TENDER} ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        Ok(rows.iter().map(tender_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_open(
        &self,
        now: DateTime<Utc>,
        category: Option<&str>,
    ) -> Result<Vec<Tender>, ProcurementError> {
        let rows = sqlx::query(&format!(
            "{SELECT_TENDER}
             WHERE lower(status) IN ('published', 'open')
               AND closing_date IS NOT NULL AND closing_date > ?
               AND (? IS NULL OR lower(category) = lower(?))
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(timestamp(now))
        .bind(category)
        .bind(category)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(rows.iter().map(tender_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_created_by(&self, creator: UserId) -> Result<Vec<Tender>, ProcurementError> {
        let rows = sqlx::query(&format!(
            "{SELECT_TENDER} WHERE created_by_user_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(creator.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(rows.iter().map(tender_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn update(
        &self,
        id: TenderId,
        patch: TenderPatch,
        now: DateTime<Utc>,
    ) -> Result<Tender, ProcurementError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let row = sqlx::query(&format!("{SELECT_TENDER} WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(RepositoryError::from)?
            .ok_or_else(|| ProcurementError::not_found("tender", id))?;
        let mut tender = tender_from_row(&row)?;

        tender.apply_patch(patch)?;
        tender.updated_at = now;

        sqlx::query(
            "UPDATE tender
             SET title = ?, description = ?, category = ?, budget = ?, status = ?,
                 published_date = ?, closing_date = ?, evaluation_method = ?,
                 bid_opening_date = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&tender.title)
        .bind(&tender.description)
        .bind(&tender.category)
        .bind(tender.budget.map(|budget| budget.to_string()))
        .bind(tender.status.as_str())
        .bind(tender.published_date.map(timestamp))
        .bind(tender.closing_date.map(timestamp))
        .bind(&tender.evaluation_method)
        .bind(tender.bid_opening_date.map(timestamp))
        .bind(timestamp(now))
        .bind(id.0)
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(tender)
    }
}

pub(crate) fn parse_tender_status(value: &str) -> Result<TenderStatus, RepositoryError> {
    TenderStatus::parse(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown tender status `{value}`")))
}

fn tender_from_row(row: &SqliteRow) -> Result<Tender, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(Tender {
        id: TenderId(row.try_get("id")?),
        requisition_id: row.try_get::<Option<i64>, _>("requisition_id")?.map(RequisitionId),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        budget: parse_optional_decimal("budget", row.try_get("budget")?)?,
        status: parse_tender_status(&status)?,
        published_date: parse_optional_timestamp("published_date", row.try_get("published_date")?)?,
        closing_date: parse_optional_timestamp("closing_date", row.try_get("closing_date")?)?,
        evaluation_method: row.try_get("evaluation_method")?,
        bid_opening_date: parse_optional_timestamp(
            "bid_opening_date",
            row.try_get("bid_opening_date")?,
        )?,
        created_by_user_id: row.try_get::<Option<i64>, _>("created_by_user_id")?.map(UserId),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use procurement_core::domain::tender::{NewTender, TenderPatch, TenderStatus};
    use procurement_core::domain::user::Role;
    use procurement_core::errors::ErrorKind;
    use procurement_core::repository::TenderRepository;

    use super::SqlTenderRepository;
    use crate::repositories::test_support::{setup, user};

    fn open_tender(title: &str, category: &str, closes_in_hours: i64) -> NewTender {
        NewTender {
            title: title.to_string(),
            category: Some(category.to_string()),
            status: Some(TenderStatus::Published),
            closing_date: Some(Utc::now() + Duration::hours(closes_in_hours)),
            ..NewTender::default()
        }
    }

    #[tokio::test]
    async fn create_defaults_to_draft() {
        let pool = setup().await;
        let officer = user(&pool, "officer", Role::ProcurementOfficer).await;
        let repo = SqlTenderRepository::new(pool);

        let tender = repo
            .create(
                NewTender { title: "Office chairs".to_string(), ..NewTender::default() },
                officer.id,
                Utc::now(),
            )
            .await
            .expect("create");

        assert_eq!(tender.status, TenderStatus::Draft);
        assert_eq!(tender.created_by_user_id, Some(officer.id));
    }

    #[tokio::test]
    async fn open_listing_filters_status_closing_date_and_category() {
        let pool = setup().await;
        let officer = user(&pool, "officer", Role::ProcurementOfficer).await;
        let repo = SqlTenderRepository::new(pool.clone());
        let now = Utc::now();

        let open = repo.create(open_tender("Laptops", "IT", 48), officer.id, now).await.expect("open");
        repo.create(open_tender("Desks", "Furniture", 48), officer.id, now).await.expect("desks");
        repo.create(open_tender("Expired", "IT", -1), officer.id, now).await.expect("expired");
        repo.create(
            NewTender { status: Some(TenderStatus::Draft), ..open_tender("Draft", "IT", 48) },
            officer.id,
            now,
        )
        .await
        .expect("draft");

        let it = repo.list_open(now, Some("it")).await.expect("list");
        assert_eq!(it.iter().map(|tender| tender.id).collect::<Vec<_>>(), vec![open.id]);

        assert_eq!(repo.list_open(now, None).await.expect("list").len(), 2);
        assert_eq!(repo.list_all().await.expect("all").len(), 4);
    }

    #[tokio::test]
    async fn legacy_open_status_is_listed_as_published() {
        let pool = setup().await;
        let officer = user(&pool, "officer", Role::ProcurementOfficer).await;
        let repo = SqlTenderRepository::new(pool.clone());
        let tender = repo
            .create(open_tender("Printers", "IT", 24), officer.id, Utc::now())
            .await
            .expect("create");

        sqlx::query("UPDATE tender SET status = 'Open' WHERE id = ?")
            .bind(tender.id.0)
            .execute(&pool)
            .await
            .expect("legacy status");

        let listed = repo.list_open(Utc::now(), None).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, TenderStatus::Published);
    }

    #[tokio::test]
    async fn update_applies_patch_and_reports_missing() {
        let pool = setup().await;
        let officer = user(&pool, "officer", Role::ProcurementOfficer).await;
        let repo = SqlTenderRepository::new(pool);
        let tender = repo
            .create(open_tender("Printers", "IT", 24), officer.id, Utc::now())
            .await
            .expect("create");

        let updated = repo
            .update(
                tender.id,
                TenderPatch { budget: Some(Decimal::from(5000)), ..TenderPatch::default() },
                Utc::now(),
            )
            .await
            .expect("update");
        assert_eq!(updated.budget, Some(Decimal::from(5000)));
        assert_eq!(updated.title, "Printers");

        let blank = repo
            .update(
                tender.id,
                TenderPatch { title: Some("  ".to_string()), ..TenderPatch::default() },
                Utc::now(),
            )
            .await
            .expect_err("blank title");
        assert_eq!(blank.kind(), ErrorKind::InvalidInput);

        let missing = repo
            .update(procurement_core::domain::tender::TenderId(999), TenderPatch::default(), Utc::now())
            .await
            .expect_err("missing");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
    }
}
