use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::warn;
use uuid::Uuid;

use procurement_core::domain::bid::{Bid, BidDraft, BidId, BidItem, BidItemId, BidStatus};
use procurement_core::domain::requisition::RequisitionItemId;
use procurement_core::domain::tender::{TenderId, TenderSummary};
use procurement_core::domain::user::{UserId, UserSummary};
use procurement_core::errors::ProcurementError;
use procurement_core::repository::BidRepository;
use procurement_core::uploads::{FileStore, UploadKind};

use super::tender::parse_tender_status;
use super::{
    parse_decimal, parse_optional_timestamp, parse_timestamp, timestamp, RepositoryError,
    IN_LIST_CHUNK,
};
use crate::DbPool;

const BID_COLUMNS: &str = "b.id, b.tender_id, b.supplier_id, b.bid_amount, b.submission_date,
        b.technical_proposal_url, b.financial_proposal_url, b.notes, b.status,
        b.created_at, b.updated_at";

pub struct SqlBidRepository {
    pool: DbPool,
}

impl SqlBidRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Writes the bid and its items on `conn`, which must be inside a
    /// transaction. Every stored file is recorded on `staged` as soon as it
    /// exists so the caller can remove it before rolling back.
    async fn insert(
        conn: &mut SqliteConnection,
        draft: BidDraft,
        files: &dyn FileStore,
        now: DateTime<Utc>,
        staged: &mut StagedUploads,
    ) -> Result<Bid, ProcurementError> {
        let submitted_at = timestamp(now);

        let inserted = sqlx::query(
            "INSERT INTO bid (tender_id, supplier_id, bid_amount, submission_date,
                              technical_proposal_url, financial_proposal_url, notes, status,
                              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(draft.tender_id.0)
        .bind(draft.supplier_id.0)
        .bind(draft.bid_amount.to_string())
        .bind(&submitted_at)
        .bind(&draft.technical_proposal_url)
        .bind(&draft.financial_proposal_url)
        .bind(&draft.notes)
        .bind(BidStatus::Submitted.as_str())
        .bind(&submitted_at)
        .bind(&submitted_at)
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from)?;
        let bid_id = BidId(inserted.last_insert_rowid());

        for (index, line) in draft.items.iter().enumerate() {
            let spec_path = match &line.spec_sheet {
                Some(file) => {
                    let path = files
                        .store(bid_id, staged.submission, index, UploadKind::Spec, file)
                        .await?;
                    staged.paths.push(path.clone());
                    Some(path)
                }
                None => None,
            };
            let image_path = match &line.image {
                Some(file) => {
                    let path = files
                        .store(bid_id, staged.submission, index, UploadKind::Image, file)
                        .await?;
                    staged.paths.push(path.clone());
                    Some(path)
                }
                None => None,
            };

            let item = &line.item;
            sqlx::query(
                "INSERT INTO bid_item (bid_id, line_no, requisition_item_id, description, quantity,
                                       unit, offered_unit_price, specification_text,
                                       specification_sheet_path, item_image_path)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(bid_id.0)
            .bind(index as i64 + 1)
            .bind(item.requisition_item_id.map(|id| id.0))
            .bind(item.description.trim())
            .bind(item.quantity.to_string())
            .bind(item.unit.trim())
            .bind(item.offered_unit_price.to_string())
            .bind(&item.specification_text)
            .bind(&spec_path)
            .bind(&image_path)
            .execute(&mut *conn)
            .await
            .map_err(RepositoryError::from)?;
        }

        let submitted_at = parse_timestamp("submission_date", submitted_at)?;
        Ok(Bid {
            id: bid_id,
            tender_id: draft.tender_id,
            supplier_id: draft.supplier_id,
            bid_amount: draft.bid_amount,
            submission_date: submitted_at,
            technical_proposal_url: draft.technical_proposal_url,
            financial_proposal_url: draft.financial_proposal_url,
            notes: draft.notes,
            status: BidStatus::Submitted,
            created_at: submitted_at,
            updated_at: submitted_at,
            items: Vec::new(),
            supplier: None,
            tender: None,
        })
    }

    async fn attach_items(&self, bids: &mut [Bid]) -> Result<(), RepositoryError> {
        if bids.is_empty() {
            return Ok(());
        }

        let mut grouped: HashMap<i64, Vec<BidItem>> = HashMap::new();
        for chunk in bids.chunks(IN_LIST_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new(
                "SELECT id, bid_id, requisition_item_id, description, quantity, unit,
                        offered_unit_price, specification_text, specification_sheet_path,
                        item_image_path
                 FROM bid_item WHERE bid_id IN (",
            );
            let mut separated = query.separated(", ");
            for bid in chunk {
                separated.push_bind(bid.id.0);
            }
            separated.push_unseparated(") ORDER BY bid_id, line_no");

            let rows = query.build().fetch_all(&self.pool).await?;
            for row in &rows {
                let item = bid_item_from_row(row)?;
                grouped.entry(item.bid_id.0).or_default().push(item);
            }
        }
        for bid in bids {
            bid.items = grouped.remove(&bid.id.0).unwrap_or_default();
        }
        Ok(())
    }
}

/// Files written for one bid submission that are not yet owned by a committed
/// row. Dropping it with paths still staged (the request was cancelled mid
/// insert) reports them as orphaned.
struct StagedUploads {
    tender_id: TenderId,
    submission: Uuid,
    paths: Vec<String>,
}

impl StagedUploads {
    fn new(tender_id: TenderId) -> Self {
        Self { tender_id, submission: Uuid::new_v4(), paths: Vec::new() }
    }

    /// The bid committed; its rows now own the files.
    fn keep(&mut self) {
        self.paths.clear();
    }

    /// A path leaves the list only once it is handled, so a cleanup that is
    /// itself cancelled still reports the rest on drop.
    async fn discard(&mut self, files: &dyn FileStore) {
        while let Some(path) = self.paths.last() {
            if let Err(error) = files.remove(path).await {
                report_orphan(self.tender_id, path, &error.to_string());
            }
            self.paths.pop();
        }
    }
}

impl Drop for StagedUploads {
    fn drop(&mut self) {
        for path in &self.paths {
            report_orphan(self.tender_id, path, "bid submission abandoned before commit");
        }
    }
}

fn report_orphan(tender_id: TenderId, path: &str, reason: &str) {
    warn!(
        event_name = "bid.uploads.orphaned",
        tender_id = tender_id.0,
        path = %path,
        reason = %reason,
        "uploaded file left behind after bid rollback"
    );
}

#[async_trait]
impl BidRepository for SqlBidRepository {
    async fn create_with_items(
        &self,
        draft: BidDraft,
        files: &dyn FileStore,
        now: DateTime<Utc>,
    ) -> Result<Bid, ProcurementError> {
        let mut staged = StagedUploads::new(draft.tender_id);
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        match Self::insert(&mut tx, draft, files, now, &mut staged).await {
            Ok(bid) => match tx.commit().await {
                Ok(()) => {
                    staged.keep();
                    Ok(bid)
                }
                Err(error) => {
                    staged.discard(files).await;
                    Err(RepositoryError::from(error).into())
                }
            },
            Err(error) => {
                // The transaction still holds the write lock, so no other bid
                // can take this id until the staged files are gone.
                staged.discard(files).await;
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        event_name = "bid.rollback_failed",
                        tender_id = staged.tender_id.0,
                        error = %rollback,
                        "explicit rollback failed; the connection drops the transaction"
                    );
                }
                Err(error)
            }
        }
    }

    async fn find_with_items(&self, id: BidId) -> Result<Option<Bid>, ProcurementError> {
        let row = sqlx::query(&format!("SELECT {BID_COLUMNS} FROM bid b WHERE b.id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(RepositoryError::from)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut bids = vec![bid_from_row(&row)?];
        self.attach_items(&mut bids).await?;
        Ok(bids.pop())
    }

    async fn list_for_tender(&self, tender_id: TenderId) -> Result<Vec<Bid>, ProcurementError> {
        let rows = sqlx::query(&format!(
            "SELECT {BID_COLUMNS}, u.username AS supplier_username, u.email AS supplier_email
             FROM bid b
             JOIN app_user u ON u.id = b.supplier_id
             WHERE b.tender_id = ?
             ORDER BY b.submission_date ASC, b.id ASC"
        ))
        .bind(tender_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let mut bids = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut bid = bid_from_row(row)?;
            bid.supplier = Some(UserSummary {
                id: bid.supplier_id,
                username: row.try_get("supplier_username").map_err(RepositoryError::from)?,
                email: row.try_get("supplier_email").map_err(RepositoryError::from)?,
            });
            bids.push(bid);
        }
        self.attach_items(&mut bids).await?;
        Ok(bids)
    }

    async fn list_for_supplier(&self, supplier_id: UserId) -> Result<Vec<Bid>, ProcurementError> {
        let rows = sqlx::query(&format!(
            "SELECT {BID_COLUMNS}, t.title AS tender_title, t.status AS tender_status,
                    t.closing_date AS tender_closing_date
             FROM bid b
             JOIN tender t ON t.id = b.tender_id
             WHERE b.supplier_id = ?
             ORDER BY b.submission_date DESC, b.id DESC"
        ))
        .bind(supplier_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let mut bids = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut bid = bid_from_row(row)?;
            bid.tender = Some(tender_summary_from_row(bid.tender_id, row)?);
            bids.push(bid);
        }
        self.attach_items(&mut bids).await?;
        Ok(bids)
    }
}

fn tender_summary_from_row(id: TenderId, row: &SqliteRow) -> Result<TenderSummary, RepositoryError> {
    let status: String = row.try_get("tender_status")?;
    Ok(TenderSummary {
        id,
        title: row.try_get("tender_title")?,
        status: parse_tender_status(&status)?,
        closing_date: parse_optional_timestamp(
            "tender_closing_date",
            row.try_get("tender_closing_date")?,
        )?,
    })
}

fn bid_from_row(row: &SqliteRow) -> Result<Bid, RepositoryError> {
    let bid_amount: String = row.try_get("bid_amount")?;
    let status: String = row.try_get("status")?;
    Ok(Bid {
        id: BidId(row.try_get("id")?),
        tender_id: TenderId(row.try_get("tender_id")?),
        supplier_id: UserId(row.try_get("supplier_id")?),
        bid_amount: parse_decimal("bid_amount", &bid_amount)?,
        submission_date: parse_timestamp("submission_date", row.try_get("submission_date")?)?,
        technical_proposal_url: row.try_get("technical_proposal_url")?,
        financial_proposal_url: row.try_get("financial_proposal_url")?,
        notes: row.try_get("notes")?,
        status: BidStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown bid status `{status}`")))?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        items: Vec::new(),
        supplier: None,
        tender: None,
    })
}

fn bid_item_from_row(row: &SqliteRow) -> Result<BidItem, RepositoryError> {
    let quantity: String = row.try_get("quantity")?;
    let price: String = row.try_get("offered_unit_price")?;
    Ok(BidItem {
        id: BidItemId(row.try_get("id")?),
        bid_id: BidId(row.try_get("bid_id")?),
        requisition_item_id: row
            .try_get::<Option<i64>, _>("requisition_item_id")?
            .map(RequisitionItemId),
        description: row.try_get("description")?,
        quantity: parse_decimal("quantity", &quantity)?,
        unit: row.try_get("unit")?,
        offered_unit_price: parse_decimal("offered_unit_price", &price)?,
        specification_text: row.try_get("specification_text")?,
        specification_sheet_path: row.try_get("specification_sheet_path")?,
        item_image_path: row.try_get("item_image_path")?,
    })
}
