use axum::{
    extract::{
        multipart::{Field, Multipart, MultipartError, MultipartRejection},
        rejection::PathRejection,
        Path, State,
    },
    http::StatusCode,
    Json,
};
use procurement_core::access::{self, Action};
use procurement_core::domain::bid::{Bid, NewBid, NewBidItem};
use procurement_core::domain::tender::TenderId;
use procurement_core::errors::ProcurementError;
use procurement_core::uploads::UploadedFile;
use rust_decimal::Decimal;
use tracing::debug;

use super::{ApiError, ApiState, Caller};

const SPEC_SHEET_PREFIX: &str = "item_spec_sheet_";
const IMAGE_PREFIX: &str = "item_image_";

pub async fn create_bid(
    State(state): State<ApiState>,
    caller: Caller,
    tender_id: Result<Path<i64>, PathRejection>,
    form: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Bid>), ApiError> {
    let Path(tender_id) = tender_id.map_err(|rejection| caller.malformed(rejection.body_text()))?;
    let form = form.map_err(|rejection| caller.malformed(rejection.body_text()))?;
    // Refuse non-suppliers before any part of the upload is read.
    access::require(caller.actor.role, Action::SubmitBid).map_err(|e| caller.fail(e))?;
    let payload = read_bid_form(form).await.map_err(|e| caller.fail(e))?;

    let bid = state
        .tenders
        .create_bid(TenderId(tender_id), &caller.actor, payload)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(bid)))
}

pub async fn list_tender_bids(
    State(state): State<ApiState>,
    caller: Caller,
    tender_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<Bid>>, ApiError> {
    let Path(tender_id) = tender_id.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let bids = state
        .tenders
        .list_tender_bids(TenderId(tender_id), &caller.actor)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(bids))
}

pub async fn list_my_bids(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<Bid>>, ApiError> {
    let bids = state.tenders.list_my_bids(&caller.actor).await.map_err(|e| caller.fail(e))?;
    Ok(Json(bids))
}

/// Collects the bid form. Files are matched to items by the 0-based index in
/// their field name; unrecognised fields are skipped.
async fn read_bid_form(mut form: Multipart) -> Result<NewBid, ProcurementError> {
    let mut items_json = None;
    let mut bid = NewBid::default();

    while let Some(field) = form.next_field().await.map_err(malformed_form)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "items_json" => items_json = Some(field.text().await.map_err(malformed_form)?),
            "bid_amount" => {
                bid.bid_amount = parse_amount(&field.text().await.map_err(malformed_form)?)?
            }
            "notes" => bid.notes = non_blank(field.text().await.map_err(malformed_form)?),
            "technical_proposal_url" => {
                bid.technical_proposal_url = non_blank(field.text().await.map_err(malformed_form)?)
            }
            "financial_proposal_url" => {
                bid.financial_proposal_url = non_blank(field.text().await.map_err(malformed_form)?)
            }
            other => {
                if let Some(index) = other.strip_prefix(SPEC_SHEET_PREFIX) {
                    let index = parse_index(other, index)?;
                    if let Some(file) = read_upload(field).await? {
                        bid.spec_sheets.push((index, file));
                    }
                } else if let Some(index) = other.strip_prefix(IMAGE_PREFIX) {
                    let index = parse_index(other, index)?;
                    if let Some(file) = read_upload(field).await? {
                        bid.images.push((index, file));
                    }
                } else {
                    debug!(event_name = "bid.form.field_ignored", field = %other, "ignoring form field");
                }
            }
        }
    }

    let items_json =
        items_json.ok_or_else(|| ProcurementError::invalid_input("items_json is required"))?;
    bid.items = serde_json::from_str::<Vec<NewBidItem>>(&items_json)
        .map_err(|error| ProcurementError::invalid_input(format!("items_json is invalid: {error}")))?;
    Ok(bid)
}

/// A file input left empty by the browser arrives with no name and no bytes.
async fn read_upload(field: Field<'_>) -> Result<Option<UploadedFile>, ProcurementError> {
    let filename = field.file_name().unwrap_or_default().to_owned();
    let bytes = field.bytes().await.map_err(malformed_form)?;
    if filename.is_empty() && bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(UploadedFile { filename, bytes: bytes.to_vec() }))
}

fn parse_index(field: &str, index: &str) -> Result<usize, ProcurementError> {
    index.parse::<usize>().map_err(|_| {
        ProcurementError::invalid_input(format!("`{field}` does not name an item index"))
    })
}

fn parse_amount(raw: &str) -> Result<Option<Decimal>, ProcurementError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<Decimal>()
        .map(Some)
        .map_err(|_| ProcurementError::invalid_input(format!("bid_amount `{raw}` is not a number")))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

fn malformed_form(error: MultipartError) -> ProcurementError {
    ProcurementError::invalid_input(format!("malformed multipart body: {}", error.body_text()))
}
