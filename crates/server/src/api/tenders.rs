use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use procurement_core::domain::tender::{NewTender, Tender, TenderDetail, TenderId, TenderPatch};
use serde::Deserialize;

use super::{ApiError, ApiState, Caller};

#[derive(Debug, Default, Deserialize)]
pub struct TenderListQuery {
    #[serde(default)]
    pub category: Option<String>,
}

pub async fn create_tender(
    State(state): State<ApiState>,
    caller: Caller,
    payload: Result<Json<NewTender>, JsonRejection>,
) -> Result<(StatusCode, Json<Tender>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let tender =
        state.tenders.create_tender(payload, &caller.actor).await.map_err(|e| caller.fail(e))?;
    Ok((StatusCode::CREATED, Json(tender)))
}

pub async fn list_tenders(
    State(state): State<ApiState>,
    caller: Caller,
    query: Result<Query<TenderListQuery>, QueryRejection>,
) -> Result<Json<Vec<Tender>>, ApiError> {
    let Query(query) = query.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let tenders = state
        .tenders
        .list_tenders(&caller.actor, query.category.as_deref())
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(tenders))
}

pub async fn get_tender(
    State(state): State<ApiState>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<TenderDetail>, ApiError> {
    let Path(id) = id.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let detail =
        state.tenders.get_tender(TenderId(id), &caller.actor).await.map_err(|e| caller.fail(e))?;
    Ok(Json(detail))
}

pub async fn update_tender(
    State(state): State<ApiState>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    patch: Result<Json<TenderPatch>, JsonRejection>,
) -> Result<Json<Tender>, ApiError> {
    let Path(id) = id.map_err(|rejection| caller.malformed(rejection.body_text()))?;
    let Json(patch) = patch.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let tender = state
        .tenders
        .update_tender(TenderId(id), patch, &caller.actor)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(tender))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::{Duration, Utc};
    use procurement_core::domain::user::Role;
    use serde_json::json;

    use crate::api::test_support::TestApp;

    #[tokio::test]
    async fn suppliers_only_see_open_tenders_in_their_category() {
        let app = TestApp::new().await;
        let officer = app.login("officer", Role::ProcurementOfficer).await;
        let supplier = app.login("acme", Role::Supplier).await;
        let closing = (Utc::now() + Duration::days(7)).to_rfc3339();

        for (title, category, status) in [
            ("Laptops", "IT", "published"),
            ("Chairs", "Furniture", "published"),
            ("Servers", "IT", "draft"),
        ] {
            let (status_code, _) = app
                .json(
                    "POST",
                    "/api/tenders",
                    &officer,
                    json!({ "title": title, "category": category, "status": status, "closing_date": closing }),
                )
                .await;
            assert_eq!(status_code, StatusCode::CREATED);
        }

        let (status, open) = app.get("/api/tenders?category=it", &supplier).await;
        assert_eq!(status, StatusCode::OK);
        let titles: Vec<_> = open
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|tender| tender["title"].as_str())
            .collect();
        assert_eq!(titles, vec!["Laptops"]);

        let (_, everything) = app.get("/api/tenders", &officer).await;
        assert_eq!(everything.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn update_and_detail_round_trip() {
        let app = TestApp::new().await;
        let officer = app.login("officer", Role::ProcurementOfficer).await;
        let requester = app.login("req", Role::Requester).await;

        let (_, created) =
            app.json("POST", "/api/tenders", &officer, json!({ "title": "Printers" })).await;
        assert_eq!(created["status"], "draft");
        let uri = format!("/api/tenders/{}", created["id"]);

        let (status, updated) = app
            .json("PUT", &uri, &officer, json!({ "status": "published", "budget": "1200.00" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "published");
        assert_eq!(updated["title"], "Printers");

        let (status, body) = app.json("PUT", &uri, &officer, json!({ "title": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");

        let (status, _) = app.json("PUT", &uri, &requester, json!({ "title": "Mine" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, detail) = app.get(&uri, &requester).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["title"], "Printers");
        assert!(detail["requisition"].is_null());

        let (status, _) = app.get("/api/tenders/9999", &requester).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
