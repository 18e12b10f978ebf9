use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Json,
};
use procurement_core::domain::requisition::{NewRequisition, Requisition, RequisitionId};
use serde::Deserialize;

use super::{ApiError, ApiState, Caller};

#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn create_requisition(
    State(state): State<ApiState>,
    caller: Caller,
    payload: Result<Json<NewRequisition>, JsonRejection>,
) -> Result<(StatusCode, Json<Requisition>), ApiError> {
    let Json(payload) = payload.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let requisition = state
        .requisitions
        .create_requisition(payload, &caller.actor)
        .await
        .map_err(|error| caller.fail(error))?;
    Ok((StatusCode::CREATED, Json(requisition)))
}

pub async fn list_requisitions(
    State(state): State<ApiState>,
    caller: Caller,
) -> Result<Json<Vec<Requisition>>, ApiError> {
    let requisitions =
        state.requisitions.list_requisitions(&caller.actor).await.map_err(|e| caller.fail(e))?;
    Ok(Json(requisitions))
}

pub async fn get_requisition(
    State(state): State<ApiState>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Requisition>, ApiError> {
    let Path(id) = id.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let requisition = state
        .requisitions
        .get_requisition(RequisitionId(id), &caller.actor)
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(requisition))
}

pub async fn apply_action(
    State(state): State<ApiState>,
    caller: Caller,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<Requisition>, ApiError> {
    let Path(id) = id.map_err(|rejection| caller.malformed(rejection.body_text()))?;
    let Json(request) = payload.map_err(|rejection| caller.malformed(rejection.body_text()))?;

    let updated = state
        .requisitions
        .apply_action(RequisitionId(id), &caller.actor, &request.action, request.reason.as_deref())
        .await
        .map_err(|e| caller.fail(e))?;
    Ok(Json(updated))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use procurement_core::domain::user::Role;
    use serde_json::{json, Value};

    use crate::api::test_support::TestApp;

    fn payload() -> Value {
        json!({
            "type": "goods",
            "material_group": "IT hardware",
            "items": [
                { "description": "Laptop", "quantity": "2", "unit": "pcs", "estimated_unit_price": "950.00" },
                { "description": "Dock", "quantity": "2", "unit": "pcs" }
            ]
        })
    }

    #[tokio::test]
    async fn requester_creates_and_reads_back_own_requisition() {
        let app = TestApp::new().await;
        let owner = app.login("owner", Role::Requester).await;
        let stranger = app.login("stranger", Role::Requester).await;
        let officer = app.login("officer", Role::ProcurementOfficer).await;

        let (status, created) = app.json("POST", "/api/requisitions", &owner, payload()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "pending_approval_1");
        assert_eq!(created["items"].as_array().map(Vec::len), Some(2));
        let id = created["id"].as_i64().expect("id");

        let (status, _) = app.get(&format!("/api/requisitions/{id}"), &owner).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.get(&format!("/api/requisitions/{id}"), &stranger).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let (_, all) = app.get("/api/requisitions", &officer).await;
        assert_eq!(all.as_array().map(Vec::len), Some(1));
        let (_, none) = app.get("/api/requisitions", &stranger).await;
        assert_eq!(none, json!([]));
    }

    #[tokio::test]
    async fn invalid_payloads_are_rejected_as_invalid_input() {
        let app = TestApp::new().await;
        let owner = app.login("owner", Role::Requester).await;

        let (status, body) =
            app.json("POST", "/api/requisitions", &owner, json!({ "type": "goods", "items": [] })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");

        let (status, body) =
            app.json("POST", "/api/requisitions", &owner, json!({ "type": 5, "items": "x" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");

        let (status, _) = app.get("/api/requisitions/not-a-number", &owner).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn supplier_may_not_raise_requisitions() {
        let app = TestApp::new().await;
        let supplier = app.login("acme", Role::Supplier).await;

        let (status, body) = app.json("POST", "/api/requisitions", &supplier, payload()).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");
    }

    #[tokio::test]
    async fn dual_approval_over_http() {
        let app = TestApp::new().await;
        let owner = app.login("owner", Role::Requester).await;
        let first = app.login("first", Role::Approver).await;
        let second = app.login("second", Role::Admin).await;

        let (_, created) = app.json("POST", "/api/requisitions", &owner, payload()).await;
        let action = format!("/api/requisitions/{}/action", created["id"]);

        let (status, body) =
            app.json("POST", &action, &first, json!({ "action": "reject" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_input");

        let (status, body) = app.json("POST", &action, &first, json!({ "action": "approve" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending_approval_2");

        let (status, body) = app.json("POST", &action, &first, json!({ "action": "approve" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");

        let (status, body) = app.json("POST", &action, &second, json!({ "action": "approve" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "approved");

        let (status, body) = app
            .json("POST", &action, &second, json!({ "action": "reject", "reason": "late" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "invalid_state");

        let (status, _) = app.json("POST", &action, &owner, json!({ "action": "approve" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
