use chrono::Utc;
use tracing::info;

use crate::access::{self, Action};
use crate::approvals::Decision;
use crate::domain::requisition::{NewRequisition, Requisition, RequisitionId};
use crate::errors::ProcurementError;
use crate::identity::Actor;
use crate::repository::RequisitionRepository;

pub struct RequisitionManager<R> {
    repository: R,
}

impl<R: RequisitionRepository> RequisitionManager<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    pub async fn create_requisition(
        &self,
        payload: NewRequisition,
        actor: &Actor,
    ) -> Result<Requisition, ProcurementError> {
        access::require(actor.role, Action::CreateRequisition)?;
        let draft = payload.validate(actor.user_id)?;

        let requisition = self.repository.create_with_items(draft, Utc::now()).await?;
        info!(
            event_name = "requisition.created",
            requisition_id = requisition.id.0,
            user_id = actor.user_id.0,
            item_count = requisition.items.len(),
            "requisition created"
        );
        Ok(requisition)
    }

    /// Officers and admins see every requisition; anyone else only their own.
    pub async fn list_requisitions(
        &self,
        actor: &Actor,
    ) -> Result<Vec<Requisition>, ProcurementError> {
        if access::allow(actor.role, Action::ViewAllRequisitions) {
            self.repository.list_all().await
        } else {
            self.repository.list_for_owner(actor.user_id).await
        }
    }

    /// A requisition owned by someone else is reported as missing.
    pub async fn get_requisition(
        &self,
        id: RequisitionId,
        actor: &Actor,
    ) -> Result<Requisition, ProcurementError> {
        let found = if access::allow(actor.role, Action::ViewAllRequisitions) {
            self.repository.find_by_id(id).await?
        } else {
            self.repository.find_owned(id, actor.user_id).await?
        };
        found.ok_or_else(|| ProcurementError::not_found("requisition", id))
    }

    pub async fn apply_action(
        &self,
        id: RequisitionId,
        actor: &Actor,
        action: &str,
        reason: Option<&str>,
    ) -> Result<Requisition, ProcurementError> {
        access::require(actor.role, Action::DecideRequisition)?;
        let decision = Decision::parse(action, reason)?;

        let updated =
            self.repository.apply_decision(id, actor.user_id, &decision, Utc::now()).await?;
        info!(
            event_name = "requisition.action_applied",
            requisition_id = id.0,
            user_id = actor.user_id.0,
            action = decision.as_str(),
            status = updated.status.as_str(),
            "requisition action applied"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use super::RequisitionManager;
    use crate::approvals::Decision;
    use crate::domain::requisition::{
        NewRequisition, NewRequisitionItem, Requisition, RequisitionDraft, RequisitionId,
        RequisitionStatus,
    };
    use crate::domain::user::{Role, UserId};
    use crate::errors::{ErrorKind, ProcurementError};
    use crate::identity::Actor;
    use crate::repository::RequisitionRepository;

    #[derive(Default)]
    struct RecordingRepository {
        calls: Mutex<Vec<&'static str>>,
    }

    impl RecordingRepository {
        fn record(&self, call: &'static str) {
            self.calls.lock().expect("calls lock").push(call);
        }
    }

    #[async_trait]
    impl RequisitionRepository for RecordingRepository {
        async fn create_with_items(
            &self,
            draft: RequisitionDraft,
            now: DateTime<Utc>,
        ) -> Result<Requisition, ProcurementError> {
            self.record("create_with_items");
            Ok(Requisition {
                id: RequisitionId(1),
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
                created_at: now,
                updated_at: now,
                items: Vec::new(),
            })
        }

        async fn find_by_id(
            &self,
            _id: RequisitionId,
        ) -> Result<Option<Requisition>, ProcurementError> {
            self.record("find_by_id");
            Ok(None)
        }

        async fn find_owned(
            &self,
            _id: RequisitionId,
            _owner: UserId,
        ) -> Result<Option<Requisition>, ProcurementError> {
            self.record("find_owned");
            Ok(None)
        }

        async fn list_all(&self) -> Result<Vec<Requisition>, ProcurementError> {
            self.record("list_all");
            Ok(Vec::new())
        }

        async fn list_for_owner(
            &self,
            _owner: UserId,
        ) -> Result<Vec<Requisition>, ProcurementError> {
            self.record("list_for_owner");
            Ok(Vec::new())
        }

        async fn apply_decision(
            &self,
            id: RequisitionId,
            _actor: UserId,
            _decision: &Decision,
            _now: DateTime<Utc>,
        ) -> Result<Requisition, ProcurementError> {
            self.record("apply_decision");
            Err(ProcurementError::not_found("requisition", id))
        }
    }

    fn manager() -> RequisitionManager<RecordingRepository> {
        RequisitionManager::new(RecordingRepository::default())
    }

    fn calls(manager: &RequisitionManager<RecordingRepository>) -> Vec<&'static str> {
        manager.repository.calls.lock().expect("calls lock").clone()
    }

    fn payload() -> NewRequisition {
        NewRequisition {
            requisition_type: "goods".to_string(),
            items: vec![NewRequisitionItem {
                description: "Toner".to_string(),
                quantity: Decimal::from(4),
                unit: "box".to_string(),
                ..NewRequisitionItem::default()
            }],
            ..NewRequisition::default()
        }
    }

    #[tokio::test]
    async fn role_is_checked_before_payload() {
        let manager = manager();
        let supplier = Actor::new(UserId(9), Role::Supplier);

        let error = manager
            .create_requisition(NewRequisition::default(), &supplier)
            .await
            .expect_err("supplier may not create");

        assert_eq!(error.kind(), ErrorKind::Forbidden);
        assert!(calls(&manager).is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_the_store() {
        let manager = manager();
        let requester = Actor::new(UserId(2), Role::Requester);

        let error = manager
            .create_requisition(NewRequisition::default(), &requester)
            .await
            .expect_err("empty payload");
        assert_eq!(error.kind(), ErrorKind::InvalidInput);
        assert!(calls(&manager).is_empty());

        let created = manager.create_requisition(payload(), &requester).await.expect("valid");
        assert_eq!(created.user_id, UserId(2));
        assert_eq!(calls(&manager), vec!["create_with_items"]);
    }

    #[tokio::test]
    async fn reads_are_scoped_by_role() {
        let manager = manager();
        let officer = Actor::new(UserId(1), Role::ProcurementOfficer);
        let requester = Actor::new(UserId(2), Role::Requester);

        manager.list_requisitions(&officer).await.expect("list");
        manager.list_requisitions(&requester).await.expect("list");
        let missing = manager
            .get_requisition(RequisitionId(5), &requester)
            .await
            .expect_err("not stored");

        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(calls(&manager), vec!["list_all", "list_for_owner", "find_owned"]);
    }

    #[tokio::test]
    async fn decision_checks_run_in_order_before_loading() {
        let manager = manager();
        let requester = Actor::new(UserId(2), Role::Requester);
        let approver = Actor::new(UserId(3), Role::Approver);

        let forbidden = manager
            .apply_action(RequisitionId(1), &requester, "reject", None)
            .await
            .expect_err("requester may not decide");
        assert_eq!(forbidden.kind(), ErrorKind::Forbidden);

        let invalid = manager
            .apply_action(RequisitionId(1), &approver, "reject", Some("   "))
            .await
            .expect_err("blank reason");
        assert_eq!(invalid.kind(), ErrorKind::InvalidInput);
        assert!(calls(&manager).is_empty());

        let missing = manager
            .apply_action(RequisitionId(1), &approver, "approve", None)
            .await
            .expect_err("not stored");
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(calls(&manager), vec!["apply_decision"]);
    }
}
