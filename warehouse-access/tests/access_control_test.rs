//! Resource access integration tests.

mod common;

use common::{admin, manager, staff, viewer, TestAccess};
use service_core::axum::{body::Body, extract::Request, http::StatusCode};
use tokio_test::{assert_err, assert_ok};
use tower::ServiceExt;
use warehouse_access::{
    models::{
        Caller, PermissionSet, ProjectScope, RequestContext, ResourceType, Role,
        SecurityEventKind,
    },
    services::{AccessControl, AccessError, AccessReason, MockAssignmentStore},
};

async fn get(app: service_core::axum::Router, uri: &str) -> StatusCode {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn staff_reaches_only_assigned_projects() {
    let test = TestAccess::new(MockAssignmentStore::new().with_assignment(7, 42));
    let caller = staff(7);
    let ctx = RequestContext::new("GET", "/projects/42");

    let reason = assert_ok!(
        test.access
            .authorize_resource(Some(&caller), &ResourceType::Project, Some(42), &ctx)
            .await
    );
    assert_eq!(reason, AccessReason::Assigned);
    assert!(test.audit.is_empty());

    let ctx = RequestContext::new("GET", "/projects/43");
    let err = assert_err!(
        test.access
            .authorize_resource(Some(&caller), &ResourceType::Project, Some(43), &ctx)
            .await
    );
    assert!(matches!(err, AccessError::Forbidden));

    let events = test.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SecurityEventKind::UnauthorizedResourceAccess);
    assert_eq!(events[0].user_id, Some(7));
    assert_eq!(events[0].resource_type.as_deref(), Some("project"));
    assert_eq!(events[0].resource_id, Some(43));
}

#[tokio::test]
async fn http_guard_maps_outcomes_to_status_codes() {
    let test = TestAccess::new(
        MockAssignmentStore::new()
            .with_assignment(7, 42)
            .with_project_customer(42, 5),
    );

    let app = test.router(Some(staff(7)));
    assert_eq!(get(app.clone(), "/projects/42").await, StatusCode::OK);
    assert_eq!(get(app.clone(), "/projects/43").await, StatusCode::FORBIDDEN);
    assert_eq!(get(app.clone(), "/customers/5").await, StatusCode::OK);
    assert_eq!(get(app.clone(), "/customers/6").await, StatusCode::FORBIDDEN);
    assert_eq!(get(app, "/projects/forty-two").await, StatusCode::BAD_REQUEST);

    assert_eq!(test.audit.len(), 2);

    let anonymous = test.router(None);
    assert_eq!(get(anonymous, "/projects/42").await, StatusCode::UNAUTHORIZED);

    test.store.set_failing(true);
    let app = test.router(Some(staff(7)));
    assert_eq!(
        get(app, "/projects/42").await,
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(test.audit.len(), 2);
}

#[tokio::test]
async fn forbidden_body_does_not_reveal_resource() {
    let test = TestAccess::new(MockAssignmentStore::new());
    let response = test
        .router(Some(staff(7)))
        .oneshot(
            Request::builder()
                .uri("/projects/99999")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let bytes = service_core::axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Not authorized");
    assert!(!bytes.windows(5).any(|w| w == b"99999"));
}

#[tokio::test]
async fn privileged_roles_skip_the_store() {
    let test = TestAccess::new(MockAssignmentStore::new());

    for caller in [admin(1), manager(2)] {
        let app = test.router(Some(caller));
        assert_eq!(get(app.clone(), "/projects/42").await, StatusCode::OK);
        assert_eq!(get(app, "/customers/5").await, StatusCode::OK);
    }
    assert_eq!(test.store.lookup_count(), 0);
}

#[tokio::test]
async fn revoked_assignment_takes_effect_on_next_request() {
    let test = TestAccess::new(MockAssignmentStore::new().with_assignment(9, 42));
    let app = test.router(Some(viewer(9)));

    assert_eq!(get(app.clone(), "/projects/42").await, StatusCode::OK);
    test.store.unassign(9, 42);
    assert_eq!(get(app.clone(), "/projects/42").await, StatusCode::FORBIDDEN);
    test.store.assign(9, 42);
    assert_eq!(get(app, "/projects/42").await, StatusCode::OK);
    assert_eq!(test.store.lookup_count(), 3);
}

#[tokio::test]
async fn unknown_resource_types_are_open() {
    let test = TestAccess::new(MockAssignmentStore::new());
    let decision = assert_ok!(
        test.access
            .can_access_resource(Some(&viewer(3)), &ResourceType::from("warehouse_zone"), None)
            .await
    );
    assert!(decision.is_allowed());
    assert_eq!(decision.reason(), AccessReason::UngatedResourceType);
}

#[tokio::test]
async fn project_listing_scope_follows_role() {
    let test = TestAccess::new(
        MockAssignmentStore::new()
            .with_assignment(7, 42)
            .with_assignment(7, 11),
    );

    assert_eq!(
        assert_ok!(test.access.project_scope(Some(&manager(2))).await),
        ProjectScope::All
    );

    let scope = assert_ok!(test.access.project_scope(Some(&staff(7))).await);
    assert!(scope.includes(42));
    assert!(scope.includes(11));
    assert!(!scope.includes(43));

    assert!(matches!(
        test.access.project_scope(None).await,
        Err(AccessError::Unauthenticated)
    ));
}

#[test]
fn permission_checks_with_stored_permission_shapes() {
    let from_array = PermissionSet::from_stored(&serde_json::json!(["read", "write"]));
    let from_text = PermissionSet::from_stored(&serde_json::json!("[\"read\",\"write\"]"));
    let garbage = PermissionSet::from_json_str("{not json");
    assert_eq!(from_array, from_text);
    assert!(garbage.is_empty());

    let writer = Caller::new(4, Role::Staff, from_array);
    assert!(AccessControl::has_permission(Some(&writer), "write").unwrap());
    assert!(!AccessControl::has_permission(Some(&writer), "delete").unwrap());

    let broken = Caller::new(5, Role::Staff, garbage);
    assert!(!AccessControl::has_permission(Some(&broken), "read").unwrap());

    let superuser = Caller::new(6, Role::Viewer, PermissionSet::new(["all"]));
    assert!(AccessControl::has_permission(Some(&superuser), "anything").unwrap());

    assert!(matches!(
        AccessControl::has_permission(None, "read"),
        Err(AccessError::Unauthenticated)
    ));
}
