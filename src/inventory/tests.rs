//! Inventory Module Tests
//!
//! ## Test Scopes
//! - **Counters**: conditional and unconditional adjustments, floor and ceiling.
//! - **Concurrency**: many racing conditional decrements never oversell.
//! - **HTTP**: the `/items` surface including the `409 NOT_AVAILABLE` answer and the internal
//!   token on `/units`.

#[cfg(test)]
mod tests {
    use crate::caller::{HEADER_INTERNAL_TOKEN, InternalToken};
    use crate::error::MeshError;
    use crate::inventory::handlers::catalog_app;
    use crate::inventory::protocol::{ItemListResponse, UnitsResponse};
    use crate::inventory::store::{InventoryHolder, ItemStore};
    use crate::inventory::types::{InventoryItem, ItemUpdate, NewItem};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use axum::response::Response;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn seeded(units: u32) -> (Arc<ItemStore>, InventoryItem) {
        let store = ItemStore::new();
        let item = store.create(NewItem::new("Dune", "Frank Herbert", units)).unwrap();
        (store, item)
    }

    // ============================================================
    // STORE TESTS
    // ============================================================

    #[test]
    fn test_create_defaults_to_one_available_unit() {
        let store = ItemStore::new();
        let item = store
            .create(NewItem {
                total_units: None,
                ..NewItem::new("Emma", "Jane Austen", 0)
            })
            .unwrap();

        assert_eq!(item.total_units, 1);
        assert_eq!(item.available_units, 1);
        assert_eq!(store.get(&item.id).unwrap(), item);
    }

    #[test]
    fn test_create_requires_title_and_author() {
        let store = ItemStore::new();
        let err = store.create(NewItem::new("", "Nobody", 1)).unwrap_err();
        assert!(matches!(err, MeshError::BadRequest(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_conditional_decrement_takes_last_unit_once() {
        let (store, item) = seeded(1);

        let after = store.adjust_units(&item.id, -1, true).unwrap();
        assert_eq!(after.available_units, 0);

        assert_eq!(
            store.adjust_units(&item.id, -1, true),
            Err(MeshError::NotAvailable)
        );
        assert_eq!(store.get(&item.id).unwrap().available_units, 0);
    }

    #[test]
    fn test_unconditional_decrement_never_goes_negative() {
        let (store, item) = seeded(1);
        store.adjust_units(&item.id, -1, false).unwrap();

        let err = store.adjust_units(&item.id, -1, false).unwrap_err();
        assert!(matches!(err, MeshError::InvalidState(_)));
        assert_eq!(store.get(&item.id).unwrap().available_units, 0);
    }

    #[test]
    fn test_increment_respects_ceiling() {
        let (store, item) = seeded(2);
        store.adjust_units(&item.id, -1, true).unwrap();
        store.adjust_units(&item.id, 1, false).unwrap();

        assert_eq!(
            store.adjust_units(&item.id, 1, false),
            Err(MeshError::CeilingExceeded)
        );
        assert_eq!(store.get(&item.id).unwrap().available_units, 2);
    }

    #[test]
    fn test_huge_delta_is_rejected_not_wrapped() {
        let (store, item) = seeded(2);
        store.adjust_units(&item.id, -1, true).unwrap();

        assert_eq!(
            store.adjust_units(&item.id, i64::MAX, false),
            Err(MeshError::CeilingExceeded)
        );
        assert_eq!(
            store.adjust_units(&item.id, i64::MIN, true),
            Err(MeshError::NotAvailable)
        );
        assert_eq!(store.get(&item.id).unwrap().available_units, 1);
    }

    #[test]
    fn test_adjust_unknown_item() {
        let store = ItemStore::new();
        assert_eq!(
            store.adjust_units("missing", -1, true),
            Err(MeshError::NotFound("Item".to_string()))
        );
    }

    #[test]
    fn test_update_total_keeps_units_on_loan() {
        let (store, item) = seeded(3);
        store.adjust_units(&item.id, -2, true).unwrap();

        let grown = store
            .update(
                &item.id,
                ItemUpdate {
                    total_units: Some(5),
                    genre: Some("sci-fi".to_string()),
                    ..ItemUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(grown.available_units, 3);
        assert_eq!(grown.on_loan(), 2);
        assert_eq!(grown.genre.as_deref(), Some("sci-fi"));

        let err = store
            .update(
                &item.id,
                ItemUpdate {
                    total_units: Some(1),
                    ..ItemUpdate::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidState(_)));
    }

    #[test]
    fn test_list_newest_first_and_remove() {
        let store = ItemStore::new();
        let first = store.create(NewItem::new("A", "X", 1)).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = store.create(NewItem::new("B", "Y", 1)).unwrap();

        let ids: Vec<String> = store.list().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

        store.remove(&first.id).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.remove(&first.id).is_err());
    }

    #[tokio::test]
    async fn test_holder_trait_delegates_to_store() {
        let (store, item) = seeded(1);
        let holder: Arc<dyn InventoryHolder> = store.clone();

        assert_eq!(holder.get_item(&item.id).await.unwrap().available_units, 1);
        holder.adjust_units(&item.id, -1, true).await.unwrap();
        assert_eq!(
            holder.adjust_units(&item.id, -1, true).await,
            Err(MeshError::NotAvailable)
        );
    }

    // ============================================================
    // CONCURRENCY TESTS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_decrements_never_oversell() {
        let (store, item) = seeded(5);
        let granted = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                let granted = granted.clone();
                let id = item.id.clone();
                tokio::spawn(async move {
                    if store.adjust_units(&id, -1, true).is_ok() {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(granted.load(Ordering::SeqCst), 5);
        assert_eq!(store.get(&item.id).unwrap().available_units, 0);
    }

    // ============================================================
    // HTTP TESTS
    // ============================================================

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const TOKEN: &str = "mesh-secret";

    fn app(store: Arc<ItemStore>) -> Router {
        catalog_app(store, InternalToken(TOKEN.to_string()))
    }

    fn put_units(id: &str, delta: i64, conditional: bool) -> Request<Body> {
        put_units_with(id, delta, conditional, Some(TOKEN))
    }

    fn put_units_with(id: &str, delta: i64, conditional: bool, token: Option<&str>) -> Request<Body> {
        let mut request = Request::put(format!("/items/{}/units", id))
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header(HEADER_INTERNAL_TOKEN, token);
        }
        request
            .body(Body::from(
                json!({"delta": delta, "conditional": conditional}).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_http_units_conflict_code() {
        let (store, item) = seeded(1);

        let response = app(store.clone())
            .oneshot(put_units(&item.id, -1, true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: UnitsResponse = serde_json::from_value(json_body(response).await).unwrap();
        assert!(body.success);
        assert_eq!(body.item.available_units, 0);

        let response = app(store.clone())
            .oneshot(put_units(&item.id, -1, true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_AVAILABLE");
    }

    #[tokio::test]
    async fn test_http_units_unknown_item() {
        let store = ItemStore::new();
        let response = app(store)
            .oneshot(put_units("missing", -1, true))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_units_ceiling_code() {
        let (store, item) = seeded(1);
        let response = app(store)
            .oneshot(put_units(&item.id, 1, false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "CEILING_EXCEEDED");
    }

    #[tokio::test]
    async fn test_http_units_extreme_delta() {
        let (store, item) = seeded(1);
        let response = app(store.clone())
            .oneshot(put_units(&item.id, i64::MAX, false))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "CEILING_EXCEEDED");
        assert_eq!(store.get(&item.id).unwrap().available_units, 1);
    }

    #[tokio::test]
    async fn test_http_units_require_internal_token() {
        let (store, item) = seeded(1);

        let anonymous = app(store.clone())
            .oneshot(put_units_with(&item.id, -1, true, None))
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let wrong = app(store.clone())
            .oneshot(put_units_with(&item.id, -1, true, Some("guess")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(wrong).await["success"], false);

        let user = app(store.clone())
            .oneshot(
                Request::put(format!("/books/{}/units", item.id))
                    .header("content-type", "application/json")
                    .header("x-user-id", "root")
                    .header("x-user-role", "admin")
                    .body(Body::from(json!({"delta": -1, "conditional": true}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(user.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(store.get(&item.id).unwrap().available_units, 1);
    }

    #[tokio::test]
    async fn test_http_create_requires_admin() {
        let store = ItemStore::new();
        let body = json!({"title": "Dune", "author": "Frank Herbert", "totalUnits": 2}).to_string();

        let anonymous = app(store.clone())
            .oneshot(
                Request::post("/items")
                    .header("content-type", "application/json")
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let member = app(store.clone())
            .oneshot(
                Request::post("/items")
                    .header("content-type", "application/json")
                    .header("x-user-id", "u-1")
                    .body(Body::from(body.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(member.status(), StatusCode::FORBIDDEN);

        let admin = app(store.clone())
            .oneshot(
                Request::post("/items")
                    .header("content-type", "application/json")
                    .header("x-user-id", "root")
                    .header("x-user-role", "admin")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(admin.status(), StatusCode::CREATED);
        let item: InventoryItem = serde_json::from_value(json_body(admin).await).unwrap();
        assert_eq!(item.total_units, 2);
        assert_eq!(item.available_units, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_http_list_plain_and_paged() {
        let store = ItemStore::new();
        for i in 0..3 {
            store.create(NewItem::new(format!("T{}", i), "A", 1)).unwrap();
        }

        let plain = app(store.clone())
            .oneshot(Request::get("/items").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let plain: ItemListResponse = serde_json::from_value(json_body(plain).await).unwrap();
        assert!(matches!(plain, ItemListResponse::All(items) if items.len() == 3));

        let paged = app(store)
            .oneshot(Request::get("/books?page=2&limit=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        match serde_json::from_value(json_body(paged).await).unwrap() {
            ItemListResponse::Paged { data, pagination } => {
                assert_eq!(data.len(), 1);
                assert_eq!(pagination.pages, 2);
                assert_eq!(pagination.total, 3);
            }
            other => panic!("Expected paged response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_page_far_past_the_end() {
        let store = ItemStore::new();
        for i in 0..3 {
            store.create(NewItem::new(format!("T{}", i), "A", 1)).unwrap();
        }

        let response = app(store)
            .oneshot(
                Request::get(format!("/items?page={}&limit=2", usize::MAX))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        match serde_json::from_value(json_body(response).await).unwrap() {
            ItemListResponse::Paged { data, pagination } => {
                assert!(data.is_empty());
                assert_eq!(pagination.current, usize::MAX);
                assert_eq!(pagination.total, 3);
            }
            other => panic!("Expected paged response, got {:?}", other),
        }
    }
}
