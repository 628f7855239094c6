//! Integration tests for the order lifecycle.
//!
//! These run the order service against the in-memory database and check
//! atomicity of creation, stock conservation, the status state machine and
//! the delete policies.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{ErrorKind, Money, OrderId, OrderStatus, ProductId, UserId};
use domain::{DeletePolicy, LineItem, OrderError, OrderPolicy, OrderService, PaymentLedger};
use store::{
    CatalogStore, Database, FailPoint, InMemoryDatabase, OrderFilter, Product, Transaction,
};

/// Helper to create a database with one product
async fn setup(quantity: i32, price: i64) -> (InMemoryDatabase, Product) {
    let db = InMemoryDatabase::new();
    let product = add_product(&db, quantity, price).await;
    (db, product)
}

async fn add_product(db: &InMemoryDatabase, quantity: i32, price: i64) -> Product {
    let now = Utc::now();
    let product = Product {
        id: ProductId::new(),
        name: format!("Product {price}"),
        description: "Test product".to_string(),
        image_url: format!("https://img.example.com/{price}.png"),
        price: Money::from_minor(price),
        quantity,
        date_created: now,
        date_updated: now,
    };
    db.session()
        .await
        .unwrap()
        .create_product(&product)
        .await
        .unwrap();
    product
}

async fn stock(db: &InMemoryDatabase, id: ProductId) -> i32 {
    let mut session = db.session().await.unwrap();
    session.product_by_id(id).await.unwrap().unwrap().quantity
}

/// Runs `create` in its own transaction, committing only on success.
async fn place(
    db: &InMemoryDatabase,
    service: &OrderService,
    user_id: UserId,
    items: &[LineItem],
) -> Result<store::OrderWithItems, OrderError> {
    let mut tx = db.begin().await.unwrap();
    match service.create(&mut tx, user_id, items).await {
        Ok(created) => {
            tx.commit().await.unwrap();
            Ok(created)
        }
        Err(e) => {
            tx.rollback().await.unwrap();
            Err(e)
        }
    }
}

async fn place_one(db: &InMemoryDatabase, service: &OrderService, product: &Product) -> OrderId {
    place(db, service, UserId::new(), &[LineItem::new(product.id, 1)])
        .await
        .unwrap()
        .order
        .id
}

mod creation {
    use super::*;

    #[tokio::test]
    async fn scenario_a_reserves_and_totals() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();

        let created = place(&db, &service, UserId::new(), &[LineItem::new(product.id, 3)])
            .await
            .unwrap();

        assert_eq!(created.order.amount, Money::from_minor(300));
        assert_eq!(created.order.status, OrderStatus::Created);
        assert_eq!(stock(&db, product.id).await, 2);
    }

    #[tokio::test]
    async fn scenario_b_shortfall_changes_nothing() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        place(&db, &service, UserId::new(), &[LineItem::new(product.id, 3)])
            .await
            .unwrap();

        let err = place(&db, &service, UserId::new(), &[LineItem::new(product.id, 3)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InsufficientStock { requested: 3, available: 2, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(stock(&db, product.id).await, 2);
        assert_eq!(db.order_count().await, 1);
    }

    #[tokio::test]
    async fn conservation_of_amount() {
        let db = InMemoryDatabase::new();
        let service = OrderService::default();
        let a = add_product(&db, 10, 199).await;
        let b = add_product(&db, 10, 1).await;
        let c = add_product(&db, 10, 2_500).await;

        let created = place(
            &db,
            &service,
            UserId::new(),
            &[
                LineItem::new(a.id, 3),
                LineItem::new(b.id, 7),
                LineItem::new(c.id, 1),
            ],
        )
        .await
        .unwrap();

        let sum: i64 = created
            .items
            .iter()
            .map(|item| item.price.minor() * i64::from(item.quantity))
            .sum();
        assert_eq!(created.order.amount.minor(), sum);
        assert_eq!(sum, 199 * 3 + 7 + 2_500);
        assert_eq!(db.order_item_count().await, 3);
    }
}

mod atomicity {
    use super::*;

    async fn assert_untouched(db: &InMemoryDatabase, products: &[(&Product, i32)]) {
        for (product, quantity) in products {
            assert_eq!(stock(db, product.id).await, *quantity);
        }
        assert_eq!(db.order_count().await, 0);
        assert_eq!(db.order_item_count().await, 0);
    }

    #[tokio::test]
    async fn missing_product() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();

        let err = place(
            &db,
            &service,
            UserId::new(),
            &[LineItem::new(product.id, 1), LineItem::new(ProductId::new(), 1)],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrderError::MissingProduct { .. }));
        assert_untouched(&db, &[(&product, 5)]).await;
    }

    #[tokio::test]
    async fn duplicate_line_item() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();

        let err = place(
            &db,
            &service,
            UserId::new(),
            &[LineItem::new(product.id, 1), LineItem::new(product.id, 1)],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrderError::DuplicateLineItem { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_untouched(&db, &[(&product, 5)]).await;
    }

    #[tokio::test]
    async fn empty_and_non_positive_requests() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();

        let err = place(&db, &service, UserId::new(), &[]).await.unwrap_err();
        assert!(matches!(err, OrderError::NoItems));

        let err = place(&db, &service, UserId::new(), &[LineItem::new(product.id, -2)])
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidQuantity { .. }));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        assert_untouched(&db, &[(&product, 5)]).await;
    }

    #[tokio::test]
    async fn item_write_failure_rolls_back_decrement_and_header() {
        let db = InMemoryDatabase::new();
        let service = OrderService::default();
        let a = add_product(&db, 5, 100).await;
        let b = add_product(&db, 4, 50).await;
        db.fail_on(FailPoint::CreateOrderItems).await;

        let err = place(
            &db,
            &service,
            UserId::new(),
            &[LineItem::new(a.id, 2), LineItem::new(b.id, 4)],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrderError::Store(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_untouched(&db, &[(&a, 5), (&b, 4)]).await;
    }

    #[tokio::test]
    async fn header_write_failure_rolls_back_decrement() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        db.fail_on(FailPoint::CreateOrder).await;

        let err = place(&db, &service, UserId::new(), &[LineItem::new(product.id, 5)])
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Store(_)));
        assert_untouched(&db, &[(&product, 5)]).await;
    }

    #[tokio::test]
    async fn stock_never_goes_negative() {
        let (db, product) = setup(4, 10).await;
        let service = OrderService::default();

        let mut placed = 0;
        for _ in 0..10 {
            if place(&db, &service, UserId::new(), &[LineItem::new(product.id, 3)])
                .await
                .is_ok()
            {
                placed += 1;
            }
            assert!(stock(&db, product.id).await >= 0);
        }

        assert_eq!(placed, 1);
        assert_eq!(stock(&db, product.id).await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_never_oversell() {
        let (db, product) = setup(10, 10).await;
        let service = OrderService::default();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            let service = service.clone();
            let product_id = product.id;
            handles.push(tokio::spawn(async move {
                place(&db, &service, UserId::new(), &[LineItem::new(product_id, 3)])
                    .await
                    .is_ok()
            }));
        }

        let mut placed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                placed += 1;
            }
        }

        assert_eq!(placed, 3);
        assert_eq!(stock(&db, product.id).await, 1);
        assert_eq!(db.order_count().await, 3);
    }
}

mod status {
    use super::*;

    #[tokio::test]
    async fn scenario_c_cancel_is_idempotent_and_terminal() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let order_id = place_one(&db, &service, &product).await;
        let mut session = db.session().await.unwrap();

        let cancelled = service.cancel(&mut session, order_id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let again = service.cancel(&mut session, order_id).await.unwrap();
        assert_eq!(again.status, OrderStatus::Cancelled);
        assert_eq!(again.date_updated, cancelled.date_updated);

        let err = service
            .transition(&mut session, order_id, OrderStatus::Finished)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderAlreadyCancelled(id) if id == order_id));

        let stored = service.query_by_id(&mut session, order_id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn finished_orders_accept_no_other_status() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let order_id = place_one(&db, &service, &product).await;
        let mut session = db.session().await.unwrap();

        service
            .transition(&mut session, order_id, OrderStatus::Finished)
            .await
            .unwrap();

        for target in [OrderStatus::Created, OrderStatus::Cancelled] {
            let err = service
                .transition(&mut session, order_id, target)
                .await
                .unwrap_err();
            assert!(matches!(err, OrderError::OrderAlreadyFinished(_)));
        }
        let stored = service.query_by_id(&mut session, order_id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Finished);
    }

    #[tokio::test]
    async fn stale_read_observes_concurrent_change() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let order_id = place_one(&db, &service, &product).await;
        let mut first = db.session().await.unwrap();
        let mut second = db.session().await.unwrap();

        let seen_by_first = service.query_by_id(&mut first, order_id).await.unwrap();
        let seen_by_second = service.query_by_id(&mut second, order_id).await.unwrap();

        let finished = domain::transition(
            &mut first,
            seen_by_first,
            OrderStatus::Finished,
            Utc::now(),
        )
        .await
        .unwrap();
        let err = domain::transition(
            &mut second,
            seen_by_second,
            OrderStatus::Cancelled,
            Utc::now(),
        )
        .await
        .unwrap_err();

        assert_eq!(finished.status, OrderStatus::Finished);
        assert!(matches!(
            err,
            OrderError::ConcurrentStatusChange { expected: OrderStatus::Created, .. }
        ));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transitions_have_one_winner() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let order_id = place_one(&db, &service, &product).await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let db = db.clone();
            let service = service.clone();
            let target = if i % 2 == 0 {
                OrderStatus::Finished
            } else {
                OrderStatus::Cancelled
            };
            handles.push(tokio::spawn(async move {
                let mut session = db.session().await.unwrap();
                service
                    .transition(&mut session, order_id, target)
                    .await
                    .map(|order| (target, order.status))
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let mut session = db.session().await.unwrap();
        let final_status = service
            .query_by_id(&mut session, order_id)
            .await
            .unwrap()
            .status;
        assert_ne!(final_status, OrderStatus::Created);

        for result in results {
            match result {
                Ok((target, status)) => {
                    assert_eq!(target, final_status);
                    assert_eq!(status, final_status);
                }
                Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
            }
        }
    }

    #[tokio::test]
    async fn cancel_keeps_stock_by_default() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let created = place(&db, &service, UserId::new(), &[LineItem::new(product.id, 3)])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        service.cancel(&mut tx, created.order.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stock(&db, product.id).await, 2);
    }

    #[tokio::test]
    async fn cancel_restocks_under_policy() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::new(OrderPolicy::default().with_restock_on_cancel(true));
        let created = place(&db, &service, UserId::new(), &[LineItem::new(product.id, 3)])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        service.cancel(&mut tx, created.order.id).await.unwrap();
        // A repeated cancel must not restock twice.
        service.cancel(&mut tx, created.order.id).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stock(&db, product.id).await, 5);
    }
}

mod deletion {
    use super::*;

    struct Paid;

    #[async_trait]
    impl PaymentLedger for Paid {
        async fn has_successful_payment(&self, _order_id: OrderId) -> Result<bool, OrderError> {
            Ok(true)
        }
    }

    async fn delete(
        db: &InMemoryDatabase,
        service: &OrderService,
        order_id: OrderId,
    ) -> Result<(), OrderError> {
        let mut tx = db.begin().await.unwrap();
        let result = service.delete(&mut tx, order_id).await;
        if result.is_ok() {
            tx.commit().await.unwrap();
        }
        result
    }

    #[tokio::test]
    async fn created_and_cancelled_orders_are_deletable() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let created = place_one(&db, &service, &product).await;
        let cancelled = place_one(&db, &service, &product).await;
        service
            .cancel(&mut db.session().await.unwrap(), cancelled)
            .await
            .unwrap();

        delete(&db, &service, created).await.unwrap();
        delete(&db, &service, cancelled).await.unwrap();

        assert_eq!(db.order_count().await, 0);
        assert_eq!(db.order_item_count().await, 0);
    }

    #[tokio::test]
    async fn finished_orders_are_kept() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let order_id = place_one(&db, &service, &product).await;
        service
            .transition(&mut db.session().await.unwrap(), order_id, OrderStatus::Finished)
            .await
            .unwrap();

        let err = delete(&db, &service, order_id).await.unwrap_err();

        assert!(matches!(err, OrderError::OrderAlreadyFinished(_)));
        assert_eq!(db.order_count().await, 1);
        assert_eq!(db.order_item_count().await, 1);
    }

    #[tokio::test]
    async fn missing_order() {
        let db = InMemoryDatabase::new();
        let err = delete(&db, &OrderService::default(), OrderId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn paid_orders_are_kept_under_strict_policy() {
        let (db, product) = setup(5, 100).await;
        let lenient = OrderService::default().with_payment_ledger(Arc::new(Paid));
        let strict = OrderService::new(
            OrderPolicy::default().with_delete(DeletePolicy::UnlessFinishedOrPaid),
        )
        .with_payment_ledger(Arc::new(Paid));
        let order_id = place_one(&db, &strict, &product).await;

        let err = delete(&db, &strict, order_id).await.unwrap_err();
        assert!(matches!(err, OrderError::OrderHasPayments(_)));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        delete(&db, &lenient, order_id).await.unwrap();
        assert_eq!(db.order_count().await, 0);
    }

    #[tokio::test]
    async fn failed_header_delete_keeps_items() {
        let (db, product) = setup(5, 100).await;
        let service = OrderService::default();
        let order_id = place_one(&db, &service, &product).await;
        db.fail_on(FailPoint::DeleteOrder).await;

        assert!(delete(&db, &service, order_id).await.is_err());

        assert_eq!(db.order_count().await, 1);
        assert_eq!(db.order_item_count().await, 1);
    }
}

mod queries {
    use super::*;
    use store::{OrderBy, Page, SortDirection, SortField};

    #[tokio::test]
    async fn per_user_listing_with_count() {
        let (db, product) = setup(100, 10).await;
        let service = OrderService::default();
        let alice = UserId::new();
        let bob = UserId::new();

        for quantity in 1..=4 {
            place(&db, &service, alice, &[LineItem::new(product.id, quantity)])
                .await
                .unwrap();
        }
        place(&db, &service, bob, &[LineItem::new(product.id, 1)])
            .await
            .unwrap();

        let mut session = db.session().await.unwrap();
        let filter = OrderFilter::for_user(alice);
        assert_eq!(service.count(&mut session, &filter).await.unwrap(), 4);

        let page = service
            .query(
                &mut session,
                &filter,
                OrderBy::new(SortField::Amount, SortDirection::Desc),
                Page::new(1, 3).unwrap(),
            )
            .await
            .unwrap();
        let amounts: Vec<i64> = page.iter().map(|o| o.amount.minor()).collect();
        assert_eq!(amounts, vec![40, 30, 20]);
        assert!(page.iter().all(|o| o.user_id == alice));
    }
}
