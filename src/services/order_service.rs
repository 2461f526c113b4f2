use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    allocation::{checked_apply, fetch_locked},
    audit::log_audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems},
    entity::{
        balances::{ActiveModel as BalanceActive, Entity as Balances},
        coupons::Entity as Coupons,
        issued_coupons::{ActiveModel as IssuedActive, Entity as IssuedCoupons},
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CouponStatus, Order, OrderItem, OrderStatus, effective_coupon_status},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items: orders }, Some(meta)))
}

/// Create an order: reserve stock for every line item and consume the
/// optional coupon, all in one transaction. Product rows are locked in
/// ascending id order so concurrent multi-item orders cannot deadlock on
/// each other; the lock serializes read-verify-write per row, which is what
/// bounds concurrent creations to the available stock.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    // BTreeMap both merges repeated products and fixes the lock order.
    let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
    for item in &payload.items {
        if item.quantity <= 0 {
            return Err(AppError::BadRequest("Quantity must be positive".into()));
        }
        *wanted.entry(item.product_id).or_insert(0) += item.quantity;
    }
    if wanted.is_empty() {
        return Err(AppError::BadRequest("Order has no items".into()));
    }

    let txn = state.orm.begin().await?;
    let now = Utc::now();

    let mut total_amount: i64 = 0;
    let mut lines: Vec<(Uuid, i32, i64)> = Vec::with_capacity(wanted.len());
    for (&product_id, &quantity) in &wanted {
        let product = fetch_locked::<Products>(&txn, product_id)
            .await?
            .ok_or(AppError::NotFound)?;

        let remaining = checked_apply(product.stock as i64, -(quantity as i64), None)
            .map_err(|_| AppError::InsufficientStock(product_id))?;

        total_amount += product.price * quantity as i64;
        lines.push((product_id, quantity, product.price));

        let mut active: ProductActive = product.into();
        active.stock = Set(remaining as i32);
        active.update(&txn).await?;
    }

    let mut discount_amount: i64 = 0;
    if let Some(issued_id) = payload.issued_coupon_id {
        let issued = fetch_locked::<IssuedCoupons>(&txn, issued_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if issued.user_id != user.user_id {
            return Err(AppError::Forbidden);
        }

        let stored = CouponStatus::parse(&issued.status).unwrap_or(CouponStatus::Expired);
        let expires_at = issued.expires_at.with_timezone(&Utc);
        if effective_coupon_status(stored, expires_at, now) != CouponStatus::Available {
            return Err(AppError::CouponNotActive);
        }

        let parent = Coupons::find_by_id(issued.coupon_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        discount_amount = total_amount * parent.discount_bp as i64 / 10_000;

        let mut active: IssuedActive = issued.into();
        active.status = Set(CouponStatus::Used.as_str().into());
        active.used_at = Set(Some(now.into()));
        active.update(&txn).await?;
    }

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        status: Set(OrderStatus::Pending.as_str().into()),
        total_amount: Set(total_amount),
        discount_amount: Set(discount_amount),
        final_amount: Set(total_amount - discount_amount),
        issued_coupon_id: Set(payload.issued_coupon_id),
        invoice_number: Set(build_invoice_number(order_id)),
        paid_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for (product_id, quantity, unit_price) in lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(order_item_from_entity(item));
    }

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: order_from_entity(order),
            items: order_items,
        },
        Some(Meta::empty()),
    ))
}

/// Pay a pending order: debit the balance under its row lock in the same
/// transaction that flips the order to paid, so the debit and the status
/// change land or roll back together.
pub async fn pay_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = fetch_locked::<Orders>(&txn, id)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    let status = OrderStatus::parse(&order.status).unwrap_or(OrderStatus::Pending);
    if !status.is_payable() {
        return Err(AppError::BadRequest("Order is not payable".into()));
    }

    let final_amount = order.final_amount;
    // No balance row means the account has never been funded.
    let balance = fetch_locked::<Balances>(&txn, user.user_id)
        .await?
        .ok_or(AppError::InsufficientBalance)?;
    let remaining =
        checked_apply(balance.amount, -final_amount, None).map_err(|_| AppError::InsufficientBalance)?;

    let now = Utc::now();
    let mut balance_active: BalanceActive = balance.into();
    balance_active.amount = Set(remaining);
    balance_active.updated_at = Set(now.into());
    balance_active.update(&txn).await?;

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Paid.as_str().into());
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    let order = active.update(&txn).await?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;

    txn.commit().await?;

    // Sales counters are best-effort ranking fodder, not allocation state.
    for item in &items {
        if let Err(err) = Products::update_many()
            .col_expr(
                ProdCol::SalesCount,
                Expr::col(ProdCol::SalesCount).add(item.quantity as i64),
            )
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(&state.orm)
            .await
        {
            tracing::warn!(error = %err, product_id = %item.product_id, "sales counter update failed");
        }
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_paid",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Payment recorded",
        OrderWithItems {
            order: order_from_entity(order),
            items: items.into_iter().map(order_item_from_entity).collect(),
        },
        Some(Meta::empty()),
    ))
}

/// Cancel a pending order and reverse its allocations: stock back onto every
/// product, the applied coupon back to available. Only pending orders are
/// reversible; the status guard is what prevents double compensation.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let result = reverse_order(state, user, id).await;

    if let Err(err) = &result {
        if !err.is_business_rejection() && !matches!(err, AppError::NotFound) {
            // An un-reversed allocation is a lost resource unit; make sure an
            // operator can find it.
            tracing::error!(order_id = %id, error = %err, "order reversal failed, allocation not restored");
        }
    }
    let (order, items) = result?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancelled",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order_from_entity(order),
            items: items.into_iter().map(order_item_from_entity).collect(),
        },
        Some(Meta::empty()),
    ))
}

async fn reverse_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<(OrderModel, Vec<OrderItemModel>)> {
    let txn = state.orm.begin().await?;

    let order = fetch_locked::<Orders>(&txn, id)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }
    let status = OrderStatus::parse(&order.status).unwrap_or(OrderStatus::Pending);
    if !status.is_cancellable() {
        return Err(AppError::CannotCancel);
    }

    // Same ascending lock order as creation.
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::ProductId)
        .all(&txn)
        .await?;

    for item in &items {
        let product = fetch_locked::<Products>(&txn, item.product_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let restored = product.stock + item.quantity;
        let mut active: ProductActive = product.into();
        active.stock = Set(restored);
        active.update(&txn).await?;
    }

    if let Some(issued_id) = order.issued_coupon_id {
        let issued = fetch_locked::<IssuedCoupons>(&txn, issued_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let mut active: IssuedActive = issued.into();
        active.status = Set(CouponStatus::Available.as_str().into());
        active.used_at = Set(None);
        active.update(&txn).await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    Ok((order, items))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?;
    let order = match order {
        Some(o) => o,
        None => return Err(AppError::NotFound),
    };

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order_from_entity(order),
            items,
        },
        Some(Meta::empty()),
    ))
}

fn order_from_entity(model: OrderModel) -> Order {
    Order {
        id: model.id,
        user_id: model.user_id,
        status: OrderStatus::parse(&model.status).unwrap_or(OrderStatus::Pending),
        total_amount: model.total_amount,
        discount_amount: model.discount_amount,
        final_amount: model.final_amount,
        issued_coupon_id: model.issued_coupon_id,
        invoice_number: model.invoice_number,
        paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.to_string();
    let short = &suffix[..8];
    format!("INV-{}-{}", date, short)
}
