use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        admin::{IssuanceDepth, RedriveResult},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        balance::TopUpRequest,
        coupons::{ClaimReceipt, CouponList, CreateCouponRequest, IssuedCouponList},
        orders::{CreateOrderRequest, OrderItemRequest, OrderList, OrderWithItems},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
    },
    models::{Balance, Coupon, CouponStatus, IssuedCoupon, Order, OrderItem, OrderStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, balance, coupons, health, orders, params, products as product_routes},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        product_routes::list_products,
        product_routes::create_product,
        product_routes::get_product,
        product_routes::update_product,
        product_routes::delete_product,
        coupons::list_coupons,
        coupons::claim_coupon,
        coupons::my_coupons,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::pay_order,
        orders::cancel_order,
        balance::get_balance,
        balance::top_up,
        admin::create_coupon,
        admin::issuance_depth,
        admin::redrive_dead_letters
    ),
    components(
        schemas(
            User,
            Product,
            Coupon,
            CouponStatus,
            IssuedCoupon,
            Order,
            OrderItem,
            OrderStatus,
            Balance,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            CreateCouponRequest,
            CouponList,
            IssuedCouponList,
            ClaimReceipt,
            OrderItemRequest,
            CreateOrderRequest,
            OrderWithItems,
            OrderList,
            TopUpRequest,
            IssuanceDepth,
            RedriveResult,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Coupon>,
            ApiResponse<CouponList>,
            ApiResponse<IssuedCouponList>,
            ApiResponse<ClaimReceipt>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<Balance>,
            ApiResponse<IssuanceDepth>,
            ApiResponse<RedriveResult>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Coupons", description = "Coupon campaign and claim endpoints"),
        (name = "Orders", description = "Order lifecycle endpoints"),
        (name = "Balance", description = "Account balance endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
