//! Request handler definitions
//!
//! Define each route and its handler here. Handlers translate between HTTP and the engine APIs and nothing more;
//! business rules live in the engine.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every engine call is async, so awaiting it lets the worker serve
//! other requests in the meantime. Never call blocking code from a handler.
//!
//! | Route                                | Roles               |
//! |--------------------------------------|---------------------|
//! | `GET /health`                        | none                |
//! | `POST /product`                      | seller              |
//! | `GET /product/{id}`                  | none                |
//! | `POST /order`                        | buyer               |
//! | `GET /order/{id}`                    | order party, admin  |
//! | `GET /orders`                        | buyer, seller, admin|
//! | `POST, PUT /order/{id}/payment-proof`| buyer               |
//! | `POST /order/{id}/confirm-payment`   | seller              |
//! | `POST /order/{id}/reject-payment`    | seller              |
//! | `POST /order/{id}/cancel`            | order party, admin  |
//! | `POST /order/{id}/ship`, `/deliver`  | seller, admin       |
//! | `POST /order/{id}/gateway-result`    | gateway             |
//! | `POST /complaint`                    | buyer               |
//! | `POST /complaint/{id}/review`        | admin               |
//! | `POST /complaint/{id}/resolve`       | admin               |
//! | `POST /complaint/{id}/reject`        | admin               |
//! | `GET /complaint/{id}`                | complainant, admin  |
use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use marketplace_engine::{
    db_types::{GatewayReport, NewComplaint, NewProduct, OrderId, ProductId, Role},
    order_objects::{OrderQueryFilter, OrderRequest},
    traits::{MarketplaceDatabase, OrderManagement},
    CatalogApi,
    ComplaintApi,
    OrderFlowApi,
    OrderQueryApi,
    PaymentApi,
};

use crate::{
    data_objects::{
        ComplaintRequest,
        OrderStatusResponse,
        PaymentProofRequest,
        RejectComplaintRequest,
        ResolveComplaintRequest,
    },
    errors::ServerError,
    identity::Identity,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:expr),+])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds)++ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Catalog  ----------------------------------------------------
route!(add_product => Post "/product" impl MarketplaceDatabase where requires [Role::Seller]);
pub async fn add_product<B: MarketplaceDatabase>(
    identity: Identity,
    body: web::Json<NewProduct>,
    api: web::Data<CatalogApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST product from {}", identity.user_id);
    let product = api.add_product(&identity.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(product))
}

route!(product_by_id => Get "/product/{product_id}" impl MarketplaceDatabase);
pub async fn product_by_id<B: MarketplaceDatabase>(
    path: web::Path<ProductId>,
    api: web::Data<CatalogApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let product_id = path.into_inner();
    trace!("💻️ GET product({product_id})");
    let product = api
        .fetch_product(&product_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Product {product_id} does not exist")))?;
    Ok(HttpResponse::Ok().json(product))
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(place_order => Post "/order" impl MarketplaceDatabase where requires [Role::Buyer]);
/// Places an order. The body is validated in full, and every problem found is reported at once as a `400` response
/// listing the offending fields. If stock runs out, the response is a `409` listing the variants that are short.
pub async fn place_order<B: MarketplaceDatabase>(
    identity: Identity,
    body: web::Json<OrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST order from {}", identity.user_id);
    let order = api.place_order(&identity.user_id, &body).await?;
    Ok(HttpResponse::Created().json(OrderStatusResponse::from(&order)))
}

route!(order_by_id => Get "/order/{order_id}" impl OrderManagement);
/// The buyer or seller of an order may view it. Admins may view any order.
pub async fn order_by_id<B: OrderManagement>(
    identity: Identity,
    path: web::Path<OrderId>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order({order_id}) for {}", identity.user_id);
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    let may_view = match identity.role {
        Role::Admin => true,
        Role::Buyer => order.buyer_id == identity.user_id,
        Role::Seller => order.seller_id == identity.user_id,
        Role::Gateway => false,
    };
    if !may_view {
        return Err(ServerError::InsufficientPermissions(format!("You may not view order {order_id}")));
    }
    Ok(HttpResponse::Ok().json(order))
}

route!(my_orders => Get "/orders" impl OrderManagement);
/// Buyers see the orders they placed, sellers the orders placed with them. Admins see every order.
pub async fn my_orders<B: OrderManagement>(
    identity: Identity,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders for {} ({})", identity.user_id, identity.role);
    let orders = match identity.role {
        Role::Buyer => api.orders_for_buyer(&identity.user_id).await?,
        Role::Seller => api.orders_for_seller(&identity.user_id).await?,
        Role::Admin => api.search_orders(OrderQueryFilter::default()).await?,
        Role::Gateway => {
            return Err(ServerError::InsufficientPermissions("The gateway role cannot list orders".into()));
        },
    };
    Ok(HttpResponse::Ok().json(orders))
}

route!(cancel_order => Post "/order/{order_id}/cancel" impl MarketplaceDatabase);
pub async fn cancel_order<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST cancel order {order_id} by {} ({})", identity.user_id, identity.role);
    let order = api.cancel_order(&order_id, &identity.user_id, identity.role).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(&order)))
}

route!(ship_order => Post "/order/{order_id}/ship" impl MarketplaceDatabase where requires [Role::Seller, Role::Admin]);
pub async fn ship_order<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST ship order {order_id} by {}", identity.user_id);
    let order = api.mark_shipped(&order_id, &identity.user_id, identity.role).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(&order)))
}

route!(deliver_order => Post "/order/{order_id}/deliver" impl MarketplaceDatabase where requires [Role::Seller, Role::Admin]);
pub async fn deliver_order<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST deliver order {order_id} by {}", identity.user_id);
    let order = api.mark_delivered(&order_id, &identity.user_id, identity.role).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(&order)))
}

route!(gateway_result => Post "/order/{order_id}/gateway-result" impl MarketplaceDatabase where requires [Role::Gateway]);
/// The card payment gateway reports the outcome of a transaction. Success confirms the order; failure cancels it.
pub async fn gateway_result<B: MarketplaceDatabase>(
    path: web::Path<OrderId>,
    body: web::Json<GatewayReport>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    let report = body.into_inner();
    info!("💻️ Gateway reported {} for order {order_id}", if report.succeeded { "success" } else { "failure" });
    let order = api.apply_gateway_report(&order_id, report).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(&order)))
}

//----------------------------------------------   Payments  ----------------------------------------------------
route!(submit_payment_proof => Post "/order/{order_id}/payment-proof" impl MarketplaceDatabase where requires [Role::Buyer]);
pub async fn submit_payment_proof<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    body: web::Json<PaymentProofRequest>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST payment proof for {order_id} from {}", identity.user_id);
    let PaymentProofRequest { proof_ref, destination } = body.into_inner();
    let payment = api.submit_proof(&order_id, &identity.user_id, &proof_ref, destination).await?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(update_payment_proof => Put "/order/{order_id}/payment-proof" impl MarketplaceDatabase where requires [Role::Buyer]);
pub async fn update_payment_proof<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    body: web::Json<PaymentProofRequest>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ PUT payment proof for {order_id} from {}", identity.user_id);
    let PaymentProofRequest { proof_ref, destination } = body.into_inner();
    let payment = api.update_proof(&order_id, &identity.user_id, &proof_ref, destination).await?;
    Ok(HttpResponse::Ok().json(payment))
}

route!(confirm_payment => Post "/order/{order_id}/confirm-payment" impl MarketplaceDatabase where requires [Role::Seller]);
pub async fn confirm_payment<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST confirm payment for {order_id} by {}", identity.user_id);
    let order = api.confirm(&order_id, &identity.user_id).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(&order)))
}

route!(reject_payment => Post "/order/{order_id}/reject-payment" impl MarketplaceDatabase where requires [Role::Seller]);
pub async fn reject_payment<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<OrderId>,
    api: web::Data<PaymentApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ POST reject payment for {order_id} by {}", identity.user_id);
    let order = api.reject(&order_id, &identity.user_id).await?;
    Ok(HttpResponse::Ok().json(OrderStatusResponse::from(&order)))
}

//----------------------------------------------   Complaints  ----------------------------------------------------
route!(file_complaint => Post "/complaint" impl MarketplaceDatabase where requires [Role::Buyer]);
pub async fn file_complaint<B: MarketplaceDatabase>(
    identity: Identity,
    body: web::Json<ComplaintRequest>,
    api: web::Data<ComplaintApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let ComplaintRequest { order_id, product_id, complaint_type, description } = body.into_inner();
    debug!("💻️ POST complaint on {order_id} from {}", identity.user_id);
    let complaint = NewComplaint { user_id: identity.user_id, order_id, product_id, complaint_type, description };
    let complaint = api.file(complaint).await?;
    Ok(HttpResponse::Created().json(complaint))
}

route!(complaint_by_id => Get "/complaint/{id}" impl OrderManagement);
/// The complainant and admins may view a complaint.
pub async fn complaint_by_id<B: OrderManagement>(
    identity: Identity,
    path: web::Path<i64>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    trace!("💻️ GET complaint #{id} for {}", identity.user_id);
    let complaint = api
        .fetch_complaint(id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Complaint #{id} does not exist")))?;
    if !identity.is_admin() && complaint.user_id != identity.user_id {
        return Err(ServerError::InsufficientPermissions(format!("You may not view complaint #{id}")));
    }
    Ok(HttpResponse::Ok().json(complaint))
}

route!(review_complaint => Post "/complaint/{id}/review" impl MarketplaceDatabase where requires [Role::Admin]);
pub async fn review_complaint<B: MarketplaceDatabase>(
    path: web::Path<i64>,
    api: web::Data<ComplaintApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST review complaint #{id}");
    let complaint = api.review(id).await?;
    Ok(HttpResponse::Ok().json(complaint))
}

route!(resolve_complaint => Post "/complaint/{id}/resolve" impl MarketplaceDatabase where requires [Role::Admin]);
/// Resolves a complaint. If the body names a `restock`, those units go back on sale in the same step.
pub async fn resolve_complaint<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    body: web::Json<ResolveComplaintRequest>,
    api: web::Data<ComplaintApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST resolve complaint #{id} by {}", identity.user_id);
    let ResolveComplaintRequest { resolution, restock } = body.into_inner();
    let complaint = api.resolve(id, &resolution, &identity.user_id, restock).await?;
    Ok(HttpResponse::Ok().json(complaint))
}

route!(reject_complaint => Post "/complaint/{id}/reject" impl MarketplaceDatabase where requires [Role::Admin]);
pub async fn reject_complaint<B: MarketplaceDatabase>(
    identity: Identity,
    path: web::Path<i64>,
    body: web::Json<RejectComplaintRequest>,
    api: web::Data<ComplaintApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let id = path.into_inner();
    debug!("💻️ POST reject complaint #{id} by {}", identity.user_id);
    let complaint = api.reject(id, &body.resolution, &identity.user_id).await?;
    Ok(HttpResponse::Ok().json(complaint))
}
