//! Request handler definitions
//!
//! Define each route and its handler here. Handlers must not block the worker thread: anything that touches the
//! database is an `async` call into the engine.
use actix_web::{get, web, HttpResponse, Responder};
use checkout_engine::{db_types::NewOrder, traits::CheckoutDatabase, CheckoutApi, PaymentReconciliationApi};
use log::*;
use serde_json::json;

use crate::errors::ServerError;

// Actix cannot register generic handlers with the attribute macros, so generic routes are declared with `route!`.
// `route!(name => Method "/path" impl Trait, ...)` creates a `NameRoute<T...>` service factory that is registered
// with `.service(NameRoute::<Backend>::new())`.
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
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//-------------------------------------------   Payment notifications  ---------------------------------------------
route!(payment_notification => Post "/notifications/payment" impl CheckoutDatabase);
/// Webhook for the payment gateway.
///
/// The body is read as text so that it can be stored verbatim in the notification ledger. Any handled outcome,
/// including a duplicate delivery, is acknowledged with `200 OK` so that the gateway stops retrying. A bad signature is
/// rejected with `403`, a malformed payload with `400`. Storage failures return `500`, and the gateway will retry.
pub async fn payment_notification<B: CheckoutDatabase>(
    body: String,
    api: web::Data<PaymentReconciliationApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ Received payment notification ({} bytes)", body.len());
    let outcome = api.process_raw_notification(&body).await.map_err(|e| {
        info!("💻️ Payment notification was rejected. {e}");
        ServerError::from(e)
    })?;
    let description = outcome.describe();
    debug!("💻️ Payment notification handled: {description}");
    Ok(HttpResponse::Ok().json(json!({ "status": "ok", "outcome": description })))
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl CheckoutDatabase);
/// Places an order in `PENDING` and holds stock for every line item.
///
/// If any item cannot be reserved the whole order is cancelled, the holds already taken are given back, and the
/// response is `409 Conflict`.
pub async fn checkout<B: CheckoutDatabase>(
    body: web::Json<NewOrder>,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order = body.into_inner();
    debug!("💻️ POST checkout for order {} with {} items", order.reference, order.items.len());
    let placed = api.place_order(order).await?;
    Ok(HttpResponse::Ok().json(placed))
}
