use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::Value;

use engine::symbol;
use engine::CreateOrderRequest;

use crate::auth::AuthedUser;
use crate::ccxt;
use crate::error::ApiError;
use crate::state::AppState;

// POST /order - place a market, limit, stop_loss or take_profit order
#[post("/order")]
pub async fn create_order(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut request = body.into_inner();
    // Accept the URL-safe wire form too.
    request.symbol = symbol::from_wire(&request.symbol);

    let orders = state.orders.clone();
    let user_id = user.0.id;
    let order = web::block(move || orders.place_order(user_id, request)).await??;
    Ok(HttpResponse::Ok().json(ccxt::order(&order)))
}

// GET /order/{id}
#[get("/order/{id}")]
pub async fn get_order(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let orders = state.orders.clone();
    let user_id = user.0.id;
    let order_id = path.into_inner();
    let order = web::block(move || orders.get_order(user_id, order_id)).await??;
    Ok(HttpResponse::Ok().json(ccxt::order(&order)))
}

// DELETE /order/{id} - cancel a resting order
#[delete("/order/{id}")]
pub async fn cancel_order(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let orders = state.orders.clone();
    let user_id = user.0.id;
    let order_id = path.into_inner();
    let order = web::block(move || orders.cancel_order(user_id, order_id)).await??;
    Ok(HttpResponse::Ok().json(ccxt::order(&order)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// GET /orders?page=1&limit=50 - order history, newest first
#[get("/orders")]
pub async fn get_orders(
    state: web::Data<AppState>,
    user: AuthedUser,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let orders = state.orders.clone();
    let user_id = user.0.id;
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50);
    let (rows, _total) = web::block(move || orders.list_user_orders(user_id, page, limit)).await??;
    let body: Vec<Value> = rows.iter().map(ccxt::order).collect();
    Ok(HttpResponse::Ok().json(body))
}

// GET /orders/open - orders still in `new`
#[get("/orders/open")]
pub async fn get_open_orders(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let orders = state.orders.clone();
    let user_id = user.0.id;
    let rows = web::block(move || orders.list_open_orders(user_id)).await??;
    let body: Vec<Value> = rows.iter().map(ccxt::order).collect();
    Ok(HttpResponse::Ok().json(body))
}
