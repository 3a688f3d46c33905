//! Admin surface: user provisioning and balance management. Every endpoint
//! requires an authenticated user with the `admin` role.

use actix_web::{delete, get, post, put, web, HttpResponse};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use engine::{CreateUserRequest, EngineError};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;

// POST /admin/users - create a user; the API secret is returned only here
#[post("/users")]
pub async fn create_user(
    state: web::Data<AppState>,
    _admin: AdminUser,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let users = state.users.clone();
    let request = body.into_inner();
    let (user, api_secret) = web::block(move || users.create_user(request)).await??;
    Ok(HttpResponse::Created().json(json!({
        "id": user.id,
        "email": user.email,
        "api_key": user.api_key,
        "api_secret": api_secret,
        "status": user.status,
        "created_at": user.created_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
}

// GET /admin/users?page&limit&search&status
#[get("/users")]
pub async fn list_users(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<ListUsersQuery>,
) -> Result<HttpResponse, ApiError> {
    let users = state.users.clone();
    let query = query.into_inner();
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(50);
    let (rows, total) = web::block(move || {
        users.list_users(page, limit, query.search.as_deref(), query.status.as_deref())
    })
    .await??;
    Ok(HttpResponse::Ok().json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

// GET /admin/users/{id}
#[get("/users/{id}")]
pub async fn get_user(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let users = state.users.clone();
    let user_id = path.into_inner();
    let user = web::block(move || users.get_user(user_id)).await??;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub status: Option<String>,
    #[serde(default)]
    pub regenerate_api_key: bool,
}

// PUT /admin/users/{id} - status update (the soft delete) and/or credential rotation
#[put("/users/{id}")]
pub async fn update_user(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let users = state.users.clone();
    let user_id = path.into_inner();
    let request = body.into_inner();

    let response = web::block(move || -> Result<serde_json::Value, EngineError> {
        if let Some(status) = request.status.as_deref() {
            users.update_status(user_id, status)?;
        }
        if request.regenerate_api_key {
            let (user, api_secret) = users.regenerate_credentials(user_id)?;
            return Ok(json!({
                "id": user.id,
                "email": user.email,
                "api_key": user.api_key,
                "api_secret": api_secret,
                "status": user.status,
                "updated_at": user.updated_at,
            }));
        }
        let user = users.get_user(user_id)?;
        Ok(serde_json::to_value(user).unwrap_or_default())
    })
    .await??;

    Ok(HttpResponse::Ok().json(response))
}

// DELETE /admin/users/{id} - the hard delete: cascades over everything the user owns
#[delete("/users/{id}")]
pub async fn delete_user(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let users = state.users.clone();
    let user_id = path.into_inner();
    web::block(move || users.delete_user(user_id)).await??;
    Ok(HttpResponse::Ok().json(json!({
        "message": "user and all related data deleted successfully",
    })))
}

// GET /admin/users/{id}/balances
#[get("/users/{id}/balances")]
pub async fn get_user_balances(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let ledger = state.ledger.clone();
    let user_id = path.into_inner();
    let rows = web::block(move || ledger.get_all_balances(user_id)).await??;
    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ListBalancesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// GET /admin/balances?page&limit
#[get("/balances")]
pub async fn list_balances(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<ListBalancesQuery>,
) -> Result<HttpResponse, ApiError> {
    let ledger = state.ledger.clone();
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).clamp(1, 1000);
    let (rows, total) = web::block(move || ledger.list_balances(page, limit)).await??;
    Ok(HttpResponse::Ok().json(json!({
        "data": rows,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub asset: String,
    pub amount: Decimal,
    /// "add" or "deduct", against the available partition.
    pub operation: String,
    /// Required audit note.
    pub note: String,
}

// POST /admin/users/{id}/balance/adjust
#[post("/users/{id}/balance/adjust")]
pub async fn adjust_balance(
    state: web::Data<AppState>,
    _admin: AdminUser,
    path: web::Path<i64>,
    body: web::Json<AdjustBalanceRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    if request.asset.is_empty() {
        return Err(EngineError::InvalidSymbol(request.asset).into());
    }
    if request.note.is_empty() {
        return Err(
            EngineError::InvalidAmount("note is required for audit".to_string()).into(),
        );
    }

    let user_id = path.into_inner();
    let ledger = state.ledger.clone();
    let asset = request.asset.clone();
    let operation = request.operation.clone();

    tracing::info!(
        user_id,
        asset = %request.asset,
        amount = %request.amount,
        operation = %request.operation,
        note = %request.note,
        "admin balance adjustment"
    );

    let balance = web::block(move || -> Result<database::Balance, EngineError> {
        match operation.as_str() {
            "add" => ledger.credit(user_id, &asset, request.amount)?,
            "deduct" => ledger.debit(user_id, &asset, request.amount)?,
            _ => {
                return Err(EngineError::InvalidAmount(
                    "operation must be 'add' or 'deduct'".to_string(),
                ))
            }
        }
        ledger.get_balance(user_id, &asset)
    })
    .await??;

    Ok(HttpResponse::Ok().json(balance))
}
