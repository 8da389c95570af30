use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::{
    db::now_timestamp,
    error::{
        validation::{non_empty, parse_id},
        AppError, AppResult, OptionExt,
    },
    state::AppState,
    types::{CreateUserRequest, MessageResponse, UpdateUserRequest, User},
};

fn validate_email(email: &str) -> AppResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError { field: "email".to_string(), message: format!("Invalid email: {}", email) })
    }
}

fn email_conflict(e: sqlx::Error) -> AppError {
    match AppError::from(e) {
        AppError::Conflict(_) => AppError::Conflict("Email already in use".to_string()),
        other => other,
    }
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<impl IntoResponse> {
    let name = non_empty(req.name)
        .ok_or_else(|| AppError::ValidationError { field: "name".to_string(), message: "Name is required".to_string() })?;
    let email = non_empty(req.email).ok_or_else(|| AppError::ValidationError {
        field: "email".to_string(),
        message: "Email is required".to_string(),
    })?;
    validate_email(&email)?;

    let user = sqlx::query_as::<_, User>(
        r#"INSERT INTO users (name, email, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?3)
           RETURNING *"#,
    )
    .bind(&name)
    .bind(&email)
    .bind(now_timestamp())
    .fetch_one(&state.db)
    .await
    .map_err(email_conflict)?;

    tracing::info!(user_id = user.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<User>>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id ASC").fetch_all(&state.db).await?;
    Ok(Json(users))
}

pub async fn get_user(State(state): State<AppState>, Path(raw_id): Path<String>) -> AppResult<Json<User>> {
    let id = parse_id(&raw_id, "user")?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_not_found("User")?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    let id = parse_id(&raw_id, "user")?;
    let name = non_empty(req.name);
    let email = non_empty(req.email);
    if let Some(email) = &email {
        validate_email(email)?;
    }

    let user = sqlx::query_as::<_, User>(
        r#"UPDATE users
           SET name = COALESCE(?1, name),
               email = COALESCE(?2, email),
               updated_at = ?3
           WHERE id = ?4
           RETURNING *"#,
    )
    .bind(&name)
    .bind(&email)
    .bind(now_timestamp())
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(email_conflict)?
    .ok_or_not_found("User")?;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let id = parse_id(&raw_id, "user")?;
    let result = sqlx::query("DELETE FROM users WHERE id = ?1").bind(id).execute(&state.db).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }
    state.metrics.inc_records_deleted();
    Ok(Json(MessageResponse::new("User deleted")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email("jane@localhost").is_ok());
        assert!(validate_email("jane").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jane@").is_err());
        assert!(validate_email("a@b@c").is_err());
    }
}
