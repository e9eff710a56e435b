//! Priority store administration
//!
//! `GET /admin/priorities` lists the ordering and `PUT /admin/priorities/{id}`
//! changes one entry. `POST /admin/priorities/reload` re-reads the file and
//! drops cached credential verdicts.
//! Changes apply to requests that start after the call returns.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::models::{EntryPatch, PriorityEntry};
use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};

pub async fn list(State(state): State<AppState>) -> Json<Vec<PriorityEntry>> {
    Json(state.store().entries().await)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    payload: Result<Json<EntryPatch>, JsonRejection>,
) -> AppResult<Json<PriorityEntry>> {
    let Json(update) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    if update.is_empty() {
        return Err(AppError::Validation(
            "body must set at least one of 'priority', 'enabled', 'model'".to_string(),
        ));
    }
    if update.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
        return Err(AppError::Validation("model cannot be empty".to_string()));
    }
    if state.config().provider(&id).is_none() {
        tracing::warn!(
            request_id = %request_id,
            provider_id = %id,
            "Updating a priority entry with no matching provider in config"
        );
    }

    let entry = state.store().apply(&id, &update).await?;
    tracing::info!(
        request_id = %request_id,
        provider_id = %entry.id,
        "Priority entry changed via admin API"
    );
    Ok(Json(entry))
}

pub async fn reload(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> AppResult<Json<Vec<PriorityEntry>>> {
    state.store().reload().await.map_err(|e| {
        tracing::error!(
            request_id = %request_id,
            error = %e,
            "Priority store reload failed, keeping previous ordering"
        );
        AppError::from(e)
    })?;
    // Re-check credentials on the next request too
    state.gate().invalidate();
    Ok(Json(state.store().entries().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::handlers::test_support;

    #[tokio::test]
    async fn test_update_applies_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(&dir).await;

        let body = EntryPatch {
            priority: Some(7),
            enabled: Some(false),
            model: Some("gemini-1.5-pro".to_string()),
        };
        let Json(entry) = update(
            State(state.clone()),
            Extension(RequestId::new()),
            Path("gemini".to_string()),
            Ok(Json(body)),
        )
        .await
        .unwrap();

        assert_eq!(entry.priority, 7);
        assert!(!entry.enabled);
        assert_eq!(entry.model, "gemini-1.5-pro");
        assert_eq!(state.store().ordered_enabled_provider_ids().await, vec!["groq"]);
    }

    #[tokio::test]
    async fn test_update_rejects_empty_body() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(&dir).await;

        let err = update(
            State(state),
            Extension(RequestId::new()),
            Path("groq".to_string()),
            Ok(Json(EntryPatch::default())),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_provider_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(&dir).await;

        let err = update(
            State(state),
            Extension(RequestId::new()),
            Path("mistral".to_string()),
            Ok(Json(EntryPatch {
                priority: Some(1),
                ..Default::default()
            })),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_failed_persist_keeps_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_support::state(&dir).await;
        let before = state.store().entries().await;

        let path = state.store().path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let err = update(
            State(state.clone()),
            Extension(RequestId::new()),
            Path("groq".to_string()),
            Ok(Json(EntryPatch {
                priority: Some(9),
                enabled: Some(false),
                model: Some("other-model".to_string()),
            })),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Store(StoreError::Write { .. })));
        assert_eq!(state.store().entries().await, before);
    }
}
