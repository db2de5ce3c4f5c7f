use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
    response::IntoResponse,
};
use cogito_core::issues::Issue;
use cogito_sdk::objects::Page;
use cogito_sdk::objects::admin::{IssueView, ListIssuesQuery};

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `GET /issues` — ingest issues and projection rejections, newest event first.
pub async fn list_issues(
    state: State<AppState>,
    _auth: AdminAuth,
    query: Result<Query<ListIssuesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, AdminApiError> {
    let Query(query) = query?;
    let limits = *state.config.query.read().await;
    let recorded = state.issues.snapshot().await;
    let model = state.reader.snapshot();

    let mut issues: Vec<IssueView> = recorded
        .iter()
        .chain(model.projection.rejections())
        .filter(|issue| {
            query
                .category
                .is_none_or(|category| issue.reason.category() == category)
        })
        .map(Issue::to_view)
        .collect();
    issues.sort_by(|a, b| b.key.cmp(&a.key));

    let total_count = issues.len() as u64;
    let items = issues
        .into_iter()
        .skip(query.offset as usize)
        .take(limits.clamp(query.limit) as usize)
        .collect();

    Ok(Json(Page { items, total_count }))
}
