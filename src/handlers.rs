use crate::charts::build_history;
use crate::errors::AppError;
use crate::gateway::HISTORY_LIMIT;
use crate::models::{
    score_label, HistoryResponse, InputsRequest, Metrics, NavigateRequest, PredictResponse,
    SessionView, SyncResponse,
};
use crate::session::NavAction;
use crate::state::AppState;
use crate::ui::{render_error, render_page};
use axum::{
    extract::State,
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use tracing::warn;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

struct SessionKey {
    id: Uuid,
    fresh: bool,
}

fn session_key(headers: &HeaderMap) -> SessionKey {
    let existing = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value).ok());

    match existing {
        Some(id) => SessionKey { id, fresh: false },
        None => SessionKey {
            id: Uuid::new_v4(),
            fresh: true,
        },
    }
}

fn with_cookie(key: &SessionKey, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if key.fresh {
        let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", key.id);
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(SET_COOKIE, value);
        }
    }
    response
}

pub async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = session_key(&headers);
    let view = current_view(&state, &key).await;
    with_cookie(&key, Html(render_page(&view)))
}

pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = session_key(&headers);
    let view = current_view(&state, &key).await;
    with_cookie(&key, Json(view))
}

pub async fn navigate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NavigateRequest>,
) -> Result<Response, AppError> {
    let key = session_key(&headers);
    let action: NavAction = payload.action.parse()?;
    let view = apply_navigation(&state, &key, action).await?;
    Ok(with_cookie(&key, Json(view)))
}

/// Form posts answer with a redirect home, or an HTML error page.
fn form_response<T>(key: &SessionKey, result: Result<T, AppError>) -> Response {
    match result {
        Ok(_) => with_cookie(key, Redirect::to("/")),
        Err(err) => with_cookie(key, (err.status, Html(render_error(err.status, &err.message)))),
    }
}

pub async fn start(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = session_key(&headers);
    form_response(&key, apply_navigation(&state, &key, NavAction::Start).await)
}

pub async fn back(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = session_key(&headers);
    form_response(&key, apply_navigation(&state, &key, NavAction::Back).await)
}

pub async fn update_inputs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<InputsRequest>,
) -> Result<Response, AppError> {
    let key = session_key(&headers);
    let connected = state.gateway.is_connected();
    let view = state
        .with_session(key.id, |session| {
            session.update_inputs(&payload)?;
            Ok::<_, AppError>(session.view(&state.model, connected))
        })
        .await?;
    Ok(with_cookie(&key, Json(view)))
}

pub async fn predict(
    State(state): State<AppState>,
    Json(metrics): Json<Metrics>,
) -> Result<Json<PredictResponse>, AppError> {
    metrics.validate()?;
    let predictor = state
        .model
        .predictor()
        .map_err(|err| AppError::unavailable(err.to_string()))?;
    let score = predictor.predict(&metrics);
    Ok(Json(PredictResponse {
        score,
        score_label: score_label(score),
    }))
}

pub async fn sync(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let key = session_key(&headers);
    let response = apply_sync(&state, &key).await?;
    Ok(with_cookie(&key, Json(response)))
}

pub async fn sync_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let key = session_key(&headers);
    form_response(&key, apply_sync(&state, &key).await)
}

pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    Json(build_history(state.gateway.recent(HISTORY_LIMIT).await))
}

async fn current_view(state: &AppState, key: &SessionKey) -> SessionView {
    let connected = state.gateway.is_connected();
    state
        .peek_session(key.id, |session| session.view(&state.model, connected))
        .await
}

async fn apply_navigation(
    state: &AppState,
    key: &SessionKey,
    action: NavAction,
) -> Result<SessionView, AppError> {
    let connected = state.gateway.is_connected();
    state
        .with_session(key.id, |session| {
            session.navigate(action, &state.model)?;
            Ok::<_, AppError>(session.view(&state.model, connected))
        })
        .await
}

async fn apply_sync(state: &AppState, key: &SessionKey) -> Result<SyncResponse, AppError> {
    let candidate = state
        .peek_session(key.id, |session| session.sync_candidate(&state.model))
        .await?;

    let record = state.gateway.save(candidate).await.map_err(|err| {
        warn!("sync failed: {err}");
        AppError::from(err)
    })?;

    Ok(SyncResponse {
        message: format!(
            "Synced {} ({}) to the cloud.",
            record.name,
            score_label(record.score)
        ),
        record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SyncGateway;
    use crate::predictor::{ModelStatus, ModelUnavailable};
    use axum::{body::to_bytes, http::StatusCode};
    use std::path::Path;

    fn state() -> AppState {
        let model = ModelStatus::load(
            &Path::new(env!("CARGO_MANIFEST_DIR")).join("models/alignment_model.json"),
        );
        AppState::new(model, SyncGateway::disconnected())
    }

    fn cookie_for(id: Uuid) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE}={id}")).unwrap(),
        );
        headers
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn cookieless_reads_do_not_create_sessions() {
        let state = state();
        for _ in 0..1000 {
            let response = get_session(State(state.clone()), HeaderMap::new()).await;
            assert!(response.headers().contains_key(SET_COOKIE));
        }
        index(State(state.clone()), HeaderMap::new()).await;
        assert_eq!(state.session_count().await, 0);

        let id = Uuid::new_v4();
        get_session(State(state.clone()), cookie_for(id)).await;
        assert_eq!(state.session_count().await, 0);

        let response = start(State(state.clone()), cookie_for(id)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(state.session_count().await, 1);
    }

    #[tokio::test]
    async fn form_errors_render_an_html_page() {
        let model = ModelStatus::Unavailable(ModelUnavailable {
            path: "models/missing.json".into(),
            reason: "No such file".into(),
        });
        let state = AppState::new(model, SyncGateway::disconnected());

        let response = start(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
        let page = body_text(response).await;
        assert!(page.contains("models/missing.json"));
        assert!(page.contains(r#"href="/""#));
    }

    #[tokio::test]
    async fn sync_form_without_name_explains_itself() {
        let state = state();
        let id = Uuid::new_v4();
        start(State(state.clone()), cookie_for(id)).await;

        let response = sync_form(State(state), cookie_for(id)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("<!DOCTYPE html>"));
    }

    #[test]
    fn reads_session_cookie_among_others() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}; other=1")).unwrap(),
        );
        let key = session_key(&headers);
        assert_eq!(key.id, id);
        assert!(!key.fresh);
    }

    #[test]
    fn malformed_cookie_starts_a_fresh_session() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("session_id=not-a-uuid"));
        let key = session_key(&headers);
        assert!(key.fresh);

        let response = with_cookie(&key, "ok");
        let cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={}", key.id)));
    }
}
