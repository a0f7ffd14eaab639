//! HTTP surface: the upload form and the analysis endpoint.

use crate::app::render;
use crate::core::engine::AnalysisEngine;
use crate::domain::model::AnswerSet;
use crate::domain::ports::Pipeline;
use crate::utils::error::{ErrorCategory, EtlError, Result};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::error::Error as _;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub const QUESTIONS_FIELD: &str = "questions.txt";

pub type SharedEngine<P> = Arc<AnalysisEngine<P>>;

/// Build the axum Router for the upload form and the analysis endpoint.
pub fn router<P: Pipeline + 'static>(engine: SharedEngine<P>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/", post(analyze::<P>))
        .route("/api", post(analyze::<P>))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve<P: Pipeline + 'static>(addr: &str, engine: AnalysisEngine<P>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(Arc::new(engine))).await?;
    Ok(())
}

/// First line mentioning "http", trimmed.
pub fn extract_source_url(questions: &str) -> Option<String> {
    questions
        .trim()
        .lines()
        .find(|line| line.contains("http"))
        .map(|line| line.trim().to_string())
}

async fn index() -> Html<&'static str> {
    Html(render::UPLOAD_FORM)
}

async fn analyze<P: Pipeline + 'static>(
    State(engine): State<SharedEngine<P>>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    let wants_json = render::is_curl_like(user_agent);

    match answer_upload(&engine, multipart).await {
        Ok(answers) if wants_json => Json(answers.to_json_array()).into_response(),
        Ok(answers) => Html(render::render_html(&answers)).into_response(),
        Err(err) => {
            log_failure(&err);
            err.into_response()
        }
    }
}

async fn answer_upload<P: Pipeline>(
    engine: &AnalysisEngine<P>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<AnswerSet> {
    let multipart = multipart.map_err(|rejection| {
        tracing::debug!(%rejection, "request body is not a multipart upload");
        EtlError::MissingUploadError
    })?;

    let questions = read_questions(multipart).await?;
    let url = extract_source_url(&questions).ok_or(EtlError::MissingUrlError)?;

    engine.run(&url).await
}

/// Contents of the uploaded `questions.txt` file part.
async fn read_questions(mut multipart: Multipart) -> Result<String> {
    while let Some(field) = multipart.next_field().await? {
        let is_questions_file = field.name() == Some(QUESTIONS_FIELD)
            && field.file_name().is_some_and(|name| !name.is_empty());
        if !is_questions_file {
            continue;
        }

        let bytes = field.bytes().await?;
        tracing::debug!(bytes = bytes.len(), "questions file received");
        return Ok(String::from_utf8(bytes.to_vec())?);
    }

    Err(EtlError::MissingUploadError)
}

fn log_failure(err: &EtlError) {
    if err.category() == ErrorCategory::Input {
        tracing::warn!(error = %err, "rejected upload");
        return;
    }

    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }

    tracing::error!(
        category = ?err.category(),
        severity = ?err.severity(),
        suggestion = err.recovery_suggestion(),
        "analysis failed: {}",
        chain
    );
}

impl IntoResponse for EtlError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match self.category() {
            ErrorCategory::Input | ErrorCategory::DataShape => {
                (status, self.to_string()).into_response()
            }
            _ => (
                status,
                Json(serde_json::json!({ "error": self.to_string() })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_source_url_first_http_line() {
        let questions = "Scrape the list of highest grossing films from Wikipedia:\n\
                         https://en.wikipedia.org/wiki/List_of_highest-grossing_films  \n\
                         http://second.example\n\
                         1. How many $2 bn movies were released before 2000?";
        assert_eq!(
            extract_source_url(questions).as_deref(),
            Some("https://en.wikipedia.org/wiki/List_of_highest-grossing_films")
        );
    }

    #[test]
    fn test_extract_source_url_handles_crlf_and_missing() {
        assert_eq!(
            extract_source_url("q\r\n  http://a.test/x \r\n").as_deref(),
            Some("http://a.test/x")
        );
        assert_eq!(extract_source_url("no links here\nat all"), None);
        assert_eq!(extract_source_url(""), None);
    }

    #[tokio::test]
    async fn test_error_responses() {
        let resp = EtlError::MissingUploadError.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = EtlError::MissingColumnError {
            column: "Gross".to_string(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Gross column not found");

        let resp = EtlError::processing("bad table").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Data processing error: bad table");
    }
}
