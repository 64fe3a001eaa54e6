pub mod health;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use tower_http::services::ServeDir;

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let artifact_prefix = state.config.artifact_url_prefix();
    let artifact_files = ServeDir::new(state.artifacts.output_dir());

    Router::new()
        .route("/health", get(health::health_handler))
        // Exam generation
        .route("/api/save-form-data", post(handlers::handle_generate_exam))
        .route("/api/v1/exams", post(handlers::handle_generate_exam))
        .route("/api/save-latex", post(handlers::handle_save_latex))
        // Generated artifacts
        .nest_service(&artifact_prefix, artifact_files)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::artifacts::{default_page_config, ArtifactStore};
    use crate::config::Config;
    use crate::errors::GENERIC_FAILURE_MESSAGE;
    use crate::llm_client::testing::{Scripted, ScriptedModel};

    const BOUNDARY: &str = "examgen-test-boundary";

    fn app(public_dir: &Path, model: Arc<ScriptedModel>) -> Router {
        let public = public_dir.to_string_lossy().into_owned();
        let config = Config::from_lookup(|key| match key {
            "PUBLIC_DIR" => Some(public.clone()),
            "OPENAI_API_KEY" => Some("sk-server".to_string()),
            _ => None,
        })
        .unwrap();
        let store = ArtifactStore::new(
            config.artifact_dir(),
            config.artifact_url_prefix(),
            default_page_config(),
        );
        build_router(AppState::new(config, model, store))
    }

    fn multipart(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: text/plain\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/save-form-data")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = tempfile::tempdir().unwrap();
        let response = app(tmp.path(), Arc::new(ScriptedModel::default()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_generate_exam_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::replying(&[
            "1. What is chlorophyll?",
            "```latex\n\\documentclass{article}\n\\begin{document}\nWhat is chlorophyll?\n\\end{document}\n```",
        ]));
        let router = app(tmp.path(), model.clone());

        let response = router
            .clone()
            .oneshot(multipart(
                &[
                    ("model", "gpt-4o"),
                    ("prompt", "Explain photosynthesis"),
                    ("difficulty", "5"),
                    ("unexpected", "ignored"),
                ],
                Some(("notes.txt", &b"Thylakoid membranes"[..])),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["content"], "1. What is chlorophyll?");
        assert!(body["latex"].as_str().unwrap().starts_with("\\documentclass"));
        assert!(body["pdfData"]
            .as_str()
            .unwrap()
            .starts_with("data:application/pdf;base64,"));
        assert_eq!(body["placeholder"], false);

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].credential, "sk-server");
        assert!(calls[0].prompt.contains("Thylakoid membranes"));

        // The returned locator is served from the public artifact directory.
        let file_path = body["filePath"].as_str().unwrap().to_string();
        assert!(file_path.starts_with("/generatedTests/"));
        let served = router
            .oneshot(Request::get(file_path.as_str()).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(served.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(served.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("What is chlorophyll?"));
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_without_model_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::replying(&["unused", "unused"]));
        let response = app(tmp.path(), model.clone())
            .oneshot(multipart(&[("model", "gpt-4o"), ("prompt", "")], None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["message"], "prompt is required");
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_model_and_difficulty_rejected_without_model_calls() {
        let tmp = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::default());
        let router = app(tmp.path(), model.clone());

        let bad_model = router
            .clone()
            .oneshot(multipart(&[("model", "claude-x"), ("prompt", "Explain photosynthesis")], None))
            .await
            .unwrap();
        assert_eq!(bad_model.status(), StatusCode::BAD_REQUEST);

        let bad_difficulty = router
            .oneshot(multipart(
                &[("model", "gpt-4"), ("prompt", "Explain photosynthesis"), ("difficulty", "11")],
                None,
            ))
            .await
            .unwrap();
        assert_eq!(bad_difficulty.status(), StatusCode::BAD_REQUEST);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_upstream_failure_returns_generic_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::new(vec![Scripted::Fail(
            401,
            "Incorrect API key provided: sk-client".to_string(),
        )]));
        let response = app(tmp.path(), model.clone())
            .oneshot(multipart(
                &[("apiKey", "sk-client"), ("model", "gpt-4o"), ("prompt", "Explain photosynthesis")],
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({ "message": GENERIC_FAILURE_MESSAGE }));
        // Formatting stage never ran.
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_non_multipart_body_gets_json_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let model = Arc::new(ScriptedModel::default());
        let response = app(tmp.path(), model.clone())
            .oneshot(
                Request::post("/api/save-form-data")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"prompt":"Explain photosynthesis"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = json_body(response).await;
        assert!(!body["message"].as_str().unwrap().is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn test_save_latex_bad_body_gets_json_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let router = app(tmp.path(), Arc::new(ScriptedModel::default()));

        let missing_name = router
            .clone()
            .oneshot(
                Request::post("/api/save-latex")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "content": "\\section{A}" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing_name.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(missing_name).await["message"]
            .as_str()
            .unwrap()
            .contains("fileName"));

        let wrong_type = router
            .oneshot(
                Request::post("/api/save-latex")
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("\\section{A}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong_type.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(wrong_type).await.get("message").is_some());
    }

    #[tokio::test]
    async fn test_save_latex() {
        let tmp = tempfile::tempdir().unwrap();
        let router = app(tmp.path(), Arc::new(ScriptedModel::default()));

        let save = |file_name: &str| {
            Request::post("/api/save-latex")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "content": "\\section{A}", "fileName": file_name }).to_string(),
                ))
                .unwrap()
        };

        let ok = router.clone().oneshot(save("practice_exam.tex")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(
            json_body(ok).await["filePath"],
            "/generatedTests/practice_exam.tex"
        );
        let saved = tmp.path().join("generatedTests").join("practice_exam.tex");
        assert_eq!(std::fs::read_to_string(saved).unwrap(), "\\section{A}");

        let traversal = router.oneshot(save("../escape.tex")).await.unwrap();
        assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);
        assert!(!tmp.path().join("escape.tex").exists());
    }
}
