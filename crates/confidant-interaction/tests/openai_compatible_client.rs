use confidant_core::completion::{CompletionRequest, CompletionService, PromptMessage, Usage};
use confidant_interaction::OpenAiCompatibleClient;
use serde_json::json;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_partial_json, header, method, path},
};

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![PromptMessage::system("persona"), PromptMessage::user("hi")],
        temperature: 0.5,
        top_p: 0.9,
        max_tokens: 64,
    }
}

fn client(server: &MockServer, api_key: Option<&str>) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(
        api_key.map(str::to_string),
        &format!("{}/v1", server.uri()),
        "test-model",
    )
    .unwrap()
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "max_tokens": 64,
            "top_p": 0.9,
            "messages": [
                {"role": "system", "content": "persona"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "served-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = client(&server, Some("secret")).complete(request()).await.unwrap();

    assert_eq!(completion.text, "hello");
    assert_eq!(completion.model.as_deref(), Some("served-model"));
    assert_eq!(
        completion.usage,
        Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12
        })
    );
}

#[tokio::test]
async fn test_http_error_carries_status_and_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "slow down"}})),
        )
        .mount(&server)
        .await;

    let err = client(&server, Some("secret")).complete(request()).await.unwrap_err();

    assert_eq!(
        err,
        confidant_core::ConfidantError::completion(Some(429), "slow down")
    );
}

#[tokio::test]
async fn test_malformed_body_is_a_completion_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server, Some("secret")).complete(request()).await.unwrap_err();
    assert!(err.is_completion());
}

#[tokio::test]
async fn test_missing_api_key_fails_without_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server, None).complete(request()).await.unwrap_err();
    assert!(err.is_completion());
    assert!(err.to_string().contains("SILICONFLOW_API_KEY"));
}
