use ff_ai::{
    AiConfig, AiError, AiService, CredentialStore, FileSelectionStore, MemoryKeyStore,
    SelectionStore,
};
use ff_protocol::{CodeType, GenerationRequest, ProviderId, SelectionState};
use mockito::Matcher;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

type Service = AiService<MemoryKeyStore, FileSelectionStore>;

struct Harness {
    service: Service,
    _dir: TempDir,
    settings: std::path::PathBuf,
}

/// Service pointed at the mock server for every provider, with settings in a temp dir
fn harness(server_url: &str, keys: &[(ProviderId, &str)]) -> anyhow::Result<Harness> {
    let dir = tempfile::tempdir()?;
    let config = AiConfig {
        data_dir: dir.path().to_path_buf(),
        ..AiConfig::default()
    }
    .with_base_url(ProviderId::OpenAI, &format!("{server_url}/v1"))?
    .with_base_url(ProviderId::Anthropic, &format!("{server_url}/v1"))?
    .with_base_url(ProviderId::Google, &format!("{server_url}/v1beta/openai"))?;

    let settings = config.settings_path();
    let credentials = CredentialStore::load_with_env(
        MemoryKeyStore::with_keys(keys.iter().copied()),
        false,
        |_| None,
    );
    let service = AiService::new(config, credentials, FileSelectionStore::new(&settings))?;
    Ok(Harness {
        service,
        _dir: dir,
        settings,
    })
}

fn greeting_request() -> GenerationRequest {
    GenerationRequest::new(CodeType::Component, "React", "Render a friendly greeting")
}

fn openai_body(content: &str) -> String {
    json!({
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    })
    .to_string()
}

#[tokio::test]
async fn openai_generation_strips_code_fences() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_header("authorization", "Bearer test-openai-key")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({"model": "gpt-4-turbo"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(openai_body(
            "```tsx\nconst ExampleComponent = () => <div>Hello</div>\n```",
        ))
        .create_async()
        .await;

    let h = harness(&server.url(), &[])?;
    h.service.set_api_key(ProviderId::OpenAI, "test-openai-key")?;
    h.service.set_model("gpt-4-turbo")?;

    let code = h.service.generate_code(&greeting_request()).await?;

    assert!(code.contains("const ExampleComponent"));
    assert!(!code.contains("```"));
    mock.assert_async().await;

    let stats = h.service.usage_stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.total_tokens, 30);
    assert!(stats.last_request_at.is_some());
    Ok(())
}

#[tokio::test]
async fn selection_is_persisted_under_flat_keys() -> anyhow::Result<()> {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url(), &[(ProviderId::OpenAI, "test-openai-key")])?;

    h.service.set_model("gpt-4-turbo")?;

    let doc: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&h.settings)?)?;
    assert_eq!(doc["ff_selected_ai_model"], json!("gpt-4-turbo"));
    assert_eq!(doc["ff_selected_ai_provider"], json!("openai"));
    Ok(())
}

#[tokio::test]
async fn selection_survives_restart() -> anyhow::Result<()> {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url(), &[(ProviderId::Anthropic, "sk-ant")])?;
    h.service.set_model("claude-3-5-haiku-20241022")?;

    let credentials = CredentialStore::load_with_env(MemoryKeyStore::default(), false, |_| None);
    let restarted = AiService::new(
        h.service.config().clone(),
        credentials,
        FileSelectionStore::new(&h.settings),
    )?;

    assert_eq!(
        restarted.selection(),
        Some(SelectionState {
            model_id: "claude-3-5-haiku-20241022".to_string(),
            provider: ProviderId::Anthropic,
        })
    );
    Ok(())
}

#[tokio::test]
async fn unconfigured_provider_cannot_be_selected() -> anyhow::Result<()> {
    let server = mockito::Server::new_async().await;
    let h = harness(
        &server.url(),
        &[(ProviderId::OpenAI, "o"), (ProviderId::Anthropic, "a")],
    )?;

    let err = h.service.set_model("gemini-1.5-pro").err();
    assert_eq!(
        err.map(|e| e.to_string()).as_deref(),
        Some("API key not configured for google")
    );
    assert!(h.service.selection().is_none());
    assert!(!h.settings.exists());
    Ok(())
}

#[tokio::test]
async fn generation_before_selection_fails() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    let result = h.service.generate_code(&greeting_request()).await;

    assert!(matches!(result, Err(AiError::NoModelSelected)));
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn upstream_error_is_sanitized() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"error": {
                "message": "Incorrect API key provided: sk-abcdefghijklmnopqrstuvwxyz123456",
                "type": "invalid_request_error"
            }})
            .to_string(),
        )
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "sk-abcdefghijklmnopqrstuvwxyz123456")])?;
    h.service.set_model("gpt-4o")?;

    match h.service.generate_code(&greeting_request()).await {
        Err(AiError::Upstream { status, message }) => {
            assert_eq!(status, Some(401));
            assert!(message.contains("invalid_request_error"));
            assert!(!message.contains("abcdefghijklmnop"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
    assert_eq!(h.service.usage_stats().requests, 0);
    Ok(())
}

#[tokio::test]
async fn non_json_error_uses_status_reason() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(503)
        .with_body("<html>down</html>")
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o-mini")?;

    let err = h.service.generate_code(&greeting_request()).await.err();
    assert_eq!(
        err.map(|e| e.to_string()).as_deref(),
        Some("upstream error (503): Service Unavailable")
    );
    Ok(())
}

#[tokio::test]
async fn malformed_success_body_is_upstream_error() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(json!({"choices": []}).to_string())
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o")?;

    let result = h.service.generate_code(&greeting_request()).await;
    assert!(matches!(result, Err(AiError::Upstream { status: None, .. })));
    Ok(())
}

#[tokio::test]
async fn anthropic_uses_messages_api() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "sk-ant-test")
        .match_header("anthropic-version", "2023-06-01")
        .match_header("authorization", Matcher::Missing)
        .match_body(Matcher::PartialJson(json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": 8192
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "content": [{"type": "text", "text": "```ts\nexport const add = (a: number, b: number) => a + b;\n```"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 12, "output_tokens": 8}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::Anthropic, "sk-ant-test")])?;
    h.service.set_model("claude-3-5-sonnet-20241022")?;

    let request = GenerationRequest::new(CodeType::Utility, "Node", "Add two numbers");
    let code = h.service.generate_code(&request).await?;

    assert_eq!(code, "export const add = (a: number, b: number) => a + b;");
    assert_eq!(h.service.usage_stats().total_tokens, 20);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn google_uses_openai_compatible_endpoint() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1beta/openai/chat/completions")
        .match_header("authorization", "Bearer g-key")
        .match_body(Matcher::PartialJson(json!({"model": "gemini-1.5-pro"})))
        .with_status(200)
        .with_body(openai_body("def greet():\n    return 'hi'"))
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::Google, "g-key")])?;
    h.service.set_model("gemini-1.5-pro")?;

    let request = GenerationRequest::new(CodeType::Utility, "Flask", "Greet").with_language("python");
    let code = h.service.generate_code(&request).await?;

    assert_eq!(code, "def greet():\n    return 'hi'");
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn removed_credential_fails_lazily() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o")?;
    h.service.remove_api_key(ProviderId::OpenAI)?;

    // Selection is kept; the missing key surfaces on the next generation
    assert_eq!(h.service.current_model().map(|m| m.id), Some("gpt-4o"));
    let result = h.service.generate_code(&greeting_request()).await;
    assert!(matches!(
        result,
        Err(AiError::ProviderNotConfigured {
            provider: ProviderId::OpenAI
        })
    ));
    assert!(h.service.list_available_models().is_empty());

    let persisted = FileSelectionStore::new(&h.settings).load()?;
    assert_eq!(persisted.map(|s| s.model_id), Some("gpt-4o".to_string()));
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_are_independent() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_body("export default function A() {}"))
        .expect(2)
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o")?;

    let request = greeting_request();
    let (a, b) = tokio::join!(
        h.service.generate_code(&request),
        h.service.generate_code(&request)
    );
    assert_eq!(a?, b?);
    assert_eq!(h.service.usage_stats().requests, 2);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn documentation_keeps_inner_code_blocks() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let docs = "# Greeting\n\nRenders a greeting.\n\n```tsx\n<Greeting />\n```";
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_body(docs))
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o")?;

    let out = h
        .service
        .generate_documentation("export const Greeting = () => <p>Hi</p>;", CodeType::Component)
        .await?;
    assert_eq!(out, docs);
    Ok(())
}

#[tokio::test]
async fn full_app_reply_comes_back_as_one_unfenced_file_set() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let reply = "```tsx\n// src/App.tsx\nexport default function App() { return <Todos />; }\n\n// src/Todos.tsx\nexport function Todos() { return <ul />; }\n```";
    let mock = server
        .mock("POST", "/v1/chat/completions")
        .match_body(Matcher::Regex("one code block".to_string()))
        .with_status(200)
        .with_body(openai_body(reply))
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o")?;

    let request = GenerationRequest::new(CodeType::FullApp, "Next.js", "A todo app");
    let code = h.service.generate_code(&request).await?;

    assert!(code.starts_with("// src/App.tsx"));
    assert!(code.contains("// src/Todos.tsx"));
    assert!(!code.contains("```"));
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn documentation_with_leading_and_trailing_blocks_is_untouched() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let docs = "```bash\nnpm i greeting\n```\n\nUsage below.\n\n```tsx\n<Greeting />\n```";
    let _mock = server
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_body(openai_body(docs))
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::OpenAI, "o")])?;
    h.service.set_model("gpt-4o")?;

    let out = h
        .service
        .generate_documentation("export const Greeting = () => <p>Hi</p>;", CodeType::Component)
        .await?;
    assert_eq!(out, docs);
    Ok(())
}

#[tokio::test]
async fn oversized_usage_counts_do_not_overflow() -> anyhow::Result<()> {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(
            json!({
                "content": [{"type": "text", "text": "export {};"}],
                "usage": {"input_tokens": u64::MAX, "output_tokens": 7}
            })
            .to_string(),
        )
        .expect(2)
        .create_async()
        .await;

    let h = harness(&server.url(), &[(ProviderId::Anthropic, "sk-ant-test")])?;
    h.service.set_model("claude-3-5-haiku-20241022")?;

    let request = GenerationRequest::new(CodeType::Utility, "Node", "Export nothing");
    h.service.generate_code(&request).await?;
    h.service.generate_code(&request).await?;

    let stats = h.service.usage_stats();
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.total_tokens, u64::MAX);
    assert_eq!(stats.completion_tokens, 14);
    Ok(())
}
