//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be saved, loaded from disk,
//! validated, and turned into a working agent.

mod common;

use std::fs;
use std::sync::Arc;

use sdk::AgentError;
use taskloop_engine::costs::ModelPricing;
use taskloop_engine::llm::{ModelAdapter, TokenUsage};
use taskloop_engine::{Agent, AgentRequest, Config};
use tempfile::TempDir;

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.agent.max_steps = 4;
    config.agent.temperature = Some(0.2);
    config.pricing = config
        .pricing
        .with_model("scripted-model", ModelPricing::new(1.0, 2.0));
    config.save_to_path(&path).unwrap();

    let loaded = Config::load_from_path(&path).unwrap();
    assert_eq!(loaded.agent.max_steps, 4);
    assert_eq!(loaded.agent.temperature, Some(0.2));
    assert_eq!(
        loaded.pricing.pricing_for("scripted-model"),
        &ModelPricing::new(1.0, 2.0)
    );
    assert_eq!(loaded.telemetry.max_attempts, 3);
}

#[test]
fn test_config_toml_parsing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[core]
log_level = "DEBUG"

[agent]
max_steps = 6
max_tokens = 2048
instructions = "You are a billing assistant."

[pricing.default]
input_cost_per_million_tokens = 1.0
output_cost_per_million_tokens = 4.0

[pricing.models."my-model"]
input_cost_per_million_tokens = 0.5
output_cost_per_million_tokens = 1.5

[telemetry]
endpoint = "https://logs.example.com/events"
api_key = "abc"
max_attempts = 5
"#,
    )
    .unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.agent.max_steps, 6);
    assert_eq!(config.agent.max_tokens, Some(2048));
    assert_eq!(config.agent.instructions, "You are a billing assistant.");
    assert_eq!(config.pricing.default, ModelPricing::new(1.0, 4.0));
    // Prefix match on a versioned id
    assert_eq!(
        config.pricing.pricing_for("my-model-2024-06"),
        &ModelPricing::new(0.5, 1.5)
    );
    assert_eq!(
        config.telemetry.endpoint.as_deref(),
        Some("https://logs.example.com/events")
    );
    assert_eq!(config.telemetry.max_attempts, 5);
    assert_eq!(config.telemetry.queue_capacity, 256);
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        "[core]\nlog_level = \"loud\"",
        "[agent]\nmax_steps = 0",
        "[agent]\ntemperature = 3.5",
        "[telemetry]\nendpoint = \"ftp://logs.example.com\"",
        "[telemetry]\nmax_attempts = 0",
        "[pricing.default]\ninput_cost_per_million_tokens = -1.0\noutput_cost_per_million_tokens = 1.0",
    ];
    for case in cases {
        let err = Config::from_toml_str(case).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)), "{}: {}", case, err);
    }
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, AgentError::Config(_)));
}

#[tokio::test]
async fn test_agent_from_config_uses_settings() {
    let config = Config::from_toml_str(
        r#"
[agent]
max_steps = 2

[pricing.models."scripted-model"]
input_cost_per_million_tokens = 100.0
output_cost_per_million_tokens = 0.0
"#,
    )
    .unwrap();

    let model = common::ScriptedModel::repeating(common::decide(&[(
        "sum",
        serde_json::json!({"a": 1, "b": 1}),
    )]));
    let agent = Agent::from_config(
        Arc::clone(&model) as Arc<dyn ModelAdapter>,
        common::calculator_actions(),
        &config,
    )
    .unwrap();
    assert_eq!(agent.max_steps(), 2);

    let response = agent.run(AgentRequest::new("1 + 1, twice")).await.unwrap();
    assert!(response.truncated);
    assert_eq!(response.steps, 2);

    // 1000 input tokens at $100/M, twice: 20 cents
    let per_call = config
        .pricing
        .cost_cents("scripted-model", common::CALL_USAGE);
    assert!((per_call - 10.0).abs() < 1e-9);
    assert!((response.total_cost_cents - 20.0).abs() < 1e-9);
    assert_eq!(
        response.total_prompt_tokens,
        2 * TokenUsage::new(1_000, 500).input_tokens
    );
}
