//! End-to-end integration tests for the PersonaX runtime.
//!
//! These tests exercise the full pipeline from caller messages to the final
//! answer: context composition, the tool-calling loop, the weather tool and
//! the persona registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use personax_core::error::{ProviderError, ResourceError};
use personax_core::message::Message;
use personax_core::provider::{Provider, ProviderRequest, ProviderTurn, Usage, WireRole, WireToolCall};
use personax_core::tool::ToolRegistry;
use personax_engine::{
    CompleteOptions, CompletionEngine, CompletionOutput, Core, PersonaId, PersonaRegistry, SystemPromptComposer,
};
use personax_tools::{GetWeather, WeatherInfo, WeatherService};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted turns in sequence.
struct ScriptedProvider {
    turns: std::sync::Mutex<Vec<ProviderTurn>>,
    requests: std::sync::Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<ProviderTurn>) -> Self {
        Self {
            turns: std::sync::Mutex::new(turns),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let turns = self.turns.lock().unwrap();
        if requests.len() >= turns.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                requests.len(),
                turns.len()
            );
        }
        let turn = turns[requests.len()].clone();
        requests.push(request);
        Ok(turn)
    }
}

fn text_turn(text: &str) -> ProviderTurn {
    ProviderTurn {
        id: "chatcmpl-e2e".into(),
        model: "mock".into(),
        content: Some(text.into()),
        finish_reason: Some("stop".into()),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        ..Default::default()
    }
}

fn weather_call(id: &str, adcode: &str) -> ProviderTurn {
    ProviderTurn {
        id: "chatcmpl-e2e".into(),
        model: "mock".into(),
        content: None,
        tool_calls: vec![WireToolCall {
            id: id.into(),
            name: "get_weather".into(),
            arguments: format!(r#"{{"adcode":"{adcode}"}}"#),
        }],
        finish_reason: Some("tool_calls".into()),
        ..Default::default()
    }
}

// ── Fake weather service ─────────────────────────────────────────────────

struct TableWeather {
    fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl WeatherService for TableWeather {
    async fn fetch(&self, adcode: &str) -> Result<WeatherInfo, ResourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match adcode {
            "110000" => Ok(WeatherInfo {
                address: "北京市 北京市".into(),
                condition: "Sunny".into(),
                temperature: "15".into(),
                humidity: "30".into(),
                windpower: "≤3".into(),
                ..Default::default()
            }),
            _ => Err(ResourceError::Rejected("INVALID_PARAMS".into())),
        }
    }
}

fn persona(provider: Arc<ScriptedProvider>, weather: Arc<TableWeather>) -> Core {
    let tools = ToolRegistry::new().with(GetWeather::new(weather).unwrap());
    Core::new(
        PersonaId::new("guide").unwrap(),
        CompletionEngine::new(provider),
        "mock",
    )
    .with_context(Arc::new(SystemPromptComposer::new("You are helpful")))
    .with_tools(tools)
}

// ── E2E: weather question ────────────────────────────────────────────────

#[tokio::test]
async fn e2e_weather_question_uses_the_tool() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        weather_call("c1", "110000"),
        text_turn("It's 15°C and sunny in Beijing."),
    ]));
    let weather = Arc::new(TableWeather {
        fetches: AtomicUsize::new(0),
    });
    let core = persona(provider.clone(), weather.clone());

    let output = core
        .complete(vec![Message::user("Weather in Beijing?")], CompleteOptions::default())
        .await
        .unwrap();
    let completion = output.into_completion().unwrap();

    assert_eq!(completion.message.content, "It's 15°C and sunny in Beijing.");
    assert_eq!(completion.finish_reason.as_str(), "stop");
    assert_eq!(provider.calls(), 2);
    assert_eq!(weather.fetches.load(Ordering::SeqCst), 1);

    let first = provider.request(0);
    let tools = first.tools.unwrap();
    assert_eq!(tools[0].name(), "get_weather");

    let second = provider.request(1);
    let tool_msg = second
        .messages
        .iter()
        .find(|m| m.role == WireRole::Tool)
        .unwrap();
    let text = tool_msg.content.as_ref().unwrap().to_text();
    assert!(text.contains("北京市"));
    assert!(text.contains("\"temperature\":\"15\""));
}

#[tokio::test]
async fn e2e_service_rejection_becomes_placeholder() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        weather_call("c1", "000000"),
        text_turn("I couldn't get the weather."),
    ]));
    let weather = Arc::new(TableWeather {
        fetches: AtomicUsize::new(0),
    });
    let core = persona(provider.clone(), weather);

    let completion = core
        .complete(vec![Message::user("Weather at 000000?")], CompleteOptions::default())
        .await
        .unwrap()
        .into_completion()
        .unwrap();
    assert_eq!(completion.message.content, "I couldn't get the weather.");

    let second = provider.request(1);
    let tool_msg = second.messages.iter().find(|m| m.role == WireRole::Tool).unwrap();
    assert_eq!(
        tool_msg.content.as_ref().unwrap().to_text(),
        "Error executing tool get_weather"
    );
}

#[tokio::test]
async fn e2e_streamed_answer_through_registry() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        weather_call("c1", "110000"),
        text_turn("Sunny, 15°C."),
    ]));
    let weather = Arc::new(TableWeather {
        fetches: AtomicUsize::new(0),
    });

    let mut registry = PersonaRegistry::new();
    registry.register(persona(provider.clone(), weather)).unwrap();
    let core = registry.get("guide").unwrap();

    let output = core
        .complete(vec![Message::user("Weather in Beijing?")], CompleteOptions::streaming())
        .await
        .unwrap();
    let CompletionOutput::Stream(streaming) = output else {
        panic!("expected a stream");
    };

    let text = streaming
        .chunks
        .reduce(String::new(), |mut acc, chunk| {
            acc.push_str(chunk.text());
            acc
        })
        .await
        .unwrap();
    assert_eq!(text, "Sunny, 15°C.");

    let ledger = streaming.into_ledger().await.unwrap();
    // system, user, assistant, request, result, assistant
    assert_eq!(ledger.len(), 6);
    assert_eq!(provider.calls(), 2);
}
