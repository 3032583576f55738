//! Scripted providers and stub tools shared by the engine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use personax_core::error::{ProviderError, ToolError};
use personax_core::provider::{
    FragmentReceiver, Provider, ProviderFragment, ProviderRequest, ProviderTurn, ToolCallDelta, Usage, WireToolCall,
};
use personax_core::schema::{Param, ParamType, ToolSpec};
use personax_core::tool::{Tool, ToolArgs, ToolOutput};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns scripted turns in order and records every request it receives.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Result<ProviderTurn, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ProviderTurn>) -> Self {
        Self::with_results(turns.into_iter().map(Ok).collect())
    }

    pub fn with_results(turns: Vec<Result<ProviderTurn, ProviderError>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no turn left for call #{call}"))
    }
}

/// Streams scripted fragment lists, one list per turn.
pub struct FragmentProvider {
    scripts: Mutex<VecDeque<Vec<Result<ProviderFragment, ProviderError>>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    streams_opened: AtomicUsize,
}

impl FragmentProvider {
    pub fn new(scripts: Vec<Vec<ProviderFragment>>) -> Self {
        Self::with_results(
            scripts
                .into_iter()
                .map(|s| s.into_iter().map(Ok).collect())
                .collect(),
        )
    }

    pub fn with_results(scripts: Vec<Vec<Result<ProviderFragment, ProviderError>>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
            streams_opened: AtomicUsize::new(0),
        }
    }

    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FragmentProvider {
    fn name(&self) -> &str {
        "fragments"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderTurn, ProviderError> {
        Err(ProviderError::NotConfigured("FragmentProvider only streams".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FragmentReceiver, ProviderError> {
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("FragmentProvider: no script left");

        let (tx, rx) = tokio::sync::mpsc::channel(script.len().max(1));
        for fragment in script {
            tx.send(fragment).await.unwrap();
        }
        Ok(rx)
    }
}

// --- Turn and fragment builders ---

pub fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

pub fn text_turn(text: &str) -> ProviderTurn {
    ProviderTurn {
        id: "chatcmpl-1".into(),
        model: "gpt-test".into(),
        content: Some(text.into()),
        finish_reason: Some("stop".into()),
        usage: Some(usage()),
        created: Some(1_700_000_000),
        ..Default::default()
    }
}

pub fn tool_turn(calls: &[(&str, &str, &str)]) -> ProviderTurn {
    ProviderTurn {
        id: "chatcmpl-1".into(),
        model: "gpt-test".into(),
        content: Some(String::new()),
        tool_calls: calls
            .iter()
            .map(|(id, name, args)| WireToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.to_string(),
            })
            .collect(),
        finish_reason: Some("tool_calls".into()),
        created: Some(1_700_000_000),
        ..Default::default()
    }
}

pub fn content(text: &str) -> ProviderFragment {
    ProviderFragment {
        id: "chatcmpl-s".into(),
        model: "gpt-test".into(),
        content_delta: Some(text.into()),
        created: Some(1_700_000_000),
        ..Default::default()
    }
}

pub fn tool_delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ProviderFragment {
    ProviderFragment {
        id: "chatcmpl-s".into(),
        model: "gpt-test".into(),
        tool_call_deltas: vec![ToolCallDelta {
            index,
            id: id.map(Into::into),
            name_delta: name.map(Into::into),
            arguments_delta: args.map(Into::into),
        }],
        created: Some(1_700_000_000),
        ..Default::default()
    }
}

pub fn finish(reason: &str) -> ProviderFragment {
    ProviderFragment {
        id: "chatcmpl-s".into(),
        model: "gpt-test".into(),
        finish_reason: Some(reason.into()),
        usage: Some(usage()),
        created: Some(1_700_000_000),
        ..Default::default()
    }
}

// --- Tools ---

/// `get_weather` that answers from a fixed table and counts its calls.
pub struct StubWeather {
    spec: ToolSpec,
    pub calls: AtomicUsize,
}

impl StubWeather {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::builder("Get the current weather for a location")
                .name("get_weather")
                .param(Param::optional("adcode", ParamType::String, json!("110000")))
                .param(Param::optional("city", ParamType::String, json!("Beijing")))
                .build()
                .unwrap(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for StubWeather {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, args: ToolArgs) -> Result<ToolOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let city = args.get("city").and_then(|v| v.as_str()).unwrap_or_default();
        let output = if city == "NYC" {
            json!({"temperature": "22", "condition": "Cloudy"})
        } else {
            json!({"temperature": "15", "condition": "Sunny"})
        };
        Ok(ToolOutput::Json(output))
    }
}

/// A tool whose service is always down.
pub struct FlakyTool {
    spec: ToolSpec,
}

impl FlakyTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::builder("Look up stock prices")
                .name("get_stock")
                .build()
                .unwrap(),
        }
    }
}

#[async_trait]
impl Tool for FlakyTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, _args: ToolArgs) -> Result<ToolOutput, ToolError> {
        Err(ToolError::failed("get_stock", "upstream returned 503"))
    }
}

/// A tool with a bug: it fails with an internal error.
pub struct BuggyTool {
    spec: ToolSpec,
}

impl BuggyTool {
    pub fn new() -> Self {
        Self {
            spec: ToolSpec::builder("Divide two numbers")
                .name("divide")
                .build()
                .unwrap(),
        }
    }
}

#[async_trait]
impl Tool for BuggyTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn invoke(&self, _args: ToolArgs) -> Result<ToolOutput, ToolError> {
        Err(ToolError::Internal {
            tool_name: "divide".into(),
            reason: "divisor unexpectedly zero".into(),
        })
    }
}
