//! `personax chat`: Interactive or single-message chat mode.

use futures::StreamExt;
use personax_config::AppConfig;
use personax_core::completion::CompletionChunk;
use personax_core::message::Message;
use personax_engine::{CompleteOptions, CompletionOutput, Core};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

pub async fn run(message: Option<String>, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early to give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    PERSONAX_API_KEY = 'sk-...'");
        eprintln!("    OPENAI_API_KEY   = 'sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let core = super::build_core(&config)?;

    if let Some(msg) = message {
        // Single message mode
        let answer = ask(&core, vec![Message::user(msg)], stream).await?;
        if !stream {
            println!("{answer}");
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  PersonaX: Interactive Mode");
    println!();
    println!("  Persona:   {}", core.id());
    println!("  Model:     {}", core.model());
    let tools = core.tools().names();
    println!(
        "  Tools:     {}",
        if tools.is_empty() { "none".to_string() } else { tools.join(", ") }
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt()?;
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        history.push(Message::user(input));
        debug!(turns = history.len(), "Sending chat message");
        if !stream {
            eprint!("  ...");
        }

        match ask(&core, history.clone(), stream).await {
            Ok(answer) => {
                if !stream {
                    eprint!("\r     \r");
                    println!();
                    for line in answer.lines() {
                        println!("  Assistant > {line}");
                    }
                }
                println!();
                history.push(Message::assistant(answer));
            }
            Err(e) => {
                warn!(error = %e, "Chat completion failed");
                if !stream {
                    eprint!("\r     \r");
                }
                eprintln!("  [Error] {e}");
                println!();
                // Keep the history alternating.
                history.pop();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

/// Run one completion and return the final answer text. In streaming mode
/// the text is printed as it arrives.
async fn ask(core: &Core, messages: Vec<Message>, stream: bool) -> Result<String, Box<dyn std::error::Error>> {
    let options = if stream {
        CompleteOptions::streaming()
    } else {
        CompleteOptions::default()
    };

    match core.complete(messages, options).await? {
        CompletionOutput::Complete(completion) => Ok(completion.message.content),
        CompletionOutput::Stream(streaming) => {
            let mut answer = StreamedAnswer::default();
            let mut chunks = streaming.chunks.iter();
            let mut stdout = std::io::stdout();

            print!("  Assistant > ");
            stdout.flush()?;
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk?;
                answer.push(&chunk);
                if !chunk.is_finish() {
                    print!("{}", chunk.text());
                    stdout.flush()?;
                }
            }
            println!();
            Ok(answer.into_text())
        }
    }
}

/// Collects streamed chunks into the answer: the text of the last model turn.
#[derive(Debug, Default)]
struct StreamedAnswer {
    answer: String,
    turn: String,
}

impl StreamedAnswer {
    fn push(&mut self, chunk: &CompletionChunk) {
        if chunk.is_finish() {
            self.answer = std::mem::take(&mut self.turn);
        } else {
            self.turn.push_str(chunk.text());
        }
    }

    fn into_text(self) -> String {
        if self.turn.is_empty() { self.answer } else { self.turn }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use personax_core::completion::{CompletionDelta, FinishReason};

    fn chunk(text: Option<&str>, finish: Option<FinishReason>) -> CompletionChunk {
        CompletionChunk {
            id: "chatcmpl-test".into(),
            delta: CompletionDelta {
                content: text.map(Into::into),
            },
            finish_reason: finish,
            created: 1_700_000_000,
            model: "gpt-test".into(),
            usage: None,
        }
    }

    fn collect(chunks: &[CompletionChunk]) -> String {
        let mut answer = StreamedAnswer::default();
        for c in chunks {
            answer.push(c);
        }
        answer.into_text()
    }

    #[test]
    fn answer_is_the_last_turn() {
        let chunks = [
            chunk(Some("Let me check."), None),
            chunk(None, Some(FinishReason::Stop)),
            chunk(Some("15°C "), None),
            chunk(Some("and sunny."), None),
            chunk(None, Some(FinishReason::Stop)),
        ];
        assert_eq!(collect(&chunks), "15°C and sunny.");
    }

    #[test]
    fn empty_final_turn_does_not_keep_earlier_text() {
        let chunks = [
            chunk(Some("Let me check."), None),
            chunk(None, Some(FinishReason::Stop)),
            chunk(None, Some(FinishReason::Stop)),
        ];
        assert_eq!(collect(&chunks), "");
    }

    #[test]
    fn unfinished_turn_is_still_returned() {
        let chunks = [chunk(Some("Partial"), None)];
        assert_eq!(collect(&chunks), "Partial");
    }
}
