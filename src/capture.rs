use serde::Deserialize;
use tracing::trace;

const REASONING_OPEN: &str = "<reasoning_content>";
const REASONING_CLOSE: &str = "</reasoning_content>";

/// Incremental parser that rebuilds a chat-completion answer from a
/// server-sent-event body delivered in arbitrary byte chunks.
///
/// Chunks may split UTF-8 code points, lines and JSON payloads anywhere; the
/// parser keeps the incomplete tail of each until the rest arrives.
#[derive(Debug, Default)]
pub struct SseAnswerCapture {
    pending_bytes: Vec<u8>,
    pending_text: String,
    content: String,
    reasoning: String,
    snapshot: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<MessageText>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageText {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

impl SseAnswerCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the next chunk and return the best answer known so far.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<&str> {
        self.decode(chunk);
        while let Some(end) = self.pending_text.find('\n') {
            let line: String = self.pending_text.drain(..=end).collect();
            self.consume_line(&line);
        }
        self.snapshot = combine_answer(&self.reasoning, &self.content);
        self.snapshot.as_deref()
    }

    /// Answer as of the last completed [`feed`](Self::feed) call.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Final answer once the stream has ended. A trailing line without a
    /// newline is still considered.
    pub fn finish(mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_text.push_str(&tail);
            self.pending_bytes.clear();
        }
        let rest = std::mem::take(&mut self.pending_text);
        self.consume_line(&rest);
        combine_answer(&self.reasoning, &self.content)
    }

    fn decode(&mut self, chunk: &[u8]) {
        let mut input = std::mem::take(&mut self.pending_bytes);
        input.extend_from_slice(chunk);

        let mut start = 0;
        while start < input.len() {
            match std::str::from_utf8(&input[start..]) {
                Ok(text) => {
                    self.pending_text.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid = start + err.valid_up_to();
                    self.pending_text
                        .push_str(&String::from_utf8_lossy(&input[start..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.pending_text.push(char::REPLACEMENT_CHARACTER);
                            start = valid + invalid;
                        }
                        None => {
                            self.pending_bytes = input[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn consume_line(&mut self, line: &str) {
        let Some(payload) = line.trim().strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return;
        }

        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                trace!(error = %err, "ignoring malformed stream event");
                return;
            }
        };
        let Some(delta) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
        else {
            return;
        };

        if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
            self.content.push_str(&text);
        }
        if let Some(text) = delta.reasoning_content.filter(|text| !text.is_empty()) {
            self.reasoning.push_str(&text);
        }
    }
}

/// Merge the reasoning channel and the visible answer into one text.
///
/// Returns `None` when both are blank.
pub fn combine_answer(reasoning: &str, content: &str) -> Option<String> {
    let combined = if reasoning.trim().is_empty() {
        content.to_string()
    } else if content.trim().is_empty() {
        format!("{REASONING_OPEN}\n{reasoning}\n{REASONING_CLOSE}")
    } else {
        format!("{REASONING_OPEN}\n{reasoning}\n{REASONING_CLOSE}\n\n{content}")
    };
    (!combined.trim().is_empty()).then_some(combined)
}

/// Answer carried by a buffered (non-streaming) chat completion body.
pub fn extract_completion_answer(body: &[u8]) -> Option<String> {
    let completion: Completion = match serde_json::from_slice(body) {
        Ok(completion) => completion,
        Err(err) => {
            trace!(error = %err, "completion body is not a chat completion");
            return None;
        }
    };
    let message = completion.choices.into_iter().next()?.message?;
    combine_answer(
        message.reasoning_content.as_deref().unwrap_or_default(),
        message.content.as_deref().unwrap_or_default(),
    )
}
