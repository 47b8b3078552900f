//! `OpenAI` Chat Completions API driver.
//!
//! Implements [`LlmDriver`] for `/v1/chat/completions` with `stream: true`,
//! turning each `choices[0].delta.content` into one text delta.

use anyhow::Context;
use futures::{Stream, StreamExt};

use super::{DeltaStream, LlmDriver, LlmRequest, LlmSettings};

/// Driver for the `OpenAI` Chat Completions API.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    pub fn new(settings: LlmSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http, settings })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

/// What one `data:` line of the SSE body means.
#[derive(Debug, PartialEq, Eq)]
enum SseData {
    /// A non-empty text delta.
    Delta(String),
    /// End-of-stream marker.
    Done,
    /// A frame without text (role announcement, finish reason, ...).
    Skip,
}

fn parse_data(data: &str) -> anyhow::Result<SseData> {
    if data == "[DONE]" {
        return Ok(SseData::Done);
    }

    let v: serde_json::Value =
        serde_json::from_str(data).with_context(|| format!("invalid stream frame: {data}"))?;

    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        anyhow::bail!("model endpoint reported an error: {message}");
    }

    match v["choices"][0]["delta"]
        .get("content")
        .and_then(|x| x.as_str())
    {
        Some(s) if !s.is_empty() => Ok(SseData::Delta(s.to_string())),
        _ => Ok(SseData::Skip),
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<DeltaStream> {
        let url = self.url();

        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "messages": req.messages,
        });

        tracing::debug!(
            url = %url,
            message_count = req.messages.len(),
            "Sending chat completions request"
        );

        let mut rb = self.http.post(&url).json(&body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?;
        Ok(delta_stream(resp.bytes_stream()))
    }
}

/// Turn a Chat Completions SSE body into text deltas.
///
/// Frames end with a blank line (`\n\n` or `\r\n\r\n`). A last frame cut
/// off by EOF without its blank line is still parsed.
fn delta_stream<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let out = async_stream::try_stream! {
        let mut buf = Vec::<u8>::new();
        let mut finished = false;

        futures::pin_mut!(body);
        'read: while let Some(chunk) = body.next().await {
            buf.extend_from_slice(chunk?.as_ref());

            while let Some((pos, delim)) = find_frame_end(&buf) {
                let frame = buf.drain(..pos + delim).collect::<Vec<_>>();
                for data in frame_data(&frame) {
                    match parse_data(&data)? {
                        SseData::Delta(s) => {
                            yield s;
                        }
                        SseData::Done => {
                            finished = true;
                            break 'read;
                        }
                        SseData::Skip => {}
                    }
                }
            }
        }

        if !finished {
            for data in frame_data(&buf) {
                match parse_data(&data)? {
                    SseData::Delta(s) => {
                        yield s;
                    }
                    SseData::Done => break,
                    SseData::Skip => {}
                }
            }
        }
    };

    Box::pin(out)
}

/// Position and length of the first frame delimiter in the buffer.
fn find_frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Payloads of the `data:` lines in one frame.
fn frame_data(frame: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(frame)
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim().to_string())
        .filter(|data| !data.is_empty())
        .collect()
}
