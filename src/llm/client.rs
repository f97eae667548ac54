use std::pin::Pin;
use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::LlmError;

/// Sampling options forwarded to the backend verbatim. Unset fields are
/// omitted so the backend applies its own defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub keep_alive: String,
    pub options: GenerateOptions,
}

/// One line of the backend response. Non-streaming responses are a single
/// object of this shape; streaming responses are a newline-delimited
/// sequence with `done: true` on the final line.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateChunk, LlmError>> + Send>>;

/// Thin HTTP client for the backend's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }

    /// Non-streaming generate. A 200 with a missing or empty `response`
    /// field is treated as empty output, not an error.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::ApiError {
                status: status.as_u16(),
            });
        }

        let chunk: GenerateChunk = response.json().await?;
        Ok(chunk.response)
    }

    /// Streaming generate: decodes the newline-delimited JSON body into a
    /// chunk stream. Lines that fail to parse are skipped, matching the
    /// backend's occasional keep-alive noise.
    pub async fn generate_stream(
        &self,
        request: &GenerateRequest,
        timeout: Duration,
    ) -> Result<ChunkStream, LlmError> {
        let response = self
            .http
            .post(self.endpoint())
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::ApiError {
                status: status.as_u16(),
            });
        }

        let mut body = Box::pin(response.bytes_stream());
        let stream = try_stream! {
            let mut buffer = Vec::new();
            let mut finished = false;

            while !finished {
                let Some(bytes) = body.next().await else {
                    break;
                };
                let bytes = bytes.map_err(LlmError::from)?;
                buffer.extend_from_slice(&bytes);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    if let Some(chunk) = decode_line(&line) {
                        let done = chunk.done;
                        yield chunk;
                        if done {
                            finished = true;
                            break;
                        }
                    }
                }
            }

            // Trailing line without a newline terminator.
            if !finished {
                if let Some(chunk) = decode_line(&buffer) {
                    yield chunk;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn decode_line(line: &[u8]) -> Option<GenerateChunk> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            log::debug!("Skipping undecodable stream line: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            keep_alive: "60m".into(),
            options: GenerateOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_generate_returns_response_field() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response": "hello there", "done": true}"#)
            .create_async()
            .await;

        let client = LlmClient::new(server.url());
        let text = client
            .generate(&request("m", "hi"), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(text, "hello there");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_response_field_is_empty_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"done": true}"#)
            .create_async()
            .await;

        let client = LlmClient::new(server.url());
        let text = client
            .generate(&request("m", "hi"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_non_200_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("backend exploded")
            .create_async()
            .await;

        let client = LlmClient::new(server.url());
        let err = client
            .generate(&request("m", "hi"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ApiError { status: 500 }));
    }

    #[tokio::test]
    async fn test_stream_decodes_ndjson_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(concat!(
                "{\"response\": \"chunk one \", \"done\": false}\n",
                "{\"response\": \"chunk two\", \"done\": false}\n",
                "{\"response\": \"\", \"done\": true}\n",
            ))
            .create_async()
            .await;

        let client = LlmClient::new(server.url());
        let mut stream = client
            .generate_stream(&request("m", "hi"), Duration::from_secs(5))
            .await
            .unwrap();

        let mut assembled = String::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assembled.push_str(&chunk.response);
            chunks += 1;
        }

        assert_eq!(assembled, "chunk one chunk two");
        assert_eq!(chunks, 3);
    }

    #[tokio::test]
    async fn test_stream_skips_garbage_lines() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body("not json\n{\"response\": \"ok\", \"done\": true}\n")
            .create_async()
            .await;

        let client = LlmClient::new(server.url());
        let mut stream = client
            .generate_stream(&request("m", "hi"), Duration::from_secs(5))
            .await
            .unwrap();

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.response, "ok");
        assert!(chunk.done);
        assert!(stream.next().await.is_none());
    }
}
