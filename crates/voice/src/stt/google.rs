//! Google Cloud Speech-to-Text provider implementation.
//!
//! Google Cloud provides speech recognition with support for over 125 languages
//! and variants. This implementation uses the REST API with API key authentication.

use {
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    base64::Engine,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use super::{SttProvider, TranscribeRequest, Transcript, Word};

/// Google Cloud Speech-to-Text API base URL.
const API_BASE: &str = "https://speech.googleapis.com/v1/speech:recognize";

/// Google Cloud STT provider.
#[derive(Clone)]
pub struct GoogleStt {
    client: Client,
    api_key: Option<Secret<String>>,
    language: Option<String>,
    model: Option<String>,
}

impl std::fmt::Debug for GoogleStt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleStt")
            .field("api_key", &"[REDACTED]")
            .field("language", &self.language)
            .field("model", &self.model)
            .finish()
    }
}

impl Default for GoogleStt {
    fn default() -> Self {
        Self::new(None)
    }
}

impl GoogleStt {
    /// Create a new Google STT provider.
    #[must_use]
    pub fn new(api_key: Option<Secret<String>>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            language: None,
            model: None,
        }
    }

    /// Create with custom options.
    #[must_use]
    pub fn with_options(
        api_key: Option<Secret<String>>,
        language: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            language,
            model,
        }
    }

    /// Get the API key, returning an error if not configured.
    fn get_api_key(&self) -> Result<&Secret<String>> {
        self.api_key
            .as_ref()
            .ok_or_else(|| anyhow!("Google Cloud API key not configured"))
    }

    /// Map our AudioFormat to Google's encoding enum.
    fn encoding(format: crate::tts::AudioFormat) -> &'static str {
        match format {
            crate::tts::AudioFormat::Mp3 => "MP3",
            crate::tts::AudioFormat::Opus | crate::tts::AudioFormat::Webm => "OGG_OPUS",
            crate::tts::AudioFormat::Aac => "MP3", // Fallback, not directly supported
            crate::tts::AudioFormat::Pcm => "LINEAR16",
        }
    }
}

#[async_trait]
impl SttProvider for GoogleStt {
    fn id(&self) -> &'static str {
        "google"
    }

    fn name(&self) -> &'static str {
        "Google Cloud"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(&self, request: TranscribeRequest) -> Result<Transcript> {
        let api_key = self.get_api_key()?;

        // Build the URL with API key
        let url = format!("{}?key={}", API_BASE, api_key.expose_secret());

        // Encode audio as base64
        let audio_content = base64::engine::general_purpose::STANDARD.encode(&request.audio);

        // Determine language code
        let language_code = request
            .language
            .clone()
            .or_else(|| self.language.clone())
            .unwrap_or_else(|| "en-US".to_string());

        // Build the request body
        let body = GoogleRequest {
            config: GoogleRecognitionConfig {
                encoding: Self::encoding(request.format).to_string(),
                language_code,
                enable_automatic_punctuation: true,
                enable_word_time_offsets: true,
                model: self.model.clone(),
            },
            audio: GoogleAudio {
                content: audio_content,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("failed to send Google transcription request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Google transcription request failed: {} - {}",
                status,
                body
            ));
        }

        let google_response: GoogleResponse = response
            .json()
            .await
            .context("failed to parse Google response")?;

        // Extract the language from first result before consuming
        let language = google_response
            .results
            .first()
            .and_then(|r| r.language_code.clone());

        // Extract the first result
        let result = google_response
            .results
            .into_iter()
            .next()
            .and_then(|r| r.alternatives.into_iter().next());

        let Some(alt) = result else {
            return Ok(Transcript {
                text: String::new(),
                language: None,
                confidence: None,
                duration_seconds: None,
                words: None,
            });
        };

        Ok(Transcript {
            text: alt.transcript,
            language,
            confidence: alt.confidence,
            duration_seconds: None, // Google doesn't return total duration
            words: alt.words.map(|words| {
                words
                    .into_iter()
                    .map(|w| {
                        // Google returns times as strings like "1.500s"
                        let start = parse_google_time(&w.start_time);
                        let end = parse_google_time(&w.end_time);
                        Word {
                            word: w.word,
                            start,
                            end,
                        }
                    })
                    .collect()
            }),
        })
    }
}

/// Parse Google's time format (e.g., "1.500s") to seconds as f32.
fn parse_google_time(time_str: &str) -> f32 {
    time_str
        .strip_suffix('s')
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0)
}

// ── API Types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GoogleRequest {
    config: GoogleRecognitionConfig,
    audio: GoogleAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleRecognitionConfig {
    encoding: String,
    language_code: String,
    enable_automatic_punctuation: bool,
    enable_word_time_offsets: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct GoogleAudio {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct GoogleResponse {
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleResult {
    alternatives: Vec<GoogleAlternative>,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleAlternative {
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    words: Option<Vec<GoogleWord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleWord {
    word: String,
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
}
