use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;
use url::Url;

const VIDEO_ID_LEN: usize = 11;
const DEFAULT_TIMEDTEXT_BASE: &str = "https://www.youtube.com";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("invalid YouTube URL")]
    InvalidUrl,
    #[error("no transcript available for video {0}")]
    NotAvailable(String),
    #[error("transcript request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("transcript could not be parsed: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionSegment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    pub text: String,
    pub duration_seconds: f64,
}

impl Transcript {
    /// Joins segment text with spaces. Duration runs to the end of the last segment.
    pub fn from_segments(segments: &[CaptionSegment]) -> Self {
        let text = segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let duration_seconds = segments
            .last()
            .map(|last| last.start + last.duration)
            .unwrap_or(0.0);
        Self { text, duration_seconds }
    }
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError>;
}

/// Extracts the 11-character id from `watch?v=`, `youtu.be/`, `embed/` and
/// `shorts/` links.
pub fn extract_video_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .or_else(|_| Url::parse(&format!("https://{raw}")))
        .ok()?;

    let host = url.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host)
        .to_string();

    let mut segments = url.path_segments()?;
    let candidate = match host.as_str() {
        "youtu.be" => segments.next()?.to_string(),
        "youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => match segments.next()? {
            "watch" => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())?,
            "embed" | "shorts" => segments.next()?.to_string(),
            _ => return None,
        },
        _ => return None,
    };

    let id: String = candidate.chars().take(VIDEO_ID_LEN).collect();
    let valid = id.len() == VIDEO_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(id)
}

/// Parses the `<transcript><text start=".." dur="..">..</text></transcript>`
/// caption format.
pub fn parse_timedtext(xml: &str) -> Result<Vec<CaptionSegment>, TranscriptError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut segments = Vec::new();
    let mut current: Option<CaptionSegment> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                current = Some(CaptionSegment {
                    text: String::new(),
                    start: float_attribute(e, "start"),
                    duration: float_attribute(e, "dur"),
                });
            }
            Ok(Event::Text(e)) => {
                if let Some(segment) = current.as_mut() {
                    let text = e.unescape().map_err(|err| TranscriptError::Parse(err.to_string()))?;
                    // Caption text is frequently escaped twice.
                    let text = quick_xml::escape::unescape(&text)
                        .map(|inner| inner.into_owned())
                        .unwrap_or_else(|_| text.to_string());
                    segment.text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => {
                if let Some(segment) = current.take() {
                    segments.push(segment);
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(TranscriptError::Parse(err.to_string())),
            _ => {}
        }
    }

    Ok(segments)
}

fn float_attribute(element: &quick_xml::events::BytesStart<'_>, name: &str) -> f64 {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().and_then(|value| value.parse().ok()))
        .unwrap_or(0.0)
}

/// Fetches captions from YouTube's timedtext endpoint.
#[derive(Clone)]
pub struct YouTubeTranscripts {
    client: reqwest::Client,
    base_url: String,
    languages: Vec<String>,
}

impl YouTubeTranscripts {
    pub fn new(timeout: Duration) -> Self {
        Self::with_base_url(DEFAULT_TIMEDTEXT_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            languages: vec!["en".to_string()],
        }
    }

    async fn fetch_language(&self, video_id: &str, lang: &str) -> Result<Vec<CaptionSegment>, TranscriptError> {
        let url = format!("{}/api/timedtext", self.base_url);
        let body = self
            .client
            .get(&url)
            .query(&[("v", video_id), ("lang", lang)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        parse_timedtext(&body)
    }
}

#[async_trait]
impl TranscriptSource for YouTubeTranscripts {
    async fn fetch(&self, video_id: &str) -> Result<Transcript, TranscriptError> {
        for lang in &self.languages {
            let segments = self.fetch_language(video_id, lang).await?;
            if !segments.is_empty() {
                return Ok(Transcript::from_segments(&segments));
            }
            tracing::debug!(video_id, lang, "no captions in language");
        }
        Err(TranscriptError::NotAvailable(video_id.to_string()))
    }
}
