use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

// Search and channel listing entry
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Absent for live streams.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub stream_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub subscribers: Option<u64>,
    #[serde(default)]
    pub videos: Vec<VideoSummary>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub banner_url: Option<String>,
}

// Raw `/video/<id>` response
#[derive(Debug, Deserialize)]
pub(crate) struct VideoStreamResponse {
    pub(crate) stream_url: String,
    #[serde(default)]
    pub(crate) headers: HashMap<String, String>,
}

/// Playable stream for one video id. Owned by the session that resolved it.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub stream_url: String,
    pub request_headers: HashMap<String, String>,
}

impl StreamDescriptor {
    /// Header names the player needs to replay the backend's request.
    pub const FORWARDED_HEADERS: [&'static str; 4] =
        ["User-Agent", "Accept", "Accept-Language", "Sec-Fetch-Mode"];

    pub fn user_agent(&self) -> Option<&str> {
        self.request_headers.get("User-Agent").map(String::as_str)
    }
}

impl From<VideoStreamResponse> for StreamDescriptor {
    fn from(response: VideoStreamResponse) -> Self {
        // The extractor returns many headers; only the ones the stream host checks matter.
        let request_headers = response
            .headers
            .into_iter()
            .filter(|(name, _)| {
                Self::FORWARDED_HEADERS
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(name))
            })
            .collect();
        Self {
            stream_url: response.stream_url,
            request_headers,
        }
    }
}

// Raw skip-segment entry as served by the segment provider
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SkipSegmentEntry {
    #[serde(default)]
    pub(crate) category: String,
    #[serde(rename = "actionType", default)]
    pub(crate) action_type: String,
    pub(crate) segment: [f64; 2],
    #[serde(rename = "UUID", default)]
    pub(crate) uuid: String,
    #[serde(rename = "videoDuration", default)]
    pub(crate) video_duration: f64,
    #[serde(default)]
    pub(crate) locked: i64,
    #[serde(default)]
    pub(crate) votes: i64,
    #[serde(default)]
    pub(crate) description: String,
}

/// A time range to seek past. `start_seconds <= end_seconds`, both non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SkipSegment {
    pub id: String,
    pub category: String,
    pub action_type: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub video_duration_seconds: f64,
    pub locked: bool,
    pub votes: i64,
    pub description: String,
}

impl SkipSegment {
    pub fn contains(&self, position_seconds: f64) -> bool {
        self.start_seconds <= position_seconds && position_seconds < self.end_seconds
    }

    pub(crate) fn from_entry(entry: SkipSegmentEntry) -> Option<Self> {
        let [start, end] = entry.segment;
        if !(start.is_finite() && end.is_finite()) || start < 0.0 || end < start {
            debug!(id = %entry.uuid, start, end, "Dropping malformed skip segment");
            return None;
        }
        Some(Self {
            id: entry.uuid,
            category: entry.category,
            action_type: entry.action_type,
            start_seconds: start,
            end_seconds: end,
            video_duration_seconds: entry.video_duration,
            locked: entry.locked != 0,
            votes: entry.votes,
            description: entry.description,
        })
    }
}
