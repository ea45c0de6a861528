use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoded video codec. Only H264 is ever selected by the transcode/HLS
/// workers (H.264/AAC is the only target format), but `HwAccel`'s
/// encoder tables are kept multi-codec since the underlying hardware
/// capability probing is codec-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
    AV1,
}

impl Codec {
    /// Unrecognized codec strings fall back to H264, the only codec the
    /// transcode and HLS workers ever select.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "h265" | "hevc" | "hvc1" => Self::H265,
            "av1" => Self::AV1,
            _ => Self::H264,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Resolution {
    R480p,
    R720p,
    R1080p,
    R1440p,
    R2160p,
}

impl Resolution {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::R480p => (854, 480),
            Self::R720p => (1280, 720),
            Self::R1080p => (1920, 1080),
            Self::R1440p => (2560, 1440),
            Self::R2160p => (3840, 2160),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R480p => "480p",
            Self::R720p => "720p",
            Self::R1080p => "1080p",
            Self::R1440p => "1440p",
            Self::R2160p => "2160p",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "480p" => Some(Self::R480p),
            "720p" => Some(Self::R720p),
            "1080p" => Some(Self::R1080p),
            "1440p" => Some(Self::R1440p),
            "2160p" => Some(Self::R2160p),
            _ => None,
        }
    }
}

/// A bitrate parsed from a human string like "2000k", "2M", "2000kbps", "2mbps".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitrate {
    bps: u64,
}

impl Bitrate {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        let (digits, mult) = if let Some(stripped) = s.strip_suffix("kbps") {
            (stripped, 1_000)
        } else if let Some(stripped) = s.strip_suffix("mbps") {
            (stripped, 1_000_000)
        } else if let Some(stripped) = s.strip_suffix('k') {
            (stripped, 1_000)
        } else if let Some(stripped) = s.strip_suffix('m') {
            (stripped, 1_000_000)
        } else {
            (s.as_str(), 1)
        };
        let value: u64 = digits.parse().ok()?;
        Some(Self {
            bps: value * mult,
        })
    }

    pub fn bps(&self) -> u64 {
        self.bps
    }

    /// Render as an FFmpeg-style `-b:v` argument, e.g. "2000k".
    pub fn as_ffmpeg_arg(&self) -> String {
        format!("{}k", self.bps / 1_000)
    }

    /// The configuration-facing string, e.g. "2000k".
    pub fn as_config_str(&self) -> String {
        self.as_ffmpeg_arg()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TranscodeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub job_uuid: Uuid,
    pub user_uuid: Uuid,
    pub video_uuid: Uuid,
    pub video_push_uuid: Option<Uuid>,
    pub input_object_key: String,
    pub resolution: Resolution,
    pub bitrate: Bitrate,
    pub output_object_key: String,
    pub status: TranscodeStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscodeJob {
    pub fn output_key_for(user_uuid: Uuid, video_uuid: Uuid, resolution: Resolution, bitrate: Bitrate) -> String {
        format!(
            "transcoded/{}/{}_{}_{}.mp4",
            user_uuid,
            video_uuid,
            resolution.as_str(),
            bitrate.as_config_str()
        )
    }

    pub fn new(
        user_uuid: Uuid,
        video_uuid: Uuid,
        video_push_uuid: Option<Uuid>,
        input_object_key: String,
        resolution: Resolution,
        bitrate: Bitrate,
    ) -> Self {
        let now = Utc::now();
        let output_object_key = Self::output_key_for(user_uuid, video_uuid, resolution, bitrate);
        Self {
            job_uuid: Uuid::new_v4(),
            user_uuid,
            video_uuid,
            video_push_uuid,
            input_object_key,
            resolution,
            bitrate,
            output_object_key,
            status: TranscodeStatus::Pending,
            progress: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HlsSourceType {
    Original,
    Transcoded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HlsSegmentFormat {
    Mpegts,
    Fmp4,
}

impl HlsSegmentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mpegts => "mpegts",
            Self::Fmp4 => "fmp4",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsVariant {
    pub resolution: Resolution,
    pub bitrate: Bitrate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsConfig {
    pub resolutions: Vec<HlsVariant>,
    pub segment_duration: u32,
    pub list_size: u32,
    pub format: HlsSegmentFormat,
}

impl HlsConfig {
    pub fn single_variant(resolution: Resolution, bitrate: Bitrate) -> Self {
        Self {
            resolutions: vec![HlsVariant { resolution, bitrate }],
            segment_duration: 10,
            list_size: 0,
            format: HlsSegmentFormat::Mpegts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HlsStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

pub const ERROR_MESSAGE_MAX_LEN: usize = 480;

/// Truncate an error message to the persisted column width before storing it,
/// shared by both job kinds.
pub fn truncate_error_message(message: &str) -> String {
    if message.chars().count() <= ERROR_MESSAGE_MAX_LEN {
        message.to_string()
    } else {
        message.chars().take(ERROR_MESSAGE_MAX_LEN).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HlsJob {
    pub job_uuid: Uuid,
    pub source_job_uuid: Uuid,
    pub source_type: HlsSourceType,
    pub input_object_key: String,
    pub hls_config: HlsConfig,
    pub output_dir: String,
    pub master_playlist_url: Option<String>,
    pub status: HlsStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HlsJob {
    pub fn new(
        source_job_uuid: Uuid,
        source_type: HlsSourceType,
        user_uuid: Uuid,
        video_uuid: Uuid,
        input_object_key: String,
        hls_config: HlsConfig,
    ) -> Self {
        let now = Utc::now();
        let job_uuid = Uuid::new_v4();
        let output_dir = format!("hls/{}/{}/{}", user_uuid, video_uuid, job_uuid);
        Self {
            job_uuid,
            source_job_uuid,
            source_type,
            input_object_key,
            hls_config,
            output_dir,
            master_playlist_url: None,
            status: HlsStatus::Pending,
            progress: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn truncate_error(message: &str) -> String {
        truncate_error_message(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_parses_suffixes() {
        assert_eq!(Bitrate::parse("2000").unwrap().bps(), 2000);
        assert_eq!(Bitrate::parse("2000k").unwrap().bps(), 2_000_000);
        assert_eq!(Bitrate::parse("2000kbps").unwrap().bps(), 2_000_000);
        assert_eq!(Bitrate::parse("2M").unwrap().bps(), 2_000_000);
        assert_eq!(Bitrate::parse("2mbps").unwrap().bps(), 2_000_000);
        assert!(Bitrate::parse("2gbps").is_none());
        assert!(Bitrate::parse("abc").is_none());
    }

    #[test]
    fn output_key_is_deterministic() {
        let user = Uuid::new_v4();
        let video = Uuid::new_v4();
        let key = TranscodeJob::output_key_for(user, video, Resolution::R720p, Bitrate::parse("2000k").unwrap());
        assert_eq!(key, format!("transcoded/{}/{}_720p_2000k.mp4", user, video));
    }

    #[test]
    fn error_message_truncated_at_480() {
        let long = "x".repeat(600);
        let truncated = HlsJob::truncate_error(&long);
        assert_eq!(truncated.chars().count(), ERROR_MESSAGE_MAX_LEN);
    }
}
