pub mod ffmpeg;
pub mod hwaccel;
pub mod master_playlist;
pub mod metadata;

pub use ffmpeg::{HlsVariantCommand, Mp4TranscodeCommand};
pub use hwaccel::HwAccel;
pub use master_playlist::{render_master_playlist, RenditionEntry};
pub use metadata::VideoMetadata;
