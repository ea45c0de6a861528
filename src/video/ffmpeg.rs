use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::VideoError;
use crate::model::{Bitrate, Codec, HlsSegmentFormat, Resolution};
use crate::util::ffmpeg_progress::FfmpegProgressTracker;
use crate::video::hwaccel::HwAccel;

async fn run(mut cmd: TokioCommand, hwaccel: HwAccel, label: &str) -> Result<(), VideoError> {
    debug!(command = ?cmd, hwaccel = %hwaccel, "running {}", label);

    if tracing::enabled!(tracing::Level::DEBUG) {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        let status = cmd.status().await.map_err(VideoError::Io)?;
        if !status.success() {
            return Err(VideoError::FfmpegFailed(format!("{label} failed (see output above)")));
        }
    } else {
        let output = cmd.output().await.map_err(VideoError::Io)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::FfmpegFailed(stderr.to_string()));
        }
    }
    Ok(())
}

/// Runs a command built with `-progress pipe:1 -nostats`, feeding stdout to
/// `tracker` as it runs so callers can persist throttled progress updates.
/// Raced against `cancellation`: if it fires first the child is killed and
/// `VideoError::Cancelled` is returned instead of waiting for exit.
async fn run_with_progress(
    mut cmd: TokioCommand,
    hwaccel: HwAccel,
    label: &str,
    tracker: &FfmpegProgressTracker,
    cancellation: &CancellationToken,
) -> Result<(), VideoError> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    debug!(command = ?cmd, hwaccel = %hwaccel, "running {} with progress tracking", label);

    let mut child = cmd.spawn().map_err(VideoError::Io)?;
    let stdout = child.stdout.take().expect("stdout piped");
    let mut stderr = child.stderr.take().expect("stderr piped");

    let progress_task = tokio::spawn(async move {
        let tracker = tracker.progress_ms.clone();
        let t = FfmpegProgressTracker { progress_ms: tracker };
        t.track_progress(stdout).await
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(VideoError::Io)?;
            let _ = progress_task.await;
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            if !status.success() {
                let stderr = String::from_utf8_lossy(&stderr_bytes);
                return Err(VideoError::FfmpegFailed(stderr.to_string()));
            }
            Ok(())
        }
        _ = cancellation.cancelled() => {
            let _ = child.kill().await;
            let _ = child.wait().await;
            progress_task.abort();
            stderr_task.abort();
            Err(VideoError::Cancelled)
        }
    }
}

fn add_hwaccel_input_options(cmd: &mut TokioCommand, hwaccel: HwAccel) {
    if let Some(init_device) = hwaccel.init_hw_device() {
        cmd.arg("-init_hw_device").arg(init_device);
    }
    if let Some(hwaccel_type) = hwaccel.hwaccel_type() {
        cmd.arg("-hwaccel").arg(hwaccel_type);
        if let Some(device) = hwaccel.qsv_device() {
            cmd.arg("-qsv_device").arg(device);
        }
        if let Some(output_format) = hwaccel.hwaccel_output_format() {
            cmd.arg("-hwaccel_output_format").arg(output_format);
        }
    }
}

fn scale_vf(hwaccel: HwAccel, width: u32, height: u32) -> String {
    let scale_filter = hwaccel.scale_filter();
    if hwaccel.hwaccel_output_format().is_none() {
        if let Some(upload_filter) = hwaccel.upload_filter() {
            let format_filter = if matches!(hwaccel, HwAccel::Qsv) { ",format=qsv" } else { "" };
            return format!("{upload_filter}{format_filter},{scale_filter}=w={width}:h={height}");
        }
    }
    format!("{scale_filter}=w={width}:h={height}")
}

/// Builds and runs a single-resolution H.264/AAC MP4 transcode, used by the
/// transcode worker pool.
pub struct Mp4TranscodeCommand {
    input: String,
    output_path: PathBuf,
    resolution: Resolution,
    bitrate: Bitrate,
    hwaccel: HwAccel,
}

impl Mp4TranscodeCommand {
    pub fn new(input: &str, output_path: PathBuf, resolution: Resolution, bitrate: Bitrate, hwaccel: HwAccel) -> Self {
        Self {
            input: input.to_string(),
            output_path,
            resolution,
            bitrate,
            hwaccel,
        }
    }

    fn build(&self, ffmpeg_path: &Path, with_progress: bool) -> TokioCommand {
        let mut cmd = TokioCommand::new(ffmpeg_path);
        cmd.arg("-y");
        if with_progress {
            cmd.arg("-progress").arg("pipe:1").arg("-nostats");
        }
        add_hwaccel_input_options(&mut cmd, self.hwaccel);
        cmd.arg("-i").arg(&self.input);

        let (width, height) = self.resolution.dimensions();
        cmd.arg("-vf").arg(scale_vf(self.hwaccel, width, height));

        cmd.arg("-c:v").arg(self.hwaccel.video_encoder(Codec::H264));
        cmd.arg("-b:v").arg(self.bitrate.as_ffmpeg_arg());
        for (opt, val) in self.hwaccel.encoder_options(Codec::H264) {
            cmd.arg(opt).arg(val);
        }
        cmd.arg("-c:a").arg("aac").arg("-b:a").arg("128k");
        cmd.arg("-movflags").arg("+faststart");
        cmd.arg(&self.output_path);
        cmd
    }

    pub async fn run(&self, ffmpeg_path: &Path) -> Result<(), VideoError> {
        run(self.build(ffmpeg_path, false), self.hwaccel, "mp4 transcode").await
    }

    pub async fn run_with_progress(
        &self,
        ffmpeg_path: &Path,
        tracker: &FfmpegProgressTracker,
        cancellation: &CancellationToken,
    ) -> Result<(), VideoError> {
        run_with_progress(self.build(ffmpeg_path, true), self.hwaccel, "mp4 transcode", tracker, cancellation).await
    }
}

/// Builds and runs the FFmpeg invocation for a single HLS rendition (one
/// resolution/bitrate variant, its own output directory). The HLS worker
/// pool invokes this once per configured variant and assembles the master
/// playlist afterwards.
pub struct HlsVariantCommand {
    input: String,
    output_dir: PathBuf,
    resolution: Resolution,
    bitrate: Bitrate,
    segment_duration: u32,
    list_size: u32,
    format: HlsSegmentFormat,
    hwaccel: HwAccel,
}

impl HlsVariantCommand {
    pub fn new(
        input: &str,
        output_dir: PathBuf,
        resolution: Resolution,
        bitrate: Bitrate,
        segment_duration: u32,
        list_size: u32,
        format: HlsSegmentFormat,
        hwaccel: HwAccel,
    ) -> Self {
        Self {
            input: input.to_string(),
            output_dir,
            resolution,
            bitrate,
            segment_duration,
            list_size,
            format,
            hwaccel,
        }
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join("stream.m3u8")
    }

    fn build(&self, ffmpeg_path: &Path, with_progress: bool) -> TokioCommand {
        let mut cmd = TokioCommand::new(ffmpeg_path);
        cmd.arg("-y");
        if with_progress {
            cmd.arg("-progress").arg("pipe:1").arg("-nostats");
        }
        add_hwaccel_input_options(&mut cmd, self.hwaccel);
        cmd.arg("-i").arg(&self.input);

        let (width, height) = self.resolution.dimensions();
        cmd.arg("-vf").arg(scale_vf(self.hwaccel, width, height));

        cmd.arg("-c:v").arg(self.hwaccel.video_encoder(Codec::H264));
        cmd.arg("-b:v").arg(self.bitrate.as_ffmpeg_arg());
        for (opt, val) in self.hwaccel.encoder_options(Codec::H264) {
            cmd.arg(opt).arg(val);
        }
        cmd.arg("-c:a").arg("aac").arg("-b:a").arg("128k");

        let segment_ext = match self.format {
            HlsSegmentFormat::Mpegts => "ts",
            HlsSegmentFormat::Fmp4 => "m4s",
        };
        cmd.arg("-f").arg("hls");
        cmd.arg("-hls_time").arg(self.segment_duration.to_string());
        cmd.arg("-hls_list_size").arg(self.list_size.to_string());
        cmd.arg("-hls_segment_type").arg(self.format.as_str());
        cmd.arg("-hls_segment_filename")
            .arg(self.output_dir.join(format!("segment_%05d.{segment_ext}")));
        cmd.arg(self.playlist_path());
        cmd
    }

    pub async fn run(&self, ffmpeg_path: &Path) -> Result<(), VideoError> {
        run(self.build(ffmpeg_path, false), self.hwaccel, "hls variant encode").await
    }

    pub async fn run_with_progress(
        &self,
        ffmpeg_path: &Path,
        tracker: &FfmpegProgressTracker,
        cancellation: &CancellationToken,
    ) -> Result<(), VideoError> {
        run_with_progress(self.build(ffmpeg_path, true), self.hwaccel, "hls variant encode", tracker, cancellation)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mp4_command_targets_requested_resolution() {
        let cmd = Mp4TranscodeCommand::new(
            "input.mp4",
            PathBuf::from("/tmp/out.mp4"),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
            HwAccel::Software,
        );
        assert_eq!(cmd.resolution, Resolution::R720p);
    }

    #[test]
    fn hls_variant_playlist_path_is_under_output_dir() {
        let cmd = HlsVariantCommand::new(
            "input.mp4",
            PathBuf::from("/tmp/hls/720p"),
            Resolution::R720p,
            Bitrate::parse("2000k").unwrap(),
            10,
            0,
            HlsSegmentFormat::Mpegts,
            HwAccel::Software,
        );
        assert_eq!(cmd.playlist_path(), PathBuf::from("/tmp/hls/720p/stream.m3u8"));
    }
}
