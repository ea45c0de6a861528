use crate::model::{Bitrate, HlsVariant, Resolution};

/// One resolved HLS rendition: its variant playlist URL plus the metadata
/// needed for the `#EXT-X-STREAM-INF` line.
pub struct RenditionEntry {
    pub variant: HlsVariant,
    pub playlist_url: String,
}

fn bandwidth_bps(bitrate: Bitrate) -> u64 {
    bitrate.bps()
}

/// Renders the `#EXTM3U` master playlist that references each variant
/// playlist produced by the HLS worker pool.
pub fn render_master_playlist(renditions: &[RenditionEntry]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for entry in renditions {
        let (width, height) = entry.variant.resolution.dimensions();
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}\n",
            bandwidth_bps(entry.variant.bitrate),
            width,
            height,
            entry.playlist_url
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_stream_inf_line_per_variant() {
        let renditions = vec![
            RenditionEntry {
                variant: HlsVariant {
                    resolution: Resolution::R480p,
                    bitrate: Bitrate::parse("800k").unwrap(),
                },
                playlist_url: "480p/stream.m3u8".to_string(),
            },
            RenditionEntry {
                variant: HlsVariant {
                    resolution: Resolution::R720p,
                    bitrate: Bitrate::parse("2000k").unwrap(),
                },
                playlist_url: "720p/stream.m3u8".to_string(),
            },
        ];

        let playlist = render_master_playlist(&renditions);
        assert!(playlist.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(playlist.contains("BANDWIDTH=800000,RESOLUTION=854x480"));
        assert!(playlist.contains("480p/stream.m3u8"));
        assert!(playlist.contains("BANDWIDTH=2000000,RESOLUTION=1280x720"));
        assert!(playlist.contains("720p/stream.m3u8"));
    }
}
