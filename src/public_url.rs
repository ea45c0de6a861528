/// Builds the public URL used in result-reporter callbacks: strip a leading
/// `transcode/` prefix from the object key, mount it under
/// `/storage/transcode/`, then prepend the configured public base if set.
pub fn public_url(base: Option<&str>, object_key: &str) -> String {
    let stripped = object_key.strip_prefix("transcode/").unwrap_or(object_key);
    let path = format!("/storage/transcode/{stripped}");
    match base {
        Some(base) => format!("{}{}", base.trim_end_matches('/'), path),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_transcode_prefix_when_present() {
        assert_eq!(
            public_url(None, "transcode/u1/v1_720p_2000k.mp4"),
            "/storage/transcode/u1/v1_720p_2000k.mp4"
        );
    }

    #[test]
    fn leaves_hls_keys_unchanged_besides_mount() {
        assert_eq!(
            public_url(Some("http://cdn.example.com"), "hls/u1/v1/job1/master.m3u8"),
            "http://cdn.example.com/storage/transcode/hls/u1/v1/job1/master.m3u8"
        );
    }
}
