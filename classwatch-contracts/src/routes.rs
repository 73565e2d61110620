macro_rules! watch_path {
    ($path:literal) => {
        concat!("/video-watch", $path)
    };
}

/// Watch-tracking routes, relative to the configured API prefix.
pub mod video_watch {
    pub const ROOT: &str = "/video-watch";

    pub const START: &str = watch_path!("/start");
    pub const PROGRESS: &str = watch_path!("/progress/{watch_id}");
    /// Also the target of unload beacons.
    pub const END: &str = watch_path!("/end/{watch_id}");
    pub const RESET: &str = watch_path!("/reset");
    pub const VIEW_COUNT: &str = watch_path!("/views/{classroom_id}/{video_id}");
}

/// Substitute `{name}` placeholders in a route template.
///
/// Values are percent-encoded for use inside a single path segment.
pub fn fill(template: &str, params: &[(&str, &str)]) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{name}}}"), &encode_segment(value))
    })
}

fn encode_segment(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
