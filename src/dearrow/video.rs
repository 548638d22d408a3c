use reqwest::Url;

use super::branding::SourceEmbed;
use crate::regex;

pub const VIDEO_PROVIDER: &str = "YouTube";

fn is_video_id(candidate: &str) -> bool {
    regex!("^[a-zA-Z0-9_-]{11}$").is_match(candidate)
}

/// Reads the video id out of a watch URL (`?v=`) or a short/shorts link path.
pub fn video_id_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
        return is_video_id(&id).then(|| id.into_owned());
    }

    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    is_video_id(last).then(|| last.to_string())
}

/// Video id of an embed from the recognized provider.
pub fn video_id_from_embed(embed: &SourceEmbed) -> Option<String> {
    if embed.provider.as_deref() != Some(VIDEO_PROVIDER) {
        return None;
    }

    video_id_from_url(embed.url.as_deref()?)
}

/// First thing that looks like a video id in free text.
pub fn find_video_id(text: &str) -> Option<&str> {
    regex!(r"[a-zA-Z0-9_-]{11}\b")
        .find(text)
        .map(|found| found.as_str())
}
