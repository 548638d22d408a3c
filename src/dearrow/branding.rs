use std::borrow::Cow;

use log::debug;
use serde::{Deserialize, Deserializer};
use serenity::model::channel::Embed;

use super::guild::{GuildConfig, OriginalTitleMode, ThumbnailMode};
use crate::regex;

/// Branding submissions of a single video, as ranked by the DeArrow API (best first).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BrandingResponse {
    #[serde(default)]
    pub titles: Vec<TitleSubmission>,
    #[serde(default)]
    pub thumbnails: Vec<ThumbnailSubmission>,
    #[serde(rename = "randomTime", default, deserialize_with = "null_as_default")]
    pub random_time: f64,
    #[serde(rename = "videoDuration", default)]
    pub video_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TitleSubmission {
    pub title: String,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub locked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ThumbnailSubmission {
    // `null` and a missing field are both "no timestamp". 0.0 is a real timestamp.
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub original: bool,
    #[serde(default)]
    pub locked: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// What to do with the preview image of a video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThumbnailReplacement {
    /// Keep the original image.
    NoChange,
    /// Remove the image.
    Blank,
    /// Render the frame at the given offset in seconds.
    At(f64),
}

impl ThumbnailReplacement {
    pub fn is_change(&self) -> bool {
        !matches!(self, ThumbnailReplacement::NoChange)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: Option<String>,
}

/// The fields of a received link preview the bot cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceEmbed {
    pub provider: Option<String>,
    pub url: Option<String>,
    pub title: String,
    pub author: Option<EmbedAuthor>,
    pub colour: Option<u32>,
    pub thumbnail_url: Option<String>,
}

impl From<&Embed> for SourceEmbed {
    fn from(embed: &Embed) -> Self {
        Self {
            provider: embed
                .provider
                .as_ref()
                .and_then(|provider| provider.name.clone()),
            url: embed.url.clone(),
            title: embed.title.clone().unwrap_or_default(),
            author: embed.author.as_ref().map(|author| EmbedAuthor {
                name: author.name.clone(),
                url: author.url.clone(),
            }),
            colour: embed.colour.map(|colour| colour.0),
            thumbnail_url: embed
                .thumbnail
                .as_ref()
                .map(|thumbnail| thumbnail.url.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedImage {
    None,
    Url(String),
    /// Filled by an uploaded file of this name.
    Attachment(String),
}

/// Embed posted in the reply. Plain value; converted into a serenity builder on send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementEmbed {
    pub author: Option<EmbedAuthor>,
    pub title: String,
    pub url: Option<String>,
    pub colour: Option<u32>,
    pub footer: Option<String>,
    pub image: EmbedImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementDecision {
    pub video_id: String,
    pub title: Option<String>,
    pub thumbnail: ThumbnailReplacement,
    pub embed: ReplacementEmbed,
}

pub fn thumbnail_file_name(video_id: &str) -> String {
    format!("thumbnail-{video_id}.webp")
}

/// Drops the `>` of the ">Word" emphasis convention used in crowd-sourced titles.
pub fn strip_arrows(title: &str) -> Cow<'_, str> {
    regex!(r"(^|\s)>(\S)").replace_all(title, "$1$2")
}

impl BrandingResponse {
    pub fn replacement_title(&self, original: &str) -> Option<&str> {
        let title = self.titles.first()?;
        if title.votes <= -1 {
            return None;
        }
        if (title.original && !title.locked) || title.title == original {
            return None;
        }

        Some(&title.title)
    }

    pub fn replacement_thumbnail(&self, mode: ThumbnailMode) -> ThumbnailReplacement {
        // A present but unusable top submission does not fall back to the guild mode.
        if let Some(thumbnail) = self.thumbnails.first() {
            return match thumbnail.timestamp {
                Some(_) if thumbnail.original && !thumbnail.locked => {
                    ThumbnailReplacement::NoChange
                }
                Some(timestamp) => ThumbnailReplacement::At(timestamp),
                None => ThumbnailReplacement::NoChange,
            };
        }

        match mode {
            ThumbnailMode::RandomTime => match self.video_duration {
                Some(duration) if duration != 0.0 => {
                    ThumbnailReplacement::At(self.random_time * duration)
                }
                _ => ThumbnailReplacement::NoChange,
            },
            ThumbnailMode::Blank => ThumbnailReplacement::Blank,
            ThumbnailMode::Original => ThumbnailReplacement::NoChange,
        }
    }

    /// Decides how the preview of `video_id` should be rewritten.
    ///
    /// Returns `None` when neither the title nor the thumbnail changes, in which
    /// case the video contributes nothing to the reply.
    pub fn replacement(
        &self,
        video_id: &str,
        config: &GuildConfig,
        source: &SourceEmbed,
    ) -> Option<ReplacementDecision> {
        let title = self
            .replacement_title(&source.title)
            .map(|title| strip_arrows(title).into_owned());
        let thumbnail = self.replacement_thumbnail(config.thumbnail_mode);
        if title.is_none() && !thumbnail.is_change() {
            debug!("nothing to replace for video {video_id}");
            return None;
        }

        let mut embed = ReplacementEmbed {
            author: source.author.clone(),
            title: source.title.clone(),
            url: source.url.clone(),
            colour: source.colour,
            footer: None,
            image: source
                .thumbnail_url
                .clone()
                .map_or(EmbedImage::None, EmbedImage::Url),
        };
        if let Some(title) = &title {
            if config.title_mode == OriginalTitleMode::Shown {
                embed.footer = Some(format!("Original title: {}", source.title));
            }
            embed.title = title.clone();
        }
        match thumbnail {
            ThumbnailReplacement::NoChange => {}
            ThumbnailReplacement::Blank => embed.image = EmbedImage::None,
            ThumbnailReplacement::At(_) => {
                embed.image = EmbedImage::Attachment(thumbnail_file_name(video_id))
            }
        }

        Some(ReplacementDecision {
            video_id: video_id.to_string(),
            title,
            thumbnail,
            embed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(text: &str, original: bool, votes: i64, locked: bool) -> TitleSubmission {
        TitleSubmission {
            title: text.to_string(),
            original,
            votes,
            locked,
        }
    }

    fn thumbnail(timestamp: Option<f64>, original: bool, locked: bool) -> ThumbnailSubmission {
        ThumbnailSubmission {
            timestamp,
            original,
            locked,
        }
    }

    fn source() -> SourceEmbed {
        SourceEmbed {
            provider: Some("YouTube".to_string()),
            url: Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string()),
            title: "Boring Video".to_string(),
            author: Some(EmbedAuthor {
                name: "Some Channel".to_string(),
                url: Some("https://www.youtube.com/@somechannel".to_string()),
            }),
            colour: Some(0xFF0000),
            thumbnail_url: Some("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string()),
        }
    }

    fn config(thumbnail_mode: ThumbnailMode) -> GuildConfig {
        GuildConfig {
            thumbnail_mode,
            title_mode: OriginalTitleMode::Shown,
        }
    }

    const VIDEO_ID: &str = "dQw4w9WgXcQ";

    #[test]
    fn decodes_api_payload() {
        let branding: BrandingResponse = serde_json::from_str(
            r#"{
                "titles": [{"title": "Better", "original": false, "votes": 2, "locked": true, "UUID": "x"}],
                "thumbnails": [{"timestamp": null, "original": true, "votes": 0, "locked": false}],
                "randomTime": 0.25,
                "videoDuration": null
            }"#,
        )
        .unwrap();

        assert_eq!(branding.titles, vec![title("Better", false, 2, true)]);
        assert_eq!(branding.thumbnails, vec![thumbnail(None, true, false)]);
        assert_eq!(branding.random_time, 0.25);
        assert_eq!(branding.video_duration, None);
    }

    #[test]
    fn decodes_zero_timestamp_and_null_random_time() {
        let branding: BrandingResponse = serde_json::from_str(
            r#"{"titles": [], "thumbnails": [{"timestamp": 0, "original": false, "locked": false}], "randomTime": null}"#,
        )
        .unwrap();

        assert_eq!(branding.thumbnails[0].timestamp, Some(0.0));
        assert_eq!(branding.random_time, 0.0);
    }

    #[test]
    fn empty_branding_skips_video_unless_blank() {
        let branding = BrandingResponse {
            random_time: 0.5,
            video_duration: Some(100.0),
            ..Default::default()
        };
        // RandomTime still applies with a known duration.
        assert!(branding
            .replacement(VIDEO_ID, &config(ThumbnailMode::RandomTime), &source())
            .is_some());
        assert!(branding
            .replacement(VIDEO_ID, &config(ThumbnailMode::Original), &source())
            .is_none());

        let unknown_duration = BrandingResponse::default();
        assert!(unknown_duration
            .replacement(VIDEO_ID, &config(ThumbnailMode::RandomTime), &source())
            .is_none());
        assert!(unknown_duration
            .replacement(VIDEO_ID, &config(ThumbnailMode::Original), &source())
            .is_none());

        let blank = unknown_duration
            .replacement(VIDEO_ID, &config(ThumbnailMode::Blank), &source())
            .unwrap();
        assert_eq!(blank.title, None);
        assert_eq!(blank.thumbnail, ThumbnailReplacement::Blank);
        assert_eq!(blank.embed.image, EmbedImage::None);
        assert_eq!(blank.embed.footer, None);
        assert_eq!(blank.embed.title, "Boring Video");
    }

    #[test]
    fn scenario_a_submitted_thumbnail_only() {
        let branding = BrandingResponse {
            thumbnails: vec![thumbnail(Some(5.0), false, false)],
            ..Default::default()
        };
        let decision = branding
            .replacement(VIDEO_ID, &config(ThumbnailMode::RandomTime), &source())
            .unwrap();

        assert_eq!(decision.title, None);
        assert_eq!(decision.thumbnail, ThumbnailReplacement::At(5.0));
        assert_eq!(
            decision.embed.image,
            EmbedImage::Attachment("thumbnail-dQw4w9WgXcQ.webp".to_string())
        );
        assert_eq!(decision.embed.footer, None);
    }

    #[test]
    fn scenario_b_title_with_emphasis_arrow() {
        let branding = BrandingResponse {
            titles: vec![title(">Cool! video", false, 3, false)],
            ..Default::default()
        };
        let decision = branding
            .replacement(VIDEO_ID, &config(ThumbnailMode::Original), &source())
            .unwrap();

        assert_eq!(decision.title.as_deref(), Some("Cool! video"));
        assert_eq!(decision.embed.title, "Cool! video");
        assert_eq!(
            decision.embed.footer.as_deref(),
            Some("Original title: Boring Video")
        );
        assert_eq!(decision.thumbnail, ThumbnailReplacement::NoChange);
        assert_eq!(
            decision.embed.image,
            EmbedImage::Url("https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg".to_string())
        );
    }

    #[test]
    fn hidden_title_mode_omits_caption() {
        let branding = BrandingResponse {
            titles: vec![title("Better title", false, 0, false)],
            ..Default::default()
        };
        let decision = branding
            .replacement(
                VIDEO_ID,
                &GuildConfig {
                    thumbnail_mode: ThumbnailMode::Original,
                    title_mode: OriginalTitleMode::Hidden,
                },
                &source(),
            )
            .unwrap();

        assert_eq!(decision.embed.title, "Better title");
        assert_eq!(decision.embed.footer, None);
    }

    #[test]
    fn scenario_c_random_time_uses_duration() {
        let branding = BrandingResponse {
            random_time: 0.5,
            video_duration: Some(200.0),
            ..Default::default()
        };

        assert_eq!(
            branding.replacement_thumbnail(ThumbnailMode::RandomTime),
            ThumbnailReplacement::At(100.0)
        );
    }

    #[test]
    fn scenario_d_random_time_without_duration() {
        for video_duration in [None, Some(0.0)] {
            let branding = BrandingResponse {
                random_time: 0.5,
                video_duration,
                ..Default::default()
            };
            assert!(branding
                .replacement(VIDEO_ID, &config(ThumbnailMode::RandomTime), &source())
                .is_none());
        }
    }

    #[test]
    fn scenario_e_distrusted_title_in_original_mode() {
        let branding = BrandingResponse {
            titles: vec![title("X", false, -1, false)],
            ..Default::default()
        };

        assert!(branding
            .replacement(VIDEO_ID, &config(ThumbnailMode::Original), &source())
            .is_none());
    }

    #[test]
    fn downvoted_titles_are_never_used() {
        for (original, locked) in [(false, false), (false, true), (true, true), (true, false)] {
            for votes in [-1, -5] {
                let branding = BrandingResponse {
                    titles: vec![title("Other", original, votes, locked)],
                    ..Default::default()
                };
                assert_eq!(branding.replacement_title("Boring Video"), None);
            }
        }
    }

    #[test]
    fn zero_votes_are_trusted() {
        let branding = BrandingResponse {
            titles: vec![title("Other", false, 0, false)],
            ..Default::default()
        };

        assert_eq!(branding.replacement_title("Boring Video"), Some("Other"));
    }

    #[test]
    fn original_title_markers() {
        let unlocked = BrandingResponse {
            titles: vec![title("Boring Video (orig)", true, 10, false)],
            ..Default::default()
        };
        assert_eq!(unlocked.replacement_title("Boring Video"), None);

        // A locked "original" entry is authoritative text and still replaces.
        let locked = BrandingResponse {
            titles: vec![title("Boring video", true, 10, true)],
            ..Default::default()
        };
        assert_eq!(locked.replacement_title("Boring Video"), Some("Boring video"));

        let same = BrandingResponse {
            titles: vec![title("Boring Video", false, 10, true)],
            ..Default::default()
        };
        assert_eq!(same.replacement_title("Boring Video"), None);
    }

    #[test]
    fn unusable_top_thumbnail_does_not_fall_back_to_mode() {
        let original = BrandingResponse {
            thumbnails: vec![thumbnail(Some(12.0), true, false)],
            video_duration: Some(300.0),
            random_time: 0.1,
            ..Default::default()
        };
        for mode in [
            ThumbnailMode::RandomTime,
            ThumbnailMode::Blank,
            ThumbnailMode::Original,
        ] {
            assert_eq!(
                original.replacement_thumbnail(mode),
                ThumbnailReplacement::NoChange
            );
        }

        let missing_timestamp = BrandingResponse {
            thumbnails: vec![thumbnail(None, false, true)],
            ..Default::default()
        };
        assert_eq!(
            missing_timestamp.replacement_thumbnail(ThumbnailMode::Blank),
            ThumbnailReplacement::NoChange
        );
    }

    #[test]
    fn locked_original_thumbnail_and_zero_timestamp() {
        let locked = BrandingResponse {
            thumbnails: vec![thumbnail(Some(42.5), true, true)],
            ..Default::default()
        };
        assert_eq!(
            locked.replacement_thumbnail(ThumbnailMode::Original),
            ThumbnailReplacement::At(42.5)
        );

        let zero = BrandingResponse {
            thumbnails: vec![thumbnail(Some(0.0), false, false)],
            ..Default::default()
        };
        assert_eq!(
            zero.replacement_thumbnail(ThumbnailMode::Original),
            ThumbnailReplacement::At(0.0)
        );
    }

    #[test]
    fn arrow_stripping() {
        assert_eq!(strip_arrows("Plain title"), "Plain title");
        assert!(matches!(strip_arrows("Plain title"), Cow::Borrowed(_)));
        assert_eq!(strip_arrows(">Huge news"), "Huge news");
        assert_eq!(strip_arrows("This is >Huge and >big"), "This is Huge and big");
        assert_eq!(strip_arrows("5 > 3"), "5 > 3");
        assert_eq!(strip_arrows("a>b"), "a>b");
        assert_eq!(strip_arrows("> spaced"), "> spaced");
    }

    #[test]
    fn decision_is_deterministic() {
        let branding = BrandingResponse {
            titles: vec![title(">Better", false, 1, false)],
            thumbnails: vec![thumbnail(Some(3.25), false, false)],
            random_time: 0.3,
            video_duration: Some(10.0),
        };
        let first = branding.replacement(VIDEO_ID, &config(ThumbnailMode::Blank), &source());
        let second = branding.replacement(VIDEO_ID, &config(ThumbnailMode::Blank), &source());

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn embed_keeps_source_identity() {
        let branding = BrandingResponse {
            titles: vec![title("Better", false, 1, false)],
            ..Default::default()
        };
        let decision = branding
            .replacement(VIDEO_ID, &config(ThumbnailMode::Original), &source())
            .unwrap();
        let source = source();

        assert_eq!(decision.embed.author, source.author);
        assert_eq!(decision.embed.url, source.url);
        assert_eq!(decision.embed.colour, source.colour);
    }
}
