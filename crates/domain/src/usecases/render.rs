//! Formatting use case - frames the selected post for the destination wall

use crate::model::{Post, RenderedPost, TenantThemeConfig};
use crate::policy::clean_text;
use crate::ports::{pick, Chooser};

const ELLIPSIS: &str = "...";
const SOURCE_PLACEHOLDER: &str = "{source}";
const SOURCE_FALLBACK: &str = "the source";

/// Formatter for one (tenant, theme)
pub struct Formatter<'a, C: Chooser + ?Sized> {
    config: &'a TenantThemeConfig,
    chooser: &'a C,
}

impl<'a, C: Chooser + ?Sized> Formatter<'a, C> {
    pub fn new(config: &'a TenantThemeConfig, chooser: &'a C) -> Self {
        Self { config, chooser }
    }

    /// Build `title + body + attribution + "\n" + hashtag + closing`
    pub fn format(&self, post: &Post) -> RenderedPost {
        let signature = &self.config.signature;
        let url = self.config.canonical_url(post);
        let body = clean_text(&post.text, &self.config.strip_phrases);

        // Skip attribution when the body already links the origin
        let attribution = if body.contains(&url) {
            String::new()
        } else {
            format!("\n@{} ({})\n", url, self.attribution_phrase(post))
        };

        let head = signature.title.as_str();
        let tail = format!("{}\n{}{}", attribution, signature.hashtag, signature.closing);

        let text = match self.config.max_post_chars {
            Some(max) => fit(head, &body, &tail, max),
            None => format!("{}{}{}", head, body, tail),
        };

        RenderedPost {
            text,
            attachments: post
                .attachments
                .iter()
                .filter_map(|a| a.reference())
                .collect(),
            source_post_key: post.key(),
            source_url: url,
        }
    }

    fn attribution_phrase(&self, post: &Post) -> String {
        let source = self
            .config
            .source_name(post.owner_id)
            .unwrap_or(SOURCE_FALLBACK);
        match pick(self.chooser, &self.config.signature.attribution_phrases) {
            Some(phrase) => phrase.replace(SOURCE_PLACEHOLDER, source),
            None => source.to_string(),
        }
    }
}

/// Shorten the body so the framed text fits `max` chars; the frame itself is
/// cut only when it alone does not fit
fn fit(head: &str, body: &str, tail: &str, max: usize) -> String {
    let frame_len = head.chars().count() + tail.chars().count();
    let combined_len = frame_len + body.chars().count();
    if combined_len <= max {
        return format!("{}{}{}", head, body, tail);
    }

    let body_budget = max.saturating_sub(frame_len);
    if body_budget > ELLIPSIS.len() {
        return format!("{}{}{}", head, truncate_to_length(body, body_budget), tail);
    }

    truncate_to_length(&format!("{}{}{}", head, body, tail), max)
}

/// Truncate to `max_len` chars, preferring the preceding whitespace
fn truncate_to_length(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        return content.to_string();
    }
    if max_len <= ELLIPSIS.len() {
        return content.chars().take(max_len).collect();
    }

    let keep = max_len - ELLIPSIS.len();
    let prefix: String = content.chars().take(keep).collect();
    let break_point = prefix
        .rfind(char::is_whitespace)
        .filter(|&i| i > 0)
        .unwrap_or(prefix.len());

    format!("{}{}", prefix[..break_point].trim_end(), ELLIPSIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attachment, AttachmentKind};
    use crate::usecases::filter::tests::test_config;
    use time::macros::datetime;

    struct Fixed(usize);

    impl Chooser for Fixed {
        fn choose_index(&self, _len: usize) -> usize {
            self.0
        }
    }

    fn post(text: &str) -> Post {
        Post {
            id: 77,
            owner_id: -100,
            author_id: -100,
            text: text.to_string(),
            published_at: datetime!(2024-05-01 12:00 UTC),
            popularity: Some(10),
            attachments: vec![],
            reshared_from: None,
        }
    }

    #[test]
    fn test_format_frames_body_with_signature() {
        let config = test_config();
        let formatter = Formatter::new(&config, &Fixed(0));

        let rendered = formatter.format(&post("The bridge reopened."));

        assert_eq!(
            rendered.text,
            "Riverside news\nThe bridge reopened.\n@https://vk.com/wall-100_77 (via Riverside Today)\n\n#riverside\nStay tuned"
        );
        assert_eq!(rendered.source_post_key, "-100_77");
        assert_eq!(rendered.source_url, "https://vk.com/wall-100_77");
    }

    #[test]
    fn test_attribution_skipped_when_body_links_origin() {
        let config = test_config();
        let formatter = Formatter::new(&config, &Fixed(0));

        let rendered =
            formatter.format(&post("Details: https://vk.com/wall-100_77 inside"));

        assert_eq!(rendered.text.matches("vk.com/wall-100_77").count(), 1);
        assert!(!rendered.text.contains("via Riverside"));
    }

    #[test]
    fn test_attribution_phrase_is_picked_from_pool() {
        let mut config = test_config();
        config.signature.attribution_phrases =
            vec!["first".to_string(), "more at {source}".to_string()];
        let formatter = Formatter::new(&config, &Fixed(1));

        let rendered = formatter.format(&post("Body"));

        assert!(rendered.text.contains("(more at Riverside Today)"));
    }

    #[test]
    fn test_unknown_source_uses_fallback_name() {
        let config = test_config();
        let formatter = Formatter::new(&config, &Fixed(0));
        let mut p = post("Body");
        p.owner_id = -555;

        let rendered = formatter.format(&p);

        assert!(rendered.text.contains("(via the source)"));
    }

    #[test]
    fn test_body_is_cleaned() {
        let mut config = test_config();
        config.strip_phrases = vec!["Subscribe!".to_string()];
        let formatter = Formatter::new(&config, &Fixed(0));

        let rendered = formatter.format(&post("Road works  start today .\nSUBSCRIBE!"));

        assert!(rendered.text.starts_with("Riverside news\nRoad works start today.\n@"));
    }

    #[test]
    fn test_long_body_is_cut_at_whitespace() {
        let mut config = test_config();
        let frame = "Riverside news\n\n@https://vk.com/wall-100_77 (via Riverside Today)\n\n#riverside\nStay tuned";
        config.max_post_chars = Some(frame.chars().count() + 20);
        let formatter = Formatter::new(&config, &Fixed(0));

        let rendered = formatter.format(&post("alpha beta gamma delta epsilon zeta"));

        assert!(rendered.text.chars().count() <= frame.chars().count() + 20);
        assert!(rendered.text.contains("alpha beta gamma...\n@https"));
        assert!(rendered.text.ends_with("Stay tuned"));
    }

    #[test]
    fn test_frame_longer_than_limit_is_cut() {
        let mut config = test_config();
        config.max_post_chars = Some(30);
        let formatter = Formatter::new(&config, &Fixed(0));

        let rendered = formatter.format(&post("Пожар на складе потушен за два часа"));

        assert!(rendered.text.chars().count() <= 30);
        assert!(rendered.text.ends_with("..."));
    }

    #[test]
    fn test_attachments_keep_order_and_skip_other() {
        let config = test_config();
        let formatter = Formatter::new(&config, &Fixed(0));
        let mut p = post("Gallery");
        for (kind, id) in [
            (AttachmentKind::Video, 1),
            (AttachmentKind::Other, 2),
            (AttachmentKind::Photo, 3),
        ] {
            p.attachments.push(Attachment {
                kind,
                owner_id: -100,
                id,
                sizes: vec![],
            });
        }

        let rendered = formatter.format(&p);

        let refs: Vec<_> = rendered.attachments.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(refs, vec!["video-100_1", "photo-100_3"]);
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let cut = truncate_to_length("привет мир как дела", 12);

        assert_eq!(cut, "привет...");
        assert!(cut.chars().count() <= 12);
    }
}
