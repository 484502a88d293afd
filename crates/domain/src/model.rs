//! Domain models and value objects

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use time::{Duration, OffsetDateTime};

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Photo,
    Video,
    Audio,
    Other,
}

impl AttachmentKind {
    /// Prefix the platform uses in attachment references (`photo-1_2`)
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Video => "video",
            AttachmentKind::Audio => "audio",
            AttachmentKind::Other => "other",
        }
    }
}

/// One rendition of an image (photo size variant or video preview frame)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub width: u32,
    pub height: u32,
    pub url: String,
}

impl PhotoSize {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Media attached to a post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub owner_id: i64,
    pub id: i64,
    /// Photo size variants, or preview frames for videos
    #[serde(default)]
    pub sizes: Vec<PhotoSize>,
}

impl Attachment {
    /// Platform-native reference used to repost the attachment without re-uploading it
    pub fn reference(&self) -> Option<AttachmentRef> {
        match self.kind {
            AttachmentKind::Other => None,
            kind => Some(AttachmentRef(format!(
                "{}{}_{}",
                kind.as_str(),
                self.owner_id,
                self.id
            ))),
        }
    }
}

/// Reference to an attachment on the platform, e.g. `photo-42_7`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentRef(pub String);

impl fmt::Display for AttachmentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A candidate post read from a source community wall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Post id, unique within its owner
    pub id: i64,
    /// Wall the post lives on (negative for communities)
    pub owner_id: i64,
    /// Account that wrote the post
    pub author_id: i64,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    /// View count, when the platform reports one
    #[serde(default)]
    pub popularity: Option<u64>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Present when this post reshares another one
    #[serde(default)]
    pub reshared_from: Option<Box<Post>>,
}

impl Post {
    /// `owner_id`_`id`, used in logs and outbox entries
    pub fn key(&self) -> String {
        format!("{}_{}", self.owner_id, self.id)
    }

    /// Whether the post carries at least one attachment that can be reposted by reference
    pub fn has_repostable_attachments(&self) -> bool {
        self.attachments
            .iter()
            .any(|a| a.kind != AttachmentKind::Other)
    }

    /// Innermost post of the inline reshare chain, with the number of hops taken
    pub fn innermost_inline(&self) -> (&Post, usize) {
        let mut current = self;
        let mut hops = 0;
        while let Some(inner) = current.reshared_from.as_deref() {
            current = inner;
            hops += 1;
        }
        (current, hops)
    }
}

/// How a raw post was resolved to its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The post was not a reshare
    Original,
    /// The reshare chain was followed to its origin
    Resolved { hops: usize },
    /// The origin could not be fetched; the post carries the envelope's own content
    Unresolved { reason: String },
}

/// A post after reshare resolution, ready for the filter chain
///
/// `post` never carries `reshared_from`. Its `text`, `attachments`, `id`,
/// `owner_id` and `author_id` come from the origin; `published_at` and
/// `popularity` come from the top-level post as it appeared in the source wall.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPost {
    pub post: Post,
    /// Wall the top-level post appeared on
    pub envelope_owner_id: i64,
    /// Account that wrote the top-level post
    pub envelope_author_id: i64,
    pub resolution: Resolution,
}

impl ResolvedPost {
    /// Wrap a post that is not a reshare
    pub fn original(mut post: Post) -> Self {
        post.reshared_from = None;
        Self {
            envelope_owner_id: post.owner_id,
            envelope_author_id: post.author_id,
            post,
            resolution: Resolution::Original,
        }
    }

    /// Combine the top-level envelope with the fetched origin
    pub fn resolved(envelope: &Post, origin: Post, hops: usize) -> Self {
        let post = Post {
            id: origin.id,
            owner_id: origin.owner_id,
            author_id: origin.author_id,
            text: origin.text,
            published_at: envelope.published_at,
            popularity: envelope.popularity,
            attachments: origin.attachments,
            reshared_from: None,
        };
        Self {
            post,
            envelope_owner_id: envelope.owner_id,
            envelope_author_id: envelope.author_id,
            resolution: Resolution::Resolved { hops },
        }
    }

    /// Keep the envelope's own content and mark the reshare as unresolved
    pub fn unresolved(mut envelope: Post, reason: impl Into<String>) -> Self {
        envelope.reshared_from = None;
        Self {
            envelope_owner_id: envelope.owner_id,
            envelope_author_id: envelope.author_id,
            post: envelope,
            resolution: Resolution::Unresolved {
                reason: reason.into(),
            },
        }
    }

    /// Unwrap using only the inline chain, without fetching anything
    ///
    /// Used for the destination wall's own recent posts, whose content is only
    /// needed for overlap detection.
    pub fn inline(envelope: Post) -> Self {
        let (origin, hops) = envelope.innermost_inline();
        if hops == 0 {
            return Self::original(envelope);
        }
        let origin = origin.clone();
        Self::resolved(&envelope, origin, hops)
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.resolution, Resolution::Unresolved { .. })
    }
}

/// Text-dedup identity of a resolved post
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-derived hash of a representative image
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageHash(pub String);

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How fingerprints are derived for a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// Origin owner and post id
    #[default]
    Origin,
    /// Digest of the normalized text
    Text,
}

/// Persisted dedup history for one (tenant, theme) pair
///
/// Both collections are ordered oldest-first and bounded to `history_limit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingSet {
    pub tenant: String,
    pub theme: String,
    pub history_limit: usize,
    pub fingerprints: VecDeque<Fingerprint>,
    pub image_hashes: VecDeque<ImageHash>,
    /// Optimistic-concurrency version; 0 means never saved
    pub version: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl WorkingSet {
    /// An empty, never-saved working set
    pub fn empty(tenant: impl Into<String>, theme: impl Into<String>, history_limit: usize) -> Self {
        Self {
            tenant: tenant.into(),
            theme: theme.into(),
            history_limit,
            fingerprints: VecDeque::new(),
            image_hashes: VecDeque::new(),
            version: 0,
            updated_at: None,
        }
    }

    /// Apply a (possibly changed) history limit, evicting the oldest entries
    pub fn with_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        trim_oldest(&mut self.fingerprints, history_limit);
        trim_oldest(&mut self.image_hashes, history_limit);
        self
    }

    pub fn contains_fingerprint(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn contains_image_hash(&self, hash: &ImageHash) -> bool {
        self.image_hashes.contains(hash)
    }

    /// Append a fingerprint, evicting the oldest entry when full.
    /// Returns false when the fingerprint was already present.
    pub fn record_fingerprint(&mut self, fingerprint: Fingerprint) -> bool {
        push_bounded(&mut self.fingerprints, fingerprint, self.history_limit)
    }

    /// Append an image hash, evicting the oldest entry when full.
    /// Returns false when the hash was already present.
    pub fn record_image_hash(&mut self, hash: ImageHash) -> bool {
        push_bounded(&mut self.image_hashes, hash, self.history_limit)
    }

    /// Record everything known about a published post
    pub fn record(&mut self, fingerprint: Fingerprint, image_hash: Option<ImageHash>) {
        self.record_fingerprint(fingerprint);
        if let Some(hash) = image_hash {
            self.record_image_hash(hash);
        }
    }
}

fn push_bounded<T: PartialEq>(entries: &mut VecDeque<T>, item: T, limit: usize) -> bool {
    if entries.contains(&item) {
        return false;
    }
    while !entries.is_empty() && entries.len() >= limit {
        entries.pop_front();
    }
    if limit > 0 {
        entries.push_back(item);
    }
    true
}

fn trim_oldest<T>(entries: &mut VecDeque<T>, limit: usize) {
    while entries.len() > limit {
        entries.pop_front();
    }
}

/// Identifies one (tenant, theme) pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantThemeKey {
    pub tenant: String,
    pub theme: String,
}

impl TenantThemeKey {
    pub fn new(tenant: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            theme: theme.into(),
        }
    }
}

impl fmt::Display for TenantThemeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.theme)
    }
}

/// Freshness class of a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeClass {
    Urgent,
    #[default]
    Standard,
    Relaxed,
}

/// Maximum post age per age class, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeThresholds {
    pub urgent_secs: i64,
    pub standard_secs: i64,
    pub relaxed_secs: i64,
}

impl Default for AgeThresholds {
    fn default() -> Self {
        Self {
            urgent_secs: 3_600,
            standard_secs: 7_200,
            relaxed_secs: 14_400,
        }
    }
}

impl AgeThresholds {
    pub fn threshold(&self, class: AgeClass) -> Duration {
        let secs = match class {
            AgeClass::Urgent => self.urgent_secs,
            AgeClass::Standard => self.standard_secs,
            AgeClass::Relaxed => self.relaxed_secs,
        };
        Duration::seconds(secs)
    }
}

/// A community wall candidates are read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub id: i64,
    /// Display name used in attributions
    pub name: String,
    /// Anyone can post on this wall; only posts by the wall itself are taken
    #[serde(default)]
    pub open: bool,
}

/// Which source groups are read in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceSampling {
    #[default]
    All,
    RandomOne,
}

/// Structural requirement of a theme
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThemeRule {
    #[default]
    Any,
    /// At least one attachment of one of the listed kinds
    Media { kinds: Vec<AttachmentKind> },
    /// Text no longer than `max_chars`
    ShortForm { max_chars: usize },
    /// Text must contain the marker hashtag
    MarkerHashtag { tag: String },
}

/// Exclusive character-count bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: usize,
    pub max: usize,
}

impl LengthBounds {
    pub fn contains(&self, len: usize) -> bool {
        self.min < len && len < self.max
    }
}

/// Text framing constants of a tenant/theme
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub hashtag: String,
    #[serde(default)]
    pub closing: String,
    /// Phrases shown next to the attribution link; `{source}` is replaced with the group name
    #[serde(default)]
    pub attribution_phrases: Vec<String>,
}

/// Immutable configuration of one (tenant, theme) run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantThemeConfig {
    pub tenant: String,
    pub theme: String,
    pub sources: Vec<SourceGroup>,
    pub sampling: SourceSampling,
    /// Posts read per source group
    pub fetch_count: u32,
    /// Destination wall id
    pub destination: i64,
    pub blacklist: Vec<String>,
    pub global_blacklist: Vec<String>,
    /// Origin owners whose content is never taken
    pub deny_sources: Vec<i64>,
    pub age_class: AgeClass,
    pub age_thresholds: AgeThresholds,
    pub rule: ThemeRule,
    /// Bounds for posts without attachments; `None` rejects them
    pub text_only: Option<LengthBounds>,
    /// Phrases removed from bodies before framing
    pub strip_phrases: Vec<String>,
    pub signature: Signature,
    pub max_post_chars: Option<usize>,
    pub history_limit: usize,
    pub fingerprint_mode: FingerprintMode,
    /// Recent destination posts scanned for partial-overlap duplicates
    pub recent_window: u32,
    pub read_accounts: Vec<String>,
    pub write_account: String,
    /// Prefix of canonical post URLs, e.g. `https://vk.com/wall`
    pub canonical_url_base: String,
}

impl TenantThemeConfig {
    pub fn key(&self) -> TenantThemeKey {
        TenantThemeKey::new(&self.tenant, &self.theme)
    }

    pub fn max_age(&self) -> Duration {
        self.age_thresholds.threshold(self.age_class)
    }

    /// Display name of a configured source group
    pub fn source_name(&self, owner_id: i64) -> Option<&str> {
        self.sources
            .iter()
            .find(|g| g.id.abs() == owner_id.abs())
            .map(|g| g.name.as_str())
    }

    pub fn is_open_group(&self, owner_id: i64) -> bool {
        self.sources
            .iter()
            .any(|g| g.open && g.id.abs() == owner_id.abs())
    }

    pub fn is_denied(&self, owner_id: i64) -> bool {
        self.deny_sources
            .iter()
            .any(|denied| denied.abs() == owner_id.abs())
    }

    /// Canonical URL of a post on the source platform
    pub fn canonical_url(&self, post: &Post) -> String {
        format!("{}{}_{}", self.canonical_url_base, post.owner_id, post.id)
    }
}

/// A post that passed filtering and dedup checks
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub post: Post,
    pub fingerprint: Fingerprint,
    pub image_hash: Option<ImageHash>,
}

impl Candidate {
    pub fn popularity(&self) -> u64 {
        self.post.popularity.unwrap_or(0)
    }
}

/// Formatted content ready for publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPost {
    pub text: String,
    pub attachments: Vec<AttachmentRef>,
    /// Key of the origin post
    pub source_post_key: String,
    pub source_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn post(id: i64) -> Post {
        Post {
            id,
            owner_id: -10,
            author_id: -10,
            text: format!("post {id}"),
            published_at: datetime!(2024-05-01 12:00 UTC),
            popularity: Some(5),
            attachments: vec![],
            reshared_from: None,
        }
    }

    fn fp(value: &str) -> Fingerprint {
        Fingerprint(value.to_string())
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut set = WorkingSet::empty("t", "news", 3);

        assert!(set.record_fingerprint(fp("a")));
        assert!(!set.record_fingerprint(fp("a")));

        assert!(set.contains_fingerprint(&fp("a")));
        assert_eq!(set.fingerprints.len(), 1);
    }

    #[test]
    fn test_record_evicts_oldest_first() {
        let mut set = WorkingSet::empty("t", "news", 3);

        for marker in ["m1", "m2", "m3", "m4", "m5"] {
            set.record_fingerprint(fp(marker));
            assert!(set.fingerprints.len() <= 3);
        }

        let remaining: Vec<_> = set.fingerprints.iter().map(|f| f.0.as_str()).collect();
        assert_eq!(remaining, vec!["m3", "m4", "m5"]);
        assert!(!set.contains_fingerprint(&fp("m1")));
    }

    #[test]
    fn test_image_hashes_are_bounded_independently() {
        let mut set = WorkingSet::empty("t", "news", 2);

        set.record(fp("a"), Some(ImageHash("h1".into())));
        set.record(fp("b"), None);
        set.record(fp("c"), Some(ImageHash("h2".into())));
        set.record(fp("d"), Some(ImageHash("h3".into())));

        assert_eq!(set.fingerprints.len(), 2);
        let hashes: Vec<_> = set.image_hashes.iter().map(|h| h.0.as_str()).collect();
        assert_eq!(hashes, vec!["h2", "h3"]);
    }

    #[test]
    fn test_with_limit_trims_oldest() {
        let mut set = WorkingSet::empty("t", "news", 5);
        for marker in ["a", "b", "c", "d"] {
            set.record_fingerprint(fp(marker));
        }

        let set = set.with_limit(2);

        let remaining: Vec<_> = set.fingerprints.iter().map(|f| f.0.as_str()).collect();
        assert_eq!(remaining, vec!["c", "d"]);
    }

    #[test]
    fn test_attachment_reference() {
        let photo = Attachment {
            kind: AttachmentKind::Photo,
            owner_id: -42,
            id: 7,
            sizes: vec![],
        };
        let other = Attachment {
            kind: AttachmentKind::Other,
            ..photo.clone()
        };

        assert_eq!(photo.reference(), Some(AttachmentRef("photo-42_7".into())));
        assert_eq!(other.reference(), None);
    }

    #[test]
    fn test_resolved_takes_content_from_origin_and_timing_from_envelope() {
        let mut origin = post(1);
        origin.owner_id = -99;
        origin.author_id = 555;
        origin.text = "origin text".into();
        origin.popularity = Some(1);
        origin.published_at = datetime!(2024-04-01 00:00 UTC);

        let mut envelope = post(2);
        envelope.popularity = Some(300);
        envelope.reshared_from = Some(Box::new(origin.clone()));

        let resolved = ResolvedPost::resolved(&envelope, origin, 1);

        assert_eq!(resolved.post.id, 1);
        assert_eq!(resolved.post.owner_id, -99);
        assert_eq!(resolved.post.text, "origin text");
        assert_eq!(resolved.post.popularity, Some(300));
        assert_eq!(resolved.post.published_at, envelope.published_at);
        assert_eq!(resolved.envelope_owner_id, -10);
        assert!(resolved.post.reshared_from.is_none());
    }

    #[test]
    fn test_inline_unwraps_nested_chain() {
        let mut inner = post(1);
        inner.text = "innermost".into();
        let mut middle = post(2);
        middle.reshared_from = Some(Box::new(inner));
        let mut outer = post(3);
        outer.reshared_from = Some(Box::new(middle));

        let resolved = ResolvedPost::inline(outer);

        assert_eq!(resolved.post.text, "innermost");
        assert_eq!(resolved.resolution, Resolution::Resolved { hops: 2 });
    }
}
