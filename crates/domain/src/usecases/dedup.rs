//! Deduplication checks against the working set and recent destination texts

use std::collections::HashSet;

use thiserror::Error;

use crate::model::{
    AttachmentKind, Candidate, Fingerprint, FingerprintMode, ImageHash, PhotoSize, Post,
    WorkingSet,
};
use crate::policy::normalize;
use crate::ports::ImageFetcher;
use crate::short_digest;

/// Overlap probes shorter than this are too generic to compare
pub const MIN_PROBE_CHARS: usize = 12;

const PROBE_START_PERCENT: usize = 20;
const PROBE_END_PERCENT: usize = 70;

const PREFERRED_MIN_WIDTH: u32 = 200;
const PREFERRED_MAX_WIDTH: u32 = 650;

/// Why a candidate counts as already shown
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Duplicate {
    #[error("fingerprint {0} already seen")]
    Fingerprint(Fingerprint),
    #[error("text overlaps a recent destination post")]
    Overlap,
    #[error("image {0} already seen")]
    Image(ImageHash),
}

impl Duplicate {
    pub fn code(&self) -> &'static str {
        match self {
            Duplicate::Fingerprint(_) => "duplicate_fingerprint",
            Duplicate::Overlap => "duplicate_overlap",
            Duplicate::Image(_) => "duplicate_image",
        }
    }
}

/// Fingerprint of a resolved post
///
/// Text mode falls back to the origin key when the post has no text, so
/// media-only posts never collide on the digest of an empty string.
pub fn fingerprint(post: &Post, mode: FingerprintMode) -> Fingerprint {
    let origin = || Fingerprint(format!("{}_{}", post.owner_id.abs(), post.id));
    match mode {
        FingerprintMode::Origin => origin(),
        FingerprintMode::Text => {
            let normalized = normalize(&post.text);
            if normalized.is_empty() {
                origin()
            } else {
                Fingerprint(short_digest(&[normalized.as_bytes()], 16))
            }
        }
    }
}

/// Inner slice of the normalized text used for partial-overlap detection
pub fn overlap_probe(text: &str) -> Option<String> {
    let chars: Vec<char> = normalize(text).chars().collect();
    let start = chars.len() * PROBE_START_PERCENT / 100;
    let end = chars.len() * PROBE_END_PERCENT / 100;
    if end.saturating_sub(start) < MIN_PROBE_CHARS {
        return None;
    }
    Some(chars[start..end].iter().collect())
}

/// Normalized concatenation of recently published destination texts
#[derive(Debug, Clone, Default)]
pub struct OverlapIndex {
    corpus: String,
}

impl OverlapIndex {
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for text in texts {
            index.push(text.as_ref());
        }
        index
    }

    pub fn push(&mut self, text: &str) {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return;
        }
        if !self.corpus.is_empty() {
            self.corpus.push(' ');
        }
        self.corpus.push_str(&normalized);
    }

    /// Whether the candidate's probe slice already appears in the corpus
    pub fn overlaps(&self, text: &str) -> bool {
        if self.corpus.is_empty() {
            return false;
        }
        overlap_probe(text)
            .map(|probe| self.corpus.contains(&probe))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

/// Representative image of a post: a size variant of its leading photo,
/// or the leading frame of a leading video
pub fn representative_image(post: &Post) -> Option<&PhotoSize> {
    let leading = post.attachments.first()?;
    match leading.kind {
        AttachmentKind::Photo | AttachmentKind::Video => pick_size(&leading.sizes),
        _ => None,
    }
}

fn pick_size(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .filter(|s| (PREFERRED_MIN_WIDTH..=PREFERRED_MAX_WIDTH).contains(&s.width))
        .max_by_key(|s| s.area())
        .or_else(|| sizes.iter().max_by_key(|s| s.area()))
}

/// Hash of the decoded image's per-channel pixel histogram
///
/// Re-encodings of the same picture hash alike. Returns `None` when the
/// bytes are not a decodable image.
pub fn image_hash(bytes: &[u8]) -> Option<ImageHash> {
    let decoded = match image::load_from_memory(bytes) {
        Ok(decoded) => decoded,
        Err(error) => {
            tracing::debug!(error = %error, "Image decode failed");
            return None;
        }
    };

    let mut histogram = [[0u32; 256]; 3];
    for pixel in decoded.to_rgb8().pixels() {
        for (channel, value) in pixel.0.iter().enumerate() {
            histogram[channel][usize::from(*value)] += 1;
        }
    }
    let buckets: Vec<u8> = histogram
        .iter()
        .flatten()
        .flat_map(|count| count.to_le_bytes())
        .collect();
    Some(ImageHash(short_digest(&[&buckets], 32)))
}

/// Serialized dedup checks for one cycle
///
/// Candidates must be admitted one at a time: everything admitted earlier in
/// the same cycle is treated as already seen.
pub struct DedupGuard<'a, I: ImageFetcher + ?Sized> {
    working_set: &'a WorkingSet,
    overlap: OverlapIndex,
    images: &'a I,
    mode: FingerprintMode,
    admitted_fingerprints: HashSet<Fingerprint>,
    admitted_hashes: HashSet<ImageHash>,
}

impl<'a, I: ImageFetcher + ?Sized> DedupGuard<'a, I> {
    pub fn new(
        working_set: &'a WorkingSet,
        overlap: OverlapIndex,
        images: &'a I,
        mode: FingerprintMode,
    ) -> Self {
        Self {
            working_set,
            overlap,
            images,
            mode,
            admitted_fingerprints: HashSet::new(),
            admitted_hashes: HashSet::new(),
        }
    }

    /// Check a filtered post; the image is only fetched once the cheaper
    /// text checks have passed.
    pub async fn admit(&mut self, post: &Post) -> Result<Candidate, Duplicate> {
        let fingerprint = fingerprint(post, self.mode);
        if self.working_set.contains_fingerprint(&fingerprint)
            || self.admitted_fingerprints.contains(&fingerprint)
        {
            return Err(Duplicate::Fingerprint(fingerprint));
        }

        if self.overlap.overlaps(&post.text) {
            return Err(Duplicate::Overlap);
        }

        let image_hash = self.hash_representative_image(post).await;
        if let Some(hash) = &image_hash {
            if self.working_set.contains_image_hash(hash) || self.admitted_hashes.contains(hash) {
                return Err(Duplicate::Image(hash.clone()));
            }
        }

        self.admitted_fingerprints.insert(fingerprint.clone());
        if let Some(hash) = &image_hash {
            self.admitted_hashes.insert(hash.clone());
        }
        self.overlap.push(&post.text);

        Ok(Candidate {
            post: post.clone(),
            fingerprint,
            image_hash,
        })
    }

    async fn hash_representative_image(&self, post: &Post) -> Option<ImageHash> {
        let size = representative_image(post)?;
        match self.images.fetch_image(&size.url).await {
            Ok(bytes) if !bytes.is_empty() => {
                let hash = image_hash(&bytes);
                if hash.is_none() {
                    tracing::warn!(
                        post_key = %post.key(),
                        url = %size.url,
                        "Undecodable image, skipping image dedup"
                    );
                }
                hash
            }
            Ok(_) => {
                tracing::warn!(post_key = %post.key(), url = %size.url, "Empty image body");
                None
            }
            Err(e) => {
                tracing::warn!(
                    post_key = %post.key(),
                    url = %size.url,
                    error = %e,
                    "Image fetch failed, skipping image dedup"
                );
                None
            }
        }
    }
}
