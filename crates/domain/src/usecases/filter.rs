//! Filter chain - pure predicates over resolved posts

use thiserror::Error;
use time::OffsetDateTime;

use crate::model::{Resolution, ResolvedPost, TenantThemeConfig, ThemeRule};
use crate::policy::Blacklist;

/// Why a post was rejected by the filter chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("too old: {age_secs}s >= {max_secs}s")]
    TooOld { age_secs: i64, max_secs: i64 },
    #[error("unresolved reshare: {reason}")]
    UnresolvedReshare { reason: String },
    #[error("blacklisted term '{term}'")]
    Blacklisted { term: String },
    #[error("denied source {owner_id}")]
    DeniedSource { owner_id: i64 },
    #[error("author {author_id} is not the open group {owner_id}")]
    ForeignAuthor { author_id: i64, owner_id: i64 },
    #[error("text-only post of {len} chars")]
    TextOnly { len: usize },
    #[error("no attachment of a required media kind")]
    MissingMedia,
    #[error("text too long: {len} > {max}")]
    TooLong { len: usize, max: usize },
    #[error("marker '{tag}' missing")]
    MissingMarker { tag: String },
}

impl Rejection {
    /// Short stable code for structured logs
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::TooOld { .. } => "too_old",
            Rejection::UnresolvedReshare { .. } => "unresolved_reshare",
            Rejection::Blacklisted { .. } => "blacklisted",
            Rejection::DeniedSource { .. } => "denied_source",
            Rejection::ForeignAuthor { .. } => "foreign_author",
            Rejection::TextOnly { .. } => "text_only",
            Rejection::MissingMedia => "missing_media",
            Rejection::TooLong { .. } => "too_long",
            Rejection::MissingMarker { .. } => "missing_marker",
        }
    }
}

/// Ordered predicates of one (tenant, theme); the first failure wins
pub struct FilterChain<'a> {
    config: &'a TenantThemeConfig,
    blacklist: Blacklist,
}

impl<'a> FilterChain<'a> {
    pub fn new(config: &'a TenantThemeConfig) -> Self {
        Self {
            blacklist: Blacklist::new(&config.blacklist, &config.global_blacklist),
            config,
        }
    }

    /// Check every predicate in order: freshness, resolution, blacklist,
    /// source allow/deny, then theme shape.
    pub fn check(&self, candidate: &ResolvedPost, now: OffsetDateTime) -> Result<(), Rejection> {
        self.check_freshness(candidate, now)?;
        self.check_resolution(candidate)?;
        self.check_blacklist(candidate)?;
        self.check_source(candidate)?;
        self.check_shape(candidate)
    }

    pub fn accepts(&self, candidate: &ResolvedPost, now: OffsetDateTime) -> bool {
        self.check(candidate, now).is_ok()
    }

    fn check_freshness(
        &self,
        candidate: &ResolvedPost,
        now: OffsetDateTime,
    ) -> Result<(), Rejection> {
        let age = now - candidate.post.published_at;
        let max_age = self.config.max_age();
        if age < max_age {
            Ok(())
        } else {
            Err(Rejection::TooOld {
                age_secs: age.whole_seconds(),
                max_secs: max_age.whole_seconds(),
            })
        }
    }

    fn check_resolution(&self, candidate: &ResolvedPost) -> Result<(), Rejection> {
        match &candidate.resolution {
            Resolution::Unresolved { reason } => Err(Rejection::UnresolvedReshare {
                reason: reason.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn check_blacklist(&self, candidate: &ResolvedPost) -> Result<(), Rejection> {
        match self.blacklist.find(&candidate.post.text) {
            Some(term) => Err(Rejection::Blacklisted {
                term: term.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn check_source(&self, candidate: &ResolvedPost) -> Result<(), Rejection> {
        if self.config.is_denied(candidate.post.owner_id) {
            return Err(Rejection::DeniedSource {
                owner_id: candidate.post.owner_id,
            });
        }

        // On open walls only the wall's own posts count
        if self.config.is_open_group(candidate.envelope_owner_id)
            && candidate.envelope_author_id != candidate.envelope_owner_id
        {
            return Err(Rejection::ForeignAuthor {
                author_id: candidate.envelope_author_id,
                owner_id: candidate.envelope_owner_id,
            });
        }

        Ok(())
    }

    fn check_shape(&self, candidate: &ResolvedPost) -> Result<(), Rejection> {
        let post = &candidate.post;
        let len = post.text.chars().count();

        if !post.has_repostable_attachments() {
            let allowed = self
                .config
                .text_only
                .map(|bounds| bounds.contains(len))
                .unwrap_or(false);
            if !allowed {
                return Err(Rejection::TextOnly { len });
            }
        }

        match &self.config.rule {
            ThemeRule::Any => Ok(()),
            ThemeRule::Media { kinds } => {
                if post.attachments.iter().any(|a| kinds.contains(&a.kind)) {
                    Ok(())
                } else {
                    Err(Rejection::MissingMedia)
                }
            }
            ThemeRule::ShortForm { max_chars } => {
                if len <= *max_chars {
                    Ok(())
                } else {
                    Err(Rejection::TooLong {
                        len,
                        max: *max_chars,
                    })
                }
            }
            ThemeRule::MarkerHashtag { tag } => {
                if post.text.contains(tag.as_str()) {
                    Ok(())
                } else {
                    Err(Rejection::MissingMarker { tag: tag.clone() })
                }
            }
        }
    }
}
