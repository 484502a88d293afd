//! Source resolution - unwinds reshared posts to their origin

use crate::{
    model::{Post, ResolvedPost},
    ports::SourceReader,
};

/// Longest reshare chain followed before giving up
pub const MAX_RESHARE_HOPS: usize = 8;

/// Resolves reshares by fetching the chain's terminal original post
pub struct SourceResolver<'a, S: SourceReader + ?Sized> {
    source: &'a S,
    account: &'a str,
}

impl<'a, S: SourceReader + ?Sized> SourceResolver<'a, S> {
    pub fn new(source: &'a S, account: &'a str) -> Self {
        Self { source, account }
    }

    /// Resolve a raw post.
    ///
    /// A failed origin fetch is terminal for this cycle: the post comes back
    /// as `Unresolved` and no retry is attempted.
    pub async fn resolve(&self, raw: Post) -> ResolvedPost {
        let (target, mut hops) = {
            let (inner, hops) = raw.innermost_inline();
            (reference(inner), hops)
        };

        if hops == 0 {
            return ResolvedPost::original(raw);
        }

        let mut target = target;
        loop {
            let (owner_id, post_id) = target;
            let fetched = match self.source.fetch_post(self.account, owner_id, post_id).await {
                Ok(Some(post)) => post,
                Ok(None) => {
                    tracing::debug!(
                        post_key = %raw.key(),
                        origin = %format!("{}_{}", owner_id, post_id),
                        "Reshared origin not found"
                    );
                    return ResolvedPost::unresolved(raw, "origin not found");
                }
                Err(e) => {
                    tracing::warn!(
                        post_key = %raw.key(),
                        origin = %format!("{}_{}", owner_id, post_id),
                        error = %e,
                        "Failed to fetch reshared origin"
                    );
                    return ResolvedPost::unresolved(raw, e.to_string());
                }
            };

            let Some(next) = fetched.reshared_from.as_deref() else {
                return ResolvedPost::resolved(&raw, fetched, hops);
            };

            let (inner, extra) = next.innermost_inline();
            hops += extra + 1;
            if hops > MAX_RESHARE_HOPS {
                return ResolvedPost::unresolved(raw, "reshare chain too deep");
            }
            target = reference(inner);
        }
    }
}

fn reference(post: &Post) -> (i64, i64) {
    (post.owner_id, post.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attachment, AttachmentKind, Resolution};
    use crate::ports::SourceError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::macros::datetime;

    struct FakeSource {
        posts: HashMap<(i64, i64), Post>,
        failing: Vec<(i64, i64)>,
        calls: Mutex<Vec<(i64, i64)>>,
    }

    impl FakeSource {
        fn new(posts: Vec<Post>) -> Self {
            Self {
                posts: posts.into_iter().map(|p| ((p.owner_id, p.id), p)).collect(),
                failing: vec![],
                calls: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl SourceReader for FakeSource {
        async fn fetch_posts(
            &self,
            _account: &str,
            _group_id: i64,
            _offset: u32,
            _count: u32,
        ) -> Result<Vec<Post>, SourceError> {
            Ok(vec![])
        }

        async fn fetch_post(
            &self,
            _account: &str,
            owner_id: i64,
            post_id: i64,
        ) -> Result<Option<Post>, SourceError> {
            self.calls.lock().unwrap().push((owner_id, post_id));
            if self.failing.contains(&(owner_id, post_id)) {
                return Err(SourceError::Network("connection reset".to_string()));
            }
            Ok(self.posts.get(&(owner_id, post_id)).cloned())
        }
    }

    fn post(owner_id: i64, id: i64, text: &str) -> Post {
        Post {
            id,
            owner_id,
            author_id: owner_id,
            text: text.to_string(),
            published_at: datetime!(2024-05-01 12:00 UTC),
            popularity: Some(10),
            attachments: vec![],
            reshared_from: None,
        }
    }

    fn reshare(mut envelope: Post, inner: Post) -> Post {
        envelope.reshared_from = Some(Box::new(inner));
        envelope
    }

    #[tokio::test]
    async fn test_original_post_is_not_fetched() {
        let source = FakeSource::new(vec![]);
        let resolver = SourceResolver::new(&source, "reader");

        let resolved = resolver.resolve(post(-1, 1, "plain")).await;

        assert_eq!(resolved.resolution, Resolution::Original);
        assert_eq!(resolved.post.text, "plain");
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_depth_two_chain_resolves_to_innermost() {
        let mut origin = post(-3, 30, "the origin");
        origin.attachments = vec![Attachment {
            kind: AttachmentKind::Photo,
            owner_id: -3,
            id: 300,
            sizes: vec![],
        }];
        let middle = reshare(post(-2, 20, ""), post(-3, 30, "stale inline copy"));
        let envelope = reshare(post(-1, 10, ""), middle);

        let source = FakeSource::new(vec![origin]);
        let resolver = SourceResolver::new(&source, "reader");

        let resolved = resolver.resolve(envelope).await;

        assert_eq!(resolved.resolution, Resolution::Resolved { hops: 2 });
        assert_eq!(resolved.post.owner_id, -3);
        assert_eq!(resolved.post.id, 30);
        assert_eq!(resolved.post.text, "the origin");
        assert_eq!(resolved.post.attachments.len(), 1);
        assert_eq!(resolved.envelope_owner_id, -1);
        assert!(resolved.post.reshared_from.is_none());
        assert_eq!(*source.calls.lock().unwrap(), vec![(-3, 30)]);
    }

    #[tokio::test]
    async fn test_fetched_origin_that_is_itself_a_reshare_is_followed() {
        let deeper = post(-4, 40, "deep origin");
        let fetched_middle = reshare(post(-3, 30, ""), post(-4, 40, ""));
        let envelope = reshare(post(-1, 10, ""), post(-3, 30, ""));

        let source = FakeSource::new(vec![fetched_middle, deeper]);
        let resolver = SourceResolver::new(&source, "reader");

        let resolved = resolver.resolve(envelope).await;

        assert_eq!(resolved.post.text, "deep origin");
        assert_eq!(resolved.resolution, Resolution::Resolved { hops: 2 });
    }

    #[tokio::test]
    async fn test_missing_origin_is_unresolved() {
        let envelope = reshare(post(-1, 10, "wrapper"), post(-9, 90, "gone"));
        let source = FakeSource::new(vec![]);
        let resolver = SourceResolver::new(&source, "reader");

        let resolved = resolver.resolve(envelope).await;

        assert!(resolved.is_unresolved());
        assert!(resolved.post.reshared_from.is_none());
        assert_eq!(resolved.post.id, 10);
    }

    #[tokio::test]
    async fn test_fetch_error_is_unresolved_without_retry() {
        let envelope = reshare(post(-1, 10, ""), post(-9, 90, ""));
        let mut source = FakeSource::new(vec![post(-9, 90, "present")]);
        source.failing.push((-9, 90));
        let resolver = SourceResolver::new(&source, "reader");

        let resolved = resolver.resolve(envelope).await;

        assert!(resolved.is_unresolved());
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }
}
