//! Candidate selection

use crate::model::Candidate;

/// Pick the single most popular candidate; the first seen wins ties
pub fn select_best(candidates: Vec<Candidate>) -> Option<Candidate> {
    let mut best: Option<Candidate> = None;
    for candidate in candidates {
        match &best {
            Some(current) if candidate.popularity() <= current.popularity() => {}
            _ => best = Some(candidate),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Fingerprint, Post};
    use time::macros::datetime;

    fn candidate(id: i64, popularity: Option<u64>) -> Candidate {
        Candidate {
            post: Post {
                id,
                owner_id: -1,
                author_id: -1,
                text: format!("post {id}"),
                published_at: datetime!(2024-05-01 12:00 UTC),
                popularity,
                attachments: vec![],
                reshared_from: None,
            },
            fingerprint: Fingerprint(format!("1_{id}")),
            image_hash: None,
        }
    }

    #[test]
    fn test_empty_yields_none() {
        assert_eq!(select_best(vec![]), None);
    }

    #[test]
    fn test_highest_popularity_wins() {
        let picked = select_best(vec![
            candidate(1, Some(40)),
            candidate(2, Some(900)),
            candidate(3, Some(120)),
        ])
        .unwrap();

        assert_eq!(picked.post.id, 2);
    }

    #[test]
    fn test_ties_keep_first_seen() {
        let picked = select_best(vec![
            candidate(1, Some(5)),
            candidate(2, Some(50)),
            candidate(3, Some(50)),
        ])
        .unwrap();

        assert_eq!(picked.post.id, 2);
    }

    #[test]
    fn test_missing_popularity_counts_as_zero() {
        let picked = select_best(vec![candidate(1, None), candidate(2, Some(0))]).unwrap();
        assert_eq!(picked.post.id, 1);

        let picked = select_best(vec![candidate(1, None), candidate(2, Some(1))]).unwrap();
        assert_eq!(picked.post.id, 2);
    }
}
