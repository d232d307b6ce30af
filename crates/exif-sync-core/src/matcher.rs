use std::cmp::Reverse;

use serde::Serialize;

/// A source file offered for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCandidate {
    pub stem: String,
    pub name: String,
    /// Position in the source listing, used to break stem-length ties.
    pub listing_index: usize,
}

/// Correlation of one target file to the source listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMatch {
    pub target: String,
    /// Longest-stem candidate, `None` when nothing matched.
    pub source: Option<String>,
    pub candidate_count: usize,
}

impl FileMatch {
    pub fn is_ambiguous(&self) -> bool {
        self.candidate_count > 1
    }
}

/// Filename without its last extension. A leading dot does not start an
/// extension.
pub fn stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Candidates ordered longest stem first, earlier listing position first on
/// equal length. Empty stems are dropped so they cannot match every target.
pub fn build_candidates(sources: &[String]) -> Vec<MatchCandidate> {
    let mut candidates: Vec<MatchCandidate> = sources
        .iter()
        .enumerate()
        .filter_map(|(listing_index, name)| {
            let stem = stem(name);
            if stem.is_empty() {
                return None;
            }
            Some(MatchCandidate {
                stem: stem.to_string(),
                name: name.clone(),
                listing_index,
            })
        })
        .collect();
    candidates.sort_by_key(|c| (Reverse(c.stem.len()), c.listing_index));
    candidates
}

/// Match one target against pre-ordered candidates.
pub fn match_one(target: &str, candidates: &[MatchCandidate]) -> FileMatch {
    let mut matching = candidates.iter().filter(|c| target.starts_with(c.stem.as_str()));
    let best = matching.next();
    FileMatch {
        target: target.to_string(),
        source: best.map(|c| c.name.clone()),
        candidate_count: best.map_or(0, |_| 1 + matching.count()),
    }
}

/// Pair every target name with its best source name, keeping target order.
pub fn match_files(targets: &[String], sources: &[String]) -> Vec<FileMatch> {
    let candidates = build_candidates(sources);
    targets.iter().map(|t| match_one(t, &candidates)).collect()
}

/// Matches split by candidate count.
#[derive(Debug, Default)]
pub struct MatchSummary<'a> {
    pub exact: Vec<&'a FileMatch>,
    pub multiple: Vec<&'a FileMatch>,
    pub unmatched: Vec<&'a FileMatch>,
}

impl<'a> MatchSummary<'a> {
    pub fn partition(matches: &'a [FileMatch]) -> Self {
        let mut summary = Self::default();
        for m in matches {
            match m.candidate_count {
                0 => summary.unmatched.push(m),
                1 => summary.exact.push(m),
                _ => summary.multiple.push(m),
            }
        }
        summary
    }
}
