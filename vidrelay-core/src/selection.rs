//! Format selection.
//!
//! Picks exactly one encoding from a manifest. The choice is a pure
//! function of the manifest and a [`RankingPolicy`]: the encoding with the
//! greatest [`Rank`] wins, and among equal ranks the first one seen wins.

use std::fmt;
use std::str::FromStr;

use crate::source::{EncodingDescriptor, Manifest};

/// Ordering key produced by a ranking policy.
///
/// Compared by `tier` first, then `value`. Policies use tiers to express
/// hard preferences ("any webm beats any mp4") and values for the ordering
/// inside a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rank {
    /// Coarse preference class.
    pub tier: u8,
    /// Ordering within the tier; larger is better.
    pub value: i64,
}

impl Rank {
    /// Rank in the default tier.
    pub fn new(value: i64) -> Self {
        Self { tier: 0, value }
    }

    /// Rank in an explicit tier.
    pub fn tiered(tier: u8, value: i64) -> Self {
        Self { tier, value }
    }
}

/// Capability to order encodings.
pub trait RankingPolicy: Send + Sync {
    /// Ranks one encoding; larger ranks are preferred.
    fn rank(&self, encoding: &EncodingDescriptor) -> Rank;
}

impl<F> RankingPolicy for F
where
    F: Fn(&EncodingDescriptor) -> Rank + Send + Sync,
{
    fn rank(&self, encoding: &EncodingDescriptor) -> Rank {
        self(encoding)
    }
}

/// Prefers the highest quality rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestQuality;

impl RankingPolicy for HighestQuality {
    fn rank(&self, encoding: &EncodingDescriptor) -> Rank {
        Rank::new(i64::from(encoding.quality_rank))
    }
}

/// Prefers the smallest known bitrate; unknown bitrates come last.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowestBandwidth;

impl RankingPolicy for LowestBandwidth {
    fn rank(&self, encoding: &EncodingDescriptor) -> Rank {
        match encoding.bitrate {
            Some(bitrate) => Rank::tiered(1, -(bitrate.min(i64::MAX as u64) as i64)),
            None => Rank::tiered(0, -i64::from(encoding.quality_rank)),
        }
    }
}

/// Prefers one container; highest quality within each tier.
#[derive(Debug, Clone)]
pub struct PreferContainer {
    container: String,
}

impl PreferContainer {
    /// Creates a policy preferring `container` (case-insensitive).
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into().to_ascii_lowercase(),
        }
    }
}

impl RankingPolicy for PreferContainer {
    fn rank(&self, encoding: &EncodingDescriptor) -> Rank {
        let tier = u8::from(encoding.container.eq_ignore_ascii_case(&self.container));
        Rank::tiered(tier, i64::from(encoding.quality_rank))
    }
}

/// The single encoding chosen for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedEncoding {
    descriptor: EncodingDescriptor,
    index: usize,
}

impl SelectedEncoding {
    /// The chosen descriptor.
    pub fn descriptor(&self) -> &EncodingDescriptor {
        &self.descriptor
    }

    /// Position of the chosen descriptor in the manifest.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Content type to declare for this encoding.
    pub fn content_type(&self) -> String {
        self.descriptor.content_type()
    }
}

/// Selects the encoding with the greatest rank under `policy`.
///
/// Ties go to the encoding that appears first in the manifest.
pub fn select(manifest: &Manifest, policy: &dyn RankingPolicy) -> SelectedEncoding {
    let mut best_index = 0;
    let mut best_rank = policy.rank(manifest.first());

    for (index, encoding) in manifest.encodings().iter().enumerate().skip(1) {
        let rank = policy.rank(encoding);
        if rank > best_rank {
            best_rank = rank;
            best_index = index;
        }
    }

    SelectedEncoding {
        descriptor: manifest.encodings()[best_index].clone(),
        index: best_index,
    }
}

/// Selects with [`HighestQuality`].
pub fn select_highest(manifest: &Manifest) -> SelectedEncoding {
    select(manifest, &HighestQuality)
}

/// Named selection policy, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// [`HighestQuality`].
    #[default]
    Highest,
    /// [`LowestBandwidth`].
    LowestBandwidth,
    /// [`PreferContainer`] with the given container tag.
    Prefer(String),
}

impl SelectionPolicy {
    /// Builds the ranking policy this name stands for.
    pub fn build(&self) -> Box<dyn RankingPolicy> {
        match self {
            SelectionPolicy::Highest => Box::new(HighestQuality),
            SelectionPolicy::LowestBandwidth => Box::new(LowestBandwidth),
            SelectionPolicy::Prefer(container) => Box::new(PreferContainer::new(container)),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "highest" | "best" => Ok(SelectionPolicy::Highest),
            "lowest-bandwidth" | "lowest" => Ok(SelectionPolicy::LowestBandwidth),
            other => match other.strip_prefix("prefer:") {
                Some(container) if !container.is_empty() => {
                    Ok(SelectionPolicy::Prefer(container.to_string()))
                }
                _ => Err(format!(
                    "unknown selection policy '{s}' (expected highest, lowest-bandwidth or prefer:<container>)"
                )),
            },
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::Highest => f.write_str("highest"),
            SelectionPolicy::LowestBandwidth => f.write_str("lowest-bandwidth"),
            SelectionPolicy::Prefer(container) => write!(f, "prefer:{container}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::source::Locator;

    fn encoding(container: &str, rank: u32, tag: &str) -> EncodingDescriptor {
        EncodingDescriptor::new(container, rank, Locator::new(tag))
    }

    fn manifest(encodings: Vec<EncodingDescriptor>) -> Manifest {
        Manifest::new("abc", encodings).unwrap()
    }

    #[test]
    fn test_highest_quality_wins() {
        let m = manifest(vec![encoding("mp4", 480, "a"), encoding("mp4", 1080, "b")]);
        let selected = select_highest(&m);
        assert_eq!(selected.descriptor().quality_rank, 1080);
        assert_eq!(selected.index(), 1);
        assert_eq!(selected.content_type(), "video/mp4");
    }

    #[test]
    fn test_ties_go_to_first_seen() {
        let m = manifest(vec![
            encoding("mp4", 360, "a"),
            encoding("webm", 720, "first"),
            encoding("mp4", 720, "second"),
        ]);
        assert_eq!(select_highest(&m).descriptor().locator.as_str(), "first");
    }

    #[test]
    fn test_lowest_bandwidth_prefers_known_small_bitrate() {
        let m = manifest(vec![
            encoding("mp4", 1080, "unknown"),
            encoding("mp4", 720, "big").with_bitrate(2_000_000),
            encoding("mp4", 360, "small").with_bitrate(500_000),
        ]);
        assert_eq!(select(&m, &LowestBandwidth).descriptor().locator.as_str(), "small");
    }

    #[test]
    fn test_prefer_container_falls_back_to_quality() {
        let m = manifest(vec![
            encoding("mp4", 1080, "mp4-hd"),
            encoding("webm", 360, "webm-sd"),
            encoding("webm", 720, "webm-hd"),
        ]);
        let policy = PreferContainer::new("WebM");
        assert_eq!(select(&m, &policy).descriptor().locator.as_str(), "webm-hd");

        let policy = PreferContainer::new("3gpp");
        assert_eq!(select(&m, &policy).descriptor().locator.as_str(), "mp4-hd");
    }

    #[test]
    fn test_closure_policy() {
        let m = manifest(vec![encoding("mp4", 1080, "a"), encoding("mp4", 144, "b")]);
        let smallest = |e: &EncodingDescriptor| Rank::new(-i64::from(e.quality_rank));
        assert_eq!(select(&m, &smallest).descriptor().quality_rank, 144);
    }

    #[test]
    fn test_policy_names_round_trip() {
        for name in ["highest", "lowest-bandwidth", "prefer:webm"] {
            let policy: SelectionPolicy = name.parse().unwrap();
            assert_eq!(policy.to_string(), name);
        }
        assert_eq!("BEST".parse::<SelectionPolicy>(), Ok(SelectionPolicy::Highest));
        assert!("prefer:".parse::<SelectionPolicy>().is_err());
        assert!("fastest".parse::<SelectionPolicy>().is_err());
    }

    proptest! {
        #[test]
        fn prop_selection_is_maximal_and_first_seen(ranks in proptest::collection::vec(0u32..5, 1..20)) {
            let encodings: Vec<_> = ranks
                .iter()
                .enumerate()
                .map(|(i, r)| encoding("mp4", *r, &i.to_string()))
                .collect();
            let m = manifest(encodings);
            let selected = select_highest(&m);

            let max = *ranks.iter().max().unwrap();
            let first_max = ranks.iter().position(|r| *r == max).unwrap();
            prop_assert_eq!(selected.descriptor().quality_rank, max);
            prop_assert_eq!(selected.index(), first_max);
        }

        #[test]
        fn prop_selection_is_deterministic(ranks in proptest::collection::vec(0u32..2000, 1..20)) {
            let encodings: Vec<_> = ranks.iter().map(|r| encoding("mp4", *r, "x")).collect();
            let m = manifest(encodings);
            prop_assert_eq!(select_highest(&m), select_highest(&m));
        }
    }
}
