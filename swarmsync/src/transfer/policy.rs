//! Source admission and selection policies.
//!
//! [`SourceAdmissionPolicy`] decides whether a peer may join a transfer.
//! [`SourceSelection`] decides which admitted peer is offered the next range.

use std::fmt;
use std::str::FromStr;

use super::source::SourceCapabilities;

/// Decides whether a new source may join a transfer.
pub trait SourceAdmissionPolicy: Send + Sync + fmt::Debug {
    /// Check `candidate` against the sources already attached.
    ///
    /// `using_part_requests` describes the existing sources and is
    /// meaningless when `existing_sources` is zero. Returns the refusal
    /// reason on rejection.
    fn allows_source(
        &self,
        existing_sources: usize,
        using_part_requests: bool,
        candidate: &SourceCapabilities,
    ) -> Result<(), String>;
}

/// One source at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleSourcePolicy;

impl SourceAdmissionPolicy for SingleSourcePolicy {
    fn allows_source(
        &self,
        existing_sources: usize,
        _using_part_requests: bool,
        _candidate: &SourceCapabilities,
    ) -> Result<(), String> {
        if existing_sources == 0 {
            Ok(())
        } else {
            Err("transfer already has a source".to_string())
        }
    }
}

/// Any number of sources, as long as every one of them takes range requests
/// and agrees to share the transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwarmingPolicy;

impl SourceAdmissionPolicy for SwarmingPolicy {
    fn allows_source(
        &self,
        existing_sources: usize,
        using_part_requests: bool,
        candidate: &SourceCapabilities,
    ) -> Result<(), String> {
        if existing_sources == 0 {
            return Ok(());
        }
        if !using_part_requests {
            return Err("existing source streams the whole file".to_string());
        }
        if !candidate.part_requests {
            return Err("source does not accept range requests".to_string());
        }
        if !candidate.swarming {
            return Err("source does not support swarming".to_string());
        }
        Ok(())
    }
}

/// Order in which eligible sources are offered a new range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceSelection {
    /// Sources in the order they joined; earlier peers are preferred.
    #[default]
    FirstEligible,
    /// Rotate the starting source after every assignment.
    RoundRobin,
    /// Fewest outstanding requests first, join order breaking ties.
    LeastLoaded,
}

impl SourceSelection {
    /// Indices into the join-ordered source list, in offer order.
    ///
    /// `loads` holds the outstanding requests per source and `cursor` the
    /// round-robin position (one past the last assigned source).
    pub fn candidate_order(&self, loads: &[usize], cursor: usize) -> Vec<usize> {
        let n = loads.len();
        match self {
            SourceSelection::FirstEligible => (0..n).collect(),
            SourceSelection::RoundRobin => {
                let start = if n == 0 { 0 } else { cursor % n };
                (start..n).chain(0..start).collect()
            }
            SourceSelection::LeastLoaded => {
                let mut order: Vec<usize> = (0..n).collect();
                order.sort_by_key(|&i| loads[i]);
                order
            }
        }
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSelection::FirstEligible => "first-eligible",
            SourceSelection::RoundRobin => "round-robin",
            SourceSelection::LeastLoaded => "least-loaded",
        }
    }
}

impl fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-eligible" | "first" => Ok(SourceSelection::FirstEligible),
            "round-robin" => Ok(SourceSelection::RoundRobin),
            "least-loaded" => Ok(SourceSelection::LeastLoaded),
            other => Err(format!(
                "unknown source selection '{}' (expected first-eligible, round-robin or least-loaded)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_source_policy() {
        let policy = SingleSourcePolicy;
        let caps = SourceCapabilities::full();
        assert!(policy.allows_source(0, false, &caps).is_ok());
        assert!(policy.allows_source(1, true, &caps).is_err());
    }

    #[test]
    fn test_swarming_policy_first_source_always_allowed() {
        let policy = SwarmingPolicy;
        assert!(policy
            .allows_source(0, false, &SourceCapabilities::streaming())
            .is_ok());
    }

    #[test]
    fn test_swarming_policy_never_mixes_tiers() {
        let policy = SwarmingPolicy;
        let full = SourceCapabilities::full();
        let streaming = SourceCapabilities::streaming();

        assert!(policy.allows_source(2, true, &full).is_ok());
        assert!(policy.allows_source(1, true, &streaming).is_err());
        assert!(policy.allows_source(1, false, &full).is_err());
    }

    #[test]
    fn test_swarming_policy_requires_swarming() {
        let policy = SwarmingPolicy;
        let caps = SourceCapabilities::full().with_swarming(false);
        let reason = policy.allows_source(1, true, &caps).unwrap_err();
        assert!(reason.contains("swarming"));
    }

    #[test]
    fn test_first_eligible_order() {
        let order = SourceSelection::FirstEligible.candidate_order(&[3, 0, 1], 2);
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_round_robin_order() {
        let order = SourceSelection::RoundRobin.candidate_order(&[0, 0, 0], 2);
        assert_eq!(order, vec![2, 0, 1]);
        let order = SourceSelection::RoundRobin.candidate_order(&[0, 0, 0], 7);
        assert_eq!(order, vec![1, 2, 0]);
        assert!(SourceSelection::RoundRobin.candidate_order(&[], 3).is_empty());
    }

    #[test]
    fn test_least_loaded_order_is_stable() {
        let order = SourceSelection::LeastLoaded.candidate_order(&[2, 0, 2, 0], 0);
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            "round-robin".parse::<SourceSelection>().unwrap(),
            SourceSelection::RoundRobin
        );
        assert_eq!(
            " Least-Loaded ".parse::<SourceSelection>().unwrap(),
            SourceSelection::LeastLoaded
        );
        assert!("random".parse::<SourceSelection>().is_err());
        assert_eq!(SourceSelection::default().to_string(), "first-eligible");
    }
}
