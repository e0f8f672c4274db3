//! Subnet allocation.
//!
//! Given the address ranges of a parent network, a desired prefix length and
//! the ranges already carved out of that network, [`allocate`] returns the
//! first free block of the desired size.
//!
//! # Ordering
//!
//! Parents are tried in the order given. Within a parent, candidates are the
//! `/prefix_length` subnets of the parent in ascending address order, and the
//! first one overlapping no used range wins. The result depends only on the
//! inputs: used ranges are a set and the winning candidate is fully
//! determined by address order.
//!
//! # Search strategy
//!
//! Candidates are never materialized. Used ranges are sorted by start and
//! swept once: when one blocks the candidate under the cursor, the cursor
//! jumps to the first aligned candidate past its end. A search costs
//! `O(n log n)` in the number of used ranges and stays cheap even for
//! `/32 -> /64` IPv6 splits.
//!
//! # Example
//!
//! ```
//! use dx_provider::allocator::find_available_block;
//!
//! let block = find_available_block(&["10.0.0.0/16"], 24, &["10.0.0.0/24"]).unwrap();
//! assert_eq!(block.to_string(), "10.0.1.0/24");
//! ```

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use thiserror::Error;
use tracing::{debug, warn};

use crate::cidr::{AddressRange, RangeError};

/// Outcome of an allocation: the chosen block, or why there is none.
pub type AllocationResult = Result<AddressRange, AllocationError>;

/// Inputs to a single allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    /// Parent ranges in priority order.
    pub parent_ranges: Vec<AddressRange>,
    /// Prefix length of the block to allocate.
    pub prefix_length: u8,
    /// Ranges already in use within the parent network.
    pub used_ranges: BTreeSet<AddressRange>,
}

impl AllocationRequest {
    /// Create a request from parsed ranges.
    pub fn new(
        parent_ranges: impl IntoIterator<Item = AddressRange>,
        prefix_length: u8,
        used_ranges: impl IntoIterator<Item = AddressRange>,
    ) -> Self {
        Self {
            parent_ranges: parent_ranges.into_iter().collect(),
            prefix_length,
            used_ranges: used_ranges.into_iter().collect(),
        }
    }

    /// Create a request from CIDR strings as reported by a network inventory.
    ///
    /// Parent ranges that fail to parse are logged and skipped. A used range
    /// that fails to parse aborts the request: ignoring it could hand out a
    /// block that is already taken.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::NoParseableParent`] when parent ranges were
    /// given but none of them parses, and [`AllocationError::InvalidUsedRange`]
    /// for the first malformed used range.
    pub fn parse<P, U>(
        parent_ranges: &[P],
        prefix_length: u8,
        used_ranges: &[U],
    ) -> Result<Self, AllocationError>
    where
        P: AsRef<str>,
        U: AsRef<str>,
    {
        let parents = parent_ranges
            .iter()
            .filter_map(|raw| match raw.as_ref().parse::<AddressRange>() {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!(parent = raw.as_ref(), error = %e, "Skipping unparseable parent range");
                    None
                },
            })
            .collect::<Vec<_>>();

        if parents.is_empty() && !parent_ranges.is_empty() {
            return Err(AllocationError::NoParseableParent(
                parent_ranges.iter().map(|raw| raw.as_ref().to_string()).collect(),
            ));
        }

        let used = used_ranges
            .iter()
            .map(|raw| raw.as_ref().parse::<AddressRange>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(AllocationError::InvalidUsedRange)?;

        Ok(Self {
            parent_ranges: parents,
            prefix_length,
            used_ranges: used,
        })
    }
}

/// Details of a failed search, kept for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exhausted {
    /// The parent ranges that were considered.
    pub parent_ranges: Vec<AddressRange>,
    /// The requested prefix length.
    pub prefix_length: u8,
    /// How many parents were large enough to be searched.
    pub eligible_parents: usize,
}

impl Display for Exhausted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parents = if self.parent_ranges.is_empty() {
            "no parent ranges".to_string()
        } else {
            self.parent_ranges
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };

        if self.eligible_parents == 0 {
            write!(
                f,
                "no parent range can be split into /{} blocks ({})",
                self.prefix_length, parents
            )
        } else {
            write!(
                f,
                "no free /{} block left in {}",
                self.prefix_length, parents
            )
        }
    }
}

/// Errors returned by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Every eligible parent is fully used, or no parent is eligible.
    #[error("{0}")]
    NotFound(Exhausted),

    /// A used range could not be parsed.
    #[error("invalid used range: {0}")]
    InvalidUsedRange(#[source] RangeError),

    /// Parent ranges were given, but none of them could be parsed.
    #[error("none of the parent ranges could be parsed: {}", .0.join(", "))]
    NoParseableParent(Vec<String>),
}

impl AllocationError {
    /// Whether the search ran and found nothing free.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Find the first free `/prefix_length` block across the request's parents.
///
/// A parent is skipped when the requested prefix is not strictly longer than
/// the parent's, or is wider than the parent's address family.
///
/// # Errors
///
/// Returns [`AllocationError::NotFound`] when no parent yields a free block.
pub fn allocate(request: &AllocationRequest) -> AllocationResult {
    let prefix_length = request.prefix_length;
    let mut eligible_parents = 0;

    for parent in &request.parent_ranges {
        if prefix_length <= parent.prefix_len() || prefix_length > parent.max_prefix_len() {
            debug!(
                parent = %parent,
                prefix_length,
                "Parent range cannot be split into the requested size, skipping"
            );
            continue;
        }
        eligible_parents += 1;

        debug!(
            parent = %parent,
            prefix_length,
            candidates = %candidate_count(parent, prefix_length),
            "Searching parent range"
        );

        if let Some(found) = first_free(parent, prefix_length, &request.used_ranges) {
            debug!(parent = %parent, cidr_block = %found, "Found available block");
            return Ok(found);
        }

        debug!(parent = %parent, prefix_length, "Parent range exhausted");
    }

    Err(AllocationError::NotFound(Exhausted {
        parent_ranges: request.parent_ranges.clone(),
        prefix_length,
        eligible_parents,
    }))
}

/// Parse CIDR strings and allocate in one step.
///
/// # Errors
///
/// See [`AllocationRequest::parse`] and [`allocate`].
pub fn find_available_block<P, U>(
    parent_ranges: &[P],
    prefix_length: u8,
    used_ranges: &[U],
) -> AllocationResult
where
    P: AsRef<str>,
    U: AsRef<str>,
{
    let request = AllocationRequest::parse(parent_ranges, prefix_length, used_ranges)?;
    allocate(&request)
}

fn first_free(
    parent: &AddressRange,
    prefix_length: u8,
    used: &BTreeSet<AddressRange>,
) -> Option<AddressRange> {
    // prefix_length > parent.prefix_len(), so the block is smaller than 2^128
    let block = parent.block_size_at(prefix_length)?;
    let end = parent.last();

    let mut blockers = used
        .iter()
        .filter(|range| range.overlaps(parent))
        .map(|range| (range.first(), range.last()))
        .collect::<Vec<_>>();
    blockers.sort_unstable();

    // The cursor only moves forward, so a blocker that ends before it never
    // matters again and each blocker is visited once.
    let mut cursor = parent.first();
    for (first, last) in blockers {
        if last < cursor {
            continue;
        }
        if first > cursor + (block - 1) {
            break;
        }
        if last >= end {
            return None;
        }
        cursor = align_up(last + 1, block)?;
        if cursor > end {
            return None;
        }
    }

    AddressRange::from_bits(cursor, prefix_length, parent.is_ipv4())
}

// Parent bases are aligned to the parent size, so absolute alignment is also
// alignment within the parent.
fn align_up(value: u128, block: u128) -> Option<u128> {
    match value % block {
        0 => Some(value),
        rem => value.checked_add(block - rem),
    }
}

fn candidate_count(parent: &AddressRange, prefix_length: u8) -> String {
    parent.subnet_count(prefix_length).map_or_else(
        || format!("2^{}", prefix_length - parent.prefix_len()),
        |count| count.to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(s: &str) -> AddressRange {
        s.parse().unwrap()
    }

    fn request(parents: &[&str], prefix_length: u8, used: &[&str]) -> AllocationRequest {
        AllocationRequest::parse(parents, prefix_length, used).unwrap()
    }

    /// Reference implementation: walk every candidate in index order.
    fn enumerate_first_free(request: &AllocationRequest) -> Option<AddressRange> {
        for parent in &request.parent_ranges {
            if request.prefix_length <= parent.prefix_len() {
                continue;
            }
            let Some(count) = parent.subnet_count(request.prefix_length) else {
                continue;
            };
            for i in 0..count {
                let candidate = parent.subnet(request.prefix_length, i).unwrap();
                if !request.used_ranges.iter().any(|u| u.overlaps(&candidate)) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    #[test]
    fn test_empty_network_gets_first_block() {
        let result = allocate(&request(&["10.0.0.0/16"], 24, &[]));
        assert_eq!(result, Ok(range("10.0.0.0/24")));
    }

    #[test]
    fn test_skips_used_block() {
        let result = allocate(&request(&["10.0.0.0/16"], 24, &["10.0.0.0/24"]));
        assert_eq!(result, Ok(range("10.0.1.0/24")));
    }

    #[test]
    fn test_equal_prefix_length_is_not_found() {
        let err = allocate(&request(&["10.0.0.0/24"], 24, &[])).unwrap_err();
        assert_eq!(
            err,
            AllocationError::NotFound(Exhausted {
                parent_ranges: vec![range("10.0.0.0/24")],
                prefix_length: 24,
                eligible_parents: 0,
            })
        );
        assert_eq!(
            err.to_string(),
            "no parent range can be split into /24 blocks (10.0.0.0/24)"
        );
    }

    #[test]
    fn test_fully_used_parent_is_not_found() {
        let req = request(
            &["192.168.0.0/30"],
            32,
            &[
                "192.168.0.0/32",
                "192.168.0.1/32",
                "192.168.0.2/32",
                "192.168.0.3/32",
            ],
        );
        let err = allocate(&req).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "no free /32 block left in 192.168.0.0/30"
        );
    }

    #[test]
    fn test_first_parent_is_exhausted_before_the_second() {
        let req = request(&["10.0.0.0/24", "10.1.0.0/24"], 25, &["10.0.0.0/25"]);
        assert_eq!(allocate(&req), Ok(range("10.0.0.128/25")));

        let req = request(
            &["10.0.0.0/24", "10.1.0.0/24"],
            25,
            &["10.0.0.0/25", "10.0.0.128/25"],
        );
        assert_eq!(allocate(&req), Ok(range("10.1.0.0/25")));
    }

    #[test]
    fn test_larger_used_range_blocks_every_candidate_inside_it() {
        let req = request(&["10.0.0.0/16"], 24, &["10.0.0.0/20", "10.0.16.0/24"]);
        assert_eq!(allocate(&req), Ok(range("10.0.17.0/24")));
    }

    #[test]
    fn test_smaller_used_range_blocks_its_enclosing_candidate() {
        let req = request(&["10.0.0.0/16"], 24, &["10.0.0.17/32", "10.0.1.128/25"]);
        assert_eq!(allocate(&req), Ok(range("10.0.2.0/24")));
    }

    #[test]
    fn test_used_ranges_outside_the_parent_are_ignored() {
        let req = request(&["10.0.0.0/16"], 24, &["10.1.0.0/24", "fd00::/64"]);
        assert_eq!(allocate(&req), Ok(range("10.0.0.0/24")));
    }

    #[test]
    fn test_used_range_covering_the_parent() {
        let err = allocate(&request(&["10.0.0.0/16"], 24, &["10.0.0.0/8"])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_result_is_deterministic_and_order_independent() {
        let used = ["10.0.2.0/24", "10.0.0.0/24", "10.0.1.0/25", "10.0.4.0/23"];
        let mut reversed = used;
        reversed.reverse();

        let first = find_available_block(&["10.0.0.0/16"], 24, &used);
        let second = find_available_block(&["10.0.0.0/16"], 24, &used);
        let shuffled = find_available_block(&["10.0.0.0/16"], 24, &reversed);

        assert_eq!(first, Ok(range("10.0.3.0/24")));
        assert_eq!(first, second);
        assert_eq!(first, shuffled);
    }

    #[test]
    fn test_result_is_contained_and_free() {
        let req = request(
            &["172.16.0.0/20", "172.16.16.0/20"],
            22,
            &["172.16.0.0/22", "172.16.4.0/23", "172.16.8.0/21", "172.16.6.0/24"],
        );
        let found = allocate(&req).unwrap();
        assert_eq!(found, range("172.16.16.0/22"));
        assert!(req.parent_ranges.iter().any(|p| p.contains(&found)));
        assert!(req.used_ranges.iter().all(|u| !u.overlaps(&found)));
    }

    #[test]
    fn test_prefix_wider_than_family_skips_parent() {
        let req = request(&["10.0.0.0/24", "fd00::/56"], 64, &[]);
        assert_eq!(allocate(&req), Ok(range("fd00::/64")));

        let req = request(&["fd00::/56", "10.0.0.0/24"], 25, &[]);
        assert_eq!(allocate(&req), Ok(range("10.0.0.0/25")));
    }

    #[test]
    fn test_large_ipv6_split_does_not_enumerate() {
        let req = request(
            &["fd00::/32"],
            64,
            &["fd00::/64", "fd00:0:0:1::/64", "fd00:0:0:3::/64"],
        );
        assert_eq!(allocate(&req), Ok(range("fd00:0:0:2::/64")));

        let req = request(&["::/0"], 128, &["::/1"]);
        assert_eq!(allocate(&req), Ok(range("8000::/128")));

        let err = allocate(&request(&["::/0"], 128, &["::/0"])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_whole_ipv4_space() {
        let req = request(&["0.0.0.0/0"], 32, &["0.0.0.0/1", "128.0.0.0/32"]);
        assert_eq!(allocate(&req), Ok(range("128.0.0.1/32")));

        let err = allocate(&request(&["0.0.0.0/0"], 1, &["0.0.0.0/0"])).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unparseable_parent_is_skipped() {
        let req = request(&["not-a-cidr", "10.0.0.0/24"], 26, &[]);
        assert_eq!(req.parent_ranges, vec![range("10.0.0.0/24")]);
        assert_eq!(allocate(&req), Ok(range("10.0.0.0/26")));
    }

    #[test]
    fn test_unparseable_used_range_fails_closed() {
        let err = find_available_block(&["10.0.0.0/16"], 24, &["10.0.0.0/24", "10.0.1.0"])
            .unwrap_err();
        assert!(matches!(err, AllocationError::InvalidUsedRange(_)));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("10.0.1.0"));
    }

    #[test]
    fn test_all_parents_unparseable_is_not_exhaustion() {
        let err = find_available_block(&["10.0.0/16", "nope"], 24, &[] as &[&str]).unwrap_err();
        assert_eq!(
            err,
            AllocationError::NoParseableParent(vec!["10.0.0/16".to_string(), "nope".to_string()])
        );
        assert!(!err.is_not_found());
        assert_eq!(
            err.to_string(),
            "none of the parent ranges could be parsed: 10.0.0/16, nope"
        );
    }

    #[test]
    fn test_many_used_ranges_in_reverse_order() {
        // Every other /24 of the first /20 is taken, listed last to first,
        // plus a /25 inside the first gap.
        let mut used = (0..16)
            .step_by(2)
            .rev()
            .map(|i| format!("10.0.{i}.0/24"))
            .collect::<Vec<_>>();
        used.push("10.0.1.128/25".to_string());

        let found = find_available_block(&["10.0.0.0/16"], 24, &used);
        assert_eq!(found, Ok(range("10.0.3.0/24")));

        let found = find_available_block(&["10.0.0.0/16"], 23, &used);
        assert_eq!(found, Ok(range("10.0.16.0/23")));
    }

    #[test]
    fn test_no_parents_is_not_found() {
        let err = find_available_block::<&str, &str>(&[], 24, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no parent range can be split into /24 blocks (no parent ranges)"
        );
    }

    #[test]
    fn test_agrees_with_exhaustive_enumeration() {
        let pool = [
            "10.0.0.0/30",
            "10.0.0.4/30",
            "10.0.0.8/29",
            "10.0.0.3/32",
            "10.0.0.6/31",
            "10.0.0.12/32",
            "10.0.0.15/32",
            "10.0.0.0/29",
            "10.0.1.0/30",
            "10.0.0.0/27",
        ];
        let parents = ["10.0.0.0/28", "10.0.1.0/29"];

        for mask in 0u32..(1 << pool.len()) {
            let used = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, cidr)| *cidr)
                .collect::<Vec<_>>();

            for prefix_length in 27..=32 {
                let req = request(&parents, prefix_length, &used);
                assert_eq!(
                    allocate(&req).ok(),
                    enumerate_first_free(&req),
                    "used={used:?} prefix_length={prefix_length}"
                );
            }
        }
    }
}
