//! Longest-common-subsequence diff
//!
//! Hirschberg's divide and conquer: O(n·m) time, O(n + m) memory, so two
//! 5000-token transcripts never allocate a full DP table. Common prefix and
//! suffix are matched before the recursion starts.

use serde::Serialize;
use std::ops::Range;

/// Run classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Equal,
    LeftOnly,
    RightOnly,
}

/// Maximal run of one kind over index ranges of both sequences
///
/// `Equal` runs have equal-length ranges; one-sided runs have an empty range
/// on the other side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRun {
    pub kind: RunKind,
    pub left: Range<usize>,
    pub right: Range<usize>,
}

/// Matched index pairs of an LCS of `left` and `right`, in increasing order
pub fn lcs_pairs<T: PartialEq>(left: &[T], right: &[T]) -> Vec<(usize, usize)> {
    let prefix = left
        .iter()
        .zip(right.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = left[prefix..]
        .iter()
        .rev()
        .zip(right[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mut pairs: Vec<(usize, usize)> = (0..prefix).map(|i| (i, i)).collect();

    let left_mid = &left[prefix..left.len() - suffix];
    let right_mid = &right[prefix..right.len() - suffix];
    hirschberg(left_mid, right_mid, prefix, prefix, &mut pairs);

    let left_tail = left.len() - suffix;
    let right_tail = right.len() - suffix;
    pairs.extend((0..suffix).map(|i| (left_tail + i, right_tail + i)));
    pairs
}

fn hirschberg<T: PartialEq>(
    left: &[T],
    right: &[T],
    left_offset: usize,
    right_offset: usize,
    out: &mut Vec<(usize, usize)>,
) {
    if left.is_empty() || right.is_empty() {
        return;
    }
    if left.len() == 1 {
        if let Some(j) = right.iter().position(|r| *r == left[0]) {
            out.push((left_offset, right_offset + j));
        }
        return;
    }
    if right.len() == 1 {
        if let Some(i) = left.iter().position(|l| *l == right[0]) {
            out.push((left_offset + i, right_offset));
        }
        return;
    }

    let mid = left.len() / 2;
    let forward = lcs_row(&left[..mid], right, false);
    let backward = lcs_row(&left[mid..], right, true);

    let n = right.len();
    let split = (0..=n)
        .max_by_key(|&k| (forward[k] + backward[n - k], std::cmp::Reverse(k)))
        .unwrap_or(0);

    hirschberg(&left[..mid], &right[..split], left_offset, right_offset, out);
    hirschberg(
        &left[mid..],
        &right[split..],
        left_offset + mid,
        right_offset + split,
        out,
    );
}

/// Last row of the LCS length table
///
/// `row[j]` is the LCS length of `left` and the first `j` items of `right`,
/// or with `reverse` of both reversed (so `row[j]` covers the last `j` items).
fn lcs_row<T: PartialEq>(left: &[T], right: &[T], reverse: bool) -> Vec<usize> {
    let n = right.len();
    let mut prev = vec![0usize; n + 1];
    let mut curr = vec![0usize; n + 1];

    for i in 0..left.len() {
        let a = if reverse { &left[left.len() - 1 - i] } else { &left[i] };
        for j in 1..=n {
            let b = if reverse { &right[n - j] } else { &right[j - 1] };
            curr[j] = if a == b {
                prev[j - 1] + 1
            } else {
                curr[j - 1].max(prev[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev
}

/// Group an LCS into maximal runs covering both sequences entirely
pub fn runs(left_len: usize, right_len: usize, pairs: &[(usize, usize)]) -> Vec<DiffRun> {
    let mut runs: Vec<DiffRun> = Vec::new();
    let mut push = |kind: RunKind, left: Range<usize>, right: Range<usize>| {
        if left.is_empty() && right.is_empty() {
            return;
        }
        if let Some(last) = runs.last_mut() {
            if last.kind == kind && last.left.end == left.start && last.right.end == right.start {
                last.left.end = left.end;
                last.right.end = right.end;
                return;
            }
        }
        runs.push(DiffRun { kind, left, right });
    };

    let (mut i, mut j) = (0, 0);
    for &(li, rj) in pairs {
        push(RunKind::LeftOnly, i..li, j..j);
        push(RunKind::RightOnly, li..li, j..rj);
        push(RunKind::Equal, li..li + 1, rj..rj + 1);
        i = li + 1;
        j = rj + 1;
    }
    push(RunKind::LeftOnly, i..left_len, j..j);
    push(RunKind::RightOnly, left_len..left_len, j..right_len);

    runs
}
