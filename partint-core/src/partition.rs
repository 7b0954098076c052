//! Splitting `[0, n_iter)` into `n_jobs` contiguous index ranges.
//!
//! Boundaries use floor division, `n_iter * job_i / n_jobs`, so partition
//! sizes differ by at most one and the split is a pure function of
//! `(n_iter, n_jobs)`.

use std::ops::Range;

/// Index range assigned to job `job_i` of `n_jobs`.
///
/// Intermediates are 128-bit, so any `u64` sample count is safe.
/// `n_jobs` must be non-zero.
pub fn job_range(n_iter: u64, n_jobs: u32, job_i: u32) -> Range<u64> {
    debug_assert!(n_jobs > 0, "n_jobs must be positive");
    let boundary = |k: u32| ((n_iter as u128 * k as u128) / n_jobs as u128) as u64;
    boundary(job_i)..boundary(job_i + 1)
}

/// Every job's range, in job order.
pub fn partition(n_iter: u64, n_jobs: u32) -> impl ExactSizeIterator<Item = Range<u64>> {
    (0..n_jobs).map(move |job_i| job_range(n_iter, n_jobs, job_i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_partition(n_iter: u64, n_jobs: u32) {
        let ranges: Vec<_> = partition(n_iter, n_jobs).collect();
        assert_eq!(ranges.len(), n_jobs as usize);
        assert_eq!(ranges.first().unwrap().start, 0);
        assert_eq!(ranges.last().unwrap().end, n_iter);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap");
        }

        let sizes: Vec<u64> = ranges.iter().map(|r| r.end - r.start).collect();
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        assert!(max - min <= 1, "sizes {:?}", sizes);
        assert_eq!(sizes.iter().sum::<u64>(), n_iter);
    }

    #[test]
    fn test_partition_covers_domain() {
        for n_iter in [1u64, 2, 3, 7, 10, 99, 1000, 1_000_003] {
            for n_jobs in 1u32..=17 {
                check_partition(n_iter, n_jobs);
            }
        }
    }

    #[test]
    fn test_excess_jobs_are_empty() {
        let ranges: Vec<_> = partition(3, 8).collect();
        let empty = ranges.iter().filter(|r| r.is_empty()).count();
        assert_eq!(empty, 5);
        let covered: Vec<u64> = ranges.iter().flat_map(|r| r.clone()).collect();
        assert_eq!(covered, vec![0, 1, 2]);
    }

    #[test]
    fn test_known_boundaries() {
        // 10 samples over 4 jobs: 10*k//4 = 0, 2, 5, 7, 10
        let ranges: Vec<_> = partition(10, 4).collect();
        assert_eq!(ranges, vec![0..2, 2..5, 5..7, 7..10]);
    }

    #[test]
    fn test_no_overflow_near_u64_max() {
        let n_iter = u64::MAX - 1;
        let last = job_range(n_iter, u32::MAX, u32::MAX - 1);
        assert_eq!(last.end, n_iter);
        check_partition(u64::MAX, 3);
    }
}
