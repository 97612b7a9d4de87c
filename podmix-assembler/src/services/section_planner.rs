//! Section boundary policy
//!
//! Cut indices split the flat chunk sequence into sections:
//! `[]` over N chunks is one section `[0, N)`; `[c1, .., ck]` is k + 1
//! sections `[0, c1), [c1, c2), .., [ck, N)`.

use crate::error::{AssemblyError, AssemblyResult};
use std::ops::Range;

/// Chunk index ranges, one per section
///
/// Cuts must be strictly increasing and lie strictly inside `(0, N)`; a cut
/// at 0, at N, or repeated would produce an empty section and is rejected.
pub fn plan_sections(chunk_count: usize, boundaries: &[usize]) -> AssemblyResult<Vec<Range<usize>>> {
    if chunk_count == 0 {
        return Err(AssemblyError::InvalidBoundaries(
            "no chunks to assemble".to_string(),
        ));
    }

    let mut sections = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;

    for &cut in boundaries {
        if cut > chunk_count {
            return Err(AssemblyError::InvalidBoundaries(format!(
                "cut {} is beyond the last chunk ({} chunks)",
                cut, chunk_count
            )));
        }
        if cut <= start {
            return Err(AssemblyError::InvalidBoundaries(format!(
                "cut {} would produce an empty section (cuts must be strictly increasing and non-zero: {:?})",
                cut, boundaries
            )));
        }
        sections.push(start..cut);
        start = cut;
    }

    if start == chunk_count {
        return Err(AssemblyError::InvalidBoundaries(format!(
            "cut {} leaves the last section empty",
            start
        )));
    }
    sections.push(start..chunk_count);

    Ok(sections)
}

/// Section sizes, e.g. `[2, 3, 2]` for cuts `[2, 5]` over 7 chunks
pub fn section_sizes(sections: &[Range<usize>]) -> Vec<usize> {
    sections.iter().map(|r| r.len()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_boundaries_is_one_section() {
        let sections = plan_sections(7, &[]).unwrap();
        assert_eq!(sections, vec![0..7]);
        assert_eq!(section_sizes(&sections), vec![7]);
    }

    #[test]
    fn test_two_cuts_three_sections() {
        let sections = plan_sections(7, &[2, 5]).unwrap();
        assert_eq!(sections, vec![0..2, 2..5, 5..7]);
        assert_eq!(section_sizes(&sections), vec![2, 3, 2]);
    }

    #[test]
    fn test_rejects_unsorted() {
        assert!(matches!(
            plan_sections(7, &[5, 2]),
            Err(AssemblyError::InvalidBoundaries(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_cut() {
        assert!(plan_sections(7, &[3, 3]).is_err());
    }

    #[test]
    fn test_rejects_zero_and_end_cuts() {
        assert!(plan_sections(7, &[0]).is_err());
        assert!(plan_sections(7, &[7]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err = plan_sections(3, &[5]).unwrap_err();
        assert!(err.to_string().contains("beyond"));
    }

    #[test]
    fn test_rejects_empty_input() {
        assert!(plan_sections(0, &[]).is_err());
    }

    #[test]
    fn test_single_chunk_sections() {
        let sections = plan_sections(3, &[1, 2]).unwrap();
        assert_eq!(section_sizes(&sections), vec![1, 1, 1]);
    }
}
