//! Edit distance between names.

use textdistance::str::levenshtein;

/// Levenshtein distance over Unicode scalar values.
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(a, b)
}
/// Edit distance after trimming and lowercasing both names.
pub fn name_distance(a: &str, b: &str) -> usize {
    edit_distance(&a.trim().to_lowercase(), &b.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: &[&str] = &[
        "",
        "a",
        "john smith",
        "jon smith",
        "Jane Doe",
        "jane.doe",
        "kitten",
        "sitting",
        "Zoë Ünal",
        "zoe unal",
    ];

    #[test]
    fn test_known_values() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(name_distance("john smith", "jon smith"), 1);
        assert_eq!(name_distance("  Jane Doe ", "jane doe"), 0);
    }

    #[test]
    fn test_identity_and_symmetry() {
        for a in SAMPLES {
            assert_eq!(edit_distance(a, a), 0);
            for b in SAMPLES {
                assert_eq!(edit_distance(a, b), edit_distance(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn test_triangle_inequality() {
        for a in SAMPLES {
            for b in SAMPLES {
                for c in SAMPLES {
                    assert!(
                        edit_distance(a, c) <= edit_distance(a, b) + edit_distance(b, c),
                        "{a:?} {b:?} {c:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_counts_chars_not_bytes() {
        assert_eq!(edit_distance("zoë", "zoe"), 1);
    }
}
