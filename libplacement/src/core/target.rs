use common::{Action, IntOrString};

use crate::error::{PlacementError, Result};

/// Converts a declared target size into the number of qualifying pods that
/// must be managed by the policy.
///
/// Percentages are taken of `qualifying` and always rounded down. For
/// `MustNot` the result is inverted against `qualifying`, so it counts the
/// pods still allowed onto matching nodes. The result is not clamped and may
/// be negative when an absolute `MustNot` target exceeds `qualifying`.
pub fn compute_target(spec: &IntOrString, qualifying: usize, action: Action) -> Result<i64> {
    let qualifying = qualifying as i64;
    let raw = match spec {
        IntOrString::Int(count) => i64::from(*count),
        IntOrString::String(s) => {
            let percent = parse_percentage(s)?;
            (percent * qualifying).div_euclid(100)
        }
    };
    Ok(match action {
        Action::Must => raw,
        Action::MustNot => qualifying - raw,
    })
}

fn parse_percentage(s: &str) -> Result<i64> {
    s.strip_suffix('%')
        .and_then(|v| v.parse::<i32>().ok())
        .map(i64::from)
        .ok_or_else(|| PlacementError::InvalidTargetSize(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pct(s: &str) -> IntOrString {
        IntOrString::from(s)
    }

    #[test]
    fn test_absolute_target() {
        assert_eq!(compute_target(&IntOrString::Int(2), 5, Action::Must).unwrap(), 2);
        assert_eq!(compute_target(&IntOrString::Int(2), 5, Action::MustNot).unwrap(), 3);
    }

    #[test]
    fn test_percentage_floors() {
        assert_eq!(compute_target(&pct("50%"), 5, Action::Must).unwrap(), 2);
        assert_eq!(compute_target(&pct("80%"), 4, Action::Must).unwrap(), 3);
        assert_eq!(compute_target(&pct("33%"), 10, Action::Must).unwrap(), 3);
        assert_eq!(compute_target(&pct("100%"), 7, Action::Must).unwrap(), 7);
    }

    #[test]
    fn test_must_not_inverts() {
        assert_eq!(compute_target(&pct("80%"), 4, Action::MustNot).unwrap(), 1);
        for n in 0..20 {
            for spec in [pct("0%"), pct("25%"), pct("50%"), pct("90%"), IntOrString::Int(3)] {
                let must = compute_target(&spec, n, Action::Must).unwrap();
                let must_not = compute_target(&spec, n, Action::MustNot).unwrap();
                assert_eq!(must_not, n as i64 - must, "spec {spec} n {n}");
            }
        }
    }

    #[test]
    fn test_zero_qualifying() {
        assert_eq!(compute_target(&pct("50%"), 0, Action::Must).unwrap(), 0);
        assert_eq!(compute_target(&pct("50%"), 0, Action::MustNot).unwrap(), 0);
    }

    #[test]
    fn test_absolute_larger_than_qualifying() {
        assert_eq!(compute_target(&IntOrString::Int(10), 3, Action::Must).unwrap(), 10);
        assert_eq!(compute_target(&IntOrString::Int(10), 3, Action::MustNot).unwrap(), -7);
    }

    #[test]
    fn test_malformed_percentage() {
        for bad in ["50", "abc%", "%", "", "5.5%"] {
            let err = compute_target(&pct(bad), 4, Action::Must).unwrap_err();
            assert!(matches!(err, PlacementError::InvalidTargetSize(ref s) if s == bad));
        }
    }
}
