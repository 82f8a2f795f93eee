use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SelectionError {
    #[error("Invalid selection segment: {0:?}")]
    InvalidSegment(String),
    #[error("Slice step cannot be zero: {0:?}")]
    ZeroStep(String),
    #[error("Index {index} out of range for {length} tiles")]
    OutOfRange { index: isize, length: usize },
}

/// Parse tile selections like "all", "1,3", "0:10:2", "-1".
/// Slices follow Python `slice.indices` clamping; plain indices must be in range.
pub fn parse_selection(s: &str, length: usize) -> Result<Vec<usize>, SelectionError> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("all") {
        return Ok((0..length).collect());
    }

    let len = length as isize;
    let mut picked = BTreeSet::new();

    for segment in s.split(',').map(str::trim).filter(|seg| !seg.is_empty()) {
        if segment.contains(':') {
            let bounds = parse_slice_bounds(segment)?;
            let step = bounds.get(2).copied().flatten().unwrap_or(1);
            if step == 0 {
                return Err(SelectionError::ZeroStep(segment.to_string()));
            }
            let (start, stop) = clamp_bounds(
                bounds.first().copied().flatten(),
                bounds.get(1).copied().flatten(),
                step,
                len,
            );
            let mut idx = start;
            while (step > 0 && idx < stop) || (step < 0 && idx > stop) {
                if (0..len).contains(&idx) {
                    picked.insert(idx as usize);
                }
                idx += step;
            }
        } else {
            let idx: isize = segment
                .parse()
                .map_err(|_| SelectionError::InvalidSegment(segment.to_string()))?;
            if idx < -len || idx >= len {
                return Err(SelectionError::OutOfRange { index: idx, length });
            }
            picked.insert(if idx < 0 { idx + len } else { idx } as usize);
        }
    }

    Ok(picked.into_iter().collect())
}

fn parse_slice_bounds(segment: &str) -> Result<Vec<Option<isize>>, SelectionError> {
    let parts: Vec<Option<isize>> = segment
        .split(':')
        .map(|p| {
            let t = p.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                t.parse()
                    .map(Some)
                    .map_err(|_| SelectionError::InvalidSegment(segment.to_string()))
            }
        })
        .collect::<Result<_, _>>()?;
    if parts.len() > 3 {
        return Err(SelectionError::InvalidSegment(segment.to_string()));
    }
    Ok(parts)
}

/// Resolve optional start/stop against `length`, the way `slice.indices` does.
fn clamp_bounds(
    start: Option<isize>,
    stop: Option<isize>,
    step: isize,
    length: isize,
) -> (isize, isize) {
    let (lower, upper) = if step < 0 { (-1, length - 1) } else { (0, length) };
    let clamp = |v: isize| {
        if v < 0 {
            (v + length).max(lower)
        } else {
            v.min(upper)
        }
    };
    let start = start.map(clamp).unwrap_or(if step < 0 { upper } else { lower });
    let stop = stop.map(clamp).unwrap_or(if step < 0 { lower } else { upper });
    (start, stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_everything() {
        assert_eq!(parse_selection("ALL", 4).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn mixes_indices_and_slices() {
        assert_eq!(parse_selection("0:6:2, 5, -1", 10).unwrap(), vec![0, 2, 4, 5, 9]);
    }

    #[test]
    fn open_ended_and_negative_step_slices() {
        assert_eq!(parse_selection("7:", 9).unwrap(), vec![7, 8]);
        assert_eq!(parse_selection("::-3", 7).unwrap(), vec![0, 3, 6]);
        assert_eq!(parse_selection("-2:", 5).unwrap(), vec![3, 4]);
    }

    #[test]
    fn rejects_bad_segments() {
        assert_eq!(
            parse_selection("0:4:0", 5),
            Err(SelectionError::ZeroStep("0:4:0".to_string()))
        );
        assert_eq!(
            parse_selection("12", 5),
            Err(SelectionError::OutOfRange { index: 12, length: 5 })
        );
        assert!(matches!(
            parse_selection("a:b", 5),
            Err(SelectionError::InvalidSegment(_))
        ));
        assert!(matches!(
            parse_selection("1:2:3:4", 5),
            Err(SelectionError::InvalidSegment(_))
        ));
    }
}
