use crate::{HmError, Series};

/// Truncate every series to the shortest length in the set, keeping order.
pub fn trim_series(mut set: Vec<Series>) -> Result<Vec<Series>, HmError> {
    let min_len = set
        .iter()
        .map(Vec::len)
        .min()
        .ok_or(HmError::EmptyInput)?;
    for series in &mut set {
        series.truncate(min_len);
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_to_shortest_member() {
        let set = vec![
            vec![1.0, 2.0, 3.0, 4.0],
            vec![5.0, 6.0],
            vec![7.0, 8.0, 9.0],
        ];
        let trimmed = trim_series(set).unwrap();
        assert_eq!(trimmed, vec![vec![1.0, 2.0], vec![5.0, 6.0], vec![7.0, 8.0]]);
    }

    #[test]
    fn equal_lengths_are_untouched() {
        let set = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        assert_eq!(trim_series(set.clone()).unwrap(), set);
    }

    #[test]
    fn empty_member_empties_the_set() {
        let trimmed = trim_series(vec![vec![1.0, 2.0], Vec::new()]).unwrap();
        assert!(trimmed.iter().all(Vec::is_empty));
        assert_eq!(trimmed.len(), 2);
    }

    #[test]
    fn empty_set_is_an_error() {
        assert_eq!(trim_series(Vec::new()), Err(HmError::EmptyInput));
    }
}
