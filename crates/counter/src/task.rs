//! Units of count work.

use corelib::{split_two_level, RangePartitioner, TokenRange};

/// Count of one fine token range.
///
/// Tasks carry no state beyond their range; running one twice issues the same
/// query twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountTask {
    /// Position of the range in split order.
    pub id: usize,
    pub range: TokenRange,
}

/// One task per fine range of `range`, in token order.
pub fn plan(
    range: TokenRange,
    coarse: RangePartitioner,
    fine: RangePartitioner,
) -> impl Iterator<Item = CountTask> {
    split_two_level(range, coarse, fine)
        .enumerate()
        .map(|(id, range)| CountTask { id, range })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_numbers_tasks_in_order() {
        let tasks: Vec<_> = plan(
            TokenRange::new(0, 99).unwrap(),
            RangePartitioner::new(2).unwrap(),
            RangePartitioner::new(5).unwrap(),
        )
        .collect();
        assert_eq!(tasks.len(), 10);
        assert!(tasks.iter().enumerate().all(|(i, task)| task.id == i));
        assert_eq!(tasks[0].range, TokenRange::new(0, 9).unwrap());
        assert_eq!(tasks[9].range, TokenRange::new(90, 99).unwrap());
    }
}
