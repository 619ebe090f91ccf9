//! Auto-Corrector
//!
//! 把兄弟节点的数值按比例缩放到目标总和。整数运算，结果总和精确等于目标，
//! 截断产生的余数全部加到最后一个兄弟上。

/// 按比例重新分配
///
/// 空输入或总和为 0 时无法缩放，返回 `None`
pub fn rebalance(values: &[u32], target: u32) -> Option<Vec<u32>> {
    let sum: u64 = values.iter().map(|&v| v as u64).sum();
    if values.is_empty() || sum == 0 {
        return None;
    }

    let target = target as u64;
    let mut scaled: Vec<u32> = values
        .iter()
        .map(|&v| ((v as u64 * target) / sum) as u32)
        .collect();

    let scaled_sum: u64 = scaled.iter().map(|&v| v as u64).sum();
    let remainder = (target - scaled_sum) as u32;
    if let Some(last) = scaled.last_mut() {
        *last += remainder;
    }
    Some(scaled)
}

/// 总和是否落在 `target ± pct%` 区间内
pub fn within_tolerance(sum: u64, target: u32, pct: u32) -> bool {
    let target = target as u64;
    let band = target * pct as u64 / 100;
    sum >= target.saturating_sub(band) && sum <= target + band
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rebalance_scales_and_assigns_remainder_to_last() {
        // 1000 / 1200 缩放后截断为 [250, 333, 416]，余数 1 归最后一个
        let corrected = rebalance(&[300, 400, 500], 1000).unwrap();
        assert_eq!(corrected, vec![250, 333, 417]);
        assert_eq!(corrected.iter().sum::<u32>(), 1000);
    }

    #[test]
    fn test_rebalance_act_percentages() {
        let corrected = rebalance(&[25, 25, 25, 30], 100).unwrap();
        assert_eq!(corrected.iter().sum::<u32>(), 100);
        assert_eq!(corrected.len(), 4);
    }

    #[test]
    fn test_rebalance_zero_sum_not_correctable() {
        assert_eq!(rebalance(&[0, 0, 0], 100), None);
        assert_eq!(rebalance(&[], 100), None);
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(1100, 1000, 10));
        assert!(within_tolerance(900, 1000, 10));
        assert!(!within_tolerance(1101, 1000, 10));
        assert!(!within_tolerance(899, 1000, 10));
        assert!(within_tolerance(100, 100, 0));
        assert!(!within_tolerance(101, 100, 0));
    }

    proptest! {
        #[test]
        fn prop_rebalance_exact_total(
            values in prop::collection::vec(1u32..100_000, 1..20),
            target in 0u32..1_000_000,
        ) {
            let corrected = rebalance(&values, target).unwrap();
            prop_assert_eq!(corrected.len(), values.len());
            prop_assert_eq!(corrected.iter().map(|&v| v as u64).sum::<u64>(), target as u64);
        }

        #[test]
        fn prop_rebalance_preserves_order(
            values in prop::collection::vec(1u32..100_000, 2..20),
            target in 1u32..1_000_000,
        ) {
            let corrected = rebalance(&values, target).unwrap();
            // 最后一个兄弟吸收余数，只比较其余位置
            let n = values.len() - 1;
            for i in 0..n {
                for j in 0..n {
                    if values[i] < values[j] {
                        prop_assert!(corrected[i] <= corrected[j]);
                    }
                }
            }
            prop_assert!(corrected[n] as u64 >= values[n] as u64 * target as u64 / values.iter().map(|&v| v as u64).sum::<u64>());
        }
    }
}
