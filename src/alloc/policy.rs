//! Marginal benefit and cost of enabling or disabling one filter unit
//!
//! Every unit of a segment is an independent Bloom filter with the same
//! bits-per-key, so the combined false-positive rate of `u` enabled units is
//! `ρ^u` where `ρ` is the per-unit rate. Enabling one more unit saves
//! `visit_cnt × (ρ^u − ρ^{u+1})` expected wasted reads; disabling one costs
//! `visit_cnt × (ρ^{u−1} − ρ^u)`.

/// False-positive rate of a single filter unit given its bits per key.
///
/// The probe count is `⌊bits_per_key × ln 2⌋`, clamped to `[1, 30]`; we
/// intentionally round down to reduce probing cost a little bit.
pub fn unit_fp_rate(bits_per_key: u32) -> f64 {
    let mut num_probes = (bits_per_key as f64 * 0.69) as i32; // 0.69 =~ ln(2)
    num_probes = num_probes.clamp(1, 30);

    (1.0 - (-(num_probes as f64) / bits_per_key as f64).exp()).powi(num_probes)
}

/// Expected reduction in wasted reads from enabling one more unit.
///
/// Zero when the segment already sits at `limit` units, so bounded nodes
/// sink to the bottom of a benefit max-heap and are never grown past their
/// prediction.
pub fn enable_benefit(visit_cnt: u32, units_num: u16, limit: u16, bits_per_key: u32) -> f64 {
    if units_num >= limit {
        return 0.0;
    }

    let rate_per_unit = unit_fp_rate(bits_per_key);
    let rate = rate_per_unit.powi(units_num as i32);
    let next_rate = rate_per_unit.powi(units_num as i32 + 1);

    let benefit = visit_cnt as f64 * (rate - next_rate);
    debug_assert!(benefit >= 0.0, "enable benefit must be non-negative");
    benefit
}

/// Expected increase in wasted reads from disabling one unit.
///
/// Infinite when the segment already sits at `floor` units, so bounded
/// nodes sink to the bottom of a cost min-heap and are never shrunk below
/// the floor.
pub fn disable_cost(visit_cnt: u32, units_num: u16, floor: u16, bits_per_key: u32) -> f64 {
    if units_num <= floor {
        return f64::INFINITY;
    }

    let rate_per_unit = unit_fp_rate(bits_per_key);
    let rate = rate_per_unit.powi(units_num as i32);
    let prev_rate = rate_per_unit.powi(units_num as i32 - 1);

    let cost = visit_cnt as f64 * (prev_rate - rate);
    debug_assert!(cost >= 0.0, "disable cost must be non-negative");
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::BITS_PER_KEY_PER_UNIT;

    #[test]
    fn test_unit_fp_rate_in_unit_interval() {
        for bits in 1..16 {
            let rate = unit_fp_rate(bits);
            assert!(rate > 0.0 && rate < 1.0, "rate {} for {} bits", rate, bits);
        }
    }

    #[test]
    fn test_benefit_zero_at_limit() {
        assert_eq!(enable_benefit(1000, 6, 6, BITS_PER_KEY_PER_UNIT), 0.0);
        assert_eq!(enable_benefit(1000, 4, 4, BITS_PER_KEY_PER_UNIT), 0.0);
    }

    #[test]
    fn test_cost_infinite_at_floor() {
        assert_eq!(disable_cost(1000, 0, 0, BITS_PER_KEY_PER_UNIT), f64::INFINITY);
        assert_eq!(disable_cost(1000, 2, 2, BITS_PER_KEY_PER_UNIT), f64::INFINITY);
    }

    #[test]
    fn test_benefit_decreases_with_units() {
        // each additional unit multiplies the residual rate by ρ < 1, so the
        // marginal gain shrinks
        let b0 = enable_benefit(1000, 0, 6, BITS_PER_KEY_PER_UNIT);
        let b1 = enable_benefit(1000, 1, 6, BITS_PER_KEY_PER_UNIT);
        let b2 = enable_benefit(1000, 2, 6, BITS_PER_KEY_PER_UNIT);
        assert!(b0 > b1 && b1 > b2);
    }

    #[test]
    fn test_benefit_scales_with_visits() {
        let cold = enable_benefit(10, 2, 6, BITS_PER_KEY_PER_UNIT);
        let hot = enable_benefit(1000, 2, 6, BITS_PER_KEY_PER_UNIT);
        assert!(hot > cold);
    }

    #[test]
    fn test_swap_pair_is_profitable_when_expected() {
        // hot segment at few units vs cold segment at many units: the gain
        // from growing the hot one beats the cost of shrinking the cold one
        let benefit = enable_benefit(1000, 2, 6, BITS_PER_KEY_PER_UNIT);
        let cost = disable_cost(5, 4, 0, BITS_PER_KEY_PER_UNIT);
        assert!(benefit > cost);
    }
}
