//! Defines cost model.
//!
//! Costs are only compared between alternative join trees of the same relations, so the unit
//! is arbitrary. Cardinalities and selectivities come from [`Estimator`].

mod estimate;
pub use estimate::*;

use derive_more::{Add, AddAssign, Sub, SubAssign, Sum};

pub const INF: Cost = Cost(f64::INFINITY);

#[derive(
    Copy, Clone, Debug, PartialOrd, PartialEq, Add, Sub, Sum, AddAssign, SubAssign,
)]
pub struct Cost(f64);

impl Cost {
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl From<f64> for Cost {
    fn from(c: f64) -> Self {
        Cost(c)
    }
}

/// Estimated size and cost of a (sub)plan.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Estimate {
    pub rows: f64,
    /// Row width in bytes.
    pub width: f64,
    pub cost: Cost,
}

/// Hash join cost model: the smaller side is built, the output is probed and materialized.
#[derive(Clone, Debug)]
pub struct CostModel {
    build_cost: f64,
    probe_cost: f64,
    /// Factor applied to the build term of joins on a key.
    index_join_discount: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(1.0, 0.1)
    }
}

impl CostModel {
    pub fn new(build_cost: f64, probe_cost: f64) -> Self {
        Self {
            build_cost,
            probe_cost,
            index_join_discount: 0.5,
        }
    }

    pub fn leaf(&self, rows: f64, width: f64) -> Estimate {
        Estimate {
            rows,
            width,
            cost: Cost::from(rows),
        }
    }

    pub fn output_rows(selectivity: f64, left_rows: f64, right_rows: f64) -> f64 {
        (selectivity * left_rows.min(right_rows)).max(1.0)
    }

    /// Cost of joining `left` and `right`, accumulating the cost of both inputs.
    pub fn join(
        &self,
        left: &Estimate,
        right: &Estimate,
        selectivity: f64,
        key_join: bool,
    ) -> Estimate {
        let rows = Self::output_rows(selectivity, left.rows, right.rows);
        let mut build = left.rows.min(right.rows) * self.build_cost;
        if key_join {
            build *= self.index_join_discount;
        }
        let probe = rows * (left.width + right.width) * self.probe_cost;
        Estimate {
            rows,
            width: left.width + right.width,
            cost: left.cost + right.cost + Cost::from(build + probe),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_cost_accumulates() {
        let model = CostModel::new(1.0, 0.1);
        let a = model.leaf(1000.0, 8.0);
        let b = model.leaf(10.0, 8.0);
        let joined = model.join(&a, &b, 0.1, false);

        assert_eq!(1.0, joined.rows);
        assert_eq!(16.0, joined.width);
        assert!(joined.cost >= a.cost + b.cost);
        assert!((joined.cost.value() - (1010.0 + 10.0 + 1.6)).abs() < 1e-9);

        let key_join = model.join(&a, &b, 0.1, true);
        assert!(key_join.cost < joined.cost);
    }

    #[test]
    fn test_output_rows_at_least_one() {
        assert_eq!(1.0, CostModel::output_rows(1e-6, 10.0, 10.0));
        assert_eq!(50.0, CostModel::output_rows(0.5, 100.0, 1000.0));
    }

    #[test]
    fn test_infinite_cost() {
        assert!(Cost::from(1e300) < INF);
    }
}
