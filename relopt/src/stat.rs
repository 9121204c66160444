//! Table statistics consumed by cardinality estimation.

use std::collections::HashMap;

use datafusion_common::ScalarValue;

/// Statistics of one column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStatistics {
    pub distinct_count: Option<f64>,
    pub min: Option<ScalarValue>,
    pub max: Option<ScalarValue>,
    /// Average width in bytes.
    pub avg_width: Option<f64>,
    pub null_fraction: Option<f64>,
}

impl ColumnStatistics {
    pub fn with_distinct_count(mut self, distinct_count: f64) -> Self {
        self.distinct_count = Some(distinct_count);
        self
    }

    pub fn with_range(mut self, min: ScalarValue, max: ScalarValue) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_avg_width(mut self, avg_width: f64) -> Self {
        self.avg_width = Some(avg_width);
        self
    }

    pub fn with_null_fraction(mut self, null_fraction: f64) -> Self {
        self.null_fraction = Some(null_fraction);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableStatistics {
    pub row_count: f64,
    columns: HashMap<String, ColumnStatistics>,
}

impl TableStatistics {
    pub fn new(row_count: f64) -> Self {
        Self {
            row_count,
            columns: HashMap::new(),
        }
    }

    pub fn with_column<S: Into<String>>(mut self, name: S, stats: ColumnStatistics) -> Self {
        self.columns.insert(name.into(), stats);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnStatistics> {
        self.columns.get(name)
    }
}
