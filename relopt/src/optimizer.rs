use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use anyhow::bail;
use enumset::EnumSet;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::error::{OptResult, OptimizerError};
use crate::expr::Label;
use crate::heuristic::{cleanup_passes, join_order_pass, rewrite_passes, RewritePass};
use crate::plan::{bfs_iter, RelRef};
use crate::rules::RuleId;

/// Optimizer settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of rewrite cycles, and of cleanup cycles.
    pub max_passes: usize,
    /// Maximum nesting of plans and expressions.
    pub max_depth: usize,
    /// Join clusters with more relations are ordered greedily.
    pub dp_relation_limit: usize,
    /// Alternatives costed per memo item.
    pub max_alternatives: usize,
    pub build_cost: f64,
    /// Per unit of row width.
    pub probe_cost: f64,
    #[serde(skip)]
    pub disabled_rules: EnumSet<RuleId>,
    /// Check that every rewrite keeps the output names and types of the node it replaces.
    pub verify_schemas: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_passes: 20,
            max_depth: 1024,
            dp_relation_limit: 10,
            max_alternatives: 64,
            build_cost: 1.0,
            probe_cost: 0.1,
            disabled_rules: EnumSet::empty(),
            verify_schemas: cfg!(debug_assertions),
        }
    }
}

impl OptimizerConfig {
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_dp_relation_limit(mut self, limit: usize) -> Self {
        self.dp_relation_limit = limit;
        self
    }

    pub fn with_max_alternatives(mut self, max_alternatives: usize) -> Self {
        self.max_alternatives = max_alternatives;
        self
    }

    pub fn with_costs(mut self, build_cost: f64, probe_cost: f64) -> Self {
        self.build_cost = build_cost;
        self.probe_cost = probe_cost;
        self
    }

    pub fn with_disabled_rule(mut self, rule: RuleId) -> Self {
        self.disabled_rules.insert(rule);
        self
    }

    pub fn with_verify_schemas(mut self, verify: bool) -> Self {
        self.verify_schemas = verify;
        self
    }
}

/// Context for optimization. Includes access to catalog and settings.
#[derive(Clone)]
pub struct OptimizerContext {
    pub catalog: Arc<dyn Catalog>,
    pub config: OptimizerConfig,
    next_label: Label,
}

impl OptimizerContext {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            catalog,
            config: OptimizerConfig::default(),
            next_label: 1,
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// A label no column of the plan being optimized carries.
    pub fn next_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Makes sure labels handed out later do not clash with the columns of `root`.
    fn reserve_labels(&mut self, root: &RelRef) {
        let max = bfs_iter(root)
            .flat_map(|rel| {
                rel.schema()
                    .fields()
                    .iter()
                    .filter_map(|f| f.column_ref().as_label())
                    .collect::<Vec<_>>()
            })
            .max();
        if let Some(max) = max {
            self.next_label = self.next_label.max(max + 1);
        }
    }
}

impl Debug for OptimizerContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerContext")
            .field("config", &self.config)
            .field("next_label", &self.next_label)
            .finish()
    }
}

/// Changes made by one optimization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Rewrite cycles run before join ordering.
    pub cycles: usize,
    /// Changes of each pass run, in order.
    pub pass_changes: Vec<(&'static str, usize)>,
}

impl OptimizeReport {
    pub fn total_changes(&self) -> usize {
        self.pass_changes.iter().map(|(_, changes)| changes).sum()
    }
}

pub struct Optimizer {
    context: OptimizerContext,
}

impl Optimizer {
    pub fn new(context: OptimizerContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &OptimizerContext {
        &self.context
    }

    pub fn optimize(&mut self, root: RelRef) -> OptResult<RelRef> {
        self.optimize_with_report(root).map(|(root, _)| root)
    }

    /// Optimizes `root`, also returning what each pass changed.
    pub fn optimize_with_report(&mut self, root: RelRef) -> OptResult<(RelRef, OptimizeReport)> {
        let mut report = OptimizeReport::default();
        if root.inputs().is_empty() && root.subplans().is_empty() && root.is_single_row() {
            return Ok((root, report));
        }
        self.context.reserve_labels(&root);
        let original = root.clone();

        let (root, cycles) = self.run_to_fixpoint(root, &rewrite_passes(), &mut report)?;
        report.cycles = cycles;
        let root = self.run_pass(root, &join_order_pass(), &mut report)?;
        let (root, _) = self.run_to_fixpoint(root, &cleanup_passes(), &mut report)?;

        if original.schema().names_and_types() != root.schema().names_and_types() {
            bail!(OptimizerError::invariant(
                "optimizer",
                &original,
                format!(
                    "output changed from {} to {}",
                    original.schema(),
                    root.schema()
                )
            ));
        }
        debug!(
            "Optimized plan in {} cycles with {} changes",
            report.cycles,
            report.total_changes()
        );
        Ok((root, report))
    }

    /// Repeats `passes` until a cycle changes nothing or the cycle cap is reached.
    fn run_to_fixpoint(
        &mut self,
        mut root: RelRef,
        passes: &[RewritePass],
        report: &mut OptimizeReport,
    ) -> OptResult<(RelRef, usize)> {
        let max_passes = self.context.config.max_passes;
        for cycle in 1..=max_passes {
            let before = report.total_changes();
            for pass in passes {
                root = self.run_pass(root, pass, report)?;
            }
            if report.total_changes() == before {
                return Ok((root, cycle));
            }
        }
        debug!("No fix point after {} cycles", max_passes);
        Ok((root, max_passes))
    }

    fn run_pass(
        &mut self,
        root: RelRef,
        pass: &RewritePass,
        report: &mut OptimizeReport,
    ) -> OptResult<RelRef> {
        let (root, changes) = pass.run(root, &mut self.context)?;
        report.pass_changes.push((pass.name(), changes));
        Ok(root)
    }
}

/// Optimizes `root` with the default configuration.
pub fn optimize(root: RelRef, catalog: Arc<dyn Catalog>) -> OptResult<RelRef> {
    Optimizer::new(OptimizerContext::new(catalog)).optimize(root)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::catalog::MemoryCatalog;
    use crate::expr::{col, ColumnRef};
    use crate::optimizer::{Optimizer, OptimizerConfig, OptimizerContext};
    use crate::plan::RelBuilder;
    use crate::rules::RuleId;
    use crate::test_utils::table_t1;

    #[test]
    fn test_config_defaults() {
        let config: OptimizerConfig = serde_json::from_str(r#"{"max_passes": 3}"#).unwrap();
        assert_eq!(3, config.max_passes);
        assert_eq!(1024, config.max_depth);
        assert_eq!(10, config.dp_relation_limit);
        assert!(config.disabled_rules.is_empty());

        let config = config.with_disabled_rule(RuleId::JoinOrder);
        assert!(config.disabled_rules.contains(RuleId::JoinOrder));
    }

    #[test]
    fn test_labels_skip_existing() {
        let plan = RelBuilder::scan(table_t1())
            .project(vec![col("t1.c1").alias("%7")])
            .unwrap()
            .build();
        let mut ctx = OptimizerContext::new(Arc::new(MemoryCatalog::new()));
        ctx.reserve_labels(&plan);
        assert_eq!(8, ctx.next_label());
        assert_eq!(Some(9), ColumnRef::label(ctx.next_label()).as_label());
    }

    #[test]
    fn test_cycle_cap() {
        let plan = RelBuilder::scan(table_t1())
            .project(vec![col("t1.c1").alias("b")])
            .unwrap()
            .project(vec![col("b").alias("c")])
            .unwrap()
            .build();
        let ctx = OptimizerContext::new(Arc::new(MemoryCatalog::new()))
            .with_config(OptimizerConfig::default().with_max_passes(1));
        let (result, report) = Optimizer::new(ctx).optimize_with_report(plan.clone()).unwrap();
        assert_eq!(1, report.cycles);
        assert_eq!(plan.schema().names_and_types(), result.schema().names_and_types());
    }
}
