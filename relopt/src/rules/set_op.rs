use crate::error::OptResult;
use crate::operator::Operator::SetOp;
use crate::operator::SetOpKind;
use crate::plan::RelRef;
use crate::rules::RuleId::MergeSetOps;
use crate::rules::{pattern, Pattern, PatternBuilder, Rule, RuleContext, RuleId};

#[rustfmt::skip::macros(lazy_static)]
lazy_static! {
    static ref MERGE_SET_OPS_PATTERN: Pattern = {
        pattern(|op| matches!(op, SetOp(s) if s.kind() != SetOpKind::Except))
        .finish()
    };
}

/// Flattens union and intersect inputs of the same kind into one n-ary operator.
#[derive(Clone, Default)]
pub struct MergeSetOpsRule {}

impl MergeSetOpsRule {
    pub fn new() -> Self {
        Self {}
    }
}

impl Rule for MergeSetOpsRule {
    fn apply(&self, rel: RelRef, ctx: &mut RuleContext) -> OptResult<RelRef> {
        let set_op = match rel.operator() {
            SetOp(set_op) => set_op,
            _ => return Ok(rel),
        };
        let mergeable = |input: &RelRef| match input.operator() {
            SetOp(child) => {
                child == set_op && input.flags().is_empty() && !ctx.properties.is_shared(input)
            }
            _ => false,
        };
        if !rel.inputs().iter().any(mergeable) {
            return Ok(rel);
        }

        let mut inputs = vec![];
        for input in rel.inputs() {
            if mergeable(input) {
                inputs.extend(input.inputs().iter().cloned());
            } else {
                inputs.push(input.clone());
            }
        }
        Ok(rel.clone_with_inputs(inputs)?.into_ref())
    }

    fn pattern(&self) -> &Pattern {
        &MERGE_SET_OPS_PATTERN
    }

    fn rule_id(&self) -> RuleId {
        MergeSetOps
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::operator::SetOpKind;
    use crate::plan::{RelBuilder, RelRef};
    use crate::rules::MergeSetOpsRule;
    use crate::test_utils::{apply_rule, table_t2};

    fn scan() -> RelRef {
        RelBuilder::scan(table_t2()).build()
    }

    #[test]
    fn test_flatten_unions() {
        let nested = RelBuilder::new(scan()).union_all(scan()).unwrap().build();
        let plan = RelBuilder::new(nested)
            .union_all(scan())
            .unwrap()
            .build();

        let result = apply_rule(MergeSetOpsRule::new(), plan.clone());
        assert_eq!(3, result.inputs().len());
        assert!(result.inputs().iter().all(|i| i.operator().as_base_table().is_some()));
        assert_eq!(plan.schema(), result.schema());
    }

    #[test]
    fn test_keep_different_kinds() {
        let nested = RelBuilder::new(scan())
            .set_op(SetOpKind::Union, false, vec![scan()])
            .unwrap()
            .build();
        let plan = RelBuilder::new(nested)
            .union_all(scan())
            .unwrap()
            .build();

        let result = apply_rule(MergeSetOpsRule::new(), plan.clone());
        assert!(Arc::ptr_eq(&plan, &result));
    }
}
