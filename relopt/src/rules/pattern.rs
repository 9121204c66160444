use crate::operator::Operator;
use crate::plan::RelNode;

pub type OperatorMatcher = fn(&Operator) -> bool;

/// A pattern defines how to match a sub tree of a plan.
///
/// If we want to match `Join(Select, BaseTable)` pattern, the pattern tree should be defined like:
/// ```
/// use relopt::operator::Operator;
/// use relopt::rules::{any, pattern, PatternBuilder};
///
/// pattern(|op| matches!(op, Operator::Join(_)))
///   .pattern(|op| matches!(op, Operator::Select(_)))
///     .leaf(any)
///   .finish()
///   .leaf(|op| matches!(op, Operator::BaseTable(_)))
/// .finish();
/// ```
///
/// The root node in pattern tree matches `Join` operator, the first child node matches
/// `Select` operator, and the last matches `BaseTable`.
pub struct Pattern {
    /// Matches against an operator.
    pub predict: OperatorMatcher,
    /// `None` for leaf node.
    pub children: Option<Vec<Pattern>>,
}

impl Pattern {
    pub fn new_leaf(matcher: OperatorMatcher) -> Pattern {
        Pattern {
            predict: matcher,
            children: None,
        }
    }

    pub fn new<I: IntoIterator<Item = Pattern>>(
        matcher: OperatorMatcher,
        children: I,
    ) -> Pattern {
        let children = children.into_iter().collect::<Vec<Pattern>>();
        let children_pattern = if !children.is_empty() {
            Some(children)
        } else {
            None
        };

        Pattern {
            predict: matcher,
            children: children_pattern,
        }
    }

    /// Whether the sub tree rooted at `rel` matches this pattern.
    pub fn matches(&self, rel: &RelNode) -> bool {
        if !(self.predict)(rel.operator()) {
            return false;
        }
        match &self.children {
            None => true,
            Some(children) => {
                children.len() <= rel.inputs().len()
                    && children
                        .iter()
                        .zip(rel.inputs())
                        .all(|(pattern, input)| pattern.matches(input))
            }
        }
    }
}

pub fn any(_: &Operator) -> bool {
    true
}

pub fn pattern(matcher: OperatorMatcher) -> RootPatternBuilder {
    RootPatternBuilder {
        matcher,
        inputs: vec![],
    }
}

pub trait PatternBuilder {
    type Child;
    type Output;
    fn pattern(self, matcher: OperatorMatcher) -> Self::Child;
    fn leaf(self, matcher: OperatorMatcher) -> Self;
    fn finish(self) -> Self::Output;
}

pub struct RootPatternBuilder {
    matcher: OperatorMatcher,
    inputs: Vec<Pattern>,
}

pub trait AddChild {
    fn add_child(&mut self, pattern: Pattern);
}

pub struct NonRootPatternBuilder<P> {
    parent_builder: P,
    matcher: OperatorMatcher,
    inputs: Vec<Pattern>,
}

impl<P: PatternBuilder + AddChild> PatternBuilder for NonRootPatternBuilder<P> {
    type Child = NonRootPatternBuilder<Self>;
    type Output = P;

    fn pattern(self, matcher: OperatorMatcher) -> NonRootPatternBuilder<Self> {
        NonRootPatternBuilder {
            parent_builder: self,
            matcher,
            inputs: vec![],
        }
    }

    fn leaf(mut self, matcher: OperatorMatcher) -> Self {
        self.inputs.push(Pattern::new_leaf(matcher));
        self
    }

    fn finish(mut self) -> Self::Output {
        let pattern = Pattern::new(self.matcher, self.inputs);
        self.parent_builder.add_child(pattern);
        self.parent_builder
    }
}

impl<P> AddChild for NonRootPatternBuilder<P> {
    fn add_child(&mut self, pattern: Pattern) {
        self.inputs.push(pattern)
    }
}

impl PatternBuilder for RootPatternBuilder {
    type Child = NonRootPatternBuilder<Self>;
    type Output = Pattern;

    fn pattern(self, matcher: OperatorMatcher) -> Self::Child {
        NonRootPatternBuilder {
            parent_builder: self,
            matcher,
            inputs: vec![],
        }
    }

    fn leaf(mut self, matcher: OperatorMatcher) -> Self {
        self.inputs.push(Pattern::new_leaf(matcher));
        self
    }

    fn finish(self) -> Self::Output {
        Pattern::new(self.matcher, self.inputs)
    }
}

impl AddChild for RootPatternBuilder {
    fn add_child(&mut self, pattern: Pattern) {
        self.inputs.push(pattern)
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{col, eq};
    use crate::operator::Operator;
    use crate::plan::RelBuilder;
    use crate::rules::{any, pattern, PatternBuilder};
    use crate::test_utils::{table_t1, table_t2};

    #[test]
    fn test_pattern_matches() {
        let pattern = pattern(|op| matches!(op, Operator::Join(_)))
            .pattern(|op| matches!(op, Operator::TopN(_)))
            .leaf(any)
            .finish()
            .leaf(|op| matches!(op, Operator::BaseTable(_)))
            .finish();

        let limited = RelBuilder::scan(table_t1()).limit(5).unwrap().build();
        let plan = RelBuilder::new(limited.clone())
            .inner_join(
                RelBuilder::scan(table_t2()).build(),
                vec![eq(col("t1.c1"), col("t2.c1"))],
            )
            .unwrap()
            .build();
        assert!(pattern.matches(&plan));

        let plan = RelBuilder::scan(table_t2())
            .inner_join(limited, vec![eq(col("t1.c1"), col("t2.c1"))])
            .unwrap()
            .build();
        assert!(!pattern.matches(&plan));
    }
}
