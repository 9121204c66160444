//! Traversal engine.
//!
//! [`Visitor`] walks a plan top-down or bottom-up and lets a [`RelRewriter`] replace every node it
//! reaches. The relational spine is walked with an explicit work stack. Expression trees of each
//! node are walked too, as are relational subplans embedded in procedural statements.
//!
//! A node shared by several parents is rewritten once per visit, and all parents end up
//! referencing the same result.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail};
use log::trace;

use crate::error::{OptResult, OptimizerError};
use crate::expr::ScalarExpr;
use crate::operator::OperatorTrait;
use crate::plan::{rel_id, RelRef};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VisitOrder {
    TopDown,
    BottomUp,
}

/// Rewrite applied by [`Visitor`] to every node.
pub trait RelRewriter {
    /// Returns the replacement of `rel`, or `rel` itself when nothing changes.
    fn rewrite_rel(&mut self, rel: RelRef, depth: usize) -> OptResult<RelRef>;

    /// Whether [`RelRewriter::rewrite_expr`] should be applied to expression trees.
    fn rewrites_exprs(&self) -> bool {
        false
    }

    /// Rewrites one expression node, after its operands were rewritten.
    fn rewrite_expr(&mut self, expr: ScalarExpr) -> OptResult<ScalarExpr> {
        Ok(expr)
    }

    /// Called when `original` was rebuilt into `rebuilt` because its children or expressions
    /// changed. Both compute the same result.
    fn replaced(&mut self, _original: &RelRef, _rebuilt: &RelRef) {}
}

/// Adapts a closure to [`RelRewriter`].
pub struct FnRewriter<F>(pub F);

impl<F> RelRewriter for FnRewriter<F>
where
    F: FnMut(RelRef, usize) -> OptResult<RelRef>,
{
    fn rewrite_rel(&mut self, rel: RelRef, depth: usize) -> OptResult<RelRef> {
        (self.0)(rel, depth)
    }
}

enum Frame {
    Enter {
        rel: RelRef,
        depth: usize,
    },
    Exit {
        original: RelRef,
        rel: RelRef,
        depth: usize,
    },
}

pub struct Visitor {
    order: VisitOrder,
    max_depth: usize,
    changes: usize,
    /// Visited nodes and their results. The original is kept alive so its address is not reused.
    visited: HashMap<usize, (RelRef, RelRef)>,
}

impl Visitor {
    pub fn new(order: VisitOrder, max_depth: usize) -> Self {
        Self {
            order,
            max_depth,
            changes: 0,
            visited: HashMap::new(),
        }
    }

    /// Number of rewrites that altered the plan so far.
    pub fn changes(&self) -> usize {
        self.changes
    }

    pub fn visit<R: RelRewriter>(&mut self, root: RelRef, rewriter: &mut R) -> OptResult<RelRef> {
        self.visited.clear();
        let mut stack = vec![Frame::Enter {
            rel: root,
            depth: 0,
        }];
        let mut results: Vec<RelRef> = vec![];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter { rel, depth } => {
                    self.check_depth(depth)?;
                    if let Some((_, result)) = self.visited.get(&rel_id(&rel)) {
                        results.push(result.clone());
                        continue;
                    }

                    let current = match self.order {
                        VisitOrder::TopDown => self.apply(rewriter, rel.clone(), depth)?,
                        VisitOrder::BottomUp => rel.clone(),
                    };
                    let children = current
                        .inputs()
                        .iter()
                        .chain(current.subplans())
                        .cloned()
                        .collect::<Vec<_>>();
                    stack.push(Frame::Exit {
                        original: rel,
                        rel: current,
                        depth,
                    });
                    for child in children.into_iter().rev() {
                        stack.push(Frame::Enter {
                            rel: child,
                            depth: depth + 1,
                        });
                    }
                }
                Frame::Exit {
                    original,
                    rel,
                    depth,
                } => {
                    let arity = rel.inputs().len() + rel.subplans().len();
                    let at = results
                        .len()
                        .checked_sub(arity)
                        .ok_or_else(|| anyhow!("missing traversal results for {}", rel))?;
                    let children = results.split_off(at);

                    let mut new_rel = replace_children(rel.clone(), children)?;
                    if rewriter.rewrites_exprs() {
                        new_rel = self.rewrite_exprs(new_rel, depth, rewriter)?;
                    }
                    if !Arc::ptr_eq(&rel, &new_rel) {
                        rewriter.replaced(&rel, &new_rel);
                    }
                    let mut rel = new_rel;
                    if self.order == VisitOrder::BottomUp {
                        rel = self.apply(rewriter, rel, depth)?;
                    }

                    self.visited
                        .insert(rel_id(&original), (original, rel.clone()));
                    results.push(rel);
                }
            }
        }

        results
            .pop()
            .ok_or_else(|| anyhow!("traversal produced no result"))
    }

    fn check_depth(&self, depth: usize) -> OptResult<()> {
        if depth > self.max_depth {
            bail!(OptimizerError::DepthExceeded {
                depth,
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn apply<R: RelRewriter>(
        &mut self,
        rewriter: &mut R,
        rel: RelRef,
        depth: usize,
    ) -> OptResult<RelRef> {
        let new_rel = rewriter.rewrite_rel(rel.clone(), depth)?;
        if !Arc::ptr_eq(&rel, &new_rel) {
            self.changes += 1;
            trace!("Rewrote {} into {}", rel, new_rel);
        }
        Ok(new_rel)
    }

    fn rewrite_exprs<R: RelRewriter>(
        &mut self,
        mut rel: RelRef,
        depth: usize,
        rewriter: &mut R,
    ) -> OptResult<RelRef> {
        let mut new_exprs = Vec::new();
        let mut changed = false;
        for expr in rel.exprs() {
            let new_expr = self.visit_expr(expr.clone(), depth + 1, rewriter)?;
            changed |= &new_expr != expr;
            new_exprs.push(new_expr);
        }
        if !changed {
            return Ok(rel);
        }

        self.changes += 1;
        let old_schema = rel.schema().clone();
        let node = Arc::make_mut(&mut rel);
        for (slot, new_expr) in node.operator_mut().exprs_mut().into_iter().zip(new_exprs) {
            *slot = new_expr;
        }
        // Output columns keep their names.
        if let Some(outputs) = node.operator_mut().output_exprs_mut() {
            for (expr, field) in outputs.iter_mut().zip(old_schema.fields()) {
                *expr = std::mem::take(expr).with_output_name(&field.column_ref());
            }
        }
        node.rederive()?;
        Ok(rel)
    }

    fn visit_expr<R: RelRewriter>(
        &mut self,
        mut expr: ScalarExpr,
        depth: usize,
        rewriter: &mut R,
    ) -> OptResult<ScalarExpr> {
        self.check_depth(depth)?;
        for operand in expr.operands_mut() {
            let child = std::mem::take(operand);
            *operand = self.visit_expr(child, depth + 1, rewriter)?;
        }
        rewriter.rewrite_expr(expr)
    }
}

/// Puts rewritten inputs and subplans into `rel`, cloning it when shared.
fn replace_children(mut rel: RelRef, children: Vec<RelRef>) -> OptResult<RelRef> {
    let unchanged = rel
        .inputs()
        .iter()
        .chain(rel.subplans())
        .zip(children.iter())
        .all(|(old, new)| Arc::ptr_eq(old, new));
    if unchanged {
        return Ok(rel);
    }

    let node = Arc::make_mut(&mut rel);
    let mut children = children.into_iter();
    for slot in node.inputs_mut().iter_mut() {
        if let Some(child) = children.next() {
            *slot = child;
        }
    }
    for expr in node.operator_mut().exprs_mut() {
        for plan in expr.subplans_mut() {
            if let Some(child) = children.next() {
                *plan = child;
            }
        }
    }
    node.rederive()?;
    Ok(rel)
}

/// Visits `root` with a closure, returning the new plan and the number of changes.
pub fn visit<F>(
    root: RelRef,
    order: VisitOrder,
    max_depth: usize,
    rewrite_fn: F,
) -> OptResult<(RelRef, usize)>
where
    F: FnMut(RelRef, usize) -> OptResult<RelRef>,
{
    let mut visitor = Visitor::new(order, max_depth);
    let new_root = visitor.visit(root, &mut FnRewriter(rewrite_fn))?;
    Ok((new_root, visitor.changes()))
}
