use std::collections::{HashMap, HashSet};

use anyhow::bail;
use datafusion_common::ScalarValue;
use datafusion_expr::JoinType;
use log::trace;

use crate::error::{OptResult, OptimizerError};
use crate::expr::{ColumnRef, ExprKind, ScalarExpr};
use crate::operator::{Operator, SetOpKind};
use crate::plan::{rel_id, RelNode, RelRef, Schema};
use crate::properties::{ColumnId, ColumnSet, PropertyRecord, PropertyTable};

/// Infers properties of every node reachable from `root`.
pub fn infer_properties(root: &RelRef, max_depth: usize) -> OptResult<PropertyTable> {
    let (order, parents) = post_order(root, max_depth)?;
    let mut table = PropertyTable::default();
    for rel in &order {
        for field in rel.schema().fields() {
            table.registry.intern(&field.column_ref());
        }
    }

    // Bottom-up.
    for rel in &order {
        let equivalences = infer_equivalences(&table, rel);
        let mut constants = infer_constants(&table, rel);
        propagate_constants(&equivalences, &mut constants);
        let record = PropertyRecord {
            constants,
            equivalences,
            needed: ColumnSet::new(),
            unique_keys: infer_keys(&table, rel),
            parents: parents.get(&rel_id(rel)).copied().unwrap_or(0),
        };
        table.insert(rel, record);
    }

    // Top-down, every parent precedes its children.
    mark_all_needed(&mut table, root);
    for rel in order.iter().rev() {
        if rel.is_distinct() {
            mark_all_needed(&mut table, rel);
        }
        let needed = match table.get(rel) {
            Some(record) => record.needed.clone(),
            None => continue,
        };
        let child_needs = child_needs(&table, rel, &needed);
        for (child, child_needed) in rel.inputs().iter().zip(child_needs) {
            if let Some(record) = table.record_mut(child) {
                record.needed.union_with(&child_needed);
            }
        }
        for subplan in rel.subplans() {
            mark_all_needed(&mut table, subplan);
        }
    }

    trace!("Inferred properties of {} nodes", order.len());
    Ok(table)
}

/// Nodes in post order, and the number of parents of each node.
fn post_order(
    root: &RelRef,
    max_depth: usize,
) -> OptResult<(Vec<RelRef>, HashMap<usize, usize>)> {
    let mut order = vec![];
    let mut parents = HashMap::new();
    let mut expanded = HashSet::new();
    let mut emitted = HashSet::new();
    let mut stack = vec![(root.clone(), 0, false)];

    while let Some((rel, depth, children_done)) = stack.pop() {
        if depth > max_depth {
            bail!(OptimizerError::DepthExceeded {
                depth,
                limit: max_depth,
            });
        }
        if children_done {
            if emitted.insert(rel_id(&rel)) {
                order.push(rel);
            }
            continue;
        }
        if !expanded.insert(rel_id(&rel)) {
            continue;
        }
        let children = rel
            .inputs()
            .iter()
            .chain(rel.subplans())
            .cloned()
            .collect::<Vec<_>>();
        stack.push((rel, depth, true));
        for child in children {
            *parents.entry(rel_id(&child)).or_insert(0) += 1;
            stack.push((child, depth + 1, false));
        }
    }
    Ok((order, parents))
}

fn output_id(table: &PropertyTable, schema: &Schema, idx: usize) -> Option<ColumnId> {
    table.registry.id(&schema.field(idx).column_ref())
}

/// Id of the field of `schema` referenced by `column`.
fn resolve_id(table: &PropertyTable, schema: &Schema, column: &ColumnRef) -> Option<ColumnId> {
    schema
        .index_of(column)
        .and_then(|idx| output_id(table, schema, idx))
}

fn all_ids(table: &PropertyTable, schema: &Schema) -> ColumnSet {
    (0..schema.len())
        .filter_map(|idx| output_id(table, schema, idx))
        .collect()
}

/// Ids of all columns referenced by `exprs`, resolved against `schema`.
fn referenced_ids<'a, I>(table: &PropertyTable, schema: &Schema, exprs: I) -> ColumnSet
where
    I: IntoIterator<Item = &'a ScalarExpr>,
{
    exprs
        .into_iter()
        .flat_map(|e| e.columns())
        .filter_map(|c| resolve_id(table, schema, c))
        .collect()
}

fn child_constants(table: &PropertyTable, child: &RelRef) -> HashMap<ColumnId, ScalarValue> {
    table
        .get(child)
        .map(|record| record.constants.clone())
        .unwrap_or_default()
}

fn infer_constants(table: &PropertyTable, rel: &RelRef) -> HashMap<ColumnId, ScalarValue> {
    let schema = rel.schema();
    let mut constants = HashMap::new();
    match rel.operator() {
        Operator::Values(values) if !values.rows().is_empty() => {
            for idx in 0..schema.len() {
                let mut literals = values.column_values(idx).map(|e| e.as_literal());
                if let Some(Some(first)) = literals.next() {
                    if literals.all(|l| l == Some(first)) {
                        if let Some(id) = output_id(table, schema, idx) {
                            constants.insert(id, first.clone());
                        }
                    }
                }
            }
        }
        Operator::Project(_) | Operator::GroupBy(_) => {
            let input = rel.input(0);
            let exprs = rel.operator().output_exprs().unwrap_or_default();
            for (idx, expr) in exprs.iter().enumerate() {
                let value = match &expr.kind {
                    ExprKind::Literal(v) if !v.is_null() => Some(v.clone()),
                    ExprKind::Column(c) => table.constant(input, c).cloned(),
                    _ => None,
                };
                if let (Some(value), Some(id)) = (value, output_id(table, schema, idx)) {
                    constants.insert(id, value);
                }
            }
        }
        Operator::Select(select) => {
            constants = child_constants(table, rel.input(0));
            apply_equalities(table, select.predicates(), schema, &mut constants);
        }
        Operator::TopN(_) | Operator::Sample(_) => {
            constants = child_constants(table, rel.input(0));
        }
        Operator::Join(join) => {
            let (left, right) = (rel.input(0), rel.input(1));
            match join.join_type() {
                JoinType::Inner | JoinType::LeftSemi | JoinType::RightSemi => {
                    constants = child_constants(table, left);
                    constants.extend(child_constants(table, right));
                    let condition_schema = left.schema().join(right.schema());
                    apply_equalities(table, join.on(), &condition_schema, &mut constants);
                }
                JoinType::Left | JoinType::LeftAnti => constants = child_constants(table, left),
                JoinType::Right | JoinType::RightAnti => {
                    constants = child_constants(table, right)
                }
                JoinType::Full => {}
            }
            let output = all_ids(table, schema);
            constants.retain(|id, _| output.contains(*id));
        }
        Operator::SetOp(set_op) => {
            let inputs = rel.inputs();
            for idx in 0..schema.len() {
                let mut values = inputs.iter().map(|input| {
                    output_id(table, input.schema(), idx)
                        .and_then(|id| table.get(input)?.constants.get(&id).cloned())
                });
                let value = match set_op.kind() {
                    SetOpKind::Union => {
                        let first = values.next().flatten();
                        first.filter(|v| values.all(|other| other.as_ref() == Some(v)))
                    }
                    SetOpKind::Intersect => values.flatten().next(),
                    SetOpKind::Except => values.next().flatten(),
                };
                if let (Some(value), Some(id)) = (value, output_id(table, schema, idx)) {
                    constants.insert(id, value);
                }
            }
        }
        _ => {}
    }
    constants
}

fn child_equivalences(table: &PropertyTable, child: &RelRef) -> Vec<(ColumnId, ColumnId)> {
    table
        .get(child)
        .map(|record| record.equivalences.clone())
        .unwrap_or_default()
}

/// Pairs of columns of `schema` compared by `col = col` predicates.
fn column_equalities(
    table: &PropertyTable,
    predicates: &[ScalarExpr],
    schema: &Schema,
) -> Vec<(ColumnId, ColumnId)> {
    predicates
        .iter()
        .filter_map(|p| p.as_compare().filter(|c| c.is_equality())?.equi_columns())
        .filter_map(|(a, b)| Some((resolve_id(table, schema, a)?, resolve_id(table, schema, b)?)))
        .filter(|(a, b)| a != b)
        .collect()
}

/// Column equalities holding on the output of `rel`.
fn infer_equivalences(table: &PropertyTable, rel: &RelRef) -> Vec<(ColumnId, ColumnId)> {
    let schema = rel.schema();
    let mut equivalences = match rel.operator() {
        Operator::Select(select) => {
            let mut pairs = child_equivalences(table, rel.input(0));
            pairs.extend(column_equalities(table, select.predicates(), schema));
            pairs
        }
        Operator::TopN(_) | Operator::Sample(_) => child_equivalences(table, rel.input(0)),
        Operator::Join(join) => {
            let (left, right) = (rel.input(0), rel.input(1));
            match join.join_type() {
                JoinType::Inner | JoinType::LeftSemi | JoinType::RightSemi => {
                    let mut pairs = child_equivalences(table, left);
                    pairs.extend(child_equivalences(table, right));
                    let condition_schema = left.schema().join(right.schema());
                    pairs.extend(column_equalities(table, join.on(), &condition_schema));
                    pairs
                }
                JoinType::Left | JoinType::LeftAnti => child_equivalences(table, left),
                JoinType::Right | JoinType::RightAnti => child_equivalences(table, right),
                JoinType::Full => vec![],
            }
        }
        Operator::Project(_) | Operator::GroupBy(_) => {
            let input = rel.input(0);
            let exprs = rel.operator().output_exprs().unwrap_or_default();
            let mut outputs: HashMap<ColumnId, Vec<ColumnId>> = HashMap::new();
            for (idx, expr) in exprs.iter().enumerate() {
                let source = expr
                    .as_column()
                    .and_then(|c| resolve_id(table, input.schema(), c));
                if let (Some(source), Some(id)) = (source, output_id(table, schema, idx)) {
                    outputs.entry(source).or_default().push(id);
                }
            }
            let mut pairs = vec![];
            for ids in outputs.values() {
                pairs.extend(ids.windows(2).map(|w| (w[0], w[1])));
            }
            for (a, b) in child_equivalences(table, input) {
                if let (Some(a), Some(b)) = (outputs.get(&a), outputs.get(&b)) {
                    pairs.push((a[0], b[0]));
                }
            }
            pairs
        }
        _ => vec![],
    };
    let output = all_ids(table, schema);
    equivalences.retain(|(a, b)| output.contains(*a) && output.contains(*b));
    equivalences.sort_unstable();
    equivalences.dedup();
    equivalences
}

/// Copies constants across equal columns until nothing changes.
fn propagate_constants(
    equivalences: &[(ColumnId, ColumnId)],
    constants: &mut HashMap<ColumnId, ScalarValue>,
) {
    loop {
        let mut changed = false;
        for (a, b) in equivalences {
            let value = match (constants.get(a), constants.get(b)) {
                (Some(v), None) => Some((*b, v.clone())),
                (None, Some(v)) => Some((*a, v.clone())),
                _ => None,
            };
            if let Some((id, v)) = value {
                constants.insert(id, v);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// Adds constants implied by `col = literal` and `col = col` predicates.
fn apply_equalities(
    table: &PropertyTable,
    predicates: &[ScalarExpr],
    schema: &Schema,
    constants: &mut HashMap<ColumnId, ScalarValue>,
) {
    loop {
        let mut changed = false;
        for predicate in predicates {
            let compare = match predicate.as_compare() {
                Some(c) if c.is_equality() => c,
                _ => continue,
            };
            match (&compare.left.kind, &compare.right.kind) {
                (ExprKind::Column(c), ExprKind::Literal(v))
                | (ExprKind::Literal(v), ExprKind::Column(c))
                    if !v.is_null() =>
                {
                    if let Some(id) = resolve_id(table, schema, c) {
                        if !constants.contains_key(&id) {
                            constants.insert(id, v.clone());
                            changed = true;
                        }
                    }
                }
                (ExprKind::Column(a), ExprKind::Column(b)) => {
                    if let (Some(a), Some(b)) =
                        (resolve_id(table, schema, a), resolve_id(table, schema, b))
                    {
                        let value = match (constants.get(&a), constants.get(&b)) {
                            (Some(v), None) => Some((b, v.clone())),
                            (None, Some(v)) => Some((a, v.clone())),
                            _ => None,
                        };
                        if let Some((id, v)) = value {
                            constants.insert(id, v);
                            changed = true;
                        }
                    }
                }
                _ => {}
            }
        }
        if !changed {
            break;
        }
    }
}

fn child_keys(table: &PropertyTable, child: &RelRef) -> Vec<ColumnSet> {
    table
        .get(child)
        .map(|record| record.unique_keys.clone())
        .unwrap_or_default()
}

/// Maps keys of `input` onto the output of `rel`, where output `idx` carries input column
/// `source(idx)`. Keys with a column missing from the output are dropped.
fn map_keys<F>(table: &PropertyTable, rel: &RelNode, input: &RelRef, source: F) -> Vec<ColumnSet>
where
    F: Fn(usize) -> Option<ColumnId>,
{
    let schema = rel.schema();
    let mapping = (0..schema.len())
        .filter_map(|idx| Some((source(idx)?, output_id(table, schema, idx)?)))
        .collect::<HashMap<_, _>>();
    child_keys(table, input)
        .into_iter()
        .filter_map(|key| {
            key.iter()
                .map(|id| mapping.get(&id).copied())
                .collect::<Option<ColumnSet>>()
        })
        .collect()
}

fn infer_keys(table: &PropertyTable, rel: &RelRef) -> Vec<ColumnSet> {
    if rel.is_single_row() {
        return vec![ColumnSet::new()];
    }
    let schema = rel.schema();
    let mut keys = match rel.operator() {
        Operator::BaseTable(scan) => scan
            .table()
            .keys()
            .into_iter()
            .filter_map(|key| {
                key.iter()
                    .map(|name| {
                        table
                            .registry
                            .id(&ColumnRef::qualified(scan.relation_name(), name.as_str()))
                    })
                    .collect::<Option<ColumnSet>>()
            })
            .collect(),
        Operator::Select(_) | Operator::TopN(_) | Operator::Sample(_) => {
            child_keys(table, rel.input(0))
        }
        Operator::Project(_) | Operator::GroupBy(_) => {
            let input = rel.input(0);
            let exprs = rel.operator().output_exprs().unwrap_or_default();
            let source = |idx: usize| {
                let column = exprs.get(idx)?.as_column()?;
                resolve_id(table, input.schema(), column)
            };
            match rel.operator() {
                Operator::GroupBy(group_by) => {
                    // Output is unique on the group keys when all of them are projected.
                    let key_ids = referenced_ids(table, input.schema(), group_by.keys());
                    let projected = (0..schema.len())
                        .filter_map(|idx| Some((source(idx)?, output_id(table, schema, idx)?)))
                        .collect::<HashMap<_, _>>();
                    let all_plain = group_by.keys().iter().all(|k| k.as_column().is_some());
                    key_ids
                        .iter()
                        .map(|id| projected.get(&id).copied())
                        .collect::<Option<ColumnSet>>()
                        .filter(|_| all_plain)
                        .into_iter()
                        .collect()
                }
                _ => map_keys(table, rel, input, source),
            }
        }
        Operator::Join(join) => {
            let (left, right) = (rel.input(0), rel.input(1));
            let (left_cols, right_cols) = equi_join_columns(join.on(), left, right);
            let left_keys = child_keys(table, left);
            let right_keys = child_keys(table, right);
            let right_unique = !right_cols.is_empty()
                && table.is_unique_on(right, &right_cols.iter().collect::<Vec<_>>());
            let left_unique = !left_cols.is_empty()
                && table.is_unique_on(left, &left_cols.iter().collect::<Vec<_>>());
            let composite = match (left_keys.first(), right_keys.first()) {
                (Some(l), Some(r)) => {
                    let mut key = l.clone();
                    key.union_with(r);
                    vec![key]
                }
                _ => vec![],
            };
            let mut keys = vec![];
            match join.join_type() {
                JoinType::Inner => {
                    if right_unique {
                        keys.extend(left_keys);
                    }
                    if left_unique {
                        keys.extend(right_keys);
                    }
                    keys.extend(composite);
                }
                JoinType::Left => {
                    if right_unique {
                        keys.extend(left_keys);
                    }
                    keys.extend(composite);
                }
                JoinType::Right => {
                    if left_unique {
                        keys.extend(right_keys);
                    }
                    keys.extend(composite);
                }
                JoinType::Full => keys.extend(composite),
                JoinType::LeftSemi | JoinType::LeftAnti => keys.extend(left_keys),
                JoinType::RightSemi | JoinType::RightAnti => keys.extend(right_keys),
            }
            let output = all_ids(table, schema);
            keys.retain(|key| key.is_subset(&output));
            keys
        }
        Operator::SetOp(set_op) if !set_op.all() => vec![all_ids(table, schema)],
        Operator::SetOp(set_op) if set_op.kind() == SetOpKind::Except => {
            let input = rel.input(0);
            map_keys(table, rel, input, |idx| output_id(table, input.schema(), idx))
        }
        _ => vec![],
    };
    if rel.is_distinct() {
        keys.push(all_ids(table, schema));
    }
    keys
}

/// Columns of `left` and `right` compared by equality predicates of a join condition.
pub fn equi_join_columns(
    on: &[ScalarExpr],
    left: &RelRef,
    right: &RelRef,
) -> (Vec<ColumnRef>, Vec<ColumnRef>) {
    let mut left_cols = vec![];
    let mut right_cols = vec![];
    for (a, b) in on
        .iter()
        .filter_map(|p| p.as_compare())
        .filter_map(|c| c.equi_columns())
    {
        if left.schema().contains(a) && right.schema().contains(b) {
            left_cols.push(a.clone());
            right_cols.push(b.clone());
        } else if left.schema().contains(b) && right.schema().contains(a) {
            left_cols.push(b.clone());
            right_cols.push(a.clone());
        }
    }
    (left_cols, right_cols)
}

fn mark_all_needed(table: &mut PropertyTable, rel: &RelRef) {
    let ids = all_ids(table, rel.schema());
    if let Some(record) = table.record_mut(rel) {
        record.needed.union_with(&ids);
    }
}

/// Columns each input must provide so that `needed` output columns of `rel` can be computed.
fn child_needs(table: &PropertyTable, rel: &RelRef, needed: &ColumnSet) -> Vec<ColumnSet> {
    let schema = rel.schema();
    let needed_outputs = (0..schema.len())
        .filter(|idx| output_id(table, schema, *idx).map_or(true, |id| needed.contains(id)))
        .collect::<Vec<_>>();

    match rel.operator() {
        Operator::Project(project) => {
            let input = rel.input(0).schema();
            let exprs = needed_outputs
                .iter()
                .filter_map(|idx| project.exprs().get(*idx))
                .chain(project.order_by());
            vec![referenced_ids(table, input, exprs)]
        }
        Operator::GroupBy(group_by) => {
            let input = rel.input(0).schema();
            let exprs = needed_outputs
                .iter()
                .filter_map(|idx| group_by.exprs().get(*idx))
                .chain(group_by.keys());
            vec![referenced_ids(table, input, exprs)]
        }
        Operator::Select(select) => {
            let mut child = needed.clone();
            child.union_with(&referenced_ids(table, schema, select.predicates()));
            vec![child]
        }
        Operator::TopN(_) | Operator::Sample(_) => vec![needed.clone()],
        Operator::Join(join) => {
            let (left, right) = (rel.input(0).schema(), rel.input(1).schema());
            let condition = referenced_ids(table, &left.join(right), join.on());
            [left, right]
                .iter()
                .map(|side| {
                    all_ids(table, side)
                        .iter()
                        .filter(|id| needed.contains(*id) || condition.contains(*id))
                        .collect()
                })
                .collect()
        }
        Operator::SetOp(set_op) if set_op.is_union_all() => rel
            .inputs()
            .iter()
            .map(|input| {
                needed_outputs
                    .iter()
                    .filter_map(|idx| output_id(table, input.schema(), *idx))
                    .collect()
            })
            .collect(),
        _ => rel
            .inputs()
            .iter()
            .map(|input| all_ids(table, input.schema()))
            .collect(),
    }
}
