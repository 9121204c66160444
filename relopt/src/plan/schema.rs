use std::fmt::{Display, Formatter};

use arrow_schema::DataType;
use itertools::Itertools;

use crate::error::{OptResult, OptimizerError};
use crate::expr::ColumnRef;

/// One output column of a relational node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub qualifier: Option<String>,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new<N: Into<String>>(
        qualifier: Option<String>,
        name: N,
        data_type: DataType,
        nullable: bool,
    ) -> Self {
        Self {
            qualifier,
            name: name.into(),
            data_type,
            nullable,
        }
    }

    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef {
            relation: self.qualifier.clone(),
            name: self.name.clone(),
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_qualifier(mut self, qualifier: Option<String>) -> Self {
        self.qualifier = qualifier;
        self
    }

    fn matches(&self, column: &ColumnRef) -> bool {
        self.name == column.name
            && (column.relation.is_none() || column.relation == self.qualifier)
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:?}", self.column_ref(), self.data_type)
    }
}

/// Ordered output columns of a relational node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> &Field {
        &self.fields[idx]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of `column`.
    ///
    /// A qualified reference must match exactly. An unqualified reference matches a field by
    /// name, and is rejected when the name is ambiguous.
    pub fn index_of(&self, column: &ColumnRef) -> Option<usize> {
        let mut candidates = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.matches(column));
        match (candidates.next(), candidates.next()) {
            (Some((idx, _)), None) => Some(idx),
            _ => None,
        }
    }

    pub fn contains(&self, column: &ColumnRef) -> bool {
        self.index_of(column).is_some()
    }

    pub fn resolve(&self, column: &ColumnRef) -> OptResult<usize> {
        self.index_of(column).ok_or_else(|| {
            OptimizerError::ColumnNotFound {
                column: column.to_string(),
                schema: self.to_string(),
            }
            .into()
        })
    }

    pub fn field_for(&self, column: &ColumnRef) -> OptResult<&Field> {
        self.resolve(column).map(|idx| &self.fields[idx])
    }

    /// Concatenation of `self` and `other`.
    pub fn join(&self, other: &Schema) -> Schema {
        Schema::new(
            self.fields
                .iter()
                .chain(other.fields.iter())
                .cloned()
                .collect(),
        )
    }

    pub fn with_nullable(&self, nullable: bool) -> Schema {
        Schema::new(
            self.fields
                .iter()
                .cloned()
                .map(|f| {
                    let was_nullable = f.nullable;
                    f.with_nullable(nullable || was_nullable)
                })
                .collect(),
        )
    }

    pub fn column_refs(&self) -> Vec<ColumnRef> {
        self.fields.iter().map(Field::column_ref).collect()
    }

    /// The externally visible shape of a schema, ignoring nullability.
    pub fn names_and_types(&self) -> Vec<(ColumnRef, DataType)> {
        self.fields
            .iter()
            .map(|f| (f.column_ref(), f.data_type.clone()))
            .collect()
    }

    /// Whether the output column names are pairwise distinct.
    pub fn has_unique_names(&self) -> bool {
        self.fields.iter().map(Field::column_ref).all_unique()
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.fields.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new(Some("t".to_string()), "a", DataType::Int32, false),
            Field::new(Some("t".to_string()), "b", DataType::Utf8, true),
            Field::new(Some("s".to_string()), "a", DataType::Int64, false),
        ])
    }

    #[test]
    fn test_with_nullable() {
        let schema = schema();
        let nullable = schema.with_nullable(true);
        assert!(nullable.fields().iter().all(|f| f.nullable));
        assert_eq!(schema.names_and_types(), nullable.names_and_types());

        let unchanged = schema.with_nullable(false);
        assert_eq!(schema, unchanged);
    }

    #[test]
    fn test_index_of() {
        let schema = schema();
        assert_eq!(Some(0), schema.index_of(&ColumnRef::parse("t.a")));
        assert_eq!(Some(2), schema.index_of(&ColumnRef::parse("s.a")));
        assert_eq!(Some(1), schema.index_of(&ColumnRef::parse("b")));
        // Ambiguous.
        assert_eq!(None, schema.index_of(&ColumnRef::parse("a")));
        assert_eq!(None, schema.index_of(&ColumnRef::parse("s.b")));
    }

    #[test]
    fn test_resolve_error() {
        let err = schema().resolve(&ColumnRef::parse("x.y")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptimizerError>(),
            Some(OptimizerError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            "[t.a:Int32, t.b:Utf8, s.a:Int64]",
            schema().to_string()
        );
    }
}
