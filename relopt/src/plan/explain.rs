use std::borrow::Cow;
use std::default::Default;
use std::io::{BufWriter, Write};

use ptree::print_config::UTF_CHARS;
use ptree::{write_tree_with, PrintConfig, Style, TreeItem};

use crate::error::OptResult;
use crate::plan::{RelNode, RelRef};

impl<'a> TreeItem for &'a RelNode {
    type Child = Self;

    fn write_self<W: Write>(&self, f: &mut W, style: &Style) -> std::io::Result<()> {
        write!(f, "{}", style.paint(self))
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        let node: &'a RelNode = *self;
        Cow::from(
            node.inputs()
                .iter()
                .chain(node.subplans())
                .map(|c| &**c)
                .collect::<Vec<&'a RelNode>>(),
        )
    }
}

pub fn explain<W: Write>(root: &RelRef, output: &mut W) -> std::io::Result<()> {
    let config = PrintConfig {
        indent: 3,
        characters: UTF_CHARS.into(),
        ..Default::default()
    };
    write_tree_with(&&**root, output, &config)
}

pub fn explain_to_string(root: &RelRef) -> OptResult<String> {
    let mut buf = BufWriter::new(Vec::new());

    explain(root, &mut buf)?;

    let bytes = buf.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use crate::expr::{col, eq, lit};
    use crate::plan::explain::explain_to_string;
    use crate::plan::RelBuilder;
    use crate::test_utils::{table_t1, table_t2};

    #[test]
    fn test_explain_plan() {
        let right = RelBuilder::scan(table_t2()).build();
        let plan = RelBuilder::scan(table_t1())
            .inner_join(right, vec![eq(col("t1.c1"), col("t2.c1"))])
            .unwrap()
            .select(vec![eq(col("t1.c2"), lit(3i64))])
            .unwrap()
            .project(vec![col("t1.c1")])
            .unwrap()
            .distinct()
            .limit(10)
            .unwrap()
            .build();

        let expected_result = "\
TopN { limit: 10 }
└─ Project { exprs: [t1.c1] } [Distinct]
   └─ Select { predicates: [t1.c2 = 3] }
      └─ Join { join_type: Inner, on: [t1.c1 = t2.c1] }
         ├─ BaseTable { table_name: \"t1\" }
         └─ BaseTable { table_name: \"t2\" }
";

        let result = explain_to_string(&plan).unwrap();

        assert_eq!(expected_result, result);
    }
}
