//! Structured fuzz target for the compiler.
//!
//! Builds statements from arbitrary pieces and checks that an interpolated
//! value never changes the compiled statement text.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_compile
//! ```

#![no_main]

use std::sync::OnceLock;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use quarry_query::{Compiler, Params, parse_statement};
use quarry_schema::{BindingOptions, Catalog, SchemaRegistry};

const FIELDS: [&str; 4] = ["id", "email", "age", "name"];
const OPERATORS: [&str; 6] = ["==", "!=", ">", "<=", "like", "in"];

#[derive(Debug, Arbitrary)]
struct FuzzStatement {
    field: u8,
    operator: u8,
    value: String,
    limit: Option<u16>,
    with_posts: bool,
    single: bool,
}

impl FuzzStatement {
    fn source(&self) -> String {
        let field = FIELDS[self.field as usize % FIELDS.len()];
        let operator = OPERATORS[self.operator as usize % OPERATORS.len()];
        let mut source = format!("@query(Users | {} {} {{value}}", field, operator);
        if let Some(limit) = self.limit {
            source.push_str(&format!(" | limit {}", limit));
        }
        if self.with_posts {
            source.push_str(" | with posts");
        }
        source.push_str(if self.single { " ?-> *)" } else { " ??-> *)" });
        source
    }
}

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let mut registry = SchemaRegistry::new();
        registry
            .load(
                "@schema User { id: int, email: string, age: int?, name: string?, posts: [Post] via author_id }
                 @schema Post { id: int, author_id: int, title: string }",
            )
            .unwrap();
        let mut catalog = Catalog::new(registry);
        catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap();
        catalog.bind("Posts", "Post", "posts", BindingOptions::new()).unwrap();
        catalog
    })
}

fuzz_target!(|input: FuzzStatement| {
    let Ok(statement) = parse_statement(&input.source()) else {
        return;
    };
    let compiler = Compiler::new(catalog());

    let benign = compiler.compile(&statement, &Params::new().set("value", "x"));
    let fuzzed = compiler.compile(&statement, &Params::new().set("value", input.value.as_str()));

    if let (Ok(benign), Ok(fuzzed)) = (benign, fuzzed) {
        assert_eq!(benign.sql, fuzzed.sql);
    }
});
