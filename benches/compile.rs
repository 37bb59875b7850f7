//! Benchmarks for parsing and compiling statements.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use quarry::query::{Compiler, Engine, Params, parse_program, parse_statement};
use quarry::schema::{BindingOptions, Catalog, SchemaRegistry};
use std::hint::black_box;
use std::sync::Arc;

const SCHEMA: &str = r#"
    @schema User {
        id: int,
        email: string(unique: true),
        name: string?,
        age: int?,
        role: enum["admin", "member"](default: "member"),
        posts: [Post] via author_id,
    }

    @schema Post {
        id: int,
        author_id: int,
        title: string,
        published: bool(default: false),
        deleted_at: datetime?,
        author: User via author_id,
        comments: [Comment] via post_id,
    }

    @schema Comment {
        id: int,
        post_id: int,
        body: string,
    }
"#;

const STATEMENTS: [(&str, &str); 5] = [
    ("point_lookup", "@query(Users | email == {email} ?-> *)"),
    (
        "filtered_page",
        "@query(Users | age >= 18 and (role == \"admin\" or name like \"A%\") | order name desc | limit 20 | offset 40 ??-> id, name)",
    ),
    (
        "nested_with",
        "@query(Users | with posts(published == true | order title | limit 3 | with comments) ??-> *)",
    ),
    ("upsert", "@insert(Users |< email: {email} |< name: \"Ada\" | update on email ?-> id)"),
    ("soft_delete", "@delete(Posts | author_id in [1, 2, 3] .-> count)"),
];

fn catalog() -> Arc<Catalog> {
    let mut registry = SchemaRegistry::new();
    registry.load(SCHEMA).unwrap();
    let mut catalog = Catalog::new(registry);
    catalog.bind("Users", "User", "users", BindingOptions::new()).unwrap();
    catalog
        .bind("Posts", "Post", "posts", BindingOptions::new().soft_delete("deleted_at"))
        .unwrap();
    catalog
        .bind("Comments", "Comment", "comments", BindingOptions::new())
        .unwrap();
    Arc::new(catalog)
}

/// Benchmark parsing alone.
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for (name, source) in STATEMENTS {
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| black_box(parse_statement(black_box(source)).unwrap()))
        });
    }

    group.bench_function("transaction_block", |b| {
        let source = "@transaction { @insert(Users |< email: {email} .); return @query(Users | email == {email} ?-> id) }";
        b.iter(|| black_box(parse_program(black_box(source)).unwrap()))
    });

    group.finish();
}

/// Benchmark compiling pre-parsed statements.
fn bench_compile(c: &mut Criterion) {
    let catalog = catalog();
    let params = Params::new().set("email", "ada@example.com");
    let mut group = c.benchmark_group("compile");

    for (name, source) in STATEMENTS {
        let statement = parse_statement(source).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(name), &statement, |b, statement| {
            b.iter(|| black_box(Compiler::new(&catalog).compile(statement, &params).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark the full source-to-statement path.
fn bench_parse_and_compile(c: &mut Criterion) {
    let engine = Engine::new(catalog());
    let params = Params::new().set("email", "ada@example.com");
    let mut group = c.benchmark_group("parse_and_compile");

    for (name, source) in STATEMENTS {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |b, source| {
            b.iter(|| black_box(engine.compile_program(black_box(source), &params).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile, bench_parse_and_compile);
criterion_main!(benches);
