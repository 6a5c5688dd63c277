//! Benchmarks for iacgen core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use iacgen::convert::{build_forest, convert, Options};
use iacgen::core::parser::parse_module;
use iacgen::core::source::SourceFile;
use iacgen::core::storage::{ModuleStorage, NoCredentials};
use iacgen::core::template::parse_template;
use iacgen::core::tree::ModuleTree;
use std::path::{Path, PathBuf};

fn bench_parse_template(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_template");
    for parts in [1, 8, 64] {
        let template: String = (0..parts)
            .map(|i| format!("seg{}-${{var.name_{}}}-${{aws_s3_bucket.b{}.arn}}/", i, i, i))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(parts), &template, |b, t| {
            b.iter(|| black_box(parse_template(black_box(t)).unwrap()));
        });
    }
    group.finish();
}

/// A module with `n` resources chained through locals.
fn module_text(n: usize) -> String {
    let mut yaml = String::from("variables:\n  env:\n    default: dev\nproviders:\n  aws:\n    region: us-east-1\nlocals:\n");
    for i in 0..n {
        yaml.push_str(&format!("  name_{}: \"${{var.env}}-{}\"\n", i, i));
    }
    yaml.push_str("resources:\n");
    for i in 0..n {
        yaml.push_str(&format!(
            "  # Bucket {i}.\n  b{i}:\n    type: aws_s3_bucket\n    properties:\n      bucket: \"${{local.name_{i}}}\"\n"
        ));
        if i > 0 {
            yaml.push_str(&format!("      policy: \"${{aws_s3_bucket.b{}.arn}}\"\n", i - 1));
        }
    }
    yaml.push_str("outputs:\n  last:\n    value: \"${aws_s3_bucket.b0.arn}\"\n");
    yaml
}

fn bench_parse_module(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_module");
    for n in [10, 100] {
        let file = SourceFile::new(PathBuf::from("main.yaml"), "main.yaml".to_string(), module_text(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &file, |b, file| {
            b.iter(|| black_box(parse_module(black_box(file)).unwrap()));
        });
    }
    group.finish();
}

fn write_tree(root: &Path, n: usize) {
    std::fs::write(root.join("main.yaml"), module_text(n)).unwrap();
}

fn bench_build_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_forest");
    for n in [10, 100] {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), n);
        let mut tree = ModuleTree::new("", dir.path()).unwrap();
        tree.load(&ModuleStorage::new(dir.path().join(".cache"), Box::new(NoCredentials)))
            .unwrap();
        let opts = Options::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &tree, |b, tree| {
            b.iter(|| black_box(build_forest(tree, true, &opts).unwrap()));
        });
    }
    group.finish();
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");
    for target in ["typescript", "python"] {
        let dir = tempfile::tempdir().unwrap();
        write_tree(dir.path(), 50);
        let root = dir.path().to_path_buf();
        group.bench_with_input(BenchmarkId::from_parameter(target), &root, |b, root| {
            b.iter(|| {
                let opts = Options {
                    path: Some(root.clone()),
                    writer: Some(Box::new(std::io::sink())),
                    target_language: target.to_string(),
                    ..Default::default()
                };
                convert(opts).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse_template,
    bench_parse_module,
    bench_build_forest,
    bench_convert
);
criterion_main!(benches);
