use criterion::{criterion_group, criterion_main, Criterion};
use freezer_core::{Engine, FreezerConfig};
use std::fs;
use std::path::{Path, PathBuf};

/// A port manifest including `libs` library manifests of `files` modules each.
fn create_tree(dir: &Path, libs: usize, files: usize) -> PathBuf {
    let mut root = String::from("manifest_version = 1\n");
    for lib in 0..libs {
        let lib_dir = dir.join(format!("lib_{lib:02}"));
        fs::create_dir_all(lib_dir.join("src")).unwrap();
        for i in 0..files {
            fs::write(
                lib_dir.join("src").join(format!("mod_{lib:02}_{i:03}.py")),
                format!("VALUE = {i}\n"),
            )
            .unwrap();
        }
        fs::write(
            lib_dir.join("manifest.toml"),
            "manifest_version = 1\n[[directive]]\nfreeze = \"src\"\n",
        )
        .unwrap();
        root.push_str(&format!("[[directive]]\ninclude = \"lib_{lib:02}\"\n"));
    }
    let manifest = dir.join("manifest.toml");
    fs::write(&manifest, root).unwrap();
    manifest
}

fn bench_resolve(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_tree(dir.path(), 10, 50);
    let engine = Engine::new(FreezerConfig::default());

    c.bench_function("resolve_10libs_500files", |b| {
        b.iter(|| engine.resolve(&manifest).unwrap());
    });
}

fn bench_lock(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let manifest = create_tree(dir.path(), 10, 50);
    let engine = Engine::new(FreezerConfig::default());
    let resolution = engine.resolve(&manifest).unwrap();

    c.bench_function("lock_500files", |b| {
        b.iter(|| engine.lock(&resolution).unwrap());
    });
}

criterion_group!(benches, bench_resolve, bench_lock);
criterion_main!(benches);
