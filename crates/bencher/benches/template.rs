use bencher::TestFile;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use micro_engine::template::TemplateCache;
use serde_json::json;
use std::hint::black_box;

static HEADER: TestFile = TestFile::new("header.html", "<header><h1>{{ site }}</h1></header>");
static FOOTER: TestFile = TestFile::new("footer.html", "<footer>{{ year }}</footer>");
static PAGE: TestFile =
    TestFile::new("page.html", "{{> header.html }}<main><p>{{ title }}</p><p>{{ body }}</p></main>{{> footer.html }}");
static PLAIN: TestFile = TestFile::new("plain.html", "<p>{{ title }}</p>");

fn benchmark_render(criterion: &mut Criterion) {
    let dir = tempfile::tempdir().expect("scratch directory");
    for file in [HEADER, FOOTER, PAGE, PLAIN] {
        std::fs::write(dir.path().join(file.file_name()), file.content()).expect("template written");
    }

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
    let model = json!({ "site": "micro", "year": 2024, "title": "hello", "body": "world" });

    let mut group = criterion.benchmark_group("template_render");
    for cached in [true, false] {
        let cache = TemplateCache::new(dir.path(), dir.path(), cached);
        for file in [PLAIN, PAGE] {
            let id = BenchmarkId::new(if cached { "cached" } else { "uncached" }, file.file_name());
            group.bench_with_input(id, &file, |b, file| {
                b.iter(|| runtime.block_on(cache.render(black_box(file.file_name()), black_box(&model))));
            });
        }
    }
    group.finish();
}

criterion_group!(template, benchmark_render);
criterion_main!(template);
