use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use document_core::{CP_UTF8, Document, DocumentOptions, SearchFlags};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (document-core bench)\n"
        ));
    }
    out
}

fn loaded_doc(line_count: usize) -> Document {
    let mut doc = Document::new(DocumentOptions::default());
    doc.set_dbcs_code_page(CP_UTF8);
    doc.insert_string(0, large_text(line_count).as_bytes())
        .unwrap();
    doc
}

fn bench_large_load(c: &mut Criterion) {
    let text = large_text(50_000);
    c.bench_function("load/50k_lines", |b| {
        b.iter(|| {
            let mut doc = Document::new(DocumentOptions::default());
            doc.insert_string(0, black_box(text.as_bytes())).unwrap();
            black_box(doc.lines_total());
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let doc = loaded_doc(10_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || loaded_doc(10_000),
            |mut doc| {
                let mut offset = doc.length() / 2;
                for _ in 0..100 {
                    doc.insert_string(offset, b"x").unwrap();
                    offset += 1;
                }
                black_box(doc.length());
            },
            BatchSize::SmallInput,
        )
    });
    drop(doc);
}

fn bench_undo_redo_cycle(c: &mut Criterion) {
    c.bench_function("undo_redo/100_edits", |b| {
        b.iter_batched(
            || {
                let mut doc = loaded_doc(1_000);
                for i in 0..100 {
                    doc.insert_string(i * 3, b"abc").unwrap();
                }
                doc
            },
            |mut doc| {
                while doc.can_undo() {
                    doc.undo().unwrap();
                }
                while doc.can_redo() {
                    doc.redo().unwrap();
                }
                black_box(doc.length());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_literal_search(c: &mut Criterion) {
    let mut doc = loaded_doc(50_000);
    let length = doc.length();
    c.bench_function("search/literal_case_sensitive", |b| {
        b.iter(|| {
            let m = doc
                .find_text(0, length, b"lazy dog (document", SearchFlags::MATCH_CASE)
                .unwrap();
            black_box(m);
        })
    });
    c.bench_function("search/literal_case_insensitive", |b| {
        b.iter(|| {
            let m = doc
                .find_text(0, length, b"LAZY DOG (DOCUMENT", SearchFlags::NONE)
                .unwrap();
            black_box(m);
        })
    });
}

fn bench_regex_search(c: &mut Criterion) {
    let mut doc = loaded_doc(10_000);
    let length = doc.length();
    c.bench_function("search/builtin_regex", |b| {
        b.iter(|| {
            let m = doc
                .find_text(
                    0,
                    length,
                    b"qu[a-z]+k",
                    SearchFlags::REGEXP | SearchFlags::MATCH_CASE,
                )
                .unwrap();
            black_box(m);
        })
    });
    c.bench_function("search/library_regex", |b| {
        b.iter(|| {
            let m = doc
                .find_text(
                    0,
                    length,
                    b"qu[a-z]+k",
                    SearchFlags::REGEXP | SearchFlags::MATCH_CASE | SearchFlags::LIBRARY_REGEX,
                )
                .unwrap();
            black_box(m);
        })
    });
}

fn bench_navigation(c: &mut Criterion) {
    let doc = loaded_doc(10_000);
    c.bench_function("navigation/count_characters", |b| {
        b.iter(|| black_box(doc.count_characters(0, doc.length())))
    });
    c.bench_function("navigation/word_hops", |b| {
        b.iter(|| {
            let mut pos = 0;
            for _ in 0..1_000 {
                pos = doc.next_word_start(pos, 1);
            }
            black_box(pos);
        })
    });
}

criterion_group!(
    benches,
    bench_large_load,
    bench_typing_in_middle,
    bench_undo_redo_cycle,
    bench_literal_search,
    bench_regex_search,
    bench_navigation
);
criterion_main!(benches);
