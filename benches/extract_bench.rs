use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ejs_decoder::codec::{get_codec, CodecId, Decompressor};
use ejs_decoder::container::{frame, ContainerBuilder};
use ejs_decoder::extract::Extractor;
use ejs_decoder::pipeline::{decode_text, DecodeOptions};

fn sample_sheet() -> Vec<u8> {
    let mut buf = Vec::new();
    for i in 0..20_000u32 {
        buf.extend([0x0a, 0x08]);
        buf.extend(format!("r{i:07}").as_bytes());
        buf.extend([0x12, 0x09]);
        buf.extend("项目计划".as_bytes()[..9].iter());
        buf.push(0);
    }
    buf
}

fn bench_decompress(c: &mut Criterion) {
    let data   = sample_sheet();
    let packed = get_codec(CodecId::Zlib).compress(&data, 6).unwrap();
    let mut corrupt = packed.clone();
    corrupt[10..].iter_mut().for_each(|b| *b ^= 0x5a);
    let d = Decompressor::default();

    c.bench_function("inflate_zlib_sheet", |b| {
        b.iter(|| d.decompress_bytes(black_box(&packed)))
    });
    c.bench_function("fallback_chain_corrupt", |b| {
        b.iter(|| d.decompress_bytes(black_box(&corrupt)))
    });
}

fn bench_extract(c: &mut Criterion) {
    let data = sample_sheet();
    let x = Extractor::default();

    c.bench_function("extract_all_passes", |b| b.iter(|| x.extract(black_box(&data))));
    c.bench_function("extract_printable_runs", |b| b.iter(|| x.printable_runs(black_box(&data))));
}

fn bench_pipeline(c: &mut Criterion) {
    let text = ContainerBuilder::new()
        .metadata(&serde_json::json!({"bodyData": {"initialTitle": "bench"}}))
        .dimensions(20_000, 2)
        .workbook_bytes(&sample_sheet(), CodecId::Zlib)
        .unwrap()
        .build();
    let opts = DecodeOptions::default();

    c.bench_function("frame_container", |b| b.iter(|| frame(black_box(&text)).unwrap()));
    c.bench_function("decode_text_end_to_end", |b| {
        b.iter(|| decode_text(black_box(&text), &opts).unwrap())
    });
}

criterion_group!(benches, bench_decompress, bench_extract, bench_pipeline);
criterion_main!(benches);
