use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ejs_decoder::codec::{get_codec, CodecId, Decompressor};
use ejs_decoder::container::ContainerBuilder;
use ejs_decoder::pipeline::{
    decode_batch, decode_container, decode_text, DecodeError, DecodeOptions,
};
use ejs_decoder::{FrameError, TableResult};
use proptest::collection::vec;
use proptest::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn zlib_b64(text: &str) -> String {
    STANDARD.encode(get_codec(CodecId::Zlib).compress(text.as_bytes(), 6).unwrap())
}

/// The literal four-line container: `json`, `2`, `{}`, envelope.
fn hello_container() -> String {
    [
        "json".to_string(),
        "2".to_string(),
        "{}".to_string(),
        format!("%7B%22workbook%22%3A%22{}%22%7D", zlib_b64("HELLO WORLD")),
    ]
    .join("\n")
}

fn csv_files(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.extension().map_or(false, |x| x == "csv")
                && p.to_string_lossy().contains("_decoded_")
        })
        .collect()
}

fn into_dir(dir: &Path) -> DecodeOptions {
    DecodeOptions { output_dir: Some(dir.to_path_buf()), ..DecodeOptions::default() }
}

#[test]
fn test_end_to_end_hello_world() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("hello.xlsx");
    std::fs::write(&input, hello_container()).unwrap();

    let result = decode_container(&input, &DecodeOptions::default());
    let report = result.report().expect("decode should succeed");
    assert_eq!(report.codec, Some(CodecId::Zlib));
    assert!(report.cell_count > 0);

    let decoded = decode_text(&hello_container(), &DecodeOptions::default()).unwrap();
    assert!(decoded.table.rows[0].iter().any(|c| c == "HELLO WORLD"));

    let csv = std::fs::read_to_string(&report.csv_path).unwrap();
    assert!(csv.starts_with("\"HELLO WORLD\""), "{csv}");
    assert!(report.csv_path.file_name().unwrap().to_string_lossy().starts_with("hello_decoded_"));
    assert_eq!(csv_files(dir.path()), vec![report.csv_path.clone()]);
}

#[test]
fn test_no_workbook_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("empty.csv");
    std::fs::write(&input, "head\n3\nabc\njson\n2\n{}\n").unwrap();

    let result = decode_container(&input, &DecodeOptions::default());
    assert!(matches!(result.outcome, Err(DecodeError::Frame(FrameError::NoWorkbookFound))));
    assert!(result.error_message().is_some());
    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_empty_payload_is_no_data() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("blank.csv");
    // Inflates to NUL bytes only: no pass recovers anything.
    let blank = STANDARD.encode(get_codec(CodecId::Zlib).compress(&[0u8; 16], 6).unwrap());
    std::fs::write(&input, ContainerBuilder::new().workbook_base64(&blank).build()).unwrap();

    let result = decode_container(&input, &DecodeOptions::default());
    assert!(matches!(
        result.outcome,
        Err(DecodeError::Export(ejs_decoder::table::ExportError::NoData))
    ));
    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_batch_isolates_failures() {
    let dir = TempDir::new().unwrap();
    let good = dir.path().join("good.csv");
    let bad  = dir.path().join("bad.csv");
    let gone = dir.path().join("missing.csv");
    std::fs::write(&good, hello_container()).unwrap();
    std::fs::write(&bad, "nothing to see\n").unwrap();

    let out = TempDir::new().unwrap();
    let opts = into_dir(out.path());
    let summary = decode_batch(&[bad.clone(), good.clone(), gone.clone()], &opts);

    assert_eq!(summary.results.len(), 3);
    assert_eq!(summary.results[0].path, bad);
    assert_eq!(summary.results[1].path, good);
    assert_eq!(summary.success_count(), 1);
    assert_eq!(summary.failure_count(), 2);
    assert!(summary.any_succeeded());
    assert!(matches!(summary.results[2].outcome, Err(DecodeError::Read { .. })));
    assert_eq!(csv_files(out.path()).len(), 1);
    assert!(csv_files(dir.path()).is_empty());
}

#[test]
fn test_same_stem_inputs_get_separate_csv_files() {
    let dir = TempDir::new().unwrap();
    let csv_input  = dir.path().join("report.csv");
    let xlsx_input = dir.path().join("report.xlsx");
    let alpha_text = ContainerBuilder::new().workbook_text("ALPHA").unwrap().build();
    let bravo_text = ContainerBuilder::new().workbook_text("BRAVO").unwrap().build();
    std::fs::write(&csv_input, alpha_text).unwrap();
    std::fs::write(&xlsx_input, bravo_text).unwrap();

    for _ in 0..5 {
        let out = TempDir::new().unwrap();
        let opts = into_dir(out.path());
        let summary = decode_batch(&[csv_input.clone(), xlsx_input.clone()], &opts);
        assert_eq!(summary.success_count(), 2);

        let alpha = summary.results[0].report().unwrap().csv_path.clone();
        let bravo = summary.results[1].report().unwrap().csv_path.clone();
        assert_ne!(alpha, bravo);
        assert_eq!(csv_files(out.path()).len(), 2);

        let alpha_csv = std::fs::read_to_string(&alpha).unwrap();
        let bravo_csv = std::fs::read_to_string(&bravo).unwrap();
        assert!(alpha_csv.contains("\"ALPHA\"") && !alpha_csv.contains("BRAVO"), "{alpha_csv}");
        assert!(bravo_csv.contains("\"BRAVO\"") && !bravo_csv.contains("ALPHA"), "{bravo_csv}");
    }
}

#[test]
fn test_envelope_decode_error_is_fatal() {
    let text = "json\n2\n{}\n%7B%22workbook%22%3A%7D\n";
    match decode_text(text, &DecodeOptions::default()) {
        Err(DecodeError::Frame(FrameError::EnvelopeDecode { line: 3, .. })) => {}
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_builder_container_with_metadata_and_related_sheet() {
    let text = ContainerBuilder::new()
        .head("ejs")
        .metadata(&serde_json::json!({"bodyData": {"initialTitle": "年项目计划与安排表"}}))
        .dimensions(41, 19)
        .workbook_bytes("\u{0}序号\u{0}项目类型\u{0}负责人\u{0}".as_bytes(), CodecId::Gzip)
        .unwrap()
        .related_sheet_bytes(b"\x12\x06Status", CodecId::Zlib)
        .unwrap()
        .build();

    let d = decode_text(&text, &DecodeOptions::default()).unwrap();
    assert_eq!(d.frame.title(), Some("年项目计划与安排表"));
    assert_eq!((d.frame.max_row(), d.frame.max_col()), (41, 19));
    assert_eq!(d.primary.codec, Some(CodecId::Gzip));
    let contents: Vec<&str> = d.cells.iter().map(|c| c.content.as_str()).collect();
    assert!(contents.contains(&"项目类型"));
    assert!(contents.contains(&"负责人"));
    let owner  = contents.iter().position(|c| *c == "负责人").unwrap();
    let status = contents.iter().position(|c| *c == "Status").unwrap();
    assert!(owner < status, "related_sheet cells come after workbook cells");
}

#[test]
fn test_csv_quoting_roundtrip_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("q.csv");
    let t = TableResult { rows: vec![vec![r#"He said "hi""#.to_string()]] };
    t.write_csv(&path).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "\"He said \"\"hi\"\"\"\n");
}

proptest! {
    #[test]
    fn decompress_never_fails_on_arbitrary_bytes(bytes in vec(any::<u8>(), 0..2048)) {
        let out = Decompressor::default().decompress_bytes(&bytes);
        if out.codec.is_none() {
            prop_assert_eq!(out.bytes, bytes);
        }
    }

    #[test]
    fn decompress_never_fails_on_zlib_lookalikes(tail in vec(any::<u8>(), 0..512)) {
        let mut bytes = vec![0x78];
        bytes.extend(tail);
        let _ = Decompressor::default().decompress_bytes(&bytes);
    }

    #[test]
    fn extraction_never_panics(bytes in vec(any::<u8>(), 0..2048)) {
        let cells = ejs_decoder::extract(&bytes);
        for c in &cells {
            prop_assert!(!ejs_decoder::extract::is_system_string(&c.content));
        }
    }
}
