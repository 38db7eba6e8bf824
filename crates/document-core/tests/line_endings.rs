use document_core::{Document, DocumentOptions, EndOfLine, transform_line_ends};

fn doc_with(text: &str) -> Document {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, text.as_bytes()).unwrap();
    doc
}

fn text_of(doc: &Document) -> Vec<u8> {
    doc.text_range(0, doc.length())
}

#[test]
fn test_line_structure_with_mixed_endings() {
    let doc = doc_with("lf\ncrlf\r\ncr\rlast");
    assert_eq!(doc.lines_total(), 4);
    assert_eq!(doc.line_start(1), 3);
    assert_eq!(doc.line_start(2), 9);
    assert_eq!(doc.line_start(3), 12);
    assert_eq!(doc.line_end(0), 2);
    assert_eq!(doc.line_end(1), 7);
    assert_eq!(doc.line_end(2), 11);
    assert_eq!(doc.line_end(3), 16);
}

#[test]
fn test_virtual_last_line() {
    let doc = doc_with("a\n");
    assert_eq!(doc.lines_total(), 2);
    assert_eq!(doc.line_start(1), 2);
    assert_eq!(doc.line_start(2), 2);
    assert_eq!(doc.line_end(1), 2);
    assert_eq!(doc.line_from_position(2), 1);
}

#[test]
fn test_transform_line_ends_text() {
    assert_eq!(
        transform_line_ends(b"a\r\nb\rc\nd", EndOfLine::Lf),
        b"a\nb\nc\nd"
    );
    assert_eq!(
        transform_line_ends(b"a\nb", EndOfLine::CrLf),
        b"a\r\nb"
    );
}

#[test]
fn test_convert_line_ends_document_wide() {
    let mut doc = doc_with("one\r\ntwo\rthree\nfour");
    doc.convert_line_ends(EndOfLine::Lf).unwrap();
    assert_eq!(text_of(&doc), b"one\ntwo\nthree\nfour");
    assert_eq!(doc.lines_total(), 4);

    doc.convert_line_ends(EndOfLine::CrLf).unwrap();
    assert_eq!(text_of(&doc), b"one\r\ntwo\r\nthree\r\nfour");
    assert_eq!(doc.lines_total(), 4);

    doc.convert_line_ends(EndOfLine::Cr).unwrap();
    assert_eq!(text_of(&doc), b"one\rtwo\rthree\rfour");
}

#[test]
fn test_convert_is_one_undo_group_per_call() {
    let mut doc = doc_with("a\r\nb\r\nc");
    doc.convert_line_ends(EndOfLine::Lf).unwrap();
    assert_eq!(text_of(&doc), b"a\nb\nc");
    doc.undo().unwrap();
    assert_eq!(text_of(&doc), b"a\r\nb\r\nc");
    doc.redo().unwrap();
    assert_eq!(text_of(&doc), b"a\nb\nc");
}

#[test]
fn test_eol_mode_drives_eol_string() {
    let mut doc = doc_with("");
    assert_eq!(doc.eol_mode(), EndOfLine::Lf);
    doc.set_eol_mode(EndOfLine::CrLf);
    assert_eq!(doc.eol_string(), b"\r\n");
    doc.set_eol_mode(EndOfLine::Cr);
    assert_eq!(doc.eol_string(), b"\r");
}

#[test]
fn test_detect_line_ending() {
    assert_eq!(EndOfLine::detect(b"a\r\nb"), EndOfLine::CrLf);
    assert_eq!(EndOfLine::detect(b"a\rb"), EndOfLine::Cr);
    assert_eq!(EndOfLine::detect(b"a\nb"), EndOfLine::Lf);
    assert_eq!(EndOfLine::detect(b"none"), EndOfLine::Lf);
}

#[test]
fn test_insert_splitting_crlf_updates_lines() {
    let mut doc = doc_with("x\r\ny");
    assert_eq!(doc.lines_total(), 2);
    doc.insert_string(2, b"!").unwrap();
    // "x\r!\ny": the pair is split into two line ends.
    assert_eq!(doc.lines_total(), 3);
    doc.undo().unwrap();
    assert_eq!(doc.lines_total(), 2);
    assert_eq!(text_of(&doc), b"x\r\ny");
}
