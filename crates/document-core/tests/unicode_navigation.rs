use document_core::{CP_UTF8, Document, DocumentOptions, INVALID_POSITION};

fn utf8_doc(text: &str) -> Document {
    let mut doc = Document::new(DocumentOptions::default());
    doc.set_dbcs_code_page(CP_UTF8);
    doc.insert_string(0, text.as_bytes()).unwrap();
    doc
}

fn dbcs_doc(bytes: &[u8], codepage: i32) -> Document {
    let mut doc = Document::new(DocumentOptions::default());
    doc.set_dbcs_code_page(codepage);
    doc.insert_string(0, bytes).unwrap();
    doc
}

#[test]
fn test_utf8_navigation_scenario() {
    // "a\xC3\xA9b": three characters, four bytes.
    let doc = utf8_doc("aéb");
    assert_eq!(doc.length(), 4);
    assert_eq!(doc.next_position(1, 1), 3);
    let ce = doc.character_after(1);
    assert_eq!(ce.character, 0x00E9);
    assert_eq!(ce.width_bytes, 2);
    assert_eq!(doc.move_position_outside_char(2, 1, false), 3);
}

#[test]
fn test_crlf_scenario() {
    let mut doc = utf8_doc("x\r\ny");
    assert!(doc.is_cr_lf(1));
    doc.del_char_back(3).unwrap();
    assert_eq!(doc.text_range(0, doc.length()), b"xy");
}

#[test]
fn test_move_position_outside_char_is_idempotent() {
    let doc = utf8_doc("aé€🦀\r\nz\u{0301}q");
    for pos in 0..=doc.length() {
        for move_dir in [-1, 1] {
            for check_line_end in [false, true] {
                let once = doc.move_position_outside_char(pos, move_dir, check_line_end);
                let twice = doc.move_position_outside_char(once, move_dir, check_line_end);
                assert_eq!(once, twice, "pos={pos} dir={move_dir}");
                assert!((0..=doc.length()).contains(&once));
            }
        }
    }
}

#[test]
fn test_next_position_always_lands_on_character_starts() {
    let doc = utf8_doc("aé€🦀b");
    let mut pos = 0;
    while pos < doc.length() {
        let next = doc.next_position(pos, 1);
        let step = next - pos;
        assert!((1..=4).contains(&step), "step {step} at {pos}");
        assert_eq!(doc.move_position_outside_char(next, 1, false), next);
        pos = next;
    }
    while pos > 0 {
        let prev = doc.next_position(pos, -1);
        let step = pos - prev;
        assert!((1..=4).contains(&step));
        assert_eq!(doc.move_position_outside_char(prev, -1, false), prev);
        pos = prev;
    }
}

#[test]
fn test_character_after_round_trips_every_scalar_width() {
    let text = "a§€𐍈"; // widths 1, 2, 3, 4
    let doc = utf8_doc(text);
    let mut pos = 0;
    for expected in text.chars() {
        let decoded = doc.character_after(pos);
        assert_eq!(decoded.character, expected as u32);
        assert_eq!(decoded.width_bytes as usize, expected.len_utf8());
        pos += decoded.width_bytes as i64;
    }
    assert_eq!(pos, doc.length());
}

#[test]
fn test_invalid_utf8_yields_replacement_single_byte() {
    let doc = dbcs_doc(&[b'x', 0xE2, 0x28, b'y'], CP_UTF8);
    let bad = doc.character_after(1);
    assert_eq!(bad.character, 0xFFFD);
    assert_eq!(bad.width_bytes, 1);
    // Iteration still visits every byte.
    let mut pos = 0;
    let mut steps = 0;
    while pos < doc.length() {
        pos = doc.next_position(pos, 1);
        steps += 1;
        assert!(steps <= 4);
    }
    assert_eq!(steps, 4);
}

#[test]
fn test_relative_positions_and_counts() {
    let doc = utf8_doc("aé€🦀b");
    assert_eq!(doc.count_characters(0, doc.length()), 5);
    assert_eq!(doc.count_utf16(0, doc.length()), 6);
    assert_eq!(doc.get_relative_position(0, 3), 6);
    assert_eq!(doc.get_relative_position(6, -3), 0);
    assert_eq!(doc.get_relative_position(0, 99), INVALID_POSITION);
    assert_eq!(doc.get_relative_position(doc.length(), 1), INVALID_POSITION);
}

#[test]
fn test_count_characters_snaps_interior_endpoints() {
    let doc = utf8_doc("aé€b");
    // Position 2 is inside é; 4 is inside €.
    assert_eq!(doc.count_characters(2, 4), 0);
    assert_eq!(doc.count_characters(1, doc.length()), 3);
}

#[test]
fn test_dbcs_shift_jis_navigation() {
    // "あa い" as Shift-JIS bytes.
    let doc = dbcs_doc(&[0x82, 0xA0, b'a', 0x82, 0xA2], 932);
    assert_eq!(doc.next_position(0, 1), 2);
    assert_eq!(doc.next_position(2, 1), 3);
    assert_eq!(doc.next_position(3, 1), 5);
    assert_eq!(doc.next_position(5, -1), 3);
    assert_eq!(doc.next_position(3, -1), 2);
    assert_eq!(doc.next_position(2, -1), 0);
    assert_eq!(doc.move_position_outside_char(1, -1, false), 0);
    assert_eq!(doc.move_position_outside_char(4, 1, false), 5);
    let first = doc.character_after(0);
    assert_eq!(first.character, 0x82A0);
    assert_eq!(first.width_bytes, 2);
    assert_eq!(doc.count_characters(0, doc.length()), 3);
}

#[test]
fn test_columns_and_find_column_agree() {
    let mut doc = utf8_doc("\taé€\tb");
    doc.set_tab_in_chars(4);
    for column in 0..=12 {
        let pos = doc.find_column(0, column);
        assert!(doc.get_column(pos) <= column);
    }
    // Equality holds when the column is not inside a tab expansion.
    assert_eq!(doc.get_column(doc.find_column(0, 4)), 4);
    assert_eq!(doc.get_column(doc.find_column(0, 6)), 6);
    assert_eq!(doc.get_column(doc.find_column(0, 8)), 8);
}

#[test]
fn test_vc_home_and_paragraphs() {
    let doc = utf8_doc("  indented\n\nnext para");
    assert_eq!(doc.vc_home_position(10), 2);
    assert_eq!(doc.vc_home_position(2), 0);
    assert_eq!(doc.vc_home_position(0), 2);
    assert_eq!(doc.para_down(0), doc.line_start(2));
    assert_eq!(doc.para_up(doc.line_start(2)), 0);
}

#[test]
fn test_grapheme_aware_safe_segment() {
    let doc = utf8_doc("");
    // "e" followed by a combining acute repeated: never split the pair.
    let text = "ee\u{0301}ee\u{0301}e".as_bytes();
    for limit in 1..text.len() - 1 {
        let segment = doc.safe_segment(text, limit);
        assert!(segment <= limit);
        // The byte after the break must not be a combining-mark trail.
        let head = &text[..segment];
        assert!(std::str::from_utf8(head).is_ok(), "split utf-8 at {segment}");
        if let Ok(tail) = std::str::from_utf8(&text[segment..]) {
            assert!(!tail.starts_with('\u{0301}'), "split cluster at {segment}");
        }
    }
}
