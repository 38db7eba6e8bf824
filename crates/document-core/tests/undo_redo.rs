use document_core::{ActionKind, Document, DocumentOptions};

fn text_of(doc: &Document) -> String {
    String::from_utf8(doc.text_range(0, doc.length())).unwrap()
}

#[test]
fn test_insert_undo_redo_scenario() {
    let mut doc = Document::new(DocumentOptions::default());
    assert_eq!(doc.insert_string(0, b"hello\nworld").unwrap(), 11);
    assert_eq!(doc.lines_total(), 2);
    assert_eq!(doc.line_end(0), 5);
    assert_eq!(doc.line_start(1), 6);

    doc.undo().unwrap();
    assert_eq!(doc.length(), 0);
    assert_eq!(doc.lines_total(), 1);

    doc.redo().unwrap();
    assert_eq!(text_of(&doc), "hello\nworld");
    assert_eq!(doc.lines_total(), 2);
    assert_eq!(doc.line_end(0), 5);
    assert_eq!(doc.line_start(1), 6);
}

#[test]
fn test_insert_then_delete_restores_byte_identity() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, "base état 基".as_bytes()).unwrap();
    let before = doc.text_range(0, doc.length());
    let lines_before = doc.lines_total();

    doc.insert_string(5, b"inserted\ntext").unwrap();
    doc.delete_chars(5, 13).unwrap();
    assert_eq!(doc.text_range(0, doc.length()), before);
    assert_eq!(doc.lines_total(), lines_before);
}

#[test]
fn test_typing_coalesces_into_one_undo_group() {
    let mut doc = Document::new(DocumentOptions::default());
    for (i, ch) in [b"a", b"b", b"c"].iter().enumerate() {
        doc.insert_string(i as i64, *ch).unwrap();
    }
    assert_eq!(text_of(&doc), "abc");
    assert_eq!(doc.undo_actions(), 3);

    // One undo reverts the whole coalesced run.
    doc.undo().unwrap();
    assert_eq!(doc.length(), 0);
    assert!(!doc.can_undo());
    assert!(doc.can_redo());
    doc.redo().unwrap();
    assert_eq!(text_of(&doc), "abc");
}

#[test]
fn test_backspace_run_undoes_as_one_group() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"abc").unwrap();
    doc.begin_undo_action();
    doc.end_undo_action();
    doc.del_char_back(3).unwrap();
    doc.del_char_back(2).unwrap();
    doc.del_char_back(1).unwrap();
    assert_eq!(doc.length(), 0);

    // Undo of the coalesced deletions returns the caret at their end.
    let pos = doc.undo().unwrap();
    assert_eq!(text_of(&doc), "abc");
    assert_eq!(pos, 3);
}

#[test]
fn test_grouped_edits_undo_as_unit() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"line\n").unwrap();
    doc.begin_undo_action();
    doc.insert_string(5, b"second\n").unwrap();
    doc.delete_chars(0, 5).unwrap();
    doc.end_undo_action();
    assert_eq!(text_of(&doc), "second\n");

    doc.undo().unwrap();
    assert_eq!(text_of(&doc), "line\n");
    doc.redo().unwrap();
    assert_eq!(text_of(&doc), "second\n");
}

#[test]
fn test_new_edit_abandons_redo_future() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"one").unwrap();
    doc.undo().unwrap();
    assert!(doc.can_redo());
    doc.insert_string(0, b"two").unwrap();
    assert!(!doc.can_redo());
    assert_eq!(text_of(&doc), "two");
}

#[test]
fn test_tentative_span_commit_and_rollback() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"stable ").unwrap();

    doc.tentative_start();
    doc.insert_string(7, b"maybe").unwrap();
    assert!(doc.tentative_active());
    doc.tentative_commit();
    assert!(!doc.tentative_active());
    assert_eq!(text_of(&doc), "stable maybe");

    doc.tentative_start();
    doc.insert_string(12, b" not-this").unwrap();
    doc.tentative_undo().unwrap();
    assert_eq!(text_of(&doc), "stable maybe");
    assert!(!doc.can_redo());
    // The committed part is still regular history.
    doc.undo().unwrap();
    assert_eq!(text_of(&doc), "stable ");
}

#[test]
fn test_undo_action_inspection() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"abc").unwrap();
    doc.begin_undo_action();
    doc.end_undo_action();
    doc.delete_chars(1, 1).unwrap();
    doc.add_undo_action(7);

    assert_eq!(doc.undo_actions(), 3);
    assert_eq!(doc.undo_action_kind(0), Some(ActionKind::Insert));
    assert_eq!(doc.undo_action_text(0), Some(&b"abc"[..]));
    assert_eq!(doc.undo_action_kind(1), Some(ActionKind::Remove));
    assert_eq!(doc.undo_action_position(1), Some(1));
    assert_eq!(doc.undo_action_text(1), Some(&b"b"[..]));
    assert_eq!(doc.undo_action_kind(2), Some(ActionKind::Container));
    assert_eq!(doc.undo_action_position(2), Some(7));
    assert_eq!(doc.undo_action_kind(3), None);
}

#[test]
fn test_undo_markers_survive_round_trips() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"a").unwrap();
    doc.set_save_point();
    assert_eq!(doc.undo_save_point(), 1);
    doc.set_undo_detach(0);
    assert_eq!(doc.undo_detach(), 0);
    doc.set_undo_tentative(1);
    assert_eq!(doc.undo_tentative(), 1);

    doc.insert_string(1, b"b").unwrap();
    assert!(!doc.is_save_point());
    doc.undo().unwrap();
    assert!(doc.is_save_point());
}

#[test]
fn test_set_undo_current_replays_actions() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"a").unwrap();
    doc.insert_string(1, b"b").unwrap();
    doc.insert_string(2, b"c").unwrap();
    assert_eq!(doc.undo_current(), 3);

    doc.set_undo_current(0).unwrap();
    assert_eq!(doc.length(), 0);
    doc.set_undo_current(2).unwrap();
    assert_eq!(text_of(&doc), "ab");
    doc.set_undo_current(3).unwrap();
    assert_eq!(text_of(&doc), "abc");
}

#[test]
fn test_undo_collection_toggle_discards_history() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"kept").unwrap();
    doc.set_undo_collection(false);
    assert!(!doc.is_collecting_undo());
    doc.insert_string(4, b" more").unwrap();
    assert!(!doc.can_undo());
    doc.set_undo_collection(true);
    doc.insert_string(9, b"!").unwrap();
    doc.undo().unwrap();
    assert_eq!(text_of(&doc), "kept more");
}

#[test]
fn test_read_only_document_refuses_undo() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"text").unwrap();
    doc.set_read_only(true);
    assert_eq!(doc.undo().unwrap(), -1);
    assert_eq!(text_of(&doc), "text");
    doc.set_read_only(false);
    doc.undo().unwrap();
    assert_eq!(doc.length(), 0);
}
