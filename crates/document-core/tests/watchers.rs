use std::cell::RefCell;
use std::rc::Rc;

use document_core::{
    Document, DocumentOptions, DocumentWatcher, ModificationEvent, ModificationFlags,
};

#[derive(Default)]
struct Recorder {
    events: RefCell<Vec<(ModificationFlags, i64, i64)>>,
    save_points: RefCell<Vec<bool>>,
}

impl DocumentWatcher for Recorder {
    fn notify_modified(&self, _doc: &mut Document, event: &ModificationEvent, _ud: usize) {
        self.events
            .borrow_mut()
            .push((event.flags, event.position, event.length));
    }

    fn notify_save_point(&self, _doc: &mut Document, _ud: usize, at: bool) {
        self.save_points.borrow_mut().push(at);
    }
}

fn recorded_doc() -> (Document, Rc<Recorder>) {
    let mut doc = Document::new(DocumentOptions::default());
    let recorder = Rc::new(Recorder::default());
    doc.add_watcher(recorder.clone(), 0);
    (doc, recorder)
}

#[test]
fn test_event_order_for_insert() {
    let (mut doc, recorder) = recorded_doc();
    doc.insert_string(0, b"abc").unwrap();
    let events = recorder.events.borrow();
    let kinds: Vec<ModificationFlags> = events.iter().map(|e| e.0).collect();
    assert_eq!(kinds.len(), 3);
    assert!(kinds[0].contains(ModificationFlags::INSERT_CHECK));
    assert!(kinds[1].contains(ModificationFlags::BEFORE_INSERT));
    assert!(kinds[2].contains(ModificationFlags::INSERT_TEXT));
    // The before event precedes the apply; both carry position and length.
    assert_eq!(events[1].1, 0);
    assert_eq!(events[1].2, 3);
    assert_eq!(events[2].1, 0);
    assert_eq!(events[2].2, 3);
}

#[test]
fn test_event_order_for_delete() {
    let (mut doc, recorder) = recorded_doc();
    doc.insert_string(0, b"abcdef").unwrap();
    recorder.events.borrow_mut().clear();
    doc.delete_chars(2, 3).unwrap();
    let events = recorder.events.borrow();
    assert_eq!(events.len(), 2);
    assert!(events[0].0.contains(ModificationFlags::BEFORE_DELETE));
    assert!(events[1].0.contains(ModificationFlags::DELETE_TEXT));
    assert!(events[1].0.contains(ModificationFlags::USER));
    assert_eq!((events[1].1, events[1].2), (2, 3));
}

#[test]
fn test_undo_events_carry_undo_flags_in_order() {
    let (mut doc, recorder) = recorded_doc();
    doc.insert_string(0, b"x").unwrap();
    recorder.events.borrow_mut().clear();
    doc.undo().unwrap();
    let events = recorder.events.borrow();
    assert_eq!(events.len(), 2);
    assert!(events[0].0.contains(ModificationFlags::BEFORE_DELETE));
    assert!(events[0].0.contains(ModificationFlags::UNDO));
    assert!(events[1].0.contains(ModificationFlags::DELETE_TEXT));
    assert!(events[1].0.contains(ModificationFlags::LAST_STEP_IN_UNDO_REDO));
    assert!(!events[1].0.contains(ModificationFlags::USER));
}

#[test]
fn test_exactly_one_last_step_per_undo_group() {
    let (mut doc, recorder) = recorded_doc();
    doc.begin_undo_action();
    doc.insert_string(0, b"first\n").unwrap();
    doc.insert_string(6, b"second\n").unwrap();
    doc.end_undo_action();
    recorder.events.borrow_mut().clear();
    doc.undo().unwrap();
    let events = recorder.events.borrow();
    let last_steps = events
        .iter()
        .filter(|e| e.0.contains(ModificationFlags::LAST_STEP_IN_UNDO_REDO))
        .count();
    assert_eq!(last_steps, 1);
    let multiline = events
        .iter()
        .filter(|e| e.0.contains(ModificationFlags::MULTILINE_UNDO_REDO))
        .count();
    assert_eq!(multiline, 1);
}

#[test]
fn test_group_completed_fires_at_depth_zero() {
    #[derive(Default)]
    struct Groups {
        completed: RefCell<usize>,
    }
    impl DocumentWatcher for Groups {
        fn notify_group_completed(&self, _doc: &mut Document, _ud: usize) {
            *self.completed.borrow_mut() += 1;
        }
    }
    let mut doc = Document::new(DocumentOptions::default());
    let groups = Rc::new(Groups::default());
    doc.add_watcher(groups.clone(), 0);
    doc.begin_undo_action();
    doc.begin_undo_action();
    doc.insert_string(0, b"x").unwrap();
    doc.end_undo_action();
    assert_eq!(*groups.completed.borrow(), 0);
    doc.end_undo_action();
    assert_eq!(*groups.completed.borrow(), 1);
}

#[test]
fn test_save_point_delay_window_squelches() {
    let (mut doc, recorder) = recorded_doc();
    doc.insert_string(0, b"x").unwrap();
    doc.set_save_point();
    recorder.save_points.borrow_mut().clear();

    doc.begin_delay_save_point();
    doc.insert_string(1, b"y").unwrap();
    doc.undo().unwrap();
    assert!(recorder.save_points.borrow().is_empty());
    doc.end_delay_save_point();
    // Net transition: still at the save point, so nothing is emitted.
    assert!(recorder.save_points.borrow().is_empty());

    doc.begin_delay_save_point();
    doc.insert_string(1, b"z").unwrap();
    doc.end_delay_save_point();
    assert_eq!(*recorder.save_points.borrow(), vec![false]);
}

#[test]
fn test_duplicate_watcher_rejected_and_removal_idempotent() {
    let mut doc = Document::new(DocumentOptions::default());
    let recorder: Rc<dyn DocumentWatcher> = Rc::new(Recorder::default());
    assert!(doc.add_watcher(recorder.clone(), 7));
    assert!(!doc.add_watcher(recorder.clone(), 7));
    assert!(doc.add_watcher(recorder.clone(), 8));
    assert!(doc.remove_watcher(&recorder, 7));
    assert!(!doc.remove_watcher(&recorder, 7));
    assert!(doc.remove_watcher(&recorder, 8));
}

#[test]
fn test_watcher_can_remove_itself_during_notification() {
    struct SelfRemover {
        me: RefCell<Option<Rc<dyn DocumentWatcher>>>,
        fired: RefCell<usize>,
    }
    impl DocumentWatcher for SelfRemover {
        fn notify_modified(&self, doc: &mut Document, _event: &ModificationEvent, _ud: usize) {
            *self.fired.borrow_mut() += 1;
            if let Some(me) = self.me.borrow_mut().take() {
                doc.remove_watcher(&me, 0);
            }
        }
    }
    let mut doc = Document::new(DocumentOptions::default());
    let remover = Rc::new(SelfRemover {
        me: RefCell::new(None),
        fired: RefCell::new(0),
    });
    let as_watcher: Rc<dyn DocumentWatcher> = remover.clone();
    *remover.me.borrow_mut() = Some(as_watcher.clone());
    doc.add_watcher(as_watcher, 0);
    doc.insert_string(0, b"a").unwrap();
    let after_first = *remover.fired.borrow();
    assert!(after_first >= 1);
    doc.insert_string(0, b"b").unwrap();
    // No further notifications after self-removal.
    assert_eq!(*remover.fired.borrow(), after_first);
}

#[test]
fn test_modify_attempt_and_error_status() {
    #[derive(Default)]
    struct Status {
        attempts: RefCell<usize>,
        errors: RefCell<Vec<document_core::DocumentStatus>>,
    }
    impl DocumentWatcher for Status {
        fn notify_modify_attempt(&self, _doc: &mut Document, _ud: usize) {
            *self.attempts.borrow_mut() += 1;
        }
        fn notify_error(&self, _doc: &mut Document, _ud: usize, status: document_core::DocumentStatus) {
            self.errors.borrow_mut().push(status);
        }
    }
    let mut doc = Document::new(DocumentOptions::default());
    let status = Rc::new(Status::default());
    doc.add_watcher(status.clone(), 0);
    doc.set_read_only(true);
    assert_eq!(doc.add_data(b"blocked"), document_core::DocumentStatus::Ok);
    assert_eq!(*status.attempts.borrow(), 1);
    assert_eq!(doc.length(), 0);
}

#[test]
fn test_decorations_follow_modifications_through_events() {
    let mut doc = Document::new(DocumentOptions::default());
    doc.insert_string(0, b"0123456789").unwrap();
    doc.decoration_set_current_indicator(1);
    doc.decoration_fill_range(2, 5, 4); // [2, 6)
    doc.insert_string(0, b"ab").unwrap();
    assert_eq!(doc.decoration_value_at(1, 4), 5);
    assert_eq!(doc.decoration_value_at(1, 2), 0);
    doc.delete_chars(0, 2).unwrap();
    assert_eq!(doc.decoration_value_at(1, 2), 5);
    doc.undo().unwrap();
    // Decorations shift back with the undo of the deletion.
    assert_eq!(doc.decoration_value_at(1, 4), 5);
}
