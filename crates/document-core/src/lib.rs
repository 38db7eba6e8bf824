#![warn(missing_docs)]
//! document-core - Headless Text Document Engine
//!
//! # Overview
//!
//! `document-core` is the document model that sits behind a source-code
//! editor widget: it owns the character buffer, tracks line structure,
//! normalises byte positions across multi-byte encodings, executes
//! undo/redo, searches text (literal and regular-expression), styles text in
//! collaboration with a lexer, and broadcasts structured modification events
//! to watchers (typically views). It does not render, lay out, or manage
//! viewports; the host provides those on top.
//!
//! # Core Features
//!
//! - **Byte positions that respect characters**: UTF-8, DBCS codepages
//!   (Shift-JIS, GBK, Wansung, Big5, Johab), 8-bit text, and CR/LF treated
//!   as a single navigational unit
//! - **A single modification gateway**: every insert and delete flows
//!   through one path with a strict before/after event order
//! - **Grouped, tentative undo**: coalesced action groups, save-point and
//!   detach markers, speculative spans that commit or roll back as one unit
//! - **Search**: Boyer-Moore-Horspool-Sunday literal search with
//!   case-folding variants, plus a built-in regex matcher and an ecosystem
//!   (`regex` crate) backend behind one interface
//! - **Styling coordination**: lexer-driven styling with an adaptive
//!   throughput budget
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Document (gateway, undo, events, config)   │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Navigation / Search / Styling / Regex      │  ← Position-aware services
//! ├─────────────────────────────────────────────┤
//! │  Per-line stores & Decorations              │  ← Line-keyed state
//! ├─────────────────────────────────────────────┤
//! │  TextBuffer (gap buffer + line starts)      │  ← Storage
//! ├─────────────────────────────────────────────┤
//! │  UndoHistory (grouped action log)           │  ← History
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use document_core::{Document, SearchFlags};
//!
//! let mut doc = Document::default();
//! doc.insert_string(0, b"hello\nworld").unwrap();
//! assert_eq!(doc.lines_total(), 2);
//!
//! let m = doc
//!     .find_text(0, doc.length(), b"world", SearchFlags::MATCH_CASE)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(m.position, 6);
//!
//! doc.undo().unwrap();
//! assert_eq!(doc.length(), 0);
//! ```
//!
//! # Module Description
//!
//! - [`document`] - the document object and modification gateway
//! - [`storage`] - gap-buffer text storage with line starts and styles
//! - [`undo`] - the grouped reversible action log
//! - [`navigation`] - position snapping, iteration, words, braces, columns
//! - [`search`] - literal search and search options
//! - [`regex_search`] - the regex driver over both backends
//! - [`styling`] - lexer contract and styling budget
//! - [`perline`] - markers, fold levels, line state, annotations
//! - [`decorations`] - indicator range decorations
//! - [`watchers`] - modification events and watcher subscriptions
//! - [`encoding`] - codepage families and byte classification
//! - [`charclass`] - character classes for word boundaries
//! - [`casefold`] - case folding for insensitive search
//! - [`line_ending`] - end-of-line modes and conversion

pub mod casefold;
pub mod charclass;
pub mod decorations;
pub mod document;
pub mod encoding;
pub mod line_ending;
pub mod navigation;
pub mod perline;
mod re_nfa;
pub mod regex_search;
pub mod search;
pub mod storage;
pub mod styling;
pub mod undo;
pub mod watchers;

/// A byte offset into the document, in `[0, length]`. Signed so that
/// arithmetic around position 0 stays well-defined.
pub type Position = i64;

/// A line number, in `[0, lines_total())`.
pub type Line = i64;

/// Sentinel for "no position": returned by searches and relative-position
/// queries that run out of range.
pub const INVALID_POSITION: Position = -1;

pub use casefold::{CaseFolder, CaseFolderTable, CaseFolderUnicode};
pub use charclass::{CharClassify, CharacterClass};
pub use decorations::{Decoration, DecorationList, FillResult};
pub use document::{Document, DocumentOptions, LineEndTypes};
pub use encoding::{CP_UTF8, DbcsClassifier, EncodingFamily};
pub use line_ending::{EndOfLine, transform_line_ends};
pub use navigation::DecodedChar;
pub use perline::{FoldLevel, MarkerMask, PerLineStore};
pub use re_nfa::MAXTAG;
pub use regex_search::RESearchRange;
pub use search::{FindMatch, SearchError, SearchFlags};
pub use storage::{SplitView, StorageError, TextBuffer};
pub use styling::{ActionDuration, Lexer, LexerHandle};
pub use undo::{Action, ActionKind, UndoHistory};
pub use watchers::{
    DocumentStatus, DocumentWatcher, ModificationEvent, ModificationFlags,
};
