//! Static file format table.
//!
//! Built once on first use and shared read-only by every request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Editor family a format opens in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Word,
    Cell,
    Slide,
}

impl DocumentType {
    /// The Office Open XML extension documents of this family convert to.
    pub fn open_xml_extension(&self) -> &'static str {
        match self {
            DocumentType::Word => "docx",
            DocumentType::Cell => "xlsx",
            DocumentType::Slide => "pptx",
        }
    }
}

/// Editor action a format supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Edit,
    LossyEdit,
    Fill,
    AutoConvert,
}

/// One row of the raw format table.
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
    pub name: &'static str,
    pub document_type: DocumentType,
    pub actions: &'static [Action],
    pub convert: &'static [&'static str],
    pub mime: &'static [&'static str],
}

/// What the editor can do with one file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCapability {
    pub extension: &'static str,
    pub document_type: DocumentType,
    pub can_edit: bool,
    pub can_view: bool,
    pub can_fill: bool,
    pub is_lossy_editable: bool,
    pub is_auto_convertible: bool,
    pub convertible_targets: &'static [&'static str],
    pub mime: &'static [&'static str],
}

impl FormatCapability {
    fn from_spec(spec: &FormatSpec) -> Self {
        let has = |action| spec.actions.contains(&action);
        Self {
            extension: spec.name,
            document_type: spec.document_type,
            can_edit: has(Action::Edit),
            can_view: has(Action::View),
            can_fill: has(Action::Fill),
            is_lossy_editable: has(Action::LossyEdit),
            is_auto_convertible: has(Action::AutoConvert),
            convertible_targets: spec.convert,
            mime: spec.mime,
        }
    }

    /// Viewable and nothing else.
    pub fn is_view_only(&self) -> bool {
        self.can_view && !self.can_edit && !self.can_fill && !self.is_lossy_editable
    }

    /// Whether the format converts to any Office Open XML format.
    pub fn is_open_xml_convertible(&self) -> bool {
        self.convertible_targets
            .iter()
            .any(|t| matches!(*t, "docx" | "xlsx" | "pptx"))
    }
}

/// Read-only lookup from extension to capability.
#[derive(Debug)]
pub struct FormatTable {
    formats: HashMap<&'static str, FormatCapability>,
}

impl FormatTable {
    /// Build a table, dropping formats the editor cannot even view.
    pub fn from_specs(specs: &[FormatSpec]) -> Self {
        let formats = specs
            .iter()
            .filter(|spec| spec.actions.contains(&Action::View))
            .map(|spec| (spec.name, FormatCapability::from_spec(spec)))
            .collect();
        Self { formats }
    }

    /// The table shipped with the gateway.
    pub fn builtin() -> &'static FormatTable {
        static TABLE: LazyLock<FormatTable> = LazyLock::new(|| FormatTable::from_specs(BUILTIN_FORMATS));
        &TABLE
    }

    /// Look up an extension. Case-insensitive, leading dot optional.
    pub fn resolve(&self, extension: &str) -> Option<&FormatCapability> {
        let ext = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        self.formats.get(ext.as_str())
    }

    /// Look up the format of a file by its name.
    pub fn resolve_file(&self, file_name: &str) -> Option<&FormatCapability> {
        extension_of(file_name).and_then(|ext| self.resolve(&ext))
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(file_name: &str) -> Option<String> {
    let name = file_name.trim().rsplit(['/', '\\']).next().unwrap_or_default();
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

use Action::{AutoConvert, Edit, Fill, LossyEdit, View};
use DocumentType::{Cell, Slide, Word};

const WORD_TARGETS: &[&str] = &["docx", "odt", "pdf", "rtf", "txt", "docm", "dotx", "epub", "fb2", "html"];
const CELL_TARGETS: &[&str] = &["xlsx", "ods", "pdf", "csv", "xlsm", "xltx"];
const SLIDE_TARGETS: &[&str] = &["pptx", "odp", "pdf", "pptm", "potx"];

const BUILTIN_FORMATS: &[FormatSpec] = &[
    FormatSpec { name: "docx", document_type: Word, actions: &[View, Edit], convert: WORD_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"] },
    FormatSpec { name: "docm", document_type: Word, actions: &[View, Edit], convert: WORD_TARGETS, mime: &["application/vnd.ms-word.document.macroenabled.12"] },
    FormatSpec { name: "dotx", document_type: Word, actions: &[View, Edit], convert: WORD_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.wordprocessingml.template"] },
    FormatSpec { name: "dotm", document_type: Word, actions: &[View, Edit], convert: WORD_TARGETS, mime: &["application/vnd.ms-word.template.macroenabled.12"] },
    FormatSpec { name: "doc", document_type: Word, actions: &[View, AutoConvert], convert: WORD_TARGETS, mime: &["application/msword"] },
    FormatSpec { name: "dot", document_type: Word, actions: &[View, AutoConvert], convert: WORD_TARGETS, mime: &["application/msword"] },
    FormatSpec { name: "odt", document_type: Word, actions: &[View, LossyEdit, AutoConvert], convert: WORD_TARGETS, mime: &["application/vnd.oasis.opendocument.text"] },
    FormatSpec { name: "ott", document_type: Word, actions: &[View, LossyEdit, AutoConvert], convert: WORD_TARGETS, mime: &["application/vnd.oasis.opendocument.text-template"] },
    FormatSpec { name: "rtf", document_type: Word, actions: &[View, LossyEdit, AutoConvert], convert: WORD_TARGETS, mime: &["application/rtf", "text/rtf"] },
    FormatSpec { name: "txt", document_type: Word, actions: &[View, LossyEdit], convert: WORD_TARGETS, mime: &["text/plain"] },
    FormatSpec { name: "pdf", document_type: Word, actions: &[View, Fill], convert: &[], mime: &["application/pdf"] },
    FormatSpec { name: "djvu", document_type: Word, actions: &[View], convert: &["pdf"], mime: &["image/vnd.djvu"] },
    FormatSpec { name: "xps", document_type: Word, actions: &[View], convert: &["pdf"], mime: &["application/vnd.ms-xpsdocument"] },
    FormatSpec { name: "epub", document_type: Word, actions: &[View, AutoConvert], convert: WORD_TARGETS, mime: &["application/epub+zip"] },
    FormatSpec { name: "fb2", document_type: Word, actions: &[View, AutoConvert], convert: WORD_TARGETS, mime: &["text/fb2+xml"] },
    FormatSpec { name: "html", document_type: Word, actions: &[View, AutoConvert], convert: WORD_TARGETS, mime: &["text/html"] },
    FormatSpec { name: "mht", document_type: Word, actions: &[View, AutoConvert], convert: WORD_TARGETS, mime: &["message/rfc822"] },
    FormatSpec { name: "xml", document_type: Word, actions: &[AutoConvert], convert: WORD_TARGETS, mime: &["application/xml", "text/xml"] },
    FormatSpec { name: "xlsx", document_type: Cell, actions: &[View, Edit], convert: CELL_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"] },
    FormatSpec { name: "xlsm", document_type: Cell, actions: &[View, Edit], convert: CELL_TARGETS, mime: &["application/vnd.ms-excel.sheet.macroenabled.12"] },
    FormatSpec { name: "xltx", document_type: Cell, actions: &[View, Edit], convert: CELL_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.spreadsheetml.template"] },
    FormatSpec { name: "xls", document_type: Cell, actions: &[View, AutoConvert], convert: CELL_TARGETS, mime: &["application/vnd.ms-excel"] },
    FormatSpec { name: "xlt", document_type: Cell, actions: &[View, AutoConvert], convert: CELL_TARGETS, mime: &["application/vnd.ms-excel"] },
    FormatSpec { name: "ods", document_type: Cell, actions: &[View, LossyEdit, AutoConvert], convert: CELL_TARGETS, mime: &["application/vnd.oasis.opendocument.spreadsheet"] },
    FormatSpec { name: "ots", document_type: Cell, actions: &[View, LossyEdit, AutoConvert], convert: CELL_TARGETS, mime: &["application/vnd.oasis.opendocument.spreadsheet-template"] },
    FormatSpec { name: "csv", document_type: Cell, actions: &[View, LossyEdit], convert: CELL_TARGETS, mime: &["text/csv"] },
    FormatSpec { name: "pptx", document_type: Slide, actions: &[View, Edit], convert: SLIDE_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.presentationml.presentation"] },
    FormatSpec { name: "pptm", document_type: Slide, actions: &[View, Edit], convert: SLIDE_TARGETS, mime: &["application/vnd.ms-powerpoint.presentation.macroenabled.12"] },
    FormatSpec { name: "ppsx", document_type: Slide, actions: &[View, Edit], convert: SLIDE_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.presentationml.slideshow"] },
    FormatSpec { name: "potx", document_type: Slide, actions: &[View, Edit], convert: SLIDE_TARGETS, mime: &["application/vnd.openxmlformats-officedocument.presentationml.template"] },
    FormatSpec { name: "ppt", document_type: Slide, actions: &[View, AutoConvert], convert: SLIDE_TARGETS, mime: &["application/vnd.ms-powerpoint"] },
    FormatSpec { name: "pps", document_type: Slide, actions: &[View, AutoConvert], convert: SLIDE_TARGETS, mime: &["application/vnd.ms-powerpoint"] },
    FormatSpec { name: "odp", document_type: Slide, actions: &[View, LossyEdit, AutoConvert], convert: SLIDE_TARGETS, mime: &["application/vnd.oasis.opendocument.presentation"] },
    FormatSpec { name: "otp", document_type: Slide, actions: &[View, LossyEdit, AutoConvert], convert: SLIDE_TARGETS, mime: &["application/vnd.oasis.opendocument.presentation-template"] },
];
