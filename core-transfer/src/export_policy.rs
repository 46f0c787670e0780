//! Export policy
//!
//! Google-native documents have no byte representation of their own and are
//! exported to a standard format before download. Everything else is fetched
//! as stored, with no extension appended.

use serde::Serialize;

/// Native document types that must be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NativeDocumentKind {
    Document,
    Spreadsheet,
    Presentation,
}

/// Target format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ExportSpec {
    pub target_content_type: &'static str,
    pub file_extension: &'static str,
}

const EXPORT_TABLE: [(NativeDocumentKind, &str, ExportSpec); 3] = [
    (
        NativeDocumentKind::Document,
        "application/vnd.google-apps.document",
        ExportSpec {
            target_content_type: "application/pdf",
            file_extension: ".pdf",
        },
    ),
    (
        NativeDocumentKind::Spreadsheet,
        "application/vnd.google-apps.spreadsheet",
        ExportSpec {
            target_content_type:
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            file_extension: ".xlsx",
        },
    ),
    (
        NativeDocumentKind::Presentation,
        "application/vnd.google-apps.presentation",
        ExportSpec {
            target_content_type:
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            file_extension: ".pptx",
        },
    ),
];

impl NativeDocumentKind {
    pub const ALL: [NativeDocumentKind; 3] = [
        NativeDocumentKind::Document,
        NativeDocumentKind::Spreadsheet,
        NativeDocumentKind::Presentation,
    ];

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        EXPORT_TABLE
            .iter()
            .find(|(_, native, _)| *native == content_type)
            .map(|(kind, _, _)| *kind)
    }

    pub fn content_type(self) -> &'static str {
        self.row().1
    }

    pub fn export_spec(self) -> ExportSpec {
        self.row().2
    }

    fn row(self) -> &'static (NativeDocumentKind, &'static str, ExportSpec) {
        match self {
            NativeDocumentKind::Document => &EXPORT_TABLE[0],
            NativeDocumentKind::Spreadsheet => &EXPORT_TABLE[1],
            NativeDocumentKind::Presentation => &EXPORT_TABLE[2],
        }
    }
}

/// Export format for `content_type`, or `None` to fetch the stored bytes.
pub fn resolve(content_type: &str) -> Option<ExportSpec> {
    NativeDocumentKind::from_content_type(content_type).map(NativeDocumentKind::export_spec)
}

/// Logical file name: the display name plus the export extension, if any.
pub fn final_name(display_name: &str, spec: Option<&ExportSpec>) -> String {
    match spec {
        Some(spec) => format!("{}{}", display_name, spec.file_extension),
        None => display_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_table() {
        let cases = [
            (
                "application/vnd.google-apps.document",
                "application/pdf",
                ".pdf",
            ),
            (
                "application/vnd.google-apps.spreadsheet",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                ".xlsx",
            ),
            (
                "application/vnd.google-apps.presentation",
                "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                ".pptx",
            ),
        ];

        for (native, target, extension) in cases {
            let spec = resolve(native).unwrap();
            assert_eq!(spec.target_content_type, target);
            assert_eq!(spec.file_extension, extension);
        }
    }

    #[test]
    fn test_every_kind_round_trips_through_its_content_type() {
        for kind in NativeDocumentKind::ALL {
            assert_eq!(
                NativeDocumentKind::from_content_type(kind.content_type()),
                Some(kind)
            );
            assert_eq!(resolve(kind.content_type()), Some(kind.export_spec()));
        }
    }

    #[test]
    fn test_other_types_are_not_exported() {
        for content_type in [
            "application/pdf",
            "image/jpeg",
            "text/plain",
            "application/octet-stream",
            "application/vnd.google-apps.folder",
            "application/vnd.google-apps.form",
            "APPLICATION/VND.GOOGLE-APPS.DOCUMENT",
            "",
        ] {
            assert_eq!(resolve(content_type), None, "{}", content_type);
            assert_eq!(final_name("notes", resolve(content_type).as_ref()), "notes");
        }
    }

    #[test]
    fn test_final_name() {
        let spec = resolve("application/vnd.google-apps.document");
        assert_eq!(final_name("Report", spec.as_ref()), "Report.pdf");

        let spec = resolve("application/vnd.google-apps.spreadsheet");
        assert_eq!(final_name("Budget 2024", spec.as_ref()), "Budget 2024.xlsx");
    }
}
