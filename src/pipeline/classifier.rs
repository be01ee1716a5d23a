//! Extension-based format classification. Content is never inspected.

use crate::pipeline::types::DocumentFormat;

/// How an upload should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatClass {
    /// Already in the delivery format; send as-is.
    SupportedNative,
    /// Known format that must be converted first.
    SupportedConvertible(DocumentFormat),
    Unsupported,
}

/// Classify an upload by its file name (case-insensitive extension match).
pub fn classify(file_name: &str) -> FormatClass {
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return FormatClass::Unsupported;
    };

    match DocumentFormat::from_extension(ext) {
        Some(DocumentFormat::TARGET) => FormatClass::SupportedNative,
        Some(format) => FormatClass::SupportedConvertible(format),
        None => FormatClass::Unsupported,
    }
}

/// Comma-separated list of accepted extensions, for user-facing messages.
pub fn supported_extensions() -> String {
    DocumentFormat::ALL
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epub_is_native_in_any_case() {
        assert_eq!(classify("book.epub"), FormatClass::SupportedNative);
        assert_eq!(classify("BOOK.EPUB"), FormatClass::SupportedNative);
        assert_eq!(classify("My.Book.Epub"), FormatClass::SupportedNative);
    }

    #[test]
    fn known_formats_are_convertible() {
        for (name, format) in [
            ("a.mobi", DocumentFormat::Mobi),
            ("a.pdf", DocumentFormat::Pdf),
            ("a.TXT", DocumentFormat::Txt),
            ("a.doc", DocumentFormat::Doc),
            ("a.Docx", DocumentFormat::Docx),
        ] {
            assert_eq!(classify(name), FormatClass::SupportedConvertible(format), "{name}");
        }
    }

    #[test]
    fn everything_else_is_unsupported() {
        assert_eq!(classify("archive.zip"), FormatClass::Unsupported);
        assert_eq!(classify("noextension"), FormatClass::Unsupported);
        assert_eq!(classify("book.epub.zip"), FormatClass::Unsupported);
        assert_eq!(classify("book."), FormatClass::Unsupported);
        assert_eq!(classify(""), FormatClass::Unsupported);
    }

    #[test]
    fn only_last_extension_counts() {
        assert_eq!(
            classify("book.zip.pdf"),
            FormatClass::SupportedConvertible(DocumentFormat::Pdf)
        );
    }

    #[test]
    fn supported_extensions_lists_target_first() {
        assert_eq!(
            supported_extensions(),
            ".epub, .mobi, .pdf, .txt, .doc, .docx"
        );
    }
}
