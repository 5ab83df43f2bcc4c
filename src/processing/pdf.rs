//! PDF text extraction.

use super::types::DocumentError;
use std::path::Path;

/// Extract the text of every non-blank page of the PDF at `path`.
///
/// Pages are rendered as `--- Page N ---` headers followed by the page text and joined with a
/// blank line. Page numbers follow the physical page order, so skipped blank pages leave gaps.
pub fn load_pdf(path: &Path) -> Result<String, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|err| {
        tracing::error!(path = %path.display(), error = %err, "PDF extraction failed");
        DocumentError::Extraction(err.to_string())
    })?;

    let (text, kept) = render_pages(&pages);
    tracing::info!(
        path = %path.display(),
        pages = pages.len(),
        kept,
        characters = text.chars().count(),
        "Extracted PDF text"
    );
    Ok(text)
}

/// Render per-page text in physical order, returning the text and the number of kept pages.
pub(crate) fn render_pages<S: AsRef<str>>(pages: &[S]) -> (String, usize) {
    let rendered: Vec<String> = pages
        .iter()
        .enumerate()
        .filter_map(|(index, page)| {
            let page = page.as_ref().trim();
            if page.is_empty() {
                tracing::debug!(page = index + 1, "Skipping blank page");
                None
            } else {
                Some(format!("--- Page {} ---\n{page}", index + 1))
            }
        })
        .collect();
    let count = rendered.len();
    (rendered.join("\n\n"), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Assemble a minimal uncompressed PDF with one Helvetica text line per page.
    fn pdf_with_pages(lines: &[&str]) -> Vec<u8> {
        let page_count = lines.len();
        let font_id = 3 + 2 * page_count;
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!(
                "<< /Type /Pages /Kids [{}] /Count {page_count} >>",
                (0..page_count)
                    .map(|i| format!("{} 0 R", 3 + 2 * i))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        ];
        for (i, line) in lines.iter().enumerate() {
            let content = format!("BT /F1 12 Tf 72 720 Td ({line}) Tj ET");
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {} 0 R >>",
                4 + 2 * i
            ));
            objects.push(format!(
                "<< /Length {} >>\nstream\n{content}\nendstream",
                content.len()
            ));
        }
        objects.push(
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        );

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }
        let xref_at = out.len();
        let header = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        out.extend_from_slice(header.as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
                objects.len() + 1
            )
            .as_bytes(),
        );
        out
    }

    #[test]
    fn pages_are_numbered_and_blank_pages_skipped() {
        let (text, pages) = render_pages(&["first page", "  \n ", "third page\n"]);
        assert_eq!(pages, 2);
        assert_eq!(
            text,
            "--- Page 1 ---\nfirst page\n\n--- Page 3 ---\nthird page"
        );
    }

    #[test]
    fn form_feeds_inside_a_page_do_not_split_it() {
        let (text, pages) = render_pages(&["\x0Conly page\n"]);
        assert_eq!(pages, 1);
        assert_eq!(text, "--- Page 1 ---\nonly page");
    }

    #[test]
    fn multi_page_pdf_keeps_page_numbers() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&pdf_with_pages(&["Alpha page text", "Bravo page text"]))
            .expect("write");

        let text = load_pdf(file.path()).expect("extract pdf");

        let (first, second) = text
            .split_once("\n\n--- Page 2 ---\n")
            .expect("second page header");
        assert!(first.starts_with("--- Page 1 ---\n"), "got {text:?}");
        assert!(first.contains("Alpha"), "got {text:?}");
        assert!(!first.contains("Bravo"), "got {text:?}");
        assert!(second.contains("Bravo"), "got {text:?}");
    }

    #[test]
    fn missing_file_is_reported() {
        let error = load_pdf(Path::new("does/not/exist.pdf")).unwrap_err();
        assert!(matches!(error, DocumentError::NotFound(_)));
        assert!(error.to_string().contains("does/not/exist.pdf"));
    }

    #[test]
    fn non_pdf_bytes_fail_extraction() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"this is not a pdf").expect("write");
        let error = load_pdf(file.path()).unwrap_err();
        assert!(matches!(error, DocumentError::Extraction(_)));
    }
}
