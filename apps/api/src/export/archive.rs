//! Archive assembly: one PDF per section, zipped in canonical order.
//!
//! A section whose render fails degrades to a deterministic placeholder PDF
//! in the same slot. The archive always contains the full fixed section
//! set; fallbacks are flagged internally and never surfaced as errors.

use std::io::{Cursor, Write};

use bytes::Bytes;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::errors::AppError;
use crate::models::content::SectionKey;

/// One rendered archive entry.
#[derive(Debug, Clone)]
pub struct RenderedSection {
    pub section: SectionKey,
    pub bytes: Bytes,
    /// True when this slot holds the placeholder instead of real content.
    pub fallback: bool,
}

/// Stable archive entry name: position prefix plus section key.
pub fn section_file_name(index: usize, section: SectionKey) -> String {
    format!("{:02}_{}.pdf", index + 1, section.as_str())
}

/// Zips rendered sections in the order given.
pub fn build_zip(sections: &[RenderedSection]) -> Result<Vec<u8>, AppError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (index, entry) in sections.iter().enumerate() {
        let name = section_file_name(index, entry.section);
        writer
            .start_file(name, options)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("zip entry failed: {e}")))?;
        writer
            .write_all(&entry.bytes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("zip write failed: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("zip finish failed: {e}")))?;
    Ok(cursor.into_inner())
}

/// Deterministic single-page placeholder PDF for a section whose render
/// failed. Same section in, same bytes out.
pub fn placeholder_pdf(section: SectionKey) -> Bytes {
    let title = escape_pdf_text(section.title());
    let content_stream = format!(
        "BT /F1 16 Tf 72 720 Td ({title}) Tj ET\n\
         BT /F1 11 Tf 72 690 Td (This document could not be generated and will be \
         refreshed automatically.) Tj ET\n\
         BT /F1 11 Tf 72 672 Td (Request the export again to retry.) Tj ET\n"
    );

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 4 0 R >> >> /Contents 5 0 R >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}endstream",
            content_stream.len(),
            content_stream
        ),
    ];

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    pdf.push_str("0000000000 65535 f \n");
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));

    Bytes::from(pdf.into_bytes())
}

/// Escapes the characters PDF literal strings reserve.
fn escape_pdf_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sections_with_fallbacks(failed: &[SectionKey]) -> Vec<RenderedSection> {
        SectionKey::ALL
            .iter()
            .map(|&section| {
                if failed.contains(&section) {
                    RenderedSection {
                        section,
                        bytes: placeholder_pdf(section),
                        fallback: true,
                    }
                } else {
                    RenderedSection {
                        section,
                        bytes: Bytes::from_static(b"%PDF-1.4 fake"),
                        fallback: false,
                    }
                }
            })
            .collect()
    }

    #[test]
    fn test_file_names_are_ordered_and_stable() {
        assert_eq!(section_file_name(0, SectionKey::Scorecard), "01_scorecard.pdf");
        assert_eq!(
            section_file_name(8, SectionKey::EeoGuidance),
            "09_eeo_guidance.pdf"
        );
    }

    #[test]
    fn test_zip_always_contains_nine_entries() {
        // Even with failed sections the archive keeps every slot.
        let sections = sections_with_fallbacks(&[SectionKey::JobPost, SectionKey::ProcessMap]);
        let zipped = build_zip(&sections).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(zipped)).unwrap();
        assert_eq!(archive.len(), 9);
        for (index, &section) in SectionKey::ALL.iter().enumerate() {
            let name = section_file_name(index, section);
            assert!(archive.by_name(&name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn test_zip_entries_round_trip_content() {
        let sections = sections_with_fallbacks(&[]);
        let zipped = build_zip(&sections).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(zipped)).unwrap();
        let mut first = archive.by_name("01_scorecard.pdf").unwrap();
        let mut content = Vec::new();
        first.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"%PDF-1.4 fake");
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        assert_eq!(
            placeholder_pdf(SectionKey::WorkSample),
            placeholder_pdf(SectionKey::WorkSample)
        );
        assert_ne!(
            placeholder_pdf(SectionKey::WorkSample),
            placeholder_pdf(SectionKey::Scorecard)
        );
    }

    #[test]
    fn test_placeholder_is_wellformed_pdf() {
        let pdf = placeholder_pdf(SectionKey::InterviewStage1);
        let text = std::str::from_utf8(&pdf).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        // Parens in the section title must be escaped inside the stream.
        assert!(text.contains("\\(Screen\\)"));
        assert!(text.contains("startxref"));
    }
}
