//! Per-format text extraction for uploaded documents.
//!
//! Callers supply raw bytes plus a [`FormatTag`] derived from the file
//! extension; each extractor returns an ordered sequence of [`Page`]s and
//! extraction metadata, or a typed [`ExtractError`]. Packet captures are
//! summarized by [`crate::capture`] and surface here as a single synthetic
//! page.

use std::io::Read;

use crate::capture;
use crate::config::CaptureConfig;
use crate::error::ExtractError;
use crate::models::{DocMetadata, FormatTag, Page};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extract an uploaded file into (pages, metadata).
pub fn extract_document(
    name: &str,
    bytes: &[u8],
    format: FormatTag,
    capture_cfg: &CaptureConfig,
) -> Result<(Vec<Page>, DocMetadata), ExtractError> {
    match format {
        FormatTag::Pdf => extract_pdf(bytes),
        FormatTag::Docx => extract_docx(bytes),
        FormatTag::Txt => extract_txt(bytes),
        FormatTag::Pcap => extract_pcap(name, bytes, capture_cfg),
    }
}

// ============ PDF ============

/// One page per output unit. Pages with no extractable text are kept as
/// empty pages so page numbering stays aligned with the source.
fn extract_pdf(bytes: &[u8]) -> Result<(Vec<Page>, DocMetadata), ExtractError> {
    let page_texts = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::UnsupportedOrCorrupt(format!("PDF: {}", e)))?;

    let pages: Vec<Page> = page_texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            text: text.trim().to_string(),
            number: Some(i as u32 + 1),
        })
        .collect();

    let metadata = DocMetadata {
        pages: Some(pages.len()),
        ..Default::default()
    };
    Ok((pages, metadata))
}

// ============ DOCX ============

/// Primary path extracts structured paragraphs (headings kept on their own
/// lines); on failure a plain fallback concatenates run text only. Both
/// failing yields `UnsupportedOrCorrupt`.
fn extract_docx(bytes: &[u8]) -> Result<(Vec<Page>, DocMetadata), ExtractError> {
    let doc_xml = read_document_xml(bytes)?;

    let paragraphs = match extract_docx_structured(&doc_xml) {
        Ok(paras) if !paras.is_empty() => paras,
        _ => extract_docx_plain(&doc_xml).map_err(|e| {
            ExtractError::UnsupportedOrCorrupt(format!("DOCX: both extractors failed: {}", e))
        })?,
    };

    if paragraphs.is_empty() {
        return Err(ExtractError::UnsupportedOrCorrupt(
            "DOCX: no text content".to_string(),
        ));
    }

    let metadata = DocMetadata {
        sections: Some(paragraphs.len()),
        ..Default::default()
    };
    let pages = paragraphs
        .into_iter()
        .map(|text| Page { text, number: None })
        .collect();
    Ok((pages, metadata))
}

fn read_document_xml(bytes: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::UnsupportedOrCorrupt(format!("DOCX: {}", e)))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::UnsupportedOrCorrupt("DOCX: word/document.xml not found".to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::UnsupportedOrCorrupt(format!("DOCX: {}", e)))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::UnsupportedOrCorrupt(
            "DOCX: word/document.xml exceeds size limit".to_string(),
        ));
    }
    Ok(xml)
}

/// Walk `word/document.xml` paragraph by paragraph, capturing run text and
/// flagging heading styles. Run text is taken verbatim (a sentence split
/// across runs keeps its interior spaces); trimming happens per paragraph.
fn extract_docx_structured(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;
    let mut is_heading = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => {
                    in_paragraph = true;
                    is_heading = false;
                    current.clear();
                }
                b"t" if in_paragraph => in_text = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"pStyle" {
                    let style = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"val")
                        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
                        .unwrap_or_default();
                    if style.to_ascii_lowercase().starts_with("heading")
                        || style.eq_ignore_ascii_case("title")
                    {
                        is_heading = true;
                    }
                } else if e.local_name().as_ref() == b"tab" && in_paragraph {
                    current.push('\t');
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::UnsupportedOrCorrupt(format!("DOCX: {}", e)))?;
                current.push_str(text.as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    in_paragraph = false;
                    let text = current.trim();
                    if !text.is_empty() {
                        if is_heading {
                            paragraphs.push(format!("# {}", text));
                        } else {
                            paragraphs.push(text.to_string());
                        }
                    }
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::UnsupportedOrCorrupt(format!("DOCX: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

/// Fallback: concatenate every `w:t` run verbatim, keeping only paragraph
/// breaks from the structure.
fn extract_docx_plain(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_text => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::UnsupportedOrCorrupt(format!("DOCX: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    let out = out.trim().to_string();
    if out.is_empty() {
        return Err(ExtractError::UnsupportedOrCorrupt(
            "DOCX: no run text".to_string(),
        ));
    }
    Ok(vec![out])
}

// ============ Plain text ============

/// Decode with UTF-8 first, then a fixed fallback list. No size limit is
/// imposed here; callers may impose their own.
fn extract_txt(bytes: &[u8]) -> Result<(Vec<Page>, DocMetadata), ExtractError> {
    let text = decode_text(bytes)?;
    let metadata = DocMetadata {
        sections: Some(1),
        ..Default::default()
    };
    Ok((vec![Page { text, number: None }], metadata))
}

fn decode_text(bytes: &[u8]) -> Result<String, ExtractError> {
    // NUL bytes mean this is not a text file in any supported encoding.
    if bytes.contains(&0) {
        return Err(ExtractError::DecodeFailure(
            "file contains binary content".to_string(),
        ));
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1252.decode(bytes);
    if !had_errors {
        return Ok(decoded.into_owned());
    }

    // Latin-1 maps every byte; last resort before giving up.
    let latin1: String = bytes.iter().map(|&b| b as char).collect();
    if !latin1.is_empty() {
        return Ok(latin1);
    }

    Err(ExtractError::DecodeFailure(
        "no supported encoding matched".to_string(),
    ))
}

// ============ Packet capture ============

fn extract_pcap(
    name: &str,
    bytes: &[u8],
    capture_cfg: &CaptureConfig,
) -> Result<(Vec<Page>, DocMetadata), ExtractError> {
    let summary = capture::summarize_capture(name, bytes, capture_cfg.max_analyzed_packets)?;

    let metadata = DocMetadata {
        packets_total: Some(summary.total_packets),
        packets_analyzed: Some(summary.analyzed_packets),
        ..Default::default()
    };
    let page = Page {
        text: summary.render(),
        number: None,
    };
    Ok((vec![page], metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_xml(xml: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn invalid_pdf_is_corrupt() {
        let cfg = CaptureConfig::default();
        let err = extract_document("x.pdf", b"not a pdf", FormatTag::Pdf, &cfg).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedOrCorrupt(_)));
    }

    #[test]
    fn invalid_zip_is_corrupt_docx() {
        let cfg = CaptureConfig::default();
        let err = extract_document("x.docx", b"not a zip", FormatTag::Docx, &cfg).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedOrCorrupt(_)));
    }

    #[test]
    fn docx_paragraphs_and_headings() {
        let xml = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Overview</w:t></w:r></w:p>
                <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second </w:t></w:r><w:r><w:t>paragraph.</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let cfg = CaptureConfig::default();
        let (pages, meta) =
            extract_document("a.docx", &docx_with_xml(xml), FormatTag::Docx, &cfg).unwrap();
        assert_eq!(meta.sections, Some(3));
        assert_eq!(pages[0].text, "# Overview");
        assert_eq!(pages[1].text, "First paragraph.");
        assert_eq!(pages[2].text, "Second paragraph.");
    }

    #[test]
    fn docx_run_text_kept_verbatim() {
        // A run boundary mid-word must not gain a space, and one that
        // lands on a space must not lose it.
        let xml = r#"<?xml version="1.0"?>
            <w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
              <w:body>
                <w:p><w:r><w:t>Data</w:t></w:r><w:r><w:t>base systems.</w:t></w:r></w:p>
                <w:p><w:r><w:t xml:space="preserve">Trailing </w:t></w:r><w:r><w:t>space kept.</w:t></w:r></w:p>
              </w:body>
            </w:document>"#;
        let cfg = CaptureConfig::default();
        let (pages, _) =
            extract_document("a.docx", &docx_with_xml(xml), FormatTag::Docx, &cfg).unwrap();
        assert_eq!(pages[0].text, "Database systems.");
        assert_eq!(pages[1].text, "Trailing space kept.");
    }

    #[test]
    fn docx_without_document_xml_is_corrupt() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let cfg = CaptureConfig::default();
        let err = extract_document("a.docx", &buf, FormatTag::Docx, &cfg).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedOrCorrupt(_)));
    }

    #[test]
    fn utf8_text_decodes_directly() {
        let cfg = CaptureConfig::default();
        let (pages, meta) =
            extract_document("a.txt", "héllo wörld".as_bytes(), FormatTag::Txt, &cfg).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "héllo wörld");
        assert_eq!(meta.sections, Some(1));
    }

    #[test]
    fn windows_1252_fallback() {
        // 0x93/0x94 are curly quotes in windows-1252 and invalid UTF-8.
        let bytes = b"\x93quoted\x94 text";
        let cfg = CaptureConfig::default();
        let (pages, _) = extract_document("a.txt", bytes, FormatTag::Txt, &cfg).unwrap();
        assert!(pages[0].text.contains("quoted"));
        assert!(pages[0].text.contains('\u{201c}'));
    }

    #[test]
    fn binary_text_is_decode_failure() {
        let bytes = b"\x00\x01\x02 not text";
        let cfg = CaptureConfig::default();
        let err = extract_document("a.txt", bytes, FormatTag::Txt, &cfg).unwrap_err();
        assert!(matches!(err, ExtractError::DecodeFailure(_)));
    }
}
