//! Plain-text PDF rendering via `lopdf`.
//!
//! The LaTeX source is laid out as literal text (no typesetting). This is a known
//! fidelity gap: the PDF is a readable preview, not the compiled exam.

use base64::Engine;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tracing::warn;

use crate::artifacts::page::{paginate, wrap_text, PageConfig};
use crate::errors::AppError;

/// Result of laying out and encoding one document.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub line_count: usize,
    /// Characters Courier/WinAnsi cannot show, printed as `?`.
    pub unmapped_chars: usize,
}

impl RenderedPdf {
    /// `data:application/pdf;base64,...` form for inline JSON delivery.
    pub fn data_uri(&self) -> String {
        format!(
            "data:application/pdf;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Lays `text` out on fixed-size pages and encodes the result as a PDF.
///
/// Long lines wrap and long documents paginate; every character of the input
/// reaches some page.
pub fn render_text_pdf(text: &str, config: &PageConfig) -> Result<RenderedPdf, AppError> {
    let lines = wrap_text(text, config.chars_per_line());
    let line_count = lines.len();
    let pages = paginate(lines, config.lines_per_page());
    let page_count = pages.len();

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(page_count);
    let mut unmapped_chars = 0;
    for page_lines in &pages {
        let (page_id, unmapped) = add_page(&mut doc, pages_id, page_lines, config)?;
        unmapped_chars += unmapped;
        kids.push(page_id.into());
    }
    if unmapped_chars > 0 {
        warn!(unmapped_chars, "PDF preview replaced characters outside WinAnsi with '?'");
    }

    let media_box: Vec<Object> = vec![
        0.into(),
        0.into(),
        config.width_pt.into(),
        config.height_pt.into(),
    ];
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
            "Resources" => resources_id,
            "MediaBox" => media_box,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| AppError::Render(format!("failed to serialize PDF: {e}")))?;

    Ok(RenderedPdf {
        bytes,
        page_count,
        line_count,
        unmapped_chars,
    })
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    lines: &[String],
    config: &PageConfig,
) -> Result<(ObjectId, usize), AppError> {
    let mut unmapped = 0;
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), config.font_size_pt.into()]),
        Operation::new("TL", vec![config.leading_pt.into()]),
        Operation::new(
            "Td",
            vec![config.margin_pt.into(), config.first_baseline_pt().into()],
        ),
    ];
    for line in lines {
        let (encoded, missing) = to_win_ansi(line);
        unmapped += missing;
        operations.push(Operation::new("Tj", vec![Object::string_literal(encoded)]));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations }
        .encode()
        .map_err(|e| AppError::Render(format!("failed to encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    Ok((page_id, unmapped))
}

/// Maps text to single-byte WinAnsi codes. Latin-1 passes through, the
/// 0x80..=0x9F block carries the typographic extras (curly quotes, dashes,
/// bullet, ellipsis, euro). Anything else becomes `?` and is counted.
fn to_win_ansi(line: &str) -> (Vec<u8>, usize) {
    let mut unmapped = 0;
    let bytes = line
        .chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => win_ansi_extra(c).unwrap_or_else(|| {
                unmapped += 1;
                b'?'
            }),
        })
        .collect();
    (bytes, unmapped)
}

fn win_ansi_extra(c: char) -> Option<u8> {
    let code = match c {
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::page::default_page_config;

    #[test]
    fn test_renders_valid_single_page() {
        let pdf = render_text_pdf("\\section*{Part I}\n1. What is ATP?", &default_page_config())
            .unwrap();
        assert!(pdf.bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(pdf.page_count, 1);
        assert_eq!(pdf.line_count, 2);

        let parsed = Document::load_mem(&pdf.bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 1);
    }

    #[test]
    fn test_long_text_paginates_instead_of_truncating() {
        let config = default_page_config();
        let text: String = (1..=200)
            .map(|i| format!("{i}. Explain step {i} of the light-dependent reactions."))
            .collect::<Vec<_>>()
            .join("\n");
        let pdf = render_text_pdf(&text, &config).unwrap();
        assert_eq!(pdf.line_count, 200);
        assert_eq!(pdf.page_count, 200_usize.div_ceil(config.lines_per_page()));

        let parsed = Document::load_mem(&pdf.bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), pdf.page_count);
    }

    #[test]
    fn test_empty_text_still_one_page() {
        let pdf = render_text_pdf("", &default_page_config()).unwrap();
        assert_eq!(pdf.page_count, 1);
        assert!(Document::load_mem(&pdf.bytes).is_ok());
    }

    #[test]
    fn test_data_uri_prefix() {
        let pdf = render_text_pdf("1. Q", &default_page_config()).unwrap();
        let uri = pdf.data_uri();
        assert!(uri.starts_with("data:application/pdf;base64,JVBERi0"));
    }

    #[test]
    fn test_to_win_ansi_latin1() {
        assert_eq!(to_win_ansi("café"), (b"caf\xe9".to_vec(), 0));
    }

    #[test]
    fn test_to_win_ansi_typographic_extras() {
        let (bytes, unmapped) = to_win_ansi("\u{201C}x\u{201D} \u{2014} it\u{2019}s \u{20AC}");
        assert_eq!(bytes, b"\x93x\x94 \x97 it\x92s \x80".to_vec());
        assert_eq!(unmapped, 0);
        assert_eq!(to_win_ansi("\u{2022} a\u{2026}").0, b"\x95 a\x85".to_vec());
    }

    #[test]
    fn test_to_win_ansi_counts_unmapped() {
        assert_eq!(to_win_ansi("λ = 2 \u{2192} μ"), (b"? = 2 ? ?".to_vec(), 3));
    }

    #[test]
    fn test_render_reports_unmapped_chars() {
        let config = default_page_config();
        let clean = render_text_pdf("\u{201C}Quoted\u{201D} \u{2013} fine", &config).unwrap();
        assert_eq!(clean.unmapped_chars, 0);
        let lossy = render_text_pdf("Let \u{03B1} \u{2208} \u{211D}\nnext \u{03B2}", &config).unwrap();
        assert_eq!(lossy.unmapped_chars, 4);
    }
}
