//! Minimal PDF 1.4 writer for text-only documents.
//!
//! Pages hold positioned text runs in the two standard Helvetica faces
//! with WinAnsi encoding, so no fonts are embedded. Output is a pure
//! function of the drawn content: there are no timestamps or ids in the
//! file, and the same calls always produce the same bytes.

use std::fmt::Write;

pub const POINTS_PER_MM: f64 = 72.0 / 25.4;
pub const A4_WIDTH_MM: f64 = 210.0;
pub const A4_HEIGHT_MM: f64 = 297.0;

/// Average Helvetica glyph width as a fraction of the font size.
pub const AVERAGE_CHAR_WIDTH_EM: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Helvetica,
    HelveticaBold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Helvetica => "F1",
            Font::HelveticaBold => "F2",
        }
    }
}

/// Document being assembled. Coordinates are millimetres from the bottom
/// left corner of an A4 page.
#[derive(Debug, Default)]
pub struct PdfDocument {
    title: String,
    pages: Vec<String>,
}

impl PdfDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            pages: Vec::new(),
        }
    }

    pub fn add_page(&mut self) {
        self.pages.push(String::new());
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Draws `text` on the last page, starting one if none exists yet.
    pub fn text(&mut self, x_mm: f64, y_mm: f64, font: Font, size: f64, text: &str) {
        if self.pages.is_empty() {
            self.add_page();
        }
        let encoded = escape(&encode_win_ansi(text));
        if let Some(page) = self.pages.last_mut() {
            let _ = writeln!(
                page,
                "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET",
                font.resource(),
                fmt_num(size),
                x_mm * POINTS_PER_MM,
                y_mm * POINTS_PER_MM,
                encoded
            );
        }
    }

    /// Serializes the document. A document with no pages gets one blank
    /// page.
    pub fn finish(mut self) -> Vec<u8> {
        if self.pages.is_empty() {
            self.add_page();
        }

        let mut out = Vec::new();
        let mut offsets = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

        let page_count = self.pages.len();
        let first_page_obj = 5;
        let info_obj = first_page_obj + 2 * page_count;

        let kids = (0..page_count)
            .map(|i| format!("{} 0 R", first_page_obj + 2 * i))
            .collect::<Vec<_>>()
            .join(" ");

        push_object(
            &mut out,
            &mut offsets,
            "<< /Type /Catalog /Pages 2 0 R >>".as_bytes(),
        );
        push_object(
            &mut out,
            &mut offsets,
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count).as_bytes(),
        );
        push_object(
            &mut out,
            &mut offsets,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>",
        );
        push_object(
            &mut out,
            &mut offsets,
            b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
        );

        let media_box = format!(
            "[0 0 {:.2} {:.2}]",
            A4_WIDTH_MM * POINTS_PER_MM,
            A4_HEIGHT_MM * POINTS_PER_MM
        );
        for (i, content) in self.pages.iter().enumerate() {
            let content_obj = first_page_obj + 2 * i + 1;
            push_object(
                &mut out,
                &mut offsets,
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox {} /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                    media_box, content_obj
                )
                .as_bytes(),
            );

            let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
            stream.extend_from_slice(content.as_bytes());
            stream.extend_from_slice(b"\nendstream");
            push_object(&mut out, &mut offsets, &stream);
        }

        let title = escape(&encode_win_ansi(&self.title));
        push_object(
            &mut out,
            &mut offsets,
            format!("<< /Title ({}) /Producer (Kisan Sathi) >>", title).as_bytes(),
        );

        let xref_offset = out.len();
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1);
        for offset in &offsets {
            let _ = writeln!(xref, "{:010} 00000 n ", offset);
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            offsets.len() + 1,
            info_obj,
            xref_offset
        );
        out.extend_from_slice(xref.as_bytes());
        out
    }
}

fn push_object(out: &mut Vec<u8>, offsets: &mut Vec<usize>, body: &[u8]) {
    offsets.push(out.len());
    out.extend_from_slice(format!("{} 0 obj\n", offsets.len()).as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\nendobj\n");
}

fn fmt_num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.2}", value)
    }
}

/// Maps `text` to WinAnsi bytes. Characters with no WinAnsi code become
/// `?`; control characters become spaces.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            c if c.is_control() => b' ',
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

/// Escapes a byte string for a PDF literal string. Bytes outside printable
/// ASCII become octal escapes, so the result is plain ASCII.
fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7E => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out
}

/// Rough rendered width of `text` in millimetres.
pub fn text_width_mm(text: &str, size: f64) -> f64 {
    text.chars().count() as f64 * size * AVERAGE_CHAR_WIDTH_EM / POINTS_PER_MM
}
