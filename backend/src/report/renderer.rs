use shared::DiagnosisRecord;

use super::pdf::{text_width_mm, Font, PdfDocument, A4_HEIGHT_MM, A4_WIDTH_MM};
use crate::diagnosis::models::Analysis;

pub const REPORT_TITLE: &str = "Kisan Sathi - Crop Doctor Report";
pub const MAX_PREVENTION_ITEMS: usize = 6;

const MARGIN_MM: f64 = 20.0;
const TOP_MM: f64 = A4_HEIGHT_MM - MARGIN_MM;
const BOTTOM_MM: f64 = MARGIN_MM;
const SECTION_BREAK_MM: f64 = 40.0;
const TEXT_WIDTH_MM: f64 = A4_WIDTH_MM - 2.0 * MARGIN_MM;
const BULLET_INDENT_MM: f64 = 6.0;

const TITLE_SIZE: f64 = 16.0;
const IMAGE_HEADER_SIZE: f64 = 12.0;
const SECTION_SIZE: f64 = 11.0;
const BODY_SIZE: f64 = 10.0;

const TITLE_LINE_MM: f64 = 10.0;
const META_LINE_MM: f64 = 6.0;
const META_GAP_MM: f64 = 4.0;
const IMAGE_HEADER_LINE_MM: f64 = 6.0;
const DISEASE_LINE_MM: f64 = 5.0;
const CONFIDENCE_LINE_MM: f64 = 6.0;
const SECTION_LINE_MM: f64 = 5.0;
const BULLET_LINE_MM: f64 = 5.0;
const CAUSE_LINE_MM: f64 = 6.0;
const IMAGE_GAP_MM: f64 = 6.0;

/// Vertical layout state. Pages are opened on the first line drawn after a
/// break, so a break at the very end leaves no blank page behind.
struct Cursor {
    pdf: PdfDocument,
    y: f64,
    on_page: bool,
}

impl Cursor {
    fn new(title: &str) -> Self {
        Self {
            pdf: PdfDocument::new(title),
            y: TOP_MM,
            on_page: false,
        }
    }

    fn line(&mut self, indent: f64, font: Font, size: f64, text: &str, advance: f64) {
        if !self.on_page || self.y < BOTTOM_MM {
            self.pdf.add_page();
            self.y = TOP_MM;
            self.on_page = true;
        }
        self.pdf.text(MARGIN_MM + indent, self.y, font, size, text);
        self.y -= advance;
    }

    fn skip(&mut self, mm: f64) {
        self.y -= mm;
    }

    /// Starts a new page before a section header when little room is left.
    fn section(&mut self) {
        if self.on_page && self.y < SECTION_BREAK_MM {
            self.on_page = false;
        }
    }
}

/// Greedy word wrap against the estimated glyph width. Words longer than
/// a line are kept whole.
fn wrap(text: &str, size: f64, width_mm: f64) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", current, word)
        };
        if !current.is_empty() && text_width_mm(&candidate, size) > width_mm {
            lines.push(std::mem::replace(&mut current, word.to_string()));
        } else {
            current = candidate;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn or_dash(text: &str) -> &str {
    if text.trim().is_empty() { "-" } else { text }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn draw_record(cursor: &mut Cursor, number: usize, record: &DiagnosisRecord) {
    cursor.section();
    cursor.line(
        0.0,
        Font::HelveticaBold,
        IMAGE_HEADER_SIZE,
        &format!("Image {}", number),
        IMAGE_HEADER_LINE_MM,
    );
    cursor.line(
        0.0,
        Font::Helvetica,
        BODY_SIZE,
        &format!("Disease: {}", or_dash(&record.disease.en)),
        DISEASE_LINE_MM,
    );
    cursor.line(
        0.0,
        Font::Helvetica,
        BODY_SIZE,
        &format!(
            "Confidence: {:.1}%  Severity: {}",
            record.confidence,
            record.severity.to_string().to_uppercase()
        ),
        CONFIDENCE_LINE_MM,
    );

    cursor.section();
    cursor.line(0.0, Font::HelveticaBold, SECTION_SIZE, "Cause", SECTION_LINE_MM);
    let cause = wrap(or_dash(&record.cause.en), BODY_SIZE, TEXT_WIDTH_MM);
    for line in &cause {
        cursor.line(0.0, Font::Helvetica, BODY_SIZE, line, CAUSE_LINE_MM);
    }

    cursor.section();
    cursor.line(0.0, Font::HelveticaBold, SECTION_SIZE, "Treatment", SECTION_LINE_MM);
    for (name, items) in record.treatment.sections() {
        if items.en.is_empty() {
            continue;
        }
        cursor.line(
            0.0,
            Font::Helvetica,
            BODY_SIZE,
            &format!("- {}", capitalize(name)),
            BULLET_LINE_MM,
        );
        for item in &items.en {
            cursor.line(
                BULLET_INDENT_MM,
                Font::Helvetica,
                BODY_SIZE,
                &format!("• {}", item),
                BULLET_LINE_MM,
            );
        }
    }

    cursor.section();
    cursor.line(0.0, Font::HelveticaBold, SECTION_SIZE, "Prevention", SECTION_LINE_MM);
    for item in record.prevention.en.iter().take(MAX_PREVENTION_ITEMS) {
        cursor.line(
            BULLET_INDENT_MM,
            Font::Helvetica,
            BODY_SIZE,
            &format!("• {}", item),
            BULLET_LINE_MM,
        );
    }

    cursor.skip(IMAGE_GAP_MM);
}

fn layout(analysis: &Analysis) -> PdfDocument {
    let mut cursor = Cursor::new(&format!("Crop Doctor Report {}", analysis.id));

    cursor.line(0.0, Font::HelveticaBold, TITLE_SIZE, REPORT_TITLE, TITLE_LINE_MM);
    cursor.line(
        0.0,
        Font::Helvetica,
        BODY_SIZE,
        &format!("Crop Type: {}", or_dash(&analysis.crop_type)),
        META_LINE_MM,
    );
    cursor.line(
        0.0,
        Font::Helvetica,
        BODY_SIZE,
        &format!("Date: {}", analysis.created_at.format("%Y-%m-%d %H:%M")),
        META_LINE_MM,
    );
    cursor.skip(META_GAP_MM);

    for (i, record) in analysis.result.items.iter().enumerate() {
        draw_record(&mut cursor, i + 1, record);
    }
    cursor.pdf
}

/// Renders the English report for `analysis` as PDF bytes.
pub fn render_analysis(analysis: &Analysis) -> Vec<u8> {
    let pdf = layout(analysis);
    log::debug!(
        "Rendered report for analysis {} ({} pages)",
        analysis.id,
        pdf.page_count()
    );
    pdf.finish()
}

pub fn report_filename(analysis: &Analysis) -> String {
    format!("analysis_{}.pdf", analysis.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis::class_map::ClassMapCatalog;
    use chrono::{TimeZone, Utc};
    use shared::AnalysisResult;

    fn analysis_with(count: usize) -> Analysis {
        let catalog = ClassMapCatalog::builtin().unwrap();
        let entry = catalog.get("default").unwrap().resolve(0).unwrap();
        let mut analysis = Analysis::new(None, "tomato".into(), "en".into());
        analysis.created_at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        analysis.result = AnalysisResult {
            items: (0..count).map(|_| entry.to_record(92.0)).collect(),
        };
        analysis
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn empty_result_is_a_single_page_with_header() {
        let mut analysis = analysis_with(0);
        analysis.crop_type = String::new();
        let pdf = text(&render_analysis(&analysis));
        assert_eq!(pdf.matches("/Type /Page ").count(), 1);
        assert!(pdf.contains("(Kisan Sathi - Crop Doctor Report) Tj"));
        assert!(pdf.contains("(Crop Type: -) Tj"));
        assert!(pdf.contains("(Date: 2025-03-04 05:06) Tj"));
    }

    #[test]
    fn record_lines_are_drawn() {
        let pdf = text(&render_analysis(&analysis_with(1)));
        assert!(pdf.contains("(Image 1) Tj"));
        assert!(pdf.contains("(Disease: Tomato Late Blight) Tj"));
        assert!(pdf.contains("(Confidence: 92.0%  Severity: HIGH) Tj"));
        assert!(pdf.contains("(- Immediate) Tj"));
        assert!(pdf.contains("(\\225 "));
    }

    #[test]
    fn prevention_is_capped() {
        let mut analysis = analysis_with(1);
        analysis.result.items[0].prevention.en =
            (1..=9).map(|i| format!("Step {}", i)).collect();
        let pdf = text(&render_analysis(&analysis));
        assert!(pdf.contains("Step 6) Tj"));
        assert!(!pdf.contains("Step 7) Tj"));
    }

    #[test]
    fn empty_treatment_sections_are_skipped() {
        let mut analysis = analysis_with(1);
        analysis.result.items[0].treatment.chemical.en.clear();
        let pdf = text(&render_analysis(&analysis));
        assert!(!pdf.contains("(- Chemical) Tj"));
        assert!(pdf.contains("(- Organic) Tj"));
    }

    #[test]
    fn page_count_grows_monotonically_with_images() {
        let counts: Vec<usize> = (1..=10).map(|k| layout(&analysis_with(k)).page_count()).collect();
        assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{:?}", counts);
        assert_eq!(counts[0], 1);
        assert!(counts[9] > 1, "{:?}", counts);
    }

    #[test]
    fn long_cause_text_is_wrapped() {
        let mut analysis = analysis_with(1);
        analysis.result.items[0].cause.en = "spores ".repeat(80);
        let pdf = text(&render_analysis(&analysis));
        let cause_lines = pdf
            .lines()
            .filter(|line| line.contains("(spores"))
            .count();
        assert!(cause_lines > 1);
    }

    #[test]
    fn wrap_keeps_words_within_width() {
        let lines = wrap("alpha beta gamma delta", 10.0, 20.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.join(" "), "alpha beta gamma delta");
        assert_eq!(wrap("", 10.0, 20.0), Vec::<String>::new());
        assert_eq!(wrap("unbreakableword", 10.0, 5.0), vec!["unbreakableword"]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let analysis = analysis_with(3);
        assert_eq!(render_analysis(&analysis), render_analysis(&analysis));
    }

    #[test]
    fn kannada_text_degrades_to_placeholders() {
        let mut analysis = analysis_with(1);
        analysis.crop_type = "ಟೊಮೇಟೊ".into();
        let pdf = text(&render_analysis(&analysis));
        assert!(pdf.contains("(Crop Type: ??????) Tj"));
    }

    #[test]
    fn filename_uses_analysis_id() {
        let analysis = analysis_with(0);
        assert_eq!(
            report_filename(&analysis),
            format!("analysis_{}.pdf", analysis.id)
        );
    }
}
