//! Minimal single-font PDF writer for availability reports.
//!
//! Output is PDF 1.4 with the standard Helvetica faces (no embedding, WinAnsi
//! encoding), A4 pages and one text object per line. Text wider than the page
//! wraps onto continuation lines; lines that run past the bottom margin start a
//! new page.
use chrono::{DateTime, Utc};
use std::fmt::Write as _;

use super::ReportRenderer;
use crate::db::BatchWithLinks;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;
/// Average Helvetica glyph width as a fraction of the font size.
const AVG_GLYPH_EM: f32 = 0.6;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Face {
    Regular,
    Bold,
}

impl Face {
    fn resource(self) -> &'static str {
        match self {
            Face::Regular => "F1",
            Face::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone)]
struct Line {
    face: Face,
    size: f32,
    text: String,
    /// Vertical space consumed after this line.
    advance: f32,
}

impl Line {
    fn new(face: Face, size: f32, text: impl Into<String>, advance: f32) -> Self {
        Self {
            face,
            size,
            text: text.into(),
            advance,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PdfRenderer;

impl ReportRenderer for PdfRenderer {
    fn render(
        &self,
        batches: &[BatchWithLinks],
        generated_at: DateTime<Utc>,
    ) -> anyhow::Result<Vec<u8>> {
        let lines = layout(batches, generated_at);
        let pages = paginate(&lines);
        write_document(&pages)
    }
}

fn layout(batches: &[BatchWithLinks], generated_at: DateTime<Utc>) -> Vec<Line> {
    let mut lines = Vec::new();
    push_wrapped(&mut lines, Face::Bold, 16.0, "URL Availability Report", 42.0);
    push_wrapped(
        &mut lines,
        Face::Regular,
        12.0,
        &format!("Generated: {}", generated_at.format(TIME_FORMAT)),
        42.0,
    );

    for entry in batches {
        push_wrapped(
            &mut lines,
            Face::Bold,
            14.0,
            &format!(
                "Batch #{} ({})",
                entry.batch.number,
                entry.batch.status.as_str()
            ),
            28.0,
        );
        push_wrapped(
            &mut lines,
            Face::Regular,
            10.0,
            &format!("Created: {}", entry.batch.created_at.format(TIME_FORMAT)),
            22.0,
        );
        for link in &entry.links {
            push_wrapped(
                &mut lines,
                Face::Regular,
                10.0,
                &format!("- {}: {}", link.url, link.status.label()),
                17.0,
            );
        }
        if let Some(last) = lines.last_mut() {
            last.advance += 28.0;
        }
    }
    lines
}

/// Push `text` as one or more lines; only the last one gets `advance`.
fn push_wrapped(lines: &mut Vec<Line>, face: Face, size: f32, text: &str, advance: f32) {
    let width = ((PAGE_WIDTH - 2.0 * MARGIN) / (size * AVG_GLYPH_EM)) as usize;
    let mut chunks = wrap_text(text, width).into_iter().peekable();
    while let Some(chunk) = chunks.next() {
        let step = if chunks.peek().is_some() {
            size * 1.4
        } else {
            advance
        };
        lines.push(Line::new(face, size, chunk, step));
    }
}

/// Split `text` into pieces of at most `width` characters without dropping
/// any. Breaks after a URL delimiter or space when one falls in the back half
/// of the window, otherwise mid-token.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= width {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    while chars.len() - start > width {
        let window = &chars[start..start + width];
        let cut = window
            .iter()
            .rposition(|c| matches!(c, '/' | '?' | '&' | '=' | '-' | ' '))
            .filter(|&i| i + 1 >= width / 2)
            .map_or(width, |i| i + 1);
        pieces.push(window[..cut].iter().collect());
        start += cut;
    }
    pieces.push(chars[start..].iter().collect());
    pieces
}

/// A positioned line: (x, baseline y, line).
type Placed<'a> = (f32, f32, &'a Line);

fn paginate(lines: &[Line]) -> Vec<Vec<Placed<'_>>> {
    let mut pages: Vec<Vec<Placed<'_>>> = vec![Vec::new()];
    let mut cursor = PAGE_HEIGHT - MARGIN;
    for line in lines {
        if cursor - line.size < MARGIN {
            pages.push(Vec::new());
            cursor = PAGE_HEIGHT - MARGIN;
        }
        let baseline = cursor - line.size;
        if let Some(page) = pages.last_mut() {
            page.push((MARGIN, baseline, line));
        }
        cursor = baseline - (line.advance - line.size).max(0.0);
    }
    pages
}

/// Escape a string for a PDF literal. Characters outside printable ASCII are
/// written as octal WinAnsi codes; ones WinAnsi cannot encode become `?`.
fn pdf_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            ' '..='~' => out.push(ch),
            _ => match win_ansi(ch) {
                Some(code) => {
                    let _ = write!(out, "\\{:03o}", code);
                }
                None => out.push('?'),
            },
        }
    }
    out
}

/// WinAnsiEncoding byte for a non-ASCII character.
fn win_ansi(ch: char) -> Option<u8> {
    let code = match ch {
        '\u{a0}'..='\u{ff}' => ch as u32 as u8,
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(code)
}

fn content_stream(page: &[Placed<'_>]) -> anyhow::Result<String> {
    let mut stream = String::new();
    for (x, y, line) in page {
        writeln!(
            stream,
            "BT /{} {} Tf {:.2} {:.2} Td ({}) Tj ET",
            line.face.resource(),
            line.size,
            x,
            y,
            pdf_literal(&line.text)
        )?;
    }
    Ok(stream)
}

struct Writer {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl Writer {
    fn new() -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        Self {
            out,
            offsets: Vec::new(),
        }
    }

    /// Append the next object; objects are numbered from 1 in write order.
    fn object(&mut self, body: &str) {
        self.offsets.push(self.out.len());
        let number = self.offsets.len();
        self.out
            .extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", number, body).as_bytes());
    }

    fn finish(mut self) -> anyhow::Result<Vec<u8>> {
        let xref_offset = self.out.len();
        let mut tail = String::new();
        writeln!(tail, "xref")?;
        writeln!(tail, "0 {}", self.offsets.len() + 1)?;
        tail.push_str("0000000000 65535 f \n");
        for offset in &self.offsets {
            write!(tail, "{:010} 00000 n \n", offset)?;
        }
        writeln!(tail, "trailer")?;
        writeln!(tail, "<< /Size {} /Root 1 0 R >>", self.offsets.len() + 1)?;
        writeln!(tail, "startxref")?;
        writeln!(tail, "{}", xref_offset)?;
        tail.push_str("%%EOF\n");
        self.out.extend_from_slice(tail.as_bytes());
        Ok(self.out)
    }
}

fn write_document(pages: &[Vec<Placed<'_>>]) -> anyhow::Result<Vec<u8>> {
    // 1 catalog, 2 page tree, 3-4 fonts, then a (page, contents) pair per page.
    let page_object = |i: usize| 5 + 2 * i;
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", page_object(i)))
        .collect::<Vec<_>>()
        .join(" ");

    let mut writer = Writer::new();
    writer.object("<< /Type /Catalog /Pages 2 0 R >>");
    writer.object(&format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        pages.len()
    ));
    writer.object("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>");
    writer.object(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>",
    );

    for (i, page) in pages.iter().enumerate() {
        writer.object(&format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH,
            PAGE_HEIGHT,
            page_object(i) + 1
        ));
        let stream = content_stream(page)?;
        writer.object(&format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Batch, BatchStatus, Link, LinkStatus};
    use chrono::TimeZone;

    fn sample(links: usize) -> Vec<BatchWithLinks> {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        vec![BatchWithLinks {
            batch: Batch {
                number: 1,
                link_count: links as i64,
                status: BatchStatus::Completed,
                created_at: created,
            },
            links: (0..links)
                .map(|i| Link {
                    id: i as i64 + 1,
                    url: format!("https://site{}.example/(path)", i),
                    status: if i % 2 == 0 {
                        LinkStatus::Available
                    } else {
                        LinkStatus::NotAvailable
                    },
                    batch_number: 1,
                    checked_at: Some(created),
                })
                .collect(),
        }]
    }

    fn render(batches: &[BatchWithLinks]) -> String {
        let generated = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
        let bytes = PdfRenderer.render(batches, generated).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn renders_batch_sections() {
        let doc = render(&sample(2));
        assert!(doc.starts_with("%PDF-1.4\n"));
        assert!(doc.ends_with("%%EOF\n"));
        assert!(doc.contains("(URL Availability Report)"));
        assert!(doc.contains("(Generated: 2024-05-02 08:00:00)"));
        assert!(doc.contains("(Batch #1 \\(completed\\))"));
        assert!(doc.contains("(Created: 2024-05-01 12:30:00)"));
        assert!(doc.contains("(- https://site0.example/\\(path\\): Available)"));
        assert!(doc.contains("(- https://site1.example/\\(path\\): Not Available)"));
        assert!(doc.contains("/Count 1"));
    }

    #[test]
    fn long_reports_span_pages() {
        let doc = render(&sample(120));
        assert!(doc.contains("/Count 3 >>"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let doc = render(&sample(60));
        let start = doc.rfind("startxref\n").unwrap() + "startxref\n".len();
        let xref_offset: usize = doc[start..].lines().next().unwrap().parse().unwrap();
        assert!(doc[xref_offset..].starts_with("xref\n"));

        let entries: Vec<&str> = doc[xref_offset..].lines().skip(3).collect();
        for (i, entry) in entries.iter().take_while(|e| e.trim_end().ends_with(" n")).enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            assert!(doc[offset..].starts_with(&format!("{} 0 obj", i + 1)));
        }
    }

    #[test]
    fn literals_are_escaped_and_win_ansi_encoded() {
        assert_eq!(pdf_literal("a(b)c\\"), "a\\(b\\)c\\\\");
        assert_eq!(pdf_literal("caf\u{e9}"), "caf\\351");
        assert_eq!(pdf_literal("\u{20ac}5 \u{2013} ok"), "\\2005 \\226 ok");
        assert_eq!(pdf_literal("\u{4e2d}"), "?");
    }

    #[test]
    fn long_text_wraps_without_loss() {
        let url = format!("https://example.com/{}/tail-marker", "segment/".repeat(30));
        let pieces = wrap_text(&url, 82);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.chars().count() <= 82));
        assert_eq!(pieces.concat(), url);
        assert!(pieces[0].ends_with('/'));

        let unbroken = "x".repeat(200);
        let pieces = wrap_text(&unbroken, 82);
        assert_eq!(pieces.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![82, 82, 36]);
    }

    #[test]
    fn long_urls_appear_in_full() {
        let mut batches = sample(1);
        let url = format!("https://example.com/{}end", "a".repeat(150));
        batches[0].links[0].url = url.clone();
        let lines = layout(&batches, Utc::now());
        let link_text: String = lines
            .iter()
            .skip_while(|l| !l.text.starts_with("- "))
            .map(|l| l.text.as_str())
            .collect();
        assert_eq!(link_text, format!("- {}: Available", url));

        let doc = render(&batches);
        assert!(doc.contains("end: Available)"));
        assert!(!doc.contains("..."));
    }
}
