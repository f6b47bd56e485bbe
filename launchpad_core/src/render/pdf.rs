//! Text PDF output for the research memo.
//!
//! [`TextPdf`] writes a plain PDF 1.4 file with the standard Helvetica fonts
//! in WinAnsiEncoding: headings, wrapped paragraphs and automatic page
//! breaks. Scripts outside Western European Latin are not embedded; anything
//! richer belongs behind another [`PdfRenderer`].

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::Result;

const PAGE_WIDTH: f64 = 612.0;
const PAGE_HEIGHT: f64 = 792.0;
const MARGIN: f64 = 56.0;
const BODY_SIZE: f64 = 10.5;
const LEADING: f64 = 14.0;
const WRAP_COLUMNS: usize = 92;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfSection {
    pub heading: String,
    pub paragraphs: Vec<String>,
}

impl PdfSection {
    pub fn new(heading: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            paragraphs: Vec::new(),
        }
    }

    pub fn paragraph(mut self, text: impl Into<String>) -> Self {
        self.paragraphs.push(text.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PdfDocument {
    pub title: String,
    pub subtitle: Option<String>,
    pub sections: Vec<PdfSection>,
}

pub trait PdfRenderer: Send + Sync {
    fn render(&self, doc: &PdfDocument, path: &Path) -> Result<PathBuf>;
}

pub struct TextPdf;

impl PdfRenderer for TextPdf {
    fn render(&self, doc: &PdfDocument, path: &Path) -> Result<PathBuf> {
        std::fs::write(path, build_pdf(doc))?;
        Ok(path.to_path_buf())
    }
}

#[derive(Clone, Copy)]
enum Style {
    Title,
    Heading,
    Body,
}

impl Style {
    fn font(self) -> &'static str {
        match self {
            Style::Body => "F1",
            _ => "F2",
        }
    }

    fn size(self) -> f64 {
        match self {
            Style::Title => 20.0,
            Style::Heading => 14.0,
            Style::Body => BODY_SIZE,
        }
    }

    fn advance(self) -> f64 {
        match self {
            Style::Title => 30.0,
            Style::Heading => 22.0,
            Style::Body => LEADING,
        }
    }
}

/// Greedy word wrap on character columns.
pub fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > columns {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        lines.push(line);
    }
    lines
}

/// WinAnsiEncoding code for a character outside printable ASCII.
fn win_ansi(c: char) -> Option<u8> {
    let code = match c {
        '\u{A0}'..='\u{FF}' => c as u32 as u8,
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
        _ => return None,
    };
    Some(code)
}

/// PDF string literal body in WinAnsiEncoding. Delimiters are escaped and
/// high bytes written as octal escapes so content streams stay ASCII.
/// Characters outside the encoding (CJK, emoji) become `?`.
fn pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\t' => out.push(' '),
            _ => match win_ansi(c) {
                Some(code) => {
                    let _ = write!(out, "\\{code:03o}");
                }
                None => out.push('?'),
            },
        }
    }
    out
}

fn layout(doc: &PdfDocument) -> Vec<String> {
    let mut lines: Vec<(Style, String)> = vec![(Style::Title, doc.title.clone())];
    if let Some(subtitle) = &doc.subtitle {
        lines.push((Style::Body, subtitle.clone()));
    }
    for section in &doc.sections {
        lines.push((Style::Body, String::new()));
        lines.push((Style::Heading, section.heading.clone()));
        for paragraph in &section.paragraphs {
            for line in wrap(paragraph, WRAP_COLUMNS) {
                lines.push((Style::Body, line));
            }
            lines.push((Style::Body, String::new()));
        }
    }

    let mut pages = Vec::new();
    let mut content = String::new();
    let mut y = PAGE_HEIGHT - MARGIN;
    for (style, text) in lines {
        if y - style.advance() < MARGIN {
            pages.push(std::mem::take(&mut content));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= style.advance();
        if text.is_empty() {
            continue;
        }
        let _ = writeln!(
            content,
            "BT /{} {} Tf {MARGIN} {y:.1} Td ({}) Tj ET",
            style.font(),
            style.size(),
            pdf_text(&text)
        );
    }
    pages.push(content);
    pages
}

pub fn build_pdf(doc: &PdfDocument) -> Vec<u8> {
    let pages = layout(doc);
    // 1 catalog, 2 page tree, 3-4 fonts, then (page, content) pairs.
    let first_page = 5;
    let mut objects: Vec<String> = Vec::new();
    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", first_page + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()));
    for base in ["Helvetica", "Helvetica-Bold"] {
        objects.push(format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{base} /Encoding /WinAnsiEncoding >>"
        ));
    }
    for (i, content) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
            first_page + 2 * i + 1
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{content}endstream",
            content.len()
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", i + 1);
    }
    let xref = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = writeln!(out, "{offset:010} 00000 n ");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
        objects.len() + 1
    );
    out.into_bytes()
}
