//! File renderers behind swappable traits.

pub mod charts;
pub mod pdf;

pub use charts::{ChartKind, ChartRenderer, ChartSpec, SvgCharts};
pub use pdf::{PdfDocument, PdfRenderer, PdfSection, TextPdf};
