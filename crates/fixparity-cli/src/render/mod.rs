//! Report renderers: one implementation per output format, decoupled from
//! the classifier and cache layers.

mod csv;
mod text;

pub use csv::CsvRenderer;
pub use text::TextRenderer;

use std::io::{self, Write};

use fixparity_core::ParityModel;

/// Produces output from a parity report model.
pub trait ReportRenderer {
    fn render(&self, model: &ParityModel, out: &mut dyn Write) -> io::Result<()>;
}
